pub(super) use std::sync::Arc;

pub(super) use crate::{
    exec::{
        ByRefCallable, ByValCallable, Device, ExecError, ExecutionGraph, GraphBuilder, InstrOp, Instruction,
        InstructionKind, MemLocation, ParallelInterpreter, create_interpreter,
    },
    perf::{kernels, scenarios::prepare_graph_scenarios},
    profile::NativeProfiler,
    val::{Array, Dtype, Obj, Object, Tuple},
};

pub(super) fn run_graph(graph: ExecutionGraph, outputs: Vec<MemLocation>, args: Vec<Obj>) -> anyhow::Result<Tuple> {
    let mut interp = create_interpreter(Arc::new(graph), outputs, 1, None)?;
    interp.run(&Tuple::from(args))
}

pub(super) fn exec_error(err: &anyhow::Error) -> Option<&ExecError> {
    err.downcast_ref::<ExecError>()
}

pub(super) fn increment() -> ByRefCallable {
    kernels::add_in_place(1.0)
}

mod graph;
mod sequential;
