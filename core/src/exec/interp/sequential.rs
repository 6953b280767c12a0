use std::sync::Arc;

use anyhow::Result;

use super::{Interpreter, RunState, catch_fire, fire_instr};
use crate::exec::{ExecutionGraph, MemLocation};
use crate::profile::NativeProfiler;
use crate::val::Tuple;

/// Fires instructions one at a time in list order on the calling thread.
#[derive(Debug)]
pub struct SequentialInterpreter {
    state: RunState,
}

impl SequentialInterpreter {
    pub fn new(
        graph: Arc<ExecutionGraph>,
        output_locs: Vec<MemLocation>,
        profiler: Option<Arc<NativeProfiler>>,
    ) -> Result<Self> {
        Ok(Self {
            state: RunState::new(graph, output_locs, profiler)?,
        })
    }

    fn fire_all(&self) -> Result<()> {
        let profiler = self.state.profiler();
        for instr in self.state.graph.instrs() {
            fire_instr(instr, &self.state.frame, profiler)?;
        }
        Ok(())
    }
}

impl Interpreter for SequentialInterpreter {
    fn run(&mut self, args: &Tuple) -> Result<Tuple> {
        self.state.begin(args)?;
        let outcome = catch_fire(|| self.fire_all());
        self.state.settle(outcome)
    }

    fn graph(&self) -> &Arc<ExecutionGraph> {
        &self.state.graph
    }

    fn output_locs(&self) -> &[MemLocation] {
        &self.state.output_locs
    }
}
