use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use super::kernels;
use crate::exec::{ExecutionGraph, GraphBuilder, Interpreter, MemLocation, create_interpreter};
use crate::profile::NativeProfiler;
use crate::val::{Array, Dtype, Object, Tuple};

/// A graph ready to run, with the arguments it expects and the checksum of
/// its first output.
#[derive(Clone)]
pub struct PreparedGraphScenario {
    scenario: &'static GraphScenario,
    graph: Arc<ExecutionGraph>,
    outputs: Vec<MemLocation>,
    args: Tuple,
}

impl PreparedGraphScenario {
    pub fn key(&self) -> &'static str {
        self.scenario.key
    }

    pub fn title(&self) -> &'static str {
        self.scenario.title
    }

    pub fn bench_case_name(&self, num_threads: usize) -> String {
        format!("{}_t{}", self.scenario.key, num_threads)
    }

    pub fn graph(&self) -> &Arc<ExecutionGraph> {
        &self.graph
    }

    pub fn outputs(&self) -> &[MemLocation] {
        &self.outputs
    }

    pub fn args(&self) -> &Tuple {
        &self.args
    }

    pub fn interpreter(
        &self,
        num_threads: usize,
        profiler: Option<Arc<NativeProfiler>>,
    ) -> Result<Box<dyn Interpreter>> {
        create_interpreter(self.graph.clone(), self.outputs.clone(), num_threads, profiler)
    }

    /// Run on `interp` and check the first output against the expected sum.
    pub fn run_with(&self, interp: &mut dyn Interpreter) -> Result<Tuple> {
        let out = interp
            .run(&self.args)
            .with_context(|| format!("scenario {} failed", self.scenario.key))?;
        let first = out
            .get(0)
            .ok_or_else(|| anyhow!("scenario {} produced no outputs", self.scenario.key))?;
        let observed = kernels::checksum(first)?;
        if observed != self.scenario.expected_checksum {
            return Err(anyhow!(
                "scenario {}: expected checksum {} but observed {}",
                self.scenario.key,
                self.scenario.expected_checksum,
                observed
            ));
        }
        Ok(out)
    }

    pub fn run_once(&self, num_threads: usize) -> Result<Tuple> {
        let mut interp = self.interpreter(num_threads, None)?;
        self.run_with(interp.as_mut())
    }
}

struct BuiltGraph {
    graph: ExecutionGraph,
    outputs: Vec<MemLocation>,
    args: Tuple,
}

struct GraphScenario {
    key: &'static str,
    title: &'static str,
    build: fn() -> Result<BuiltGraph>,
    expected_checksum: f64,
}

const FAN_OUT_WIDTH: usize = 16;
const FAN_OUT_SIZE: usize = 4096;
const CHAIN_DEPTH: usize = 64;
const CHAIN_SIZE: usize = 1024;
const DIAMOND_SIZE: usize = 8192;

fn ones(size: usize) -> Result<Object> {
    Ok(Object::Array(Array::from_f64(&[size], vec![1.0; size])?))
}

/// `w` independent branches `scale(x, k) + 1` over one input, summed at the end.
fn build_fan_out() -> Result<BuiltGraph> {
    let mut b = GraphBuilder::new(2);
    let x = b.load_arg(0);
    let n = b.load_arg(1);
    let mut branches = Vec::with_capacity(FAN_OUT_WIDTH);
    for k in 0..FAN_OUT_WIDTH {
        let scaled = b.by_val("scale", &[x], kernels::scale((k + 1) as f64));
        let out = b.alloc(Dtype::F64, &[n]);
        b.by_ref("copy", &[scaled], out, kernels::copy_into());
        b.by_ref("add1", &[], out, kernels::add_in_place(1.0));
        branches.push(out);
    }
    let total = b.by_val("sum", &branches, kernels::sum());
    Ok(BuiltGraph {
        graph: b.finish()?,
        outputs: vec![total],
        args: Tuple::from(vec![Arc::new(ones(FAN_OUT_SIZE)?), Object::int(FAN_OUT_SIZE as i64)]),
    })
}

/// One array bumped in place `depth` times; fully serial.
fn build_chain() -> Result<BuiltGraph> {
    let mut b = GraphBuilder::new(1);
    let n = b.load_arg(0);
    let acc = b.alloc(Dtype::F64, &[n]);
    for _ in 0..CHAIN_DEPTH {
        b.by_ref("add1", &[], acc, kernels::add_in_place(1.0));
    }
    Ok(BuiltGraph {
        graph: b.finish()?,
        outputs: vec![acc],
        args: Tuple::from(vec![Object::int(CHAIN_SIZE as i64)]),
    })
}

/// Two branches joined through a tuple, with an in-place update of one
/// branch after the tuple was built.
fn build_tuple_diamond() -> Result<BuiltGraph> {
    let mut b = GraphBuilder::new(1);
    let x = b.load_arg(0);
    let left = b.by_val("scale2", &[x], kernels::scale(2.0));
    let right = b.by_val("scale3", &[x], kernels::scale(3.0));
    let pair = b.build_tup(&[left, right]);
    b.by_ref("add1", &[], right, kernels::add_in_place(1.0));
    let total = b.by_val("sum", &[pair], kernels::sum());
    Ok(BuiltGraph {
        graph: b.finish()?,
        outputs: vec![total, pair],
        args: Tuple::from(vec![Arc::new(ones(DIAMOND_SIZE)?)]),
    })
}

static GRAPH_SCENARIOS: &[GraphScenario] = &[
    GraphScenario {
        key: "fan_out",
        title: "Wide independent branches",
        build: build_fan_out,
        // each element: sum over k of (k + 1) + 1
        expected_checksum: (FAN_OUT_SIZE * (FAN_OUT_WIDTH * (FAN_OUT_WIDTH + 1) / 2 + FAN_OUT_WIDTH)) as f64,
    },
    GraphScenario {
        key: "chain",
        title: "Serial in-place chain",
        build: build_chain,
        expected_checksum: (CHAIN_SIZE * CHAIN_DEPTH) as f64,
    },
    GraphScenario {
        key: "tuple_diamond",
        title: "Tuple join with aliased in-place update",
        build: build_tuple_diamond,
        expected_checksum: (DIAMOND_SIZE * 6) as f64,
    },
];

pub fn prepare_graph_scenarios() -> Result<Vec<PreparedGraphScenario>> {
    GRAPH_SCENARIOS
        .iter()
        .map(|scenario| {
            let built = (scenario.build)().with_context(|| format!("build scenario {}", scenario.key))?;
            Ok(PreparedGraphScenario {
                scenario,
                graph: Arc::new(built.graph),
                outputs: built.outputs,
                args: built.args,
            })
        })
        .collect()
}
