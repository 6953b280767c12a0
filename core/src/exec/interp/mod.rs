mod parallel;
mod sequential;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, error, trace};

use super::{ExecError, ExecutionGraph, Frame, Instruction, MemLocation};
use crate::profile::NativeProfiler;
use crate::val::Tuple;

pub use parallel::ParallelInterpreter;
pub use sequential::SequentialInterpreter;

/// Drives one [`ExecutionGraph`] over a private arena.
///
/// `run` may be called repeatedly; every call starts from an empty arena.
/// After a failed run the instance refuses further work and must be
/// recreated.
pub trait Interpreter: Send {
    fn run(&mut self, args: &Tuple) -> Result<Tuple>;

    fn graph(&self) -> &Arc<ExecutionGraph>;

    fn output_locs(&self) -> &[MemLocation];
}

/// Pick an interpreter for `num_threads`: 0 or 1 runs sequentially, anything
/// larger uses the dependency scheduler with that many workers.
pub fn create_interpreter(
    graph: Arc<ExecutionGraph>,
    output_locs: Vec<MemLocation>,
    num_threads: usize,
    profiler: Option<Arc<NativeProfiler>>,
) -> Result<Box<dyn Interpreter>> {
    debug!(
        target: "graphexec::interp",
        instrs = graph.n_instrs(),
        n_locs = graph.n_locs(),
        outputs = output_locs.len(),
        num_threads,
        "creating interpreter"
    );
    if num_threads <= 1 {
        Ok(Box::new(SequentialInterpreter::new(graph, output_locs, profiler)?))
    } else {
        Ok(Box::new(ParallelInterpreter::new(graph, output_locs, num_threads, profiler)?))
    }
}

/// State shared by both interpreter flavours: the graph, the arena and the
/// bookkeeping around a run.
#[derive(Debug)]
struct RunState {
    graph: Arc<ExecutionGraph>,
    output_locs: Vec<MemLocation>,
    frame: Frame,
    profiler: Option<Arc<NativeProfiler>>,
    poisoned: bool,
}

impl RunState {
    fn new(
        graph: Arc<ExecutionGraph>,
        output_locs: Vec<MemLocation>,
        profiler: Option<Arc<NativeProfiler>>,
    ) -> Result<Self> {
        let n_locs = graph.n_locs();
        if let Some(loc) = output_locs.iter().find(|loc| loc.index() >= n_locs) {
            return Err(ExecError::LocationOutOfBounds { loc: *loc, n_locs }.into());
        }
        Ok(Self {
            frame: Frame::new(n_locs),
            graph,
            output_locs,
            profiler,
            poisoned: false,
        })
    }

    fn begin(&mut self, args: &Tuple) -> Result<()> {
        if self.poisoned {
            return Err(ExecError::Poisoned.into());
        }
        let expected = self.graph.n_args();
        if args.len() != expected {
            return Err(ExecError::ArgumentCountMismatch {
                expected,
                got: args.len(),
            }
            .into());
        }
        self.frame.reset(args.clone());
        Ok(())
    }

    fn finish(&mut self, outcome: Result<()>) -> Result<Tuple> {
        self.frame.clear_args();
        if let Err(err) = outcome {
            self.poisoned = true;
            error!(target: "graphexec::interp", "run failed: {:#}", err);
            return Err(err);
        }
        let outputs = self
            .output_locs
            .iter()
            .map(|loc| self.frame.get(*loc))
            .collect::<Result<Tuple>>();
        if outputs.is_err() {
            self.poisoned = true;
        }
        outputs
    }

    /// Settle a run whose firing may have unwound. A panicking kernel poisons
    /// the interpreter like any other failure, then keeps unwinding.
    fn settle(&mut self, outcome: thread::Result<Result<()>>) -> Result<Tuple> {
        match outcome {
            Ok(outcome) => self.finish(outcome),
            Err(payload) => {
                self.frame.clear_args();
                self.poisoned = true;
                error!(target: "graphexec::interp", "run panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    fn profiler(&self) -> Option<&NativeProfiler> {
        self.profiler.as_deref()
    }
}

/// Run `fire_all`, catching a kernel panic so the caller can poison first.
fn catch_fire<F>(fire_all: F) -> thread::Result<Result<()>>
where
    F: FnOnce() -> Result<()>,
{
    panic::catch_unwind(AssertUnwindSafe(fire_all))
}

/// Fire one instruction, timing it when profiling is live and the
/// instruction is not marked quick.
fn fire_instr(instr: &Instruction, frame: &Frame, profiler: Option<&NativeProfiler>) -> Result<()> {
    trace!(target: "graphexec::interp", "fire {}", instr);
    match profiler {
        Some(p) if p.is_on() && !instr.quick() => {
            let start = Instant::now();
            instr.fire(frame)?;
            p.update(instr, start.elapsed());
            Ok(())
        }
        _ => instr.fire(frame),
    }
}
