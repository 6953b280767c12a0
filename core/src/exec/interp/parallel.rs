use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Result, anyhow, bail};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use super::{Interpreter, RunState, catch_fire, fire_instr};
use crate::exec::{DependencyPlan, ExecutionGraph, MemLocation};
use crate::profile::NativeProfiler;
use crate::val::Tuple;

/// Fires independent instructions concurrently on a fixed set of workers.
///
/// Scheduling follows the graph's [`DependencyPlan`]: an instruction becomes
/// ready once all of its predecessors have fired, and the worker that fires
/// the last predecessor enqueues it. Every slot has a single producer and all
/// conflicting accesses are ordered by the plan, so the outputs match the
/// sequential interpreter regardless of how the workers interleave.
#[derive(Debug)]
pub struct ParallelInterpreter {
    state: RunState,
    plan: Arc<DependencyPlan>,
    num_threads: usize,
}

enum Task {
    Fire(usize),
    Stop,
}

/// Scheduler bookkeeping for one run. The ready queue and the predecessor
/// counters are the only shared mutable state; arena slots are not locked.
struct Schedule<'a> {
    plan: &'a DependencyPlan,
    pending: Vec<AtomicUsize>,
    remaining: AtomicUsize,
    failed: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
    workers: usize,
}

impl Schedule<'_> {
    fn stop_all(&self, tx: &Sender<Task>) {
        for _ in 0..self.workers {
            // Receivers only disappear once every worker has exited.
            let _ = tx.send(Task::Stop);
        }
    }

    fn record_failure(&self, err: anyhow::Error, tx: &Sender<Task>) {
        if !self.failed.swap(true, Ordering::AcqRel) {
            if let Ok(mut slot) = self.first_error.lock() {
                *slot = Some(err);
            }
            self.stop_all(tx);
        }
    }
}

/// Releases the other workers if this one unwinds out of a kernel panic.
struct PanicRelease<'s, 'a> {
    schedule: &'s Schedule<'a>,
    tx: &'s Sender<Task>,
}

impl Drop for PanicRelease<'_, '_> {
    fn drop(&mut self) {
        if thread::panicking() && !self.schedule.failed.swap(true, Ordering::AcqRel) {
            self.schedule.stop_all(self.tx);
        }
    }
}

impl ParallelInterpreter {
    pub fn new(
        graph: Arc<ExecutionGraph>,
        output_locs: Vec<MemLocation>,
        num_threads: usize,
        profiler: Option<Arc<NativeProfiler>>,
    ) -> Result<Self> {
        let plan = graph.dependencies();
        Ok(Self {
            state: RunState::new(graph, output_locs, profiler)?,
            plan,
            num_threads: num_threads.max(1),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn fire_all(&self) -> Result<()> {
        let instrs = self.state.graph.instrs();
        let n = instrs.len();
        if n == 0 {
            return Ok(());
        }
        if self.plan.n_instrs() != n {
            bail!("dependency plan covers {} instructions, graph has {}", self.plan.n_instrs(), n);
        }

        let schedule = Schedule {
            plan: &self.plan,
            pending: self.plan.pred_counts().iter().map(|c| AtomicUsize::new(*c)).collect(),
            remaining: AtomicUsize::new(n),
            failed: AtomicBool::new(false),
            first_error: Mutex::new(None),
            workers: self.num_threads.min(n),
        };
        let (tx, rx) = channel::unbounded::<Task>();
        for &root in self.plan.roots() {
            tx.send(Task::Fire(root)).map_err(|_| anyhow!("ready queue closed before start"))?;
        }
        debug!(
            target: "graphexec::interp",
            workers = schedule.workers,
            roots = self.plan.roots().len(),
            "starting parallel run"
        );

        thread::scope(|scope| {
            for _ in 0..schedule.workers {
                let tx = tx.clone();
                let rx = rx.clone();
                let schedule = &schedule;
                scope.spawn(move || self.worker(schedule, &tx, &rx));
            }
        });

        if let Some(err) = schedule.first_error.into_inner().ok().flatten() {
            return Err(err);
        }
        let left = schedule.remaining.load(Ordering::Acquire);
        if left != 0 {
            bail!("parallel run stopped with {} instructions unfired", left);
        }
        Ok(())
    }

    fn worker(&self, schedule: &Schedule<'_>, tx: &Sender<Task>, rx: &Receiver<Task>) {
        let _release = PanicRelease { schedule, tx };
        let instrs = self.state.graph.instrs();
        let profiler = self.state.profiler();

        while let Ok(Task::Fire(idx)) = rx.recv() {
            if schedule.failed.load(Ordering::Acquire) {
                continue;
            }
            if let Err(err) = fire_instr(&instrs[idx], &self.state.frame, profiler) {
                schedule.record_failure(err, tx);
                continue;
            }
            for &succ in schedule.plan.successors(idx) {
                if schedule.pending[succ].fetch_sub(1, Ordering::AcqRel) == 1 && tx.send(Task::Fire(succ)).is_err() {
                    return;
                }
            }
            if schedule.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                schedule.stop_all(tx);
            }
        }
    }
}

impl Interpreter for ParallelInterpreter {
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
