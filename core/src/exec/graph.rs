use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::{ExecError, InstrOp, Instruction};

/// Compiled program: an ordered instruction list in valid topological order,
/// plus the argument count and arena size. Immutable once built and meant to
/// be shared (`Arc<ExecutionGraph>`) by any number of interpreters.
#[derive(Debug)]
pub struct ExecutionGraph {
    instrs: Vec<Instruction>,
    n_args: usize,
    n_locs: usize,
    deps: OnceCell<Arc<DependencyPlan>>,
}

impl ExecutionGraph {
    /// Build a graph, rejecting instruction lists that break the arena rules:
    /// out-of-range locations or argument indices, a slot produced twice, an
    /// in-place write to a slot nothing produced, or a read of a slot nothing
    /// wrote earlier in the list.
    pub fn new(instrs: Vec<Instruction>, n_args: usize, n_locs: usize) -> Result<Self> {
        validate(&instrs, n_args, n_locs)?;
        Ok(Self::new_unchecked(instrs, n_args, n_locs))
    }

    /// Build a graph without validation, for compilers that already
    /// guarantee the rules `new` checks. Violations surface at run time.
    pub fn new_unchecked(instrs: Vec<Instruction>, n_args: usize, n_locs: usize) -> Self {
        Self {
            instrs,
            n_args,
            n_locs,
            deps: OnceCell::new(),
        }
    }

    pub fn instrs(&self) -> &[Instruction] {
        &self.instrs
    }

    pub fn n_args(&self) -> usize {
        self.n_args
    }

    pub fn n_locs(&self) -> usize {
        self.n_locs
    }

    pub fn n_instrs(&self) -> usize {
        self.instrs.len()
    }

    /// Dependency relation between instructions, computed on first use and
    /// shared by every interpreter built from this graph.
    pub fn dependencies(&self) -> Arc<DependencyPlan> {
        self.deps
            .get_or_init(|| Arc::new(DependencyPlan::build(&self.instrs)))
            .clone()
    }
}

fn validate(instrs: &[Instruction], n_args: usize, n_locs: usize) -> Result<()> {
    let mut producer: Vec<Option<usize>> = vec![None; n_locs];
    for (i, instr) in instrs.iter().enumerate() {
        let write = instr.write_loc();
        for loc in instr.read_locs().iter().chain(std::iter::once(&write)) {
            if loc.index() >= n_locs {
                return Err(ExecError::LocationOutOfBounds { loc: *loc, n_locs }.into());
            }
        }
        if let InstrOp::LoadArgument { index } = instr.op()
            && *index >= n_args
        {
            return Err(ExecError::ArgumentIndexOutOfRange { index: *index, n_args }.into());
        }
        for loc in instr.read_locs() {
            if producer[loc.index()].is_none() {
                return Err(ExecError::ReadBeforeWrite { loc: *loc, instr: i }.into());
            }
        }
        match (instr.produces(), producer[write.index()]) {
            (true, Some(first)) => {
                return Err(ExecError::MultipleProducers {
                    loc: write,
                    first,
                    second: i,
                }
                .into());
            }
            (true, None) => producer[write.index()] = Some(i),
            (false, None) => return Err(ExecError::InPlaceWithoutProducer { loc: write, instr: i }.into()),
            (false, Some(_)) => {}
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct SlotState {
    last_writer: Option<usize>,
    readers: Vec<usize>,
    /// Slots whose handles a tuple in this slot aliases (transitively).
    aliases: Vec<usize>,
}

/// Predecessor/successor relation over instruction indices.
///
/// Instruction B follows A when, in list order, A writes a slot B reads
/// (read-after-write), both write the same slot (write-after-write), or A
/// reads a slot B later writes in place (write-after-read). Reading a tuple
/// slot counts as reading every slot the tuple aliases, and writing a tuple
/// slot in place counts as writing each of them, so in-place writes stay
/// ordered against readers on either side of the alias.
#[derive(Debug, Clone, Default)]
pub struct DependencyPlan {
    successors: Vec<Vec<usize>>,
    n_preds: Vec<usize>,
    roots: Vec<usize>,
}

impl DependencyPlan {
    pub fn build(instrs: &[Instruction]) -> Self {
        let n = instrs.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut n_preds = vec![0usize; n];
        let mut slots: FxHashMap<usize, SlotState> = FxHashMap::default();

        for (i, instr) in instrs.iter().enumerate() {
            let write = instr.write_loc().index();

            let mut effective_reads: Vec<usize> = Vec::with_capacity(instr.read_locs().len());
            for loc in instr.read_locs() {
                effective_reads.push(loc.index());
                if let Some(state) = slots.get(&loc.index()) {
                    effective_reads.extend(state.aliases.iter().copied());
                }
            }

            // An in-place write through a tuple mutates every handle it aliases.
            let mut effective_writes = vec![write];
            if !instr.produces()
                && let Some(state) = slots.get(&write)
            {
                effective_writes.extend(state.aliases.iter().copied());
            }

            let mut preds: FxHashSet<usize> = FxHashSet::default();
            for idx in &effective_reads {
                if let Some(writer) = slots.get(idx).and_then(|s| s.last_writer) {
                    preds.insert(writer);
                }
            }
            for idx in &effective_writes {
                if let Some(state) = slots.get(idx) {
                    preds.extend(state.last_writer);
                    preds.extend(state.readers.iter().copied());
                }
            }
            preds.remove(&i);

            for idx in &effective_reads {
                slots.entry(*idx).or_default().readers.push(i);
            }
            let aliases = if matches!(instr.op(), InstrOp::BuildTup) {
                let mut aliases = effective_reads.clone();
                aliases.sort_unstable();
                aliases.dedup();
                aliases
            } else {
                Vec::new()
            };
            for idx in &effective_writes {
                let state = slots.entry(*idx).or_default();
                state.last_writer = Some(i);
                state.readers.clear();
            }
            if instr.produces() {
                slots.entry(write).or_default().aliases = aliases;
            }

            let mut preds: Vec<usize> = preds.into_iter().collect();
            preds.sort_unstable();
            n_preds[i] = preds.len();
            for p in preds {
                successors[p].push(i);
            }
        }

        let roots: Vec<usize> = (0..n).filter(|i| n_preds[*i] == 0).collect();
        debug!(
            target: "graphexec::graph",
            instrs = n,
            roots = roots.len(),
            edges = successors.iter().map(Vec::len).sum::<usize>(),
            "built dependency plan"
        );
        Self {
            successors,
            n_preds,
            roots,
        }
    }

    pub fn n_instrs(&self) -> usize {
        self.n_preds.len()
    }

    /// Instructions that become eligible once `instr` has fired.
    pub fn successors(&self, instr: usize) -> &[usize] {
        &self.successors[instr]
    }

    pub fn n_preds(&self, instr: usize) -> usize {
        self.n_preds[instr]
    }

    pub fn pred_counts(&self) -> &[usize] {
        &self.n_preds
    }

    /// Instructions with no predecessors, in list order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }
}
