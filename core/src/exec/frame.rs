use std::sync::OnceLock;

use anyhow::Result;

use super::{ExecError, MemLocation};
use crate::val::{Obj, Tuple};

/// Per-interpreter arena: one slot per location index plus the arguments of
/// the run in progress.
///
/// Each slot is produced at most once per run, so slots are write-once cells
/// and workers on different threads can fill distinct slots without locking.
/// In-place kernels mutate the object inside a slot, never the slot itself.
#[derive(Debug)]
pub struct Frame {
    slots: Vec<OnceLock<Obj>>,
    args: Tuple,
}

impl Frame {
    pub fn new(n_locs: usize) -> Self {
        Self {
            slots: (0..n_locs).map(|_| OnceLock::new()).collect(),
            args: Tuple::empty(),
        }
    }

    pub fn n_locs(&self) -> usize {
        self.slots.len()
    }

    /// Release everything held from the previous run and install `args`.
    pub fn reset(&mut self, args: Tuple) {
        for slot in &mut self.slots {
            slot.take();
        }
        self.args = args;
    }

    /// Drop the argument tuple; slots keep their handles until the next reset.
    pub fn clear_args(&mut self) {
        self.args = Tuple::empty();
    }

    pub fn get(&self, loc: MemLocation) -> Result<Obj> {
        let slot = self.slot(loc)?;
        match slot.get() {
            Some(obj) => Ok(obj.clone()),
            None => Err(ExecError::UndefinedRead { loc }.into()),
        }
    }

    pub fn set(&self, loc: MemLocation, obj: Obj) -> Result<()> {
        self.slot(loc)?
            .set(obj)
            .map_err(|_| ExecError::SlotRewritten { loc }.into())
    }

    pub fn getarg(&self, index: usize) -> Result<Obj> {
        self.args.get(index).cloned().ok_or_else(|| {
            ExecError::ArgumentIndexOutOfRange {
                index,
                n_args: self.args.len(),
            }
            .into()
        })
    }

    fn slot(&self, loc: MemLocation) -> Result<&OnceLock<Obj>> {
        self.slots.get(loc.index()).ok_or_else(|| {
            ExecError::LocationOutOfBounds {
                loc,
                n_locs: self.slots.len(),
            }
            .into()
        })
    }
}
