use anyhow::Result;

use super::{ByRefCallable, ByValCallable, Device, ExecutionGraph, Instruction, MemLocation};
use crate::val::Dtype;

/// Incremental helper for assembling an [`ExecutionGraph`] by hand.
///
/// Each push allocates or reuses locations and appends one instruction in
/// list order; `finish` validates the result.
#[derive(Debug)]
pub struct GraphBuilder {
    instrs: Vec<Instruction>,
    n_args: usize,
    n_locs: usize,
    next_provenance: i64,
}

impl GraphBuilder {
    pub fn new(n_args: usize) -> Self {
        Self {
            instrs: Vec::new(),
            n_args,
            n_locs: 0,
            next_provenance: 0,
        }
    }

    /// Reserve a fresh CPU slot.
    pub fn loc(&mut self) -> MemLocation {
        self.loc_on(Device::Cpu)
    }

    pub fn loc_on(&mut self, device: Device) -> MemLocation {
        let loc = MemLocation::new(self.n_locs, device);
        self.n_locs += 1;
        loc
    }

    pub fn n_instrs(&self) -> usize {
        self.instrs.len()
    }

    fn provenance(&mut self) -> i64 {
        let id = self.next_provenance;
        self.next_provenance += 1;
        id
    }

    pub fn push(&mut self, instr: Instruction) -> MemLocation {
        let loc = instr.write_loc();
        self.instrs.push(instr);
        loc
    }

    pub fn load_arg(&mut self, index: usize) -> MemLocation {
        let write = self.loc();
        let prov = self.provenance();
        self.push(Instruction::load_argument(format!("arg{}", index), prov, index, write))
    }

    pub fn alloc(&mut self, dtype: Dtype, shape: &[MemLocation]) -> MemLocation {
        let write = self.loc();
        let prov = self.provenance();
        self.push(Instruction::alloc(
            format!("alloc<{}>", dtype),
            prov,
            dtype,
            shape.to_vec(),
            write,
        ))
    }

    pub fn build_tup(&mut self, items: &[MemLocation]) -> MemLocation {
        let write = self.loc();
        let prov = self.provenance();
        self.push(Instruction::build_tup("tuple", prov, items.to_vec(), write))
    }

    /// In-place kernel writing into the existing object at `target`.
    pub fn by_ref(
        &mut self,
        repr: &str,
        reads: &[MemLocation],
        target: MemLocation,
        callable: ByRefCallable,
    ) -> MemLocation {
        let prov = self.provenance();
        self.push(Instruction::return_by_ref(
            repr,
            prov,
            reads.to_vec(),
            target,
            callable,
            false,
        ))
    }

    pub fn by_val(&mut self, repr: &str, reads: &[MemLocation], callable: ByValCallable) -> MemLocation {
        let write = self.loc();
        let prov = self.provenance();
        self.push(Instruction::return_by_val(
            repr,
            prov,
            reads.to_vec(),
            write,
            callable,
            false,
        ))
    }

    pub fn finish(self) -> Result<ExecutionGraph> {
        ExecutionGraph::new(self.instrs, self.n_args, self.n_locs)
    }
}
