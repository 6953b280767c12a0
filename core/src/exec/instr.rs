use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::Serialize;

use super::{Frame, MemLocation};
use crate::val::{Array, Dtype, Obj, Object};

static NEXT_INSTR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`Instruction`]. Two instructions with the
/// same label still get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstrId(u64);

impl InstrId {
    fn next() -> Self {
        InstrId(NEXT_INSTR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstructionKind {
    LoadArgument,
    Alloc,
    BuildTup,
    ReturnByRef,
    ReturnByVal,
}

type ByRefFn = dyn Fn(&[Obj], &Obj) -> Result<()> + Send + Sync;
type ByValFn = dyn Fn(&[Obj]) -> Result<Obj> + Send + Sync;

/// Kernel that writes its result into an object that already sits in the
/// write slot.
#[derive(Clone)]
pub struct ByRefCallable {
    f: Arc<ByRefFn>,
}

impl ByRefCallable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Obj], &Obj) -> Result<()> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    #[inline]
    pub fn call(&self, reads: &[Obj], write: &Obj) -> Result<()> {
        (self.f)(reads, write)
    }
}

impl fmt::Debug for ByRefCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByRefCallable({:p})", Arc::as_ptr(&self.f))
    }
}

/// Kernel that allocates and returns a fresh result.
#[derive(Clone)]
pub struct ByValCallable {
    f: Arc<ByValFn>,
}

impl ByValCallable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Obj]) -> Result<Obj> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    #[inline]
    pub fn call(&self, reads: &[Obj]) -> Result<Obj> {
        (self.f)(reads)
    }
}

impl fmt::Debug for ByValCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByValCallable({:p})", Arc::as_ptr(&self.f))
    }
}

/// Variant-specific payload of an instruction.
#[derive(Debug, Clone)]
pub enum InstrOp {
    LoadArgument { index: usize },
    Alloc { dtype: Dtype },
    BuildTup,
    ReturnByRef { callable: ByRefCallable },
    ReturnByVal { callable: ByValCallable },
}

/// One compiled operation: reads some slots, writes exactly one.
#[derive(Debug)]
pub struct Instruction {
    id: InstrId,
    repr: String,
    provenance: i64,
    quick: bool,
    read_locs: Vec<MemLocation>,
    write_loc: MemLocation,
    op: InstrOp,
}

impl Instruction {
    fn new(
        repr: impl Into<String>,
        provenance: i64,
        quick: bool,
        read_locs: Vec<MemLocation>,
        write_loc: MemLocation,
        op: InstrOp,
    ) -> Self {
        Self {
            id: InstrId::next(),
            repr: repr.into(),
            provenance,
            quick,
            read_locs,
            write_loc,
            op,
        }
    }

    pub fn load_argument(repr: impl Into<String>, provenance: i64, index: usize, write_loc: MemLocation) -> Self {
        Self::new(repr, provenance, true, Vec::new(), write_loc, InstrOp::LoadArgument { index })
    }

    /// `shape_locs` hold one dimension each; no operands allocates a 0-d array.
    pub fn alloc(
        repr: impl Into<String>,
        provenance: i64,
        dtype: Dtype,
        shape_locs: Vec<MemLocation>,
        write_loc: MemLocation,
    ) -> Self {
        Self::new(repr, provenance, true, shape_locs, write_loc, InstrOp::Alloc { dtype })
    }

    pub fn build_tup(
        repr: impl Into<String>,
        provenance: i64,
        read_locs: Vec<MemLocation>,
        write_loc: MemLocation,
    ) -> Self {
        Self::new(repr, provenance, true, read_locs, write_loc, InstrOp::BuildTup)
    }

    pub fn return_by_ref(
        repr: impl Into<String>,
        provenance: i64,
        read_locs: Vec<MemLocation>,
        write_loc: MemLocation,
        callable: ByRefCallable,
        quick: bool,
    ) -> Self {
        Self::new(
            repr,
            provenance,
            quick,
            read_locs,
            write_loc,
            InstrOp::ReturnByRef { callable },
        )
    }

    pub fn return_by_val(
        repr: impl Into<String>,
        provenance: i64,
        read_locs: Vec<MemLocation>,
        write_loc: MemLocation,
        callable: ByValCallable,
        quick: bool,
    ) -> Self {
        Self::new(
            repr,
            provenance,
            quick,
            read_locs,
            write_loc,
            InstrOp::ReturnByVal { callable },
        )
    }

    #[inline]
    pub fn id(&self) -> InstrId {
        self.id
    }

    pub fn repr(&self) -> &str {
        &self.repr
    }

    /// Opaque tag the front end uses to map stats back to its own nodes.
    pub fn provenance(&self) -> i64 {
        self.provenance
    }

    #[inline]
    pub fn quick(&self) -> bool {
        self.quick
    }

    pub fn kind(&self) -> InstructionKind {
        match self.op {
            InstrOp::LoadArgument { .. } => InstructionKind::LoadArgument,
            InstrOp::Alloc { .. } => InstructionKind::Alloc,
            InstrOp::BuildTup => InstructionKind::BuildTup,
            InstrOp::ReturnByRef { .. } => InstructionKind::ReturnByRef,
            InstrOp::ReturnByVal { .. } => InstructionKind::ReturnByVal,
        }
    }

    pub fn op(&self) -> &InstrOp {
        &self.op
    }

    #[inline]
    pub fn read_locs(&self) -> &[MemLocation] {
        &self.read_locs
    }

    #[inline]
    pub fn write_loc(&self) -> MemLocation {
        self.write_loc
    }

    /// True for instructions that put a new handle into their write slot,
    /// as opposed to mutating the one already there.
    pub fn produces(&self) -> bool {
        !matches!(self.op, InstrOp::ReturnByRef { .. })
    }

    /// Execute the instruction against `frame`, touching only the declared
    /// read slots and the write slot.
    pub fn fire(&self, frame: &Frame) -> Result<()> {
        match &self.op {
            InstrOp::LoadArgument { index } => {
                let arg = frame.getarg(*index)?;
                frame.set(self.write_loc, arg)
            }
            InstrOp::Alloc { dtype } => {
                let mut shape = Vec::with_capacity(self.read_locs.len());
                for loc in &self.read_locs {
                    let dim = frame
                        .get(*loc)?
                        .as_dim()
                        .with_context(|| format!("`{}` shape operand {}", self.repr, loc))?;
                    shape.push(dim);
                }
                let array = Array::zeros(*dtype, &shape, self.write_loc.device());
                frame.set(self.write_loc, Object::array(array))
            }
            InstrOp::BuildTup => {
                let items = self.gather_reads(frame)?;
                frame.set(self.write_loc, Object::tuple(items))
            }
            InstrOp::ReturnByRef { callable } => {
                let reads = self.gather_reads(frame)?;
                let target = frame.get(self.write_loc)?;
                callable
                    .call(&reads, &target)
                    .with_context(|| format!("kernel `{}` failed", self.repr))
            }
            InstrOp::ReturnByVal { callable } => {
                let reads = self.gather_reads(frame)?;
                let out = callable
                    .call(&reads)
                    .with_context(|| format!("kernel `{}` failed", self.repr))?;
                frame.set(self.write_loc, out)
            }
        }
    }

    fn gather_reads(&self, frame: &Frame) -> Result<Vec<Obj>> {
        self.read_locs.iter().map(|loc| frame.get(*loc)).collect()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.write_loc, self.repr)?;
        for (i, loc) in self.read_locs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", loc)?;
        }
        f.write_str(")")
    }
}
