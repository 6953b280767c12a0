use std::fmt;

use super::MemLocation;

/// Contract and invariant failures raised by graph construction and by
/// interpreter runs. Kernel failures are not wrapped here; they travel as
/// the kernel's own `anyhow::Error` with the failing instruction attached as
/// context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    ArgumentCountMismatch { expected: usize, got: usize },
    ArgumentIndexOutOfRange { index: usize, n_args: usize },
    UndefinedRead { loc: MemLocation },
    SlotRewritten { loc: MemLocation },
    LocationOutOfBounds { loc: MemLocation, n_locs: usize },
    MultipleProducers { loc: MemLocation, first: usize, second: usize },
    InPlaceWithoutProducer { loc: MemLocation, instr: usize },
    ReadBeforeWrite { loc: MemLocation, instr: usize },
    InvalidShape { reason: String },
    Poisoned,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::ArgumentCountMismatch { expected, got } => {
                write!(f, "graph expects {} arguments, got {}", expected, got)
            }
            ExecError::ArgumentIndexOutOfRange { index, n_args } => {
                write!(f, "argument index {} out of range for {} arguments", index, n_args)
            }
            ExecError::UndefinedRead { loc } => write!(f, "read of unwritten location {}", loc),
            ExecError::SlotRewritten { loc } => write!(f, "location {} written twice in one run", loc),
            ExecError::LocationOutOfBounds { loc, n_locs } => {
                write!(f, "location {} outside arena of {} slots", loc, n_locs)
            }
            ExecError::MultipleProducers { loc, first, second } => write!(
                f,
                "location {} produced by instruction {} and again by instruction {}",
                loc, first, second
            ),
            ExecError::InPlaceWithoutProducer { loc, instr } => write!(
                f,
                "instruction {} writes {} in place but nothing produced it earlier",
                instr, loc
            ),
            ExecError::ReadBeforeWrite { loc, instr } => {
                write!(f, "instruction {} reads {} before any instruction writes it", instr, loc)
            }
            ExecError::InvalidShape { reason } => write!(f, "invalid shape operand: {}", reason),
            ExecError::Poisoned => write!(f, "interpreter is unusable after a failed run"),
        }
    }
}

impl std::error::Error for ExecError {}
