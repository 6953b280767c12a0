//! Dataflow execution engine
//!
//! A compiled [`ExecutionGraph`] is an ordered list of [`Instruction`]s over a
//! flat arena of value slots addressed by [`MemLocation`]. Interpreters fire
//! the instructions (in list order, or concurrently along the graph's
//! dependency plan) and gather the requested output slots into a tuple.

mod builder;
mod error;
mod frame;
mod graph;
mod instr;
mod interp;
mod location;

pub use builder::GraphBuilder;
pub use error::ExecError;
pub use frame::Frame;
pub use graph::{DependencyPlan, ExecutionGraph};
pub use instr::{ByRefCallable, ByValCallable, InstrId, InstrOp, Instruction, InstructionKind};
pub use interp::{Interpreter, ParallelInterpreter, SequentialInterpreter, create_interpreter};
pub use location::{Device, MemLocation};

#[cfg(test)]
mod exec_test;
