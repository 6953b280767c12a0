pub mod config;
pub mod exec;
pub mod perf;
pub mod profile;
pub mod val;

pub use config::InterpreterConfig;
pub use exec::{
    ExecError, ExecutionGraph, GraphBuilder, Instruction, Interpreter, MemLocation, create_interpreter,
};
pub use profile::{InstructionStats, NativeProfiler};
pub use val::{Obj, Object, Tuple};
