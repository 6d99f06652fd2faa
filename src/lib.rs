// Instruction set
pub mod isa;
pub mod instruction;
pub use instruction::Instruction;

// Assembling
pub mod span;
pub mod symbol;
pub mod error;
pub use error::{AssemblyError, AssemblyErrors};
pub mod assembler;
pub use assembler::assemble;
pub mod program;
pub use program::Program;

// Running
pub mod state;
pub mod io;
pub mod engine;
pub mod driver;
pub use driver::{Driver, Snapshot, Status};
mod runtime;
pub use runtime::RunEnvironment;
mod debugger;
pub use debugger::DebuggerOptions;
#[macro_use]
pub mod output;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
