//! Code generation: typed AST to stack-machine IR text, and the IR data
//! model shared with the runtime.

pub mod address_table;
pub mod branch;
pub mod compile;
pub mod compile_error;
pub mod context;
pub mod disasm;
pub mod ir;
pub mod op;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use ir::{Address, Function, Instruction, Operand, Program};
pub use op::Op;

use crate::lang::Node;

/// Generate IR text for a whole program from its translation units.
pub fn generate(units: &[Node]) -> Result<String, CompileError> {
    Compiler::new().compile_units(units)
}
