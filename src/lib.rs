//! Back half of a small C compiler: typed AST to stack-machine IR text, and
//! a virtual machine that loads and runs that IR.

pub mod bytecode;
pub mod error;
pub mod lang;
pub mod logging;
pub mod runtime;

pub use error::{Error, Result};

use runtime::{Vm, VmConfig};
use std::io::{Read, Write};

/// Generate, load and run `units`, returning what `main` returned.
pub fn compile_and_run<R: Read, W: Write>(
    units: &[lang::Node],
    config: VmConfig,
    input: R,
    output: W,
) -> Result<(i32, W)> {
    let ir = bytecode::generate(units)?;
    let program = runtime::load(&ir)?;
    let entry = program
        .entry_point()
        .ok_or_else(|| runtime::RuntimeError::new("no function named main to execute"))?;
    let mut vm = Vm::with_io(config, input, output);
    let value = vm.run(&program, entry)?;
    Ok((value as i32, vm.into_output()))
}
