//! Loading and executing IR text.

pub mod load_error;
pub mod loader;
pub mod memory;
pub mod runtime_error;
pub mod scanner;
pub mod vm;

pub use load_error::LoadError;
pub use loader::load;
pub use runtime_error::RuntimeError;
pub use vm::{Vm, VmConfig};
