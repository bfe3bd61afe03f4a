use thiserror::Error;

use crate::bytecode::CompileError;
use crate::runtime::{LoadError, RuntimeError};

/// Any failure of a generate, load or run step.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("cannot decode AST: {0}")]
    Decode(#[from] postcard::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit status the command-line tools report this error with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Runtime(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
