use thiserror::Error;

/// Malformed IR text. `line` is the 1-based line of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error line {line}: {message}")]
pub struct LoadError {
    pub line: usize,
    pub message: String,
}

impl LoadError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}
