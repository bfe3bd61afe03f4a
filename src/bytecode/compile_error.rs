use thiserror::Error;

use crate::lang::{Node, NodeKind};

/// Code generation failure. Always fatal for the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A node the generator has no lowering rule for in this position.
    #[error("line {line}: cannot generate code for {kind}{}", hint_suffix(.hint))]
    UnhandledNode {
        kind: String,
        line: usize,
        hint: Option<String>,
    },

    /// `break` or `continue` with no enclosing loop.
    #[error("line {line}: {keyword} outside of a loop")]
    OutsideLoop { keyword: String, line: usize },

    #[error("line {line}: unknown identifier '{name}'")]
    UnknownIdentifier { name: String, line: usize },

    #[error("line {line}: unknown function '{name}'")]
    UnknownFunction { name: String, line: usize },

    /// `%` or `%=` with float operands.
    #[error("line {line}: operator % is not defined on float")]
    FloatModulo { line: usize },

    #[error("line {line}: malformed {kind}: {reason}")]
    Malformed {
        kind: String,
        line: usize,
        reason: String,
    },
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\n  hint: {}", h),
        None => String::new(),
    }
}

impl CompileError {
    pub fn unhandled(node: &Node) -> Self {
        CompileError::UnhandledNode {
            kind: node.kind.to_string(),
            line: node.line,
            hint: None,
        }
    }

    pub fn unhandled_with_hint(node: &Node, hint: impl Into<String>) -> Self {
        CompileError::UnhandledNode {
            kind: node.kind.to_string(),
            line: node.line,
            hint: Some(hint.into()),
        }
    }

    pub fn outside_loop(node: &Node) -> Self {
        let keyword = match node.kind {
            NodeKind::Continue => "continue",
            _ => "break",
        };
        CompileError::OutsideLoop {
            keyword: keyword.to_string(),
            line: node.line,
        }
    }

    pub fn unknown_identifier(name: &str, line: usize) -> Self {
        CompileError::UnknownIdentifier {
            name: name.to_string(),
            line,
        }
    }

    pub fn unknown_function(name: &str, line: usize) -> Self {
        CompileError::UnknownFunction {
            name: name.to_string(),
            line,
        }
    }

    pub fn float_modulo(node: &Node) -> Self {
        CompileError::FloatModulo { line: node.line }
    }

    pub fn malformed(node: &Node, reason: impl Into<String>) -> Self {
        CompileError::Malformed {
            kind: node.kind.to_string(),
            line: node.line,
            reason: reason.into(),
        }
    }
}
