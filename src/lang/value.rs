use serde::{Deserialize, Serialize};

/// Literal payload carried by an AST node.
///
/// Constants carry their value, names (variables, functions, declarations)
/// carry the identifier. Structural nodes carry `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Literal {
    #[default]
    None,

    /// Integer constant.
    Int(i32),

    /// Character constant.
    Char(u8),

    /// Single-precision floating constant.
    Real(f32),

    /// String constant, without the terminating zero.
    Str(String),

    /// Identifier.
    Ident(String),
}

impl Literal {
    pub fn ident(&self) -> Option<&str> {
        match self {
            Literal::Ident(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    /// Format a literal using C surface syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::None => Ok(()),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Char(c) => write!(f, "'{}'", (*c as char).escape_default()),
            Literal::Real(x) => write!(f, "{:?}", x),
            Literal::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            Literal::Ident(name) => write!(f, "{}", name),
        }
    }
}
