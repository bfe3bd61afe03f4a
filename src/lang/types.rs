use serde::{Deserialize, Serialize};

/// Resolved type of an AST node, as a bitmask.
///
/// The low bits name the primitive (`INT`, `FLOAT`, `VOID`, `CHAR`), `ARRAY`
/// marks an array (or pointer-decayed array parameter) of that primitive, and
/// the two top bits carry the storage class, which code generation ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Type(u32);

impl Type {
    pub const NONE: Type = Type(0);
    pub const INT: Type = Type(0x01);
    pub const FLOAT: Type = Type(0x02);
    pub const VOID: Type = Type(0x04);
    pub const CHAR: Type = Type(0x08);
    pub const ARRAY: Type = Type(0x10);

    pub const STATIC: Type = Type(0x8000_0000);
    pub const EXTERN: Type = Type(0x4000_0000);

    const TYPE_MASK: u32 = 0x3FFF_FFFF;

    pub const fn from_bits(bits: u32) -> Self {
        Type(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The array-of-`self` type.
    pub const fn array(self) -> Self {
        Type(self.0 | Self::ARRAY.0)
    }

    pub const fn is_array(self) -> bool {
        self.0 & Self::ARRAY.0 != 0
    }

    pub const fn is_void(self) -> bool {
        self.element().0 == Self::VOID.0
    }

    /// Strip the array flag and storage class.
    pub const fn element(self) -> Self {
        Type(self.0 & Self::TYPE_MASK & !Self::ARRAY.0)
    }

    /// The primitive an instruction operating on this type works with.
    pub fn prim(self) -> Option<Prim> {
        match self.element() {
            Type::INT => Some(Prim::Int),
            Type::FLOAT => Some(Prim::Float),
            Type::CHAR => Some(Prim::Char),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.element() {
            Type::INT => "int",
            Type::FLOAT => "float",
            Type::CHAR => "char",
            Type::VOID => "void",
            _ => "<untyped>",
        };
        write!(f, "{}", name)?;
        if self.is_array() {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Word interpretation selected by an instruction's type suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Char,
    Int,
    Float,
}

impl Prim {
    pub const ALL: [Prim; 3] = [Prim::Char, Prim::Int, Prim::Float];

    /// Mnemonic suffix: `c`, `i` or `f`.
    pub fn suffix(self) -> char {
        match self {
            Prim::Char => 'c',
            Prim::Int => 'i',
            Prim::Float => 'f',
        }
    }

    pub fn is_float(self) -> bool {
        self == Prim::Float
    }
}
