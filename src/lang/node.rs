use serde::{Deserialize, Serialize};

use super::types::Type;
use super::value::Literal;

/// Arithmetic and bitwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
        }
    }
}

/// Relational and equality operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    /// The comparison that holds exactly when `self` does not.
    pub fn invert(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

/// Token kind of an AST node.
///
/// The doc of each variant lists the node's `children` layout. Names
/// (functions, variables, declarations) live in the node's `value` as
/// [`Literal::Ident`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // ─────────────────────────── Top level ──────────────────────────────
    /// One source file.
    ///
    /// Children: global declarations (`Variable`/`Decl`) and `FunctionDef`s,
    /// in source order. Anything else (prototypes) is skipped.
    TranslationUnit,

    /// Function definition; `ty` is the return type.
    ///
    /// Children: `[ParamList, DeclList, Block]`.
    FunctionDef,

    /// Function prototype. Carries no code.
    Prototype,

    /// Children: one `Decl` per parameter.
    ParamList,

    /// Children: `Variable` groups or bare `Decl`s.
    DeclList,

    /// A declaration statement naming several identifiers of one type.
    ///
    /// Children: `Decl`s.
    Variable,

    /// A single declared name; arrays carry `array_size`.
    Decl,

    // ─────────────────────────── Statements ─────────────────────────────
    /// Children: statements.
    Block,

    /// Placeholder for an omitted `for` clause or an empty statement.
    Empty,

    /// Children: `[LValue, expr]`.
    Assign,

    /// `lvalue op= expr`. Children: `[LValue, expr]`.
    CompoundAssign(BinaryOp),

    /// Children: `[]` or `[expr]`.
    Return,

    /// Children: `[cond, then]` or `[cond, then, else]`.
    If,

    /// Children: `[cond, body]`.
    While,

    /// Children: `[body, cond]`.
    DoWhile,

    /// Children: `[init, cond, step, body]`, omitted clauses are `Empty`.
    For,

    Break,

    Continue,

    // ─────────────────────────── Expressions ────────────────────────────
    /// Children: `[left, right]`.
    Binary(BinaryOp),

    /// Children: `[left, right]`.
    Compare(CompareOp),

    /// Short-circuit `&&`. Children: `[left, right]`.
    And,

    /// Short-circuit `||`. Children: `[left, right]`.
    Or,

    /// Logical `!`. Children: `[operand]`.
    Not,

    /// Unary minus. Children: `[operand]`.
    Negate,

    /// Bitwise `~`. Children: `[operand]`.
    BitNot,

    /// `++x`. Children: `[LValue]`.
    PreIncrement,

    /// `--x`. Children: `[LValue]`.
    PreDecrement,

    /// `x++`. Children: `[LValue]`.
    PostIncrement,

    /// `x--`. Children: `[LValue]`.
    PostDecrement,

    /// Children: arguments, left to right.
    Call,

    /// Conversion to `ty`. Children: `[operand]`.
    Cast,

    /// `cond ? a : b`. Children: `[cond, a, b]`.
    Ternary,

    /// A variable reference. Children: `[]` or `[index]`.
    LValue,

    IntConst,

    CharConst,

    RealConst,

    StrConst,
}

impl NodeKind {
    pub fn is_expression(self) -> bool {
        matches!(
            self,
            NodeKind::Binary(_)
                | NodeKind::Compare(_)
                | NodeKind::And
                | NodeKind::Or
                | NodeKind::Not
                | NodeKind::Negate
                | NodeKind::BitNot
                | NodeKind::PreIncrement
                | NodeKind::PreDecrement
                | NodeKind::PostIncrement
                | NodeKind::PostDecrement
                | NodeKind::Call
                | NodeKind::Cast
                | NodeKind::Ternary
                | NodeKind::LValue
                | NodeKind::IntConst
                | NodeKind::CharConst
                | NodeKind::RealConst
                | NodeKind::StrConst
                | NodeKind::Assign
                | NodeKind::CompoundAssign(_)
        )
    }
}

impl std::fmt::Display for NodeKind {
    /// Human-readable name used in IR comments and diagnostics.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::TranslationUnit => "translation unit",
            NodeKind::FunctionDef => "function definition",
            NodeKind::Prototype => "prototype",
            NodeKind::ParamList => "parameter list",
            NodeKind::DeclList => "declaration list",
            NodeKind::Variable => "variable",
            NodeKind::Decl => "declaration",
            NodeKind::Block => "block",
            NodeKind::Empty => "empty statement",
            NodeKind::Assign => "=",
            NodeKind::CompoundAssign(op) => return write!(f, "{}=", op.symbol()),
            NodeKind::Return => "return",
            NodeKind::If => "if",
            NodeKind::While => "while",
            NodeKind::DoWhile => "do",
            NodeKind::For => "for",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Binary(op) => op.symbol(),
            NodeKind::Compare(op) => op.symbol(),
            NodeKind::And => "&&",
            NodeKind::Or => "||",
            NodeKind::Not => "!",
            NodeKind::Negate => "unary -",
            NodeKind::BitNot => "~",
            NodeKind::PreIncrement => "prefix ++",
            NodeKind::PreDecrement => "prefix --",
            NodeKind::PostIncrement => "postfix ++",
            NodeKind::PostDecrement => "postfix --",
            NodeKind::Call => "function call",
            NodeKind::Cast => "cast",
            NodeKind::Ternary => "?:",
            NodeKind::LValue => "lvalue",
            NodeKind::IntConst => "int constant",
            NodeKind::CharConst => "char constant",
            NodeKind::RealConst => "real constant",
            NodeKind::StrConst => "string constant",
        };
        write!(f, "{}", name)
    }
}

/// Typed AST node, as handed over by the parser and type checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Resolved type; `Type::NONE` on structural nodes.
    pub ty: Type,
    pub children: Vec<Node>,
    pub value: Literal,
    /// 1-based source line.
    pub line: usize,
    /// Element count of an array declaration, 0 otherwise.
    pub array_size: usize,
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Node {
            kind,
            ty,
            children: Vec::new(),
            value: Literal::None,
            line: 0,
            array_size: 0,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_value(mut self, value: Literal) -> Self {
        self.value = value;
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Identifier carried by a name-bearing node.
    pub fn name(&self) -> Option<&str> {
        self.value.ident()
    }

    pub fn child(&self, i: usize) -> Option<&Node> {
        self.children.get(i)
    }

    /// True for an `Empty` placeholder.
    pub fn is_empty(&self) -> bool {
        self.kind == NodeKind::Empty
    }
}
