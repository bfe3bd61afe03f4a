use std::collections::HashMap;
use std::sync::LazyLock;

use crate::lang::{CompareOp, Prim};

// =============================================================================
// OP - Stack machine instructions
// =============================================================================

/// Instruction opcode. Typed variants carry the word interpretation chosen
/// by their mnemonic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // memory
    /// `push A` ( -- word )
    Push,
    /// `ptrto A` ( -- ptr )
    PtrTo,
    /// `pushv 0x..` ( -- value )
    PushV,
    /// `push<t>[]` ( index base -- element )
    PushIndexed(Prim),
    /// `pop A` ( word -- )
    Pop,
    /// `pop<t>[]` ( index base value -- )
    PopIndexed(Prim),

    // stack shuffling
    /// ( a -- a a )
    Copy,
    /// `move n`: move the top word down `n` positions.
    Move,
    /// ( a -- )
    PopX,

    // calls
    Call,
    Ret,

    // in-place unary ops on the top word
    Inc(Prim),
    Dec(Prim),
    Neg(Prim),

    // unary ops
    /// Bitwise not.
    Flip,
    /// int -> float
    ConvIf,
    /// float -> int
    ConvFi,

    // binary arithmetic ( a b -- a?b )
    Add(Prim),
    Sub(Prim),
    Mul(Prim),
    Div(Prim),
    /// No float form.
    Mod(Prim),
    And,
    Or,

    // ==========================================================================
    // Jumps (operand: label in IR text, instruction index once loaded)
    // ==========================================================================
    Goto,
    /// ( a -- ) jump if a == 0
    IfZero(Prim),
    /// ( a -- ) jump if a != 0
    IfNonZero(Prim),
    /// ( a b -- ) jump if `a cmp b`
    Branch(CompareOp, Prim),
}

/// The operand an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Address,
    Value,
    Function,
    Distance,
    Label,
}

impl Op {
    /// Every opcode, each exactly once.
    pub fn all() -> Vec<Op> {
        let mut ops = vec![
            Op::Push,
            Op::PtrTo,
            Op::PushV,
            Op::Pop,
            Op::Copy,
            Op::Move,
            Op::PopX,
            Op::Call,
            Op::Ret,
            Op::Flip,
            Op::ConvIf,
            Op::ConvFi,
            Op::And,
            Op::Or,
            Op::Goto,
        ];
        for p in Prim::ALL {
            ops.extend([
                Op::PushIndexed(p),
                Op::PopIndexed(p),
                Op::Inc(p),
                Op::Dec(p),
                Op::Neg(p),
                Op::Add(p),
                Op::Sub(p),
                Op::Mul(p),
                Op::Div(p),
                Op::IfZero(p),
                Op::IfNonZero(p),
            ]);
            if !p.is_float() {
                ops.push(Op::Mod(p));
            }
            ops.extend(CompareOp::ALL.map(|c| Op::Branch(c, p)));
        }
        ops
    }

    pub fn mnemonic(self) -> String {
        match self {
            Op::Push => "push".into(),
            Op::PtrTo => "ptrto".into(),
            Op::PushV => "pushv".into(),
            Op::PushIndexed(p) => format!("push{}[]", p.suffix()),
            Op::Pop => "pop".into(),
            Op::PopIndexed(p) => format!("pop{}[]", p.suffix()),
            Op::Copy => "copy".into(),
            Op::Move => "move".into(),
            Op::PopX => "popx".into(),
            Op::Call => "call".into(),
            Op::Ret => "ret".into(),
            Op::Inc(p) => format!("++{}", p.suffix()),
            Op::Dec(p) => format!("--{}", p.suffix()),
            Op::Neg(p) => format!("neg{}", p.suffix()),
            Op::Flip => "flip".into(),
            Op::ConvIf => "convif".into(),
            Op::ConvFi => "convfi".into(),
            Op::Add(p) => format!("+{}", p.suffix()),
            Op::Sub(p) => format!("-{}", p.suffix()),
            Op::Mul(p) => format!("*{}", p.suffix()),
            Op::Div(p) => format!("/{}", p.suffix()),
            Op::Mod(p) => format!("%{}", p.suffix()),
            Op::And => "&".into(),
            Op::Or => "|".into(),
            Op::Goto => "goto".into(),
            Op::IfZero(p) => format!("==0{}", p.suffix()),
            Op::IfNonZero(p) => format!("!=0{}", p.suffix()),
            Op::Branch(c, p) => format!("{}{}", c.symbol(), p.suffix()),
        }
    }

    /// Look up an opcode by mnemonic.
    pub fn from_mnemonic(s: &str) -> Option<Op> {
        MNEMONICS.get(s).copied()
    }

    pub fn operand_kind(self) -> OperandKind {
        match self {
            Op::Push | Op::PtrTo | Op::Pop => OperandKind::Address,
            Op::PushV => OperandKind::Value,
            Op::Call => OperandKind::Function,
            Op::Move => OperandKind::Distance,
            Op::Goto | Op::IfZero(_) | Op::IfNonZero(_) | Op::Branch(..) => OperandKind::Label,
            _ => OperandKind::None,
        }
    }

    pub fn is_jump(self) -> bool {
        self.operand_kind() == OperandKind::Label
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

static MNEMONICS: LazyLock<HashMap<String, Op>> =
    LazyLock::new(|| Op::all().into_iter().map(|op| (op.mnemonic(), op)).collect());
