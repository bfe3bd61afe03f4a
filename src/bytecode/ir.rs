use crate::bytecode::Op;

/// Function indices below this are builtins with no body.
pub const BUILTIN_COUNT: usize = 2;

pub const GETCHAR: usize = 0;
pub const PUTCHAR: usize = 1;

/// Names of the builtins, by index.
pub const BUILTINS: [&str; BUILTIN_COUNT] = ["getchar", "putchar"];

/// A slot in one of the three memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Const(u32),
    Global(u32),
    Local(u32),
}

impl Address {
    pub fn index(self) -> u32 {
        match self {
            Address::Const(n) | Address::Global(n) | Address::Local(n) => n,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Const(n) => write!(f, "C{}", n),
            Address::Global(n) => write!(f, "G{}", n),
            Address::Local(n) => write!(f, "L{}", n),
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Address(Address),
    /// Raw 32-bit word.
    Value(u32),
    /// Function index.
    Function(usize),
    /// `move` distance.
    Distance(u32),
    /// Unresolved jump target `I<n>`.
    Label(u32),
    /// Resolved jump target: instruction index within the function.
    Target(usize),
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Address(a) => write!(f, "{}", a),
            Operand::Value(v) => write!(f, "0x{:x}", v),
            Operand::Function(n) => write!(f, "{}", n),
            Operand::Distance(n) => write!(f, "{}", n),
            Operand::Label(n) => write!(f, "I{}", n),
            Operand::Target(pc) => write!(f, "{}", pc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            operand: Operand::None,
        }
    }

    pub fn with(op: Op, operand: Operand) -> Self {
        Self { op, operand }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.op),
            operand => write!(f, "{} {}", self.op, operand),
        }
    }
}

/// A loaded function. Builtins carry an empty body.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub param_slots: usize,
    pub return_slots: usize,
    pub local_slots: usize,
    pub code: Vec<Instruction>,
}

impl Function {
    pub fn builtin(index: usize) -> Self {
        let (param_slots, name) = match index {
            GETCHAR => (0, BUILTINS[GETCHAR]),
            _ => (1, BUILTINS[PUTCHAR]),
        };
        Self {
            name: name.to_string(),
            param_slots,
            return_slots: 1,
            local_slots: 0,
            code: Vec::new(),
        }
    }

    /// Parameter plus local slots.
    pub fn frame_slots(&self) -> usize {
        self.param_slots + self.local_slots
    }
}

/// A loaded program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub constants: Vec<u32>,
    pub globals: Vec<u32>,
    /// Builtins first, then user functions by index.
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(constants: Vec<u32>, global_count: usize) -> Self {
        Self {
            constants,
            globals: vec![0; global_count],
            functions: (0..BUILTIN_COUNT).map(Function::builtin).collect(),
        }
    }

    pub fn is_builtin(index: usize) -> bool {
        index < BUILTIN_COUNT
    }

    /// The lowest-numbered user function named `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.functions
            .iter()
            .enumerate()
            .skip(BUILTIN_COUNT)
            .find(|(_, f)| f.name == name)
            .map(|(i, _)| i)
    }

    pub fn entry_point(&self) -> Option<usize> {
        self.find("main")
    }
}
