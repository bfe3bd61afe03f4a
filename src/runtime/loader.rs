//! IR text to [`Program`].
//!
//! The loader is the only place operands are validated: addresses are
//! checked against their segment, labels are resolved to instruction
//! indices within their function, and function indices must be dense.
//! Loading stops at the first error.

use std::collections::HashMap;

use tracing::debug;

use crate::bytecode::{
    Op,
    ir::{Address, BUILTIN_COUNT, Function, Instruction, Operand, Program},
    op::OperandKind,
};
use crate::runtime::{
    load_error::LoadError,
    scanner::{Scanner, Token},
};

/// Largest count any header or `.FUNC` directive may declare; the
/// machine's arena holds this many words.
pub const MAX_COUNT: usize = 65_536;

/// Parse and resolve IR text.
pub fn load(source: &str) -> Result<Program, LoadError> {
    Loader {
        scanner: Scanner::new(source),
    }
    .program()
}

struct Loader<'a> {
    scanner: Scanner<'a>,
}

/// A jump operand waiting for its label.
struct PendingJump {
    pc: usize,
    label: u32,
    line: usize,
}

impl<'a> Loader<'a> {
    fn program(mut self) -> Result<Program, LoadError> {
        self.keyword(".CONSTANTS")?;
        let count = self.count("constants")?;
        let mut constants = Vec::new();
        for _ in 0..count {
            constants.push(self.word()?);
        }

        self.keyword(".GLOBALS")?;
        let globals = self.count("globals")?;
        let mut program = Program::new(constants, globals);

        self.keyword(".FUNCTIONS")?;
        let count = self.count("functions")?;
        let mut slots: Vec<Option<Function>> = vec![None; count];
        for _ in 0..count {
            let line = self.scanner.line();
            let (index, function) = self.function(&program)?;
            let slot = index
                .checked_sub(BUILTIN_COUNT)
                .and_then(|k| slots.get_mut(k))
                .ok_or_else(|| {
                    LoadError::new(
                        line,
                        format!(
                            "function index {} out of range {}..{}",
                            index,
                            BUILTIN_COUNT,
                            BUILTIN_COUNT + count
                        ),
                    )
                })?;
            if slot.is_some() {
                return Err(LoadError::new(line, format!("function {} defined twice", index)));
            }
            *slot = Some(function);
        }

        if let Some(token) = self.scanner.peek() {
            return Err(LoadError::new(
                token.line,
                format!("unexpected '{}' after the last function", token.text),
            ));
        }

        // count blocks, each index unique and in range: every slot is filled
        program.functions.extend(slots.into_iter().flatten());
        Ok(program)
    }

    fn function(&mut self, program: &Program) -> Result<(usize, Function), LoadError> {
        self.keyword(".FUNC")?;
        let index = self.number()?;
        let name = self.expect_token("function name")?.text.to_string();

        self.keyword(".params")?;
        let param_slots = self.count("parameter slots")?;
        self.keyword(".return")?;
        let line = self.scanner.line();
        let return_slots = self.number()?;
        if return_slots > 1 {
            return Err(LoadError::new(
                line,
                format!(".return must be 0 or 1, found {}", return_slots),
            ));
        }
        self.keyword(".locals")?;
        let local_slots = self.count("local slots")?;

        let mut function = Function {
            name,
            param_slots,
            return_slots,
            local_slots,
            code: Vec::new(),
        };
        let mut labels: HashMap<u32, usize> = HashMap::new();
        let mut pending: Vec<PendingJump> = Vec::new();

        loop {
            let token = self.expect_token("an instruction or '.end'")?;
            if token.text == ".end" {
                self.keyword("FUNC")?;
                break;
            }

            if let Some(label) = token.text.strip_suffix(':') {
                let label = parse_label(label).ok_or_else(|| {
                    LoadError::new(token.line, format!("bad label definition '{}'", token.text))
                })?;
                if labels.insert(label, function.code.len()).is_some() {
                    return Err(LoadError::new(token.line, format!("duplicate label I{}", label)));
                }
                continue;
            }

            let mnemonic = if token.text.bytes().all(|b| b.is_ascii_digit()) {
                let position: usize = parse_decimal(token)?;
                if position != function.code.len() {
                    return Err(LoadError::new(
                        token.line,
                        format!(
                            "instruction index {} does not match position {}",
                            position,
                            function.code.len()
                        ),
                    ));
                }
                self.expect_token("an instruction")?
            } else {
                token
            };

            let op = Op::from_mnemonic(mnemonic.text).ok_or_else(|| {
                LoadError::new(mnemonic.line, format!("unknown instruction {}", mnemonic.text))
            })?;
            let operand = self.operand(op, program, &function, &mut pending)?;
            function.code.push(Instruction::with(op, operand));
        }

        for jump in pending {
            let target = *labels.get(&jump.label).ok_or_else(|| {
                LoadError::new(jump.line, format!("label I{} not found in this function", jump.label))
            })?;
            if target >= function.code.len() {
                return Err(LoadError::new(
                    jump.line,
                    format!("label I{} is past the end of function {}", jump.label, function.name),
                ));
            }
            function.code[jump.pc].operand = Operand::Target(target);
        }

        debug!(
            function = %function.name,
            index,
            instructions = function.code.len(),
            "loaded function"
        );
        Ok((index, function))
    }

    fn operand(
        &mut self,
        op: Op,
        program: &Program,
        function: &Function,
        pending: &mut Vec<PendingJump>,
    ) -> Result<Operand, LoadError> {
        let kind = op.operand_kind();
        if kind == OperandKind::None {
            return Ok(Operand::None);
        }
        let token = self.expect_token(&format!("an operand for {}", op))?;
        let operand = match kind {
            OperandKind::None => Operand::None,
            OperandKind::Address => {
                let address = parse_address(token.text).ok_or_else(|| {
                    LoadError::new(token.line, format!("bad address '{}'", token.text))
                })?;
                check_address(address, op, program, function)
                    .map_err(|message| LoadError::new(token.line, message))?;
                Operand::Address(address)
            }
            OperandKind::Value => Operand::Value(parse_value(token)?),
            OperandKind::Function => Operand::Function(parse_decimal(token)?),
            OperandKind::Distance => Operand::Distance(parse_decimal(token)?),
            OperandKind::Label => {
                let label = parse_label(token.text).ok_or_else(|| {
                    LoadError::new(token.line, format!("bad label '{}'", token.text))
                })?;
                pending.push(PendingJump {
                    pc: function.code.len(),
                    label,
                    line: token.line,
                });
                Operand::Label(label)
            }
        };
        Ok(operand)
    }

    // ─────────────────────────── Tokens ────────────────────────────────

    fn expect_token(&mut self, what: &str) -> Result<Token<'a>, LoadError> {
        let line = self.scanner.line();
        self.scanner
            .next_token()
            .ok_or_else(|| LoadError::new(line, format!("expected {}, found end of input", what)))
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), LoadError> {
        let token = self.expect_token(&format!("'{}'", keyword))?;
        if token.text == keyword {
            Ok(())
        } else {
            Err(LoadError::new(
                token.line,
                format!("expected '{}', found '{}'", keyword, token.text),
            ))
        }
    }

    fn number(&mut self) -> Result<usize, LoadError> {
        let token = self.expect_token("a number")?;
        parse_decimal(token)
    }

    /// A number bounded by [`MAX_COUNT`].
    fn count(&mut self, what: &str) -> Result<usize, LoadError> {
        let token = self.expect_token("a number")?;
        let n: usize = parse_decimal(token)?;
        if n > MAX_COUNT {
            return Err(LoadError::new(
                token.line,
                format!("{} {} exceeds the limit of {}", n, what, MAX_COUNT),
            ));
        }
        Ok(n)
    }

    /// A constant word: hex digits with an optional `0x`.
    fn word(&mut self) -> Result<u32, LoadError> {
        let token = self.expect_token("a constant word")?;
        let digits = token
            .text
            .strip_prefix("0x")
            .or_else(|| token.text.strip_prefix("0X"))
            .unwrap_or(token.text);
        u32::from_str_radix(digits, 16)
            .map_err(|_| LoadError::new(token.line, format!("bad constant word '{}'", token.text)))
    }
}

fn parse_decimal<T: std::str::FromStr>(token: Token<'_>) -> Result<T, LoadError> {
    token
        .text
        .parse()
        .map_err(|_| LoadError::new(token.line, format!("expected a number, found '{}'", token.text)))
}

/// `0x` hex, or a signed decimal.
fn parse_value(token: Token<'_>) -> Result<u32, LoadError> {
    let parsed = match token.text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.text.parse::<i32>().ok().map(|n| n as u32),
    };
    parsed.ok_or_else(|| LoadError::new(token.line, format!("bad immediate value '{}'", token.text)))
}

fn parse_address(text: &str) -> Option<Address> {
    let (segment, digits) = text.split_at_checked(1)?;
    let n: u32 = digits.parse().ok()?;
    match segment {
        "C" => Some(Address::Const(n)),
        "G" => Some(Address::Global(n)),
        "L" => Some(Address::Local(n)),
        _ => None,
    }
}

fn parse_label(text: &str) -> Option<u32> {
    text.strip_prefix('I')?.parse().ok()
}

fn check_address(address: Address, op: Op, program: &Program, function: &Function) -> Result<(), String> {
    let (n, bound) = match address {
        Address::Const(_) if op == Op::Pop => {
            return Err("target of pop cannot be a constant".to_string());
        }
        Address::Const(n) => (n, program.constants.len()),
        Address::Global(n) => (n, program.globals.len()),
        Address::Local(n) => (n, function.frame_slots()),
    };
    if (n as usize) < bound {
        Ok(())
    } else {
        Err(format!("address {} out of range", address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{CompareOp, Prim};

    const ADD: &str = "\
.CONSTANTS 1
  0x00006968
.GLOBALS 1
.FUNCTIONS 2

.FUNC 3 main
  .params 0
  .return 1
  .locals 0
    0 pushv 0x2
    1 pushv 0x3
    2 call 2
    3 ret
.end FUNC

.FUNC 2 add
  .params 2
  .return 1
  .locals 0
    ; return on line 1
    0 push L0
    1 push L1
    2 +i
    3 ret
.end FUNC
";

    fn load_err(text: &str) -> LoadError {
        load(text).unwrap_err()
    }

    /// Wrap a body in a single-function program with `locals` slots.
    fn with_body(locals: usize, body: &str) -> String {
        format!(
            ".CONSTANTS 1\n0x0\n.GLOBALS 1\n.FUNCTIONS 1\n.FUNC 2 main\n.params 0\n.return 1\n.locals {}\n{}\n.end FUNC\n",
            locals, body
        )
    }

    #[test]
    fn test_load_orders_functions_by_index() {
        let program = load(ADD).unwrap();
        assert_eq!(program.constants, vec![0x6968]);
        assert_eq!(program.globals, vec![0]);
        assert_eq!(program.functions.len(), 4);
        assert_eq!(program.functions[2].name, "add");
        assert_eq!(program.functions[2].param_slots, 2);
        assert_eq!(program.functions[3].name, "main");
        assert_eq!(program.entry_point(), Some(3));
        assert_eq!(
            program.functions[2].code[2],
            Instruction::new(Op::Add(Prim::Int))
        );
    }

    #[test]
    fn test_oversized_counts_are_rejected() {
        let err = load_err(".CONSTANTS 0\n.GLOBALS 18446744073709551615\n.FUNCTIONS 0\n");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("globals exceeds the limit of 65536"), "{}", err);

        let err = load_err(".CONSTANTS 0\n.GLOBALS 0\n.FUNCTIONS 18446744073709551615\n");
        assert_eq!(err.line, 3);
        assert!(err.message.contains("functions"));

        let err = load_err(".CONSTANTS 4000000000\n");
        assert_eq!(err.line, 1);

        let err = load_err(".CONSTANTS 0\n.GLOBALS 0\n.FUNCTIONS 1\n.FUNC 2 f\n.params 0\n.return 0\n.locals 99999999999\nret\n.end FUNC\n");
        assert_eq!(err.line, 7);
        assert!(err.message.contains("local slots"));
    }

    #[test]
    fn test_count_at_the_limit_loads() {
        let program = load(".CONSTANTS 0\n.GLOBALS 65536\n.FUNCTIONS 0\n").unwrap();
        assert_eq!(program.globals.len(), MAX_COUNT);
    }

    #[test]
    fn test_labels_resolve_to_instruction_indices() {
        let program = load(&with_body(
            1,
            "I4:\n push L0\n ==0i I7\n goto I4\nI7:\n pushv 0x1\n ret",
        ))
        .unwrap();
        let code = &program.functions[2].code;
        assert_eq!(code[1].operand, Operand::Target(3));
        assert_eq!(code[2].operand, Operand::Target(0));
    }

    #[test]
    fn test_instruction_index_is_optional() {
        let program = load(&with_body(0, "pushv 1\n1 <f I0\nI0:\nret")).unwrap();
        let code = &program.functions[2].code;
        assert_eq!(code[0].operand, Operand::Value(1));
        assert_eq!(code[1].op, Op::Branch(CompareOp::Lt, Prim::Float));
    }

    #[test]
    fn test_negative_decimal_immediate() {
        let program = load(&with_body(0, "pushv -1\nret")).unwrap();
        assert_eq!(program.functions[2].code[0].operand, Operand::Value(u32::MAX));
    }

    #[test]
    fn test_undefined_label() {
        let err = load_err(&with_body(0, "goto I9\nret"));
        assert_eq!(err, LoadError::new(9, "label I9 not found in this function"));
    }

    #[test]
    fn test_label_past_end() {
        let err = load_err(&with_body(0, "goto I1\nret\nI1:"));
        assert_eq!(err.line, 9);
        assert!(err.message.contains("past the end"));
    }

    #[test]
    fn test_duplicate_label() {
        let err = load_err(&with_body(0, "I1:\nI1:\nret"));
        assert_eq!(err, LoadError::new(10, "duplicate label I1"));
    }

    #[test]
    fn test_labels_are_scoped_to_their_function() {
        let text = "\
.CONSTANTS 0
.GLOBALS 0
.FUNCTIONS 2
.FUNC 2 a
.params 0
.return 0
.locals 0
I0:
ret
.end FUNC
.FUNC 3 b
.params 0
.return 0
.locals 0
goto I0
ret
.end FUNC
";
        let err = load_err(text);
        assert_eq!(err, LoadError::new(15, "label I0 not found in this function"));
    }

    #[test]
    fn test_unknown_instruction() {
        let err = load_err(&with_body(0, "%f\nret"));
        assert_eq!(err.to_string(), "Error line 9: unknown instruction %f");
    }

    #[test]
    fn test_address_bounds() {
        assert_eq!(load_err(&with_body(2, "push L2\nret")).message, "address L2 out of range");
        assert_eq!(load_err(&with_body(0, "push G1\nret")).message, "address G1 out of range");
        assert_eq!(load_err(&with_body(0, "ptrto C1\nret")).message, "address C1 out of range");
        assert!(load(&with_body(2, "push L1\nptrto C0\npop G0\nret")).is_ok());
    }

    #[test]
    fn test_pop_into_constant() {
        let err = load_err(&with_body(0, "pushv 0x1\npop C0\nret"));
        assert_eq!(err, LoadError::new(10, "target of pop cannot be a constant"));
    }

    #[test]
    fn test_return_count_must_be_0_or_1() {
        let err = load_err(&ADD.replacen(".return 1", ".return 2", 1));
        assert_eq!(err.line, 8);
        assert!(err.message.contains(".return must be 0 or 1"));
    }

    #[test]
    fn test_instruction_index_must_match() {
        let err = load_err(&with_body(0, "0 pushv 0x1\n2 ret"));
        assert_eq!(err.line, 10);
        assert!(err.message.contains("does not match position 1"));
    }

    #[test]
    fn test_function_index_range_and_reuse() {
        let err = load_err(&ADD.replacen(".FUNC 3 main", ".FUNC 4 main", 1));
        assert_eq!(err.line, 6);
        assert!(err.message.contains("out of range 2..4"));

        let err = load_err(&ADD.replacen(".FUNC 3 main", ".FUNC 2 main", 1));
        assert_eq!(err.line, 16);
        assert_eq!(err.message, "function 2 defined twice");
    }

    #[test]
    fn test_trailing_tokens() {
        let err = load_err(&format!("{}extra\n", ADD));
        assert!(err.message.contains("unexpected 'extra'"));
    }

    #[test]
    fn test_truncated_input() {
        let err = load_err(".CONSTANTS 0\n.GLOBALS 0\n.FUNCTIONS 1\n.FUNC 2 main\n");
        assert_eq!(err.line, 4);
        assert!(err.message.contains("found end of input"));
    }

    #[test]
    fn test_keywords_are_exact() {
        let err = load_err(".constants 0\n");
        assert_eq!(err, LoadError::new(1, "expected '.CONSTANTS', found '.constants'"));
    }
}
