use std::io::{self, Read, Write};

use tracing::trace;

use crate::bytecode::{
    Op,
    ir::{Address, GETCHAR, Instruction, Operand, PUTCHAR, Program},
};
use crate::lang::Prim;
use crate::runtime::{
    memory::{Memory, Segment},
    runtime_error::{
        RuntimeError, call_depth_exceeded, division_by_zero, io_error, modulo_by_zero,
        no_such_function, ran_past_end, stack_overflow, stack_underflow, unresolved_jump,
    },
};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    /// Operand stack capacity, in words, shared by all frames.
    pub stack_words: usize,
    /// Size of the locals region frames are carved from.
    pub memory_words: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            stack_words: 65_536,
            memory_words: 65_536,
        }
    }
}

/// Executes a loaded [`Program`]. `getchar` reads from `R`, `putchar`
/// writes to `W`.
pub struct Vm<R = io::Stdin, W = io::Stdout> {
    config: VmConfig,
    stack: Vec<u32>,
    call_depth: usize,
    input: R,
    output: W,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_io(config, io::stdin(), io::stdout())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read, W: Write> Vm<R, W> {
    pub fn with_io(config: VmConfig, input: R, output: W) -> Self {
        Self {
            stack: Vec::with_capacity(config.stack_words.min(4096)),
            config,
            call_depth: 0,
            input,
            output,
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Call function `entry` with an empty stack and return the word it
    /// leaves behind.
    pub fn run(&mut self, program: &Program, entry: usize) -> Result<u32, RuntimeError> {
        self.stack.clear();
        self.call_depth = 0;
        let mut memory = Memory::new(&program.constants, &program.globals, self.config.memory_words);

        let result = self.call(program, &mut memory, entry, 0);
        self.output.flush().map_err(io_error)?;
        result?;

        let name = program
            .functions
            .get(entry)
            .map_or("<unknown>", |f| f.name.as_str());
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new(&format!("function {} returned no value", name)))
    }

    fn call(
        &mut self,
        program: &Program,
        memory: &mut Memory,
        index: usize,
        caller_floor: usize,
    ) -> Result<(), RuntimeError> {
        let function = program.functions.get(index).ok_or_else(|| no_such_function(index))?;

        match index {
            GETCHAR => {
                let mut byte = [0u8; 1];
                let word = match self.input.read(&mut byte).map_err(io_error)? {
                    0 => -1i32 as u32,
                    _ => byte[0] as u32,
                };
                return self.push(word);
            }
            PUTCHAR => {
                let word = self.pop(caller_floor)?;
                self.output.write_all(&[word as u8]).map_err(io_error)?;
                return self.push(word);
            }
            _ => {}
        }

        self.call_depth += 1;
        if self.call_depth > self.config.max_call_depth {
            return Err(call_depth_exceeded(self.config.max_call_depth));
        }

        let frame = memory.push_frame(function.frame_slots())?;
        for slot in (0..function.param_slots).rev() {
            let word = self.pop(caller_floor)?;
            memory.store(Address::Local(slot as u32), frame, word)?;
        }

        let floor = self.stack.len();
        let ret_pc = self
            .exec(program, memory, index, frame, floor)
            .map_err(|e| e.with_context(&function.name))?;

        if function.return_slots == 1 {
            let value = self
                .pop(floor)
                .map_err(|e| e.at(&function.name, ret_pc).with_context(&function.name))?;
            self.stack.truncate(floor);
            self.push(value)?;
        } else {
            self.stack.truncate(floor);
        }

        memory.pop_frame(frame);
        self.call_depth -= 1;
        Ok(())
    }

    fn exec(
        &mut self,
        program: &Program,
        memory: &mut Memory,
        index: usize,
        frame: Segment,
        floor: usize,
    ) -> Result<usize, RuntimeError> {
        let function = &program.functions[index];
        let code = &function.code;
        let mut pc: usize = 0;

        loop {
            let instr = code.get(pc).ok_or_else(|| ran_past_end().at(&function.name, pc))?;
            trace!(
                function = %function.name,
                pc,
                instr = %instr,
                depth = self.stack.len() - floor,
                "exec"
            );

            match self.step(program, memory, instr, frame, floor) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(to)) => pc = to,
                Ok(Flow::Return) => return Ok(pc),
                Err(e) => return Err(e.at(&function.name, pc)),
            }
        }
    }

    fn step(
        &mut self,
        program: &Program,
        memory: &mut Memory,
        instr: &Instruction,
        frame: Segment,
        floor: usize,
    ) -> Result<Flow, RuntimeError> {
        match (instr.op, instr.operand) {
            // Memory
            (Op::Push, Operand::Address(a)) => {
                let word = memory.load(a, frame)?;
                self.push(word)?;
            }
            (Op::PtrTo, Operand::Address(a)) => {
                self.push(memory.absolute(a, frame) as u32)?;
            }
            (Op::PushV, Operand::Value(v)) => self.push(v)?,
            (Op::PushIndexed(p), _) => {
                let base = self.pop(floor)?;
                let index = self.pop(floor)?;
                let word = match p {
                    Prim::Char => memory.read_byte(byte_element(base, index))? as i8 as i32 as u32,
                    _ => memory.read(element(base, index))?,
                };
                self.push(word)?;
            }
            (Op::Pop, Operand::Address(a)) => {
                let word = self.pop(floor)?;
                memory.store(a, frame, word)?;
            }
            (Op::PopIndexed(p), _) => {
                let word = self.pop(floor)?;
                let base = self.pop(floor)?;
                let index = self.pop(floor)?;
                match p {
                    Prim::Char => memory.write_byte(byte_element(base, index), word as u8)?,
                    _ => memory.write(element(base, index), word)?,
                }
            }

            // Stack shuffling
            (Op::Copy, _) => {
                let word = self.pop(floor)?;
                self.push(word)?;
                self.push(word)?;
            }
            (Op::Move, Operand::Distance(n)) => {
                let word = self.pop(floor)?;
                let at = self
                    .stack
                    .len()
                    .checked_sub(n as usize)
                    .filter(|&at| at >= floor)
                    .ok_or_else(stack_underflow)?;
                self.stack.insert(at, word);
            }
            (Op::PopX, _) => {
                self.pop(floor)?;
            }

            // Calls
            (Op::Call, Operand::Function(callee)) => {
                self.call(program, memory, callee, floor)?;
            }
            (Op::Ret, _) => return Ok(Flow::Return),

            // In place on the top word
            (Op::Inc(p), _) => self.update_top(floor, |w| unary(p, w, 1))?,
            (Op::Dec(p), _) => self.update_top(floor, |w| unary(p, w, -1))?,
            (Op::Neg(p), _) => self.update_top(floor, |w| match p {
                Prim::Float => (-f32::from_bits(w)).to_bits(),
                _ => (w as i32).wrapping_neg() as u32,
            })?,
            (Op::Flip, _) => self.update_top(floor, |w| !w)?,
            (Op::ConvIf, _) => self.update_top(floor, |w| (w as i32 as f32).to_bits())?,
            (Op::ConvFi, _) => self.update_top(floor, |w| f32::from_bits(w) as i32 as u32)?,

            // Binary
            (Op::Add(p), _) => self.binary(floor, |a, b| Ok(arith(p, a, b, i32::wrapping_add, |x, y| x + y)))?,
            (Op::Sub(p), _) => self.binary(floor, |a, b| Ok(arith(p, a, b, i32::wrapping_sub, |x, y| x - y)))?,
            (Op::Mul(p), _) => self.binary(floor, |a, b| Ok(arith(p, a, b, i32::wrapping_mul, |x, y| x * y)))?,
            (Op::Div(p), _) => self.binary(floor, |a, b| {
                if !p.is_float() && b == 0 {
                    return Err(division_by_zero());
                }
                Ok(arith(p, a, b, i32::wrapping_div, |x, y| x / y))
            })?,
            (Op::Mod(_), _) => self.binary(floor, |a, b| {
                if b == 0 {
                    return Err(modulo_by_zero());
                }
                Ok((a as i32).wrapping_rem(b as i32) as u32)
            })?,
            (Op::And, _) => self.binary(floor, |a, b| Ok(a & b))?,
            (Op::Or, _) => self.binary(floor, |a, b| Ok(a | b))?,

            // Jumps
            (Op::Goto, operand) => return Ok(Flow::Jump(target(operand)?)),
            (Op::IfZero(p), operand) => {
                let word = self.pop(floor)?;
                if is_zero(p, word) {
                    return Ok(Flow::Jump(target(operand)?));
                }
            }
            (Op::IfNonZero(p), operand) => {
                let word = self.pop(floor)?;
                if !is_zero(p, word) {
                    return Ok(Flow::Jump(target(operand)?));
                }
            }
            (Op::Branch(cmp, p), operand) => {
                let b = self.pop(floor)?;
                let a = self.pop(floor)?;
                let holds = match p {
                    Prim::Float => cmp.holds(f32::from_bits(a), f32::from_bits(b)),
                    _ => cmp.holds(a as i32, b as i32),
                };
                if holds {
                    return Ok(Flow::Jump(target(operand)?));
                }
            }

            (op, operand) => {
                return Err(RuntimeError::new(&format!(
                    "bad operand '{}' for {}",
                    operand, op
                )));
            }
        }
        Ok(Flow::Next)
    }

    // Stack operations

    fn push(&mut self, word: u32) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.stack_words {
            return Err(stack_overflow(self.config.stack_words));
        }
        self.stack.push(word);
        Ok(())
    }

    /// Pop a word belonging to the frame whose stack starts at `floor`.
    fn pop(&mut self, floor: usize) -> Result<u32, RuntimeError> {
        if self.stack.len() <= floor {
            return Err(stack_underflow());
        }
        self.stack.pop().ok_or_else(stack_underflow)
    }

    fn update_top(&mut self, floor: usize, f: impl FnOnce(u32) -> u32) -> Result<(), RuntimeError> {
        let word = self.pop(floor)?;
        self.push(f(word))
    }

    /// ( a b -- f(a, b) )
    fn binary(
        &mut self,
        floor: usize,
        f: impl FnOnce(u32, u32) -> Result<u32, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let b = self.pop(floor)?;
        let a = self.pop(floor)?;
        let result = f(a, b)?;
        self.push(result)
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return,
}

fn target(operand: Operand) -> Result<usize, RuntimeError> {
    match operand {
        Operand::Target(pc) => Ok(pc),
        _ => Err(unresolved_jump()),
    }
}

/// Arena index of `base[index]`; the index is signed.
fn element(base: u32, index: u32) -> i64 {
    base as i64 + index as i32 as i64
}

/// Chars are bytes: `base` is a word pointer, `index` counts bytes from it.
fn byte_element(base: u32, index: u32) -> i64 {
    base as i64 * 4 + index as i32 as i64
}

fn is_zero(p: Prim, word: u32) -> bool {
    match p {
        Prim::Float => f32::from_bits(word) == 0.0,
        _ => word == 0,
    }
}

/// `++`/`--` on a typed word.
fn unary(p: Prim, word: u32, delta: i32) -> u32 {
    match p {
        Prim::Float => (f32::from_bits(word) + delta as f32).to_bits(),
        _ => (word as i32).wrapping_add(delta) as u32,
    }
}

fn arith(p: Prim, a: u32, b: u32, int: fn(i32, i32) -> i32, float: fn(f32, f32) -> f32) -> u32 {
    match p {
        Prim::Float => float(f32::from_bits(a), f32::from_bits(b)).to_bits(),
        _ => int(a as i32, b as i32) as u32,
    }
}
