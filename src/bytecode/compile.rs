use tracing::debug;

use crate::{
    bytecode::{
        Op,
        address_table::{AddressTable, Slot, Storage},
        branch::BranchContext,
        compile_error::CompileError,
        context::{GeneratorContext, Signature},
        ir::{Address, BUILTIN_COUNT, Instruction, Operand},
    },
    lang::{BinaryOp, Node, NodeKind, Prim, Type, program::function_defs},
};

/// Turns translation units into IR text.
pub struct Compiler {
    ctx: GeneratorContext,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            ctx: GeneratorContext::new(),
        }
    }

    /// Generate one program from every unit, in order.
    pub fn compile_units(mut self, units: &[Node]) -> Result<String, CompileError> {
        for unit in units {
            self.collect_globals(unit)?;
        }

        let defs: Vec<&Node> = units.iter().flat_map(function_defs).collect();
        for (k, def) in defs.iter().enumerate() {
            let name = function_name(def)?;
            let params = param_decls(def)?.iter().map(|p| p.ty).collect();
            self.ctx.declare_function(
                name,
                Signature {
                    index: BUILTIN_COUNT + k,
                    ret: def.ty,
                    params,
                },
            );
        }

        let mut functions = Vec::with_capacity(defs.len());
        for (k, def) in defs.iter().enumerate() {
            functions.push(FunctionGen::new(&mut self.ctx, def)?.generate(BUILTIN_COUNT + k)?);
        }

        let mut out = String::new();
        let words = self.ctx.constants.words();
        out.push_str(&format!(".CONSTANTS {}\n", words.len()));
        for word in words {
            out.push_str(&format!("  0x{:08x}\n", word));
        }
        out.push_str(&format!(".GLOBALS {}\n", self.ctx.globals.slots()));
        out.push_str(&format!(".FUNCTIONS {}\n", functions.len()));
        for function in &functions {
            out.push('\n');
            out.push_str(&function.to_string());
        }
        Ok(out)
    }

    fn collect_globals(&mut self, unit: &Node) -> Result<(), CompileError> {
        for item in &unit.children {
            match item.kind {
                NodeKind::Variable | NodeKind::Decl => {
                    declare(&mut self.ctx.globals, item)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn function_name(def: &Node) -> Result<&str, CompileError> {
    def.name()
        .ok_or_else(|| CompileError::malformed(def, "function without a name"))
}

fn param_decls(def: &Node) -> Result<&[Node], CompileError> {
    match def.child(0) {
        Some(list) if list.kind == NodeKind::ParamList => Ok(&list.children),
        _ => Err(CompileError::malformed(def, "missing parameter list")),
    }
}

/// Allocate a `Decl`, or every `Decl` of a `Variable` group.
fn declare(table: &mut AddressTable, node: &Node) -> Result<(), CompileError> {
    if node.kind == NodeKind::Variable {
        for decl in &node.children {
            declare(table, decl)?;
        }
        return Ok(());
    }
    if node.kind != NodeKind::Decl {
        return Err(CompileError::unhandled_with_hint(
            node,
            "only declarations may appear in a declaration list",
        ));
    }
    let name = node
        .name()
        .ok_or_else(|| CompileError::malformed(node, "declaration without a name"))?;
    if node.ty.is_array() {
        if node.array_size == 0 {
            return Err(CompileError::malformed(node, "array declared without a size"));
        }
        table.allocate_array(name, node.array_size);
    } else {
        table.allocate(name);
    }
    Ok(())
}

// =============================================================================
// Per-function generation
// =============================================================================

/// One output line of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Comment(String),
    Label(u32),
    Instr(Instruction),
}

/// Generated code of one function, printed as a `.FUNC` block.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    pub index: usize,
    pub name: String,
    pub param_slots: usize,
    pub return_slots: usize,
    pub local_slots: usize,
    pub lines: Vec<Line>,
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, ".FUNC {} {}", self.index, self.name)?;
        writeln!(f, "  .params {}", self.param_slots)?;
        writeln!(f, "  .return {}", self.return_slots)?;
        writeln!(f, "  .locals {}", self.local_slots)?;
        let mut pc = 0;
        for line in &self.lines {
            match line {
                Line::Comment(text) => writeln!(f, "    ; {}", text)?,
                Line::Label(n) => writeln!(f, "  I{}:", n)?,
                Line::Instr(instr) => {
                    writeln!(f, "    {} {}", pc, instr)?;
                    pc += 1;
                }
            }
        }
        writeln!(f, ".end FUNC")
    }
}

/// Jump targets of the innermost enclosing loop.
#[derive(Debug, Clone, Copy)]
pub(super) struct LoopLabels {
    pub exit: u32,
    pub next: u32,
}

pub(super) struct FunctionGen<'a> {
    pub(super) ctx: &'a mut GeneratorContext,
    def: &'a Node,
    locals: AddressTable,
    param_slots: usize,
    ret: Type,
    lines: Vec<Line>,
}

impl<'a> FunctionGen<'a> {
    pub(super) fn new(ctx: &'a mut GeneratorContext, def: &'a Node) -> Result<Self, CompileError> {
        let mut locals = AddressTable::locals();
        for param in param_decls(def)? {
            let name = param
                .name()
                .ok_or_else(|| CompileError::malformed(param, "parameter without a name"))?;
            // array parameters arrive as a pointer word
            locals.allocate(name);
        }
        let param_slots = locals.slots();
        if let Some(list) = def.child(1) {
            for decl in &list.children {
                declare(&mut locals, decl)?;
            }
        }
        Ok(Self {
            ctx,
            def,
            locals,
            param_slots,
            ret: def.ty,
            lines: Vec::new(),
        })
    }

    pub(super) fn generate(mut self, index: usize) -> Result<FunctionCode, CompileError> {
        let def = self.def;
        let name = function_name(def)?.to_string();
        let body = def
            .child(2)
            .ok_or_else(|| CompileError::malformed(def, "missing body"))?;
        for stmt in &body.children {
            self.statement(stmt, None)?;
        }

        let ends_in_ret = self
            .lines
            .iter()
            .rev()
            .find(|l| !matches!(l, Line::Comment(_)))
            .is_some_and(|l| matches!(l, Line::Instr(i) if i.op == Op::Ret));
        if !ends_in_ret {
            self.emit(Op::Ret);
        }

        let code = FunctionCode {
            index,
            name,
            param_slots: self.param_slots,
            return_slots: if self.ret.is_void() { 0 } else { 1 },
            local_slots: self.locals.slots() - self.param_slots,
            lines: self.lines,
        };
        debug!(
            function = %code.name,
            index,
            lines = code.lines.len(),
            "generated function"
        );
        Ok(code)
    }

    // ─────────────────────────── Emission ──────────────────────────────

    pub(super) fn emit(&mut self, op: Op) {
        self.lines.push(Line::Instr(Instruction::new(op)));
    }

    pub(super) fn emit_with(&mut self, op: Op, operand: Operand) {
        self.lines.push(Line::Instr(Instruction::with(op, operand)));
    }

    pub(super) fn jump(&mut self, op: Op, label: u32) {
        self.emit_with(op, Operand::Label(label));
    }

    pub(super) fn place(&mut self, label: u32) {
        self.lines.push(Line::Label(label));
    }

    pub(super) fn fresh_label(&mut self) -> u32 {
        self.ctx.fresh_label()
    }

    fn push_value(&mut self, word: u32) {
        self.emit_with(Op::PushV, Operand::Value(word));
    }

    fn lookup(&self, node: &Node) -> Result<Slot, CompileError> {
        let name = node
            .name()
            .ok_or_else(|| CompileError::malformed(node, "variable reference without a name"))?;
        self.locals
            .get(name)
            .or_else(|| self.ctx.globals.get(name))
            .ok_or_else(|| CompileError::unknown_identifier(name, node.line))
    }

    // ─────────────────────────── Statements ────────────────────────────

    pub(super) fn statement(&mut self, node: &Node, loops: Option<LoopLabels>) -> Result<(), CompileError> {
        if node.kind == NodeKind::Block {
            for stmt in &node.children {
                self.statement(stmt, loops)?;
            }
            return Ok(());
        }
        if node.is_empty() {
            return Ok(());
        }

        self.lines
            .push(Line::Comment(format!("{} on line {}", node.kind, node.line)));

        match node.kind {
            NodeKind::Return => self.return_stmt(node),
            NodeKind::If => self.if_stmt(node, loops),
            NodeKind::While => self.while_stmt(node),
            NodeKind::DoWhile => self.do_while_stmt(node),
            NodeKind::For => self.for_stmt(node),
            NodeKind::Break | NodeKind::Continue => {
                let labels = loops.ok_or_else(|| CompileError::outside_loop(node))?;
                let target = if node.kind == NodeKind::Break {
                    labels.exit
                } else {
                    labels.next
                };
                self.jump(Op::Goto, target);
                Ok(())
            }
            NodeKind::Variable | NodeKind::Decl => Err(CompileError::unhandled_with_hint(
                node,
                "locals must be declared in the function's declaration list",
            )),
            kind if kind.is_expression() => self.effect(node),
            _ => Err(CompileError::unhandled(node)),
        }
    }

    fn return_stmt(&mut self, node: &Node) -> Result<(), CompileError> {
        if let Some(value) = node.child(0) {
            if self.ret.is_void() {
                return Err(CompileError::malformed(node, "value returned from a void function"));
            }
            if self.ret.is_array() {
                self.expr(value)?;
            } else {
                let prim = self.ret.prim().ok_or_else(|| {
                    CompileError::malformed(self.def, "function has no return type")
                })?;
                self.converted(value, prim)?;
            }
        }
        self.emit(Op::Ret);
        Ok(())
    }

    fn if_stmt(&mut self, node: &Node, loops: Option<LoopLabels>) -> Result<(), CompileError> {
        let (cond, then) = two_children(node)?;
        let otherwise = self.fresh_label();
        self.test(cond, otherwise, false)?;
        self.statement(then, loops)?;
        match node.child(2) {
            Some(else_stmt) => {
                let end = self.fresh_label();
                self.jump(Op::Goto, end);
                self.place(otherwise);
                self.statement(else_stmt, loops)?;
                self.place(end);
            }
            None => self.place(otherwise),
        }
        Ok(())
    }

    fn while_stmt(&mut self, node: &Node) -> Result<(), CompileError> {
        let (cond, body) = two_children(node)?;
        let top = self.fresh_label();
        let exit = self.fresh_label();
        self.place(top);
        self.test(cond, exit, false)?;
        self.statement(body, Some(LoopLabels { exit, next: top }))?;
        self.jump(Op::Goto, top);
        self.place(exit);
        Ok(())
    }

    fn do_while_stmt(&mut self, node: &Node) -> Result<(), CompileError> {
        let (body, cond) = two_children(node)?;
        let top = self.fresh_label();
        let next = self.fresh_label();
        let exit = self.fresh_label();
        self.place(top);
        self.statement(body, Some(LoopLabels { exit, next }))?;
        self.place(next);
        self.test(cond, top, true)?;
        self.place(exit);
        Ok(())
    }

    fn for_stmt(&mut self, node: &Node) -> Result<(), CompileError> {
        let [init, cond, step, body] = node.children.as_slice() else {
            return Err(CompileError::malformed(node, "for needs init, condition, step and body"));
        };
        if !init.is_empty() {
            self.effect(init)?;
        }
        let top = self.fresh_label();
        let next = self.fresh_label();
        let exit = self.fresh_label();
        self.place(top);
        if !cond.is_empty() {
            self.test(cond, exit, false)?;
        }
        self.statement(body, Some(LoopLabels { exit, next }))?;
        self.place(next);
        if !step.is_empty() {
            self.effect(step)?;
        }
        self.jump(Op::Goto, top);
        self.place(exit);
        Ok(())
    }

    /// Evaluate an expression for its side effects only.
    fn effect(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Assign => self.assign(node, false),
            NodeKind::CompoundAssign(op) => self.compound_assign(node, op, false),
            NodeKind::PreIncrement
            | NodeKind::PreDecrement
            | NodeKind::PostIncrement
            | NodeKind::PostDecrement => self.step(node, false),
            NodeKind::Call if node.ty.is_void() => self.call(node),
            _ => {
                self.expr(node)?;
                self.emit(Op::PopX);
                Ok(())
            }
        }
    }

    // ─────────────────────────── Expressions ───────────────────────────

    /// Push the value of `node`.
    pub(super) fn expr(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::IntConst => match node.value {
                crate::lang::Literal::Int(n) => self.push_value(n as u32),
                _ => return Err(CompileError::malformed(node, "int constant without a value")),
            },
            NodeKind::CharConst => match node.value {
                crate::lang::Literal::Char(c) => self.push_value(c as u32),
                _ => return Err(CompileError::malformed(node, "char constant without a value")),
            },
            NodeKind::RealConst => match node.value {
                crate::lang::Literal::Real(x) => self.push_value(x.to_bits()),
                _ => return Err(CompileError::malformed(node, "real constant without a value")),
            },
            NodeKind::StrConst => match &node.value {
                crate::lang::Literal::Str(s) => {
                    let address = self.ctx.constants.intern(s);
                    self.emit_with(Op::PtrTo, Operand::Address(address));
                }
                _ => return Err(CompileError::malformed(node, "string constant without a value")),
            },
            NodeKind::LValue => match node.child(0) {
                None => {
                    let slot = self.lookup(node)?;
                    let op = match slot.storage {
                        Storage::Array => Op::PtrTo,
                        Storage::Scalar => Op::Push,
                    };
                    self.emit_with(op, Operand::Address(slot.address));
                }
                Some(index) => {
                    let prim = value_prim(node)?;
                    self.element_pointer(node, index)?;
                    self.emit(Op::PushIndexed(prim));
                }
            },
            NodeKind::Binary(op) => {
                let (left, right) = two_children(node)?;
                let prim = value_prim(node)?;
                let op = arithmetic(op, prim).ok_or_else(|| CompileError::float_modulo(node))?;
                self.converted(left, prim)?;
                self.converted(right, prim)?;
                self.emit(op);
            }
            NodeKind::Negate | NodeKind::BitNot => {
                let operand = one_child(node)?;
                let prim = value_prim(node)?;
                self.converted(operand, prim)?;
                self.emit(match node.kind {
                    NodeKind::Negate => Op::Neg(prim),
                    _ => Op::Flip,
                });
            }
            NodeKind::Compare(_) | NodeKind::And | NodeKind::Or | NodeKind::Not => {
                self.lower(node, BranchContext::Value)?;
            }
            NodeKind::Ternary => self.ternary(node)?,
            NodeKind::PreIncrement
            | NodeKind::PreDecrement
            | NodeKind::PostIncrement
            | NodeKind::PostDecrement => self.step(node, true)?,
            NodeKind::Call => self.call(node)?,
            NodeKind::Cast => self.cast(node)?,
            NodeKind::Assign => self.assign(node, true)?,
            NodeKind::CompoundAssign(op) => self.compound_assign(node, op, true)?,
            _ => return Err(CompileError::unhandled(node)),
        }
        Ok(())
    }

    /// Push the value of `node` as a `to` word. Pointers pass through as is.
    pub(super) fn converted(&mut self, node: &Node, to: Prim) -> Result<(), CompileError> {
        self.expr(node)?;
        if node.ty.is_array() {
            return Ok(());
        }
        let from = value_prim(node)?;
        match (from.is_float(), to.is_float()) {
            (true, false) => self.emit(Op::ConvFi),
            (false, true) => self.emit(Op::ConvIf),
            _ => {}
        }
        Ok(())
    }

    fn cast(&mut self, node: &Node) -> Result<(), CompileError> {
        let operand = one_child(node)?;
        self.expr(operand)?;
        if node.ty.is_array() || operand.ty.is_array() {
            return Ok(());
        }
        let from = value_prim(operand)?;
        let to = value_prim(node)?;
        match to {
            Prim::Int if from.is_float() => self.emit(Op::ConvFi),
            Prim::Char if from != Prim::Char => {
                if from.is_float() {
                    self.emit(Op::ConvFi);
                }
                self.push_value(0xff);
                self.emit(Op::And);
            }
            Prim::Float if !from.is_float() => self.emit(Op::ConvIf),
            _ => {}
        }
        Ok(())
    }

    fn call(&mut self, node: &Node) -> Result<(), CompileError> {
        let name = node
            .name()
            .ok_or_else(|| CompileError::malformed(node, "call without a function name"))?;
        let signature = self
            .ctx
            .function(name)
            .cloned()
            .ok_or_else(|| CompileError::unknown_function(name, node.line))?;
        for (i, arg) in node.children.iter().enumerate() {
            match signature.params.get(i).and_then(|ty| {
                if ty.is_array() { None } else { ty.prim() }
            }) {
                Some(prim) => self.converted(arg, prim)?,
                None => self.expr(arg)?,
            }
        }
        self.emit_with(Op::Call, Operand::Function(signature.index));
        Ok(())
    }

    /// Push `index` then the array base, leaving the base on top.
    fn element_pointer(&mut self, target: &Node, index: &Node) -> Result<(), CompileError> {
        self.converted(index, Prim::Int)?;
        self.array_base(target)
    }

    fn array_base(&mut self, target: &Node) -> Result<(), CompileError> {
        let slot = self.lookup(target)?;
        let op = match slot.storage {
            Storage::Array => Op::PtrTo,
            Storage::Scalar => Op::Push,
        };
        self.emit_with(op, Operand::Address(slot.address));
        Ok(())
    }

    /// The scalar slot written by a plain `name = ...`.
    fn scalar_target(&self, target: &Node) -> Result<Address, CompileError> {
        let slot = self.lookup(target)?;
        match slot.storage {
            Storage::Scalar => Ok(slot.address),
            Storage::Array => Err(CompileError::malformed(target, "cannot assign to an array")),
        }
    }

    fn assign(&mut self, node: &Node, keep: bool) -> Result<(), CompileError> {
        let (target, value) = two_children(node)?;
        check_lvalue(target)?;
        let prim = value_prim(target)?;
        match target.child(0) {
            None => {
                let address = self.scalar_target(target)?;
                self.converted(value, prim)?;
                if keep {
                    self.emit(Op::Copy);
                }
                self.emit_with(Op::Pop, Operand::Address(address));
            }
            Some(index) => {
                self.element_pointer(target, index)?;
                self.converted(value, prim)?;
                if keep {
                    self.keep_below_element();
                }
                self.emit(Op::PopIndexed(prim));
            }
        }
        Ok(())
    }

    fn compound_assign(&mut self, node: &Node, op: BinaryOp, keep: bool) -> Result<(), CompileError> {
        let (target, value) = two_children(node)?;
        check_lvalue(target)?;
        let prim = value_prim(target)?;
        let op = arithmetic(op, prim).ok_or_else(|| CompileError::float_modulo(node))?;
        match target.child(0) {
            None => {
                let address = self.scalar_target(target)?;
                self.emit_with(Op::Push, Operand::Address(address));
                self.converted(value, prim)?;
                self.emit(op);
                if keep {
                    self.emit(Op::Copy);
                }
                self.emit_with(Op::Pop, Operand::Address(address));
            }
            Some(index) => {
                self.element_twice(target, index)?;
                self.emit(Op::PushIndexed(prim));
                self.converted(value, prim)?;
                self.emit(op);
                if keep {
                    self.keep_below_element();
                }
                self.emit(Op::PopIndexed(prim));
            }
        }
        Ok(())
    }

    /// `++`/`--` in either position, storing the result back.
    fn step(&mut self, node: &Node, keep: bool) -> Result<(), CompileError> {
        let target = one_child(node)?;
        check_lvalue(target)?;
        let prim = value_prim(target)?;
        let (op, post) = match node.kind {
            NodeKind::PreIncrement => (Op::Inc(prim), false),
            NodeKind::PreDecrement => (Op::Dec(prim), false),
            NodeKind::PostIncrement => (Op::Inc(prim), true),
            NodeKind::PostDecrement => (Op::Dec(prim), true),
            _ => return Err(CompileError::unhandled(node)),
        };
        match target.child(0) {
            None => {
                let address = self.scalar_target(target)?;
                self.emit_with(Op::Push, Operand::Address(address));
                match (keep, post) {
                    (true, true) => {
                        self.emit(Op::Copy);
                        self.emit(op);
                    }
                    (true, false) => {
                        self.emit(op);
                        self.emit(Op::Copy);
                    }
                    (false, _) => self.emit(op),
                }
                self.emit_with(Op::Pop, Operand::Address(address));
            }
            Some(index) => {
                self.element_twice(target, index)?;
                self.emit(Op::PushIndexed(prim));
                match (keep, post) {
                    (true, true) => {
                        self.keep_below_element();
                        self.emit(op);
                    }
                    (true, false) => {
                        self.emit(op);
                        self.keep_below_element();
                    }
                    (false, _) => self.emit(op),
                }
                self.emit(Op::PopIndexed(prim));
            }
        }
        Ok(())
    }

    /// ( -- index base index base ), evaluating `index` once.
    fn element_twice(&mut self, target: &Node, index: &Node) -> Result<(), CompileError> {
        self.converted(index, Prim::Int)?;
        self.emit(Op::Copy);
        self.array_base(target)?;
        self.emit_with(Op::Move, Operand::Distance(1));
        self.array_base(target)
    }

    /// ( index base value -- value index base value )
    fn keep_below_element(&mut self) {
        self.emit(Op::Copy);
        self.emit_with(Op::Move, Operand::Distance(3));
    }
}

/// The arithmetic instruction for `op` on `prim` words; `None` for float `%`.
fn arithmetic(op: BinaryOp, prim: Prim) -> Option<Op> {
    Some(match op {
        BinaryOp::Add => Op::Add(prim),
        BinaryOp::Sub => Op::Sub(prim),
        BinaryOp::Mul => Op::Mul(prim),
        BinaryOp::Div => Op::Div(prim),
        BinaryOp::Mod if prim.is_float() => return None,
        BinaryOp::Mod => Op::Mod(prim),
        BinaryOp::BitAnd => Op::And,
        BinaryOp::BitOr => Op::Or,
    })
}

/// Word interpretation of an expression's value. Pointers are ints.
pub(super) fn value_prim(node: &Node) -> Result<Prim, CompileError> {
    if node.ty.is_array() {
        return Ok(Prim::Int);
    }
    node.ty
        .prim()
        .ok_or_else(|| CompileError::malformed(node, format!("expression of type {} has no value", node.ty)))
}

fn check_lvalue(node: &Node) -> Result<(), CompileError> {
    if node.kind == NodeKind::LValue {
        Ok(())
    } else {
        Err(CompileError::malformed(node, "assignment target is not a variable"))
    }
}

pub(super) fn one_child(node: &Node) -> Result<&Node, CompileError> {
    node.child(0)
        .ok_or_else(|| CompileError::malformed(node, "missing operand"))
}

pub(super) fn two_children(node: &Node) -> Result<(&Node, &Node), CompileError> {
    match (node.child(0), node.child(1)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(CompileError::malformed(node, "missing operand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::build::*;
    use crate::lang::{CompareOp, NodeKind};
    use pretty_assertions::assert_eq;

    fn generate(units: Vec<Node>) -> String {
        Compiler::new().compile_units(&units).unwrap()
    }

    fn generate_err(units: Vec<Node>) -> CompileError {
        Compiler::new().compile_units(&units).unwrap_err()
    }

    /// Instruction lines of the whole output, without their indices.
    fn instructions(ir: &str) -> Vec<String> {
        ir.lines()
            .map(str::trim)
            .filter(|l| l.starts_with(|c: char| c.is_ascii_digit()))
            .map(|l| l.split_once(' ').map(|(_, rest)| rest.to_string()).unwrap_or_default())
            .collect()
    }

    fn main_returning(locals: Vec<Node>, body: Vec<Node>) -> Vec<Node> {
        vec![unit(vec![function("main", Type::INT, vec![], locals, body)])]
    }

    // =========================================================================
    // Layout
    // =========================================================================

    #[test]
    fn test_add_function_text() {
        let ir = generate(vec![unit(vec![function(
            "add",
            Type::INT,
            vec![decl("a", Type::INT), decl("b", Type::INT)],
            vec![],
            vec![ret(Some(binary(BinaryOp::Add, Type::INT, var("a", Type::INT), var("b", Type::INT))))
                .at_line(2)],
        )])]);

        assert_eq!(
            ir,
            ".CONSTANTS 0\n\
             .GLOBALS 0\n\
             .FUNCTIONS 1\n\
             \n\
             .FUNC 2 add\n\
             \x20 .params 2\n\
             \x20 .return 1\n\
             \x20 .locals 0\n\
             \x20   ; return on line 2\n\
             \x20   0 push L0\n\
             \x20   1 push L1\n\
             \x20   2 +i\n\
             \x20   3 ret\n\
             .end FUNC\n"
        );
    }

    #[test]
    fn test_globals_and_locals_are_counted() {
        let ir = generate(vec![
            unit(vec![
                variable(Type::INT, vec![decl("g", Type::INT), array_decl("gs", Type::INT, 10)]),
                function(
                    "f",
                    Type::VOID,
                    vec![decl("p", Type::CHAR.array())],
                    vec![variable(Type::FLOAT, vec![decl("x", Type::FLOAT), array_decl("xs", Type::FLOAT, 3)])],
                    vec![],
                ),
            ]),
            unit(vec![decl("h", Type::CHAR)]),
        ]);
        assert!(ir.contains(".GLOBALS 12\n"));
        assert!(ir.contains("  .params 1\n  .return 0\n  .locals 4\n"));
    }

    #[test]
    fn test_functions_are_numbered_across_units() {
        let ir = generate(vec![
            unit(vec![function("a", Type::VOID, vec![], vec![], vec![])]),
            unit(vec![
                prototype("a", Type::VOID),
                function("b", Type::VOID, vec![], vec![], vec![]),
            ]),
        ]);
        assert!(ir.contains(".FUNCTIONS 2\n"));
        assert!(ir.contains(".FUNC 2 a\n"));
        assert!(ir.contains(".FUNC 3 b\n"));
    }

    #[test]
    fn test_void_function_gets_trailing_ret() {
        let ir = generate(vec![unit(vec![function("f", Type::VOID, vec![], vec![], vec![])])]);
        assert_eq!(instructions(&ir), vec!["ret"]);
    }

    #[test]
    fn test_label_at_end_gets_trailing_ret() {
        let ir = generate(main_returning(
            vec![],
            vec![if_(int(1), ret(Some(int(1))), None)],
        ));
        let lines: Vec<&str> = ir.lines().collect();
        let end = lines.len() - 1;
        assert_eq!(lines[end], ".end FUNC");
        assert!(lines[end - 1].ends_with("ret"));
        assert!(lines[end - 2].trim().starts_with('I'));
    }

    #[test]
    fn test_statement_comments() {
        let ir = generate(main_returning(
            vec![decl("x", Type::INT)],
            vec![
                assign(var("x", Type::INT), int(1)).at_line(3),
                ret(Some(var("x", Type::INT))).at_line(4),
            ],
        ));
        assert!(ir.contains("    ; = on line 3\n"));
        assert!(ir.contains("    ; return on line 4\n"));
    }

    // =========================================================================
    // Constants
    // =========================================================================

    #[test]
    fn test_strings_are_pooled() {
        let ir = generate(main_returning(
            vec![],
            vec![
                call("putchar", Type::INT, vec![string("abcde")]),
                call("putchar", Type::INT, vec![string("hi")]),
                call("putchar", Type::INT, vec![string("abcde")]),
            ],
        ));
        assert!(ir.starts_with(".CONSTANTS 3\n  0x64636261\n  0x00000065\n  0x00006968\n"));
        assert_eq!(
            instructions(&ir)
                .iter()
                .filter(|i| i.starts_with("ptrto"))
                .cloned()
                .collect::<Vec<_>>(),
            vec!["ptrto C0", "ptrto C2", "ptrto C0"]
        );
    }

    #[test]
    fn test_literals() {
        let ir = generate(main_returning(
            vec![decl("f", Type::FLOAT), decl("c", Type::CHAR)],
            vec![
                assign(var("f", Type::FLOAT), real(1.0)),
                assign(var("c", Type::CHAR), chr(b'a')),
                ret(Some(int(-1))),
            ],
        ));
        assert_eq!(
            instructions(&ir),
            vec![
                "pushv 0x3f800000",
                "pop L0",
                "pushv 0x61",
                "pop L1",
                "pushv 0xffffffff",
                "ret"
            ]
        );
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_implicit_conversion_to_float() {
        let ir = generate(main_returning(
            vec![decl("f", Type::FLOAT), decl("i", Type::INT)],
            vec![
                assign(
                    var("f", Type::FLOAT),
                    binary(BinaryOp::Mul, Type::FLOAT, var("f", Type::FLOAT), var("i", Type::INT)),
                ),
                ret(Some(var("f", Type::FLOAT))),
            ],
        ));
        assert_eq!(
            instructions(&ir),
            vec!["push L0", "push L1", "convif", "*f", "pop L0", "push L0", "convfi", "ret"]
        );
    }

    #[test]
    fn test_casts() {
        let ir = generate(main_returning(
            vec![decl("f", Type::FLOAT), decl("c", Type::CHAR)],
            vec![
                assign(var("c", Type::CHAR), cast(Type::CHAR, var("f", Type::FLOAT))),
                assign(var("f", Type::FLOAT), cast(Type::FLOAT, var("c", Type::CHAR))),
                ret(Some(cast(Type::INT, var("c", Type::CHAR)))),
            ],
        ));
        assert_eq!(
            instructions(&ir),
            vec![
                "push L0", "convfi", "pushv 0xff", "&", "pop L1",
                "push L1", "convif", "pop L0",
                "push L1", "ret",
            ]
        );
    }

    #[test]
    fn test_float_modulo_is_rejected() {
        let err = generate_err(main_returning(
            vec![decl("f", Type::FLOAT)],
            vec![ret(Some(cast(
                Type::INT,
                binary(BinaryOp::Mod, Type::FLOAT, var("f", Type::FLOAT), real(2.0)),
            )))],
        ));
        assert!(matches!(err, CompileError::FloatModulo { .. }));

        let err = generate_err(main_returning(
            vec![decl("f", Type::FLOAT)],
            vec![compound_assign(BinaryOp::Mod, var("f", Type::FLOAT), real(2.0))],
        ));
        assert!(matches!(err, CompileError::FloatModulo { .. }));
    }

    #[test]
    fn test_typed_opcodes() {
        for (ty, suffix) in [(Type::INT, 'i'), (Type::CHAR, 'c'), (Type::FLOAT, 'f')] {
            let ir = generate(main_returning(
                vec![decl("x", ty)],
                vec![
                    assign(var("x", ty), binary(BinaryOp::Sub, ty, var("x", ty), var("x", ty))),
                    assign(var("x", ty), negate(var("x", ty))),
                    step(NodeKind::PreIncrement, var("x", ty)),
                    ret(Some(int(0))),
                ],
            ));
            let code = instructions(&ir);
            assert!(code.contains(&format!("-{}", suffix)), "{:?}", code);
            assert!(code.contains(&format!("neg{}", suffix)), "{:?}", code);
            assert!(code.contains(&format!("++{}", suffix)), "{:?}", code);
        }
    }

    #[test]
    fn test_expression_statement_discards_value() {
        let ir = generate(vec![unit(vec![
            function("v", Type::VOID, vec![], vec![], vec![]),
            function(
                "main",
                Type::INT,
                vec![],
                vec![decl("x", Type::INT)],
                vec![
                    binary(BinaryOp::Add, Type::INT, var("x", Type::INT), int(1)),
                    call("getchar", Type::INT, vec![]),
                    call("v", Type::VOID, vec![]),
                ],
            ),
        ])]);
        let main = ir.split(".FUNC 3 main").nth(1).unwrap_or_default();
        assert_eq!(
            instructions(main),
            vec!["push L0", "pushv 0x1", "+i", "popx", "call 0", "popx", "call 2", "ret"]
        );
    }

    #[test]
    fn test_assignment_as_expression_keeps_value() {
        let ir = generate(main_returning(
            vec![decl("a", Type::INT), decl("b", Type::INT)],
            vec![ret(Some(assign(var("a", Type::INT), assign(var("b", Type::INT), int(7)))))],
        ));
        assert_eq!(
            instructions(&ir),
            vec!["pushv 0x7", "copy", "pop L1", "copy", "pop L0", "ret"]
        );
    }

    #[test]
    fn test_element_store_pushes_index_then_base() {
        let ir = generate(main_returning(
            vec![array_decl("xs", Type::INT, 4)],
            vec![
                assign(index("xs", Type::INT, int(2)), int(9)),
                ret(Some(index("xs", Type::INT, int(2)))),
            ],
        ));
        assert_eq!(
            instructions(&ir),
            vec![
                "pushv 0x2", "ptrto L0", "pushv 0x9", "popi[]",
                "pushv 0x2", "ptrto L0", "pushi[]", "ret",
            ]
        );
    }

    #[test]
    fn test_array_parameter_is_a_pointer() {
        let ir = generate(vec![unit(vec![function(
            "first",
            Type::CHAR,
            vec![decl("s", Type::CHAR.array())],
            vec![],
            vec![ret(Some(index("s", Type::CHAR, int(0))))],
        )])]);
        assert_eq!(instructions(&ir), vec!["pushv 0x0", "push L0", "pushc[]", "ret"]);
    }

    #[test]
    fn test_element_compound_assign_evaluates_index_once() {
        let ir = generate(main_returning(
            vec![array_decl("xs", Type::INT, 4)],
            vec![
                compound_assign(BinaryOp::Add, index("xs", Type::INT, call("getchar", Type::INT, vec![])), int(1)),
                ret(Some(int(0))),
            ],
        ));
        let code = instructions(&ir);
        assert_eq!(code.iter().filter(|i| *i == "call 0").count(), 1);
        assert_eq!(
            code,
            vec![
                "call 0", "copy", "ptrto L0", "move 1", "ptrto L0", "pushi[]",
                "pushv 0x1", "+i", "popi[]", "pushv 0x0", "ret",
            ]
        );
    }

    #[test]
    fn test_postfix_step_keeps_old_value() {
        let ir = generate(main_returning(
            vec![decl("i", Type::INT)],
            vec![ret(Some(step(NodeKind::PostIncrement, var("i", Type::INT))))],
        ));
        assert_eq!(instructions(&ir), vec!["push L0", "copy", "++i", "pop L0", "ret"]);

        let ir = generate(main_returning(
            vec![decl("i", Type::INT)],
            vec![ret(Some(step(NodeKind::PreDecrement, var("i", Type::INT))))],
        ));
        assert_eq!(instructions(&ir), vec!["push L0", "--i", "copy", "pop L0", "ret"]);
    }

    #[test]
    fn test_unknown_names() {
        let err = generate_err(main_returning(vec![], vec![ret(Some(var("nope", Type::INT)))]));
        assert_eq!(err, CompileError::unknown_identifier("nope", 0));

        let err = generate_err(main_returning(vec![], vec![call("nope", Type::INT, vec![])]));
        assert_eq!(err, CompileError::unknown_function("nope", 0));
    }

    #[test]
    fn test_local_shadows_global() {
        let ir = generate(vec![unit(vec![
            decl("x", Type::INT),
            function("main", Type::INT, vec![], vec![decl("x", Type::INT)], vec![ret(Some(var("x", Type::INT)))]),
        ])]);
        assert_eq!(instructions(&ir), vec!["push L0", "ret"]);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let err = generate_err(main_returning(vec![], vec![break_().at_line(5)]));
        assert_eq!(err.to_string(), "line 5: break outside of a loop");
    }

    #[test]
    fn test_while_layout() {
        let ir = generate(main_returning(
            vec![decl("i", Type::INT)],
            vec![while_(
                compare(CompareOp::Lt, var("i", Type::INT), int(3)),
                step(NodeKind::PostIncrement, var("i", Type::INT)),
            )],
        ));
        assert!(ir.contains("    ; while on line 0\n  I0:\n"));
        assert_eq!(
            instructions(&ir),
            vec!["push L0", "pushv 0x3", ">=i I1", "push L0", "++i", "pop L0", "goto I0", "ret"]
        );
    }

    #[test]
    fn test_for_continue_jumps_to_step() {
        let ir = generate(main_returning(
            vec![decl("i", Type::INT)],
            vec![for_(
                assign(var("i", Type::INT), int(0)),
                empty(),
                step(NodeKind::PreIncrement, var("i", Type::INT)),
                block(vec![continue_()]),
            )],
        ));
        // labels: top I0, continue I1, exit I2
        assert_eq!(
            instructions(&ir),
            vec!["pushv 0x0", "pop L0", "goto I1", "push L0", "++i", "pop L0", "goto I0", "ret"]
        );
        assert!(ir.contains("  I1:\n"));
        assert!(ir.contains("  I2:\n"));
    }

    #[test]
    fn test_labels_never_repeat_across_functions() {
        let body = || vec![while_(int(1), break_())];
        let ir = generate(vec![unit(vec![
            function("a", Type::VOID, vec![], vec![], body()),
            function("b", Type::VOID, vec![], vec![], body()),
        ])]);
        let labels: Vec<&str> = ir.lines().filter(|l| l.trim_end().ends_with(':')).collect();
        let mut unique = labels.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), 4);
        assert_eq!(unique.len(), labels.len());
    }
}
