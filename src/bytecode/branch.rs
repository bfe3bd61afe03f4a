//! Lowering of conditions.
//!
//! Every conditional construct goes through [`FunctionGen::lower`] with a
//! [`BranchContext`]. In test mode a comparison becomes a single conditional
//! jump and `&&`/`||`/`!` become jump chains, so no boolean value is ever
//! materialised unless the expression's value is actually used.

use crate::{
    bytecode::{
        Op,
        compile::{FunctionGen, one_child, two_children, value_prim},
        compile_error::CompileError,
        ir::Operand,
    },
    lang::{Node, NodeKind, Prim},
};

/// What the caller wants from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchContext {
    /// Push the value.
    Value,
    /// Jump to `label` when the truth value equals `jump_if`, otherwise
    /// fall through. Nothing is left on the stack.
    BranchTo { label: u32, jump_if: bool },
}

impl FunctionGen<'_> {
    pub(super) fn lower(&mut self, node: &Node, context: BranchContext) -> Result<(), CompileError> {
        match context {
            BranchContext::Value => match node.kind {
                NodeKind::Compare(_) | NodeKind::And | NodeKind::Or | NodeKind::Not => {
                    self.materialize(node)
                }
                NodeKind::Ternary => self.ternary(node),
                _ => self.expr(node),
            },
            BranchContext::BranchTo { label, jump_if } => self.branch(node, label, jump_if),
        }
    }

    /// Test-mode shorthand.
    pub(super) fn test(&mut self, node: &Node, label: u32, jump_if: bool) -> Result<(), CompileError> {
        self.lower(node, BranchContext::BranchTo { label, jump_if })
    }

    fn branch(&mut self, node: &Node, label: u32, jump_if: bool) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Compare(op) => {
                let (left, right) = two_children(node)?;
                let prim = compare_prim(left, right)?;
                self.converted(left, prim)?;
                self.converted(right, prim)?;
                let op = if jump_if { op } else { op.invert() };
                self.jump(Op::Branch(op, prim), label);
            }
            NodeKind::And => {
                let (left, right) = two_children(node)?;
                if jump_if {
                    let skip = self.fresh_label();
                    self.test(left, skip, false)?;
                    self.test(right, label, true)?;
                    self.place(skip);
                } else {
                    self.test(left, label, false)?;
                    self.test(right, label, false)?;
                }
            }
            NodeKind::Or => {
                let (left, right) = two_children(node)?;
                if jump_if {
                    self.test(left, label, true)?;
                    self.test(right, label, true)?;
                } else {
                    let skip = self.fresh_label();
                    self.test(left, skip, true)?;
                    self.test(right, label, false)?;
                    self.place(skip);
                }
            }
            NodeKind::Not => self.test(one_child(node)?, label, !jump_if)?,
            _ => {
                // no jump of its own: compare the value with zero
                let prim = value_prim(node)?;
                self.lower(node, BranchContext::Value)?;
                let op = if jump_if {
                    Op::IfNonZero(prim)
                } else {
                    Op::IfZero(prim)
                };
                self.jump(op, label);
            }
        }
        Ok(())
    }

    /// Push 1 if `node` holds, 0 otherwise.
    fn materialize(&mut self, node: &Node) -> Result<(), CompileError> {
        let holds = self.fresh_label();
        let merge = self.fresh_label();
        self.test(node, holds, true)?;
        self.emit_with(Op::PushV, Operand::Value(0));
        self.jump(Op::Goto, merge);
        self.place(holds);
        self.emit_with(Op::PushV, Operand::Value(1));
        self.place(merge);
        Ok(())
    }

    pub(super) fn ternary(&mut self, node: &Node) -> Result<(), CompileError> {
        let [cond, then, otherwise] = node.children.as_slice() else {
            return Err(CompileError::malformed(node, "?: needs three operands"));
        };
        let prim = value_prim(node)?;
        let else_label = self.fresh_label();
        let merge = self.fresh_label();
        self.test(cond, else_label, false)?;
        self.converted(then, prim)?;
        self.jump(Op::Goto, merge);
        self.place(else_label);
        self.converted(otherwise, prim)?;
        self.place(merge);
        Ok(())
    }
}

/// Float if either side is float, char if both are char, int otherwise.
fn compare_prim(left: &Node, right: &Node) -> Result<Prim, CompileError> {
    let (l, r) = (value_prim(left)?, value_prim(right)?);
    Ok(match (l, r) {
        (Prim::Float, _) | (_, Prim::Float) => Prim::Float,
        (Prim::Char, Prim::Char) => Prim::Char,
        _ => Prim::Int,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::lang::build::*;
    use crate::lang::{CompareOp, Type};
    use pretty_assertions::assert_eq;

    /// Instructions and labels of `main`, indices stripped.
    fn main_code(locals: Vec<Node>, body: Vec<Node>) -> Vec<String> {
        let units = vec![unit(vec![
            function("a", Type::INT, vec![], vec![], vec![ret(Some(int(0)))]),
            function("b", Type::INT, vec![], vec![], vec![ret(Some(int(1)))]),
            function("main", Type::INT, vec![], locals, body),
        ])];
        let ir = Compiler::new().compile_units(&units).unwrap();
        let main = ir.split(".FUNC 4 main").nth(1).unwrap_or_default();
        main.lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('.') && !l.starts_with(';') && !l.is_empty())
            .map(|l| match l.split_once(' ') {
                Some((idx, rest)) if idx.chars().all(|c| c.is_ascii_digit()) => rest.to_string(),
                _ => l.to_string(),
            })
            .collect()
    }

    fn a() -> Node {
        call("a", Type::INT, vec![])
    }

    fn b() -> Node {
        call("b", Type::INT, vec![])
    }

    #[test]
    fn test_if_comparison_is_one_inverted_jump() {
        let code = main_code(
            vec![],
            vec![if_(compare(CompareOp::Lt, int(1), int(2)), ret(Some(int(1))), None), ret(Some(int(2)))],
        );
        assert_eq!(
            code,
            vec!["pushv 0x1", "pushv 0x2", ">=i I0", "pushv 0x1", "ret", "I0:", "pushv 0x2", "ret"]
        );
    }

    #[test]
    fn test_if_else_layout() {
        let code = main_code(
            vec![],
            vec![if_(a(), ret(Some(int(1))), Some(ret(Some(int(2)))))],
        );
        assert_eq!(
            code,
            vec![
                "call 2", "==0i I0", "pushv 0x1", "ret", "goto I1",
                "I0:", "pushv 0x2", "ret", "I1:", "ret",
            ]
        );
    }

    #[test]
    fn test_and_jump_if_false_shares_label() {
        let code = main_code(vec![], vec![if_(and(a(), b()), ret(Some(int(1))), None)]);
        assert_eq!(
            code,
            vec!["call 2", "==0i I0", "call 3", "==0i I0", "pushv 0x1", "ret", "I0:", "ret"]
        );
    }

    #[test]
    fn test_or_jump_if_false_skips_rhs() {
        let code = main_code(vec![], vec![if_(or(a(), b()), ret(Some(int(1))), None)]);
        // I0 else, I1 fall-through into the then-branch
        assert_eq!(
            code,
            vec!["call 2", "!=0i I1", "call 3", "==0i I0", "I1:", "pushv 0x1", "ret", "I0:", "ret"]
        );
    }

    #[test]
    fn test_not_flips_polarity() {
        let code = main_code(vec![], vec![if_(not(a()), ret(Some(int(1))), None)]);
        assert_eq!(code, vec!["call 2", "!=0i I0", "pushv 0x1", "ret", "I0:", "ret"]);
    }

    #[test]
    fn test_do_while_jumps_back_when_true() {
        let code = main_code(
            vec![],
            vec![do_while(block(vec![]), and(a(), b())), ret(Some(int(0)))],
        );
        // I0 body, I1 continue, I2 exit, I3 skip
        assert_eq!(
            code,
            vec![
                "I0:", "I1:", "call 2", "==0i I3", "call 3", "!=0i I0", "I3:", "I2:",
                "pushv 0x0", "ret",
            ]
        );
    }

    #[test]
    fn test_comparison_value_is_materialized() {
        let code = main_code(vec![], vec![ret(Some(compare(CompareOp::Eq, a(), int(3))))]);
        assert_eq!(
            code,
            vec![
                "call 2", "pushv 0x3", "==i I0", "pushv 0x0", "goto I1", "I0:", "pushv 0x1", "I1:",
                "ret",
            ]
        );
    }

    #[test]
    fn test_mixed_comparison_promotes_to_float() {
        let code = main_code(
            vec![decl("c", Type::CHAR)],
            vec![if_(compare(CompareOp::Gt, var("c", Type::CHAR), real(0.5)), ret(Some(int(1))), None)],
        );
        assert_eq!(code[..4].to_vec(), vec!["push L0", "convif", "pushv 0x3f000000", "<=f I0"]);
    }

    #[test]
    fn test_char_comparison_stays_char() {
        let code = main_code(
            vec![decl("c", Type::CHAR)],
            vec![if_(compare(CompareOp::Ne, var("c", Type::CHAR), chr(b'x')), ret(Some(int(1))), None)],
        );
        assert_eq!(code[..3].to_vec(), vec!["push L0", "pushv 0x78", "==c I0"]);
    }

    #[test]
    fn test_float_condition_compares_with_float_zero() {
        let code = main_code(
            vec![decl("f", Type::FLOAT)],
            vec![while_(var("f", Type::FLOAT), block(vec![]))],
        );
        assert_eq!(code, vec!["I0:", "push L0", "==0f I1", "goto I0", "I1:", "ret"]);
    }

    #[test]
    fn test_ternary_layout() {
        let code = main_code(
            vec![],
            vec![ret(Some(ternary(Type::FLOAT, a(), int(1), real(2.0))))],
        );
        assert_eq!(
            code,
            vec![
                "call 2", "==0i I0", "pushv 0x1", "convif", "goto I1", "I0:", "pushv 0x40000000",
                "I1:", "convfi", "ret",
            ]
        );
    }
}
