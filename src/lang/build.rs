//! Constructors for typed AST nodes.
//!
//! Front ends and tests build trees with these instead of filling in
//! [`Node`] fields by hand. Every constructor leaves `line` at 0; chain
//! [`Node::at_line`] where line comments matter.

use super::node::{BinaryOp, CompareOp, Node, NodeKind};
use super::types::Type;
use super::value::Literal;

pub fn unit(items: Vec<Node>) -> Node {
    Node::new(NodeKind::TranslationUnit, Type::NONE).with_children(items)
}

/// `ret name(params) { locals; body }`
pub fn function(name: &str, ret: Type, params: Vec<Node>, locals: Vec<Node>, body: Vec<Node>) -> Node {
    Node::new(NodeKind::FunctionDef, ret)
        .with_value(Literal::Ident(name.to_string()))
        .with_children(vec![
            Node::new(NodeKind::ParamList, Type::NONE).with_children(params),
            Node::new(NodeKind::DeclList, Type::NONE).with_children(locals),
            block(body),
        ])
}

pub fn prototype(name: &str, ret: Type) -> Node {
    Node::new(NodeKind::Prototype, ret).with_value(Literal::Ident(name.to_string()))
}

pub fn decl(name: &str, ty: Type) -> Node {
    Node::new(NodeKind::Decl, ty).with_value(Literal::Ident(name.to_string()))
}

pub fn array_decl(name: &str, element: Type, size: usize) -> Node {
    let mut node = decl(name, element.array());
    node.array_size = size;
    node
}

/// A declaration statement grouping several names.
pub fn variable(ty: Type, names: Vec<Node>) -> Node {
    Node::new(NodeKind::Variable, ty).with_children(names)
}

pub fn block(stmts: Vec<Node>) -> Node {
    Node::new(NodeKind::Block, Type::NONE).with_children(stmts)
}

pub fn empty() -> Node {
    Node::new(NodeKind::Empty, Type::NONE)
}

pub fn int(n: i32) -> Node {
    Node::new(NodeKind::IntConst, Type::INT).with_value(Literal::Int(n))
}

pub fn chr(c: u8) -> Node {
    Node::new(NodeKind::CharConst, Type::CHAR).with_value(Literal::Char(c))
}

pub fn real(x: f32) -> Node {
    Node::new(NodeKind::RealConst, Type::FLOAT).with_value(Literal::Real(x))
}

pub fn string(s: &str) -> Node {
    Node::new(NodeKind::StrConst, Type::CHAR.array()).with_value(Literal::Str(s.to_string()))
}

pub fn var(name: &str, ty: Type) -> Node {
    Node::new(NodeKind::LValue, ty).with_value(Literal::Ident(name.to_string()))
}

/// `name[index]`, typed as the element.
pub fn index(name: &str, element: Type, index: Node) -> Node {
    var(name, element).with_children(vec![index])
}

pub fn binary(op: BinaryOp, ty: Type, left: Node, right: Node) -> Node {
    Node::new(NodeKind::Binary(op), ty).with_children(vec![left, right])
}

pub fn compare(op: CompareOp, left: Node, right: Node) -> Node {
    Node::new(NodeKind::Compare(op), Type::INT).with_children(vec![left, right])
}

pub fn and(left: Node, right: Node) -> Node {
    Node::new(NodeKind::And, Type::INT).with_children(vec![left, right])
}

pub fn or(left: Node, right: Node) -> Node {
    Node::new(NodeKind::Or, Type::INT).with_children(vec![left, right])
}

pub fn not(operand: Node) -> Node {
    Node::new(NodeKind::Not, Type::INT).with_children(vec![operand])
}

pub fn negate(operand: Node) -> Node {
    let ty = operand.ty.element();
    Node::new(NodeKind::Negate, ty).with_children(vec![operand])
}

pub fn bit_not(operand: Node) -> Node {
    let ty = operand.ty.element();
    Node::new(NodeKind::BitNot, ty).with_children(vec![operand])
}

/// Increment or decrement of `target`, typed as the target.
pub fn step(kind: NodeKind, target: Node) -> Node {
    let ty = target.ty.element();
    Node::new(kind, ty).with_children(vec![target])
}

pub fn call(name: &str, ret: Type, args: Vec<Node>) -> Node {
    Node::new(NodeKind::Call, ret)
        .with_value(Literal::Ident(name.to_string()))
        .with_children(args)
}

pub fn cast(to: Type, operand: Node) -> Node {
    Node::new(NodeKind::Cast, to).with_children(vec![operand])
}

pub fn ternary(ty: Type, cond: Node, then: Node, otherwise: Node) -> Node {
    Node::new(NodeKind::Ternary, ty).with_children(vec![cond, then, otherwise])
}

pub fn assign(target: Node, value: Node) -> Node {
    let ty = target.ty.element();
    Node::new(NodeKind::Assign, ty).with_children(vec![target, value])
}

pub fn compound_assign(op: BinaryOp, target: Node, value: Node) -> Node {
    let ty = target.ty.element();
    Node::new(NodeKind::CompoundAssign(op), ty).with_children(vec![target, value])
}

pub fn ret(value: Option<Node>) -> Node {
    Node::new(NodeKind::Return, Type::NONE).with_children(value.into_iter().collect())
}

pub fn if_(cond: Node, then: Node, otherwise: Option<Node>) -> Node {
    let mut children = vec![cond, then];
    children.extend(otherwise);
    Node::new(NodeKind::If, Type::NONE).with_children(children)
}

pub fn while_(cond: Node, body: Node) -> Node {
    Node::new(NodeKind::While, Type::NONE).with_children(vec![cond, body])
}

pub fn do_while(body: Node, cond: Node) -> Node {
    Node::new(NodeKind::DoWhile, Type::NONE).with_children(vec![body, cond])
}

pub fn for_(init: Node, cond: Node, step: Node, body: Node) -> Node {
    Node::new(NodeKind::For, Type::NONE).with_children(vec![init, cond, step, body])
}

pub fn break_() -> Node {
    Node::new(NodeKind::Break, Type::NONE)
}

pub fn continue_() -> Node {
    Node::new(NodeKind::Continue, Type::NONE)
}
