use super::node::{Node, NodeKind};

/// Encode a translation unit in the parser hand-off format.
pub fn encode_unit(unit: &Node) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(unit)
}

/// Decode a translation unit produced by [`encode_unit`].
pub fn decode_unit(bytes: &[u8]) -> Result<Node, postcard::Error> {
    postcard::from_bytes(bytes)
}

/// Function definitions of a translation unit, in source order.
pub fn function_defs(unit: &Node) -> impl Iterator<Item = &Node> {
    unit.children
        .iter()
        .filter(|n| n.kind == NodeKind::FunctionDef)
}
