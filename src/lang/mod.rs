//! # Typed C abstract syntax tree
//!
//! This module defines the tree handed to code generation by the parser and
//! type checker. Every node carries its token kind, its resolved type, its
//! ordered children, an optional literal and its source line.
//!
//! ## Conventions
//!
//! - Children layouts are documented on each [`node::NodeKind`] variant.
//! - Types are already resolved; code generation never infers them.
//! - Translation units travel between processes encoded with `postcard`.

pub mod build;
pub mod node;
pub mod program;
pub mod types;
pub mod value;

pub use node::{BinaryOp, CompareOp, Node, NodeKind};
pub use types::{Prim, Type};
pub use value::Literal;
