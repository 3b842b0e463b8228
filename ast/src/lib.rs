//! Syntax tree handed to the garnet lowering pass.
//!
//! Nodes live in a `bumpalo::Bump` arena owned by the caller; children are
//! plain `&'arena` references so the tree is `Copy` all the way down. The
//! text parser is not part of this crate: trees are produced by a front end
//! (or by hand, in tests) through [`AstBuilder`].

mod builder;
mod node;

pub use builder::AstBuilder;
pub use node::{
    KeywordParameter, Node, NodeKind, NodeRef, OptionalParameter, Parameters,
};
