//! Lexical scopes attached to IR instructions.

mod builder;
mod scope;

pub use builder::{ScopeBuilder, build_scopes};
pub use scope::{Resolution, Scope, ScopeArena, ScopeId, ScopeKind, VarSlot};

#[cfg(test)]
mod builder_test;
