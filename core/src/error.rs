//! Compile-time error types.
//!
//! Byte-format errors live in [`crate::bytecode::BytecodeError`], emission
//! errors in [`crate::codegen::EmitError`] and run-time errors in
//! [`crate::vm::ExecutionError`].

use thiserror::Error;

use crate::instructions::Label;
use crate::passes::Stage;

/// The instruction list does not nest the way regions require.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("unterminated `{label}` region opened at instruction {start}")]
    Unterminated { label: Label, start: usize },

    #[error("instruction {index} closes a `{found}` region but `{expected}` is open")]
    LabelMismatch {
        expected: Label,
        found: Label,
        index: usize,
    },

    #[error("instruction {index} closes a `{found}` region but none is open")]
    Unbalanced { found: Label, index: usize },

    #[error("unknown syntax node `{0}` in this position")]
    UnknownNode(&'static str),

    #[error("block ending at instruction {index} is not followed by its consumer")]
    MissingBlockConsumer { index: usize },

    #[error("instruction {index} has no scope")]
    Unscoped { index: usize },
}

/// The program is well formed but cannot be lowered as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("line {line}: unsupported construct: {construct}")]
    Unsupported { construct: String, line: u32 },

    #[error("line {line}: Invalid break")]
    InvalidBreak { line: u32 },

    #[error("line {line}: Invalid next")]
    InvalidNext { line: u32 },

    #[error("line {line}: Invalid redo")]
    InvalidRedo { line: u32 },

    #[error("line {line}: Invalid retry")]
    InvalidRetry { line: u32 },

    #[error("line {line}: Invalid return in class/module body")]
    InvalidReturn { line: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Lowering(#[from] LoweringError),

    #[error("pass expects the pipeline at {expected:?} but it is at {actual:?}")]
    OutOfOrder { expected: Stage, actual: Stage },
}
