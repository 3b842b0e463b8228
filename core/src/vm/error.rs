//! Run-time errors and unwind signals.
//!
//! # Error Categories
//!
//! - **Runtime errors**: a guest exception nobody rescued. Inside the program
//!   these are ordinary values that `rescue` can catch.
//!
//! - **Resource exceeded errors**: fatal limit violations (call depth, loop
//!   iterations). `rescue` and `ensure` never see them.
//!
//! - **Structural errors**: the program does not nest the way regions
//!   require. Only reachable with hand-built or corrupted instruction lists.
//!
//! Non-local exits (`break`, `next`, `redo`, `retry`, `return`) are not
//! errors: they travel as [`Unwind`] signals through the same `Result`
//! channel and are absorbed by the frame or region whose id they carry.

use thiserror::Error;

use super::value::Value;
use crate::error::StructuralError;
use crate::instructions::BreakPoint;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Runtime(#[from] GuestError),

    #[error(transparent)]
    ResourceExceeded(#[from] ResourceExceededError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("operand stack underflow at instruction {index}")]
    StackUnderflow { index: usize },
}

/// An exception that reached the top of the program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({class})")]
pub struct GuestError {
    /// Name of the exception's class, e.g. `ZeroDivisionError`.
    pub class: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceExceededError {
    #[error("stack level too deep ({depth} frames, limit {max_depth})")]
    StackOverflow { depth: usize, max_depth: usize },

    #[error("loop iteration limit of {max} exceeded")]
    IterationLimit { max: usize },
}

/// Anything that leaves the current instruction sequence early.
#[derive(Debug, Clone)]
pub enum Unwind {
    /// `break`, aimed at the loop or call carrying `id`.
    Break { id: Option<BreakPoint>, value: Value },
    /// `return`; untagged returns leave the current frame.
    Return {
        id: Option<BreakPoint>,
        value: Value,
    },
    Next(Value),
    Redo,
    Retry(BreakPoint),
    /// A guest exception object.
    Raise(Value),
    /// Not catchable by the program.
    Fatal(ExecutionError),
}

impl Unwind {
    /// Whether an `ensure` region runs its handler for this signal.
    pub fn runs_ensure(&self) -> bool {
        !matches!(self, Unwind::Fatal(_))
    }

    /// Short name used in `LocalJumpError` messages and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Unwind::Break { .. } => "break",
            Unwind::Return { .. } => "return",
            Unwind::Next(_) => "next",
            Unwind::Redo => "redo",
            Unwind::Retry(_) => "retry",
            Unwind::Raise(_) => "raise",
            Unwind::Fatal(_) => "fatal",
        }
    }
}

impl From<ExecutionError> for Unwind {
    fn from(error: ExecutionError) -> Self {
        Unwind::Fatal(error)
    }
}

impl From<StructuralError> for Unwind {
    fn from(error: StructuralError) -> Self {
        Unwind::Fatal(error.into())
    }
}

impl From<ResourceExceededError> for Unwind {
    fn from(error: ResourceExceededError) -> Self {
        Unwind::Fatal(error.into())
    }
}
