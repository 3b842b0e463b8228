//! Public error type for the garnet API.
//!
//! Every failure of the pipeline, the codec, the emitter or the interpreter
//! converts into [`Error`] at the API boundary. Each variant carries a stable
//! diagnostic code (`garnet::lowering`, `garnet::runtime`, ...) for tools that
//! render errors with `miette`.

use garnet_core::bytecode::BytecodeError;
use garnet_core::codegen::EmitError;
use garnet_core::vm::{ExecutionError, GuestError, ResourceExceededError};
use garnet_core::{CompileError, LoweringError, Stage, StructuralError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum Error {
    /// Instructions do not nest the way regions require.
    #[error(transparent)]
    #[diagnostic(code(garnet::structural))]
    Structural(StructuralError),

    /// The program uses a construct that cannot be lowered.
    #[error(transparent)]
    #[diagnostic(code(garnet::lowering))]
    Lowering(LoweringError),

    /// A pass ran before the one it depends on.
    #[error("pass for stage {expected:?} ran at stage {actual:?}")]
    #[diagnostic(code(garnet::pipeline), help("run the passes in pipeline order, or use `Pipeline::finish`"))]
    Pipeline { expected: Stage, actual: Stage },

    #[error(transparent)]
    #[diagnostic(code(garnet::bytecode))]
    Bytecode(#[from] BytecodeError),

    #[error(transparent)]
    #[diagnostic(code(garnet::emit))]
    Emit(EmitError),

    /// A guest exception nobody rescued.
    #[error("{0}")]
    #[diagnostic(code(garnet::runtime))]
    Runtime(GuestError),

    #[error(transparent)]
    #[diagnostic(
        code(garnet::resource_exceeded),
        help("raise the limits in `ExecutionOptions` if the program is trusted")
    )]
    ResourceExceeded(ResourceExceededError),

    /// The interpreter's operand stack ran dry: corrupted instructions.
    #[error("operand stack underflow at instruction {index}")]
    #[diagnostic(code(garnet::structural))]
    StackUnderflow { index: usize },
}

impl Error {
    /// Class and message of the guest exception, for runtime errors.
    pub fn guest(&self) -> Option<&GuestError> {
        match self {
            Error::Runtime(error) => Some(error),
            _ => None,
        }
    }
}

impl From<StructuralError> for Error {
    fn from(error: StructuralError) -> Self {
        Error::Structural(error)
    }
}

impl From<CompileError> for Error {
    fn from(error: CompileError) -> Self {
        match error {
            CompileError::Structural(error) => Error::Structural(error),
            CompileError::Lowering(error) => Error::Lowering(error),
            CompileError::OutOfOrder { expected, actual } => Error::Pipeline { expected, actual },
        }
    }
}

impl From<EmitError> for Error {
    fn from(error: EmitError) -> Self {
        match error {
            EmitError::Structural(error) => Error::Structural(error),
            other => Error::Emit(other),
        }
    }
}

impl From<ExecutionError> for Error {
    fn from(error: ExecutionError) -> Self {
        match error {
            ExecutionError::Runtime(error) => Error::Runtime(error),
            ExecutionError::ResourceExceeded(error) => Error::ResourceExceeded(error),
            ExecutionError::Structural(error) => Error::Structural(error),
            ExecutionError::StackUnderflow { index } => Error::StackUnderflow { index },
        }
    }
}
