//! Native source emission.
//!
//! Turns finished IR into C++-flavoured text against an opaque runtime API
//! (`send`, `env_get`, `const_find`, `GARNET_TRY`, ...). Methods, blocks and
//! class bodies become separate functions; the program itself becomes
//! `garnet_main`.
//!
//! The emitter runs the operand stack abstractly: every stack slot holds a
//! C++ expression (a literal or a temporary), so no stack exists at run
//! time. Regions become structured C++ blocks; values a region leaves on the
//! stack are assigned to result temporaries declared before it.

use thiserror::Error;

use crate::error::StructuralError;
use crate::options::CompilerOptions;
use crate::passes::Ir;

mod instructions;
mod transform;

#[cfg(test)]
mod codegen_test;

pub use transform::Transform;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("abstract stack underflow at instruction {index}")]
    StackUnderflow { index: usize },

    #[error("instruction {index} expected a value but found an argument count")]
    ExpectedValue { index: usize },

    #[error("instruction {index} expected an argument count on the stack")]
    ExpectedArgc { index: usize },

    #[error("the parts of the region opened at instruction {index} leave different stack depths")]
    UnbalancedBranches { index: usize },

    #[error("variable `{name}` used at instruction {index} has no slot")]
    UnresolvedVariable { name: String, index: usize },

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Emit native source for a program that went through every pass.
pub fn emit(ir: &Ir, options: &CompilerOptions) -> Result<String, EmitError> {
    let source = Transform::new(ir).emit_program(&options.file_name)?;
    tracing::debug!(
        file = %options.file_name,
        bytes = source.len(),
        "emitted native source"
    );
    Ok(source)
}
