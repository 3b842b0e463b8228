//! Intermediate representation for the garnet compiler.
//!
//! The pipeline lowers a [`garnet_ast`] tree into a flat list of
//! [`Instruction`]s, attaches lexical scopes, resolves variable captures and
//! wires non-local exits. The result can be emitted as native source
//! ([`codegen`]), serialized ([`bytecode`]) or executed directly ([`vm`]).

pub mod bytecode;
pub mod codegen;
pub mod env;
pub mod error;
pub mod instructions;
pub mod manager;
pub mod options;
pub mod passes;
pub mod vm;

#[cfg(test)]
mod manager_test;

pub use env::{Scope, ScopeArena, ScopeId, ScopeKind, VarSlot};
pub use error::{CompileError, LoweringError, StructuralError};
pub use instructions::{BreakPoint, Instruction, Label, Op, Opcode};
pub use manager::InstructionManager;
pub use options::{CompilerOptions, EngineOptions, ExecutionOptions};
pub use passes::{Ir, Pipeline, Stage};

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level
    /// Call this at the start of tests where you want to see logging output
    ///
    /// # Example
    /// ```ignore
    /// #[test]
    /// fn test_capture() {
    ///     test_utils::init_test_logging();
    ///     // ... your test code
    /// }
    /// ```
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Try to initialize, ignore error if already initialized
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
