//! Garnet - the intermediate representation of a Ruby-like language
//!
//! # Overview
//!
//! Garnet turns a syntax tree into a flat, region-structured instruction
//! list, resolves scopes and closure captures, and wires non-local exits
//! (`break`, `return`, `retry`). A finished program can then be:
//!
//! - run on the built-in interpreter
//! - serialized to compact bytecode and loaded back
//! - emitted as C++-flavoured native source
//!
//! # Quick Start
//!
//! ```
//! use bumpalo::Bump;
//! use garnet::ast::AstBuilder;
//! use garnet::{Compiler, EngineOptions};
//!
//! let arena = Bump::new();
//! let b = AstBuilder::new(&arena);
//! let program = b.program(&[b.fcall("puts", &[b.string("hello")])]);
//!
//! let compiler = Compiler::new(EngineOptions::default());
//! let compiled = compiler.compile(program).unwrap();
//!
//! let execution = compiled.run().unwrap();
//! assert_eq!(execution.output, "hello\n");
//!
//! // Bytecode keeps the instructions; loading runs the passes again.
//! let loaded = compiler.from_bytecode(&compiled.to_bytecode()).unwrap();
//! assert_eq!(loaded.run().unwrap().output, "hello\n");
//! ```
//!
//! # Layers
//!
//! The facade only strings the stages together. For finer control use
//! [`garnet_core`] directly: [`Pipeline`] runs the passes one at a time and
//! [`InstructionManager`] edits instruction lists structurally.

pub use garnet_ast as ast;
pub use garnet_core::vm::{Execution, GuestError, Value};
pub use garnet_core::{
    CompilerOptions, EngineOptions, ExecutionOptions, Instruction, InstructionManager, Ir, Op, Pipeline, Stage,
};

mod compiler;
mod error;

pub use compiler::{CompiledProgram, Compiler};
pub use error::Error;
