//! The garnet compiler and its compiled programs.

use garnet_ast::Node;
use garnet_core::passes::{Ir, Pipeline, compile};
use garnet_core::vm::{self, Execution};
use garnet_core::{CompilerOptions, EngineOptions, ExecutionOptions, bytecode, codegen};

use crate::Error;

/// Compiles syntax trees and bytecode into runnable programs.
///
/// A compiler holds the default options; every compiled program carries a
/// copy so it can run and emit without the compiler around.
///
/// # Example
///
/// ```
/// use bumpalo::Bump;
/// use garnet::ast::AstBuilder;
/// use garnet::{Compiler, EngineOptions, Value};
///
/// let arena = Bump::new();
/// let b = AstBuilder::new(&arena);
/// let program = b.program(&[b.call(Some(b.int(40)), "+", &[b.int(2)])]);
///
/// let compiler = Compiler::new(EngineOptions::default());
/// let compiled = compiler.compile(program).unwrap();
/// assert_eq!(compiled.run().unwrap().value, Value::Int(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: EngineOptions,
}

impl Compiler {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Lower `program` and run every pass with the default compiler options.
    pub fn compile(&self, program: &Node<'_>) -> Result<CompiledProgram, Error> {
        self.compile_with(program, &self.options.default_compiler_options)
    }

    pub fn compile_with(&self, program: &Node<'_>, options: &CompilerOptions) -> Result<CompiledProgram, Error> {
        let ir = compile(program, options)?;
        Ok(self.program(ir, options))
    }

    /// Load a program from bytecode.
    ///
    /// Bytecode holds instructions only; scopes, captures and non-local exit
    /// wiring are rebuilt by the passes.
    pub fn from_bytecode(&self, bytes: &[u8]) -> Result<CompiledProgram, Error> {
        let instructions = bytecode::decode(bytes)?;
        let options = &self.options.default_compiler_options;
        // Without the lowering's bookkeeping, the instruction count bounds
        // the operand stack depth of any frame.
        let max_stack_size = instructions.len();
        let ir = Pipeline::from_instructions(instructions, max_stack_size, options).finish()?;
        Ok(self.program(ir, options))
    }

    fn program(&self, ir: Ir, options: &CompilerOptions) -> CompiledProgram {
        CompiledProgram {
            ir,
            compiler_options: options.clone(),
            execution_options: self.options.default_execution_options.clone(),
        }
    }
}

/// A program that went through every pass.
///
/// Programs own their IR and can be run any number of times; every run
/// starts from a fresh machine.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    ir: Ir,
    compiler_options: CompilerOptions,
    execution_options: ExecutionOptions,
}

impl CompiledProgram {
    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    /// Run on the interpreter with the compiler's default limits.
    pub fn run(&self) -> Result<Execution, Error> {
        self.run_with(self.execution_options.clone())
    }

    pub fn run_with(&self, options: ExecutionOptions) -> Result<Execution, Error> {
        Ok(vm::execute(&self.ir, options)?)
    }

    pub fn to_bytecode(&self) -> Vec<u8> {
        bytecode::encode(&self.ir.instructions)
    }

    /// Native source for the program, named after the compiler options'
    /// file name.
    pub fn emit_native(&self) -> Result<String, Error> {
        Ok(codegen::emit(&self.ir, &self.compiler_options)?)
    }
}
