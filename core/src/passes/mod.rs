//! The pass pipeline.
//!
//! ```text
//! Lowered -> Scoped -> Captured -> BreaksWired -> ReturnsWired
//! ```
//!
//! Each pass runs exactly once and only from its predecessor stage; running
//! one out of order is a [`CompileError::OutOfOrder`]. [`Pipeline::finish`]
//! runs whatever is left.

use garnet_ast::Node;
use tracing::debug;

use crate::env::{ScopeArena, build_scopes};
use crate::error::CompileError;
use crate::instructions::{Instruction, Listing};
use crate::options::CompilerOptions;

pub mod break_points;
pub mod capture;
pub mod lower;
pub mod return_points;

#[cfg(test)]
mod passes_test;

/// How far a program has travelled through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Lowered,
    Scoped,
    Captured,
    BreaksWired,
    ReturnsWired,
}

/// A program in IR form together with its scopes.
#[derive(Debug, Clone)]
pub struct Ir {
    pub instructions: Vec<Instruction>,
    pub scopes: ScopeArena,
    /// Deepest operand stack any single frame reaches.
    pub max_stack_size: usize,
}

impl Ir {
    /// Human readable disassembly.
    pub fn listing(&self) -> Listing<'_> {
        Listing(&self.instructions)
    }
}

pub struct Pipeline {
    ir: Ir,
    stage: Stage,
    interactive: bool,
}

impl Pipeline {
    /// Lower `program` and start a pipeline at [`Stage::Lowered`].
    pub fn lower(program: &Node<'_>, options: &CompilerOptions) -> Result<Self, CompileError> {
        let lowered = lower::lower(program, options)?;
        Ok(Self::from_instructions(
            lowered.instructions,
            lowered.max_stack_size,
            options,
        ))
    }

    /// Start a pipeline from already lowered instructions.
    pub fn from_instructions(
        instructions: Vec<Instruction>,
        max_stack_size: usize,
        options: &CompilerOptions,
    ) -> Self {
        Self {
            ir: Ir {
                instructions,
                scopes: ScopeArena::new(),
                max_stack_size,
            },
            stage: Stage::Lowered,
            interactive: options.interactive,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    pub fn into_ir(self) -> Ir {
        self.ir
    }

    pub fn build_scopes(&mut self) -> Result<(), CompileError> {
        self.advance(Stage::Lowered, |ir, _| {
            build_scopes(&mut ir.instructions, &mut ir.scopes)?;
            Ok(())
        })
    }

    pub fn resolve_captures(&mut self) -> Result<(), CompileError> {
        self.advance(Stage::Scoped, |ir, interactive| {
            capture::resolve_captures(&mut ir.instructions, &mut ir.scopes, interactive)
        })
    }

    pub fn wire_break_points(&mut self) -> Result<(), CompileError> {
        self.advance(Stage::Captured, |ir, _| {
            break_points::wire_break_points(&mut ir.instructions, &mut ir.scopes)
        })
    }

    pub fn wire_return_points(&mut self) -> Result<(), CompileError> {
        self.advance(Stage::BreaksWired, |ir, _| {
            return_points::wire_return_points(&mut ir.instructions, &mut ir.scopes)
        })
    }

    /// Run the remaining passes and hand out the finished IR.
    pub fn finish(mut self) -> Result<Ir, CompileError> {
        if self.stage == Stage::Lowered {
            self.build_scopes()?;
        }
        if self.stage == Stage::Scoped {
            self.resolve_captures()?;
        }
        if self.stage == Stage::Captured {
            self.wire_break_points()?;
        }
        if self.stage == Stage::BreaksWired {
            self.wire_return_points()?;
        }
        Ok(self.ir)
    }

    fn advance(
        &mut self,
        expected: Stage,
        pass: impl FnOnce(&mut Ir, bool) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        if self.stage != expected {
            return Err(CompileError::OutOfOrder {
                expected,
                actual: self.stage,
            });
        }
        pass(&mut self.ir, self.interactive)?;
        self.stage = match expected {
            Stage::Lowered => Stage::Scoped,
            Stage::Scoped => Stage::Captured,
            Stage::Captured => Stage::BreaksWired,
            Stage::BreaksWired | Stage::ReturnsWired => Stage::ReturnsWired,
        };
        debug!(stage = ?self.stage, instructions = self.ir.instructions.len(), "pass complete");
        Ok(())
    }
}

/// Lower `program` and run every pass.
pub fn compile(program: &Node<'_>, options: &CompilerOptions) -> Result<Ir, CompileError> {
    Pipeline::lower(program, options)?.finish()
}
