use tracing::trace;

use crate::env::{Scope, ScopeArena, ScopeId, ScopeKind};
use crate::error::StructuralError;
use crate::instructions::{Instruction, Label, Op, Until};

/// Attach a scope to every instruction of a complete program.
///
/// Creates the top scope if the arena is empty. Instructions that already
/// carry a scope keep it, so running the builder twice is harmless.
pub fn build_scopes(
    instructions: &mut [Instruction],
    scopes: &mut ScopeArena,
) -> Result<(), StructuralError> {
    let top = scopes.top();
    let mut builder = ScopeBuilder::new(scopes, top);
    builder.scope(instructions, 0)?;
    builder.finish()
}

/// Single forward pass tracking the current scope and the open regions.
pub struct ScopeBuilder<'s> {
    scopes: &'s mut ScopeArena,
    current: ScopeId,
    open: Vec<(usize, Label)>,
}

impl<'s> ScopeBuilder<'s> {
    pub fn new(scopes: &'s mut ScopeArena, current: ScopeId) -> Self {
        Self {
            scopes,
            current,
            open: Vec::new(),
        }
    }

    /// Scope `instructions`, whose first element sits at `base` in the full
    /// program (scope openers and closers are recorded as program indices).
    pub fn scope(
        &mut self,
        instructions: &mut [Instruction],
        base: usize,
    ) -> Result<(), StructuralError> {
        for (offset, instruction) in instructions.iter_mut().enumerate() {
            let index = base + offset;
            if let Some(label) = instruction.op.opens() {
                let already_scoped = instruction.env.is_some();
                let env = *instruction.env.get_or_insert(self.current);
                let existing = if already_scoped {
                    self.scopes.opened_by(index)
                } else {
                    None
                };
                self.current = match existing {
                    Some(existing) => existing,
                    None => self.open_scope(&instruction.op, env, index),
                };
                self.open.push((index, label));
                continue;
            }

            match instruction.op.terminates() {
                Some((until, found)) => {
                    let Some(&(_, expected)) = self.open.last() else {
                        return Err(StructuralError::Unbalanced { found, index });
                    };
                    if expected != found {
                        return Err(StructuralError::LabelMismatch {
                            expected,
                            found,
                            index,
                        });
                    }
                    // Terminators belong to the inner scope.
                    instruction.env.get_or_insert(self.current);
                    if until == Until::End {
                        self.open.pop();
                        let scope = self.scopes.get_mut(self.current);
                        scope.closer = Some(index);
                        if let Some(outer) = scope.outer {
                            self.current = outer;
                        }
                    }
                }
                None => {
                    instruction.env.get_or_insert(self.current);
                }
            }
        }
        Ok(())
    }

    /// Fail if a region is still open.
    pub fn finish(self) -> Result<(), StructuralError> {
        match self.open.last() {
            Some(&(start, label)) => Err(StructuralError::Unterminated { label, start }),
            None => Ok(()),
        }
    }

    fn open_scope(&mut self, op: &Op, outer: ScopeId, index: usize) -> ScopeId {
        let kind = match op {
            Op::If | Op::Try { .. } => ScopeKind::Conditional,
            Op::While { .. } => ScopeKind::Loop,
            Op::DefineMethod { .. } => ScopeKind::Method,
            Op::DefineBlock { .. } => ScopeKind::Block,
            Op::DefineClass { .. } | Op::WithSingleton => ScopeKind::Class,
            _ => ScopeKind::Module,
        };
        let mut scope = Scope::new(kind, Some(outer));
        scope.opener = Some(index);
        scope.is_lambda = matches!(op, Op::DefineBlock { is_lambda: true, .. });
        let id = self.scopes.push(scope);
        trace!(scope = id.0, %kind, opener = index, "opened scope");
        id
    }
}
