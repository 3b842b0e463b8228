//! Cursor and structural utilities over an instruction list.
//!
//! Every pass and the VM share these: scanning a region to its terminator,
//! walking with a cursor while editing around it, and splicing in new
//! instructions with their scopes fixed up.

use crate::env::{ScopeArena, ScopeBuilder, ScopeId};
use crate::error::StructuralError;
use crate::instructions::{Instruction, Label, Op, Until};

pub struct InstructionManager<'ir> {
    instructions: &'ir mut Vec<Instruction>,
    scopes: &'ir mut ScopeArena,
    ip: usize,
}

impl<'ir> InstructionManager<'ir> {
    pub fn new(instructions: &'ir mut Vec<Instruction>, scopes: &'ir mut ScopeArena) -> Self {
        Self {
            instructions,
            scopes,
            ip: 0,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn set_ip(&mut self, ip: usize) {
        self.ip = ip;
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    pub fn scopes(&self) -> &ScopeArena {
        self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeArena {
        self.scopes
    }

    /// The instruction under the cursor.
    pub fn peek(&self) -> Option<&Instruction> {
        self.instructions.get(self.ip)
    }

    /// Visit every instruction in order.
    ///
    /// The visitor receives the manager and the index being visited, with the
    /// cursor already past it. Instructions the visitor inserts before the
    /// cursor are not visited; ones inserted at or after it are.
    pub fn walk<E, F>(&mut self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&mut Self, usize) -> Result<(), E>,
    {
        self.ip = 0;
        while self.ip < self.instructions.len() {
            let at = self.ip;
            self.ip += 1;
            visit(self, at)?;
        }
        Ok(())
    }

    /// Collect the region body starting at the cursor up to the terminator
    /// of `label` matching one of `until`, skipping nested regions.
    ///
    /// The cursor ends just past the terminator, which is returned alongside
    /// the body.
    pub fn fetch_block(
        &mut self,
        until: &[Until],
        label: Label,
    ) -> Result<(Vec<Instruction>, Instruction), StructuralError> {
        let end = skip_block(self.instructions, self.ip, until, label)?;
        let body = self.instructions[self.ip..end].to_vec();
        let terminator = self.instructions[end].clone();
        self.ip = end + 1;
        Ok((body, terminator))
    }

    /// Splice `new` in before `at`, scoping the new instructions from the
    /// scope in effect at that point.
    pub fn insert_at(&mut self, at: usize, mut new: Vec<Instruction>) -> Result<(), StructuralError> {
        let count = new.len();
        if count == 0 {
            return Ok(());
        }
        let env = self.env_before(at);
        self.scopes.shift_indices(at, count);

        let mut builder = ScopeBuilder::new(self.scopes, env);
        builder.scope(&mut new, at)?;
        builder.finish()?;

        let tail = self.instructions.split_off(at);
        self.instructions.extend(new);
        self.instructions.extend(tail);
        if at < self.ip {
            self.ip += count;
        }
        Ok(())
    }

    /// Swap the operation at `at`, keeping its scope and line.
    pub fn replace_at(&mut self, at: usize, op: Op) -> Option<Op> {
        self.instructions
            .get_mut(at)
            .map(|instruction| core::mem::replace(&mut instruction.op, op))
    }

    /// Search backwards from `from` (exclusive) for an instruction matching
    /// `matches`, giving up at one matching `stop` or after `limit` steps.
    pub fn find_previous(
        &self,
        from: usize,
        matches: impl Fn(&Op) -> bool,
        stop: impl Fn(&Op) -> bool,
        limit: usize,
    ) -> Option<usize> {
        let lowest = from.saturating_sub(limit);
        for index in (lowest..from.min(self.instructions.len())).rev() {
            let op = &self.instructions[index].op;
            if matches(op) {
                return Some(index);
            }
            if stop(op) {
                return None;
            }
        }
        None
    }

    /// Scope in effect for an instruction inserted before `at`.
    fn env_before(&mut self, at: usize) -> ScopeId {
        let Some(previous) = at.checked_sub(1).and_then(|i| self.instructions.get(i)) else {
            return self.scopes.top();
        };
        let env = previous.env.unwrap_or_else(|| ScopeId(0));
        match previous.op {
            Op::End(_) => self.scopes.get(env).outer.unwrap_or(env),
            _ if previous.op.opens().is_some() => self.scopes.opened_by(at - 1).unwrap_or(env),
            _ => env,
        }
    }
}

/// Index of the terminator closing the region body that starts at `start`.
///
/// Nested regions are skipped. A terminator of `label` whose kind is not in
/// `until` (an `Else` when only `End` is wanted) is stepped over.
pub fn skip_block(
    instructions: &[Instruction],
    start: usize,
    until: &[Until],
    label: Label,
) -> Result<usize, StructuralError> {
    let mut depth: usize = 0;
    for (index, instruction) in instructions.iter().enumerate().skip(start) {
        let op = &instruction.op;
        if op.opens().is_some() {
            depth += 1;
            continue;
        }
        let Some((kind, found)) = op.terminates() else {
            continue;
        };
        if depth > 0 {
            if kind == Until::End {
                depth -= 1;
            }
            continue;
        }
        if found != label {
            return Err(StructuralError::LabelMismatch {
                expected: label,
                found,
                index,
            });
        }
        if until.contains(&kind) {
            return Ok(index);
        }
        if kind == Until::End {
            break;
        }
    }
    Err(StructuralError::Unterminated {
        label,
        start: start.saturating_sub(1),
    })
}
