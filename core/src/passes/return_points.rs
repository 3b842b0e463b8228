//! Return-point wiring.
//!
//! A `return` directly in a method, a lambda or the top level is a plain
//! return from the current frame. Inside a (non-lambda) block it has to
//! unwind every block frame up to its home: such returns are tagged with the
//! home scope's [`BreakPoint`], which the home's `DefineMethod` or
//! `CreateLambda` (or the top frame) absorbs.

use tracing::debug;

use crate::env::{ScopeArena, ScopeId, ScopeKind};
use crate::error::{CompileError, LoweringError, StructuralError};
use crate::instructions::{BreakPoint, Instruction, Label, Op};
use crate::manager::InstructionManager;

pub fn wire_return_points(
    instructions: &mut Vec<Instruction>,
    scopes: &mut ScopeArena,
) -> Result<(), CompileError> {
    let mut manager = InstructionManager::new(instructions, scopes);
    manager.walk(|manager, at| -> Result<(), CompileError> {
        let instruction = &manager.instructions()[at];
        let env = instruction
            .env
            .ok_or(StructuralError::Unscoped { index: at })?;
        let line = instruction.line;
        let site = match instruction.op {
            Op::Return { .. } => Site::Return,
            Op::End(Label::DefineMethod) => Site::MethodEnd,
            Op::End(Label::DefineBlock) => Site::BlockEnd,
            _ => return Ok(()),
        };
        match site {
            Site::Return => {
                let (home, crossed) = return_home(manager.scopes(), env)
                    .ok_or(LoweringError::InvalidReturn { line })?;
                if !crossed {
                    return Ok(());
                }
                let scope = manager.scopes_mut().get_mut(home);
                let id = *scope.return_point.get_or_insert_with(|| {
                    let id = BreakPoint::next();
                    debug!(scope = home.0, %id, "minted return point");
                    id
                });
                manager.replace_at(
                    at,
                    Op::Return {
                        return_point: Some(id),
                    },
                );
            }
            Site::MethodEnd => {
                let scope = manager.scopes().get(env);
                let (Some(id), Some(opener)) = (scope.return_point, scope.opener) else {
                    return Ok(());
                };
                let wired = match manager.get(opener).map(|i| &i.op) {
                    Some(Op::DefineMethod { name, arity, .. }) => Op::DefineMethod {
                        name: name.clone(),
                        arity: *arity,
                        return_point: Some(id),
                    },
                    _ => return Err(StructuralError::Unbalanced {
                        found: Label::DefineMethod,
                        index: at,
                    }
                    .into()),
                };
                manager.replace_at(opener, wired);
            }
            Site::BlockEnd => {
                let scope = manager.scopes().get(env);
                let Some(id) = scope.return_point.filter(|_| scope.is_lambda) else {
                    return Ok(());
                };
                let consumer = at + 1;
                let wired = match manager.get(consumer).map(|i| &i.op) {
                    Some(&Op::CreateLambda { break_point, .. }) => Op::CreateLambda {
                        break_point,
                        return_point: Some(id),
                    },
                    _ => return Err(StructuralError::MissingBlockConsumer { index: at }.into()),
                };
                manager.replace_at(consumer, wired);
            }
        }
        Ok(())
    })?;
    Ok(())
}

enum Site {
    Return,
    MethodEnd,
    BlockEnd,
}

/// The scope a `return` in `env` returns from, and whether block frames sit
/// in between. Class and module bodies have no home to return to.
fn return_home(scopes: &ScopeArena, env: ScopeId) -> Option<(ScopeId, bool)> {
    let mut current = env;
    let mut crossed = false;
    loop {
        let scope = scopes.get(current);
        match scope.kind {
            ScopeKind::Conditional | ScopeKind::Loop => current = scope.outer?,
            ScopeKind::Block if scope.is_lambda => return Some((current, crossed)),
            ScopeKind::Block => {
                crossed = true;
                current = scope.outer?;
            }
            ScopeKind::Method | ScopeKind::Top => return Some((current, crossed)),
            ScopeKind::Class | ScopeKind::Module => return None,
        }
    }
}
