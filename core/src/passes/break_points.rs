//! Break-point wiring.
//!
//! A `break` leaves the nearest enclosing loop or block. Each such target
//! scope gets one [`BreakPoint`], shared by every `break` aimed at it:
//!
//! * a loop's `While` absorbs the exit and makes the carried value the loop
//!   result;
//! * a block's consumer (the `Send`, `Super` or `CreateLambda` right after
//!   the block's `End`) absorbs it and makes the value the call result.

use tracing::debug;

use crate::env::{ScopeArena, ScopeId, ScopeKind};
use crate::error::{CompileError, LoweringError, StructuralError};
use crate::instructions::{BreakPoint, CallSite, Instruction, Label, Op};
use crate::manager::InstructionManager;

pub fn wire_break_points(
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
            Op::Break { .. } => Site::Break,
            Op::End(Label::DefineBlock) => Site::BlockEnd,
            Op::End(Label::While) => Site::LoopEnd,
            _ => return Ok(()),
        };
        match site {
            Site::Break => {
                let target = break_target(manager.scopes(), env)
                    .ok_or(LoweringError::InvalidBreak { line })?;
                let scope = manager.scopes_mut().get_mut(target);
                let id = *scope.break_point.get_or_insert_with(|| {
                    let id = BreakPoint::next();
                    debug!(scope = target.0, %id, "minted break point");
                    id
                });
                manager.replace_at(at, Op::Break { break_point: Some(id) });
            }
            Site::BlockEnd => {
                let Some(id) = manager.scopes().get(env).break_point else {
                    return Ok(());
                };
                let consumer = at + 1;
                let wired = match manager.get(consumer).map(|i| &i.op) {
                    Some(Op::Send(call)) if call.with_block => Op::Send(CallSite {
                        break_point: Some(id),
                        ..call.clone()
                    }),
                    Some(&Op::Super {
                        args_array_on_stack,
                        with_block: true,
                        has_keyword_hash,
                        forward_args,
                        ..
                    }) => Op::Super {
                        args_array_on_stack,
                        with_block: true,
                        has_keyword_hash,
                        forward_args,
                        break_point: Some(id),
                    },
                    Some(&Op::CreateLambda { return_point, .. }) => Op::CreateLambda {
                        break_point: Some(id),
                        return_point,
                    },
                    _ => return Err(StructuralError::MissingBlockConsumer { index: at }.into()),
                };
                manager.replace_at(consumer, wired);
            }
            Site::LoopEnd => {
                let scope = manager.scopes().get(env);
                let (Some(id), Some(opener)) = (scope.break_point, scope.opener) else {
                    return Ok(());
                };
                if let Some(Op::While { pre, .. }) = manager.get(opener).map(|i| &i.op) {
                    let pre = *pre;
                    manager.replace_at(
                        opener,
                        Op::While {
                            pre,
                            break_point: Some(id),
                        },
                    );
                }
            }
        }
        Ok(())
    })?;
    Ok(())
}

enum Site {
    Break,
    BlockEnd,
    LoopEnd,
}

/// The loop or block scope a `break` in `env` leaves.
fn break_target(scopes: &ScopeArena, env: ScopeId) -> Option<ScopeId> {
    let mut current = env;
    loop {
        let scope = scopes.get(current);
        match scope.kind {
            ScopeKind::Loop | ScopeKind::Block => return Some(current),
            ScopeKind::Conditional => current = scope.outer?,
            _ => return None,
        }
    }
}
