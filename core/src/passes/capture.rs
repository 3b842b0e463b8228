//! Capture resolution.
//!
//! Gives every local variable a slot in its owning (non-hoisting) scope and
//! decides whether the slot is a plain local or lives in a heap environment
//! shared with blocks. A variable is captured when
//!
//! * a use resolves it across a block boundary,
//! * the program is compiled for an interactive session, or
//! * it is assigned from an expression reading the same name (`x = x`).
//!
//! A variable first seen inside a hoisting region (`if`, `while`, `begin`)
//! is declared once, right before the outermost such region, so that it is
//! visible after the region ends.

use tracing::debug;

use crate::env::{ScopeArena, ScopeId};
use crate::error::{CompileError, StructuralError};
use crate::instructions::{Instruction, Op};
use crate::manager::InstructionManager;

/// How far back `x = x` detection looks for the read of `x`.
const SELF_REFERENCE_LIMIT: usize = 32;

pub fn resolve_captures(
    instructions: &mut Vec<Instruction>,
    scopes: &mut ScopeArena,
    interactive: bool,
) -> Result<(), CompileError> {
    let mut manager = InstructionManager::new(instructions, scopes);
    // (opener index, name), applied once the walk is done.
    let mut declares: Vec<(usize, String)> = Vec::new();

    manager.walk(|manager, at| -> Result<(), CompileError> {
        let instruction = &manager.instructions()[at];
        let env = instruction
            .env
            .ok_or(StructuralError::Unscoped { index: at })?;
        let (name, local_only, assignment) = match &instruction.op {
            Op::VariableSet { name, local_only } => (name.clone(), *local_only, true),
            Op::VariableGet { name, .. } => (name.clone(), false, false),
            Op::VariableDeclare(name) => {
                // Already hoisted (a decoded program going through again).
                let name = name.clone();
                let owner = manager.scopes().owner(env);
                manager.scopes_mut().get_mut(owner).add_var(&name).declared = true;
                return Ok(());
            }
            _ => return Ok(()),
        };
        let self_reference = assignment && reads_own_name(manager, at, &name);
        let hoisted = bind(
            manager.scopes_mut(),
            env,
            &name,
            local_only,
            assignment,
            interactive || self_reference,
        );
        if let Some(opener) = hoisted {
            let key = (opener, name);
            if !declares.contains(&key) {
                declares.push(key);
            }
        }
        Ok(())
    })?;

    // Back to front, so earlier indices stay valid.
    declares.sort_by(|a, b| b.0.cmp(&a.0));
    for (opener, name) in declares {
        let line = manager.get(opener).map_or(0, |i| i.line);
        debug!(%name, before = opener, "declaring hoisted variable");
        manager.insert_at(opener, vec![Instruction::new(Op::VariableDeclare(name), line)])?;
    }
    Ok(())
}

/// Find or create the slot for `name` as used from `env`.
///
/// Returns the index of the opener a declaration must precede when the
/// variable is new and `env` is inside a hoisting region.
fn bind(
    scopes: &mut ScopeArena,
    env: ScopeId,
    name: &str,
    local_only: bool,
    assignment: bool,
    force_capture: bool,
) -> Option<usize> {
    let owner = scopes.owner(env);
    let found = if local_only {
        scopes.get(owner).var(name).map(|_| (owner, 0))
    } else {
        scopes.resolve(env, name).map(|r| (r.owner, r.depth))
    };

    if let Some((home, depth)) = found {
        if depth > 0 || force_capture {
            if let Some(slot) = scopes.get_mut(home).var_mut(name) {
                if !slot.captured {
                    debug!(%name, scope = home.0, depth, "captured variable");
                }
                slot.captured = true;
            }
        }
        return None;
    }

    let hoisting = scopes.outermost_hoisting(env);
    let slot = scopes.get_mut(owner).add_var(name);
    slot.captured = force_capture;
    slot.declared = assignment || hoisting.is_some();

    let hoisting = hoisting?;
    let scope = scopes.get_mut(hoisting);
    scope.hoisted_vars.push(name.to_string());
    scope.opener
}

/// Whether the value assigned at `at` reads `name` (`x = x`, `x = x + 1`).
fn reads_own_name(manager: &InstructionManager<'_>, at: usize, name: &str) -> bool {
    manager
        .find_previous(
            at,
            |op| matches!(op, Op::VariableGet { name: read, .. } if read == name),
            |op| {
                matches!(
                    op,
                    Op::VariableSet { .. } | Op::VariableDeclare(_) | Op::Pop | Op::End(_)
                ) || op.opens().is_some()
            },
            SELF_REFERENCE_LIMIT,
        )
        .is_some()
}
