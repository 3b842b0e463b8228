use crate::env::{ScopeArena, ScopeId, build_scopes};
use crate::error::StructuralError;
use crate::instructions::{Instruction, Label, Op, Until};
use crate::manager::{InstructionManager, skip_block};
use pretty_assertions::assert_eq;

fn program(ops: Vec<Op>) -> Vec<Instruction> {
    ops.into_iter().map(Instruction::from).collect()
}

fn ops(instructions: &[Instruction]) -> Vec<Op> {
    instructions.iter().map(|i| i.op.clone()).collect()
}

fn nested_if() -> Vec<Instruction> {
    program(vec![
        Op::PushTrue,
        Op::If,
        Op::PushFalse,
        Op::If,
        Op::PushInt(1),
        Op::Else(Label::If),
        Op::PushInt(2),
        Op::End(Label::If),
        Op::Else(Label::If),
        Op::PushInt(3),
        Op::End(Label::If),
    ])
}

#[test]
fn test_fetch_block_skips_nested_regions() {
    let mut code = nested_if();
    let mut scopes = ScopeArena::new();
    let mut manager = InstructionManager::new(&mut code, &mut scopes);
    manager.set_ip(2);

    let (body, terminator) = manager
        .fetch_block(&[Until::Else, Until::End], Label::If)
        .unwrap();

    assert_eq!(
        ops(&body),
        vec![
            Op::PushFalse,
            Op::If,
            Op::PushInt(1),
            Op::Else(Label::If),
            Op::PushInt(2),
            Op::End(Label::If),
        ]
    );
    assert_eq!(terminator.op, Op::Else(Label::If));
    assert_eq!(manager.ip(), 9);

    let (rest, terminator) = manager.fetch_block(&[Until::End], Label::If).unwrap();
    assert_eq!(ops(&rest), vec![Op::PushInt(3)]);
    assert_eq!(terminator.op, Op::End(Label::If));
}

#[test]
fn test_skip_block_steps_over_intermediates() {
    let code = nested_if();
    assert_eq!(skip_block(&code, 2, &[Until::End], Label::If), Ok(10));
    assert_eq!(skip_block(&code, 4, &[Until::Else], Label::If), Ok(5));
}

#[test]
fn test_fetch_block_errors() {
    let code = program(vec![Op::PushTrue, Op::If, Op::PushNil]);
    assert_eq!(
        skip_block(&code, 2, &[Until::End], Label::If),
        Err(StructuralError::Unterminated {
            label: Label::If,
            start: 1,
        })
    );

    let code = program(vec![Op::WhileBody, Op::PushNil, Op::End(Label::While)]);
    assert_eq!(
        skip_block(&code, 1, &[Until::End], Label::If),
        Err(StructuralError::LabelMismatch {
            expected: Label::If,
            found: Label::While,
            index: 2,
        })
    );
}

#[test]
fn test_insert_at_rescopes_and_shifts() {
    let mut code = program(vec![
        Op::PushTrue,
        Op::If,
        Op::PushInt(1),
        Op::Else(Label::If),
        Op::PushNil,
        Op::End(Label::If),
    ]);
    let mut scopes = ScopeArena::new();
    build_scopes(&mut code, &mut scopes).unwrap();

    let mut manager = InstructionManager::new(&mut code, &mut scopes);
    manager
        .insert_at(1, vec![Op::VariableDeclare("x".into()).into()])
        .unwrap();
    // Directly after an opener, new code lands inside the opened scope.
    manager.insert_at(3, vec![Op::PushInt(0).into(), Op::Pop.into()]).unwrap();

    assert_eq!(manager.get(1).unwrap().env, Some(ScopeId(0)));
    assert_eq!(manager.get(3).unwrap().env, Some(ScopeId(1)));
    assert_eq!(manager.scopes().get(ScopeId(1)).opener, Some(2));
    assert_eq!(manager.scopes().get(ScopeId(1)).closer, Some(8));
    assert_eq!(manager.get(8).unwrap().op, Op::End(Label::If));
}

#[test]
fn test_insert_after_end_uses_outer_scope() {
    let mut code = program(vec![
        Op::PushTrue,
        Op::If,
        Op::PushNil,
        Op::End(Label::If),
    ]);
    let mut scopes = ScopeArena::new();
    build_scopes(&mut code, &mut scopes).unwrap();

    let mut manager = InstructionManager::new(&mut code, &mut scopes);
    manager.insert_at(4, vec![Op::PushNil.into()]).unwrap();

    assert_eq!(manager.get(4).unwrap().env, Some(ScopeId(0)));
}

#[test]
fn test_walk_with_insertions_before_cursor() {
    let mut code = program(vec![Op::PushInt(1), Op::PushInt(2), Op::Pop]);
    let mut scopes = ScopeArena::new();
    build_scopes(&mut code, &mut scopes).unwrap();

    let mut manager = InstructionManager::new(&mut code, &mut scopes);
    let mut seen = Vec::new();
    manager
        .walk(|manager, at| -> Result<(), StructuralError> {
            let op = manager.get(at).unwrap().op.clone();
            if op == Op::PushInt(2) {
                manager.insert_at(at, vec![Op::PushNil.into()])?;
            }
            seen.push(op);
            Ok(())
        })
        .unwrap();

    assert_eq!(seen, vec![Op::PushInt(1), Op::PushInt(2), Op::Pop]);
    assert_eq!(
        ops(manager.instructions()),
        vec![Op::PushInt(1), Op::PushNil, Op::PushInt(2), Op::Pop]
    );
}

#[test]
fn test_find_previous_respects_stop_and_limit() {
    let mut code = program(vec![
        Op::VariableGet {
            name: "x".into(),
            default_to_nil: false,
        },
        Op::Pop,
        Op::VariableGet {
            name: "x".into(),
            default_to_nil: false,
        },
        Op::PushInt(1),
        Op::VariableSet {
            name: "x".into(),
            local_only: false,
        },
    ]);
    let mut scopes = ScopeArena::new();
    let manager = InstructionManager::new(&mut code, &mut scopes);

    let reads_x = |op: &Op| matches!(op, Op::VariableGet { name, .. } if name == "x");
    let is_pop = |op: &Op| matches!(op, Op::Pop);

    assert_eq!(manager.find_previous(4, reads_x, is_pop, 10), Some(2));
    assert_eq!(manager.find_previous(4, reads_x, is_pop, 1), None);
    assert_eq!(manager.find_previous(2, reads_x, is_pop, 10), None);
}
