use crate::env::*;
use crate::error::StructuralError;
use crate::instructions::{Instruction, Label, Op};
use pretty_assertions::assert_eq;

fn program(ops: Vec<Op>) -> Vec<Instruction> {
    ops.into_iter().map(Instruction::from).collect()
}

fn method(name: &str) -> Op {
    Op::DefineMethod {
        name: name.to_string(),
        arity: 0,
        return_point: None,
    }
}

#[test]
fn test_every_instruction_gets_a_scope() {
    let mut code = program(vec![
        Op::PushTrue,
        Op::If,
        Op::PushInt(1),
        Op::Else(Label::If),
        Op::PushInt(2),
        Op::End(Label::If),
    ]);
    let mut scopes = ScopeArena::new();

    build_scopes(&mut code, &mut scopes).unwrap();

    let envs: Vec<u32> = code.iter().map(|i| i.env.unwrap().0).collect();
    assert_eq!(envs, vec![0, 0, 1, 1, 1, 1]);

    let branch = scopes.get(ScopeId(1));
    assert_eq!(branch.kind, ScopeKind::Conditional);
    assert!(branch.hoist);
    assert_eq!(branch.outer, Some(ScopeId(0)));
    assert_eq!(branch.opener, Some(1));
    assert_eq!(branch.closer, Some(5));
}

#[test]
fn test_nested_definitions() {
    let mut code = program(vec![
        method("each_twice"),
        Op::DefineBlock {
            arity: 0,
            is_lambda: true,
        },
        Op::PushNil,
        Op::End(Label::DefineBlock),
        Op::End(Label::DefineMethod),
        Op::PushNil,
    ]);
    let mut scopes = ScopeArena::new();

    build_scopes(&mut code, &mut scopes).unwrap();

    assert_eq!(scopes.len(), 3);
    assert_eq!(scopes.get(ScopeId(1)).kind, ScopeKind::Method);
    let block = scopes.get(ScopeId(2));
    assert_eq!(block.kind, ScopeKind::Block);
    assert!(block.is_lambda);
    assert_eq!(block.outer, Some(ScopeId(1)));
    // After the method closes we are back at the top.
    assert_eq!(code[5].env, Some(ScopeId(0)));
    assert_eq!(code[4].env, Some(ScopeId(1)));
}

#[test]
fn test_rebuilding_is_idempotent() {
    let mut code = program(vec![
        Op::While {
            pre: true,
            break_point: None,
        },
        Op::PushTrue,
        Op::WhileBody,
        Op::End(Label::While),
    ]);
    let mut scopes = ScopeArena::new();

    build_scopes(&mut code, &mut scopes).unwrap();
    let first = code.clone();
    build_scopes(&mut code, &mut scopes).unwrap();

    assert_eq!(code, first);
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes.get(ScopeId(1)).kind, ScopeKind::Loop);
}

#[test]
fn test_mismatched_end() {
    let mut code = program(vec![Op::PushTrue, Op::If, Op::End(Label::While)]);
    let mut scopes = ScopeArena::new();

    assert_eq!(
        build_scopes(&mut code, &mut scopes),
        Err(StructuralError::LabelMismatch {
            expected: Label::If,
            found: Label::While,
            index: 2,
        })
    );
}

#[test]
fn test_unterminated_and_unbalanced() {
    let mut scopes = ScopeArena::new();
    let mut open = program(vec![method("m"), Op::PushNil]);
    assert_eq!(
        build_scopes(&mut open, &mut scopes),
        Err(StructuralError::Unterminated {
            label: Label::DefineMethod,
            start: 0,
        })
    );

    let mut scopes = ScopeArena::new();
    let mut stray = program(vec![Op::PushNil, Op::Catch]);
    assert_eq!(
        build_scopes(&mut stray, &mut scopes),
        Err(StructuralError::Unbalanced {
            found: Label::Try,
            index: 1,
        })
    );
}
