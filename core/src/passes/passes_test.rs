use bumpalo::Bump;
use garnet_ast::{AstBuilder, NodeRef};
use pretty_assertions::assert_eq;

use super::{Ir, Pipeline, Stage, compile};
use crate::env::{ScopeId, ScopeKind};
use crate::error::{CompileError, LoweringError};
use crate::instructions::{BreakPoint, Label, Op};
use crate::options::CompilerOptions;
use crate::test_utils;

fn compile_default(program: NodeRef<'_>) -> Ir {
    compile(program, &CompilerOptions::default()).unwrap()
}

fn compile_err(program: NodeRef<'_>) -> CompileError {
    compile(program, &CompilerOptions::default()).unwrap_err()
}

fn ops(ir: &Ir) -> Vec<Op> {
    ir.instructions.iter().map(|i| i.op.clone()).collect()
}

fn find_scope(ir: &Ir, kind: ScopeKind) -> ScopeId {
    ir.scopes
        .iter()
        .find(|(_, scope)| scope.kind == kind)
        .map(|(id, _)| id)
        .unwrap()
}

fn break_ids(ir: &Ir) -> Vec<BreakPoint> {
    ir.instructions
        .iter()
        .filter_map(|i| match i.op {
            Op::Break { break_point } => break_point,
            _ => None,
        })
        .collect()
}

fn return_ids(ir: &Ir) -> Vec<Option<BreakPoint>> {
    ir.instructions
        .iter()
        .filter_map(|i| match i.op {
            Op::Return { return_point } => Some(return_point),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Pipeline
// ============================================================================

#[test]
fn test_passes_run_in_order() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.int(1)]);

    let mut pipeline = Pipeline::lower(program, &CompilerOptions::default()).unwrap();
    assert_eq!(pipeline.stage(), Stage::Lowered);
    assert_eq!(
        pipeline.resolve_captures(),
        Err(CompileError::OutOfOrder {
            expected: Stage::Scoped,
            actual: Stage::Lowered,
        })
    );

    pipeline.build_scopes().unwrap();
    pipeline.resolve_captures().unwrap();
    assert_eq!(pipeline.stage(), Stage::Captured);
    assert_eq!(
        pipeline.build_scopes(),
        Err(CompileError::OutOfOrder {
            expected: Stage::Lowered,
            actual: Stage::Captured,
        })
    );

    pipeline.wire_break_points().unwrap();
    pipeline.wire_return_points().unwrap();
    assert_eq!(pipeline.stage(), Stage::ReturnsWired);
    assert!(pipeline.ir().instructions.iter().all(|i| i.env.is_some()));
}

#[test]
fn test_finish_runs_the_remaining_passes() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(b.true_(), &[b.break_(None)])]);

    let mut pipeline = Pipeline::lower(program, &CompilerOptions::default()).unwrap();
    pipeline.build_scopes().unwrap();
    let ir = pipeline.finish().unwrap();

    assert_eq!(break_ids(&ir).len(), 1);
}

// ============================================================================
// Capture resolution
// ============================================================================

#[test]
fn test_plain_local_is_not_captured() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let ir = compile_default(b.program(&[b.lasgn("x", b.int(1)), b.lvar("x")]));

    let slot = *ir.scopes.get(ScopeId(0)).var("x").unwrap();
    assert!(!slot.captured);
    assert!(slot.declared);
    assert_eq!(slot.index, 0);
}

#[test]
fn test_use_inside_block_captures() {
    test_utils::init_test_logging();
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.lvar("x")]);
    let program = b.program(&[
        b.lasgn("x", b.int(1)),
        b.call_with_block(Some(b.array(&[b.int(1)])), "each", &[], block),
    ]);

    let ir = compile_default(program);

    assert!(ir.scopes.get(ScopeId(0)).var("x").unwrap().captured);
    let block = find_scope(&ir, ScopeKind::Block);
    assert_eq!(ir.scopes.get(block).var("x"), None);
}

#[test]
fn test_block_parameter_shadows_outer_local() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(Some(b.required_params(&["x"])), &[b.lvar("x")]);
    let program = b.program(&[
        b.lasgn("x", b.int(1)),
        b.call_with_block(Some(b.array(&[b.int(1)])), "each", &[], block),
    ]);

    let ir = compile_default(program);

    assert!(!ir.scopes.get(ScopeId(0)).var("x").unwrap().captured);
    let block = find_scope(&ir, ScopeKind::Block);
    assert!(ir.scopes.get(block).var("x").is_some());
}

#[test]
fn test_interactive_session_captures_everything() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.lasgn("x", b.int(1))]);
    let options = CompilerOptions {
        interactive: true,
        ..CompilerOptions::default()
    };

    let ir = compile(program, &options).unwrap();

    assert!(ir.scopes.get(ScopeId(0)).var("x").unwrap().captured);
}

#[test]
fn test_self_referencing_assignment_captures() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let ir = compile_default(b.program(&[b.lasgn("x", b.lvar("x"))]));

    assert!(ir.scopes.get(ScopeId(0)).var("x").unwrap().captured);
}

#[test]
fn test_variable_first_set_in_branch_is_hoisted() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.if_(b.true_(), &[b.lasgn("y", b.int(1)), b.lasgn("y", b.int(2))], None),
        b.lvar("y"),
    ]);

    let ir = compile_default(program);

    assert_eq!(
        ops(&ir),
        vec![
            Op::PushTrue,
            Op::VariableDeclare("y".into()),
            Op::If,
            Op::PushInt(1),
            Op::VariableSet {
                name: "y".into(),
                local_only: false
            },
            Op::PushInt(2),
            Op::VariableSet {
                name: "y".into(),
                local_only: false
            },
            Op::End(Label::If),
            Op::VariableGet {
                name: "y".into(),
                default_to_nil: false
            },
        ]
    );
    // The declaration runs in the enclosing scope; the slot belongs to it.
    assert_eq!(ir.instructions[1].env, Some(ScopeId(0)));
    assert!(ir.scopes.get(ScopeId(0)).var("y").unwrap().declared);
    let branch = find_scope(&ir, ScopeKind::Conditional);
    assert_eq!(ir.scopes.get(branch).hoisted_vars, vec!["y".to_string()]);
    assert_eq!(ir.scopes.get(branch).opener, Some(2));
}

#[test]
fn test_declaration_precedes_outermost_hoisting_region() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(
        b.true_(),
        &[b.if_(b.false_(), &[b.lasgn("z", b.int(1))], None)],
    )]);

    let ir = compile_default(program);
    let ops = ops(&ir);

    let declare = ops
        .iter()
        .position(|op| *op == Op::VariableDeclare("z".into()))
        .unwrap();
    assert!(matches!(ops[declare + 1], Op::While { .. }));
    assert_eq!(
        ops.iter()
            .filter(|op| matches!(op, Op::VariableDeclare(_)))
            .count(),
        1
    );
}

#[test]
fn test_recompiling_declared_program_is_stable() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.if_(b.true_(), &[b.lasgn("y", b.int(1))], None),
        b.lvar("y"),
    ]);
    let ir = compile_default(program);

    let mut instructions = ir.instructions.clone();
    for instruction in &mut instructions {
        instruction.env = None;
    }
    let again = Pipeline::from_instructions(instructions, 0, &CompilerOptions::default())
        .finish()
        .unwrap();

    assert_eq!(ops(&again), ops(&ir));
}

// ============================================================================
// Break points
// ============================================================================

#[test]
fn test_loop_break_shares_id_with_while() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(
        b.true_(),
        &[
            b.if_(b.lvar("a"), &[b.break_(None)], None),
            b.break_(Some(b.int(2))),
        ],
    )]);

    let ir = compile_default(program);
    let ids = break_ids(&ir);

    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    let while_id = ir.instructions.iter().find_map(|i| match i.op {
        Op::While { break_point, .. } => break_point,
        _ => None,
    });
    assert_eq!(while_id, Some(ids[0]));
}

#[test]
fn test_break_points_are_unique_per_target() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.while_(b.true_(), &[b.break_(None)]),
        b.while_(b.true_(), &[b.break_(None)]),
    ]);

    let ids = break_ids(&compile_default(program));

    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_block_break_wires_the_consuming_call() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.break_(Some(b.int(2)))]);
    let program = b.program(&[b.call_with_block(Some(b.array(&[])), "each", &[], block)]);

    let ir = compile_default(program);
    let ids = break_ids(&ir);
    let send = ir.instructions.iter().find_map(|i| match &i.op {
        Op::Send(call) if call.message == "each" => Some(call.clone()),
        _ => None,
    });

    assert_eq!(ids.len(), 1);
    assert_eq!(send.unwrap().break_point, Some(ids[0]));
}

#[test]
fn test_break_outside_loop_or_block() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let b2 = b.at_line(2);

    assert_eq!(
        compile_err(b.program(&[b.int(1), b2.break_(None)])),
        CompileError::Lowering(LoweringError::InvalidBreak { line: 2 })
    );
    assert_eq!(
        compile_err(b.program(&[b.def("f", None, &[b.break_(None)])])),
        CompileError::Lowering(LoweringError::InvalidBreak { line: 1 })
    );
}

// ============================================================================
// Return points
// ============================================================================

#[test]
fn test_return_from_block_targets_method() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.return_(Some(b.int(1)))]);
    let program = b.program(&[b.def(
        "f",
        None,
        &[
            b.call_with_block(Some(b.array(&[b.int(1)])), "each", &[], block),
            b.int(2),
        ],
    )]);

    let ir = compile_default(program);
    let returns = return_ids(&ir);
    let method = ir.instructions.iter().find_map(|i| match i.op {
        Op::DefineMethod { return_point, .. } => Some(return_point),
        _ => None,
    });

    assert_eq!(returns.len(), 1);
    assert!(returns[0].is_some());
    assert_eq!(method, Some(returns[0]));
}

#[test]
fn test_direct_return_stays_plain() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.def(
        "f",
        None,
        &[b.if_(b.true_(), &[b.return_(Some(b.int(1)))], None), b.int(2)],
    )]);

    let ir = compile_default(program);

    assert_eq!(return_ids(&ir), vec![None]);
    assert!(ir.instructions.iter().any(|i| matches!(
        i.op,
        Op::DefineMethod {
            return_point: None,
            ..
        }
    )));
}

#[test]
fn test_return_inside_lambda_targets_the_lambda() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.return_(Some(b.int(1)))]);
    let program = b.program(&[b.lambda(
        None,
        &[b.call_with_block(Some(b.array(&[b.int(1)])), "each", &[], block)],
    )]);

    let ir = compile_default(program);
    let returns = return_ids(&ir);
    let lambda = ir.instructions.iter().find_map(|i| match i.op {
        Op::CreateLambda { return_point, .. } => Some(return_point),
        _ => None,
    });

    assert_eq!(returns.len(), 1);
    assert!(returns[0].is_some());
    assert_eq!(lambda, Some(returns[0]));
}

#[test]
fn test_return_in_class_body_is_invalid() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.class("A", None, &[b.return_(None)])]);

    assert_eq!(
        compile_err(program),
        CompileError::Lowering(LoweringError::InvalidReturn { line: 1 })
    );
}
