use bumpalo::Bump;
use garnet_ast::{AstBuilder, NodeKind, NodeRef, Parameters};
use pretty_assertions::assert_eq;

use super::lower;
use crate::error::{CompileError, LoweringError};
use crate::instructions::{CallSite, Label, Op};
use crate::options::CompilerOptions;

fn lower_ops(program: NodeRef<'_>) -> Vec<Op> {
    let lowered = lower(program, &CompilerOptions::default()).unwrap();
    lowered.instructions.into_iter().map(|i| i.op).collect()
}

fn lower_err(program: NodeRef<'_>) -> CompileError {
    lower(program, &CompilerOptions::default()).unwrap_err()
}

fn send(message: &str) -> Op {
    Op::Send(CallSite::new(message))
}

fn get(name: &str) -> Op {
    Op::VariableGet {
        name: name.into(),
        default_to_nil: false,
    }
}

fn set(name: &str, local_only: bool) -> Op {
    Op::VariableSet {
        name: name.into(),
        local_only,
    }
}

#[test]
fn test_binary_operator_pushes_receiver_first() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(5)), "+", &[b.int(3)])]);

    let lowered = lower(program, &CompilerOptions::default()).unwrap();
    let ops: Vec<Op> = lowered.instructions.iter().map(|i| i.op.clone()).collect();

    assert_eq!(ops, vec![Op::PushInt(5), Op::PushInt(3), Op::PushArgc(1), send("+")]);
    assert_eq!(lowered.max_stack_size, 3);
    assert!(lowered.instructions.iter().all(|i| i.line == 1));
}

#[test]
fn test_unused_values_are_not_pushed() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.int(1), b.lasgn("x", b.int(2)), b.lvar("x")]);

    assert_eq!(
        lower_ops(program),
        vec![Op::PushInt(2), set("x", false), get("x")]
    );
}

#[test]
fn test_if_else() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.if_(
        b.true_(),
        &[b.int(1)],
        Some(b.statements(&[b.int(2)])),
    )]);

    assert_eq!(
        lower_ops(program),
        vec![
            Op::PushTrue,
            Op::If,
            Op::PushInt(1),
            Op::Else(Label::If),
            Op::PushInt(2),
            Op::End(Label::If),
        ]
    );
}

#[test]
fn test_and_keeps_left_value_when_falsy() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.node(NodeKind::And {
        left: b.lvar("a"),
        right: b.lvar("b"),
    })]);

    assert_eq!(
        lower_ops(program),
        vec![
            get("a"),
            Op::Dup,
            Op::If,
            Op::Pop,
            get("b"),
            Op::Else(Label::If),
            Op::End(Label::If),
        ]
    );
}

#[test]
fn test_while_with_break() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(b.true_(), &[b.break_(None)])]);

    assert_eq!(
        lower_ops(program),
        vec![
            Op::While {
                pre: true,
                break_point: None
            },
            Op::PushTrue,
            Op::WhileBody,
            Op::PushNil,
            Op::Break { break_point: None },
            Op::End(Label::While),
        ]
    );
}

#[test]
fn test_safe_navigation() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.node(NodeKind::Call {
        receiver: Some(b.lvar("x")),
        name: "foo",
        arguments: &[],
        block: None,
        safe_navigation: true,
    })]);

    assert_eq!(
        lower_ops(program),
        vec![
            get("x"),
            Op::Dup,
            Op::IsNil,
            Op::If,
            Op::Pop,
            Op::PushNil,
            Op::Else(Label::If),
            Op::PushArgc(0),
            send("foo"),
            Op::End(Label::If),
        ]
    );
}

#[test]
fn test_block_with_single_parameter() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(Some(b.required_params(&["x"])), &[b.lvar("x")]);
    let program = b.program(&[b.call_with_block(
        Some(b.array(&[b.int(1)])),
        "each",
        &[],
        block,
    )]);

    let mut each = CallSite::new("each");
    each.with_block = true;
    assert_eq!(
        lower_ops(program),
        vec![
            Op::PushInt(1),
            Op::CreateArray(1),
            Op::PushArgc(0),
            Op::DefineBlock {
                arity: 1,
                is_lambda: false
            },
            Op::PushArg {
                index: 0,
                nil_default: true
            },
            set("x", true),
            get("x"),
            Op::End(Label::DefineBlock),
            Op::Send(each),
        ]
    );
}

#[test]
fn test_method_parameters() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.def("f", Some(b.required_params(&["a"])), &[b.lvar("a")])]);

    assert_eq!(
        lower_ops(program),
        vec![
            Op::DefineMethod {
                name: "f".into(),
                arity: 1,
                return_point: None
            },
            Op::PushArgs {
                for_block: false,
                min_count: 1,
                max_count: Some(1),
                spread: false,
                keyword_args: false
            },
            Op::ArrayShift,
            set("a", true),
            Op::Pop,
            get("a"),
            Op::End(Label::DefineMethod),
        ]
    );
}

#[test]
fn test_optional_parameter_flips_to_the_right() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    // def f(a, b = 1, c)
    let parameters = b.parameters(Parameters {
        requireds: b.list(&[b.ltarget("a")]),
        optionals: b.optionals(&[b.optional_param("b", b.int(1))]),
        posts: b.list(&[b.ltarget("c")]),
        ..Parameters::default()
    });
    let program = b.program(&[b.def("f", Some(parameters), &[])]);

    assert_eq!(
        lower_ops(program),
        vec![
            Op::DefineMethod {
                name: "f".into(),
                arity: -3,
                return_point: None
            },
            Op::PushArgs {
                for_block: false,
                min_count: 2,
                max_count: Some(3),
                spread: false,
                keyword_args: false
            },
            Op::ArrayShift,
            set("a", true),
            Op::ArrayPop,
            set("c", true),
            Op::PushInt(1),
            Op::ArrayShiftWithDefault,
            set("b", true),
            Op::Pop,
            Op::PushNil,
            Op::End(Label::DefineMethod),
        ]
    );
}

#[test]
fn test_keyword_parameters() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    // def f(k:, j: 2)
    let parameters = b.parameters(Parameters {
        keywords: b.keywords(&[
            b.keyword_param("k", None),
            b.keyword_param("j", Some(b.int(2))),
        ]),
        ..Parameters::default()
    });
    let program = b.program(&[b.def("f", Some(parameters), &[])]);

    let ops = lower_ops(program);
    assert_eq!(
        ops[1],
        Op::PushArgs {
            for_block: false,
            min_count: 0,
            max_count: Some(0),
            spread: false,
            keyword_args: true
        }
    );
    assert_eq!(ops[2], Op::Pop);
    assert_eq!(
        ops[3..12].to_vec(),
        vec![
            Op::PopKeywordArgs,
            Op::CheckRequiredKeywords(vec!["k".into()]),
            Op::HashDelete("k".into()),
            set("k", true),
            Op::PushInt(2),
            Op::HashDeleteWithDefault("j".into()),
            set("j", true),
            Op::CheckExtraKeywords,
            Op::Pop,
        ]
    );
}

#[test]
fn test_multiple_assignment() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.node(NodeKind::MultiWrite {
        lefts: b.list(&[b.ltarget("a"), b.ltarget("b")]),
        rest: None,
        rights: &[],
        value: b.array(&[b.int(1), b.int(2)]),
    })]);

    assert_eq!(
        lower_ops(program),
        vec![
            Op::PushInt(1),
            Op::PushInt(2),
            Op::CreateArray(2),
            Op::Dup,
            Op::ToArray,
            Op::ArrayShift,
            set("a", false),
            Op::ArrayShift,
            set("b", false),
            Op::Pop,
        ]
    );
}

#[test]
fn test_retry_targets_its_rescue() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let rescue = b.rescue(&[], None, &[b.node(NodeKind::Retry)]);
    let program = b.program(&[b.begin(&[b.int(1)], Some(rescue), None)]);

    let ops = lower_ops(program);
    let try_point = ops.iter().find_map(|op| match op {
        Op::Try { retry_point, .. } => *retry_point,
        _ => None,
    });
    let retry = ops.iter().find_map(|op| match op {
        Op::Retry(id) => Some(*id),
        _ => None,
    });
    assert!(try_point.is_some());
    assert_eq!(try_point, retry);
    assert!(ops.contains(&Op::MatchException));
    assert!(ops.contains(&Op::Reraise));
}

#[test]
fn test_jumps_outside_their_context() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);

    assert_eq!(
        lower_err(b.program(&[b.next(None)])),
        CompileError::Lowering(LoweringError::InvalidNext { line: 1 })
    );
    assert_eq!(
        lower_err(b.program(&[b.node(NodeKind::Retry)])),
        CompileError::Lowering(LoweringError::InvalidRetry { line: 1 })
    );
    let b3 = b.at_line(3);
    assert_eq!(
        lower_err(b.program(&[b.while_(b.true_(), &[]), b3.node(NodeKind::Redo)])),
        CompileError::Lowering(LoweringError::InvalidRedo { line: 3 })
    );
}

#[test]
fn test_splat_in_when_is_unsupported() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let when = b.node(NodeKind::When {
        conditions: b.list(&[b.splat(b.lvar("xs"))]),
        statements: None,
    });
    let program = b.program(&[b.node(NodeKind::Case {
        predicate: Some(b.int(1)),
        conditions: b.list(&[when]),
        else_clause: None,
    })]);

    assert!(matches!(
        lower_err(program),
        CompileError::Lowering(LoweringError::Unsupported { .. })
    ));
}

#[test]
fn test_position_specific_node_is_structural_error() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.ltarget("x")]);

    assert_eq!(
        lower_err(program),
        CompileError::Structural(crate::error::StructuralError::UnknownNode("local variable target"))
    );
}
