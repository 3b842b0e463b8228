use bumpalo::Bump;
use garnet_ast::{AstBuilder, NodeKind, NodeRef, Parameters};
use pretty_assertions::assert_eq;

use super::{Execution, ExecutionError, GuestError, ResourceExceededError, Value, execute};
use crate::options::{CompilerOptions, ExecutionOptions};
use crate::passes::compile;
use crate::test_utils;

fn run_with(program: NodeRef<'_>, options: ExecutionOptions) -> Result<Execution, ExecutionError> {
    let ir = compile(program, &CompilerOptions::default()).unwrap();
    execute(&ir, options)
}

fn run(program: NodeRef<'_>) -> Execution {
    run_with(program, ExecutionOptions::default()).unwrap()
}

fn run_err(program: NodeRef<'_>) -> GuestError {
    match run_with(program, ExecutionOptions::default()) {
        Err(ExecutionError::Runtime(error)) => error,
        other => panic!("expected a guest error, got {:?}", other),
    }
}

fn guest(class: &str, message: &str) -> GuestError {
    GuestError {
        class: class.to_string(),
        message: message.to_string(),
    }
}

#[test]
fn test_empty_program_is_nil() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);

    let execution = run(b.program(&[]));
    assert_eq!(execution.value, Value::Nil);
    assert_eq!(execution.output, "");
}

#[test]
fn test_arithmetic_and_locals() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("x", b.int(5)),
        b.lasgn("y", b.call(Some(b.lvar("x")), "*", &[b.int(2)])),
        b.call(Some(b.lvar("y")), "-", &[b.int(2)]),
    ]);

    assert_eq!(run(program).value, Value::Int(8));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_if_else_chooses_branch() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let choose = |predicate| {
        b.if_(predicate, &[b.string("yes")], Some(b.statements(&[b.string("no")])))
    };
    let program = b.program(&[b.array(&[choose(b.true_()), choose(b.nil())])]);

    assert_eq!(
        run(program).value,
        Value::array(vec![Value::string("yes"), Value::string("no")])
    );
}

#[test]
fn test_while_with_break() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("i", b.int(0)),
        b.while_(
            b.true_(),
            &[
                b.lasgn("i", b.call(Some(b.lvar("i")), "+", &[b.int(1)])),
                b.if_(b.call(Some(b.lvar("i")), "==", &[b.int(5)]), &[b.break_(None)], None),
            ],
        ),
        b.lvar("i"),
    ]);

    assert_eq!(run(program).value, Value::Int(5));
}

#[test]
fn test_break_from_block_is_value_of_call() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let body = b.if_(
        b.call(Some(b.lvar("x")), "==", &[b.int(2)]),
        &[b.break_(Some(b.call(Some(b.lvar("x")), "*", &[b.int(10)])))],
        None,
    );
    let program = b.program(&[b.call_with_block(
        Some(b.array(&[b.int(1), b.int(2), b.int(3)])),
        "each",
        &[],
        b.block(Some(b.required_params(&["x"])), &[body]),
    )]);

    assert_eq!(run(program).value, Value::Int(20));
}

#[test]
fn test_return_from_block_leaves_method() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let body = b.if_(
        b.call(Some(b.lvar("x")), "==", &[b.int(2)]),
        &[b.return_(Some(b.call(Some(b.lvar("x")), "*", &[b.int(10)])))],
        None,
    );
    let program = b.program(&[
        b.def(
            "find_first",
            None,
            &[
                b.call_with_block(
                    Some(b.array(&[b.int(1), b.int(2), b.int(3)])),
                    "each",
                    &[],
                    b.block(Some(b.required_params(&["x"])), &[body]),
                ),
                b.nil(),
            ],
        ),
        b.fcall("find_first", &[]),
    ]);

    assert_eq!(run(program).value, Value::Int(20));
}

#[test]
fn test_next_skips_rest_of_block() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let body = [
        b.if_(
            b.call(Some(b.lvar("x")), "odd?", &[]),
            &[b.next(Some(b.int(0)))],
            None,
        ),
        b.lvar("x"),
    ];
    let program = b.program(&[b.call_with_block(
        Some(b.array(&[b.int(1), b.int(2), b.int(3), b.int(4)])),
        "map",
        &[],
        b.block(Some(b.required_params(&["x"])), &body),
    )]);

    assert_eq!(
        run(program).value,
        Value::array(vec![Value::Int(0), Value::Int(2), Value::Int(0), Value::Int(4)])
    );
}

#[test]
fn test_yield_without_block() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.def("each_one", None, &[b.yield_(&[b.int(1)])]), b.fcall("each_one", &[])]);

    assert_eq!(run_err(program), guest("LocalJumpError", "no block given (yield)"));
}

#[test]
fn test_yield_passes_values_to_block() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.def("twice", None, &[b.yield_(&[b.int(1)]), b.yield_(&[b.int(2)])]),
        b.lasgn("seen", b.array(&[])),
        b.call_with_block(
            None,
            "twice",
            &[],
            b.block(
                Some(b.required_params(&["n"])),
                &[b.call(Some(b.lvar("seen")), "<<", &[b.lvar("n")])],
            ),
        ),
        b.lvar("seen"),
    ]);

    assert_eq!(run(program).value, Value::array(vec![Value::Int(1), Value::Int(2)]));
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_rescue_binds_exception() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.begin(
        &[b.call(Some(b.int(1)), "/", &[b.int(0)])],
        Some(b.rescue(
            &[b.constant("ZeroDivisionError")],
            Some("e"),
            &[b.call(Some(b.lvar("e")), "message", &[])],
        )),
        None,
    )]);

    assert_eq!(run(program).value, Value::string("divided by 0"));
}

#[test]
fn test_rescue_skips_unrelated_classes() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.begin(
        &[b.fcall("raise", &[b.string("boom")])],
        Some(b.rescue(&[b.constant("ZeroDivisionError")], None, &[b.int(1)])),
        None,
    )]);

    assert_eq!(run_err(program), guest("RuntimeError", "boom"));
}

#[test]
fn test_retry_reruns_body() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("attempts", b.int(0)),
        b.begin(
            &[
                b.lasgn("attempts", b.call(Some(b.lvar("attempts")), "+", &[b.int(1)])),
                b.if_(
                    b.call(Some(b.lvar("attempts")), "<", &[b.int(3)]),
                    &[b.fcall("raise", &[b.string("again")])],
                    None,
                ),
                b.lvar("attempts"),
            ],
            Some(b.rescue(&[], None, &[b.node(NodeKind::Retry)])),
            None,
        ),
    ]);

    assert_eq!(run(program).value, Value::Int(3));
}

#[test]
fn test_ensure_runs_on_success_and_on_raise() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let log = |value| b.call(Some(b.lvar("log")), "<<", &[value]);
    let inner = b.begin(
        &[b.fcall("raise", &[b.string("inner")])],
        None,
        Some(&[log(b.symbol("ensured"))][..]),
    );
    let program = b.program(&[
        b.lasgn("log", b.array(&[])),
        b.begin(&[log(b.int(1))], None, Some(&[log(b.int(2))][..])),
        b.begin(
            &[inner],
            Some(b.rescue(&[], Some("e"), &[log(b.call(Some(b.lvar("e")), "message", &[]))])),
            None,
        ),
        b.lvar("log"),
    ]);

    assert_eq!(
        run(program).value,
        Value::array(vec![
            Value::Int(1),
            Value::Int(2),
            Value::symbol("ensured"),
            Value::string("inner"),
        ])
    );
}

#[test]
fn test_custom_exception_escapes_program() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.class("ParseFailure", Some(b.constant("StandardError")), &[]),
        b.fcall("raise", &[b.constant("ParseFailure"), b.string("unexpected token")]),
    ]);

    assert_eq!(run_err(program), guest("ParseFailure", "unexpected token"));
}

// ============================================================================
// Methods and classes
// ============================================================================

#[test]
fn test_keyword_parameters() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let parameters = b.parameters(Parameters {
        keywords: b.keywords(&[
            b.keyword_param("name", None),
            b.keyword_param("greeting", Some(b.string("Hello"))),
        ]),
        ..Parameters::default()
    });
    let body = b.call(
        Some(b.call(Some(b.lvar("greeting")), "+", &[b.string(", ")])),
        "+",
        &[b.lvar("name")],
    );
    let program = b.program(&[
        b.def("greet", Some(parameters), &[body]),
        b.fcall(
            "greet",
            &[b.keyword_hash(&[b.assoc(b.symbol("name"), b.string("Ann"))])],
        ),
    ]);

    assert_eq!(run(program).value, Value::string("Hello, Ann"));
}

#[test]
fn test_missing_keyword() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let parameters = b.parameters(Parameters {
        keywords: b.keywords(&[b.keyword_param("name", None)]),
        ..Parameters::default()
    });
    let program = b.program(&[
        b.def("greet", Some(parameters), &[b.lvar("name")]),
        b.fcall("greet", &[]),
    ]);

    assert_eq!(run_err(program), guest("ArgumentError", "missing keyword: :name"));
}

#[test]
fn test_keyword_default_reads_positional() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    // def f(a, k: a) = k
    let parameters = b.parameters(Parameters {
        requireds: b.list(&[b.ltarget("a")]),
        keywords: b.keywords(&[b.keyword_param("k", Some(b.lvar("a")))]),
        ..Parameters::default()
    });
    let program = b.program(&[
        b.def("f", Some(parameters), &[b.lvar("k")]),
        b.fcall("f", &[b.int(1)]),
    ]);

    assert_eq!(run(program).value, Value::Int(1));
}

#[test]
fn test_method_arity_is_checked() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.def("pair", Some(b.required_params(&["a", "b"])), &[b.lvar("a")]),
        b.fcall("pair", &[b.int(1)]),
    ]);

    assert_eq!(
        run_err(program),
        guest("ArgumentError", "wrong number of arguments (given 1, expected 2)")
    );
}

#[test]
fn test_lambda_closes_over_locals() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("offset", b.int(100)),
        b.lasgn(
            "add",
            b.lambda(
                Some(b.required_params(&["n"])),
                &[b.call(Some(b.lvar("n")), "+", &[b.lvar("offset")])],
            ),
        ),
        b.lasgn("offset", b.int(200)),
        b.call(Some(b.lvar("add")), "call", &[b.int(1)]),
    ]);

    assert_eq!(run(program).value, Value::Int(201));
}

#[test]
fn test_class_with_initialize_and_accessors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let point = b.class(
        "Point",
        None,
        &[
            b.fcall("attr_accessor", &[b.symbol("x"), b.symbol("y")]),
            b.def(
                "initialize",
                Some(b.required_params(&["x", "y"])),
                &[b.iasgn("@x", b.lvar("x")), b.iasgn("@y", b.lvar("y"))],
            ),
            b.def(
                "sum",
                None,
                &[b.call(Some(b.ivar("@x")), "+", &[b.ivar("@y")])],
            ),
        ],
    );
    let program = b.program(&[
        point,
        b.lasgn("p", b.call(Some(b.constant("Point")), "new", &[b.int(3), b.int(4)])),
        b.call(Some(b.lvar("p")), "x=", &[b.int(10)]),
        b.array(&[
            b.call(Some(b.lvar("p")), "x", &[]),
            b.call(Some(b.lvar("p")), "sum", &[]),
        ]),
    ]);

    assert_eq!(run(program).value, Value::array(vec![Value::Int(10), Value::Int(14)]));
}

#[test]
fn test_super_calls_parent_method() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let animal = b.class(
        "Animal",
        None,
        &[b.def(
            "speak",
            Some(b.required_params(&["sound"])),
            &[b.call(Some(b.string("says ")), "+", &[b.lvar("sound")])],
        )],
    );
    let dog = b.class(
        "Dog",
        Some(b.constant("Animal")),
        &[b.def(
            "speak",
            Some(b.required_params(&["sound"])),
            &[b.call(
                Some(b.node(NodeKind::ForwardingSuper { block: None })),
                "+",
                &[b.string("!")],
            )],
        )],
    );
    let program = b.program(&[
        animal,
        dog,
        b.call(
            Some(b.call(Some(b.constant("Dog")), "new", &[])),
            "speak",
            &[b.string("woof")],
        ),
    ]);

    assert_eq!(run(program).value, Value::string("says woof!"));
}

#[test]
fn test_to_s_override_is_used_by_puts() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.class("Greeting", None, &[b.def("to_s", None, &[b.string("hello")])]),
        b.fcall("puts", &[b.call(Some(b.constant("Greeting")), "new", &[])]),
    ]);

    assert_eq!(run(program).output, "hello\n");
}

// ============================================================================
// Pattern matching
// ============================================================================

#[test]
fn test_case_in_binds_nested_array() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let inner = b.node(NodeKind::ArrayPattern {
        constant: None,
        requireds: b.list(&[b.ltarget("second")]),
        rest: Some(b.splat(b.ltarget("rest"))),
        posts: &[],
    });
    let pattern = b.node(NodeKind::ArrayPattern {
        constant: None,
        requireds: b.list(&[b.ltarget("first"), inner]),
        rest: None,
        posts: &[],
    });
    let clause = b.node(NodeKind::In {
        pattern,
        statements: Some(b.statements(&[b.array(&[
            b.lvar("first"),
            b.lvar("second"),
            b.lvar("rest"),
        ])])),
    });
    let subject = b.array(&[b.int(1), b.array(&[b.int(2), b.int(3), b.int(4)])]);
    let program = b.program(&[b.node(NodeKind::CaseMatch {
        predicate: subject,
        conditions: b.list(&[clause]),
        else_clause: None,
    })]);

    assert_eq!(
        run(program).value,
        Value::array(vec![
            Value::Int(1),
            Value::Int(2),
            Value::array(vec![Value::Int(3), Value::Int(4)]),
        ])
    );
}

#[test]
fn test_case_in_without_match() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let clause = b.node(NodeKind::In {
        pattern: b.constant("String"),
        statements: Some(b.statements(&[b.int(1)])),
    });
    let program = b.program(&[b.node(NodeKind::CaseMatch {
        predicate: b.int(5),
        conditions: b.list(&[clause]),
        else_clause: None,
    })]);

    assert_eq!(run_err(program), guest("NoMatchingPatternError", "5"));
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn test_deep_recursion_hits_depth_limit() {
    test_utils::init_test_logging();
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.def(
            "down",
            Some(b.required_params(&["n"])),
            &[b.fcall("down", &[b.call(Some(b.lvar("n")), "+", &[b.int(1)])])],
        ),
        b.begin(
            &[b.fcall("down", &[b.int(0)])],
            Some(b.rescue(&[b.constant("Exception")], None, &[b.int(0)])),
            None,
        ),
    ]);
    let options = ExecutionOptions {
        max_depth: 50,
        max_iterations: None,
    };

    let error = run_with(program, options).unwrap_err();
    assert!(
        matches!(
            error,
            ExecutionError::ResourceExceeded(ResourceExceededError::StackOverflow { max_depth: 50, .. })
        ),
        "got {:?}",
        error
    );
}

#[test]
fn test_infinite_loop_hits_iteration_limit() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(b.true_(), &[b.nil()])]);
    let options = ExecutionOptions {
        max_depth: 1000,
        max_iterations: Some(100),
    };

    assert_eq!(
        run_with(program, options).unwrap_err(),
        ExecutionError::ResourceExceeded(ResourceExceededError::IterationLimit { max: 100 })
    );
}

#[test]
fn test_block_iterations_count_against_limit() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call_with_block(
        Some(b.int(1_000)),
        "times",
        &[],
        b.block(None, &[b.nil()]),
    )]);
    let options = ExecutionOptions {
        max_depth: 1000,
        max_iterations: Some(10),
    };

    assert!(matches!(
        run_with(program, options),
        Err(ExecutionError::ResourceExceeded(ResourceExceededError::IterationLimit { max: 10 }))
    ));
}
