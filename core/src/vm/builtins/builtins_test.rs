use bumpalo::Bump;
use garnet_ast::{AstBuilder, NodeRef};
use pretty_assertions::assert_eq;

use crate::options::{CompilerOptions, ExecutionOptions};
use crate::passes::compile;
use crate::vm::{Execution, ExecutionError, GuestError, Value, execute};

fn run(program: NodeRef<'_>) -> Execution {
    let ir = compile(program, &CompilerOptions::default()).unwrap();
    execute(&ir, ExecutionOptions::default()).unwrap()
}

fn run_err(program: NodeRef<'_>) -> GuestError {
    let ir = compile(program, &CompilerOptions::default()).unwrap();
    match execute(&ir, ExecutionOptions::default()) {
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

// ============================================================================
// Kernel
// ============================================================================

#[test]
fn test_puts_flattens_arrays() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.fcall(
        "puts",
        &[b.array(&[b.int(1), b.array(&[b.int(2), b.int(3)])]), b.nil()],
    )]);

    let execution = run(program);
    assert_eq!(execution.output, "1\n2\n3\n\n");
    assert_eq!(execution.value, Value::Nil);
}

#[test]
fn test_p_inspects_and_returns_argument() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.fcall(
        "p",
        &[b.hash(&[
            b.assoc(b.symbol("a"), b.int(1)),
            b.assoc(b.string("b"), b.string("x")),
        ])],
    )]);

    let execution = run(program);
    assert_eq!(execution.output, "{a: 1, \"b\" => \"x\"}\n");
    assert!(matches!(execution.value, Value::Hash(_)));
}

#[test]
fn test_raise_with_class_and_message() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.fcall("raise", &[b.constant("ArgumentError"), b.string("bad input")])]);

    assert_eq!(run_err(program), guest("ArgumentError", "bad input"));
}

#[test]
fn test_raise_with_only_a_message_is_runtime_error() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.fcall("raise", &[b.string("boom")])]);

    assert_eq!(run_err(program), guest("RuntimeError", "boom"));
}

#[test]
fn test_undefined_method_message() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(1)), "frobnicate", &[])]);

    assert_eq!(
        run_err(program),
        guest("NoMethodError", "undefined method 'frobnicate' for an instance of Integer")
    );
}

#[test]
fn test_is_a_follows_ancestors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.array(&[
        b.call(Some(b.int(3)), "is_a?", &[b.constant("Integer")]),
        b.call(Some(b.int(3)), "is_a?", &[b.constant("Numeric")]),
        b.call(Some(b.string("x")), "is_a?", &[b.constant("Integer")]),
    ])]);

    assert_eq!(
        run(program).value,
        Value::array(vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)])
    );
}

// ============================================================================
// Numeric
// ============================================================================

#[test]
fn test_integer_division_floors() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.array(&[
        b.call(Some(b.int(-7)), "/", &[b.int(2)]),
        b.call(Some(b.int(-7)), "%", &[b.int(3)]),
        b.call(Some(b.int(10)), "divmod", &[b.int(3)]),
    ])]);

    assert_eq!(
        run(program).value,
        Value::array(vec![
            Value::Int(-4),
            Value::Int(2),
            Value::array(vec![Value::Int(3), Value::Int(1)]),
        ])
    );
}

#[test]
fn test_division_by_zero() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(1)), "/", &[b.int(0)])]);

    assert_eq!(run_err(program), guest("ZeroDivisionError", "divided by 0"));
}

#[test]
fn test_overflow_promotes_to_float() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(i64::MAX)), "+", &[b.int(1)])]);

    assert_eq!(run(program).value, Value::Float(i64::MAX as f64 + 1.0));
}

#[test]
fn test_times_accumulates_into_captured_local() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("total", b.int(0)),
        b.call_with_block(
            Some(b.int(5)),
            "times",
            &[],
            b.block(
                Some(b.required_params(&["i"])),
                &[b.lasgn("total", b.call(Some(b.lvar("total")), "+", &[b.lvar("i")]))],
            ),
        ),
        b.lvar("total"),
    ]);

    assert_eq!(run(program).value, Value::Int(10));
}

#[test]
fn test_float_formatting() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.fcall("puts", &[b.float(2.0)]),
        b.fcall("puts", &[b.call(Some(b.int(7)), "fdiv", &[b.int(2)])]),
        b.fcall("puts", &[b.call(Some(b.float(3.14159)), "round", &[b.int(2)])]),
    ]);

    assert_eq!(run(program).output, "2.0\n3.5\n3.14\n");
}

// ============================================================================
// Strings and symbols
// ============================================================================

#[test]
fn test_string_methods() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.fcall("p", &[b.call(Some(b.string("hello")), "upcase", &[])]),
        b.fcall("p", &[b.call(Some(b.string("abc")), "center", &[b.int(7), b.string("*")])]),
        b.fcall("p", &[b.call(Some(b.string("a-b-c")), "split", &[b.string("-")])]),
        b.fcall("p", &[b.call(Some(b.string("  pad  ")), "strip", &[])]),
        b.fcall("p", &[b.call(Some(b.string("ruby")), "to_sym", &[])]),
    ]);

    assert_eq!(
        run(program).output,
        "\"HELLO\"\n\"**abc**\"\n[\"a\", \"b\", \"c\"]\n\"pad\"\n:ruby\n"
    );
}

#[test]
fn test_format_operator() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(
        Some(b.string("%s is %d")),
        "%",
        &[b.array(&[b.string("answer"), b.int(42)])],
    )]);

    assert_eq!(run(program).value, Value::string("answer is 42"));
}

#[test]
fn test_appending_to_frozen_string() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let frozen = b.call(Some(b.string("abc")), "freeze", &[]);
    let program = b.program(&[b.call(Some(frozen), "<<", &[b.string("d")])]);

    assert_eq!(
        run_err(program),
        guest("FrozenError", "can't modify frozen String: \"abc\"")
    );
}

// ============================================================================
// Collections
// ============================================================================

#[test]
fn test_array_sort_and_map() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let sorted = b.call(Some(b.array(&[b.int(3), b.int(1), b.int(2)])), "sort", &[]);
    let doubled = b.call_with_block(
        Some(sorted),
        "map",
        &[],
        b.block(
            Some(b.required_params(&["x"])),
            &[b.call(Some(b.lvar("x")), "*", &[b.int(2)])],
        ),
    );
    let program = b.program(&[doubled]);

    assert_eq!(
        run(program).value,
        Value::array(vec![Value::Int(2), Value::Int(4), Value::Int(6)])
    );
}

#[test]
fn test_reduce_with_symbol_and_block() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let numbers = || b.array(&[b.int(1), b.int(2), b.int(3), b.int(4)]);
    let program = b.program(&[b.array(&[
        b.call(Some(numbers()), "reduce", &[b.symbol("+")]),
        b.call_with_block(
            Some(numbers()),
            "inject",
            &[b.int(1)],
            b.block(
                Some(b.required_params(&["product", "n"])),
                &[b.call(Some(b.lvar("product")), "*", &[b.lvar("n")])],
            ),
        ),
    ])]);

    assert_eq!(run(program).value, Value::array(vec![Value::Int(10), Value::Int(24)]));
}

#[test]
fn test_block_auto_splats_pairs() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let pairs = b.array(&[
        b.array(&[b.string("a"), b.int(1)]),
        b.array(&[b.string("b"), b.int(2)]),
    ]);
    let program = b.program(&[b.call_with_block(
        Some(pairs),
        "map",
        &[],
        b.block(
            Some(b.required_params(&["key", "value"])),
            &[b.call(Some(b.lvar("key")), "*", &[b.lvar("value")])],
        ),
    )]);

    assert_eq!(
        run(program).value,
        Value::array(vec![Value::string("a"), Value::string("bb")])
    );
}

#[test]
fn test_tally_and_hash_default() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let words = || b.array(&[b.string("a"), b.string("b"), b.string("a")]);
    let increment = b.call(
        Some(b.lvar("counts")),
        "[]=",
        &[
            b.lvar("w"),
            b.call(
                Some(b.call(Some(b.lvar("counts")), "[]", &[b.lvar("w")])),
                "+",
                &[b.int(1)],
            ),
        ],
    );
    let program = b.program(&[
        b.fcall("p", &[b.call(Some(words()), "tally", &[])]),
        b.lasgn("counts", b.call(Some(b.constant("Hash")), "new", &[b.int(0)])),
        b.call_with_block(
            Some(words()),
            "each",
            &[],
            b.block(Some(b.required_params(&["w"])), &[increment]),
        ),
        b.fcall("p", &[b.lvar("counts")]),
        b.call(Some(b.lvar("counts")), "[]", &[b.string("missing")]),
    ]);

    let execution = run(program);
    assert_eq!(
        execution.output,
        "{\"a\" => 2, \"b\" => 1}\n{\"a\" => 2, \"b\" => 1}\n"
    );
    assert_eq!(execution.value, Value::Int(0));
}

#[test]
fn test_clear_keeps_hash_default() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let counts = || b.lvar("counts");
    let program = b.program(&[
        b.lasgn("counts", b.call(Some(b.constant("Hash")), "new", &[b.int(5)])),
        b.call(Some(counts()), "[]=", &[b.symbol("a"), b.int(1)]),
        b.call(Some(counts()), "clear", &[]),
        b.array(&[
            b.call(Some(counts()), "size", &[]),
            b.call(Some(counts()), "[]", &[b.symbol("a")]),
        ]),
    ]);

    assert_eq!(run(program).value, Value::array(vec![Value::Int(0), Value::Int(5)]));
}

#[test]
fn test_array_repetition() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let pair = || b.array(&[b.int(1), b.string("x")]);
    let program = b.program(&[
        b.fcall("p", &[b.call(Some(pair()), "*", &[b.int(2)])]),
        b.fcall("p", &[b.call(Some(pair()), "*", &[b.int(0)])]),
        b.call(Some(pair()), "*", &[b.string("-")]),
    ]);

    let execution = run(program);
    assert_eq!(execution.output, "[1, \"x\", 1, \"x\"]\n[]\n");
    assert_eq!(execution.value, Value::string("1-x"));
}

#[test]
fn test_hash_fetch_missing_key() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let hash = b.hash(&[b.assoc(b.symbol("a"), b.int(1))]);
    let program = b.program(&[b.call(Some(hash), "fetch", &[b.symbol("b")])]);

    assert_eq!(run_err(program), guest("KeyError", "key not found: :b"));
}

#[test]
fn test_range_methods() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let evens = b.call_with_block(
        Some(b.range(b.int(1), b.int(10), false)),
        "select",
        &[],
        b.block(
            Some(b.required_params(&["i"])),
            &[b.call(Some(b.lvar("i")), "even?", &[])],
        ),
    );
    let program = b.program(&[
        b.fcall("p", &[b.call(Some(b.range(b.int(1), b.int(4), false)), "sum", &[])]),
        b.fcall("p", &[b.call(Some(b.range(b.int(1), b.int(4), true)), "to_a", &[])]),
        b.fcall("p", &[evens]),
    ]);

    assert_eq!(run(program).output, "10\n[1, 2, 3]\n[2, 4, 6, 8, 10]\n");
}

#[test]
fn test_array_fetch_out_of_range() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.array(&[b.int(1)])), "fetch", &[b.int(5)])]);

    assert_eq!(
        run_err(program),
        guest("IndexError", "index 5 outside of array bounds: -1...1")
    );
}

#[test]
fn test_user_method_shadows_builtin() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.class("Integer", None, &[b.def("even?", None, &[b.string("shadowed")])]),
        b.call(Some(b.int(2)), "even?", &[]),
    ]);

    assert_eq!(run(program).value, Value::string("shadowed"));
}
