use bumpalo::Bump;
use garnet_ast::{AstBuilder, NodeRef};
use indoc::indoc;
use pretty_assertions::assert_eq;

use super::{EmitError, emit};
use crate::instructions::{CallSite, Instruction, Label, Op};
use crate::options::CompilerOptions;
use crate::passes::{Pipeline, compile};

fn emit_source(program: NodeRef<'_>) -> String {
    let options = CompilerOptions::default();
    let ir = compile(program, &options).unwrap();
    emit(&ir, &options).unwrap()
}

fn emit_instructions(instructions: Vec<Op>) -> Result<String, EmitError> {
    let options = CompilerOptions::default();
    let instructions = instructions.into_iter().map(Instruction::from).collect();
    let ir = Pipeline::from_instructions(instructions, 8, &options)
        .finish()
        .unwrap();
    emit(&ir, &options)
}

fn assert_contains(source: &str, needles: &[&str]) {
    for needle in needles {
        assert!(
            source.contains(needle),
            "missing `{}` in:\n{}",
            needle,
            source
        );
    }
}

#[test]
fn test_addition_program() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(5)), "+", &[b.int(3)])]);

    assert_eq!(
        emit_source(program),
        indoc! {r#"
            // main: generated by garnet
            #include "garnet/runtime.hpp"

            using namespace garnet;

            Value garnet_main(Env *outer_env, Value self, Args args, Block *block) {
                Env *env = env_new(outer_env, 0);
                Value t1 = send(int_value(5LL), "+", Args{{int_value(3LL)}, false}, nullptr);
                return t1;
            }
        "#}
    );
}

#[test]
fn test_file_name_in_header() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.nil()]);
    let options = CompilerOptions {
        file_name: "demo.rb".to_string(),
        ..CompilerOptions::default()
    };
    let ir = compile(program, &options).unwrap();
    let source = emit(&ir, &options).unwrap();
    assert!(source.starts_with("// demo.rb: generated by garnet\n"));
}

#[test]
fn test_plain_local_is_a_cpp_variable() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.lasgn("x", b.int(1)), b.lvar("x")]);

    let source = emit_source(program);
    assert_contains(&source, &["Value v0_x = int_value(1LL);", " = v0_x;"]);
    assert!(!source.contains("env_set"));
}

#[test]
fn test_captured_local_lives_in_env() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("x", b.int(1)),
        b.call_with_block(
            Some(b.array(&[b.int(1)])),
            "each",
            &[],
            b.block(None, &[b.lvar("x")]),
        ),
    ]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &[
            "env_set(env, 0, 0, int_value(1LL));",
            "env_get(env, 1, 0)",
            "redo:",
            "block_new(env, block_",
        ],
    );
}

#[test]
fn test_if_else_merges_into_result_temp() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.if_(
        b.true_(),
        &[b.int(1)],
        Some(b.statements(&[b.int(2)])),
    )]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &[
            "    Value r1 = Qnil;\n    if (truthy(Qtrue)) {\n        r1 = int_value(1LL);\n    } else {\n        r1 = int_value(2LL);\n    }\n",
            "return r1;",
        ],
    );
}

#[test]
fn test_loop_break_leaves_the_cpp_loop() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(b.true_(), &[b.break_(Some(b.int(1)))])]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &[
            "Value loop_1 = Qnil;",
            "while (true) {",
            "if (!truthy(Qtrue)) break;",
            "loop_1 = int_value(1LL); break;",
            "next_1: ;",
            "return loop_1;",
        ],
    );
    assert!(!source.contains("throw_break"));
}

#[test]
fn test_block_break_throws_to_guarded_call() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call_with_block(
        Some(b.array(&[b.int(1)])),
        "each",
        &[],
        b.block(None, &[b.break_(Some(b.int(2)))]),
    )]);

    let source = emit_source(program);
    assert_contains(&source, &["guard_break(", "throw_break("]);
}

#[test]
fn test_method_definition() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.def("foo", None, &[b.int(1)])]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &[
            "static Value method_1(Env *outer_env, Value self, Args args, Block *block) {",
            "    Env *env = env_new(nullptr, 0);",
            "define_method(self, \"foo\", method_1, ",
            "symbol(\"foo\")",
        ],
    );
    // Nested functions precede their users.
    let method = source.find("static Value method_1").unwrap();
    let main = source.find("Value garnet_main").unwrap();
    assert!(method < main);
}

#[test]
fn test_return_from_block_is_caught_by_method() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.def(
        "first",
        None,
        &[
            b.call_with_block(
                Some(b.array(&[b.int(1)])),
                "each",
                &[],
                b.block(None, &[b.return_(Some(b.int(1)))]),
            ),
            b.int(2),
        ],
    )]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &["throw_return(", "catch (ReturnSignal &signal) {", "return signal.value;"],
    );
}

#[test]
fn test_rescue_uses_try_macros() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.begin(
        &[b.int(1)],
        Some(b.rescue(&[], None, &[b.int(2)])),
        None,
    )]);

    let source = emit_source(program);
    assert_contains(
        &source,
        &[
            "GARNET_TRY(",
            "} GARNET_CATCH {",
            "} GARNET_END_TRY;",
            "match_exception(",
            "reraise();",
        ],
    );
}

#[test]
fn test_strings_are_escaped() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.string("say \"hi\"\n")]);

    let source = emit_source(program);
    assert_contains(&source, &[r#"string_new("say \"hi\"\n")"#]);
}

#[test]
fn test_argc_where_value_expected() {
    let error = emit_instructions(vec![Op::PushArgc(0), Op::PushArgc(0), Op::Send(CallSite::new("x"))])
        .unwrap_err();
    assert_eq!(error, EmitError::ExpectedValue { index: 2 });
}

#[test]
fn test_stack_underflow() {
    let error = emit_instructions(vec![Op::Pop]).unwrap_err();
    assert_eq!(error, EmitError::StackUnderflow { index: 0 });
}

#[test]
fn test_unbalanced_branches() {
    let error = emit_instructions(vec![
        Op::PushTrue,
        Op::If,
        Op::PushInt(1),
        Op::Else(Label::If),
        Op::End(Label::If),
    ])
    .unwrap_err();
    assert_eq!(error, EmitError::UnbalancedBranches { index: 1 });
}
