//! The whole pipeline, from syntax tree to a running program.

use bumpalo::Bump;
use garnet_ast::AstBuilder;
use garnet_core::instructions::CallSite;
use garnet_core::passes::{Pipeline, compile};
use garnet_core::vm::{self, Value};
use garnet_core::{CompilerOptions, ExecutionOptions, InstructionManager, Op, Stage, bytecode};
use pretty_assertions::assert_eq;

fn ops(instructions: &[garnet_core::Instruction]) -> Vec<Op> {
    instructions.iter().map(|i| i.op.clone()).collect()
}

#[test]
fn addition_lowers_and_evaluates() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(5)), "+", &[b.int(3)])]);

    let ir = compile(program, &CompilerOptions::default()).unwrap();
    assert_eq!(
        ops(&ir.instructions),
        vec![
            Op::PushInt(5),
            Op::PushInt(3),
            Op::PushArgc(1),
            Op::Send(CallSite::new("+")),
        ]
    );

    let execution = vm::execute(&ir, ExecutionOptions::default()).unwrap();
    assert_eq!(execution.value, Value::Int(8));
}

#[test]
fn return_from_block_terminates_method() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.lasgn("x", b.int(1)), b.return_(Some(b.lvar("x")))]);
    let program = b.program(&[
        b.def(
            "m",
            None,
            &[
                b.call_with_block(Some(b.array(&[b.int(10), b.int(20)])), "each", &[], block),
                b.int(2),
            ],
        ),
        b.fcall("m", &[]),
    ]);

    let ir = compile(program, &CompilerOptions::default()).unwrap();
    let execution = vm::execute(&ir, ExecutionOptions::default()).unwrap();
    assert_eq!(execution.value, Value::Int(1));
}

#[test]
fn stepwise_pipeline_matches_compile() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(
        Some(b.required_params(&["x"])),
        &[b.call(Some(b.lvar("x")), "*", &[b.lvar("factor")])],
    );
    let program = b.program(&[
        b.lasgn("factor", b.int(3)),
        b.call_with_block(Some(b.array(&[b.int(1), b.int(2)])), "map", &[], block),
    ]);
    let options = CompilerOptions::default();

    let mut pipeline = Pipeline::lower(program, &options).unwrap();
    pipeline.build_scopes().unwrap();
    pipeline.resolve_captures().unwrap();
    pipeline.wire_break_points().unwrap();
    pipeline.wire_return_points().unwrap();
    assert_eq!(pipeline.stage(), Stage::ReturnsWired);
    let stepwise = pipeline.into_ir();

    let direct = compile(program, &options).unwrap();
    assert_eq!(ops(&stepwise.instructions), ops(&direct.instructions));

    let execution = vm::execute(&stepwise, ExecutionOptions::default()).unwrap();
    assert_eq!(execution.value, Value::array(vec![Value::Int(3), Value::Int(6)]));
}

#[test]
fn decoded_program_runs_after_passes() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[
        b.lasgn("i", b.int(0)),
        b.while_(
            b.call(Some(b.lvar("i")), "<", &[b.int(4)]),
            &[b.lasgn("i", b.call(Some(b.lvar("i")), "+", &[b.int(1)]))],
        ),
        b.fcall("p", &[b.lvar("i")]),
    ]);
    let options = CompilerOptions::default();
    let ir = compile(program, &options).unwrap();

    let decoded = bytecode::decode(&bytecode::encode(&ir.instructions)).unwrap();
    let count = decoded.len();
    let reloaded = Pipeline::from_instructions(decoded, count, &options).finish().unwrap();
    assert_eq!(ops(&reloaded.instructions), ops(&ir.instructions));

    let execution = vm::execute(&reloaded, ExecutionOptions::default()).unwrap();
    assert_eq!(execution.output, "4\n");
}

#[test]
fn manager_edits_keep_program_runnable() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(5)), "+", &[b.int(3)])]);
    let mut ir = compile(program, &CompilerOptions::default()).unwrap();

    let mut manager = InstructionManager::new(&mut ir.instructions, &mut ir.scopes);
    manager.replace_at(1, Op::PushInt(37));
    drop(manager);

    let execution = vm::execute(&ir, ExecutionOptions::default()).unwrap();
    assert_eq!(execution.value, Value::Int(42));
}

#[test]
fn listing_indents_regions() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.if_(b.true_(), &[b.int(1)], Some(b.statements(&[b.int(2)])))]);
    let ir = compile(program, &CompilerOptions::default()).unwrap();

    let listing = ir.listing().to_string();
    let lines: Vec<&str> = listing.lines().map(|line| line.trim_end()).collect();
    assert_eq!(lines.len(), 6, "{}", listing);
    assert!(lines[1].trim_start().starts_with("1  if"), "{}", listing);
    assert!(lines[2].contains("    push_int 1"), "{}", listing);
    assert!(lines[5].trim_start().starts_with("5  end if"), "{}", listing);
}
