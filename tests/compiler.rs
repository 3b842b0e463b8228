use bumpalo::Bump;
use garnet::ast::{AstBuilder, NodeKind};
use garnet::{CompilerOptions, Compiler, EngineOptions, Error, ExecutionOptions, Value};
use garnet_core::LoweringError;
use garnet_core::vm::ResourceExceededError;
use miette::Diagnostic;
use pretty_assertions::assert_eq;

fn code(error: &Error) -> Option<String> {
    error.code().map(|code| code.to_string())
}

#[test]
fn compile_and_run() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(5)), "+", &[b.int(3)])]);

    let compiled = Compiler::default().compile(program).unwrap();
    assert_eq!(compiled.run().unwrap().value, Value::Int(8));
    // Every run starts from a fresh machine.
    assert_eq!(compiled.run().unwrap().value, Value::Int(8));
}

#[test]
fn bytecode_round_trip_runs_the_same() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(
        Some(b.required_params(&["x"])),
        &[b.lasgn("total", b.call(Some(b.lvar("total")), "+", &[b.lvar("x")]))],
    );
    let program = b.program(&[
        b.lasgn("total", b.int(0)),
        b.call_with_block(
            Some(b.array(&[b.int(1), b.int(2), b.int(3)])),
            "each",
            &[],
            block,
        ),
        b.fcall("puts", &[b.lvar("total")]),
        b.lvar("total"),
    ]);

    let compiler = Compiler::default();
    let compiled = compiler.compile(program).unwrap();
    let bytes = compiled.to_bytecode();
    assert_eq!(&bytes[..4], b"GRNT");

    let loaded = compiler.from_bytecode(&bytes).unwrap();
    let execution = loaded.run().unwrap();
    assert_eq!(execution.value, Value::Int(6));
    assert_eq!(execution.output, "6\n");
}

#[test]
fn return_from_block_survives_bytecode() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(None, &[b.return_(Some(b.int(1)))]);
    let program = b.program(&[
        b.def(
            "first",
            None,
            &[b.call_with_block(Some(b.array(&[b.int(9)])), "each", &[], block), b.int(2)],
        ),
        b.fcall("first", &[]),
    ]);

    let compiler = Compiler::default();
    let compiled = compiler.compile(program).unwrap();
    let loaded = compiler.from_bytecode(&compiled.to_bytecode()).unwrap();
    assert_eq!(compiled.run().unwrap().value, Value::Int(1));
    assert_eq!(loaded.run().unwrap().value, Value::Int(1));
}

#[test]
fn emit_native_uses_file_name() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.fcall("puts", &[b.string("hi")])]);
    let options = CompilerOptions {
        file_name: "greeting.rb".to_string(),
        ..CompilerOptions::default()
    };

    let compiled = Compiler::default().compile_with(program, &options).unwrap();
    let source = compiled.emit_native().unwrap();
    assert!(source.contains("garnet_main"), "{}", source);
    assert!(source.contains("greeting.rb"), "{}", source);
}

#[test]
fn lowering_errors_carry_a_code() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.node(NodeKind::Retry)]);

    let error = Compiler::default().compile(program).unwrap_err();
    assert!(matches!(error, Error::Lowering(LoweringError::InvalidRetry { .. })), "{:?}", error);
    assert_eq!(code(&error).as_deref(), Some("garnet::lowering"));
}

#[test]
fn bad_bytecode_is_rejected() {
    let error = Compiler::default().from_bytecode(b"NOPE\x00\x01").unwrap_err();
    assert_eq!(code(&error).as_deref(), Some("garnet::bytecode"));
}

#[test]
fn uncaught_exception_is_runtime_error() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.call(Some(b.int(1)), "/", &[b.int(0)])]);

    let error = Compiler::default().compile(program).unwrap().run().unwrap_err();
    let guest = error.guest().unwrap();
    assert_eq!(guest.class, "ZeroDivisionError");
    assert_eq!(guest.message, "divided by 0");
    assert_eq!(error.to_string(), "divided by 0 (ZeroDivisionError)");
    assert_eq!(code(&error).as_deref(), Some("garnet::runtime"));
}

#[test]
fn execution_limits_come_from_engine_options() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let program = b.program(&[b.while_(b.true_(), &[b.nil()])]);
    let compiler = Compiler::new(EngineOptions {
        default_execution_options: ExecutionOptions {
            max_depth: 100,
            max_iterations: Some(50),
        },
        ..EngineOptions::default()
    });

    let error = compiler.compile(program).unwrap().run().unwrap_err();
    assert_eq!(
        error,
        Error::ResourceExceeded(ResourceExceededError::IterationLimit { max: 50 })
    );
    assert_eq!(code(&error).as_deref(), Some("garnet::resource_exceeded"));
}
