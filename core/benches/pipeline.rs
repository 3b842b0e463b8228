//! Benchmarks for the garnet pipeline.
//!
//! Run with: `cargo bench` in the core/ directory.
//!
//! Benchmark groups:
//! 1. compile: lowering plus every pass
//! 2. bytecode: encode and decode of a compiled program
//! 3. vm_only: interpreting pre-compiled programs
//! 4. emit: native source emission

use bumpalo::Bump;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use garnet_ast::{AstBuilder, NodeRef};
use garnet_core::passes::{Ir, compile};
use garnet_core::{CompilerOptions, ExecutionOptions, bytecode, codegen, vm};

/// `1 + 1 + ... + 1` with `n` additions.
fn arithmetic_chain<'a>(b: &AstBuilder<'a>, n: usize) -> NodeRef<'a> {
    let mut expression = b.int(1);
    for _ in 0..n {
        expression = b.call(Some(expression), "+", &[b.int(1)]);
    }
    b.program(&[expression])
}

/// `total = 0; (1..n).each { |i| total += i }; total`, closing over `total`.
fn block_loop<'a>(b: &AstBuilder<'a>, n: i64) -> NodeRef<'a> {
    let block = b.block(
        Some(b.required_params(&["i"])),
        &[b.lasgn("total", b.call(Some(b.lvar("total")), "+", &[b.lvar("i")]))],
    );
    b.program(&[
        b.lasgn("total", b.int(0)),
        b.call_with_block(Some(b.range(b.int(1), b.int(n), false)), "each", &[], block),
        b.lvar("total"),
    ])
}

fn compiled(program: NodeRef<'_>) -> Ir {
    compile(program, &CompilerOptions::default()).expect("Compile failed")
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for size in [100, 200, 400, 800] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            let arena = Bump::new();
            let b = AstBuilder::new(&arena);
            let program = arithmetic_chain(&b, size);

            bencher.iter(|| {
                let ir = compile(black_box(program), &CompilerOptions::default()).expect("Compile failed");
                black_box(ir.instructions.len())
            });
        });
    }

    group.finish();
}

fn bench_bytecode(c: &mut Criterion) {
    let mut group = c.benchmark_group("bytecode");

    for size in [100, 400] {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let ir = compiled(arithmetic_chain(&b, size));
        let bytes = bytecode::encode(&ir.instructions);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &ir, |bencher, ir| {
            bencher.iter(|| black_box(bytecode::encode(black_box(&ir.instructions))));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |bencher, bytes| {
            bencher.iter(|| black_box(bytecode::decode(black_box(bytes)).expect("Decode failed")));
        });
    }

    group.finish();
}

fn bench_vm_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm_only");

    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            let arena = Bump::new();
            let b = AstBuilder::new(&arena);
            let ir = compiled(block_loop(&b, size as i64));

            bencher.iter(|| {
                let execution = vm::execute(black_box(&ir), ExecutionOptions::default()).expect("Run failed");
                black_box(execution.value)
            });
        });
    }

    group.finish();
}

fn bench_emit(c: &mut Criterion) {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let ir = compiled(block_loop(&b, 10));
    let options = CompilerOptions::default();

    c.bench_function("emit_native", |bencher| {
        bencher.iter(|| black_box(codegen::emit(black_box(&ir), &options).expect("Emit failed")));
    });
}

criterion_group!(benches, bench_compile, bench_bytecode, bench_vm_only, bench_emit);
criterion_main!(benches);
