use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lang::tokenizer::tokenize;
use lang::Evaluator;

// ============================================================================
// Tokenizer Benchmarks
// ============================================================================

fn benchmark_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");

    let simple = "2 3 add 4 multiply";
    group.bench_with_input(
        BenchmarkId::new("simple_expr", "2 3 add"),
        &simple,
        |b, src| {
            b.iter(|| tokenize(black_box(src)).unwrap());
        },
    );

    let quoted = r#""alpha" "beta gamma" 1 2 3 add add add"#;
    group.bench_with_input(
        BenchmarkId::new("quoted_strings", "mixed"),
        &quoted,
        |b, src| {
            b.iter(|| tokenize(black_box(src)).unwrap());
        },
    );

    group.finish();
}

// ============================================================================
// Evaluator Benchmarks
// ============================================================================

fn benchmark_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator");

    let scalar_chain = "1 2 add 3 add 4 add 5 add 6 add 7 add 8 add";
    group.bench_with_input(
        BenchmarkId::new("scalar_chain", "8 adds"),
        &scalar_chain,
        |b, src| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                evaluator.evaluate_line(black_box(src)).unwrap()
            });
        },
    );

    let list_broadcast = "[ 1 2 3 4 5 6 7 8 9 10 ] sqr sum";
    group.bench_with_input(
        BenchmarkId::new("list_broadcast", "10 elements"),
        &list_broadcast,
        |b, src| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                evaluator.evaluate_line(black_box(src)).unwrap()
            });
        },
    );

    let lazy_pipeline = "1 1000 range sqr sum";
    group.bench_with_input(
        BenchmarkId::new("lazy_pipeline", "1000 elements"),
        &lazy_pipeline,
        |b, src| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                evaluator.evaluate_line(black_box(src)).unwrap()
            });
        },
    );

    let lambda = "7 lambda x sqr x add eval";
    group.bench_with_input(
        BenchmarkId::new("lambda_eval", "x² + x"),
        &lambda,
        |b, src| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                evaluator.evaluate_line(black_box(src)).unwrap()
            });
        },
    );

    // compile once, invoke many times
    let reused_lambda = "1 100 range lambda x sqr x add eval sum";
    group.bench_with_input(
        BenchmarkId::new("lambda_broadcast", "100 invocations"),
        &reused_lambda,
        |b, src| {
            b.iter(|| {
                let mut evaluator = Evaluator::new();
                evaluator.evaluate_line(black_box(src)).unwrap()
            });
        },
    );

    group.finish();
}

criterion_group!(benches, benchmark_tokenizer, benchmark_evaluator);
criterion_main!(benches);
