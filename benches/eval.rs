//! Interpreter benchmarks
//!
//! Run with: cargo bench --bench eval

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use jsweave::parser::Parser;
use jsweave::{RunOptions, Runtime};

/// Loop with arithmetic and a closure call per iteration
const LOOP: &str = r#"
let total = 0;
const add = (a, b) => a + b;
for (let i = 0; i < 2000; i++) {
    total = add(total, i % 7);
}
total
"#;

const RECURSION: &str = r#"
function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
fib(15)
"#;

const GENERATOR: &str = r#"
function* range(n) { for (let i = 0; i < n; i++) yield i; }
let sum = 0;
for (const v of range(1000)) sum += v;
sum
"#;

const ASYNC: &str = r#"
async function step(n) { return n + 1; }
async function chain(n) {
    let v = 0;
    for (let i = 0; i < n; i++) v = await step(v);
    return v;
}
chain(500)
"#;

const BUILTINS: &str = r#"
const data = [];
for (let i = 0; i < 300; i++) data.push({ id: i, name: "item" + i, tags: ["a", "b"] });
const text = JSON.stringify(data);
JSON.parse(text).filter(x => x.id % 2).map(x => x.name.toUpperCase()).join(",").length
"#;

fn evaluate(source: &str) {
    let mut runtime = Runtime::new();
    let report = runtime.eval(black_box(source), &RunOptions::default());
    black_box(report).ok();
}

fn bench_eval_programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval/programs");
    let programs = [
        ("loop", LOOP),
        ("recursion", RECURSION),
        ("generator", GENERATOR),
        ("async", ASYNC),
        ("builtins", BUILTINS),
    ];
    for (name, source) in programs {
        group.bench_function(name, |b| b.iter(|| evaluate(source)));
    }
    group.finish();
}

fn bench_step_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval/step_budget");
    // Same work split across runs of different budgets
    for budget in [100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(budget), &budget, |b, &budget| {
            b.iter(|| {
                let mut runtime = Runtime::new();
                let options = RunOptions::default().with_max_steps(budget);
                let mut report = runtime.eval(LOOP, &options);
                while let Ok(r) = &report {
                    if r.outcome != jsweave::Outcome::Paused {
                        break;
                    }
                    report = runtime.run(&options);
                }
                black_box(report).ok();
            });
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let source: String = (0..200)
        .map(|i| format!("function f{i}(a, b) {{ let x = a * {i}; return x + b; }}\n"))
        .collect();
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("200_functions", |b| {
        b.iter(|| black_box(Parser::new(black_box(&source)).parse_program()))
    });
    group.finish();
}

criterion_group!(benches, bench_eval_programs, bench_step_budget, bench_parse);
criterion_main!(benches);
