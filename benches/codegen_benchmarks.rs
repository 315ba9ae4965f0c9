//! Benchmarks for the recurrence code generator.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recurgen::catalog;
use recurgen::codegen::{LayeredGenerator, PerValueGenerator};
use recurgen::dsl::RuleParser;

/// Benchmark rule-body parsing.
fn bench_parsing(c: &mut Criterion) {
    let indices: Vec<String> = ["nA", "nB", "t"].iter().map(|s| s.to_string()).collect();
    let vars: Vec<String> = ["PA", "PB", "aAB"].iter().map(|s| s.to_string()).collect();
    let source = "aAB * E[nA-1, nB, t-1] + PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]";

    c.bench_function("parse_hermite_rule", |b| {
        b.iter(|| {
            let parser = RuleParser::new(&indices, &vars, "E");
            parser.parse_expression(black_box(source)).unwrap()
        })
    });
}

/// Benchmark per-value generation for the full Hermite E definition.
fn bench_pervalue_generation(c: &mut Criterion) {
    let rec = catalog::hermite_e().unwrap();

    c.bench_function("generate_hermite_pervalue", |b| {
        b.iter(|| PerValueGenerator::new(black_box(&rec)).generate().unwrap())
    });
}

/// Benchmark layered generation for the Coulomb R definition.
fn bench_layered_generation(c: &mut Criterion) {
    let rec = catalog::coulomb_r().unwrap();

    c.bench_function("generate_coulomb_layered", |b| {
        b.iter(|| LayeredGenerator::new(black_box(&rec)).generate().unwrap())
    });
}

criterion_group!(
    benches,
    bench_parsing,
    bench_pervalue_generation,
    bench_layered_generation
);
criterion_main!(benches);
