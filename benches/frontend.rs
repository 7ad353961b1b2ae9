mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pyhost::{lexer, parser};

fn bench_frontend(c: &mut Criterion) {
    for (case, source) in common::workloads("frontend") {
        let lines = lexer::tokenize(&source).expect("tokenize");

        c.bench_function(&format!("frontend_tokenize_{}", case.name), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source)).expect("tokenize");
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_parse_only_{}", case.name), |b| {
            b.iter(|| {
                let out = parser::parse_lines(black_box(&lines)).expect("parse");
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_tokenize_parse_{}", case.name), |b| {
            b.iter(|| {
                let out = parser::parse(black_box(&source)).expect("parse");
                black_box(out);
            })
        });
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
