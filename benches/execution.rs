mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_execution(c: &mut Criterion) {
    for (case, source) in common::workloads("execution") {
        c.bench_function(&format!("execution_total_{}", case.name), |b| {
            b.iter(|| {
                let interpreter = common::interpreter_for(&case);
                let module = interpreter
                    .run_source("__main__", black_box(&source))
                    .unwrap_or_else(|err| panic!("{}: {}", case.name, err.report()));
                black_box((module, interpreter.take_output()));
            })
        });

        let interpreter = common::interpreter_for(&case);
        c.bench_function(&format!("execution_warm_{}", case.name), |b| {
            b.iter(|| {
                let module = interpreter
                    .run_source("__main__", black_box(&source))
                    .unwrap_or_else(|err| panic!("{}: {}", case.name, err.report()));
                black_box(module);
                interpreter.take_output();
            })
        });
    }
}

criterion_group!(benches, bench_execution);
criterion_main!(benches);
