#![allow(dead_code)]

use std::path::Path;

use pyhost::{Config, Interpreter};
use test_support::{Case, bench_cases};

const PROGRAMS: &str = "tests/programs";

/// Bench-enabled cases tagged `tag`, with their sources loaded.
pub fn workloads(tag: &str) -> Vec<(Case, String)> {
    bench_cases(Path::new(PROGRAMS), tag)
        .unwrap_or_else(|err| panic!("load bench cases: {err:#}"))
        .into_iter()
        .map(|case| {
            let source = case
                .source()
                .unwrap_or_else(|err| panic!("read {}: {err:#}", case.name));
            (case, source)
        })
        .collect()
}

pub fn interpreter_for(case: &Case) -> Interpreter {
    Interpreter::new(Config::captured().with_search_path(&case.dir))
        .unwrap_or_else(|err| panic!("start interpreter: {}", err.report()))
}
