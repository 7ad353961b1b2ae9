use anyhow::{Context, Result, bail, ensure};
use std::path::Path;

use pyhost::{Config, Interpreter};
use test_support::{Case, CaseClass, load_cases, normalize_output};

const PROGRAMS: &str = "tests/programs";

fn interpreter_for(case: &Case) -> Result<Interpreter> {
    let config = Config::captured().with_search_path(&case.dir);
    Interpreter::new(config).map_err(|error| anyhow::anyhow!(error.report()))
        .with_context(|| format!("Starting interpreter for {}", case.name))
}

fn run_case(case: &Case) -> Result<()> {
    case.validate()?;
    let source = case.source()?;
    let interpreter = interpreter_for(case)?;
    let outcome = interpreter.run_source("__main__", &source);
    let output = interpreter.take_output();

    match case.spec.class {
        CaseClass::RuntimeSuccess => {
            if let Err(error) = outcome {
                bail!("Case {} failed: {}", case.name, error.report());
            }
            let expected = case.expected_stdout()?;
            pretty_assertions::assert_eq!(
                normalize_output(&output),
                normalize_output(&expected),
                "Output mismatch for {}",
                case.name
            );
        }
        CaseClass::FrontendError | CaseClass::RuntimeError => {
            let Err(error) = outcome else {
                bail!("Expected {} to fail, but it ran to completion", case.name);
            };
            let wants_frontend = case.spec.class == CaseClass::FrontendError;
            ensure!(
                error.is_syntax_error() == wants_frontend,
                "Case {} failed in the wrong stage: {}",
                case.name,
                error.report()
            );
            let expected_error = case.expected_error()?;
            let actual = error.to_string();
            ensure!(
                actual.contains(&expected_error),
                "Expected error containing '{expected_error}' in {}, got '{actual}'",
                case.name
            );
            if !case.spec.expected.trace.is_empty() {
                let frames: Vec<String> = error.trace().iter().map(ToString::to_string).collect();
                pretty_assertions::assert_eq!(
                    frames,
                    case.spec.expected.trace,
                    "Trace mismatch for {}",
                    case.name
                );
            }
            if let Some(stdout_file) = case.spec.expected.stdout_file.as_deref() {
                let expected = case.read_text(stdout_file)?;
                pretty_assertions::assert_eq!(
                    normalize_output(&output),
                    normalize_output(&expected),
                    "Partial output mismatch for {}",
                    case.name
                );
            }
        }
    }
    Ok(())
}

fn run_class(class: CaseClass) -> Result<()> {
    let cases = load_cases(Path::new(PROGRAMS))?;
    let mut ran = 0;
    for case in cases.iter().filter(|case| case.spec.class == class) {
        run_case(case)?;
        ran += 1;
    }
    ensure!(ran > 0, "No {class:?} cases in {PROGRAMS}");
    Ok(())
}

#[test]
fn runs_successful_programs() -> Result<()> {
    run_class(CaseClass::RuntimeSuccess)
}

#[test]
fn reports_frontend_errors() -> Result<()> {
    run_class(CaseClass::FrontendError)
}

#[test]
fn reports_runtime_errors() -> Result<()> {
    run_class(CaseClass::RuntimeError)
}
