use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};

use pyhost::{Config, Error, Interpreter};

/// Script calls nest one closure chain per frame; give them room.
const STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "pyhost", about = "Run Python-flavored scripts", version)]
struct Cli {
    /// Script to run; standard input when omitted
    file: Option<PathBuf>,

    /// Program passed in as a string
    #[arg(short = 'c', long = "command", conflicts_with = "file")]
    command: Option<String>,

    /// Add a directory to the module search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Prelude script to load instead of the built-in one
    #[arg(long, value_name = "FILE")]
    prelude: Option<PathBuf>,

    /// Deepest allowed nesting of script calls
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Log to stderr; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn config(cli: &Cli) -> Config {
    let mut config = Config {
        prelude: cli.prelude.clone(),
        ..Config::default()
    };
    if let Some(dir) = cli.file.as_ref().and_then(|file| file.parent()) {
        config.search_paths.insert(0, dir.to_path_buf());
    }
    config.search_paths.extend(cli.include.iter().cloned());
    if let Some(depth) = cli.max_depth {
        config.max_call_depth = depth;
    }
    config
}

/// Runs the program; `Ok(false)` when the script itself failed.
fn run(cli: Cli) -> Result<bool> {
    let interpreter = Interpreter::new(config(&cli)).map_err(|error| anyhow!(error.report()))?;
    let outcome = match (&cli.command, &cli.file) {
        (Some(code), _) => interpreter.run_source("__main__", code),
        (None, Some(path)) => interpreter.run_file(path),
        (None, None) => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("Reading stdin")?;
            interpreter.run_source("__main__", &source)
        }
    };
    match outcome {
        Ok(_) => Ok(true),
        Err(error @ Error::Io { .. }) => Err(error.into()),
        Err(error) => {
            eprintln!("{}", error.report());
            Ok(false)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let worker = thread::Builder::new()
        .name("pyhost-main".into())
        .stack_size(STACK_SIZE)
        .spawn(move || run(cli))
        .context("Starting interpreter thread")?;
    let succeeded = worker
        .join()
        .map_err(|_| anyhow!("interpreter thread panicked"))??;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
