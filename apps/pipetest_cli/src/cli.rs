//! Command-line argument parsing and dispatch.
//!
//! Three subcommands:
//!
//! - `pipetest check <file>` — compile only, print diagnostics
//! - `pipetest run <file>` — compile and execute against live endpoints
//! - `pipetest plan <file>` — print the plan summary as JSON
//!
//! The core is glue-free by design: this module wires the filesystem
//! module loader and the `ureq` transport into the library crates and
//! renders the results.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pipetest_compile::{compile, LoadError, ModuleLoader};
use pipetest_runtime::{
    BufferSink, Evaluator, ExecOptions, LogSink, Report,
};

use crate::http::UreqTransport;
use crate::render::SourceCache;

#[derive(Parser)]
#[command(name = "pipetest")]
#[command(about = "API-integration testing with declarative request flows", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Statically validate a program without executing it.
    Check {
        /// Entry module path.
        file: PathBuf,
    },

    /// Compile a program and execute its flows.
    Run {
        /// Entry module path.
        file: PathBuf,

        /// Override the program's `base` setting.
        #[arg(long)]
        base_url: Option<String>,

        /// Override the program's `timeout` setting (e.g. `5s`, `500ms`).
        #[arg(long)]
        timeout: Option<String>,

        /// Print request progress and hook output.
        #[arg(long, short)]
        verbose: bool,

        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the compiled plan summary as JSON.
    Plan {
        /// Entry module path.
        file: PathBuf,
    },
}

/// Filesystem-backed module loader; paths resolve from the working
/// directory.
struct FsLoader;

impl ModuleLoader for FsLoader {
    fn load(&self, canonical_path: &str) -> Result<String, LoadError> {
        match std::fs::read_to_string(canonical_path) {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LoadError::NotFound),
            Err(e) => Err(LoadError::Io(e.to_string())),
        }
    }
}

struct StdoutSink;

impl LogSink for StdoutSink {
    fn line(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Parses a CLI duration argument (`500ms`, `8s`, `2m`).
fn parse_duration(text: &str) -> Result<f64, String> {
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("missing duration unit in '{}'", text))?;
    let value: f64 = text[..split]
        .parse()
        .map_err(|_| format!("invalid duration '{}'", text))?;
    let factor = match &text[split..] {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        unit => return Err(format!("unknown duration unit '{}'", unit)),
    };
    Ok(value * factor)
}

/// Parses arguments and dispatches. Returns the process exit code.
pub fn run_cli() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Plan { file } => plan(&file),
        Commands::Run {
            file,
            base_url,
            timeout,
            verbose,
            json,
        } => run(&file, base_url, timeout, verbose, json),
    }
}

fn print_diagnostics(diags: &[pipetest_base::Diagnostic]) {
    let mut cache = SourceCache::new();
    for diag in diags {
        eprintln!("{}", cache.render(diag));
    }
}

fn check(file: &PathBuf) -> Result<i32, Box<dyn std::error::Error>> {
    let result = compile(&file.to_string_lossy(), &FsLoader);
    if result.diagnostics.is_empty() {
        println!("ok");
        Ok(0)
    } else {
        print_diagnostics(&result.diagnostics);
        eprintln!("{} error(s)", result.diagnostics.len());
        Ok(1)
    }
}

fn plan(file: &PathBuf) -> Result<i32, Box<dyn std::error::Error>> {
    let result = compile(&file.to_string_lossy(), &FsLoader);
    match result.plan {
        Some(plan) => {
            println!("{}", serde_json::to_string_pretty(&plan.summary())?);
            Ok(0)
        }
        None => {
            print_diagnostics(&result.diagnostics);
            Ok(1)
        }
    }
}

fn run(
    file: &PathBuf,
    base_url: Option<String>,
    timeout: Option<String>,
    verbose: bool,
    json: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let result = compile(&file.to_string_lossy(), &FsLoader);
    let Some(plan) = result.plan else {
        print_diagnostics(&result.diagnostics);
        return Ok(1);
    };

    let timeout_millis = match timeout {
        Some(text) => Some(parse_duration(&text)?),
        None => None,
    };
    let options = ExecOptions {
        base_url,
        timeout_millis,
        ..ExecOptions::default()
    };

    let transport = UreqTransport::new();
    let mut stdout = StdoutSink;
    let mut assert_buffer = BufferSink::new();

    let mut evaluator = Evaluator::new(&plan, &transport)
        .with_options(options)
        .with_assert_log(&mut assert_buffer);
    if verbose {
        evaluator = evaluator.with_output(&mut stdout);
    }
    let run_result = evaluator.run();

    let report = Report::from_run(&plan, &run_result);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if verbose {
            for line in &assert_buffer.lines {
                println!("{}", line);
            }
        }
        for suite in &report.suites {
            let status = if suite.failures == 0 && suite.skipped == 0 {
                "pass"
            } else {
                "FAIL"
            };
            println!(
                "{} {} ({} test(s), {} failure(s), {} skipped)",
                status, suite.name, suite.tests, suite.failures, suite.skipped
            );
        }
        print_diagnostics(&report.diagnostics);
    }

    Ok(if report.passed() { 0 } else { 1 })
}
