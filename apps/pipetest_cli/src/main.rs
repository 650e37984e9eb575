//! pipetest - standalone binary.
//!
//! Thin wrapper around [`pipetest_cli::run_cli`]: command logic lives in
//! the library crate for testability; this file only maps the outcome to
//! an exit code.
//!
//! # Exit Codes
//!
//! - `0` - all flows passed
//! - `1` - diagnostics or failed assertions
//! - `2` - usage or I/O error

fn main() {
    match pipetest_cli::run_cli() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}
