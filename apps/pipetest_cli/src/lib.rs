//! # pipetest-cli
//!
//! Command-line glue for the pipetest toolchain: argument parsing
//! ([`cli`]), the filesystem module loader, the live `ureq` transport
//! ([`http`]), and diagnostic rendering ([`render`]).
//!
//! The language, compiler, and evaluator live in the library crates;
//! everything here is replaceable plumbing.

pub mod cli;
pub mod http;
pub mod render;

pub use cli::run_cli;
