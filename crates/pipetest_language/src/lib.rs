//! # pipetest-language
//!
//! The pipetest DSL front end: lexer, AST, and parser.
//!
//! ## Pipeline Position
//!
//! ```text
//! source text
//!     │
//!     ▼
//! ┌─────────┐   tokens + lex diagnostics
//! │  lexer  │ ─────────────────────────────┐
//! └─────────┘                              ▼
//!                                    ┌──────────┐
//!                                    │  parser  │ ──▶ Program + diagnostics
//!                                    └──────────┘
//! ```
//!
//! [`parse`] runs both stages and returns a best-effort [`ast::Program`]
//! together with all `E_PARSE_*` diagnostics; it never panics on
//! malformed input. The compiler crate consumes the program, the returned
//! diagnostics gate plan synthesis.
//!
//! ## Quick Start
//!
//! ```
//! use pipetest_language::parse;
//!
//! let (program, diags) = parse("smoke.pt", "req ping:\n\tGET /get\n\t? status == 200\n");
//! assert!(diags.is_empty());
//! assert_eq!(program.stmts.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;

pub use lexer::lex;
pub use parser::parse;
