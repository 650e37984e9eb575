//! # pipetest-base
//!
//! Structural atoms for the pipetest toolchain.
//!
//! This crate provides the foundational types shared by every pipeline
//! stage:
//!
//! - [`Pos`]/[`Span`] — source location tracking
//! - [`Token`]/[`TokenKind`]/[`Method`] — the lexical vocabulary
//! - [`Diagnostic`]/[`Code`] — the canonical error record with
//!   deterministic sorting ([`sort_dedupe`])
//! - [`template`] — `{{name}}` placeholder scanning
//!
//! # Design Principles
//!
//! This crate has no knowledge of the grammar, the HTTP layer, or I/O.
//! It provides only generic, reusable infrastructure that higher-level
//! crates build upon.

pub mod diag;
pub mod span;
pub mod template;
pub mod token;

pub use diag::{sort_dedupe, Code, Diagnostic, Related, Severity};
pub use span::{Pos, Span};
pub use token::{Method, Token, TokenKind};
