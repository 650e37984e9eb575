//! # pipetest-compile
//!
//! Semantic analysis and execution-plan synthesis.
//!
//! The compiler consumes parsed modules through a [`ModuleLoader`]
//! capability and runs six ordered passes (import graph, symbol table,
//! inheritance materialization, request validity, flow structure,
//! variable availability). All diagnostics accumulate; a [`Plan`] is
//! produced only when the deduplicated diagnostic set is empty.
//!
//! ## Quick Start
//!
//! ```
//! use pipetest_compile::{compile, MemoryLoader};
//!
//! let loader = MemoryLoader::new().add(
//!     "main.pt",
//!     "req ping:\n\tGET /get\n\t? status == 200\nflow \"s\":\n\tping\n",
//! );
//! let result = compile("main.pt", &loader);
//! assert!(result.is_ok());
//! assert_eq!(result.plan.unwrap().flows.len(), 1);
//! ```

pub mod analysis;
pub mod compile;
pub mod graph;
pub mod loader;
pub mod plan;

pub use compile::{compile, CompileResult};
pub use graph::Module;
pub use loader::{clean_path, resolve_import, LoadError, MemoryLoader, ModuleLoader};
pub use plan::{EffLine, Plan, PlanAssert, PlanFlow, PlanLet, PlanRequest, PlanStep};
