//! # pipetest-runtime
//!
//! Plan execution: dynamic values, the expression runtime, template
//! interpolation, the HTTP transport capability, the flow evaluator,
//! and the report model.
//!
//! ## Architecture
//!
//! ```text
//! Plan (pipetest-compile)
//!     │
//!     ▼
//! ┌────────────┐   per flow: flow_vars + binding snapshots
//! │ Evaluator  │ ──▶ pre hook → directives → dispatch → post hook
//! │            │ ──▶ assertions / lets in effective order
//! └────────────┘
//!     │                         ▲
//!     ▼                         │ injected capability
//! RunResult ──▶ Report     HttpTransport
//! ```
//!
//! Execution is strictly sequential: flows in plan order, steps in
//! chain order, one request in flight at a time. The transport dispatch
//! is the only blocking operation.
//!
//! ## Quick Start
//!
//! ```
//! use pipetest_compile::{compile, MemoryLoader};
//! use pipetest_runtime::{execute, MockTransport};
//!
//! let loader = MemoryLoader::new().add(
//!     "main.pt",
//!     "base \"https://h.test\"\nreq ping:\n\tGET /get\n\t? status == 200\nflow \"s\":\n\tping\n",
//! );
//! let plan = compile("main.pt", &loader).plan.unwrap();
//! let transport = MockTransport::new().route("GET", "/get", 200, &serde_json::json!({"ok": true}));
//! let run = execute(&plan, &transport);
//! assert!(run.passed());
//! ```

pub mod builtins;
pub mod evaluator;
pub mod expr;
pub mod report;
pub mod sink;
pub mod template;
pub mod transport;
pub mod value;

pub use evaluator::{
    execute, AssertResult, Evaluator, ExecOptions, FlowResult, RunResult, StepResult,
};
pub use expr::{eval, Fault, Scope};
pub use report::{CaseStatus, Report, Suite, TestCase};
pub use sink::{BufferSink, LogSink, NullSink};
pub use transport::{
    CancelToken, HttpRequest, HttpResponse, HttpTransport, MockTransport, TransportError,
};
pub use value::Value;
