//! Shared helpers for the integration tests.
#![allow(dead_code)]

use pipetest_compile::{compile, CompileResult, MemoryLoader, Plan};
use pipetest_runtime::{execute, MockTransport, RunResult};

/// Compiles a single-module program rooted at `main.pt`.
pub fn compile_one(src: &str) -> CompileResult {
    let loader = MemoryLoader::new().add("main.pt", src);
    compile("main.pt", &loader)
}

/// Compiles `src`, panicking on diagnostics.
pub fn plan_of(src: &str) -> Plan {
    let result = compile_one(src);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics: {:#?}",
        result.diagnostics
    );
    result.plan.expect("plan")
}

/// Compiles and executes against the given transport.
pub fn run_with(src: &str, transport: &MockTransport) -> RunResult {
    let plan = plan_of(src);
    execute(&plan, transport)
}
