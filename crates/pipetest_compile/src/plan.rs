//! The execution plan: the immutable contract between compilation and
//! execution.
//!
//! A [`Plan`] exists only when every semantic pass ran clean. Requests
//! carry their *materialized* effective line lists (inheritance already
//! merged, canonical order); flows carry their chains in source order.
//! The evaluator reads the plan and never writes back; per-flow mutable
//! state lives entirely in the evaluator.
//!
//! The plan is also the reporting surface for the CLI: [`Plan::summary`]
//! exposes entry path, request names/parents, and flow chains in a
//! serializable shape without leaking AST internals.

use indexmap::IndexMap;
use pipetest_base::{Method, Span};
use pipetest_language::ast::{Expr, ReqLine};
use serde::Serialize;

/// A request line together with the canonical path of the module that
/// declared it. Inherited lines keep their declaring file so runtime
/// diagnostics point at the right source.
#[derive(Debug, Clone)]
pub struct EffLine {
    pub file: String,
    pub line: ReqLine,
}

/// A named let binding ready for evaluation.
#[derive(Debug, Clone)]
pub struct PlanLet {
    pub file: String,
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// A request template with materialized effective lines.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub name: String,
    pub parent: Option<String>,
    /// Canonical order: HTTP, auth, headers, queries, json, pre-hook,
    /// post-hook, assertions, lets. This is also evaluation order.
    pub lines: Vec<EffLine>,
    /// Index of the unique HTTP line within `lines`.
    pub http_index: usize,
}

impl PlanRequest {
    /// The request's method and raw path. The compiler guarantees the
    /// HTTP line exists at `http_index`.
    pub fn http(&self) -> (Method, &str, Span) {
        match &self.lines[self.http_index].line {
            ReqLine::Http {
                method,
                path,
                path_span,
                ..
            } => (*method, path.as_str(), *path_span),
            _ => unreachable!("http_index does not point at an HTTP line"),
        }
    }
}

/// One step of a flow chain.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub request: String,
    /// Alias if declared, else the request name; unique within the flow.
    pub binding: String,
    pub span: Span,
}

impl PlanStep {
    /// Binding form used in diagnostics: `name` or `name:alias`.
    pub fn label(&self) -> String {
        if self.binding == self.request {
            self.request.clone()
        } else {
            format!("{}:{}", self.request, self.binding)
        }
    }
}

/// A post-chain flow assertion.
#[derive(Debug, Clone)]
pub struct PlanAssert {
    pub file: String,
    pub expr: Expr,
    pub span: Span,
}

/// A flow ready for execution.
#[derive(Debug, Clone)]
pub struct PlanFlow {
    pub name: String,
    pub file: String,
    pub name_span: Span,
    pub steps: Vec<PlanStep>,
    pub prelude: Vec<PlanLet>,
    pub asserts: Vec<PlanAssert>,
}

/// The validated execution plan.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Canonical path of the entry module.
    pub entry: String,
    /// `base` setting from the entry module, if declared.
    pub base_url: Option<String>,
    /// `timeout` setting from the entry module, in milliseconds.
    pub timeout_millis: Option<f64>,
    /// Global lets in canonical module order, declaration order within
    /// a module.
    pub global_lets: Vec<PlanLet>,
    /// Requests sorted by name.
    pub requests: IndexMap<String, PlanRequest>,
    /// Flows sorted by name.
    pub flows: Vec<PlanFlow>,
}

/// Serializable projection of the plan for reporters and `--json`
/// output.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub entry: String,
    pub requests: Vec<RequestSummary>,
    pub flows: Vec<FlowSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub name: String,
    pub steps: Vec<StepSummary>,
    pub prelude_lets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub request: String,
    pub binding: String,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            entry: self.entry.clone(),
            requests: self
                .requests
                .values()
                .map(|r| RequestSummary {
                    name: r.name.clone(),
                    parent: r.parent.clone(),
                })
                .collect(),
            flows: self
                .flows
                .iter()
                .map(|f| FlowSummary {
                    name: f.name.clone(),
                    steps: f
                        .steps
                        .iter()
                        .map(|s| StepSummary {
                            request: s.request.clone(),
                            binding: s.binding.clone(),
                        })
                        .collect(),
                    prelude_lets: f.prelude.iter().map(|l| l.name.clone()).collect(),
                })
                .collect(),
        }
    }
}
