//! The compilation driver: Pass 0 through plan synthesis.
//!
//! ```text
//! entry path + ModuleLoader
//!         │
//!         ▼
//! ┌──────────────────┐
//! │ 0 import graph   │  load + parse every module, canonical order
//! ├──────────────────┤
//! │ 1 symbol table   │  names, duplicates, parents
//! ├──────────────────┤
//! │ 2 inheritance    │  effective line lists
//! ├──────────────────┤
//! │ 3 request checks │  multiplicity, hook restrictions
//! ├──────────────────┤
//! │ 4 flow checks    │  chain shape, bindings
//! ├──────────────────┤
//! │ 5 availability   │  definite assignment
//! └──────────────────┘
//!         │
//!         ▼
//!   sort + dedupe diagnostics
//!         │
//!         ▼  (only if empty)
//!       Plan
//! ```
//!
//! Diagnostics accumulate across all passes; every pass degrades
//! gracefully on nodes an earlier pass flagged. The plan exists only
//! when the final, deduplicated diagnostic list is empty.

use pipetest_base::{sort_dedupe, Diagnostic};
use pipetest_language::ast::ReqLine;

use crate::analysis::{flows, inherit, requests, scope, symbols};
use crate::graph::load_modules;
use crate::loader::{clean_path, ModuleLoader};
use crate::plan::{Plan, PlanAssert, PlanFlow, PlanLet, PlanRequest, PlanStep};

/// Outcome of a compilation: a plan iff `diagnostics` is empty.
#[derive(Debug)]
pub struct CompileResult {
    pub plan: Option<Plan>,
    /// Sorted, deduplicated, deterministic.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn is_ok(&self) -> bool {
        self.plan.is_some()
    }
}

/// Compiles the program rooted at `entry_path`.
pub fn compile(entry_path: &str, loader: &dyn ModuleLoader) -> CompileResult {
    let entry = clean_path(entry_path);
    let mut diags: Vec<Diagnostic> = Vec::new();

    let modules = load_modules(&entry, loader, &mut diags);
    let syms = symbols::collect(&modules, &entry, &mut diags);
    let effective = inherit::materialize(&syms, &mut diags);
    requests::validate(&effective, &syms, &mut diags);
    flows::validate(&syms, &mut diags);
    scope::check(&syms, &effective, &mut diags);

    let diagnostics = sort_dedupe(diags);
    let plan = if diagnostics.is_empty() {
        Some(synthesize(&entry, &syms, effective))
    } else {
        None
    };

    CompileResult { plan, diagnostics }
}

fn synthesize(
    entry: &str,
    syms: &symbols::Symbols<'_>,
    effective: indexmap::IndexMap<String, Vec<crate::plan::EffLine>>,
) -> Plan {
    let global_lets = syms
        .global_lets
        .iter()
        .map(|(module, binding)| PlanLet {
            file: module.path.clone(),
            name: binding.name.name.clone(),
            value: binding.value.clone(),
            span: binding.span,
        })
        .collect();

    // `effective` is already keyed in sorted order.
    let mut plan_requests = indexmap::IndexMap::new();
    for (name, lines) in effective {
        let http_index = lines
            .iter()
            .position(|l| matches!(l.line, ReqLine::Http { .. }))
            .unwrap_or(0);
        let parent = syms
            .requests
            .get(&name)
            .and_then(|e| e.decl.parent.as_ref())
            .map(|p| p.name.clone());
        plan_requests.insert(
            name.clone(),
            PlanRequest {
                name,
                parent,
                lines,
                http_index,
            },
        );
    }

    let mut plan_flows: Vec<PlanFlow> = syms
        .flows
        .iter()
        .map(|entry| {
            let flow = entry.decl;
            PlanFlow {
                name: flow.name.clone(),
                file: entry.module.path.clone(),
                name_span: flow.name_span,
                steps: flow
                    .steps
                    .iter()
                    .map(|step| PlanStep {
                        request: step.request.name.clone(),
                        binding: step.binding().to_string(),
                        span: step.span,
                    })
                    .collect(),
                prelude: flow
                    .lets
                    .iter()
                    .map(|binding| PlanLet {
                        file: entry.module.path.clone(),
                        name: binding.name.name.clone(),
                        value: binding.value.clone(),
                        span: binding.span,
                    })
                    .collect(),
                asserts: flow
                    .asserts
                    .iter()
                    .map(|expr| PlanAssert {
                        file: entry.module.path.clone(),
                        expr: expr.clone(),
                        span: expr.span,
                    })
                    .collect(),
            }
        })
        .collect();
    plan_flows.sort_by(|a, b| a.name.cmp(&b.name));

    Plan {
        entry: entry.to_string(),
        base_url: syms.base_url.clone(),
        timeout_millis: syms.timeout_millis,
        global_lets,
        requests: plan_requests,
        flows: plan_flows,
    }
}
