//! Pass 5: variable availability (definite assignment).
//!
//! For each flow, an accumulating `defined` set starts with global and
//! prelude let names. Each step's *required* names — free identifiers in
//! expression positions, `:name` path parameters, and `{{name}}`
//! template placeholders in reachable string literals — must already be
//! satisfied, excluding built-in functions and context symbols.
//!
//! Requirements are walked in runtime evaluation order: pre-hook
//! statements (assignments define names for later statements), then the
//! path and directives, then the post-hook, then assertions and lets in
//! effective order. After the step, names the step defined (hook
//! variable assignments, hook lets, request-level lets) join `defined`,
//! and the step's binding joins the binding set; prior bindings satisfy
//! later steps' references.
//!
//! Unsatisfied names report `E_SEM_UNDEFINED_VARIABLE`, specialized to
//! `E_SEM_MISSING_PATH_PARAM_VAR` when the name came from a `:name`
//! segment. Flow post-chain assertions resolve against `defined` plus
//! bindings, else `E_SEM_UNKNOWN_FLOW_BINDING`.

use std::collections::HashSet;

use indexmap::IndexMap;
use pipetest_base::{template, Code, Diagnostic, Span};
use pipetest_language::ast::{
    Expr, ExprKind, FlowDecl, HookBlock, HookStmt, LValueRoot, ReqLine,
};

use crate::analysis::symbols::Symbols;
use crate::analysis::{is_builtin, is_context};
use crate::plan::EffLine;

pub fn check(
    symbols: &Symbols<'_>,
    effective: &IndexMap<String, Vec<EffLine>>,
    diags: &mut Vec<Diagnostic>,
) {
    let globals: HashSet<String> = symbols
        .global_lets
        .iter()
        .map(|(_, binding)| binding.name.name.clone())
        .collect();

    for entry in &symbols.flows {
        check_flow(entry.decl, &entry.module.path, &globals, effective, diags);
    }
}

fn check_flow(
    flow: &FlowDecl,
    flow_file: &str,
    globals: &HashSet<String>,
    effective: &IndexMap<String, Vec<EffLine>>,
    diags: &mut Vec<Diagnostic>,
) {
    let mut defined = globals.clone();
    for binding in &flow.lets {
        defined.insert(binding.name.name.clone());
    }
    let mut bindings: HashSet<String> = HashSet::new();

    for step in &flow.steps {
        let Some(lines) = effective.get(&step.request.name) else {
            // Unknown request: reported in Pass 4.
            continue;
        };

        let mut walk = StepWalk {
            flow_name: &flow.name,
            step_label: step.binding_label(),
            defined: &defined,
            bindings: &bindings,
            local: HashSet::new(),
            diags: &mut *diags,
        };
        walk.run(lines);
        let local = walk.local;

        defined.extend(local);
        bindings.insert(step.binding().to_string());
    }

    for assert in &flow.asserts {
        assert.walk(&mut |expr| {
            if let ExprKind::Ident(name) = &expr.kind {
                if is_builtin(name) || defined.contains(name) || bindings.contains(name) {
                    return;
                }
                diags.push(
                    Diagnostic::error(
                        Code::SemUnknownFlowBinding,
                        format!("unknown name '{}' in flow assertion", name),
                        flow_file,
                        expr.span,
                    )
                    .with_flow(&flow.name)
                    .with_hint("flow assertions see flow variables and step bindings"),
                );
            }
        });
    }
}

/// Requirement collection for one step, in runtime evaluation order.
struct StepWalk<'a> {
    flow_name: &'a str,
    step_label: String,
    defined: &'a HashSet<String>,
    bindings: &'a HashSet<String>,
    /// Names defined by this step so far (hook assigns/lets, request lets).
    local: HashSet<String>,
    diags: &'a mut Vec<Diagnostic>,
}

impl StepWalk<'_> {
    fn run(&mut self, lines: &[EffLine]) {
        // 1. Pre-hook, statements in order.
        for eff in lines {
            if let ReqLine::PreHook(block) = &eff.line {
                self.walk_hook(block, &eff.file);
            }
        }
        // 2. Path parameters and templates, then directive values.
        for eff in lines {
            match &eff.line {
                ReqLine::Http {
                    path, path_span, ..
                } => self.walk_path(path, *path_span, &eff.file),
                ReqLine::Auth { value, .. }
                | ReqLine::Header { value, .. }
                | ReqLine::Query { value, .. }
                | ReqLine::Json { value, .. } => self.walk_expr(value, &eff.file),
                _ => {}
            }
        }
        // 3. Post-hook.
        for eff in lines {
            if let ReqLine::PostHook(block) = &eff.line {
                self.walk_hook(block, &eff.file);
            }
        }
        // 4. Assertions, then lets, in effective order (lets define
        //    sequentially).
        for eff in lines {
            if let ReqLine::Assert { expr, .. } = &eff.line {
                self.walk_expr(expr, &eff.file);
            }
        }
        for eff in lines {
            if let ReqLine::Let(binding) = &eff.line {
                self.walk_expr(&binding.value, &eff.file);
                self.local.insert(binding.name.name.clone());
            }
        }
    }

    fn walk_hook(&mut self, block: &HookBlock, file: &str) {
        for stmt in &block.stmts {
            stmt.walk_exprs(&mut |expr| {
                Self::check_expr(
                    expr,
                    file,
                    self.flow_name,
                    &self.step_label,
                    self.defined,
                    self.bindings,
                    &self.local,
                    self.diags,
                )
            });
            match stmt {
                HookStmt::Assign { target, .. } => {
                    // Only a plain `name = expr` defines. A path mutation
                    // (`name.field = expr`) reads `name`; walk_exprs
                    // surfaced the root above and require() checked it.
                    if let LValueRoot::Var(name) = &target.root {
                        if target.steps.is_empty() {
                            self.local.insert(name.clone());
                        }
                    }
                }
                HookStmt::Let(binding) => {
                    self.local.insert(binding.name.name.clone());
                }
                _ => {}
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr, file: &str) {
        expr.walk(&mut |e| {
            Self::check_expr(
                e,
                file,
                self.flow_name,
                &self.step_label,
                self.defined,
                self.bindings,
                &self.local,
                self.diags,
            )
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn check_expr(
        expr: &Expr,
        file: &str,
        flow_name: &str,
        step_label: &str,
        defined: &HashSet<String>,
        bindings: &HashSet<String>,
        local: &HashSet<String>,
        diags: &mut Vec<Diagnostic>,
    ) {
        match &expr.kind {
            ExprKind::Ident(name) => Self::require(
                name, expr.span, file, false, flow_name, step_label, defined, bindings, local,
                diags,
            ),
            ExprKind::Str(text) => {
                for placeholder in template::placeholder_names(text) {
                    Self::require(
                        placeholder,
                        expr.span,
                        file,
                        false,
                        flow_name,
                        step_label,
                        defined,
                        bindings,
                        local,
                        diags,
                    );
                }
            }
            _ => {}
        }
    }

    fn walk_path(&mut self, path: &str, span: Span, file: &str) {
        for segment in path.split('/') {
            if let Some(name) = segment.strip_prefix(':') {
                if !name.is_empty() {
                    Self::require(
                        name,
                        span,
                        file,
                        true,
                        self.flow_name,
                        &self.step_label,
                        self.defined,
                        self.bindings,
                        &self.local,
                        self.diags,
                    );
                }
            }
        }
        for placeholder in template::placeholder_names(path) {
            Self::require(
                placeholder,
                span,
                file,
                false,
                self.flow_name,
                &self.step_label,
                self.defined,
                self.bindings,
                &self.local,
                self.diags,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn require(
        name: &str,
        span: Span,
        file: &str,
        is_path_param: bool,
        flow_name: &str,
        step_label: &str,
        defined: &HashSet<String>,
        bindings: &HashSet<String>,
        local: &HashSet<String>,
        diags: &mut Vec<Diagnostic>,
    ) {
        if is_builtin(name)
            || is_context(name)
            || local.contains(name)
            || defined.contains(name)
            || bindings.contains(name)
        {
            return;
        }
        let (code, message, hint) = if is_path_param {
            (
                Code::SemMissingPathParamVar,
                format!("path parameter ':{}' has no bound variable", name),
                "bind it with a let or a preceding step before this request runs",
            )
        } else {
            (
                Code::SemUndefinedVariable,
                format!("undefined variable '{}'", name),
                "define it globally, in the flow prelude, or in an earlier step",
            )
        };
        diags.push(
            Diagnostic::error(code, message, file, span)
                .with_flow(flow_name)
                .with_request(step_label)
                .with_hint(hint),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{flows, inherit, requests, symbols};
    use crate::graph::load_modules;
    use crate::loader::MemoryLoader;

    fn codes(src: &str) -> Vec<Code> {
        let loader = MemoryLoader::new().add("main.pt", src);
        let mut diags = Vec::new();
        let modules = load_modules("main.pt", &loader, &mut diags);
        let syms = symbols::collect(&modules, "main.pt", &mut diags);
        let eff = inherit::materialize(&syms, &mut diags);
        requests::validate(&eff, &syms, &mut diags);
        flows::validate(&syms, &mut diags);
        check(&syms, &eff, &mut diags);
        diags.into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn unbound_path_param_is_specialized() {
        let src = "req r:\n\tGET /x/:missing\nflow \"f\":\n\tr\n";
        let found = codes(src);
        assert!(found.contains(&Code::SemMissingPathParamVar));
        assert!(!found.contains(&Code::SemUndefinedVariable));
    }

    #[test]
    fn prelude_let_satisfies_path_param() {
        let src = "req r:\n\tGET /x/:id\nflow \"f\":\n\tlet id = 7\n\tr\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn global_let_satisfies_template_placeholder() {
        let src = "let host = \"x\"\nreq r:\n\tGET /p/{{host}}\nflow \"f\":\n\tr\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn request_let_feeds_later_steps() {
        // The first step captures a token the second consumes.
        let src = "req first:\n\tGET /first\n\tlet token = #.token\nreq second:\n\tGET /second/:token\nflow \"f\":\n\tfirst -> second\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn consuming_before_defining_is_reported() {
        let src = "req first:\n\tGET /first\n\tlet token = #.token\nreq second:\n\tGET /second/:token\nflow \"f\":\n\tsecond -> first\n";
        assert!(codes(src).contains(&Code::SemMissingPathParamVar));
    }

    #[test]
    fn post_hook_assignment_defines_for_later_steps() {
        // `seen = ...` in a post hook is a definition for later steps.
        let src = "req a:\n\tGET /a\n\tpost hook { seen = #.value }\nreq b:\n\tGET /b\n\t? seen == \"x\"\nflow \"f\":\n\ta -> b\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn hook_local_defines_for_later_statements_in_same_hook() {
        let src = "req a:\n\tGET /a\n\tpre hook { let tmp = 1; req.header[\"X\"] = tmp }\nflow \"f\":\n\ta\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn hook_path_mutation_requires_a_defined_root() {
        // `ghost.field = 1` reads `ghost`; it must already exist.
        let src = "req a:\n\tGET /a\n\tpost hook { ghost.field = 1 }\nflow \"f\":\n\ta\n";
        assert!(codes(src).contains(&Code::SemUndefinedVariable));
    }

    #[test]
    fn hook_path_mutation_on_a_defined_root_is_clean() {
        let src = "req a:\n\tGET /a\n\tpost hook { let obj = {n: 0}; obj.n = 1 }\nflow \"f\":\n\ta\n";
        assert!(codes(src).is_empty());

        // A root defined by an earlier step also satisfies the read.
        let src = concat!(
            "req a:\n\tGET /a\n\tlet obj = {seen: 1}\n",
            "req b:\n\tGET /b\n\tpost hook { obj.tag = \"b\" }\n",
            "flow \"f\":\n\ta -> b\n",
        );
        assert!(codes(src).is_empty());
    }

    #[test]
    fn undefined_variable_in_directive() {
        let src = "req a:\n\tGET /a\n\theader H = missing\nflow \"f\":\n\ta\n";
        assert!(codes(src).contains(&Code::SemUndefinedVariable));
    }

    #[test]
    fn context_names_and_builtins_are_not_required() {
        let src = "req a:\n\tGET /a\n\t? status == 200 and len(header[\"X\"]) > 0\n\t? req.url contains \"a\"\nflow \"f\":\n\ta\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn prior_binding_snapshot_is_visible_to_later_step() {
        let src = "req a:\n\tGET /a\nreq b:\n\tGET /b\n\t? a.status == 200\nflow \"f\":\n\ta -> b\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn flow_assert_on_unknown_binding() {
        let src = "req a:\n\tGET /a\nflow \"f\":\n\ta\n\t? ghost.status == 200\n";
        assert!(codes(src).contains(&Code::SemUnknownFlowBinding));
    }

    #[test]
    fn flow_assert_resolves_bindings_and_lets() {
        let src = "req a:\n\tGET /a\n\tlet token = #.t\nflow \"f\":\n\ta : alias\n\t? alias.status == 200\n\t? token == \"x\"\n";
        assert!(codes(src).is_empty());
    }

    #[test]
    fn requirements_only_flag_each_site() {
        // Two uses of the same undefined name produce two diagnostics
        // (they dedupe only if identical in position).
        let src = "req a:\n\tGET /a\n\theader H = ghost\n\tquery q = ghost\nflow \"f\":\n\ta\n";
        let found = codes(src);
        assert_eq!(
            found
                .iter()
                .filter(|c| **c == Code::SemUndefinedVariable)
                .count(),
            2
        );
    }
}
