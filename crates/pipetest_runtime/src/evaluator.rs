//! The flow evaluator: walks a compiled plan flow by flow, step by step.
//!
//! Execution is single-threaded and sequential by contract — flows in
//! plan order, steps in chain order, never two requests in flight for
//! the same plan. The only blocking operation is the transport dispatch.
//!
//! Per-step sequence: resolve request → build request object (templates,
//! `:param` substitution, base-URL join) → pre-hook → directives in
//! effective order → finalize URL/body → dispatch → bind response
//! context → post-hook → assertions and lets in effective order →
//! snapshot the binding.
//!
//! Failure policy: a step-level diagnostic (transport, hook, expression
//! fault) aborts the step and the current flow; later flows still run.
//! A failed assertion records its diagnostic, finishes the step result,
//! and aborts the flow. A failed flow post-assertion is recorded but
//! never stops other flows.

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use pipetest_base::{sort_dedupe, Code, Diagnostic, Span};
use pipetest_compile::{Plan, PlanFlow, PlanLet, PlanStep};
use pipetest_language::ast::{
    AccessStep, Expr, ExprKind, HookBlock, HookStmt, LValueRoot, PrintKind, ReqLine,
};

use crate::expr::{eval, Fault, Scope};
use crate::sink::LogSink;
use crate::template::{interpolate_str, interpolate_value};
use crate::transport::{CancelToken, HttpRequest, HttpTransport};
use crate::value::{format_number, Value};

/// Unreserved characters pass through; everything else escapes when a
/// `:param` value lands in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Caller-facing knobs; everything optional.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Overrides the plan's `base` setting.
    pub base_url: Option<String>,
    /// Overrides the plan's `timeout` setting (milliseconds).
    pub timeout_millis: Option<f64>,
    pub cancel: CancelToken,
}

/// Outcome of one assertion.
#[derive(Debug, Clone, Serialize)]
pub struct AssertResult {
    pub file: String,
    pub line: u32,
    pub passed: bool,
    /// Cause description for failures, empty for passes.
    pub detail: String,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub request: String,
    pub binding: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub asserts: Vec<AssertResult>,
}

/// Outcome of one flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub name: String,
    pub steps: Vec<StepResult>,
    /// Post-chain assertion outcomes (empty if the chain aborted).
    pub asserts: Vec<AssertResult>,
    /// True when every step ran and nothing failed.
    pub passed: bool,
}

/// Everything `execute` produces: per-flow results plus runtime
/// diagnostics, sorted and deduplicated.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub flows: Vec<FlowResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.diagnostics.is_empty() && self.flows.iter().all(|f| f.passed)
    }
}

/// Convenience entry point with default options and no sinks.
pub fn execute(plan: &Plan, transport: &dyn HttpTransport) -> RunResult {
    Evaluator::new(plan, transport).run()
}

pub struct Evaluator<'a> {
    plan: &'a Plan,
    transport: &'a dyn HttpTransport,
    options: ExecOptions,
    output: Option<&'a mut dyn LogSink>,
    assert_log: Option<&'a mut dyn LogSink>,
    diags: Vec<Diagnostic>,
}

/// Response-side context bound after dispatch.
struct ResponseCtx {
    res: Value,
    status: f64,
    header: Value,
}

impl<'a> Evaluator<'a> {
    pub fn new(plan: &'a Plan, transport: &'a dyn HttpTransport) -> Self {
        Evaluator {
            plan,
            transport,
            options: ExecOptions::default(),
            output: None,
            assert_log: None,
            diags: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Receives hook prints and per-request progress lines.
    pub fn with_output(mut self, sink: &'a mut dyn LogSink) -> Self {
        self.output = Some(sink);
        self
    }

    /// Receives one PASS/FAIL line per assertion.
    pub fn with_assert_log(mut self, sink: &'a mut dyn LogSink) -> Self {
        self.assert_log = Some(sink);
        self
    }

    pub fn run(mut self) -> RunResult {
        let globals = self.eval_global_lets();

        let mut flows = Vec::with_capacity(self.plan.flows.len());
        for flow in &self.plan.flows {
            flows.push(self.run_flow(flow, &globals));
        }

        RunResult {
            flows,
            diagnostics: sort_dedupe(self.diags),
        }
    }

    fn log(&mut self, text: String) {
        if let Some(sink) = self.output.as_mut() {
            sink.line(&text);
        }
    }

    fn log_assert(&mut self, text: String) {
        if let Some(sink) = self.assert_log.as_mut() {
            sink.line(&text);
        }
    }

    fn fault_diag(&mut self, fault: Fault, code: Code, file: &str, flow: &str, request: Option<&str>) {
        let span = fault.span;
        let mut diag = Diagnostic::error(code, fault.message, file, span).with_flow(flow);
        if let Some(request) = request {
            diag = diag.with_request(request);
        }
        self.diags.push(diag);
    }

    // ------------------------------------------------------------------
    // Lets and flows
    // ------------------------------------------------------------------

    /// Global lets evaluate once, in order; flows start from a copy.
    fn eval_global_lets(&mut self) -> IndexMap<String, Value> {
        let mut vars = IndexMap::new();
        let bindings = IndexMap::new();
        for binding in &self.plan.global_lets {
            let value = {
                let scope = Scope::flow(&vars, &bindings);
                eval(&binding.value, &scope)
            };
            match value {
                Ok(value) => {
                    vars.insert(binding.name.clone(), value);
                }
                Err(fault) => {
                    let span = fault.span;
                    self.diags.push(Diagnostic::error(
                        Code::RuntimeExpression,
                        fault.message,
                        &binding.file,
                        span,
                    ));
                    vars.insert(binding.name.clone(), Value::Null);
                }
            }
        }
        vars
    }

    fn run_flow(&mut self, flow: &PlanFlow, globals: &IndexMap<String, Value>) -> FlowResult {
        let mut vars = globals.clone();
        let mut bindings: IndexMap<String, Value> = IndexMap::new();
        let mut result = FlowResult {
            name: flow.name.clone(),
            steps: Vec::new(),
            asserts: Vec::new(),
            passed: true,
        };

        for binding in &flow.prelude {
            match self.eval_flow_let(binding, &vars, &bindings, &flow.name) {
                Some(value) => {
                    vars.insert(binding.name.clone(), value);
                }
                None => {
                    result.passed = false;
                    return result;
                }
            }
        }

        for step in &flow.steps {
            match self.run_step(flow, step, &mut vars, &mut bindings) {
                Ok(step_result) => {
                    let ok = step_result.asserts.iter().all(|a| a.passed);
                    result.steps.push(step_result);
                    if !ok {
                        result.passed = false;
                        return result;
                    }
                }
                Err(()) => {
                    result.passed = false;
                    return result;
                }
            }
        }

        for assert in &flow.asserts {
            let outcome = {
                let scope = Scope::flow(&vars, &bindings);
                self.check_assert(&assert.expr, &scope, &assert.file, &flow.name, None)
            };
            match outcome {
                Some(assert_result) => {
                    if !assert_result.passed {
                        result.passed = false;
                    }
                    result.asserts.push(assert_result);
                }
                None => {
                    // Evaluation fault: recorded, flow marked failed.
                    result.passed = false;
                }
            }
        }

        result
    }

    fn eval_flow_let(
        &mut self,
        binding: &PlanLet,
        vars: &IndexMap<String, Value>,
        bindings: &IndexMap<String, Value>,
        flow: &str,
    ) -> Option<Value> {
        let outcome = {
            let scope = Scope::flow(vars, bindings);
            eval(&binding.value, &scope)
        };
        match outcome {
            Ok(value) => Some(value),
            Err(fault) => {
                self.fault_diag(fault, Code::RuntimeExpression, &binding.file, flow, None);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Step execution
    // ------------------------------------------------------------------

    fn run_step(
        &mut self,
        flow: &PlanFlow,
        step: &PlanStep,
        vars: &mut IndexMap<String, Value>,
        bindings: &mut IndexMap<String, Value>,
    ) -> Result<StepResult, ()> {
        let label = step.label();
        let Some(request) = self.plan.requests.get(&step.request) else {
            self.diags.push(
                Diagnostic::error(
                    Code::RuntimeUnknownRequest,
                    format!("unknown request '{}'", step.request),
                    &flow.file,
                    step.span,
                )
                .with_flow(&flow.name)
                .with_request(&label),
            );
            return Err(());
        };

        let (method, raw_path, path_span) = request.http();
        let http_file = request.lines[request.http_index].file.clone();

        // URL: template pass, then `:param` substitution, then base join.
        let url = self.resolve_url(
            raw_path, path_span, &http_file, vars, &flow.name, &label,
        )?;

        let mut req = Value::object([
            ("method".to_string(), Value::Str(method.as_str().to_string())),
            ("url".to_string(), Value::Str(url)),
            ("header".to_string(), Value::Object(IndexMap::new())),
            ("query".to_string(), Value::Object(IndexMap::new())),
            ("json".to_string(), Value::Null),
        ]);

        for eff in &request.lines {
            if let ReqLine::PreHook(block) = &eff.line {
                self.exec_hook(block, &eff.file, &flow.name, &label, vars, bindings, &mut req, None)?;
            }
        }

        self.apply_directives(request, flow, &label, vars, bindings, &mut req)?;

        let http_request = self.finalize_request(&req);
        let response = match self.transport.dispatch(&http_request, &self.options.cancel) {
            Ok(response) => response,
            Err(err) => {
                self.diags.push(
                    Diagnostic::error(
                        Code::RuntimeTransport,
                        format!("transport error: {}", err),
                        &http_file,
                        path_span,
                    )
                    .with_flow(&flow.name)
                    .with_request(&label)
                    .with_hint("the endpoint was unreachable or the call was cancelled"),
                );
                return Err(());
            }
        };
        self.log(format!(
            "{} {} -> {}",
            http_request.method, http_request.url, response.status
        ));

        // Eager JSON decode; an empty body is null.
        let res_value = if response.body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice::<serde_json::Value>(&response.body) {
                Ok(json) => Value::from_json(json),
                Err(err) => {
                    self.diags.push(
                        Diagnostic::error(
                            Code::RuntimeTransport,
                            format!("response body is not valid JSON: {}", err),
                            &http_file,
                            path_span,
                        )
                        .with_flow(&flow.name)
                        .with_request(&label),
                    );
                    return Err(());
                }
            }
        };

        let header_value = Value::Object(
            response
                .headers
                .iter()
                .map(|(name, values)| {
                    let value = if values.len() == 1 {
                        Value::Str(values[0].clone())
                    } else {
                        Value::Array(values.iter().cloned().map(Value::Str).collect())
                    };
                    (name.clone(), value)
                })
                .collect(),
        );
        let ctx = ResponseCtx {
            res: res_value,
            status: response.status as f64,
            header: header_value,
        };

        for eff in &request.lines {
            if let ReqLine::PostHook(block) = &eff.line {
                self.exec_hook(
                    block, &eff.file, &flow.name, &label, vars, bindings, &mut req,
                    Some(&ctx),
                )?;
            }
        }

        // Assertions and lets, in effective-line order. The first failed
        // assertion stops the step (and, upstream, the flow).
        let mut asserts = Vec::new();
        for eff in &request.lines {
            match &eff.line {
                ReqLine::Assert { expr, .. } => {
                    let outcome = {
                        let scope = step_scope(vars, bindings, &req, Some(&ctx));
                        self.check_assert(expr, &scope, &eff.file, &flow.name, Some(&label))
                    };
                    match outcome {
                        Some(assert_result) => {
                            let passed = assert_result.passed;
                            asserts.push(assert_result);
                            if !passed {
                                break;
                            }
                        }
                        None => return Err(()),
                    }
                }
                ReqLine::Let(binding) => {
                    let outcome = {
                        let scope = step_scope(vars, bindings, &req, Some(&ctx));
                        eval(&binding.value, &scope)
                    };
                    match outcome {
                        Ok(value) => {
                            vars.insert(binding.name.name.clone(), value);
                        }
                        Err(fault) => {
                            self.fault_diag(
                                fault,
                                Code::RuntimeExpression,
                                &eff.file,
                                &flow.name,
                                Some(&label),
                            );
                            return Err(());
                        }
                    }
                }
                _ => {}
            }
        }

        bindings.insert(
            step.binding.clone(),
            Value::object([
                ("res".to_string(), ctx.res.clone()),
                ("req".to_string(), req.clone()),
                ("status".to_string(), Value::Number(ctx.status)),
                ("header".to_string(), ctx.header.clone()),
            ]),
        );

        Ok(StepResult {
            request: step.request.clone(),
            binding: step.binding.clone(),
            method: http_request.method,
            url: http_request.url,
            status: response.status,
            asserts,
        })
    }

    fn resolve_url(
        &mut self,
        raw_path: &str,
        path_span: Span,
        file: &str,
        vars: &IndexMap<String, Value>,
        flow: &str,
        label: &str,
    ) -> Result<String, ()> {
        let resolve = |name: &str| vars.get(name).map(Value::to_display_string);

        let templated = match interpolate_str(raw_path, &resolve) {
            Ok(path) => path,
            Err(name) => {
                self.diags.push(
                    Diagnostic::error(
                        Code::RuntimeMissingVariable,
                        format!("no variable '{}' for template placeholder", name),
                        file,
                        path_span,
                    )
                    .with_flow(flow)
                    .with_request(label),
                );
                return Err(());
            }
        };

        let mut segments = Vec::new();
        for segment in templated.split('/') {
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => match vars.get(name) {
                    Some(value) => {
                        let text = value.to_display_string();
                        segments.push(utf8_percent_encode(&text, SEGMENT).to_string());
                    }
                    None => {
                        self.diags.push(
                            Diagnostic::error(
                                Code::RuntimeMissingPathParam,
                                format!("no variable for path parameter ':{}'", name),
                                file,
                                path_span,
                            )
                            .with_flow(flow)
                            .with_request(label),
                        );
                        return Err(());
                    }
                },
                _ => segments.push(segment.to_string()),
            }
        }
        let path = segments.join("/");

        let base = self
            .options
            .base_url
            .as_deref()
            .or(self.plan.base_url.as_deref());
        Ok(join_base(base, &path))
    }

    fn apply_directives(
        &mut self,
        request: &pipetest_compile::PlanRequest,
        flow: &PlanFlow,
        label: &str,
        vars: &IndexMap<String, Value>,
        bindings: &IndexMap<String, Value>,
        req: &mut Value,
    ) -> Result<(), ()> {
        for eff in &request.lines {
            let (target, key, expr) = match &eff.line {
                ReqLine::Auth { value, .. } => ("auth", String::new(), value),
                ReqLine::Header { key, value, .. } => ("header", key.clone(), value),
                ReqLine::Query { key, value, .. } => ("query", key.clone(), value),
                ReqLine::Json { value, .. } => ("json", String::new(), value),
                _ => continue,
            };

            let evaluated = {
                let scope = step_scope(vars, bindings, req, None);
                eval(expr, &scope)
            };
            let value = match evaluated {
                Ok(value) => value,
                Err(fault) => {
                    self.fault_diag(
                        fault,
                        Code::RuntimeExpression,
                        &eff.file,
                        &flow.name,
                        Some(label),
                    );
                    return Err(());
                }
            };

            // Second substitution pass over the resulting value.
            let value = match interpolate_value(&value, &|name| {
                template_lookup(name, vars, Some(req), None)
            }) {
                Ok(value) => value,
                Err(name) => {
                    self.diags.push(
                        Diagnostic::error(
                            Code::RuntimeMissingVariable,
                            format!("no variable '{}' for template placeholder", name),
                            &eff.file,
                            eff.line.span(),
                        )
                        .with_flow(&flow.name)
                        .with_request(label),
                    );
                    return Err(());
                }
            };

            match target {
                "auth" => {
                    let token = format!("Bearer {}", value.to_display_string());
                    set_object_entry(req, "header", "Authorization", Value::Str(token));
                }
                "header" => {
                    set_object_entry(req, "header", &key, Value::Str(value.to_display_string()));
                }
                "query" => {
                    set_object_entry(req, "query", &key, Value::Str(value.to_display_string()));
                }
                _ => {
                    if let Value::Object(map) = req {
                        map.insert("json".to_string(), value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds the wire request from the (possibly hook-mutated) request
    /// object: query parameters append to the URL, a non-null json body
    /// serializes and defaults the content type.
    fn finalize_request(&self, req: &Value) -> HttpRequest {
        let get = |name: &str| match req {
            Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };

        let method = get("method").to_display_string();
        let mut url = get("url").to_display_string();

        if let Value::Object(query) = get("query") {
            if !query.is_empty() {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in &query {
                    serializer.append_pair(key, &value.to_display_string());
                }
                let encoded = serializer.finish();
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&encoded);
            }
        }

        let mut headers: Vec<(String, String)> = match get("header") {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.to_display_string()))
                .collect(),
            _ => Vec::new(),
        };

        let json = get("json");
        let body = if matches!(json, Value::Null) {
            None
        } else {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            Some(serde_json::to_vec(&json.to_json()).unwrap_or_default())
        };

        HttpRequest {
            method,
            url,
            headers,
            body,
            timeout_millis: self
                .options
                .timeout_millis
                .or(self.plan.timeout_millis),
        }
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn exec_hook(
        &mut self,
        block: &HookBlock,
        file: &str,
        flow: &str,
        label: &str,
        vars: &mut IndexMap<String, Value>,
        bindings: &IndexMap<String, Value>,
        req: &mut Value,
        ctx: Option<&ResponseCtx>,
    ) -> Result<(), ()> {
        for stmt in &block.stmts {
            let outcome = self.exec_hook_stmt(stmt, vars, bindings, req, ctx);
            if let Err(fault) = outcome {
                self.fault_diag(fault, Code::RuntimeHook, file, flow, Some(label));
                return Err(());
            }
        }
        Ok(())
    }

    fn exec_hook_stmt(
        &mut self,
        stmt: &HookStmt,
        vars: &mut IndexMap<String, Value>,
        bindings: &IndexMap<String, Value>,
        req: &mut Value,
        ctx: Option<&ResponseCtx>,
    ) -> Result<(), Fault> {
        match stmt {
            HookStmt::Assign { target, value, span } => {
                // Evaluate the right side and every index key before any
                // mutation; the scope borrows req immutably.
                let (rhs, keys) = {
                    let scope = step_scope(vars, bindings, req, ctx);
                    let rhs = eval(value, &scope)?;
                    let mut keys = Vec::with_capacity(target.steps.len());
                    for step in &target.steps {
                        keys.push(match step {
                            AccessStep::Field { name, .. } => PathKey::Field(name.clone()),
                            AccessStep::Index(index) => PathKey::Key(eval(index, &scope)?),
                        });
                    }
                    (rhs, keys)
                };

                match &target.root {
                    LValueRoot::Req | LValueRoot::Dollar => {
                        assign_path(req, &keys, rhs, *span)?;
                    }
                    LValueRoot::Var(name) => {
                        if keys.is_empty() {
                            vars.insert(name.clone(), rhs);
                        } else {
                            let Some(root) = vars.get_mut(name) else {
                                return Err(Fault::expr(
                                    format!("unknown variable '{}'", name),
                                    *span,
                                ));
                            };
                            assign_path(root, &keys, rhs, *span)?;
                        }
                    }
                    LValueRoot::Res => {
                        return Err(Fault::expr("cannot assign to 'res'", *span));
                    }
                }
                Ok(())
            }
            HookStmt::Let(binding) => {
                let value = {
                    let scope = step_scope(vars, bindings, req, ctx);
                    eval(&binding.value, &scope)?
                };
                vars.insert(binding.name.name.clone(), value);
                Ok(())
            }
            HookStmt::Print { kind, args, span } => {
                let mut values = Vec::with_capacity(args.len());
                {
                    let scope = step_scope(vars, bindings, req, ctx);
                    for arg in args {
                        values.push(eval(arg, &scope)?);
                    }
                }
                // Template interpolation applies to string arguments
                // before formatting.
                let mut rendered = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        Value::Str(text) => {
                            let replaced = interpolate_str(&text, &|name| {
                                template_lookup(name, vars, Some(req), ctx)
                            })
                            .map_err(|name| {
                                Fault::new(
                                    Code::RuntimeMissingVariable,
                                    format!("no variable '{}' for template placeholder", name),
                                    *span,
                                )
                            })?;
                            rendered.push(Value::Str(replaced));
                        }
                        other => rendered.push(other),
                    }
                }
                let text = format_print(*kind, &rendered);
                self.log(text);
                Ok(())
            }
            HookStmt::Expr(expr) => {
                let scope = step_scope(vars, bindings, req, ctx);
                eval(expr, &scope).map(|_| ())
            }
        }
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    /// Evaluates one assertion. Returns `None` when evaluation itself
    /// faulted (diagnostic recorded); otherwise the pass/fail outcome
    /// with its `E_ASSERT_EXPECTED_TRUE` diagnostic on failure.
    fn check_assert(
        &mut self,
        expr: &Expr,
        scope: &Scope<'_>,
        file: &str,
        flow: &str,
        request: Option<&str>,
    ) -> Option<AssertResult> {
        let line = expr.span.start.line;
        match eval(expr, scope) {
            Err(fault) => {
                self.fault_diag(fault, Code::RuntimeExpression, file, flow, request);
                self.log_assert(format!("FAIL {}:{} (evaluation error)", file, line));
                None
            }
            Ok(Value::Bool(true)) => {
                self.log_assert(format!("PASS {}:{}", file, line));
                Some(AssertResult {
                    file: file.to_string(),
                    line,
                    passed: true,
                    detail: String::new(),
                })
            }
            Ok(other) => {
                let detail = describe_assert_failure(expr, scope, &other);
                let mut diag = Diagnostic::error(
                    Code::AssertExpectedTrue,
                    "assertion did not evaluate to true",
                    file,
                    expr.span,
                )
                .with_flow(flow)
                .with_hint(&detail);
                if let Some(request) = request {
                    diag = diag.with_request(request);
                }
                self.diags.push(diag);
                self.log_assert(format!("FAIL {}:{}: {}", file, line, detail));
                Some(AssertResult {
                    file: file.to_string(),
                    line,
                    passed: false,
                    detail,
                })
            }
        }
    }
}

/// Writes into one of the request object's sub-objects
/// (`header`/`query`).
fn set_object_entry(req: &mut Value, section: &str, key: &str, value: Value) {
    if let Value::Object(map) = req {
        if let Some(Value::Object(section_map)) = map.get_mut(section) {
            section_map.insert(key.to_string(), value);
        }
    }
}

/// Scope for expressions inside a step: request object always present,
/// response context after dispatch.
fn step_scope<'a>(
    vars: &'a IndexMap<String, Value>,
    bindings: &'a IndexMap<String, Value>,
    req: &'a Value,
    ctx: Option<&'a ResponseCtx>,
) -> Scope<'a> {
    Scope {
        vars,
        bindings,
        req: Some(req),
        res: ctx.map(|c| &c.res),
        status: ctx.map(|c| c.status),
        header: ctx.map(|c| &c.header),
    }
}

/// Name lookup for `{{name}}` placeholders: context symbols first (when
/// available), then flow variables.
fn template_lookup(
    name: &str,
    vars: &IndexMap<String, Value>,
    req: Option<&Value>,
    ctx: Option<&ResponseCtx>,
) -> Option<String> {
    match name {
        "status" => {
            if let Some(ctx) = ctx {
                return Some(format_number(ctx.status));
            }
        }
        "res" => {
            if let Some(ctx) = ctx {
                return Some(ctx.res.to_display_string());
            }
        }
        "req" => {
            if let Some(req) = req {
                return Some(req.to_display_string());
            }
        }
        _ => {}
    }
    vars.get(name).map(Value::to_display_string)
}

fn join_base(base: Option<&str>, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match base {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        None => path.to_string(),
    }
}

/// Precomputed assignment path: field names and already-evaluated index
/// keys.
enum PathKey {
    Field(String),
    Key(Value),
}

/// Writes `value` at the end of `keys`, creating intermediate objects
/// for missing fields.
fn assign_path(root: &mut Value, keys: &[PathKey], value: Value, span: Span) -> Result<(), Fault> {
    if keys.is_empty() {
        *root = value;
        return Ok(());
    }

    let mut cursor = root;
    for key in &keys[..keys.len() - 1] {
        cursor = descend(cursor, key, span)?;
    }

    match (&keys[keys.len() - 1], cursor) {
        (PathKey::Field(name), Value::Object(map)) => {
            map.insert(name.clone(), value);
            Ok(())
        }
        (PathKey::Key(index), Value::Object(map)) => {
            map.insert(index.to_display_string(), value);
            Ok(())
        }
        (PathKey::Key(index), Value::Array(items)) => {
            let idx = index
                .as_number()
                .filter(|n| n.fract() == 0.0 && *n >= 0.0 && (*n as usize) < items.len())
                .ok_or_else(|| Fault::expr("array index out of range in assignment", span))?;
            items[idx as usize] = value;
            Ok(())
        }
        (_, other) => Err(Fault::expr(
            format!("cannot assign into {}", other.type_name()),
            span,
        )),
    }
}

fn descend<'v>(cursor: &'v mut Value, key: &PathKey, span: Span) -> Result<&'v mut Value, Fault> {
    match key {
        PathKey::Field(name) => match cursor {
            Value::Object(map) => {
                let slot = map
                    .entry(name.clone())
                    .or_insert_with(|| Value::Object(IndexMap::new()));
                if matches!(slot, Value::Null) {
                    *slot = Value::Object(IndexMap::new());
                }
                Ok(slot)
            }
            other => Err(Fault::expr(
                format!("cannot access field '{}' on {}", name, other.type_name()),
                span,
            )),
        },
        PathKey::Key(index) => match cursor {
            Value::Object(map) => {
                let key = index.to_display_string();
                let slot = map
                    .entry(key)
                    .or_insert_with(|| Value::Object(IndexMap::new()));
                if matches!(slot, Value::Null) {
                    *slot = Value::Object(IndexMap::new());
                }
                Ok(slot)
            }
            Value::Array(items) => {
                let idx = index
                    .as_number()
                    .filter(|n| n.fract() == 0.0 && *n >= 0.0 && (*n as usize) < items.len())
                    .ok_or_else(|| Fault::expr("array index out of range", span))?;
                Ok(&mut items[idx as usize])
            }
            other => Err(Fault::expr(
                format!("cannot index into {}", other.type_name()),
                span,
            )),
        },
    }
}

fn format_print(kind: PrintKind, values: &[Value]) -> String {
    match kind {
        PrintKind::Print | PrintKind::Println => values
            .iter()
            .map(Value::to_display_string)
            .collect::<Vec<_>>()
            .concat(),
        PrintKind::Printf => {
            if values.is_empty() {
                return String::new();
            }
            format_c(&values[0].to_display_string(), &values[1..])
        }
    }
}

/// Minimal C-style formatting: `%s %v %d %x %X %f %%`. Integer verbs
/// coerce whole-valued doubles; missing arguments leave the verb
/// literal.
fn format_c(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut arg_index = 0;
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb) => {
                let Some(arg) = args.get(arg_index) else {
                    out.push('%');
                    out.push(verb);
                    continue;
                };
                arg_index += 1;
                match verb {
                    's' | 'v' => out.push_str(&arg.to_display_string()),
                    'd' => match arg.as_number() {
                        Some(n) => out.push_str(&format!("{}", n as i64)),
                        None => out.push_str(&arg.to_display_string()),
                    },
                    'x' => match arg.as_number() {
                        Some(n) => out.push_str(&format!("{:x}", n as i64)),
                        None => out.push_str(&arg.to_display_string()),
                    },
                    'X' => match arg.as_number() {
                        Some(n) => out.push_str(&format!("{:X}", n as i64)),
                        None => out.push_str(&arg.to_display_string()),
                    },
                    'f' => match arg.as_number() {
                        Some(n) => out.push_str(&format!("{:.6}", n)),
                        None => out.push_str(&arg.to_display_string()),
                    },
                    other => {
                        out.push('%');
                        out.push(other);
                        arg_index -= 1;
                    }
                }
            }
            None => out.push('%'),
        }
    }
    out
}

/// Builds the cause hint for a failed assertion: for comparisons the
/// two sides are re-evaluated and shown, otherwise the overall value.
fn describe_assert_failure(expr: &Expr, scope: &Scope<'_>, outcome: &Value) -> String {
    if let ExprKind::Binary { op, left, right } = &expr.kind {
        use pipetest_language::ast::BinaryOp::*;
        if matches!(*op, Eq | Ne | Lt | Le | Gt | Ge | In | Contains | Match) {
            if let (Ok(lhs), Ok(rhs)) = (eval(left, scope), eval(right, scope)) {
                return format!(
                    "left was {}, right was {}",
                    lhs.to_display_string(),
                    rhs.to_display_string()
                );
            }
        }
    }
    if matches!(outcome, Value::Bool(false)) {
        "evaluated to false".to_string()
    } else {
        format!("evaluated to {} ({})", outcome.to_display_string(), outcome.type_name())
    }
}
