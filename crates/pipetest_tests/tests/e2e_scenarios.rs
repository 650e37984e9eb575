//! End-to-end coverage of the canonical scenarios: smoke, chaining with
//! propagation, transport failure, inheritance override, and the static
//! rejections (unbound path param, pre-hook response reference).

mod common;

use common::{compile_one, run_with};
use pipetest_base::Code;
use pipetest_runtime::MockTransport;
use serde_json::json;

#[test]
fn single_step_smoke() {
    let src = "base \"https://h.test\"\ntimeout 5s\nreq ping:\n\tGET /get\n\t? status == 200\nflow \"s\":\n\tping\n\t? ping.status == 200\n";
    let transport = MockTransport::new().route("GET", "/get", 200, &json!({"ok": true}));

    let run = run_with(src, &transport);

    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(run.flows.len(), 1);
    let flow = &run.flows[0];
    assert!(flow.passed);
    assert_eq!(flow.steps.len(), 1);
    assert_eq!(flow.steps[0].status, 200);
    assert_eq!(flow.steps[0].url, "https://h.test/get");
    assert!(flow.steps[0].asserts.iter().all(|a| a.passed));
    assert_eq!(flow.asserts.len(), 1);
    assert!(flow.asserts[0].passed);

    // The plan's timeout reaches the transport as a per-call deadline.
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].timeout_millis, Some(5_000.0));
}

#[test]
fn chain_with_propagation() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req first:\n\tGET /first\n\t? status == 200\n\tlet token = #.token\n",
        "req second:\n\tGET /second/:token\n\t? status == 200\n\t? #.fromHeader == \"yes\"\n",
        "flow \"f\":\n\tfirst -> second : alias\n\t? alias.res.seen == token\n",
    );
    let transport = MockTransport::new()
        .route("GET", "/first", 200, &json!({"token": "abc"}))
        .route("GET", "/second/abc", 200, &json!({"seen": "abc", "fromHeader": "yes"}));

    let run = run_with(src, &transport);

    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    let urls: Vec<String> = transport.requests().iter().map(|r| r.url.clone()).collect();
    assert_eq!(
        urls,
        vec!["https://h.test/first", "https://h.test/second/abc"]
    );
    let flow = &run.flows[0];
    assert!(flow.passed);
    assert_eq!(flow.steps.len(), 2);
    assert_eq!(flow.steps[1].binding, "alias");
    assert!(flow.asserts[0].passed);
}

#[test]
fn transport_failure_aborts_the_flow() {
    let src = "base \"https://unreachable.test\"\nreq r:\n\tGET /x\nflow \"f\":\n\tr\n";
    // No routes: every dispatch errors.
    let transport = MockTransport::new();

    let run = run_with(src, &transport);

    assert_eq!(run.diagnostics.len(), 1);
    let diag = &run.diagnostics[0];
    assert_eq!(diag.code, Code::RuntimeTransport);
    assert_eq!(diag.flow.as_deref(), Some("f"));
    // The step produced no result.
    assert!(run.flows[0].steps.is_empty());
    assert!(!run.flows[0].passed);
}

#[test]
fn inheritance_override_observed_on_the_wire() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req parent:\n\tGET /x\n\theader XReq = \"parent\"\n\tpost hook { seen = \"parent\" }\n",
        "req child(parent):\n\theader XReq = \"child\"\n\tpost hook { seen = #.value }\n",
        "flow \"f\":\n\tchild\n\t? seen == \"frombody\"\n",
    );
    let transport = MockTransport::new().route("GET", "/x", 200, &json!({"value": "frombody"}));

    let run = run_with(src, &transport);

    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    let requests = transport.requests();
    assert_eq!(requests[0].header("XReq"), Some("child"));
    // The child's post hook ran, not the parent's.
    assert!(run.flows[0].asserts[0].passed);
}

#[test]
fn unbound_path_param_is_static() {
    // No plan is produced; the diagnostic is specialized to the path param.
    let result = compile_one("req r:\n\tGET /x/:missing\nflow \"f\":\n\tr\n");
    assert!(result.plan.is_none());
    let found: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.code == Code::SemMissingPathParamVar)
        .collect();
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("missing"));
}

#[test]
fn pre_hook_status_template_is_static() {
    let result = compile_one("req r:\n\tGET /x\n\tpre hook { print \"{{status}}\" }\nflow \"f\":\n\tr\n");
    assert!(result.plan.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == Code::SemPreHookReferencesRes));
}

#[test]
fn later_flows_run_after_a_failed_flow() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req bad:\n\tGET /bad\n",
        "req good:\n\tGET /good\n\t? status == 200\n",
        "flow \"a\":\n\tbad\n",
        "flow \"b\":\n\tgood\n",
    );
    // Only /good is routed; /bad fails at the transport.
    let transport = MockTransport::new().route("GET", "/good", 200, &json!(null));

    let run = run_with(src, &transport);

    assert_eq!(run.flows.len(), 2);
    assert!(!run.flows[0].passed);
    assert!(run.flows[1].passed, "{:#?}", run);
    assert!(run
        .diagnostics
        .iter()
        .any(|d| d.code == Code::RuntimeTransport));
}

#[test]
fn failed_request_assertion_stops_the_flow_but_keeps_the_step() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req first:\n\tGET /a\n\t? status == 201\n",
        "req second:\n\tGET /b\n",
        "flow \"f\":\n\tfirst -> second\n",
    );
    let transport = MockTransport::new()
        .route("GET", "/a", 200, &json!(null))
        .route("GET", "/b", 200, &json!(null));

    let run = run_with(src, &transport);

    let flow = &run.flows[0];
    assert!(!flow.passed);
    // First step ran and recorded its failed assertion; second never
    // dispatched.
    assert_eq!(flow.steps.len(), 1);
    assert!(!flow.steps[0].asserts[0].passed);
    assert_eq!(transport.requests().len(), 1);

    let assert_diag = run
        .diagnostics
        .iter()
        .find(|d| d.code == Code::AssertExpectedTrue)
        .expect("assertion diagnostic");
    assert!(assert_diag.hint.contains("left was 200"));
}
