//! Request-shaping behaviors observed through the mock transport:
//! directives, templates, hooks mutating the outgoing request, bodies,
//! and query encoding.

mod common;

use common::{plan_of, run_with};
use pipetest_runtime::{execute, BufferSink, Evaluator, ExecOptions, MockTransport};
use serde_json::json;

#[test]
fn directives_shape_the_outgoing_request() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n",
        "\tPOST /items\n",
        "\theader X-Trace = \"t-1\"\n",
        "\tquery page = 2\n",
        "\tauth bearer \"secret\"\n",
        "\tjson {name: \"box\", count: 3}\n",
        "flow \"f\":\n\tr\n",
    );
    let transport = MockTransport::new().route("POST", "/items", 201, &json!({"id": 9}));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);

    let requests = transport.requests();
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "https://h.test/items?page=2");
    assert_eq!(request.header("X-Trace"), Some("t-1"));
    assert_eq!(request.header("Authorization"), Some("Bearer secret"));
    assert_eq!(request.header("Content-Type"), Some("application/json"));

    let body: serde_json::Value =
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"name": "box", "count": 3.0}));
}

#[test]
fn templates_interpolate_into_directive_values() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "let tenant = \"acme\"\n",
        "req r:\n\tGET /whoami\n\theader X-Tenant = \"id-{{tenant}}\"\n",
        "flow \"f\":\n\tr\n",
    );
    let transport = MockTransport::new().route("GET", "/whoami", 200, &json!(null));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(transport.requests()[0].header("X-Tenant"), Some("id-acme"));
}

#[test]
fn path_templates_and_params_compose() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n\tGET /v1/{{section}}/:id\n",
        "flow \"f\":\n\tlet section = \"users\"\n\tlet id = \"a b\"\n\tr\n",
    );
    let transport = MockTransport::new().route("GET", "/v1/users/a%20b", 200, &json!(null));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(transport.requests()[0].url, "https://h.test/v1/users/a%20b");
}

#[test]
fn pre_hook_mutates_the_outgoing_request() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n\tGET /x\n\tpre hook { req.header[\"X-From-Hook\"] = \"yes\"; $.query.extra = \"1\" }\n",
        "flow \"f\":\n\tr\n",
    );
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    let request = &transport.requests()[0];
    assert_eq!(request.header("X-From-Hook"), Some("yes"));
    assert_eq!(request.url, "https://h.test/x?extra=1");
}

#[test]
fn post_hook_lets_and_prints_observe_the_response() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n\tGET /x\n\tpost hook { print \"status={{status}}\" }\n\tlet code = status\n",
        "flow \"f\":\n\tr\n\t? code == 200\n",
    );
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));
    let plan = plan_of(src);
    let mut output = BufferSink::new();

    let run = Evaluator::new(&plan, &transport)
        .with_output(&mut output)
        .run();

    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert!(run.flows[0].asserts[0].passed);
    assert!(output.lines.contains(&"status=200".to_string()), "{:?}", output.lines);
}

#[test]
fn multi_value_response_headers_become_arrays() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n\tGET /x\n\t? len(header[\"Set-Cookie\"]) == 2\n\t? header[\"X-One\"] == \"only\"\n",
        "flow \"f\":\n\tr\n",
    );
    let transport = MockTransport::new().route_raw(
        "GET",
        "/x",
        200,
        vec![
            ("Set-Cookie".to_string(), vec!["a=1".to_string(), "b=2".to_string()]),
            ("X-One".to_string(), vec!["only".to_string()]),
        ],
        Vec::new(),
    );

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert!(run.flows[0].passed);
}

#[test]
fn empty_body_decodes_to_null() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "req r:\n\tGET /x\n\t? res == null\n",
        "flow \"f\":\n\tr\n",
    );
    let transport =
        MockTransport::new().route_raw("GET", "/x", 204, Vec::new(), Vec::new());

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert!(run.flows[0].passed);
}

#[test]
fn invalid_json_body_is_a_transport_fault() {
    let src = "base \"https://h.test\"\nreq r:\n\tGET /x\nflow \"f\":\n\tr\n";
    let transport = MockTransport::new().route_raw(
        "GET",
        "/x",
        200,
        Vec::new(),
        b"not json at all".to_vec(),
    );

    let run = run_with(src, &transport);
    assert_eq!(run.diagnostics.len(), 1);
    assert_eq!(run.diagnostics[0].code, pipetest_base::Code::RuntimeTransport);
    assert!(run.flows[0].steps.is_empty());
}

#[test]
fn base_url_override_wins_over_the_plan() {
    let src = "base \"https://plan.test\"\nreq r:\n\tGET /x\nflow \"f\":\n\tr\n";
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));
    let plan = plan_of(src);

    let run = Evaluator::new(&plan, &transport)
        .with_options(ExecOptions {
            base_url: Some("https://override.test".to_string()),
            ..ExecOptions::default()
        })
        .run();

    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(transport.requests()[0].url, "https://override.test/x");
}

#[test]
fn absolute_paths_ignore_the_base_url() {
    let src = "base \"https://plan.test\"\nreq r:\n\tGET https://direct.test/x\nflow \"f\":\n\tr\n";
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert_eq!(transport.requests()[0].url, "https://direct.test/x");
}

#[test]
fn empty_plan_is_a_no_op() {
    let src = "req r:\n\tGET /x\n";
    let plan = plan_of(src);
    let transport = MockTransport::new();

    let run = execute(&plan, &transport);

    assert!(run.flows.is_empty());
    assert!(run.diagnostics.is_empty());
    assert!(run.passed());
    assert!(transport.requests().is_empty());
}

#[test]
fn fired_cancel_token_surfaces_as_transport_error() {
    let src = "base \"https://h.test\"\nreq r:\n\tGET /x\nflow \"f\":\n\tr\n";
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));
    let plan = plan_of(src);

    let options = ExecOptions::default();
    options.cancel.cancel();
    let run = Evaluator::new(&plan, &transport)
        .with_options(options)
        .run();

    assert_eq!(run.diagnostics.len(), 1);
    assert_eq!(run.diagnostics[0].code, pipetest_base::Code::RuntimeTransport);
    assert!(transport.requests().is_empty());
}

#[test]
fn uuid_builtin_produces_32_hex_in_program() {
    let src = concat!(
        "base \"https://h.test\"\n",
        "let id = uuid()\n",
        "req r:\n\tGET /x\n\t? len(id) == 32\n\t? id ~ \"^[0-9a-f]+$\"\n",
        "flow \"f\":\n\tr\n",
    );
    let transport = MockTransport::new().route("GET", "/x", 200, &json!(null));

    let run = run_with(src, &transport);
    assert!(run.diagnostics.is_empty(), "{:#?}", run.diagnostics);
    assert!(run.flows[0].passed);
}
