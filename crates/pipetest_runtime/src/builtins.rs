//! Built-in functions of the expression runtime.
//!
//! | Function | Result |
//! |----------|--------|
//! | `env(name)` | process environment variable, `""` when unset |
//! | `uuid()` | 32 lowercase hex characters, random |
//! | `len(x)` | length of a string (characters), array, or object |
//! | `regex(pattern, value)` | whether `value` matches `pattern` |
//! | `jsonpath(root, path)` | dot/index path lookup, null when missing |
//! | `now()` | UTC RFC3339 timestamp with nanosecond precision |
//! | `urlencode(value)` | form-urlencoded escaping of the string form |
//!
//! Wrong argument counts and type mismatches fault with
//! `E_RUNTIME_EXPRESSION`.

use chrono::{SecondsFormat, Utc};
use pipetest_base::Span;

use crate::expr::{EvalResult, Fault};
use crate::value::Value;

pub fn call(name: &str, args: Vec<Value>, span: Span) -> EvalResult {
    match name {
        "env" => env(args, span),
        "uuid" => uuid(args, span),
        "len" => len(args, span),
        "regex" => regex_fn(args, span),
        "jsonpath" => jsonpath(args, span),
        "now" => now(args, span),
        "urlencode" => urlencode(args, span),
        _ => Err(Fault::expr(format!("unknown function '{}'", name), span)),
    }
}

fn want(args: &[Value], count: usize, name: &str, span: Span) -> Result<(), Fault> {
    if args.len() == count {
        Ok(())
    } else {
        Err(Fault::expr(
            format!("{}() takes {} argument(s), got {}", name, count, args.len()),
            span,
        ))
    }
}

fn string_arg<'a>(args: &'a [Value], idx: usize, name: &str, span: Span) -> Result<&'a str, Fault> {
    match &args[idx] {
        Value::Str(s) => Ok(s),
        other => Err(Fault::expr(
            format!(
                "{}() argument {} must be a string, got {}",
                name,
                idx + 1,
                other.type_name()
            ),
            span,
        )),
    }
}

fn env(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 1, "env", span)?;
    let key = string_arg(&args, 0, "env", span)?;
    Ok(Value::Str(std::env::var(key).unwrap_or_default()))
}

fn uuid(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 0, "uuid", span)?;
    Ok(Value::Str(format!("{:032x}", rand::random::<u128>())))
}

fn len(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 1, "len", span)?;
    let length = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(Fault::expr(
                format!("len() needs a string, array, or object, got {}", other.type_name()),
                span,
            ))
        }
    };
    Ok(Value::Number(length as f64))
}

fn regex_fn(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 2, "regex", span)?;
    let pattern = string_arg(&args, 0, "regex", span)?;
    let value = string_arg(&args, 1, "regex", span)?;
    match regex::Regex::new(pattern) {
        Ok(re) => Ok(Value::Bool(re.is_match(value))),
        Err(err) => Err(Fault::expr(format!("invalid regex: {}", err), span)),
    }
}

fn now(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 0, "now", span)?;
    Ok(Value::Str(
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
    ))
}

fn urlencode(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 1, "urlencode", span)?;
    let text = args[0].to_display_string();
    let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
    Ok(Value::Str(encoded))
}

/// `jsonpath(root, "$.a.b[0]")`: `$` then dot-field and integer-index
/// segments. A missing path yields null; a malformed path faults.
fn jsonpath(args: Vec<Value>, span: Span) -> EvalResult {
    want(&args, 2, "jsonpath", span)?;
    let path = string_arg(&args, 1, "jsonpath", span)?;
    let segments = parse_path(path)
        .ok_or_else(|| Fault::expr(format!("malformed jsonpath '{}'", path), span))?;

    let mut current = args[0].clone();
    for segment in segments {
        current = match (&segment, current) {
            (PathSegment::Field(name), Value::Object(map)) => {
                map.get(name.as_str()).cloned().unwrap_or(Value::Null)
            }
            (PathSegment::Index(idx), Value::Array(items)) => {
                items.get(*idx).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };
        if matches!(current, Value::Null) {
            return Ok(Value::Null);
        }
    }
    Ok(current)
}

enum PathSegment {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let rest = path.strip_prefix('$')?;
    let bytes = rest.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
                    i += 1;
                }
                if start == i {
                    return None;
                }
                segments.push(PathSegment::Field(rest[start..i].to_string()));
            }
            b'[' => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                let index: usize = rest[start..i].parse().ok()?;
                segments.push(PathSegment::Index(index));
                i += 1;
            }
            _ => return None,
        }
    }
    Some(segments)
}
