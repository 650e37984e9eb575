//! Tree-walking expression evaluation.
//!
//! Expressions evaluate against a [`Scope`]: reserved context symbols
//! first (`status`, `header`, `req`, `res`/`#`, `$`), then flow
//! variables, then binding snapshots. Every fault carries the span of
//! the offending expression; the evaluator turns faults into
//! `E_RUNTIME_*` diagnostics with file and flow context attached.

use indexmap::IndexMap;
use pipetest_base::{Code, Span};
use pipetest_language::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

use crate::builtins;
use crate::value::Value;

/// A runtime failure inside expression evaluation.
#[derive(Debug, Clone)]
pub struct Fault {
    pub code: Code,
    pub message: String,
    pub span: Span,
}

impl Fault {
    pub fn new(code: Code, message: impl Into<String>, span: Span) -> Self {
        Fault {
            code,
            message: message.into(),
            span,
        }
    }

    pub fn expr(message: impl Into<String>, span: Span) -> Self {
        Fault::new(Code::RuntimeExpression, message, span)
    }
}

pub type EvalResult = Result<Value, Fault>;

/// The name environment for one evaluation.
///
/// `req`/`res`/`status`/`header` are `None` outside a step (flow-level
/// assertions) or before a response exists (pre-hooks).
pub struct Scope<'a> {
    pub vars: &'a IndexMap<String, Value>,
    pub bindings: &'a IndexMap<String, Value>,
    pub req: Option<&'a Value>,
    pub res: Option<&'a Value>,
    pub status: Option<f64>,
    pub header: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    /// A scope with no step context: flow preludes and flow assertions.
    pub fn flow(vars: &'a IndexMap<String, Value>, bindings: &'a IndexMap<String, Value>) -> Self {
        Scope {
            vars,
            bindings,
            req: None,
            res: None,
            status: None,
            header: None,
        }
    }

    fn resolve(&self, name: &str, span: Span) -> EvalResult {
        match name {
            "status" => {
                if let Some(status) = self.status {
                    return Ok(Value::Number(status));
                }
            }
            "header" => {
                if let Some(header) = self.header {
                    return Ok(header.clone());
                }
            }
            "req" => {
                if let Some(req) = self.req {
                    return Ok(req.clone());
                }
            }
            "res" => {
                if let Some(res) = self.res {
                    return Ok(res.clone());
                }
            }
            _ => {}
        }
        if let Some(value) = self.vars.get(name) {
            return Ok(value.clone());
        }
        if let Some(snapshot) = self.bindings.get(name) {
            return Ok(snapshot.clone());
        }
        Err(Fault::expr(format!("unknown identifier '{}'", name), span))
    }
}

pub fn eval(expr: &Expr, scope: &Scope<'_>) -> EvalResult {
    match &expr.kind {
        ExprKind::Null => Ok(Value::Null),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, scope)?);
            }
            Ok(Value::Array(out))
        }
        ExprKind::Object(pairs) => {
            let mut map = IndexMap::with_capacity(pairs.len());
            for (key, value) in pairs {
                map.insert(key.name.clone(), eval(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        ExprKind::Ident(name) => scope.resolve(name, expr.span),
        ExprKind::RequestRoot => scope
            .req
            .cloned()
            .ok_or_else(|| Fault::expr("'$' is not available here", expr.span)),
        ExprKind::ResponseRoot => scope
            .res
            .cloned()
            .ok_or_else(|| Fault::expr("'#' is not available here", expr.span)),
        ExprKind::Paren(inner) => eval(inner, scope),
        ExprKind::Unary { op, operand } => eval_unary(*op, operand, scope, expr.span),
        ExprKind::Binary { op, left, right } => eval_binary(*op, left, right, scope, expr.span),
        ExprKind::Field { object, name, .. } => {
            let value = eval(object, scope)?;
            field_access(&value, name, expr.span)
        }
        ExprKind::Index { object, index } => {
            let value = eval(object, scope)?;
            let idx = eval(index, scope)?;
            index_access(&value, &idx, expr.span)
        }
        ExprKind::Call { callee, args } => {
            let ExprKind::Ident(name) = &callee.kind else {
                return Err(Fault::expr("only built-in functions can be called", callee.span));
            };
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, scope)?);
            }
            builtins::call(name, values, expr.span)
        }
    }
}

fn eval_unary(op: UnaryOp, operand: &Expr, scope: &Scope<'_>, span: Span) -> EvalResult {
    let value = eval(operand, scope)?;
    match op {
        UnaryOp::Not => match value {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(Fault::expr(
                format!("'!' needs a boolean, got {}", other.type_name()),
                span,
            )),
        },
        UnaryOp::Neg => match value.as_number() {
            Some(n) => Ok(Value::Number(-n)),
            None => Err(Fault::expr(
                format!("unary '-' needs a number, got {}", value.type_name()),
                span,
            )),
        },
        UnaryOp::Pos => match value.as_number() {
            Some(n) => Ok(Value::Number(n)),
            None => Err(Fault::expr(
                format!("unary '+' needs a number, got {}", value.type_name()),
                span,
            )),
        },
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &Scope<'_>,
    span: Span,
) -> EvalResult {
    // Logical operators short-circuit; everything else evaluates both
    // sides first.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = as_bool(eval(left, scope)?, op, span)?;
        return match (op, lhs) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let rhs = as_bool(eval(right, scope)?, op, span)?;
                Ok(Value::Bool(rhs))
            }
        };
    }

    let lhs = eval(left, scope)?;
    let rhs = eval(right, scope)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.deep_eq(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.deep_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = numeric_pair(&lhs, &rhs, op, span)?;
            let result = match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => {
            if let (Value::Str(_), _) | (_, Value::Str(_)) = (&lhs, &rhs) {
                Ok(Value::Str(format!(
                    "{}{}",
                    lhs.to_display_string(),
                    rhs.to_display_string()
                )))
            } else {
                let (a, b) = numeric_pair(&lhs, &rhs, op, span)?;
                Ok(Value::Number(a + b))
            }
        }
        BinaryOp::Sub | BinaryOp::Mul => {
            let (a, b) = numeric_pair(&lhs, &rhs, op, span)?;
            Ok(Value::Number(match op {
                BinaryOp::Sub => a - b,
                _ => a * b,
            }))
        }
        BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = numeric_pair(&lhs, &rhs, op, span)?;
            if b == 0.0 {
                return Err(Fault::expr(
                    if op == BinaryOp::Div {
                        "division by zero"
                    } else {
                        "modulo by zero"
                    },
                    span,
                ));
            }
            Ok(Value::Number(if op == BinaryOp::Div { a / b } else { a % b }))
        }
        BinaryOp::In => match &rhs {
            Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| lhs.deep_eq(item)))),
            other => Err(Fault::expr(
                format!("'in' needs an array on the right, got {}", other.type_name()),
                span,
            )),
        },
        BinaryOp::Contains => match (&lhs, &rhs) {
            (Value::Str(haystack), Value::Str(needle)) => {
                Ok(Value::Bool(haystack.contains(needle.as_str())))
            }
            (Value::Array(items), needle) => {
                Ok(Value::Bool(items.iter().any(|item| item.deep_eq(needle))))
            }
            (other, _) => Err(Fault::expr(
                format!(
                    "'contains' needs a string or array on the left, got {}",
                    other.type_name()
                ),
                span,
            )),
        },
        BinaryOp::Match => match (&lhs, &rhs) {
            (Value::Str(value), Value::Str(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => Ok(Value::Bool(re.is_match(value))),
                Err(err) => Err(Fault::expr(format!("invalid regex: {}", err), span)),
            },
            _ => Err(Fault::expr("'~' needs string operands", span)),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn as_bool(value: Value, op: BinaryOp, span: Span) -> Result<bool, Fault> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Fault::expr(
            format!("'{}' needs boolean operands, got {}", op.as_str(), other.type_name()),
            span,
        )),
    }
}

fn numeric_pair(lhs: &Value, rhs: &Value, op: BinaryOp, span: Span) -> Result<(f64, f64), Fault> {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Fault::expr(
            format!(
                "'{}' needs numeric operands, got {} and {}",
                op.as_str(),
                lhs.type_name(),
                rhs.type_name()
            ),
            span,
        )),
    }
}

/// `.name` yields the member or null on objects; anything else faults.
pub fn field_access(value: &Value, name: &str, span: Span) -> EvalResult {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        other => Err(Fault::expr(
            format!("cannot access field '{}' on {}", name, other.type_name()),
            span,
        )),
    }
}

/// `[expr]` stringifies the index on objects and bounds-checks on
/// arrays.
pub fn index_access(value: &Value, index: &Value, span: Span) -> EvalResult {
    match value {
        Value::Object(map) => {
            let key = index.to_display_string();
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        Value::Array(items) => {
            let Some(idx) = index.as_number() else {
                return Err(Fault::expr(
                    format!("array index must be a number, got {}", index.type_name()),
                    span,
                ));
            };
            if idx.fract() != 0.0 || idx < 0.0 || (idx as usize) >= items.len() {
                return Err(Fault::expr(
                    format!("array index {} out of range (len {})", idx, items.len()),
                    span,
                ));
            }
            Ok(items[idx as usize].clone())
        }
        other => Err(Fault::expr(
            format!("cannot index into {}", other.type_name()),
            span,
        )),
    }
}
