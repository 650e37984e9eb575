//! The pipetest abstract syntax tree.
//!
//! One enum per node category, pattern-matched exhaustively downstream:
//!
//! - [`Stmt`] — top-level statements (settings, imports, lets, declarations)
//! - [`ReqLine`] — lines inside a `req` block
//! - [`HookStmt`] — statements inside a `pre hook` / `post hook` body
//! - [`Expr`]/[`ExprKind`] — expressions
//! - [`LValue`] — hook assignment targets
//!
//! Every node carries a [`Span`] covering its source range. Nodes are
//! owned and cloneable: the compiler materializes effective request lines
//! by cloning merged [`ReqLine`]s into the plan, which must outlive the
//! parsed modules.
//!
//! Parent/child request relationships are name-based (strings), never
//! node references; the compiler resolves them once during inheritance
//! materialization.

use pipetest_base::{Method, Span};

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// A parsed module: the ordered list of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `base "https://host"` — default URL prefix for relative paths.
    Base { url: String, span: Span },
    /// `timeout 8s` — default per-request deadline, in milliseconds.
    Timeout { millis: f64, span: Span },
    /// `import "./other.pt"`
    Import { path: String, span: Span },
    /// Global `let name = expr`.
    Let(LetBinding),
    Req(ReqDecl),
    Flow(FlowDecl),
}

/// `let name = expr` at any scope (global, flow prelude, request line,
/// hook body).
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

/// `req name [( parent )] :` with its block lines.
///
/// Structural multiplicity (exactly one HTTP line, at most one hook of
/// each phase) is deliberately *not* enforced here; the compiler checks
/// it on the merged effective lines so that inherited lines participate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReqDecl {
    pub name: Ident,
    pub parent: Option<Ident>,
    pub lines: Vec<ReqLine>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReqLine {
    /// `GET /path/:id` — method plus the raw path text.
    Http {
        method: Method,
        path: String,
        path_span: Span,
        span: Span,
    },
    /// `header Key = expr`
    Header {
        key: String,
        key_span: Span,
        value: Expr,
        span: Span,
    },
    /// `query key = expr`
    Query {
        key: String,
        key_span: Span,
        value: Expr,
        span: Span,
    },
    /// `auth bearer expr`
    Auth { value: Expr, span: Span },
    /// `json expr` — request body.
    Json { value: Expr, span: Span },
    PreHook(HookBlock),
    PostHook(HookBlock),
    /// `? expr`
    Assert { expr: Expr, span: Span },
    Let(LetBinding),
}

impl ReqLine {
    pub fn span(&self) -> Span {
        match self {
            ReqLine::Http { span, .. }
            | ReqLine::Header { span, .. }
            | ReqLine::Query { span, .. }
            | ReqLine::Auth { span, .. }
            | ReqLine::Json { span, .. }
            | ReqLine::Assert { span, .. } => *span,
            ReqLine::PreHook(h) | ReqLine::PostHook(h) => h.span,
            ReqLine::Let(l) => l.span,
        }
    }
}

/// A brace-scoped hook body.
#[derive(Debug, Clone, PartialEq)]
pub struct HookBlock {
    pub stmts: Vec<HookStmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintKind {
    Print,
    Println,
    Printf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookStmt {
    /// `lvalue = expr`
    Assign {
        target: LValue,
        value: Expr,
        span: Span,
    },
    /// `let name = expr` — writes a flow variable.
    Let(LetBinding),
    /// `print expr, ...` / `println ...` / `printf fmt, ...`
    Print {
        kind: PrintKind,
        args: Vec<Expr>,
        span: Span,
    },
    /// A bare expression, evaluated for effect (or, realistically, by
    /// mistake — the value is discarded).
    Expr(Expr),
}

impl HookStmt {
    pub fn span(&self) -> Span {
        match self {
            HookStmt::Assign { span, .. } | HookStmt::Print { span, .. } => *span,
            HookStmt::Let(l) => l.span,
            HookStmt::Expr(e) => e.span,
        }
    }
}

/// Root of a hook assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum LValueRoot {
    /// `req` — the outgoing request object.
    Req,
    /// `res` — rejected by the compiler, but representable so the
    /// diagnostic points at the right place.
    Res,
    /// `$` — alias for the request object.
    Dollar,
    /// A plain identifier: writes a flow variable.
    Var(String),
}

/// One postfix step of an assignment target.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessStep {
    Field { name: String, span: Span },
    Index(Expr),
}

/// A hook assignment target: root plus field/index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub root: LValueRoot,
    pub steps: Vec<AccessStep>,
    pub span: Span,
}

/// `name` or `name : alias` inside a flow chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStep {
    pub request: Ident,
    pub alias: Option<Ident>,
    pub span: Span,
}

impl FlowStep {
    /// The name the step's result is bound under: alias if present,
    /// else the request name.
    pub fn binding(&self) -> &str {
        match &self.alias {
            Some(a) => &a.name,
            None => &self.request.name,
        }
    }

    /// The binding form used in diagnostics: `name` or `name:alias`.
    pub fn binding_label(&self) -> String {
        match &self.alias {
            Some(a) => format!("{}:{}", self.request.name, a.name),
            None => self.request.name.clone(),
        }
    }
}

/// `flow "name":` with prelude lets, the chain, and post-chain asserts.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDecl {
    pub name: String,
    pub name_span: Span,
    pub lets: Vec<LetBinding>,
    pub steps: Vec<FlowStep>,
    pub asserts: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
    /// `~` — left string matches right regex.
    Match,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Operator text, for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Contains => "contains",
            BinaryOp::Match => "~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// An object literal key: identifier or string.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectKey {
    pub name: String,
    pub span: Span,
}

/// A spanned expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    /// Visits this expression and every sub-expression, depth-first,
    /// parents before children. The analysis passes use this for free
    /// identifier and template-placeholder collection.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Ident(_)
            | ExprKind::RequestRoot
            | ExprKind::ResponseRoot => {}
            ExprKind::Array(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            ExprKind::Object(pairs) => {
                for (_, value) in pairs {
                    value.walk(f);
                }
            }
            ExprKind::Paren(inner) => inner.walk(f),
            ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Field { object, .. } => object.walk(f),
            ExprKind::Index { object, index } => {
                object.walk(f);
                index.walk(f);
            }
            ExprKind::Call { callee, args } => {
                callee.walk(f);
                for arg in args {
                    arg.walk(f);
                }
            }
        }
    }
}

impl HookStmt {
    /// Visits every expression the statement *reads*.
    ///
    /// For assignments that includes the target root when it is a read:
    /// `req`/`res`/`$` roots always name an existing object, and a
    /// variable root with field/index steps mutates a value that must
    /// already exist. A plain `name = expr` target only defines `name`
    /// and is not visited. Index expressions in the target's steps and
    /// the right-hand side are always visited.
    pub fn walk_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            HookStmt::Assign { target, value, .. } => {
                let root_read = match &target.root {
                    LValueRoot::Req => Some(ExprKind::Ident("req".to_string())),
                    LValueRoot::Res => Some(ExprKind::Ident("res".to_string())),
                    LValueRoot::Dollar => Some(ExprKind::RequestRoot),
                    LValueRoot::Var(name) if !target.steps.is_empty() => {
                        Some(ExprKind::Ident(name.clone()))
                    }
                    LValueRoot::Var(_) => None,
                };
                if let Some(kind) = root_read {
                    f(&Expr::new(kind, target.span));
                }
                for step in &target.steps {
                    if let AccessStep::Index(index) = step {
                        index.walk(f);
                    }
                }
                value.walk(f);
            }
            HookStmt::Let(binding) => binding.value.walk(f),
            HookStmt::Print { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            HookStmt::Expr(expr) => expr.walk(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Expr>),
    /// Ordered key/value pairs; duplicate keys are preserved here and
    /// resolved last-wins at evaluation.
    Object(Vec<(ObjectKey, Expr)>),
    Ident(String),
    /// `$` — the current request object.
    RequestRoot,
    /// `#` — the decoded response value.
    ResponseRoot,
    Paren(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Field {
        object: Box<Expr>,
        name: String,
        name_span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}
