//! The canonical diagnostic record and its deterministic ordering.
//!
//! Every stage of the pipeline (lexer, parser, import graph, semantic
//! passes, evaluator) reports failures as [`Diagnostic`] values pushed into
//! an append-only vector. At stage boundaries the vector is passed through
//! [`sort_dedupe`], which yields a byte-stable order across runs — the
//! external contract CI consumers rely on.
//!
//! # Code Namespaces
//!
//! | Namespace | Stage |
//! |-----------|-------|
//! | `E_PARSE_*` | lexer and parser |
//! | `E_IMPORT_*` | module graph |
//! | `E_SEM_*` | semantic analysis |
//! | `E_RUNTIME_*` | runtime faults |
//! | `E_ASSERT_*` | assertion failures |
//!
//! Codes are stable identifiers; renaming one is a breaking change.

use crate::span::Span;
use serde::Serialize;
use std::fmt;

/// Stable diagnostic codes.
///
/// The serialized form is the SCREAMING_SNAKE string returned by
/// [`Code::as_str`]; ordering follows that string so that sorted output
/// matches what a consumer sorting on the serialized field would produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    // Lexer / parser
    ParseTab,
    ParseIndent,
    ParseDedent,
    ParseUnterminatedString,
    ParseUnterminatedRaw,
    ParseUnterminatedHook,
    ParseUnterminatedDelim,
    ParseUnmatchedBrace,
    ParseUnexpectedChar,
    ParseUnexpectedToken,
    ParseExpectedExpr,
    ParseBadLvalue,
    ParseFlowShape,

    // Module graph
    ImportNotFound,
    ImportCycle,
    ImportFlowInImportedFile,

    // Semantic analysis
    SemDuplicateReqName,
    SemDuplicateFlowName,
    SemUnknownParentReq,
    SemInheritanceCycle,
    SemReqMissingHttpLine,
    SemReqMultipleHttpLines,
    SemDuplicatePreHook,
    SemDuplicatePostHook,
    SemMultipleBodies,
    SemAssignToResForbidden,
    SemPreHookReferencesRes,
    SemFlowMissingChain,
    SemUnknownReqInFlow,
    SemDuplicateFlowBinding,
    SemUndefinedVariable,
    SemMissingPathParamVar,
    SemUnknownFlowBinding,

    // Runtime
    RuntimeTransport,
    RuntimeExpression,
    RuntimeHook,
    RuntimeMissingVariable,
    RuntimeMissingPathParam,
    RuntimeUnknownRequest,

    // Assertions
    AssertExpectedTrue,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::ParseTab => "E_PARSE_TAB",
            Code::ParseIndent => "E_PARSE_INDENT",
            Code::ParseDedent => "E_PARSE_DEDENT",
            Code::ParseUnterminatedString => "E_PARSE_UNTERMINATED_STRING",
            Code::ParseUnterminatedRaw => "E_PARSE_UNTERMINATED_RAW",
            Code::ParseUnterminatedHook => "E_PARSE_UNTERMINATED_HOOK",
            Code::ParseUnterminatedDelim => "E_PARSE_UNTERMINATED_DELIM",
            Code::ParseUnmatchedBrace => "E_PARSE_UNMATCHED_BRACE",
            Code::ParseUnexpectedChar => "E_PARSE_UNEXPECTED_CHAR",
            Code::ParseUnexpectedToken => "E_PARSE_UNEXPECTED_TOKEN",
            Code::ParseExpectedExpr => "E_PARSE_EXPECTED_EXPR",
            Code::ParseBadLvalue => "E_PARSE_BAD_LVALUE",
            Code::ParseFlowShape => "E_PARSE_FLOW_SHAPE",
            Code::ImportNotFound => "E_IMPORT_NOT_FOUND",
            Code::ImportCycle => "E_IMPORT_CYCLE",
            Code::ImportFlowInImportedFile => "E_IMPORT_FLOW_IN_IMPORTED_FILE",
            Code::SemDuplicateReqName => "E_SEM_DUPLICATE_REQ_NAME",
            Code::SemDuplicateFlowName => "E_SEM_DUPLICATE_FLOW_NAME",
            Code::SemUnknownParentReq => "E_SEM_UNKNOWN_PARENT_REQ",
            Code::SemInheritanceCycle => "E_SEM_INHERITANCE_CYCLE",
            Code::SemReqMissingHttpLine => "E_SEM_REQ_MISSING_HTTP_LINE",
            Code::SemReqMultipleHttpLines => "E_SEM_REQ_MULTIPLE_HTTP_LINES",
            Code::SemDuplicatePreHook => "E_SEM_DUPLICATE_PRE_HOOK",
            Code::SemDuplicatePostHook => "E_SEM_DUPLICATE_POST_HOOK",
            Code::SemMultipleBodies => "E_SEM_MULTIPLE_BODIES",
            Code::SemAssignToResForbidden => "E_SEM_ASSIGN_TO_RES_FORBIDDEN",
            Code::SemPreHookReferencesRes => "E_SEM_PRE_HOOK_REFERENCES_RES",
            Code::SemFlowMissingChain => "E_SEM_FLOW_MISSING_CHAIN",
            Code::SemUnknownReqInFlow => "E_SEM_UNKNOWN_REQ_IN_FLOW",
            Code::SemDuplicateFlowBinding => "E_SEM_DUPLICATE_FLOW_BINDING",
            Code::SemUndefinedVariable => "E_SEM_UNDEFINED_VARIABLE",
            Code::SemMissingPathParamVar => "E_SEM_MISSING_PATH_PARAM_VAR",
            Code::SemUnknownFlowBinding => "E_SEM_UNKNOWN_FLOW_BINDING",
            Code::RuntimeTransport => "E_RUNTIME_TRANSPORT",
            Code::RuntimeExpression => "E_RUNTIME_EXPRESSION",
            Code::RuntimeHook => "E_RUNTIME_HOOK",
            Code::RuntimeMissingVariable => "E_RUNTIME_MISSING_VARIABLE",
            Code::RuntimeMissingPathParam => "E_RUNTIME_MISSING_PATH_PARAM",
            Code::RuntimeUnknownRequest => "E_RUNTIME_UNKNOWN_REQUEST",
            Code::AssertExpectedTrue => "E_ASSERT_EXPECTED_TRUE",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd for Code {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Code {
    /// Codes order by their stable string form, not declaration order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Serialize for Code {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Diagnostic severity. The pipeline currently only emits errors; the
/// field exists so the external record stays stable if warnings arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// A secondary location attached to a diagnostic, e.g. the first
/// declaration site of a duplicated name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Related {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// The canonical error record (stable external contract).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Related>,
    /// Flow name, when the diagnostic arose inside a flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    /// Request context in binding form: `name` or `name:alias`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic anchored at the start of `span`.
    pub fn error(code: Code, message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            file: file.into(),
            line: span.start.line,
            column: span.start.column,
            hint: String::new(),
            related: None,
            flow: None,
            request: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn with_related(mut self, file: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        self.related = Some(Related {
            file: file.into(),
            line: span.start.line,
            column: span.start.column,
            message: message.into(),
        });
        self
    }

    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }

    /// The deterministic sort/dedupe key: `(file, line, column, code,
    /// message, related locator, flow, request)`.
    fn sort_key(&self) -> impl Ord + '_ {
        let related = self.related.as_ref().map(|r| {
            (r.file.as_str(), r.line, r.column, r.message.as_str())
        });
        (
            self.file.as_str(),
            self.line,
            self.column,
            self.code,
            self.message.as_str(),
            related,
            self.flow.as_deref(),
            self.request.as_deref(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, self.code, self.message
        )?;
        if !self.hint.is_empty() {
            write!(f, " ({})", self.hint)?;
        }
        Ok(())
    }
}

/// Sorts diagnostics by the canonical key and drops exact duplicates,
/// preserving the first occurrence. Applied at stage boundaries; the
/// result is bitwise identical across repeated runs on the same input.
pub fn sort_dedupe(mut diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diags.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    diags.dedup_by(|a, b| a.sort_key() == b.sort_key());
    diags
}
