//! Recursive-descent parser for pipetest programs.
//!
//! Declarations and blocks are parsed by hand-written descent; expressions
//! go through the Pratt parser in [`expr`]; hook bodies through [`hook`].
//!
//! # Error Recovery
//!
//! The parser never panics on malformed input. Every fault records a
//! diagnostic and resynchronizes:
//!
//! - line-level errors skip to the next `Newline` or `Dedent`;
//! - top-level errors skip to the next top-level keyword.
//!
//! The result is a best-effort [`Program`]; the compiler runs all its
//! passes over it and plan synthesis is gated on a clean diagnostic set.

mod expr;
mod hook;

use crate::ast::*;
use crate::lexer;
use pipetest_base::{Code, Diagnostic, Span, Token, TokenKind};

pub(crate) type ParseResult<T> = Result<T, ()>;

/// Lexes and parses one module. Returned diagnostics contain the lexer's
/// faults followed by the parser's, in emission order.
pub fn parse(path: &str, source: &str) -> (Program, Vec<Diagnostic>) {
    let (tokens, lex_diags) = lexer::lex(path, source);
    let mut parser = Parser::new(path, tokens);
    let program = parser.parse_program();
    let mut diags = lex_diags;
    diags.extend(parser.diags);
    (program, diags)
}

pub(crate) struct Parser {
    path: String,
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) diags: Vec<Diagnostic>,
}

impl Parser {
    fn new(path: &str, tokens: Vec<Token>) -> Self {
        Parser {
            path: path.to_string(),
            tokens,
            pos: 0,
            diags: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Span of the most recently consumed token.
    pub(crate) fn prev_span(&self) -> Span {
        if self.pos == 0 {
            Span::NONE
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    pub(crate) fn error(&mut self, code: Code, message: impl Into<String>, span: Span) {
        self.diags
            .push(Diagnostic::error(code, message, &self.path, span));
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let span = self.peek().span;
            let found = self.describe_current();
            self.error(
                Code::ParseUnexpectedToken,
                format!("expected {}, found {}", what, found),
                span,
            );
            Err(())
        }
    }

    fn describe_current(&self) -> String {
        let t = self.peek();
        match t.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            _ if t.text.is_empty() => format!("{:?}", t.kind),
            _ => format!("'{}'", t.text),
        }
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    /// Skips to just past the next `Newline` (or stops before
    /// `Dedent`/`Eof`). Used after line-level errors.
    pub(crate) fn sync_line(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::Dedent => return,
                TokenKind::Newline => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skips to the next plausible top-level statement start.
    fn sync_top_level(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Newline | TokenKind::Dedent | TokenKind::Indent => {
                    self.advance();
                    if TokenKind::TOP_LEVEL_STARTERS.contains(&self.kind()) {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    /// Consumes the end of a statement line. `Dedent`/`Eof` terminate the
    /// line without being consumed.
    pub(crate) fn end_line(&mut self) {
        match self.kind() {
            TokenKind::Newline => {
                self.advance();
            }
            TokenKind::Dedent | TokenKind::Eof => {}
            _ => {
                let span = self.peek().span;
                let found = self.describe_current();
                self.error(
                    Code::ParseUnexpectedToken,
                    format!("expected end of line, found {}", found),
                    span,
                );
                self.sync_line();
            }
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            // Stray layout tokens can be left behind by recovery.
            while matches!(self.kind(), TokenKind::Indent | TokenKind::Dedent) {
                self.advance();
                self.skip_newlines();
            }
            if self.check(TokenKind::Eof) {
                break;
            }
            match self.parse_top_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => self.sync_top_level(),
            }
        }
        Program { stmts }
    }

    fn parse_top_stmt(&mut self) -> ParseResult<Stmt> {
        match self.kind() {
            TokenKind::KwBase => {
                let start = self.advance().span;
                let url = self.expect(TokenKind::Str, "a string after 'base'")?;
                self.end_line();
                Ok(Stmt::Base {
                    url: url.text.clone(),
                    span: start.merge(url.span),
                })
            }
            TokenKind::KwTimeout => {
                let start = self.advance().span;
                let dur = self.expect(TokenKind::Duration, "a duration after 'timeout'")?;
                self.end_line();
                Ok(Stmt::Timeout {
                    millis: duration_millis(&dur.text),
                    span: start.merge(dur.span),
                })
            }
            TokenKind::KwImport => {
                let start = self.advance().span;
                let path = self.expect(TokenKind::Str, "a string after 'import'")?;
                self.end_line();
                Ok(Stmt::Import {
                    path: path.text.clone(),
                    span: start.merge(path.span),
                })
            }
            TokenKind::KwLet => {
                let binding = self.parse_let_binding()?;
                self.end_line();
                Ok(Stmt::Let(binding))
            }
            TokenKind::KwReq => self.parse_req().map(Stmt::Req),
            TokenKind::KwFlow => self.parse_flow().map(Stmt::Flow),
            _ => {
                let span = self.peek().span;
                let found = self.describe_current();
                self.error(
                    Code::ParseUnexpectedToken,
                    format!("expected a top-level declaration, found {}", found),
                    span,
                );
                Err(())
            }
        }
    }

    /// `let name = expr` — shared by every scope that allows lets.
    pub(crate) fn parse_let_binding(&mut self) -> ParseResult<LetBinding> {
        let start = self.expect(TokenKind::KwLet, "'let'")?.span;
        let name = self.parse_ident("a variable name")?;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expr()?;
        let span = start.merge(value.span);
        Ok(LetBinding { name, value, span })
    }

    pub(crate) fn parse_ident(&mut self, what: &str) -> ParseResult<Ident> {
        let token = self.expect(TokenKind::Ident, what)?;
        Ok(Ident {
            name: token.text.clone(),
            span: token.span,
        })
    }

    // ------------------------------------------------------------------
    // Request blocks
    // ------------------------------------------------------------------

    fn parse_req(&mut self) -> ParseResult<ReqDecl> {
        let start = self.expect(TokenKind::KwReq, "'req'")?.span;
        let name = self.parse_ident("a request name")?;

        let parent = if self.eat(TokenKind::LParen).is_some() {
            let parent = self.parse_ident("a parent request name")?;
            self.expect(TokenKind::RParen, "')'")?;
            Some(parent)
        } else {
            None
        };

        self.expect(TokenKind::Colon, "':'")?;
        self.end_line();

        let mut lines = Vec::new();
        if self.eat(TokenKind::Indent).is_some() {
            loop {
                self.skip_newlines();
                if matches!(self.kind(), TokenKind::Dedent | TokenKind::Eof) {
                    break;
                }
                match self.parse_req_line() {
                    Ok(line) => lines.push(line),
                    Err(()) => self.sync_line(),
                }
            }
            self.eat(TokenKind::Dedent);
        }

        let span = start.merge(self.prev_span());
        Ok(ReqDecl {
            name,
            parent,
            lines,
            span,
        })
    }

    fn parse_req_line(&mut self) -> ParseResult<ReqLine> {
        match self.kind() {
            TokenKind::HttpMethod(method) => {
                let start = self.advance().span;
                let path = self.expect(TokenKind::Path, "a request path")?;
                self.end_line();
                Ok(ReqLine::Http {
                    method,
                    path: path.text.clone(),
                    path_span: path.span,
                    span: start.merge(path.span),
                })
            }
            TokenKind::KwJson => {
                let start = self.advance().span;
                let value = self.parse_expr()?;
                self.end_line();
                let span = start.merge(value.span);
                Ok(ReqLine::Json { value, span })
            }
            TokenKind::KwHeader => {
                let start = self.advance().span;
                let key = self.expect(TokenKind::BareKey, "a header name")?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_expr()?;
                self.end_line();
                let span = start.merge(value.span);
                Ok(ReqLine::Header {
                    key: key.text.clone(),
                    key_span: key.span,
                    value,
                    span,
                })
            }
            TokenKind::KwQuery => {
                let start = self.advance().span;
                let key = self.expect(TokenKind::BareKey, "a query key")?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_expr()?;
                self.end_line();
                let span = start.merge(value.span);
                Ok(ReqLine::Query {
                    key: key.text.clone(),
                    key_span: key.span,
                    value,
                    span,
                })
            }
            TokenKind::KwAuth => {
                let start = self.advance().span;
                self.expect(TokenKind::KwBearer, "'bearer'")?;
                let value = self.parse_expr()?;
                self.end_line();
                let span = start.merge(value.span);
                Ok(ReqLine::Auth { value, span })
            }
            TokenKind::KwPre => {
                let start = self.advance().span;
                self.expect(TokenKind::KwHook, "'hook'")?;
                let block = self.parse_hook_block(start)?;
                self.end_line();
                Ok(ReqLine::PreHook(block))
            }
            TokenKind::KwPost => {
                let start = self.advance().span;
                self.expect(TokenKind::KwHook, "'hook'")?;
                let block = self.parse_hook_block(start)?;
                self.end_line();
                Ok(ReqLine::PostHook(block))
            }
            TokenKind::Question => {
                let start = self.advance().span;
                let expr = self.parse_expr()?;
                self.end_line();
                let span = start.merge(expr.span);
                Ok(ReqLine::Assert { expr, span })
            }
            TokenKind::KwLet => {
                let binding = self.parse_let_binding()?;
                self.end_line();
                Ok(ReqLine::Let(binding))
            }
            _ => {
                let span = self.peek().span;
                let found = self.describe_current();
                self.error(
                    Code::ParseUnexpectedToken,
                    format!("expected a request line, found {}", found),
                    span,
                );
                Err(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Flow blocks
    // ------------------------------------------------------------------

    /// Flow bodies have three zones in order: prelude lets, exactly one
    /// chain line, post-chain assertions. Violations record
    /// `E_PARSE_FLOW_SHAPE` and skip the offending line.
    fn parse_flow(&mut self) -> ParseResult<FlowDecl> {
        let start = self.expect(TokenKind::KwFlow, "'flow'")?.span;
        let name = self.expect(TokenKind::Str, "a flow name string")?;
        self.expect(TokenKind::Colon, "':'")?;
        self.end_line();

        let mut lets = Vec::new();
        let mut steps = Vec::new();
        let mut asserts = Vec::new();
        let mut saw_chain = false;

        if self.eat(TokenKind::Indent).is_some() {
            loop {
                self.skip_newlines();
                if matches!(self.kind(), TokenKind::Dedent | TokenKind::Eof) {
                    break;
                }
                match self.kind() {
                    TokenKind::KwLet if !saw_chain => match self.parse_let_binding() {
                        Ok(binding) => {
                            lets.push(binding);
                            self.end_line();
                        }
                        Err(()) => self.sync_line(),
                    },
                    TokenKind::KwLet => {
                        let span = self.peek().span;
                        self.error(
                            Code::ParseFlowShape,
                            "prelude 'let' lines must come before the chain",
                            span,
                        );
                        self.sync_line();
                    }
                    TokenKind::Ident if !saw_chain => {
                        saw_chain = true;
                        match self.parse_chain() {
                            Ok(chain) => steps = chain,
                            Err(()) => self.sync_line(),
                        }
                    }
                    TokenKind::Ident => {
                        let span = self.peek().span;
                        self.error(
                            Code::ParseFlowShape,
                            "a flow has exactly one chain line",
                            span,
                        );
                        self.sync_line();
                    }
                    TokenKind::Question if saw_chain => {
                        self.advance();
                        match self.parse_expr() {
                            Ok(expr) => {
                                asserts.push(expr);
                                self.end_line();
                            }
                            Err(()) => self.sync_line(),
                        }
                    }
                    TokenKind::Question => {
                        let span = self.peek().span;
                        self.error(
                            Code::ParseFlowShape,
                            "assertions must follow the chain line",
                            span,
                        );
                        self.sync_line();
                    }
                    _ => {
                        let span = self.peek().span;
                        let found = self.describe_current();
                        self.error(
                            Code::ParseFlowShape,
                            format!("unexpected {} in flow body", found),
                            span,
                        );
                        self.sync_line();
                    }
                }
            }
            self.eat(TokenKind::Dedent);
        }

        let span = start.merge(self.prev_span());
        Ok(FlowDecl {
            name: name.text.clone(),
            name_span: name.span,
            lets,
            steps,
            asserts,
            span,
        })
    }

    /// `step (-> step)*` where step is `ident [: ident]`. Single-step
    /// chains are legal.
    fn parse_chain(&mut self) -> ParseResult<Vec<FlowStep>> {
        let mut steps = vec![self.parse_step()?];
        while self.eat(TokenKind::Arrow).is_some() {
            steps.push(self.parse_step()?);
        }
        self.end_line();
        Ok(steps)
    }

    fn parse_step(&mut self) -> ParseResult<FlowStep> {
        let request = self.parse_ident("a request name")?;
        let alias = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_ident("an alias name")?)
        } else {
            None
        };
        let span = match &alias {
            Some(a) => request.span.merge(a.span),
            None => request.span,
        };
        Ok(FlowStep {
            request,
            alias,
            span,
        })
    }
}

/// Converts a duration literal (`500ms`, `8s`, `2m`, `1h`, `1d`) to
/// milliseconds. The lexer guarantees the shape.
fn duration_millis(text: &str) -> f64 {
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let value: f64 = text[..split].parse().unwrap_or(0.0);
    let factor = match &text[split..] {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => 1.0,
    };
    value * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetest_base::Method;

    fn parse_clean(src: &str) -> Program {
        let (program, diags) = parse("test.pt", src);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        program
    }

    #[test]
    fn duration_conversion() {
        assert_eq!(duration_millis("500ms"), 500.0);
        assert_eq!(duration_millis("8s"), 8_000.0);
        assert_eq!(duration_millis("2m"), 120_000.0);
        assert_eq!(duration_millis("1h"), 3_600_000.0);
        assert_eq!(duration_millis("1d"), 86_400_000.0);
        assert_eq!(duration_millis("1.5s"), 1_500.0);
    }

    #[test]
    fn settings_and_import_parse() {
        let program = parse_clean("base \"https://h.test\"\ntimeout 5s\nimport \"./auth.pt\"\n");
        assert_eq!(program.stmts.len(), 3);
        assert!(matches!(&program.stmts[0], Stmt::Base { url, .. } if url == "https://h.test"));
        assert!(matches!(&program.stmts[1], Stmt::Timeout { millis, .. } if *millis == 5_000.0));
        assert!(matches!(&program.stmts[2], Stmt::Import { path, .. } if path == "./auth.pt"));
    }

    #[test]
    fn request_block_collects_lines_in_order() {
        let src = "req ping:\n\tGET /get\n\theader X-A = \"1\"\n\t? status == 200\n\tlet t = 1\n";
        let program = parse_clean(src);
        let Stmt::Req(req) = &program.stmts[0] else {
            panic!("expected req");
        };
        assert_eq!(req.name.name, "ping");
        assert!(req.parent.is_none());
        assert_eq!(req.lines.len(), 4);
        assert!(matches!(
            &req.lines[0],
            ReqLine::Http { method: Method::Get, path, .. } if path == "/get"
        ));
        assert!(matches!(&req.lines[1], ReqLine::Header { key, .. } if key == "X-A"));
        assert!(matches!(&req.lines[2], ReqLine::Assert { .. }));
        assert!(matches!(&req.lines[3], ReqLine::Let(_)));
    }

    #[test]
    fn request_parent_parses() {
        let program = parse_clean("req child(parent):\n\tGET /x\n");
        let Stmt::Req(req) = &program.stmts[0] else {
            panic!("expected req");
        };
        assert_eq!(req.parent.as_ref().unwrap().name, "parent");
    }

    #[test]
    fn flow_three_zones_parse() {
        let src = "flow \"f\":\n\tlet a = 1\n\tfirst -> second : alias\n\t? alias.res.ok\n";
        let program = parse_clean(src);
        let Stmt::Flow(flow) = &program.stmts[0] else {
            panic!("expected flow");
        };
        assert_eq!(flow.name, "f");
        assert_eq!(flow.lets.len(), 1);
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.steps[0].binding(), "first");
        assert_eq!(flow.steps[1].binding(), "alias");
        assert_eq!(flow.asserts.len(), 1);
    }

    #[test]
    fn single_step_chain_is_accepted() {
        let program = parse_clean("flow \"s\":\n\tping\n");
        let Stmt::Flow(flow) = &program.stmts[0] else {
            panic!("expected flow");
        };
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn let_after_chain_is_a_shape_error() {
        let (_, diags) = parse("t.pt", "flow \"f\":\n\tping\n\tlet a = 1\n");
        assert!(diags.iter().any(|d| d.code == Code::ParseFlowShape));
    }

    #[test]
    fn second_chain_line_is_a_shape_error() {
        let (program, diags) = parse("t.pt", "flow \"f\":\n\tping\n\tpong\n");
        assert!(diags.iter().any(|d| d.code == Code::ParseFlowShape));
        // The first chain survives.
        let Stmt::Flow(flow) = &program.stmts[0] else {
            panic!("expected flow");
        };
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn assertion_before_chain_is_a_shape_error() {
        let (_, diags) = parse("t.pt", "flow \"f\":\n\t? status == 200\n\tping\n");
        assert!(diags.iter().any(|d| d.code == Code::ParseFlowShape));
    }

    #[test]
    fn bad_top_level_recovers_to_next_declaration() {
        let (program, diags) = parse("t.pt", "42\nreq ping:\n\tGET /x\n");
        assert!(diags.iter().any(|d| d.code == Code::ParseUnexpectedToken));
        assert!(matches!(&program.stmts[0], Stmt::Req(_)));
    }

    #[test]
    fn bad_request_line_recovers_within_block() {
        let (program, diags) = parse("t.pt", "req r:\n\tGET /x\n\t-> nonsense\n\t? status == 200\n");
        assert!(!diags.is_empty());
        let Stmt::Req(req) = &program.stmts[0] else {
            panic!("expected req");
        };
        // HTTP line and assertion both survived the bad middle line.
        assert_eq!(req.lines.len(), 2);
    }

    #[test]
    fn hook_blocks_parse_on_request_lines() {
        let src = "req r:\n\tGET /x\n\tpre hook { print \"starting\" }\n\tpost hook { seen = #.value }\n";
        let program = parse_clean(src);
        let Stmt::Req(req) = &program.stmts[0] else {
            panic!("expected req");
        };
        assert!(matches!(&req.lines[1], ReqLine::PreHook(_)));
        assert!(matches!(&req.lines[2], ReqLine::PostHook(_)));
    }
}
