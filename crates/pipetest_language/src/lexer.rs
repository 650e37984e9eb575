//! Layout-aware lexer for pipetest source.
//!
//! The lexer turns source text into a flat token stream, handling the
//! concerns the parser should never see:
//!
//! - **Indentation**: tabs-only leading indentation outside hooks and
//!   expression groupings, tracked with an indent stack that emits
//!   `Indent`/`Dedent` tokens (one `Dedent` per popped level).
//! - **Significant newlines**: `Newline` is emitted only when no paren,
//!   bracket, or expression brace is open. Hook bodies keep their
//!   newlines (statement separators) but suppress `Indent`/`Dedent`.
//! - **Dual brace modes**: a `{` directly after `pre hook` / `post hook`
//!   opens a statement-scoped hook body (`LBraceHook`); every other `{`
//!   is an expression brace (`LBrace`). Classification happens here so
//!   the parser never disambiguates.
//! - **Paths**: the run of non-whitespace after an HTTP method keyword
//!   is one `Path` token (`:param` segments and `{{var}}` placeholders
//!   stay inside it).
//! - **Bare keys**: after `header`/`query`, a `[A-Za-z0-9_-]+` run lexes
//!   as `BareKey` so header names like `Content-Type` need no quoting.
//!
//! `#` opens a line comment unless immediately followed by `.` or `[`,
//! in which case it is the response-root expression token. All lexical
//! faults are reported as `E_PARSE_*` diagnostics; the lexer always
//! produces a balanced, `Eof`-terminated stream so the parser can run on
//! malformed input.

use pipetest_base::{Code, Diagnostic, Pos, Span, Token, TokenKind};

/// Tokenizes `source`, reporting lexical faults against `path`.
///
/// Guarantees: token spans are non-decreasing by start offset, the stream
/// ends with exactly one `Eof`, and `Indent`/`Dedent` are balanced.
pub fn lex(path: &str, source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(path, source).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceKind {
    Hook,
    Expr,
}

struct Lexer<'a> {
    path: &'a str,
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    at_line_start: bool,
    /// Previous logical line ended with `:`.
    expect_indent: bool,
    indent_stack: Vec<usize>,
    braces: Vec<BraceKind>,
    paren_depth: usize,
    bracket_depth: usize,
    brace_expr_depth: usize,
    hook_depth: usize,
    /// The previous token was an HTTP method keyword (path scanning).
    after_method: bool,
    /// The previous token was `header` or `query` (bare-key scanning).
    after_key: bool,
    /// The current physical line carried at least one significant token.
    has_line_content: bool,
    /// Kind of the last non-layout token, reset at significant newlines.
    last_sig: Option<TokenKind>,
    tokens: Vec<Token>,
    diags: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn new(path: &'a str, src: &'a str) -> Self {
        Lexer {
            path,
            src,
            pos: 0,
            line: 1,
            col: 1,
            at_line_start: true,
            expect_indent: false,
            indent_stack: vec![0],
            braces: Vec::new(),
            paren_depth: 0,
            bracket_depth: 0,
            brace_expr_depth: 0,
            hook_depth: 0,
            after_method: false,
            after_key: false,
            has_line_content: false,
            last_sig: None,
            tokens: Vec::new(),
            diags: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Character access
    // ------------------------------------------------------------------

    fn cur(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    /// The character after the current one.
    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    /// Consumes one non-newline character.
    fn bump(&mut self) {
        if let Some(c) = self.cur() {
            debug_assert!(c != '\n' && c != '\r');
            self.pos += c.len_utf8();
            self.col += 1;
        }
    }

    /// Consumes `\n`, `\r\n`, or a lone `\r` as one line terminator.
    fn consume_newline(&mut self) {
        match self.cur() {
            Some('\r') => {
                self.pos += 1;
                if self.cur() == Some('\n') {
                    self.pos += 1;
                }
            }
            Some('\n') => self.pos += 1,
            _ => return,
        }
        self.line += 1;
        self.col = 1;
    }

    fn here(&self) -> Pos {
        Pos::new(self.pos, self.line, self.col)
    }

    fn group_depth(&self) -> usize {
        self.paren_depth + self.bracket_depth + self.brace_expr_depth
    }

    // ------------------------------------------------------------------
    // Token and diagnostic emission
    // ------------------------------------------------------------------

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, start: Pos) {
        self.tokens.push(Token::new(kind, text, Span::new(start, self.here())));
        if !kind.is_layout() {
            self.has_line_content = true;
            self.last_sig = Some(kind);
        }
    }

    /// Layout tokens anchor at a single position.
    fn push_layout(&mut self, kind: TokenKind, at: Pos) {
        self.tokens.push(Token::new(kind, "", Span::new(at, at)));
    }

    fn error(&mut self, code: Code, message: impl Into<String>, span: Span) {
        self.diags.push(Diagnostic::error(code, message, self.path, span));
    }

    fn error_hint(&mut self, code: Code, message: impl Into<String>, span: Span, hint: &str) {
        self.diags.push(Diagnostic::error(code, message, self.path, span).with_hint(hint));
    }

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------

    fn run(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        loop {
            if self.at_line_start && self.hook_depth == 0 && self.group_depth() == 0 {
                if !self.handle_line_start() {
                    break;
                }
                continue;
            }

            while matches!(self.cur(), Some(' ') | Some('\t')) {
                self.bump();
            }

            let Some(c) = self.cur() else { break };

            if c == '\n' || c == '\r' {
                self.handle_newline();
                continue;
            }

            if self.after_method {
                self.after_method = false;
                if c != '#' {
                    self.scan_path();
                    continue;
                }
            }
            if self.after_key {
                self.after_key = false;
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    self.scan_bare_key();
                    continue;
                }
            }

            match c {
                '#' => self.handle_hash(),
                '"' => self.scan_string(),
                '`' => self.scan_raw_string(),
                _ if c.is_ascii_digit() => self.scan_number(),
                _ if c.is_ascii_alphabetic() || c == '_' => self.scan_word(),
                _ => self.scan_operator(),
            }
        }
        self.finish()
    }

    fn finish(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let end = self.here();

        if self.has_line_content && self.group_depth() == 0 {
            self.push_layout(TokenKind::Newline, end);
        }
        if self.hook_depth > 0 {
            self.error_hint(
                Code::ParseUnterminatedHook,
                "hook body is not closed at end of file",
                Span::new(end, end),
                "add the missing '}'",
            );
        }
        if self.group_depth() > 0 {
            self.error_hint(
                Code::ParseUnterminatedDelim,
                "unclosed delimiter at end of file",
                Span::new(end, end),
                "check for a missing ')', ']' or '}'",
            );
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push_layout(TokenKind::Dedent, end);
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
        (self.tokens, self.diags)
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Processes leading indentation at the start of a logical line,
    /// skipping blank and comment-only lines. Returns `false` at EOF.
    fn handle_line_start(&mut self) -> bool {
        loop {
            let indent_start = self.here();
            let mut indent = 0usize;
            let mut space_start: Option<Pos> = None;

            loop {
                match self.cur() {
                    Some('\t') => {
                        self.bump();
                        indent += 1;
                    }
                    Some(' ') => {
                        if space_start.is_none() {
                            space_start = Some(self.here());
                        }
                        self.bump();
                    }
                    _ => break,
                }
            }

            match self.cur() {
                None => {
                    self.at_line_start = false;
                    return false;
                }
                Some('\n') | Some('\r') => {
                    // Blank line: no indentation significance.
                    self.consume_newline();
                    continue;
                }
                Some('#') if !matches!(self.peek2(), Some('.') | Some('[')) => {
                    // Comment-only line.
                    while !matches!(self.cur(), None | Some('\n') | Some('\r')) {
                        self.bump();
                    }
                    continue;
                }
                _ => {}
            }

            if let Some(sp) = space_start {
                self.error_hint(
                    Code::ParseTab,
                    "spaces are not allowed in leading indentation",
                    Span::new(sp, self.here()),
                    "indent with tabs",
                );
            }

            let top = *self.indent_stack.last().unwrap_or(&0);
            if self.expect_indent {
                self.expect_indent = false;
                if indent > top {
                    self.indent_stack.push(indent);
                    self.push_layout(TokenKind::Indent, indent_start);
                } else {
                    self.error_hint(
                        Code::ParseIndent,
                        "expected an indented block",
                        Span::new(indent_start, self.here()),
                        "the previous line ends with ':' and requires a deeper indent",
                    );
                    if indent < top {
                        self.pop_dedents(indent, indent_start);
                    }
                }
            } else if indent > top {
                self.error(
                    Code::ParseIndent,
                    "unexpected indentation",
                    Span::new(indent_start, self.here()),
                );
            } else if indent < top {
                self.pop_dedents(indent, indent_start);
            }

            self.at_line_start = false;
            return true;
        }
    }

    fn pop_dedents(&mut self, indent: usize, at: Pos) {
        while self.indent_stack.len() > 1 && *self.indent_stack.last().unwrap() > indent {
            self.indent_stack.pop();
            self.push_layout(TokenKind::Dedent, at);
        }
        if *self.indent_stack.last().unwrap() != indent {
            self.error_hint(
                Code::ParseDedent,
                "dedent does not match any enclosing indentation level",
                Span::new(at, at),
                "align the line with an outer block",
            );
        }
    }

    fn handle_newline(&mut self) {
        let at = self.here();
        self.consume_newline();
        self.after_method = false;
        self.after_key = false;

        if self.group_depth() > 0 {
            // Inside parens/brackets/expression braces a newline is
            // ordinary whitespace.
            return;
        }

        if self.has_line_content {
            self.push_layout(TokenKind::Newline, at);
            self.expect_indent = self.last_sig == Some(TokenKind::Colon);
        }
        self.has_line_content = false;
        self.last_sig = None;

        if self.hook_depth == 0 {
            self.at_line_start = true;
        }
    }

    // ------------------------------------------------------------------
    // Scanners
    // ------------------------------------------------------------------

    fn handle_hash(&mut self) {
        let start = self.here();
        // Inside parens/brackets `#` is always the response root
        // (`jsonpath(#, ...)`); elsewhere only the postfix forms `#.` and
        // `#[` are, and any other `#` opens a comment.
        if self.group_depth() > 0 || matches!(self.peek2(), Some('.') | Some('[')) {
            self.bump();
            self.push(TokenKind::HashRoot, "#", start);
        } else {
            // Comment runs to end of line; the newline is handled by the
            // main loop so layout state stays consistent.
            while !matches!(self.cur(), None | Some('\n') | Some('\r')) {
                self.bump();
            }
        }
    }

    fn scan_word(&mut self) {
        let start = self.here();
        while matches!(self.cur(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let text = &self.src[start.offset..self.pos];
        match TokenKind::keyword(text) {
            Some(kind @ TokenKind::HttpMethod(_)) => {
                self.push(kind, text.to_string(), start);
                self.after_method = true;
            }
            Some(kind) => {
                self.push(kind, text.to_string(), start);
                if matches!(kind, TokenKind::KwHeader | TokenKind::KwQuery) {
                    self.after_key = true;
                }
            }
            None => self.push(TokenKind::Ident, text.to_string(), start),
        }
    }

    /// Raw request path after an HTTP method: everything up to whitespace
    /// or a `#` comment. `:param` segments keep their colon.
    fn scan_path(&mut self) {
        let start = self.here();
        while let Some(c) = self.cur() {
            if c.is_whitespace() || c == '#' {
                break;
            }
            self.bump();
        }
        let text = self.src[start.offset..self.pos].to_string();
        self.push(TokenKind::Path, text, start);
    }

    fn scan_bare_key(&mut self) {
        let start = self.here();
        while matches!(self.cur(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            self.bump();
        }
        let text = self.src[start.offset..self.pos].to_string();
        self.push(TokenKind::BareKey, text, start);
    }

    fn scan_number(&mut self) {
        let start = self.here();
        while matches!(self.cur(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.cur() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.cur(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        // Duration suffix: ms|s|m|h|d not followed by identifier chars.
        let rest = &self.src[self.pos..];
        let ident_continue =
            |c: Option<char>| matches!(c, Some(c) if c.is_ascii_alphanumeric() || c == '_');
        let suffix_len = if rest.starts_with("ms") && !ident_continue(rest.chars().nth(2)) {
            2
        } else if matches!(rest.chars().next(), Some('s') | Some('m') | Some('h') | Some('d'))
            && !ident_continue(rest.chars().nth(1))
        {
            1
        } else {
            0
        };

        if suffix_len > 0 {
            for _ in 0..suffix_len {
                self.bump();
            }
            let text = self.src[start.offset..self.pos].to_string();
            self.push(TokenKind::Duration, text, start);
        } else {
            let text = self.src[start.offset..self.pos].to_string();
            self.push(TokenKind::Number, text, start);
        }
    }

    fn scan_string(&mut self) {
        let start = self.here();
        self.bump(); // opening quote
        let mut value = String::new();

        loop {
            match self.cur() {
                None | Some('\n') | Some('\r') => {
                    let span = Span::new(start, self.here());
                    self.error_hint(
                        Code::ParseUnterminatedString,
                        "unterminated string literal",
                        span,
                        "add the closing '\"'",
                    );
                    break;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.cur() {
                        Some('n') => {
                            value.push('\n');
                            self.bump();
                        }
                        Some('t') => {
                            value.push('\t');
                            self.bump();
                        }
                        Some('\\') => {
                            value.push('\\');
                            self.bump();
                        }
                        Some('"') => {
                            value.push('"');
                            self.bump();
                        }
                        Some('u') => {
                            self.bump();
                            let hex_start = self.pos;
                            for _ in 0..4 {
                                if matches!(self.cur(), Some(c) if c.is_ascii_hexdigit()) {
                                    self.bump();
                                }
                            }
                            let hex = &self.src[hex_start..self.pos];
                            match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                                Some(c) if hex.len() == 4 => value.push(c),
                                _ => {
                                    let span = Span::new(start, self.here());
                                    self.error(
                                        Code::ParseUnexpectedChar,
                                        "invalid \\u escape: expected four hex digits",
                                        span,
                                    );
                                }
                            }
                        }
                        Some(other) => {
                            // Lenient: unknown escapes keep the character.
                            value.push(other);
                            self.bump();
                        }
                        None => {}
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str, value, start);
    }

    fn scan_raw_string(&mut self) {
        let start = self.here();
        self.bump(); // opening backtick
        let mut value = String::new();

        loop {
            match self.cur() {
                None => {
                    let span = Span::new(start, self.here());
                    self.error_hint(
                        Code::ParseUnterminatedRaw,
                        "unterminated raw string",
                        span,
                        "add the closing '`'",
                    );
                    break;
                }
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\n') | Some('\r') => {
                    value.push('\n');
                    self.consume_newline();
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str, value, start);
    }

    fn scan_operator(&mut self) {
        let start = self.here();
        let c = self.cur().unwrap();
        let two = self.peek2();

        let simple = |lexer: &mut Self, kind: TokenKind, len: usize| {
            for _ in 0..len {
                lexer.bump();
            }
            let text = lexer.src[start.offset..lexer.pos].to_string();
            lexer.push(kind, text, start);
        };

        match (c, two) {
            ('=', Some('=')) => simple(self, TokenKind::Eq, 2),
            ('=', _) => simple(self, TokenKind::Assign, 1),
            ('!', Some('=')) => simple(self, TokenKind::NotEq, 2),
            ('!', _) => simple(self, TokenKind::Bang, 1),
            ('<', Some('=')) => simple(self, TokenKind::LtEq, 2),
            ('<', _) => simple(self, TokenKind::Lt, 1),
            ('>', Some('=')) => simple(self, TokenKind::GtEq, 2),
            ('>', _) => simple(self, TokenKind::Gt, 1),
            ('-', Some('>')) => simple(self, TokenKind::Arrow, 2),
            ('-', _) => simple(self, TokenKind::Minus, 1),
            ('+', _) => simple(self, TokenKind::Plus, 1),
            ('*', _) => simple(self, TokenKind::Star, 1),
            ('/', _) => simple(self, TokenKind::Slash, 1),
            ('%', _) => simple(self, TokenKind::Percent, 1),
            ('~', _) => simple(self, TokenKind::Tilde, 1),
            (':', _) => simple(self, TokenKind::Colon, 1),
            (';', _) => simple(self, TokenKind::Semicolon, 1),
            (',', _) => simple(self, TokenKind::Comma, 1),
            ('.', _) => simple(self, TokenKind::Dot, 1),
            ('?', _) => simple(self, TokenKind::Question, 1),
            ('$', _) => simple(self, TokenKind::Dollar, 1),
            ('(', _) => {
                self.paren_depth += 1;
                simple(self, TokenKind::LParen, 1);
            }
            (')', _) => {
                if self.paren_depth == 0 {
                    let span = Span::new(start, start);
                    self.error(Code::ParseUnmatchedBrace, "unmatched ')'", span);
                } else {
                    self.paren_depth -= 1;
                }
                simple(self, TokenKind::RParen, 1);
            }
            ('[', _) => {
                self.bracket_depth += 1;
                simple(self, TokenKind::LBracket, 1);
            }
            (']', _) => {
                if self.bracket_depth == 0 {
                    let span = Span::new(start, start);
                    self.error(Code::ParseUnmatchedBrace, "unmatched ']'", span);
                } else {
                    self.bracket_depth -= 1;
                }
                simple(self, TokenKind::RBracket, 1);
            }
            ('{', _) => {
                if self.is_hook_open() {
                    self.braces.push(BraceKind::Hook);
                    self.hook_depth += 1;
                    simple(self, TokenKind::LBraceHook, 1);
                } else {
                    self.braces.push(BraceKind::Expr);
                    self.brace_expr_depth += 1;
                    simple(self, TokenKind::LBrace, 1);
                }
            }
            ('}', _) => match self.braces.pop() {
                Some(BraceKind::Hook) => {
                    self.hook_depth -= 1;
                    simple(self, TokenKind::RBraceHook, 1);
                }
                Some(BraceKind::Expr) => {
                    self.brace_expr_depth -= 1;
                    simple(self, TokenKind::RBrace, 1);
                }
                None => {
                    let span = Span::new(start, start);
                    self.error(Code::ParseUnmatchedBrace, "unmatched '}'", span);
                    simple(self, TokenKind::RBrace, 1);
                }
            },
            _ => {
                let span = Span::new(start, start);
                self.error(
                    Code::ParseUnexpectedChar,
                    format!("unexpected character '{}'", c),
                    span,
                );
                simple(self, TokenKind::Illegal, 1);
            }
        }
    }

    /// A `{` opens a hook body when the two preceding tokens are
    /// `pre hook` or `post hook` with no intervening newline (layout
    /// tokens would break the adjacency).
    fn is_hook_open(&self) -> bool {
        let n = self.tokens.len();
        if n < 2 {
            return false;
        }
        self.tokens[n - 1].kind == TokenKind::KwHook
            && matches!(self.tokens[n - 2].kind, TokenKind::KwPre | TokenKind::KwPost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, _) = lex("test.pt", src);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn codes(src: &str) -> Vec<Code> {
        let (_, diags) = lex("test.pt", src);
        diags.into_iter().map(|d| d.code).collect()
    }

    use pipetest_base::Method;
    use TokenKind::*;

    #[test]
    fn simple_request_block_layout() {
        let got = kinds("req ping:\n\tGET /get\n\t? status == 200\n");
        assert_eq!(
            got,
            vec![
                KwReq, Ident, Colon, Newline, Indent,
                HttpMethod(Method::Get), Path, Newline,
                Question, Ident, Eq, Number, Newline,
                Dedent, Eof,
            ]
        );
    }

    #[test]
    fn dedents_are_balanced_at_eof_without_trailing_newline() {
        let got = kinds("req ping:\n\tGET /get");
        assert_eq!(
            got,
            vec![KwReq, Ident, Colon, Newline, Indent, HttpMethod(Method::Get), Path, Newline, Dedent, Eof]
        );
    }

    #[test]
    fn spaces_in_indentation_are_rejected() {
        assert_eq!(codes("req r:\n  GET /x\n"), vec![Code::ParseTab, Code::ParseIndent]);
        // Recovery keeps lexing: the method token still appears.
        let got = kinds("req r:\n  GET /x\n");
        assert!(got.contains(&HttpMethod(Method::Get)));
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let got = kinds("req r:\n\n# note\n\tGET /x\n");
        assert_eq!(
            got,
            vec![KwReq, Ident, Colon, Newline, Indent, HttpMethod(Method::Get), Path, Newline, Dedent, Eof]
        );
    }

    #[test]
    fn path_token_swallows_params_and_placeholders() {
        let (tokens, diags) = lex("t.pt", "req r:\n\tGET /users/:id/{{tail}}  # trailing\n");
        assert!(diags.is_empty());
        let path = tokens.iter().find(|t| t.kind == Path).unwrap();
        assert_eq!(path.text, "/users/:id/{{tail}}");
    }

    #[test]
    fn absolute_url_paths_are_single_tokens() {
        let (tokens, _) = lex("t.pt", "req r:\n\tGET https://h.test/a?b=c\n");
        let path = tokens.iter().find(|t| t.kind == Path).unwrap();
        assert_eq!(path.text, "https://h.test/a?b=c");
    }

    #[test]
    fn hash_root_vs_comment() {
        // `#.token` is a response-root access, `# token` a comment.
        let got = kinds("let a = #.token\n");
        assert_eq!(got, vec![KwLet, Ident, Assign, HashRoot, Dot, Ident, Newline, Eof]);

        let got = kinds("let a = 1 # token\n");
        assert_eq!(got, vec![KwLet, Ident, Assign, Number, Newline, Eof]);
    }

    #[test]
    fn hook_braces_are_classified() {
        let got = kinds("req r:\n\tpre hook { print \"x\" }\n");
        assert_eq!(
            got,
            vec![
                KwReq, Ident, Colon, Newline, Indent,
                KwPre, KwHook, LBraceHook, KwPrint, Str, RBraceHook, Newline,
                Dedent, Eof,
            ]
        );
    }

    #[test]
    fn expression_braces_are_not_hook_braces() {
        let got = kinds("req r:\n\tjson { a: 1 }\n");
        assert!(got.contains(&LBrace));
        assert!(!got.contains(&LBraceHook));
    }

    #[test]
    fn newlines_inside_hooks_separate_statements() {
        let got = kinds("req r:\n\tpost hook {\n\t\tseen = 1\n\t\tprint \"a\"\n\t}\n");
        // Newlines survive inside the hook, but no Indent/Dedent appears
        // between the braces.
        let open = got.iter().position(|k| *k == LBraceHook).unwrap();
        let close = got.iter().position(|k| *k == RBraceHook).unwrap();
        let inside = &got[open + 1..close];
        assert!(inside.contains(&Newline));
        assert!(!inside.contains(&Indent));
        assert!(!inside.contains(&Dedent));
    }

    #[test]
    fn newlines_inside_groupings_are_whitespace() {
        let got = kinds("let xs = [1,\n\t2,\n\t3]\n");
        assert_eq!(
            got,
            vec![
                KwLet, Ident, Assign, LBracket, Number, Comma, Number, Comma, Number, RBracket,
                Newline, Eof,
            ]
        );
    }

    #[test]
    fn durations_and_numbers() {
        let got = kinds("timeout 500ms\ntimeout 8s\nlet n = 1.5\n");
        assert_eq!(
            got,
            vec![
                KwTimeout, Duration, Newline,
                KwTimeout, Duration, Newline,
                KwLet, Ident, Assign, Number, Newline,
                Eof,
            ]
        );
        let (tokens, _) = lex("t.pt", "timeout 500ms\n");
        assert_eq!(tokens[1].text, "500ms");
    }

    #[test]
    fn duration_suffix_requires_word_boundary() {
        // `5map` is the number 5 followed by the identifier `map`.
        let got = kinds("let a = 5map\n");
        assert_eq!(got, vec![KwLet, Ident, Assign, Number, Ident, Newline, Eof]);
    }

    #[test]
    fn string_escapes_decode() {
        let (tokens, diags) = lex("t.pt", "let s = \"a\\n\\t\\\\\\\"\\u0041\"\n");
        assert!(diags.is_empty());
        let s = tokens.iter().find(|t| t.kind == Str).unwrap();
        assert_eq!(s.text, "a\n\t\\\"A");
    }

    #[test]
    fn raw_strings_take_no_escapes() {
        let (tokens, _) = lex("t.pt", "let s = `a\\n{{x}}`\n");
        let s = tokens.iter().find(|t| t.kind == Str).unwrap();
        assert_eq!(s.text, "a\\n{{x}}");
    }

    #[test]
    fn unterminated_string_is_reported() {
        assert_eq!(codes("let s = \"abc\n"), vec![Code::ParseUnterminatedString]);
    }

    #[test]
    fn unterminated_hook_is_reported() {
        assert!(codes("req r:\n\tpre hook { print \"x\"\n").contains(&Code::ParseUnterminatedHook));
    }

    #[test]
    fn bare_keys_after_header_and_query() {
        let (tokens, _) = lex("t.pt", "req r:\n\theader Content-Type = \"a\"\n\tquery page_no = 1\n");
        let keys: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == BareKey)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(keys, vec!["Content-Type", "page_no"]);
    }

    #[test]
    fn flow_chain_tokens() {
        let got = kinds("flow \"f\":\n\tfirst -> second : alias\n\t? alias.res.ok\n");
        assert_eq!(
            got,
            vec![
                KwFlow, Str, Colon, Newline, Indent,
                Ident, Arrow, Ident, Colon, Ident, Newline,
                Question, Ident, Dot, Ident, Dot, Ident, Newline,
                Dedent, Eof,
            ]
        );
    }

    #[test]
    fn crlf_lines_lex_like_lf() {
        assert_eq!(kinds("req r:\r\n\tGET /x\r\n"), kinds("req r:\n\tGET /x\n"));
    }

    #[test]
    fn dedent_to_unknown_level_is_reported() {
        let src = "req a:\n\tGET /x\nreq b:\n\t\tGET /y\n";
        // second block indents two levels at once under expect_indent: fine
        // (strictly deeper). Dedenting back to zero pops one level.
        let (_, diags) = lex("t.pt", src);
        assert!(diags.is_empty());

        // Now a genuine mismatch: dedent to a level never pushed.
        let src = "req a:\n\t\tGET /x\n\t? status == 200\n";
        assert_eq!(codes(src), vec![Code::ParseDedent]);
    }

    #[test]
    fn token_spans_are_monotonic() {
        let (tokens, _) = lex(
            "t.pt",
            "base \"https://h\"\nreq r:\n\tGET /x\n\tpre hook { print \"y\" }\nflow \"f\":\n\tr\n",
        );
        let mut last = 0;
        for t in &tokens {
            assert!(t.span.start.offset >= last, "span went backwards at {:?}", t);
            last = t.span.start.offset;
        }
        assert_eq!(tokens.last().unwrap().kind, Eof);
        assert_eq!(tokens.iter().filter(|t| t.kind == Eof).count(), 1);
    }

    #[test]
    fn indent_and_dedent_balance() {
        let (tokens, _) = lex(
            "t.pt",
            "req a:\n\tGET /x\nreq b:\n\tGET /y\nflow \"f\":\n\ta -> b\n",
        );
        let indents = tokens.iter().filter(|t| t.kind == Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 3);
    }
}
