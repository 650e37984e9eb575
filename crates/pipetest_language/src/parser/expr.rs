//! Pratt expression parsing.
//!
//! Precedence, low to high: `or` < `and` < comparisons
//! (`== != < <= > >= in contains ~`) < `+ -` < `* / %` < prefix
//! (`! + -`) < postfix (call, field, index). Binary operators are
//! left-associative; postfix is recognized after both primaries and
//! binary right-hand sides.

use super::{ParseResult, Parser};
use crate::ast::{BinaryOp, Expr, ExprKind, ObjectKey, UnaryOp};
use pipetest_base::{Code, TokenKind};

/// Left/right binding powers for an infix operator.
fn infix_binding(kind: TokenKind) -> Option<(u8, u8, BinaryOp)> {
    let (l, r, op) = match kind {
        TokenKind::KwOr => (1, 2, BinaryOp::Or),
        TokenKind::KwAnd => (3, 4, BinaryOp::And),
        TokenKind::Eq => (5, 6, BinaryOp::Eq),
        TokenKind::NotEq => (5, 6, BinaryOp::Ne),
        TokenKind::Lt => (5, 6, BinaryOp::Lt),
        TokenKind::LtEq => (5, 6, BinaryOp::Le),
        TokenKind::Gt => (5, 6, BinaryOp::Gt),
        TokenKind::GtEq => (5, 6, BinaryOp::Ge),
        TokenKind::KwIn => (5, 6, BinaryOp::In),
        TokenKind::KwContains => (5, 6, BinaryOp::Contains),
        TokenKind::Tilde => (5, 6, BinaryOp::Match),
        TokenKind::Plus => (7, 8, BinaryOp::Add),
        TokenKind::Minus => (7, 8, BinaryOp::Sub),
        TokenKind::Star => (9, 10, BinaryOp::Mul),
        TokenKind::Slash => (9, 10, BinaryOp::Div),
        TokenKind::Percent => (9, 10, BinaryOp::Rem),
        _ => return None,
    };
    Some((l, r, op))
}

impl Parser {
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_prefix()?;

        while let Some((l_bp, r_bp, op)) = infix_binding(self.kind()) {
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(r_bp)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let op = match self.kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_prefix()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (name, name_span) = self.parse_field_name()?;
                    let span = expr.span.merge(name_span);
                    expr = Expr::new(
                        ExprKind::Field {
                            object: Box::new(expr),
                            name,
                            name_span,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let close = self.expect(TokenKind::RBracket, "']'")?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    let close = self.expect(TokenKind::RParen, "')'")?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Field names after `.` may be identifiers or keyword-shaped words
    /// (`#.query`, `res.json` and the like stay accessible).
    fn parse_field_name(&mut self) -> ParseResult<(String, pipetest_base::Span)> {
        let token = self.peek().clone();
        let word_like = matches!(token.kind, TokenKind::Ident | TokenKind::BareKey)
            || (!token.text.is_empty()
                && token
                    .text
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && TokenKind::keyword(&token.text).is_some());
        if word_like {
            self.advance();
            Ok((token.text.clone(), token.span))
        } else {
            let span = token.span;
            self.error(
                Code::ParseUnexpectedToken,
                "expected a field name after '.'",
                span,
            );
            Err(())
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Str => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Str(token.text.clone()), token.span))
            }
            TokenKind::Number => {
                let token = self.advance();
                let value: f64 = token.text.parse().unwrap_or(0.0);
                Ok(Expr::new(ExprKind::Number(value), token.span))
            }
            TokenKind::KwTrue => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Bool(true), token.span))
            }
            TokenKind::KwFalse => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Bool(false), token.span))
            }
            TokenKind::KwNull => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Null, token.span))
            }
            TokenKind::Ident => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Ident(token.text.clone()), token.span))
            }
            // Context names that collide with declaration keywords stay
            // usable in expression position.
            TokenKind::KwReq => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Ident("req".into()), token.span))
            }
            TokenKind::KwHeader => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::Ident("header".into()), token.span))
            }
            TokenKind::Dollar => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::RequestRoot, token.span))
            }
            TokenKind::HashRoot => {
                let token = self.advance();
                Ok(Expr::new(ExprKind::ResponseRoot, token.span))
            }
            TokenKind::LParen => {
                let start = self.advance().span;
                let inner = self.parse_expr()?;
                let close = self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::new(
                    ExprKind::Paren(Box::new(inner)),
                    start.merge(close.span),
                ))
            }
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LBrace => self.parse_object(),
            _ => {
                let span = self.peek().span;
                let found = self.describe();
                self.error(
                    Code::ParseExpectedExpr,
                    format!("expected an expression, found {}", found),
                    span,
                );
                Err(())
            }
        }
    }

    fn describe(&self) -> String {
        let t = self.peek();
        match t.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            _ if t.text.is_empty() => format!("{:?}", t.kind),
            _ => format!("'{}'", t.text),
        }
    }

    fn parse_array(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBracket, "'['")?.span;
        let mut items = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
                // Trailing comma.
                if self.check(TokenKind::RBracket) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::Array(items), start.merge(close.span)))
    }

    fn parse_object(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span;
        let mut pairs = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                let key = self.parse_object_key()?;
                self.expect(TokenKind::Colon, "':'")?;
                let value = self.parse_expr()?;
                pairs.push((key, value));
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
                if self.check(TokenKind::RBrace) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Object(pairs), start.merge(close.span)))
    }

    /// Object keys are identifiers or strings; keyword-shaped words are
    /// accepted so `{json: 1}` means what it looks like.
    fn parse_object_key(&mut self) -> ParseResult<ObjectKey> {
        let token = self.peek().clone();
        let word_like = matches!(token.kind, TokenKind::Ident | TokenKind::Str)
            || (!token.text.is_empty()
                && token
                    .text
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && TokenKind::keyword(&token.text).is_some());
        if word_like {
            self.advance();
            Ok(ObjectKey {
                name: token.text.clone(),
                span: token.span,
            })
        } else {
            let span = token.span;
            self.error(
                Code::ParseUnexpectedToken,
                "expected an object key (identifier or string)",
                span,
            );
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::parser::parse;

    /// Parses `src` as the right-hand side of a global let.
    fn expr(src: &str) -> Expr {
        let (program, diags) = parse("test.pt", &format!("let it = {}\n", src));
        assert!(diags.is_empty(), "diagnostics for '{}': {:?}", src, diags);
        match program.stmts.into_iter().next() {
            Some(Stmt::Let(binding)) => binding.value,
            other => panic!("expected let, got {:?}", other),
        }
    }

    fn binary_op(e: &Expr) -> BinaryOp {
        match &e.kind {
            ExprKind::Binary { op, .. } => *op,
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let e = expr("1 + 2 * 3");
        assert_eq!(binary_op(&e), BinaryOp::Add);
        let ExprKind::Binary { right, .. } = &e.kind else { unreachable!() };
        assert_eq!(binary_op(right), BinaryOp::Mul);
    }

    #[test]
    fn comparison_binds_tighter_than_and_or() {
        let e = expr("a == 1 and b == 2 or c == 3");
        assert_eq!(binary_op(&e), BinaryOp::Or);
        let ExprKind::Binary { left, right, .. } = &e.kind else { unreachable!() };
        assert_eq!(binary_op(left), BinaryOp::And);
        assert_eq!(binary_op(right), BinaryOp::Eq);
    }

    #[test]
    fn additive_is_left_associative() {
        let e = expr("1 - 2 - 3");
        // (1 - 2) - 3
        assert_eq!(binary_op(&e), BinaryOp::Sub);
        let ExprKind::Binary { left, .. } = &e.kind else { unreachable!() };
        assert_eq!(binary_op(left), BinaryOp::Sub);
    }

    #[test]
    fn in_and_contains_and_match_are_comparisons() {
        assert_eq!(binary_op(&expr("a in [1, 2]")), BinaryOp::In);
        assert_eq!(binary_op(&expr("\"abc\" contains \"b\"")), BinaryOp::Contains);
        assert_eq!(binary_op(&expr("a ~ \"^x\"")), BinaryOp::Match);
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = expr("!a and b");
        assert_eq!(binary_op(&e), BinaryOp::And);
        let ExprKind::Binary { left, .. } = &e.kind else { unreachable!() };
        assert!(matches!(&left.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn postfix_applies_after_binary_rhs() {
        let e = expr("1 + obj.field");
        let ExprKind::Binary { right, .. } = &e.kind else { unreachable!() };
        assert!(matches!(&right.kind, ExprKind::Field { name, .. } if name == "field"));
    }

    #[test]
    fn postfix_chains_fields_indexes_calls() {
        let e = expr("jsonpath(#, \"$.a\")[0].name");
        let ExprKind::Field { object, name, .. } = &e.kind else {
            panic!("expected field");
        };
        assert_eq!(name, "name");
        let ExprKind::Index { object: inner, .. } = &object.kind else {
            panic!("expected index");
        };
        assert!(matches!(&inner.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn dollar_and_hash_roots() {
        assert!(matches!(expr("$").kind, ExprKind::RequestRoot));
        let e = expr("#.token");
        assert!(matches!(&e.kind, ExprKind::Field { object, .. }
            if matches!(object.kind, ExprKind::ResponseRoot)));
    }

    #[test]
    fn object_literal_preserves_order_and_key_forms() {
        let e = expr("{b: 1, \"a key\": 2, json: 3}");
        let ExprKind::Object(pairs) = &e.kind else { panic!("expected object") };
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.name.as_str()).collect();
        assert_eq!(keys, vec!["b", "a key", "json"]);
    }

    #[test]
    fn array_literal_allows_trailing_comma() {
        let ExprKind::Array(items) = expr("[1, 2, 3,]").kind else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn literals_parse() {
        assert!(matches!(expr("null").kind, ExprKind::Null));
        assert!(matches!(expr("true").kind, ExprKind::Bool(true)));
        assert!(matches!(expr("false").kind, ExprKind::Bool(false)));
        assert!(matches!(expr("1.25").kind, ExprKind::Number(n) if n == 1.25));
        assert!(matches!(expr("\"hi\"").kind, ExprKind::Str(ref s) if s == "hi"));
    }

    #[test]
    fn context_keywords_usable_in_expressions() {
        assert!(matches!(expr("req").kind, ExprKind::Ident(ref s) if s == "req"));
        let e = expr("header[\"Set-Cookie\"]");
        assert!(matches!(&e.kind, ExprKind::Index { object, .. }
            if matches!(&object.kind, ExprKind::Ident(s) if s == "header")));
    }

    #[test]
    fn missing_operand_reports_expected_expr() {
        let (_, diags) = parse("t.pt", "let x = 1 +\n");
        assert!(diags
            .iter()
            .any(|d| d.code == pipetest_base::Code::ParseExpectedExpr));
    }
}
