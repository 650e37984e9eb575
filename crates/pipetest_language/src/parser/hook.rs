//! Hook body parsing.
//!
//! Hook bodies are brace-scoped, not indentation-scoped: statements run
//! until the matching `}` and are separated by newlines or `;`. A
//! statement is a `let`, a print (`print`/`println`/`printf`), or an
//! expression; an expression followed by `=` must convert to a valid
//! assignment target (root `req`/`res`/`$`/identifier plus field/index
//! steps), otherwise `E_PARSE_BAD_LVALUE` is recorded.

use super::{ParseResult, Parser};
use crate::ast::{
    AccessStep, Expr, ExprKind, HookBlock, HookStmt, LValue, LValueRoot, PrintKind,
};
use pipetest_base::{Code, Span, TokenKind};

impl Parser {
    /// Parses `{ stmt; stmt ... }` after `pre hook` / `post hook`.
    /// `start` is the span of the `pre`/`post` keyword.
    pub(crate) fn parse_hook_block(&mut self, start: Span) -> ParseResult<HookBlock> {
        self.expect(TokenKind::LBraceHook, "'{' to open the hook body")?;

        let mut stmts = Vec::new();
        loop {
            while matches!(self.kind(), TokenKind::Newline | TokenKind::Semicolon) {
                self.advance();
            }
            if matches!(self.kind(), TokenKind::RBraceHook | TokenKind::Eof) {
                break;
            }
            match self.parse_hook_stmt() {
                Ok(stmt) => {
                    stmts.push(stmt);
                    self.end_hook_stmt();
                }
                Err(()) => self.sync_hook_stmt(),
            }
        }
        let close = self.expect(TokenKind::RBraceHook, "'}' to close the hook body")?;

        Ok(HookBlock {
            stmts,
            span: start.merge(close.span),
        })
    }

    fn parse_hook_stmt(&mut self) -> ParseResult<HookStmt> {
        match self.kind() {
            TokenKind::KwLet => self.parse_let_binding().map(HookStmt::Let),
            TokenKind::KwPrint => self.parse_print(PrintKind::Print),
            TokenKind::KwPrintln => self.parse_print(PrintKind::Println),
            TokenKind::KwPrintf => self.parse_print(PrintKind::Printf),
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(TokenKind::Assign).is_some() {
                    let value = self.parse_expr()?;
                    let span = expr.span.merge(value.span);
                    match expr_to_lvalue(&expr) {
                        Some(target) => Ok(HookStmt::Assign {
                            target,
                            value,
                            span,
                        }),
                        None => {
                            self.error(
                                Code::ParseBadLvalue,
                                "left side of '=' is not assignable",
                                expr.span,
                            );
                            // Keep the statement so later passes still see
                            // the right-hand side.
                            Ok(HookStmt::Expr(value))
                        }
                    }
                } else {
                    Ok(HookStmt::Expr(expr))
                }
            }
        }
    }

    /// `print a, b` or `print(a, b)`; the argument list may be empty
    /// (`println` on its own emits a blank line).
    fn parse_print(&mut self, kind: PrintKind) -> ParseResult<HookStmt> {
        let start = self.advance().span;
        let mut args = Vec::new();

        if self.check(TokenKind::LParen) {
            self.advance();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        } else if !self.hook_stmt_end() {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        let span = args
            .last()
            .map(|a: &Expr| start.merge(a.span))
            .unwrap_or(start);
        Ok(HookStmt::Print { kind, args, span })
    }

    fn hook_stmt_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBraceHook | TokenKind::Eof
        )
    }

    fn end_hook_stmt(&mut self) {
        if !self.hook_stmt_end() {
            let span = self.peek().span;
            self.error(
                Code::ParseUnexpectedToken,
                "expected ';', newline, or '}' after hook statement",
                span,
            );
            self.sync_hook_stmt();
        }
    }

    fn sync_hook_stmt(&mut self) {
        while !self.hook_stmt_end() {
            self.advance();
        }
    }
}

/// Converts an expression to an assignment target. The root must be
/// `req`, `res`, `$`, or a plain identifier; any chain of field/index
/// postfix steps is allowed on top.
fn expr_to_lvalue(expr: &Expr) -> Option<LValue> {
    fn walk(expr: &Expr, steps: &mut Vec<AccessStep>) -> Option<LValueRoot> {
        match &expr.kind {
            ExprKind::Ident(name) => Some(match name.as_str() {
                "req" => LValueRoot::Req,
                "res" => LValueRoot::Res,
                _ => LValueRoot::Var(name.clone()),
            }),
            ExprKind::RequestRoot => Some(LValueRoot::Dollar),
            ExprKind::Paren(inner) => walk(inner, steps),
            ExprKind::Field {
                object,
                name,
                name_span,
            } => {
                let root = walk(object, steps)?;
                steps.push(AccessStep::Field {
                    name: name.clone(),
                    span: *name_span,
                });
                Some(root)
            }
            ExprKind::Index { object, index } => {
                let root = walk(object, steps)?;
                steps.push(AccessStep::Index((**index).clone()));
                Some(root)
            }
            _ => None,
        }
    }

    let mut steps = Vec::new();
    let root = walk(expr, &mut steps)?;
    Some(LValue {
        root,
        steps,
        span: expr.span,
    })
}
