//! Recursive-descent parser over lexed lines.
//!
//! Block structure comes from indentation: a header line ending in `:` opens
//! a block whose lines must all share the indentation of its first line.

use std::sync::Arc;

use stitch_lexer::{Keyword, Line, Token, TokenKind};

use crate::ast::*;
use crate::error::ParseError;

/// What the statement being parsed is allowed to contain
#[derive(Debug, Clone, Copy, Default)]
struct Context {
    in_async: bool,
    in_loop: bool,
}

pub(crate) struct Parser<'a> {
    lines: &'a [Line],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(lines: &'a [Line]) -> Self {
        Self { lines, pos: 0 }
    }

    pub(crate) fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut routines = Vec::new();
        let Some(first) = self.lines.first() else {
            return Ok(Module { routines });
        };
        let indent = first.indent;

        while let Some(line) = self.peek_line() {
            if line.indent != indent {
                return Err(ParseError::indentation(line.number));
            }
            let routine = self.parse_routine(indent)?;
            routines.push(routine);
        }
        Ok(Module { routines })
    }

    fn peek_line(&self) -> Option<&'a Line> {
        self.lines.get(self.pos)
    }

    fn current_line(&self) -> &'a Line {
        let lines: &'a [Line] = self.lines;
        &lines[self.pos]
    }

    /// Parse decorator lines followed by a `def` line and its body.
    fn parse_routine(&mut self, indent: usize) -> Result<Arc<RoutineDecl>, ParseError> {
        let mut decorators = Vec::new();
        loop {
            let Some(line) = self.peek_line() else {
                return Err(ParseError::syntax(
                    self.last_line_number(),
                    "decorator is not followed by a routine declaration",
                ));
            };
            if line.indent != indent {
                return Err(ParseError::indentation(line.number));
            }
            match line.tokens.first().map(|t| &t.kind) {
                Some(TokenKind::At) => {
                    decorators.push(parse_decorator(line)?);
                    self.pos += 1;
                }
                Some(TokenKind::Keyword(Keyword::Def | Keyword::Async)) => break,
                _ => {
                    return Err(ParseError::syntax(
                        line.number,
                        "expected a routine declaration",
                    ));
                }
            }
        }

        let line = self.current_line();
        let header = parse_def_header(line)?;
        self.pos += 1;

        let ctx = Context {
            in_async: header.is_async,
            in_loop: false,
        };
        let body = self.parse_block(indent, line.number, ctx)?;

        Ok(Arc::new(RoutineDecl {
            name: header.name,
            params: header.params,
            is_async: header.is_async,
            decorators,
            body,
            line: line.number,
        }))
    }

    /// Parse the block opened by the header on `header_line`.
    fn parse_block(
        &mut self,
        parent_indent: usize,
        header_line: usize,
        ctx: Context,
    ) -> Result<Block, ParseError> {
        let indent = match self.peek_line() {
            Some(line) if line.indent > parent_indent => line.indent,
            _ => {
                return Err(ParseError::syntax(
                    header_line,
                    "expected an indented block",
                ));
            }
        };

        let mut statements = Vec::new();
        while let Some(line) = self.peek_line() {
            if line.indent < indent {
                if line.indent > parent_indent {
                    return Err(ParseError::indentation(line.number));
                }
                break;
            }
            if line.indent > indent {
                return Err(ParseError::indentation(line.number));
            }
            statements.push(self.parse_statement(indent, ctx)?);
        }
        Ok(Block { statements })
    }

    fn parse_statement(&mut self, indent: usize, ctx: Context) -> Result<Statement, ParseError> {
        let line = self.current_line();
        let first = &line.tokens[0];

        match &first.kind {
            TokenKind::At | TokenKind::Keyword(Keyword::Def | Keyword::Async) => {
                let routine = self.parse_routine(indent)?;
                Ok(Statement::Def(routine))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(indent, ctx),
            TokenKind::Keyword(Keyword::While) => {
                let mut tokens = LineTokens::new(line);
                tokens.advance();
                let condition = tokens.parse_expr(ctx)?;
                tokens.expect(TokenKind::Colon)?;
                tokens.finish()?;
                self.pos += 1;
                let body = self.parse_block(indent, line.number, Context { in_loop: true, ..ctx })?;
                Ok(Statement::While { condition, body })
            }
            TokenKind::Keyword(Keyword::For) => {
                let mut tokens = LineTokens::new(line);
                tokens.advance();
                let var = tokens.expect_ident()?;
                tokens.expect(TokenKind::Keyword(Keyword::In))?;
                let iter = tokens.parse_expr(ctx)?;
                tokens.expect(TokenKind::Colon)?;
                tokens.finish()?;
                self.pos += 1;
                let body = self.parse_block(indent, line.number, Context { in_loop: true, ..ctx })?;
                Ok(Statement::ForIn { var, iter, body })
            }
            TokenKind::Keyword(Keyword::Elif | Keyword::Else) => Err(ParseError::syntax(
                line.number,
                format!("`{}` without a matching `if`", first.kind),
            )),
            _ => {
                let stmt = LineTokens::new(line).parse_simple_statement(ctx)?;
                self.pos += 1;
                Ok(stmt)
            }
        }
    }

    fn parse_if(&mut self, indent: usize, ctx: Context) -> Result<Statement, ParseError> {
        let mut branches = Vec::new();
        let mut else_block = None;

        // `if` line
        let line = self.current_line();
        let mut tokens = LineTokens::new(line);
        tokens.advance();
        let condition = tokens.parse_expr(ctx)?;
        tokens.expect(TokenKind::Colon)?;
        tokens.finish()?;
        self.pos += 1;
        branches.push((condition, self.parse_block(indent, line.number, ctx)?));

        while let Some(line) = self.peek_line() {
            if line.indent != indent {
                break;
            }
            let mut tokens = LineTokens::new(line);
            if tokens.eat(&TokenKind::Keyword(Keyword::Elif)) {
                let condition = tokens.parse_expr(ctx)?;
                tokens.expect(TokenKind::Colon)?;
                tokens.finish()?;
                self.pos += 1;
                branches.push((condition, self.parse_block(indent, line.number, ctx)?));
            } else if tokens.eat(&TokenKind::Keyword(Keyword::Else)) {
                tokens.expect(TokenKind::Colon)?;
                tokens.finish()?;
                self.pos += 1;
                else_block = Some(self.parse_block(indent, line.number, ctx)?);
                break;
            } else {
                break;
            }
        }

        Ok(Statement::If {
            branches,
            else_block,
        })
    }

    fn last_line_number(&self) -> usize {
        self.lines.last().map(|l| l.number).unwrap_or(1)
    }
}

/// Parse `@name` or `@name(args)`.
fn parse_decorator(line: &Line) -> Result<Decorator, ParseError> {
    let mut tokens = LineTokens::new(line);
    tokens.expect(TokenKind::At)?;
    let name = tokens.expect_ident()?;
    let mut args = Vec::new();
    if tokens.eat(&TokenKind::LParen) {
        args = tokens.parse_args(Context::default())?;
    }
    tokens.finish()?;
    let framework = FRAMEWORK_DECORATORS.contains(&name.as_str());
    Ok(Decorator {
        name,
        args,
        framework,
        line: line.number,
    })
}

struct DefHeader {
    name: String,
    params: Vec<String>,
    is_async: bool,
}

fn parse_def_header(line: &Line) -> Result<DefHeader, ParseError> {
    let mut tokens = LineTokens::new(line);
    let is_async = tokens.eat(&TokenKind::Keyword(Keyword::Async));
    tokens.expect(TokenKind::Keyword(Keyword::Def))?;
    let name = tokens.expect_ident()?;
    tokens.expect(TokenKind::LParen)?;
    let mut params = Vec::new();
    if !tokens.eat(&TokenKind::RParen) {
        loop {
            let param = tokens.expect_ident()?;
            if params.contains(&param) {
                return Err(ParseError::syntax(
                    line.number,
                    format!("duplicate parameter `{}`", param),
                ));
            }
            params.push(param);
            if tokens.eat(&TokenKind::RParen) {
                break;
            }
            tokens.expect(TokenKind::Comma)?;
        }
    }
    tokens.expect(TokenKind::Colon)?;
    tokens.finish()?;
    Ok(DefHeader {
        name,
        params,
        is_async,
    })
}

/// Cursor over the tokens of a single line
struct LineTokens<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> LineTokens<'a> {
    fn new(line: &'a Line) -> Self {
        Self {
            tokens: &line.tokens,
            pos: 0,
            line: line.number,
        }
    }

    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'a TokenKind> {
        let kind = self.peek()?;
        self.pos += 1;
        Some(kind)
    }

    fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{}`", expected)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of line")),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = match self.peek() {
            Some(kind) => format!("`{}`", kind),
            None => "end of line".to_string(),
        };
        ParseError::syntax(self.line, format!("expected {}, found {}", expected, found))
    }

    fn parse_simple_statement(&mut self, ctx: Context) -> Result<Statement, ParseError> {
        let stmt = match self.peek() {
            Some(TokenKind::Keyword(Keyword::Return)) => {
                self.pos += 1;
                let value = if self.peek().is_some() {
                    Some(self.parse_expr(ctx)?)
                } else {
                    None
                };
                Statement::Return(value)
            }
            Some(TokenKind::Keyword(Keyword::Raise)) => {
                self.pos += 1;
                Statement::Raise(self.parse_expr(ctx)?)
            }
            Some(TokenKind::Keyword(kw @ (Keyword::Break | Keyword::Continue))) => {
                if !ctx.in_loop {
                    return Err(ParseError::syntax(
                        self.line,
                        format!("`{}` outside of a loop", kw.as_str()),
                    ));
                }
                self.pos += 1;
                if *kw == Keyword::Break {
                    Statement::Break
                } else {
                    Statement::Continue
                }
            }
            Some(TokenKind::Keyword(Keyword::Pass)) => {
                self.pos += 1;
                Statement::Pass
            }
            _ => {
                let expr = self.parse_expr(ctx)?;
                let op = match self.peek() {
                    Some(TokenKind::Assign) => Some(None),
                    Some(TokenKind::PlusAssign) => Some(Some(BinaryOp::Add)),
                    Some(TokenKind::MinusAssign) => Some(Some(BinaryOp::Sub)),
                    Some(TokenKind::StarAssign) => Some(Some(BinaryOp::Mul)),
                    Some(TokenKind::SlashAssign) => Some(Some(BinaryOp::Div)),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        self.pos += 1;
                        let target = self.assign_target(expr)?;
                        let value = self.parse_expr(ctx)?;
                        Statement::Assign { target, op, value }
                    }
                    None => Statement::Expr(expr),
                }
            }
        };
        self.finish()?;
        Ok(stmt)
    }

    fn assign_target(&self, expr: Expr) -> Result<AssignTarget, ParseError> {
        match expr {
            Expr::Identifier(name) => Ok(AssignTarget::Name(name)),
            Expr::Index { base, index } => Ok(AssignTarget::Index {
                base: *base,
                index: *index,
            }),
            _ => Err(ParseError::syntax(self.line, "invalid assignment target")),
        }
    }

    fn parse_expr(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        self.parse_or(ctx)
    }

    fn parse_or(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut left = self.parse_and(ctx)?;
        while self.eat(&TokenKind::Keyword(Keyword::Or)) {
            let right = self.parse_and(ctx)?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut left = self.parse_not(ctx)?;
        while self.eat(&TokenKind::Keyword(Keyword::And)) {
            let right = self.parse_not(ctx)?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Keyword(Keyword::Not)) {
            let operand = self.parse_not(ctx)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison(ctx)
    }

    fn parse_comparison(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive(ctx)?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::NotEq,
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive(ctx)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative(ctx)?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative(ctx)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary(ctx)?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary(ctx)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary(ctx)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat(&TokenKind::Keyword(Keyword::Await)) {
            if !ctx.in_async {
                return Err(ParseError::syntax(
                    self.line,
                    "`await` outside of an async routine",
                ));
            }
            let operand = self.parse_postfix(ctx)?;
            if !matches!(operand, Expr::Call { .. }) {
                return Err(ParseError::syntax(self.line, "`await` expects a call"));
            }
            return Ok(Expr::Await(Box::new(operand)));
        }
        self.parse_postfix(ctx)
    }

    fn parse_postfix(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary(ctx)?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let args = self.parse_args(ctx)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr(ctx)?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parse a comma separated argument list; the opening `(` is consumed.
    fn parse_args(&mut self, ctx: Context) -> Result<Vec<Expr>, ParseError> {
        self.parse_sequence(TokenKind::RParen, ctx)
    }

    fn parse_sequence(&mut self, close: TokenKind, ctx: Context) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr(ctx)?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(TokenKind::Comma)?;
            // Trailing comma
            if self.eat(&close) {
                return Ok(items);
            }
        }
    }

    fn parse_primary(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let Some(kind) = self.peek() else {
            return Err(self.unexpected("an expression"));
        };
        let expr = match kind {
            TokenKind::Number(n) => Expr::Number(*n),
            TokenKind::Str(s) => Expr::String(s.clone()),
            TokenKind::Ident(name) => Expr::Identifier(name.clone()),
            TokenKind::Keyword(Keyword::True) => Expr::Boolean(true),
            TokenKind::Keyword(Keyword::False) => Expr::Boolean(false),
            TokenKind::Keyword(Keyword::Null) => Expr::Null,
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.parse_expr(ctx)?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.pos += 1;
                return Ok(Expr::List(self.parse_sequence(TokenKind::RBracket, ctx)?));
            }
            TokenKind::LBrace => {
                self.pos += 1;
                return self.parse_map(ctx);
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn parse_map(&mut self, ctx: Context) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.parse_expr(ctx)?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr(ctx)?;
            entries.push((key, value));
            if self.eat(&TokenKind::RBrace) {
                return Ok(Expr::Map(entries));
            }
            self.expect(TokenKind::Comma)?;
            if self.eat(&TokenKind::RBrace) {
                return Ok(Expr::Map(entries));
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
