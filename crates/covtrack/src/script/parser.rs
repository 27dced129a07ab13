//! Recursive-descent parser

use super::ast::{
    BinOp, Block, Chunk, CondArm, ElseArm, Expr, ExprKind, FuncBody, FuncName, Stmt, StmtKind,
    TableField, UnOp, UNARY_PRIORITY,
};
use super::lexer::tokenize;
use super::token::{Span, Token, TokenKind};
use crate::result::{CovError, CovResult};
use std::sync::Arc;

const MAX_NESTING: usize = 200;

/// Parse a whole source file
pub fn parse(source: &str) -> CovResult<Chunk> {
    let tokens = tokenize(source)?;
    let code: Vec<Token> = tokens
        .iter()
        .filter(|t| !t.kind.is_trivia())
        .cloned()
        .collect();

    let mut parser = Parser::new(code);
    let block = parser.parse_block()?;
    if !parser.check(&TokenKind::Eof) {
        return Err(parser.unexpected("'<eof>'"));
    }

    Ok(Chunk {
        block,
        tokens,
        line_count: line_count(source),
        body_count: parser.bodies,
    })
}

/// Number of lines as an editor shows them; a trailing newline does not open a new line
#[must_use]
pub fn line_count(source: &str) -> u32 {
    if source.is_empty() {
        return 0;
    }
    let newlines = source.bytes().filter(|&b| b == b'\n').count() as u32;
    if source.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    nesting: usize,
    /// Next body id
    bodies: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            nesting: 0,
            bodies: 0,
        }
    }

    fn current(&self) -> &Token {
        // tokenize() always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            self.current().span
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> CovResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{kind}'")))
        }
    }

    fn unexpected(&self, expected: &str) -> CovError {
        let token = self.current();
        CovError::parse(
            token.span.line,
            format!("{expected} expected near {}", token.kind),
        )
    }

    fn expect_name(&mut self) -> CovResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("<name>")),
        }
    }

    fn enter(&mut self) -> CovResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(CovError::parse(
                self.current().span.line,
                "chunk has too many syntax levels",
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Else | TokenKind::ElseIf | TokenKind::End | TokenKind::Eof
        )
    }

    /// Body of a function, loop or `if` arm; the id is taken before the
    /// contents so ids follow source order with parents first
    fn parse_body(&mut self) -> CovResult<Block> {
        let id = self.bodies;
        self.bodies += 1;
        let mut block = self.parse_block()?;
        block.id = Some(id);
        Ok(block)
    }

    fn parse_block(&mut self) -> CovResult<Block> {
        self.enter()?;
        let open = if self.pos == 0 { 0 } else { self.prev_span().end };
        let start = self.current().span;
        let mut stmts = Vec::new();

        while !self.block_follows() {
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            let stmt = self.parse_statement()?;
            let is_return = matches!(stmt.kind, StmtKind::Return(_));
            stmts.push(stmt);
            if is_return {
                while self.eat(&TokenKind::Semi) {}
                if !self.block_follows() {
                    return Err(self.unexpected("'end'"));
                }
                break;
            }
        }

        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::new(start.start, start.start, start.line, start.line),
        };
        self.leave();
        Ok(Block {
            stmts,
            span,
            id: None,
            open,
        })
    }

    fn parse_statement(&mut self) -> CovResult<Stmt> {
        let start = self.current().span;
        let kind = match self.peek_kind() {
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Do)?;
                let body = self.parse_loop_body()?;
                self.expect(&TokenKind::End)?;
                StmtKind::While { cond, body }
            }
            TokenKind::Do => {
                self.advance();
                let block = self.parse_block()?;
                self.expect(&TokenKind::End)?;
                StmtKind::Do(block)
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Function => {
                let keyword = self.advance().span;
                let name = self.parse_func_name()?;
                let func = self.parse_func_body(keyword, name.method.is_some())?;
                StmtKind::Function { name, func }
            }
            TokenKind::Local => {
                self.advance();
                if self.check(&TokenKind::Function) {
                    let keyword = self.advance().span;
                    let name = self.expect_name()?;
                    let func = self.parse_func_body(keyword, false)?;
                    StmtKind::LocalFunction { name, func }
                } else {
                    let mut names = vec![self.expect_name()?];
                    while self.eat(&TokenKind::Comma) {
                        names.push(self.expect_name()?);
                    }
                    let values = if self.eat(&TokenKind::Assign) {
                        self.parse_expr_list()?
                    } else {
                        Vec::new()
                    };
                    StmtKind::Local { names, values }
                }
            }
            TokenKind::Return => {
                self.advance();
                let values = if self.block_follows() || self.check(&TokenKind::Semi) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                StmtKind::Return(values)
            }
            TokenKind::Break => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(CovError::parse(start.line, "break outside a loop"));
                }
                StmtKind::Break
            }
            _ => self.parse_expr_statement()?,
        };

        Ok(Stmt {
            kind,
            span: start.to(self.prev_span()),
        })
    }

    fn parse_loop_body(&mut self) -> CovResult<Block> {
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        body
    }

    fn parse_if(&mut self) -> CovResult<StmtKind> {
        let mut arms = Vec::new();
        let line = self.advance().span.line;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::Then)?;
        let block = self.parse_body()?;
        arms.push(CondArm { cond, block, line });

        let mut else_arm = None;
        loop {
            match self.peek_kind() {
                TokenKind::ElseIf => {
                    let line = self.advance().span.line;
                    let cond = self.parse_expr()?;
                    self.expect(&TokenKind::Then)?;
                    let block = self.parse_body()?;
                    arms.push(CondArm { cond, block, line });
                }
                TokenKind::Else => {
                    let line = self.advance().span.line;
                    let block = self.parse_body()?;
                    else_arm = Some(ElseArm { block, line });
                    self.expect(&TokenKind::End)?;
                    break;
                }
                _ => {
                    self.expect(&TokenKind::End)?;
                    break;
                }
            }
        }
        Ok(StmtKind::If { arms, else_arm })
    }

    fn parse_for(&mut self) -> CovResult<StmtKind> {
        self.advance();
        let first = self.expect_name()?;
        if self.eat(&TokenKind::Assign) {
            let start = self.parse_expr()?;
            self.expect(&TokenKind::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.eat(&TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&TokenKind::Do)?;
            let body = self.parse_loop_body()?;
            self.expect(&TokenKind::End)?;
            return Ok(StmtKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        self.expect(&TokenKind::In)?;
        let exprs = self.parse_expr_list()?;
        self.expect(&TokenKind::Do)?;
        let body = self.parse_loop_body()?;
        self.expect(&TokenKind::End)?;
        Ok(StmtKind::GenericFor { names, exprs, body })
    }

    fn parse_func_name(&mut self) -> CovResult<FuncName> {
        let mut path = vec![self.expect_name()?];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_name()?);
        }
        let method = if self.eat(&TokenKind::Colon) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(FuncName { path, method })
    }

    fn parse_func_body(&mut self, keyword: Span, is_method: bool) -> CovResult<Arc<FuncBody>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut is_variadic = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.eat(&TokenKind::Ellipsis) {
                    is_variadic = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        // break never crosses a function boundary
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_body();
        self.loop_depth = saved_loops;
        let body = body?;

        let end = self.expect(&TokenKind::End)?.span;
        Ok(Arc::new(FuncBody {
            params,
            is_variadic,
            body,
            span: keyword.to(end),
        }))
    }

    fn parse_expr_statement(&mut self) -> CovResult<StmtKind> {
        let first = self.parse_suffixed_expr()?;
        if self.check(&TokenKind::Assign) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.eat(&TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target.kind, ExprKind::Name(_) | ExprKind::Index { .. }) {
                    return Err(CovError::parse(target.span.line, "cannot assign to this expression"));
                }
            }
            self.expect(&TokenKind::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(StmtKind::Assign { targets, values });
        }

        if matches!(first.kind, ExprKind::Call { .. } | ExprKind::Method { .. }) {
            Ok(StmtKind::Call(first))
        } else {
            Err(CovError::parse(first.span.line, "syntax error: expression is not a statement"))
        }
    }

    fn parse_expr_list(&mut self) -> CovResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> CovResult<Expr> {
        self.parse_subexpr(0)
    }

    fn parse_subexpr(&mut self, limit: u8) -> CovResult<Expr> {
        self.enter()?;
        let start = self.current().span;

        let mut lhs = if let Some(op) = self.unary_op() {
            self.advance();
            let operand = self.parse_subexpr(UNARY_PRIORITY)?;
            Expr {
                span: start.to(operand.span),
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            }
        } else {
            self.parse_simple_expr()?
        };

        while let Some(op) = self.binary_op() {
            let (left, right) = op.priority();
            if left <= limit {
                break;
            }
            self.advance();
            let rhs = self.parse_subexpr(right)?;
            lhs = Expr {
                span: lhs.span.to(rhs.span),
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }

        self.leave();
        Ok(lhs)
    }

    fn unary_op(&self) -> Option<UnOp> {
        match self.peek_kind() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Hash => Some(UnOp::Len),
            _ => None,
        }
    }

    fn binary_op(&self) -> Option<BinOp> {
        let op = match self.peek_kind() {
            TokenKind::Or => BinOp::Or,
            TokenKind::And => BinOp::And,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::Concat => BinOp::Concat,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::DoubleSlash => BinOp::IDiv,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Caret => BinOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    fn parse_simple_expr(&mut self) -> CovResult<Expr> {
        let span = self.current().span;
        let kind = match self.peek_kind().clone() {
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::True => ExprKind::True,
            TokenKind::False => ExprKind::False,
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::Str(s) | TokenKind::LongStr(s) => ExprKind::Str(Arc::from(s.as_str())),
            TokenKind::Ellipsis => ExprKind::Vararg,
            TokenKind::LBrace => return self.parse_table(),
            TokenKind::Function => {
                let keyword = self.advance().span;
                let func = self.parse_func_body(keyword, false)?;
                return Ok(Expr {
                    span: func.span,
                    kind: ExprKind::Function(func),
                });
            }
            _ => return self.parse_suffixed_expr(),
        };
        self.advance();
        Ok(Expr { kind, span })
    }

    fn parse_primary_expr(&mut self) -> CovResult<Expr> {
        let span = self.current().span;
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Name(name),
                    span,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let close = self.expect(&TokenKind::RParen)?.span;
                Ok(Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    span: span.to(close),
                })
            }
            _ => Err(self.unexpected("<expression>")),
        }
    }

    fn parse_suffixed_expr(&mut self) -> CovResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let key_span = self.current().span;
                    let name = self.expect_name()?;
                    let key = Expr {
                        kind: ExprKind::Str(Arc::from(name.as_str())),
                        span: key_span,
                    };
                    expr = Expr {
                        span: expr.span.to(key_span),
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(key),
                        },
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    let close = self.expect(&TokenKind::RBracket)?.span;
                    expr = Expr {
                        span: expr.span.to(close),
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(key),
                        },
                    };
                }
                TokenKind::Colon => {
                    self.advance();
                    let name = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr {
                        span: expr.span.to(self.prev_span()),
                        kind: ExprKind::Method {
                            obj: Box::new(expr),
                            name,
                            args,
                        },
                    };
                }
                TokenKind::LParen | TokenKind::Str(_) | TokenKind::LongStr(_) | TokenKind::LBrace => {
                    let args = self.parse_call_args()?;
                    expr = Expr {
                        span: expr.span.to(self.prev_span()),
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> CovResult<Vec<Expr>> {
        match self.peek_kind().clone() {
            TokenKind::Str(s) | TokenKind::LongStr(s) => {
                let span = self.advance().span;
                Ok(vec![Expr {
                    kind: ExprKind::Str(Arc::from(s.as_str())),
                    span,
                }])
            }
            TokenKind::LBrace => Ok(vec![self.parse_table()?]),
            TokenKind::LParen => {
                self.advance();
                let args = if self.check(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(&TokenKind::RParen)?;
                Ok(args)
            }
            _ => Err(self.unexpected("function arguments")),
        }
    }

    fn parse_table(&mut self) -> CovResult<Expr> {
        let open = self.expect(&TokenKind::LBrace)?.span;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let field = match self.peek_kind().clone() {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    self.expect(&TokenKind::Assign)?;
                    TableField::Keyed(key, self.parse_expr()?)
                }
                TokenKind::Name(name)
                    if self.tokens.get(self.pos + 1).map(|t| &t.kind)
                        == Some(&TokenKind::Assign) =>
                {
                    self.advance();
                    self.advance();
                    TableField::Named(name, self.parse_expr()?)
                }
                _ => TableField::Positional(self.parse_expr()?),
            };
            fields.push(field);
            if !self.eat(&TokenKind::Comma) && !self.eat(&TokenKind::Semi) {
                break;
            }
        }
        let close = self.expect(&TokenKind::RBrace)?.span;
        Ok(Expr {
            kind: ExprKind::Table(fields),
            span: open.to(close),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stmts(src: &str) -> Vec<Stmt> {
        parse(src).unwrap().block.stmts
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(""), 0);
        assert_eq!(line_count("a"), 1);
        assert_eq!(line_count("a\n"), 1);
        assert_eq!(line_count("a\nb"), 2);
        assert_eq!(line_count("a\n\n"), 2);
    }

    #[test]
    fn test_statement_lines() {
        let body = stmts("local a = 1\n\nprint(a)\n");
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].span.line, 1);
        assert_eq!(body[1].span.line, 3);
        assert!(matches!(body[1].kind, StmtKind::Call(_)));
    }

    #[test]
    fn test_function_with_varargs() {
        let body = stmts("local function f(a, b, ...)\n  return a\nend");
        match &body[0].kind {
            StmtKind::LocalFunction { name, func } => {
                assert_eq!(name, "f");
                assert_eq!(func.params, vec!["a", "b"]);
                assert!(func.is_variadic);
                assert_eq!(func.span.line, 1);
                assert_eq!(func.span.end_line, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_method_name_adds_self() {
        let body = stmts("function M.sub:run(x) end");
        match &body[0].kind {
            StmtKind::Function { name, func } => {
                assert_eq!(name.display(), "M.sub:run");
                assert_eq!(func.params, vec!["self", "x"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_if_arms_record_keyword_lines() {
        let body = stmts("if a then\n  x = 1\nelseif b then\n  x = 2\nelse\n  x = 3\nend");
        match &body[0].kind {
            StmtKind::If { arms, else_arm } => {
                assert_eq!(arms.len(), 2);
                assert_eq!(arms[0].line, 1);
                assert_eq!(arms[1].line, 3);
                assert_eq!(else_arm.as_ref().unwrap().line, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(body[0].span.end_line, 7);
    }

    #[test]
    fn test_body_ids_follow_source_order() {
        let src = "local function f() if a then x = 1 else x = 2 end end\nwhile b do end\ndo y = 1 end";
        let chunk = parse(src).unwrap();
        assert_eq!(chunk.body_count, 4);
        assert_eq!(chunk.block.id, None);

        let StmtKind::LocalFunction { func, .. } = &chunk.block.stmts[0].kind else {
            panic!("expected local function");
        };
        assert_eq!(func.body.id, Some(0));
        assert_eq!(&src[..func.body.open], "local function f()");
        let StmtKind::If { arms, else_arm } = &func.body.stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(arms[0].block.id, Some(1));
        assert_eq!(&src[..arms[0].block.open], "local function f() if a then");
        assert_eq!(else_arm.as_ref().unwrap().block.id, Some(2));

        let StmtKind::While { body, .. } = &chunk.block.stmts[1].kind else {
            panic!("expected while");
        };
        assert_eq!(body.id, Some(3));
        assert!(body.stmts.is_empty());
        let StmtKind::Do(block) = &chunk.block.stmts[2].kind else {
            panic!("expected do");
        };
        assert_eq!(block.id, None);
    }

    #[test]
    fn test_precedence() {
        let body = stmts("x = 1 + 2 * 3 .. 'a'");
        let StmtKind::Assign { values, .. } = &body[0].kind else {
            panic!("expected assignment");
        };
        // concat binds looser than arithmetic
        assert!(matches!(
            values[0].kind,
            ExprKind::Binary {
                op: BinOp::Concat,
                ..
            }
        ));
    }

    #[test]
    fn test_return_must_end_block() {
        let err = parse("return 1\nx = 2").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_break_outside_loop() {
        assert!(parse("break").is_err());
        assert!(parse("while true do break end").is_ok());
        assert!(parse("while true do local f = function() break end end").is_err());
    }

    #[test]
    fn test_expression_is_not_statement() {
        assert!(parse("x + 1").is_err());
        assert!(parse("(f)").is_err());
    }

    #[test]
    fn test_semicolon_separated_statements() {
        let body = stmts("a = 1; b = 2;; c = 3");
        assert_eq!(body.len(), 3);
    }

    #[test]
    fn test_tokens_keep_comments() {
        let chunk = parse("-- header\nx = 1").unwrap();
        assert_eq!(chunk.tokens[0].kind, TokenKind::Comment);
        assert_eq!(chunk.block.stmts.len(), 1);
    }

    #[test]
    fn test_table_constructor() {
        let body = stmts("t = { 1, 2, name = 'x', [3] = true; }");
        let StmtKind::Assign { values, .. } = &body[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Table(fields) = &values[0].kind else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_deep_nesting_is_an_error_not_a_crash() {
        let src = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse(&src).is_err());
    }
}
