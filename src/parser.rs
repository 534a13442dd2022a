//! Recursive-descent parser for penguin.
//!
//! Builds an [`ast::Program`] directly from the token stream; the parser
//! never embeds type or scope information (that is the semantic
//! analyzer's job). On a malformed construct it pushes a `parse-error`
//! diagnostic and attempts single-token recovery at the next `;`, `}`,
//! or the start of a new statement keyword, so one bad statement does
//! not block diagnostics for the rest of the file.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Span};
use crate::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse(mut self, sink: &mut DiagnosticSink) -> Program {
        let mut statements = Vec::new();
        while !self.at_eof() {
            match self.parse_statement(sink) {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.recover(sink),
            }
        }
        if statements.is_empty() {
            let span = self.current().span;
            sink.push(Diagnostic::error(DiagnosticKind::ParseError, span, "empty program is not a valid penguin source"));
        }
        Program { statements }
    }

    // -- token stream helpers -------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str, sink: &mut DiagnosticSink) -> PResult<Token> {
        if let Some(tok) = self.eat(kind) {
            Ok(tok)
        } else {
            let span = self.current().span;
            sink.push(Diagnostic::error(
                DiagnosticKind::ParseError,
                span,
                format!("expected {}, found `{}`", what, self.current().lexeme_or_kind()),
            ));
            Err(())
        }
    }

    /// Recover from a parse error by skipping to the next `;`, `}`, or the
    /// start of a recognized statement keyword.
    fn recover(&mut self, _sink: &mut DiagnosticSink) {
        loop {
            if self.at_eof() {
                return;
            }
            if self.check(TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if self.check(TokenKind::RBrace) {
                return;
            }
            if self.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    fn starts_statement(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::If
                | TokenKind::Loop
                | TokenKind::Procedure
                | TokenKind::Return
                | TokenKind::List
                | TokenKind::Int
                | TokenKind::Sprite
                | TokenKind::Tileset
                | TokenKind::Tilemap
        )
    }

    fn type_name(&self) -> Option<TypeName> {
        Some(match self.current().kind {
            TokenKind::Int => TypeName::Int,
            TokenKind::Sprite => TypeName::Sprite,
            TokenKind::Tileset => TypeName::Tileset,
            TokenKind::Tilemap => TypeName::Tilemap,
            _ => return None,
        })
    }

    // -- statements -----------------------------------------------------------

    fn parse_statement(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        match self.current().kind {
            TokenKind::Procedure => self.parse_proc_decl(sink),
            TokenKind::If => self.parse_if(sink),
            TokenKind::Loop => self.parse_loop(sink),
            TokenKind::Return => self.parse_return(sink),
            TokenKind::List => self.parse_list_init(sink),
            TokenKind::Int | TokenKind::Sprite | TokenKind::Tileset | TokenKind::Tilemap => {
                self.parse_decl_or_init(sink)
            }
            TokenKind::Identifier => self.parse_assignment_or_call(sink),
            _ => {
                let span = self.current().span;
                sink.push(Diagnostic::error(
                    DiagnosticKind::ParseError,
                    span,
                    format!("unexpected token `{}` at start of statement", self.current().lexeme_or_kind()),
                ));
                Err(())
            }
        }
    }

    fn parse_block(&mut self, sink: &mut DiagnosticSink) -> PResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace, "`{`", sink)?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            match self.parse_statement(sink) {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.recover(sink),
            }
        }
        self.expect(TokenKind::RBrace, "`}`", sink)?;
        Ok(statements)
    }

    fn parse_decl_or_init(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.current().span;
        let ty = self.type_name().expect("caller checked type token");
        self.advance();
        let name_tok = self.expect(TokenKind::Identifier, "an identifier", sink)?;
        if self.eat(TokenKind::Assign).is_some() {
            let expr = self.parse_expr(sink)?;
            let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
            let span = start.merge(&semi.span);
            return Ok(Statement::Initialization { ty, name: name_tok.lexeme, expr, span });
        }
        let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
        let span = start.merge(&semi.span);
        Ok(Statement::Declaration { ty, name: name_tok.lexeme, span })
    }

    fn parse_list_init(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.advance().span; // `list`
        let name_tok = self.expect(TokenKind::Identifier, "an identifier", sink)?;
        self.expect(TokenKind::Assign, "`=`", sink)?;
        self.expect(TokenKind::LBracket, "`[`", sink)?;
        let mut elements = Vec::new();
        if !self.check(TokenKind::RBracket) {
            elements.push(self.parse_expr(sink)?);
            while self.eat(TokenKind::Comma).is_some() {
                elements.push(self.parse_expr(sink)?);
            }
        }
        self.expect(TokenKind::RBracket, "`]`", sink)?;
        let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
        let span = start.merge(&semi.span);
        Ok(Statement::ListInit { name: name_tok.lexeme, elements, span })
    }

    fn parse_assignment_or_call(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.current().span;
        let lvalue = self.parse_lvalue_or_call(sink)?;
        if self.eat(TokenKind::Assign).is_some() {
            let expr = self.parse_expr(sink)?;
            let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
            let span = start.merge(&semi.span);
            return Ok(Statement::Assignment { lvalue, expr, span });
        }
        let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
        let span = start.merge(&semi.span);
        Ok(Statement::ProcCallStmt { call: lvalue, span })
    }

    /// Parses a dotted/indexed path that can be either an lvalue
    /// (`display.oam[0].x`) or a procedure call (`foo(1, 2)`), sharing
    /// the same postfix grammar as expressions.
    fn parse_lvalue_or_call(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        self.parse_postfix(sink)
    }

    fn parse_if(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.advance().span; // `if`
        self.expect(TokenKind::LParen, "`(`", sink)?;
        let cond = self.parse_expr(sink)?;
        self.expect(TokenKind::RParen, "`)`", sink)?;
        let then_block = self.parse_block(sink)?;
        let mut span = start;
        let else_block = if self.eat(TokenKind::Else).is_some() {
            let block = self.parse_block(sink)?;
            if let Some(last) = block.last() {
                span = span.merge(&last.span());
            }
            Some(block)
        } else if let Some(last) = then_block.last() {
            span = span.merge(&last.span());
            None
        } else {
            None
        };
        Ok(Statement::If { cond, then_block, else_block, span })
    }

    fn parse_loop(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.advance().span; // `loop`
        self.expect(TokenKind::LParen, "`(`", sink)?;
        let cond = self.parse_expr(sink)?;
        self.expect(TokenKind::RParen, "`)`", sink)?;
        let body = self.parse_block(sink)?;
        let span = start;
        Ok(Statement::Loop { cond, body, span })
    }

    fn parse_proc_decl(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.advance().span; // `procedure`
        let return_ty = self.type_name();
        if return_ty.is_some() {
            self.advance();
        }
        let name_tok = self.expect(TokenKind::Identifier, "a procedure name", sink)?;
        self.expect(TokenKind::LParen, "`(`", sink)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            params.push(self.parse_param(sink)?);
            while self.eat(TokenKind::Comma).is_some() {
                params.push(self.parse_param(sink)?);
            }
        }
        self.expect(TokenKind::RParen, "`)`", sink)?;
        let body = self.parse_block(sink)?;
        let span = start;
        Ok(Statement::ProcDecl { return_ty, name: name_tok.lexeme, params, body, span })
    }

    fn parse_param(&mut self, sink: &mut DiagnosticSink) -> PResult<Param> {
        let span_start = self.current().span;
        let Some(ty) = self.type_name() else {
            let span = self.current().span;
            sink.push(Diagnostic::error(DiagnosticKind::ParseError, span, "expected a parameter type"));
            return Err(());
        };
        self.advance();
        let name_tok = self.expect(TokenKind::Identifier, "a parameter name", sink)?;
        let span = span_start.merge(&name_tok.span);
        Ok(Param { ty, name: name_tok.lexeme, span })
    }

    fn parse_return(&mut self, sink: &mut DiagnosticSink) -> PResult<Statement> {
        let start = self.advance().span; // `return`
        if self.check(TokenKind::Semicolon) {
            let semi = self.advance();
            return Ok(Statement::Return { expr: None, span: start.merge(&semi.span) });
        }
        let expr = self.parse_expr(sink)?;
        let semi = self.expect(TokenKind::Semicolon, "`;`", sink)?;
        Ok(Statement::Return { expr: Some(expr), span: start.merge(&semi.span) })
    }

    // -- expressions, tightest-to-loosest precedence per the language spec ----

    pub fn parse_expr(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        self.parse_xor(sink)
    }

    fn parse_xor(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_or(sink)?;
        while self.check(TokenKind::Xor) {
            self.advance();
            let rhs = self.parse_or(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::Xor, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_or(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_and(sink)?;
        while self.check(TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_bitor(sink)?;
        while self.check(TokenKind::And) {
            self.advance();
            let rhs = self.parse_bitor(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_bitxor(sink)?;
        while self.check(TokenKind::Pipe) {
            self.advance();
            let rhs = self.parse_bitxor(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::BitOr, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_bitand(sink)?;
        while self.check(TokenKind::Caret) {
            self.advance();
            let rhs = self.parse_bitand(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::BitXor, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_equality(sink)?;
        while self.check(TokenKind::Amp) {
            self.advance();
            let rhs = self.parse_equality(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::BitAnd, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_relational(sink)?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_shift(sink)?;
        loop {
            let op = match self.current().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_additive(sink)?;
        loop {
            let op = match self.current().kind {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_mul(sink)?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let mut lhs = self.parse_unary(sink)?;
        while self.check(TokenKind::Star) {
            self.advance();
            let rhs = self.parse_unary(sink)?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Binary { op: BinOp::Mul, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::Plus => Some(UnOp::Plus),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let expr = self.parse_unary(sink)?;
            let span = start.merge(&expr.span());
            return Ok(Expr::Unary { op, expr: Box::new(expr), span });
        }
        self.parse_postfix(sink)
    }

    /// Primary expression plus any chained `.attr` / `[index]` / `(args)`
    /// postfixes, shared between expression parsing and lvalue/call
    /// parsing in statement position.
    ///
    /// A bare dotted identifier chain (`display.tileset0`, `a`) is kept as
    /// an uncommitted path until a `[`, `(`, or a second `.` forces a
    /// decision between a plain [`Expr::Name`], a [`Expr::ListAccess`]
    /// (single-segment path indexed — a user list), an
    /// [`Expr::AttrAccess`] (multi-segment path, optionally indexed — the
    /// builtin namespace), or an [`Expr::ProcCall`].
    fn parse_postfix(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let (mut path, path_span) = if self.check(TokenKind::Identifier) {
            let tok = self.advance();
            (vec![tok.lexeme], tok.span)
        } else {
            // Non-identifier primaries (literals, parens) never start a
            // dotted path; fall back to the ordinary primary parser and
            // chain postfixes onto its result instead.
            let expr = self.parse_primary(sink)?;
            return self.parse_postfix_on(expr, sink);
        };

        while path.len() < 2 && self.check(TokenKind::Dot) {
            self.advance();
            let Some(next) = self.eat(TokenKind::Identifier) else {
                let span = self.current().span;
                sink.push(Diagnostic::error(DiagnosticKind::ParseError, span, "expected an attribute name after `.`"));
                return Err(());
            };
            path.push(next.lexeme);
        }

        if self.check(TokenKind::LParen) {
            self.advance();
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                args.push(self.parse_expr(sink)?);
                while self.eat(TokenKind::Comma).is_some() {
                    args.push(self.parse_expr(sink)?);
                }
            }
            let rp = self.expect(TokenKind::RParen, "`)`", sink)?;
            let span = path_span.merge(&rp.span);
            let expr = Expr::ProcCall { name: path.join("."), args, span };
            return self.parse_postfix_on(expr, sink);
        }

        let expr = if self.check(TokenKind::LBracket) {
            self.advance();
            let index = self.parse_expr(sink)?;
            let rb = self.expect(TokenKind::RBracket, "`]`", sink)?;
            let span = path_span.merge(&rb.span);
            if path.len() == 1 {
                Expr::ListAccess { name: path.remove(0), indices: vec![index], span }
            } else {
                let attr = path.pop().expect("path.len() > 1");
                let base = name_from_path(path, path_span);
                Expr::AttrAccess { base: Box::new(base), attr, indices: vec![index], span }
            }
        } else if path.len() == 1 {
            Expr::Name { path, span: path_span }
        } else {
            let attr = path.pop().expect("path.len() > 1");
            let base = name_from_path(path, path_span);
            Expr::AttrAccess { base: Box::new(base), attr, indices: Vec::new(), span: path_span }
        };

        self.parse_postfix_on(expr, sink)
    }

    /// Continues chaining postfixes (`.attr`, `[index]`) onto an already
    /// committed expression (a literal, a parenthesized expression, or a
    /// chain `parse_postfix` has already resolved once).
    fn parse_postfix_on(&mut self, mut expr: Expr, sink: &mut DiagnosticSink) -> PResult<Expr> {
        loop {
            if self.check(TokenKind::Dot) {
                self.advance();
                let attr_tok = self.expect(TokenKind::Identifier, "an attribute name", sink)?;
                let span = expr.span().merge(&attr_tok.span);
                expr = Expr::AttrAccess { base: Box::new(expr), attr: attr_tok.lexeme, indices: Vec::new(), span };
            } else if self.check(TokenKind::LBracket) {
                self.advance();
                let index = self.parse_expr(sink)?;
                let rb = self.expect(TokenKind::RBracket, "`]`", sink)?;
                let span = expr.span().merge(&rb.span);
                expr = match expr {
                    Expr::ListAccess { name, mut indices, .. } => {
                        indices.push(index);
                        Expr::ListAccess { name, indices, span }
                    }
                    Expr::AttrAccess { base, attr, mut indices, .. } => {
                        indices.push(index);
                        Expr::AttrAccess { base, attr, indices, span }
                    }
                    other => {
                        sink.push(Diagnostic::error(DiagnosticKind::ParseError, span, "`[...]` index applied to a non-indexable expression"));
                        other
                    }
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, sink: &mut DiagnosticSink) -> PResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Decimal => {
                self.advance();
                let value = tok.lexeme.parse::<u64>().unwrap_or(u64::MAX);
                Ok(Expr::Literal { value: Literal::Decimal(value.min(u32::MAX as u64) as u32), span: tok.span })
            }
            TokenKind::Hex => {
                self.advance();
                let digits = &tok.lexeme[2..];
                let value = u64::from_str_radix(digits, 16).unwrap_or(u64::MAX);
                Ok(Expr::Literal { value: Literal::Hex(value.min(u32::MAX as u64) as u32), span: tok.span })
            }
            TokenKind::Binary => {
                self.advance();
                let digits = &tok.lexeme[2..];
                let value = u64::from_str_radix(digits, 2).unwrap_or(u64::MAX);
                Ok(Expr::Literal { value: Literal::Binary(value.min(u32::MAX as u64) as u32), span: tok.span })
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Str(tok.lexeme), span: tok.span })
            }
            // Identifiers (bare names, dotted paths, calls) are fully
            // handled by `parse_postfix` before it falls back here, so
            // this primary parser only ever sees literals and parens.
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(sink)?;
                let rp = self.expect(TokenKind::RParen, "`)`", sink)?;
                let span = tok.span.merge(&rp.span);
                Ok(Expr::Paren { expr: Box::new(inner), span })
            }
            _ => {
                sink.push(Diagnostic::error(
                    DiagnosticKind::ParseError,
                    tok.span,
                    format!("unexpected token `{}` in expression", tok.lexeme_or_kind()),
                ));
                Err(())
            }
        }
    }
}

/// Rebuilds a multi-segment dotted path (e.g. `["display", "oam"]`) into
/// the nested `AttrAccess`/`Name` chain it would have produced had each
/// `.` been seen one at a time, without attaching a span narrower than
/// the whole path (callers re-merge spans as they attach the next hop).
fn name_from_path(mut path: Vec<String>, span: Span) -> Expr {
    if path.len() == 1 {
        return Expr::Name { path, span };
    }
    let head = path.remove(0);
    let mut expr = Expr::Name { path: vec![head], span };
    for attr in path {
        expr = Expr::AttrAccess { base: Box::new(expr), attr, indices: Vec::new(), span };
    }
    expr
}

impl Token {
    fn lexeme_or_kind(&self) -> String {
        if self.lexeme.is_empty() {
            format!("{:?}", self.kind)
        } else {
            self.lexeme.clone()
        }
    }
}

pub fn parse(tokens: Vec<Token>, sink: &mut DiagnosticSink) -> Program {
    Parser::new(tokens).parse(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> (Program, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let tokens = tokenize(src, &mut sink);
        let program = parse(tokens, &mut sink);
        (program, sink)
    }

    #[test]
    fn declaration_and_initialization() {
        let (program, sink) = parse_src("int a; int b = 3;");
        assert!(!sink.has_errors());
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[0], Statement::Declaration { .. }));
        assert!(matches!(program.statements[1], Statement::Initialization { .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (program, sink) = parse_src("int a = 1 + 2 * 3;");
        assert!(!sink.has_errors());
        let Statement::Initialization { expr, .. } = &program.statements[0] else { panic!() };
        let Expr::Binary { op: BinOp::Add, rhs, .. } = expr else { panic!("expected top-level +") };
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn logical_operators_are_left_associative_and_looser_than_bitwise() {
        let (program, sink) = parse_src("int a = 1 & 2 or 3 and 4 xor 5;");
        assert!(!sink.has_errors());
        let Statement::Initialization { expr, .. } = &program.statements[0] else { panic!() };
        assert!(matches!(expr, Expr::Binary { op: BinOp::Xor, .. }));
    }

    #[test]
    fn if_else_and_loop_parse() {
        let (program, sink) = parse_src("loop (1) { if (1) { int x; } else { int y; } }");
        assert!(!sink.has_errors());
        assert!(matches!(program.statements[0], Statement::Loop { .. }));
    }

    #[test]
    fn procedure_decl_with_params_and_return() {
        let (program, sink) = parse_src("procedure int sq(int x) { return x * x; }");
        assert!(!sink.has_errors());
        let Statement::ProcDecl { return_ty, params, .. } = &program.statements[0] else { panic!() };
        assert_eq!(*return_ty, Some(TypeName::Int));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn list_init_and_list_access() {
        let (program, sink) = parse_src("list xs = [1, 2, 3]; int y = xs[0];");
        assert!(!sink.has_errors());
        assert!(matches!(program.statements[0], Statement::ListInit { .. }));
    }

    #[test]
    fn builtin_attribute_access_and_oam_index() {
        let (program, sink) = parse_src("display.oam[0].x = 16;");
        assert!(!sink.has_errors());
        assert!(matches!(program.statements[0], Statement::Assignment { .. }));
    }

    #[test]
    fn empty_program_is_a_parse_error() {
        let (_program, sink) = parse_src("");
        assert!(sink.has_errors());
    }

    #[test]
    fn missing_semicolon_recovers_at_next_statement() {
        let (program, sink) = parse_src("int a = 1 int b = 2;");
        assert!(sink.has_errors());
        assert!(program.statements.iter().any(|s| matches!(s, Statement::Initialization { name, .. } if name == "b")));
    }

    #[test]
    fn call_statement_parses() {
        let (program, sink) = parse_src("control.waitVBlank();");
        assert!(!sink.has_errors());
        assert!(matches!(program.statements[0], Statement::ProcCallStmt { .. }));
    }
}
