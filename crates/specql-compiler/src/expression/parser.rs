//! Recursive-descent expression parser.
//!
//! Precedence, lowest first:
//! - Logical: OR, AND, NOT
//! - Comparison: = <> < <= > >=, [NOT] LIKE/ILIKE/IN/BETWEEN, IS [NOT] NULL
//! - Additive: + - ||
//! - Multiplicative: * / %
//! - Unary: -
//! - Postfix: `::type`
//! - Primary: literals, names, function calls, groups, sub-queries

use std::collections::BTreeSet;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ExpressionError, ExpressionResult};
use super::lexer::{Token, TokenKind};
use super::security;

/// Deepest nesting accepted before failing with a syntax error.
pub const MAX_DEPTH: usize = 256;

/// Parser state.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    functions: &'a BTreeSet<String>,
}

// ==================== TOKEN HELPERS ====================

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>, functions: &'a BTreeSet<String>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
            functions,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(s) if s.eq_ignore_ascii_case(name))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ExpressionResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(kind.name()))
        }
    }

    fn expect_ident(&mut self) -> ExpressionResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> ExpressionError {
        ExpressionError::syntax(
            format!("expected {}, found {}", expected, self.peek().name()),
            self.offset(),
        )
    }

    fn enter(&mut self) -> ExpressionResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(
                format!("expression nested deeper than {} levels", MAX_DEPTH),
                self.offset(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

// ==================== EXPRESSIONS ====================

impl<'a> Parser<'a> {
    /// Parses a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> ExpressionResult<Expr> {
        if self.check(&TokenKind::Eof) {
            return Err(ExpressionError::syntax("empty expression", 0));
        }
        let expr = self.parse_expr()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> ExpressionResult<Expr> {
        self.enter()?;
        let result = self.parse_or();
        self.leave();
        result
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            self.enter()?;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            self.enter()?;
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> ExpressionResult<Expr> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let expr = self.parse_not();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr?),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_additive()?;

        loop {
            // Each fold deepens the tree the renderer walks.
            self.enter()?;
            let op = match self.peek() {
                TokenKind::Eq => Some(BinaryOp::Eq),
                TokenKind::NotEq => Some(BinaryOp::NotEq),
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::LtEq => Some(BinaryOp::LtEq),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::GtEq => Some(BinaryOp::GtEq),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                let right = self.parse_additive()?;
                left = binary(op, left, right);
                continue;
            }

            if self.eat(&TokenKind::Is) {
                let negated = self.eat(&TokenKind::Not);
                self.expect(&TokenKind::Null)?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            let negated = self.check(&TokenKind::Not)
                && matches!(
                    self.peek_at(1),
                    TokenKind::In | TokenKind::Like | TokenKind::ILike | TokenKind::Between
                );
            if negated {
                self.advance();
            }

            left = match self.peek() {
                TokenKind::Like | TokenKind::ILike => {
                    let insensitive = self.advance() == TokenKind::ILike;
                    let op = match (insensitive, negated) {
                        (false, false) => BinaryOp::Like,
                        (false, true) => BinaryOp::NotLike,
                        (true, false) => BinaryOp::ILike,
                        (true, true) => BinaryOp::NotILike,
                    };
                    let right = self.parse_additive()?;
                    binary(op, left, right)
                }
                TokenKind::In => {
                    self.advance();
                    self.parse_in(left, negated)?
                }
                TokenKind::Between => {
                    self.advance();
                    let low = self.parse_additive()?;
                    self.expect(&TokenKind::And)?;
                    let high = self.parse_additive()?;
                    Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    }
                }
                _ => break,
            };
        }

        self.depth = depth;
        Ok(left)
    }

    fn parse_in(&mut self, left: Expr, negated: bool) -> ExpressionResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        if self.check(&TokenKind::Select) {
            let query = self.parse_subquery()?;
            return Ok(Expr::InSubquery {
                expr: Box::new(left),
                query,
                negated,
            });
        }

        let mut list = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::InList {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn parse_additive(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Concat => BinaryOp::Concat,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let expr = self.parse_unary();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr?),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ExpressionResult<Expr> {
        let depth = self.depth;
        let mut expr = self.parse_primary()?;
        while self.eat(&TokenKind::DoubleColon) {
            self.enter()?;
            let type_name = self.expect_ident()?;
            expr = Expr::Cast {
                expr: Box::new(expr),
                type_name: type_name.to_ascii_uppercase(),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            TokenKind::Exists => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                if !self.check(&TokenKind::Select) {
                    return Err(self.unexpected("SELECT"));
                }
                Ok(Expr::Exists(self.parse_subquery()?))
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::EmptyGroup);
                }
                if self.check(&TokenKind::Select) {
                    return Ok(Expr::Subquery(self.parse_subquery()?));
                }
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Group(Box::new(inner)))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.parse_call(name);
                }
                let mut path = vec![name];
                while self.eat(&TokenKind::Dot) {
                    path.push(self.expect_ident()?);
                }
                Ok(Expr::Ident(path))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call(&mut self, name: String) -> ExpressionResult<Expr> {
        security::check_function(&name, self.functions)?;
        let upper = name.to_ascii_uppercase();
        self.expect(&TokenKind::LParen)?;

        let expr = match upper.as_str() {
            "EXTRACT" => {
                let field = self.expect_ident()?.to_ascii_uppercase();
                if !self.check_ident("FROM") {
                    return Err(self.unexpected("FROM"));
                }
                self.advance();
                let source = self.parse_expr()?;
                Expr::Extract {
                    field,
                    source: Box::new(source),
                }
            }
            "POSITION" => {
                let needle = self.parse_additive()?;
                self.expect(&TokenKind::In)?;
                let haystack = self.parse_additive()?;
                Expr::Position {
                    needle: Box::new(needle),
                    haystack: Box::new(haystack),
                }
            }
            "SUBSTRING" if !self.is_plain_call() => {
                let source = self.parse_additive()?;
                if !self.check_ident("FROM") {
                    return Err(self.unexpected("FROM"));
                }
                self.advance();
                let from = self.parse_additive()?;
                let count = if self.check_ident("FOR") {
                    self.advance();
                    Some(Box::new(self.parse_additive()?))
                } else {
                    None
                };
                Expr::Substring {
                    source: Box::new(source),
                    from: Box::new(from),
                    count,
                }
            }
            _ => {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    args.push(self.parse_expr()?);
                    while self.eat(&TokenKind::Comma) {
                        args.push(self.parse_expr()?);
                    }
                }
                Expr::Call { name: upper, args }
            }
        };

        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    /// Whether the argument list at the cursor uses commas rather than `FROM`.
    fn is_plain_call(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.peek_at(offset) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => return true,
                TokenKind::RParen => depth -= 1,
                TokenKind::Comma if depth == 0 => return true,
                TokenKind::Ident(word) if depth == 0 && word.eq_ignore_ascii_case("FROM") => {
                    return false
                }
                TokenKind::Eof => return true,
                _ => {}
            }
            offset += 1;
        }
    }

    /// Consumes `SELECT ... )` and returns the trimmed query text.
    ///
    /// The opening parenthesis has already been consumed; the closing one is.
    fn parse_subquery(&mut self) -> ExpressionResult<String> {
        let first = self.pos;
        let start = self.offset();
        let mut depth = 0usize;

        loop {
            let token_start = self.offset();
            match self.advance() {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => {
                    security::scan_subquery(&self.tokens[first..self.pos - 1], self.functions)?;
                    return Ok(self.source[start..token_start].trim().to_string());
                }
                TokenKind::RParen => depth -= 1,
                TokenKind::Eof => {
                    return Err(ExpressionError::syntax("unclosed sub-query", start));
                }
                _ => {}
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lexer::Lexer;
    use crate::expression::security::DEFAULT_FUNCTIONS;

    fn parse(input: &str) -> ExpressionResult<Expr> {
        let functions: BTreeSet<String> = DEFAULT_FUNCTIONS.iter().map(|f| f.to_string()).collect();
        let tokens = Lexer::new(input).tokenize()?;
        Parser::new(input, tokens, &functions).parse()
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(vec![name.to_string()]))
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let expr = parse("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: ident("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: ident("b"),
                    right: ident("c"),
                }),
            }
        );
    }

    #[test]
    fn test_not_in_subquery() {
        let expr = parse("status NOT IN (SELECT code FROM crm.tb_status WHERE active)").unwrap();
        assert_eq!(
            expr,
            Expr::InSubquery {
                expr: ident("status"),
                query: "SELECT code FROM crm.tb_status WHERE active".to_string(),
                negated: true,
            }
        );
    }

    #[test]
    fn test_nested_subquery_parentheses() {
        let expr = parse("EXISTS (SELECT 1 FROM t WHERE x IN (SELECT y FROM u))").unwrap();
        assert_eq!(
            expr,
            Expr::Exists("SELECT 1 FROM t WHERE x IN (SELECT y FROM u)".to_string())
        );
    }

    #[test]
    fn test_special_forms() {
        assert!(matches!(
            parse("EXTRACT(year FROM created_at)").unwrap(),
            Expr::Extract { ref field, .. } if field == "YEAR"
        ));
        assert!(matches!(parse("POSITION('@' IN email)").unwrap(), Expr::Position { .. }));
        assert!(matches!(
            parse("SUBSTRING(name FROM 1 FOR 3)").unwrap(),
            Expr::Substring { count: Some(_), .. }
        ));
        assert!(matches!(parse("SUBSTRING(name, 1, 3)").unwrap(), Expr::Call { .. }));
    }

    #[test]
    fn test_between_and_is_null() {
        assert!(matches!(
            parse("score NOT BETWEEN 1 AND 10").unwrap(),
            Expr::Between { negated: true, .. }
        ));
        assert!(matches!(
            parse("email IS NOT NULL").unwrap(),
            Expr::IsNull { negated: true, .. }
        ));
    }

    #[test]
    fn test_empty_group() {
        assert_eq!(parse("()").unwrap(), Expr::EmptyGroup);
    }

    #[test]
    fn test_disallowed_function_fails_closed() {
        assert!(matches!(
            parse("UPPER(TRIM(XP_CMDSHELL('dir')))"),
            Err(ExpressionError::Security { .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse(""), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(parse("a ="), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(parse("(a = 1"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(parse("a b"), Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn test_depth_guard() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
        assert!(matches!(parse(&deep), Err(ExpressionError::Syntax { .. })));

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn test_operator_chains_count_towards_depth() {
        for op in [" + ", " AND ", " OR ", " * ", " || ", " = "] {
            let long = vec!["1"; 20_000].join(op);
            assert!(
                matches!(parse(&long), Err(ExpressionError::Syntax { .. })),
                "{op}"
            );
        }
        let casts = format!("1{}", "::int".repeat(20_000));
        assert!(matches!(parse(&casts), Err(ExpressionError::Syntax { .. })));

        let short = vec!["score"; 100].join(" + ");
        assert!(parse(&short).is_ok());
        assert!(parse("a + b + c > 1 AND d = 2 OR e IS NULL").is_ok());
    }

    #[test]
    fn test_chains_inside_groups_release_depth() {
        let group = format!("({})", vec!["1"; 100].join(" + "));
        let many = vec![group; 50].join(" * 1 + ");
        assert!(parse(&many).is_ok());
    }
}
