//! Expression parser for Glint.
//!
//! Parses the tokens of one `{{ ... }}` region (or part of one) into an
//! `Expression` tree by precedence climbing. Loosest to tightest:
//!
//! ```text
//! ternary      a ? b : c
//! coalesce     a ?? b            (right-assoc)
//! or           a || b
//! and          a && b
//! equality     a == b, a != b
//! comparison   a < b, a <= b, a > b, a >= b
//! additive     a + b, a - b
//! multiplicative a * b, a / b, a % b
//! concat       a ~ b
//! unary        !a, -a
//! filter       a | f | g(x)      (left-assoc)
//! chain        a.b, a?.b, a.m(x), a[i]
//! primary      identifier, literal, ( expr )
//! ```

use crate::ast::{BinaryOp, ExprKind, Expression};
use glint_lexer::{CompileError, Location, Scanner, Span, Token, TokenKind};

type Result<T> = std::result::Result<T, CompileError>;

/// Glint expression parser.
///
/// Borrows a token slice and walks it with a cursor. The body parser reads
/// [`ExprParser::position`] afterwards to resume right after the expression.
pub struct ExprParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    file: &'t str,
    eof: Token,
}

impl<'t> ExprParser<'t> {
    /// Create a new expression parser over `tokens`. Parsing stops at the
    /// first token that cannot continue the expression.
    pub fn new(tokens: &'t [Token], file: &'t str) -> Self {
        let end = tokens.last().map(|t| t.span).unwrap_or_default();
        let eof_span = Span::new(end.end, end.end, end.line, end.column);
        Self {
            tokens,
            pos: 0,
            file,
            eof: Token::new(TokenKind::Eof, "", eof_span),
        }
    }

    /// Parse a standalone expression such as `user.name | upper`.
    ///
    /// The whole input must be one expression.
    pub fn parse(source: &str) -> Result<Expression> {
        let wrapped = format!("{{{{ {source} }}}}");
        let mut tokens = Scanner::tokenize(&wrapped, "<expr>")?;
        for token in &mut tokens {
            if token.span.line == 1 {
                token.span.column = token.span.column.saturating_sub(3).max(1);
            }
            token.span.start = token.span.start.saturating_sub(3);
            token.span.end = token.span.end.saturating_sub(3);
        }

        let inner = match tokens.iter().position(|t| matches!(t.kind, TokenKind::Close { .. })) {
            Some(close) => &tokens[1..close],
            None => &tokens[..0],
        };
        let mut parser = ExprParser::new(inner, "<expr>");
        let expr = parser.parse_expression()?;
        parser.expect_end()?;
        Ok(expr)
    }

    /// Number of tokens consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Parse one complete expression starting at the cursor.
    pub fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_ternary()
    }

    /// Fail unless every token of the slice was consumed.
    pub fn expect_end(&self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.unexpected("after expression"))
        }
    }

    // =========================================================================
    // Precedence levels
    // =========================================================================

    fn parse_ternary(&mut self) -> Result<Expression> {
        let condition = self.parse_null_coalesce()?;

        if !self.check(&TokenKind::Question) {
            return Ok(condition);
        }
        self.advance(); // consume ?

        let then_expr = self.parse_ternary()?;
        self.expect(&TokenKind::Colon, "':' in ternary expression")?;
        let else_expr = self.parse_ternary()?;

        let span = condition.span.to(else_expr.span);
        Ok(Expression::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_null_coalesce(&mut self) -> Result<Expression> {
        let left = self.parse_or()?;

        if !self.check(&TokenKind::QuestionQuestion) {
            return Ok(left);
        }
        self.advance(); // consume ??

        let fallback = self.parse_null_coalesce()?;
        let span = left.span.to(fallback.span);
        Ok(Expression::new(
            ExprKind::NullCoalesce {
                left: Box::new(left),
                fallback: Box::new(fallback),
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> Result<Expression> {
        self.binary_level(&[(TokenKind::OrOr, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        self.binary_level(&[(TokenKind::AndAnd, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        self.binary_level(
            &[
                (TokenKind::EqEq, BinaryOp::Eq),
                (TokenKind::NotEq, BinaryOp::NotEq),
            ],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::LtEq, BinaryOp::LtEq),
                (TokenKind::GtEq, BinaryOp::GtEq),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        self.binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_concat,
        )
    }

    fn parse_concat(&mut self) -> Result<Expression> {
        self.binary_level(&[(TokenKind::Tilde, BinaryOp::Concat)], Self::parse_unary)
    }

    /// One left-associative binary level.
    fn binary_level(
        &mut self,
        operators: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression>,
    ) -> Result<Expression> {
        let mut left = next(self)?;

        while let Some(op) = operators
            .iter()
            .find(|(kind, _)| self.check(kind))
            .map(|(_, op)| *op)
        {
            self.advance();
            let right = next(self)?;
            let span = left.span.to(right.span);
            left = Expression::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let start = self.peek().span;

        if self.check(&TokenKind::Bang) {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expression::new(ExprKind::Not(Box::new(operand)), span));
        }
        if self.check(&TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expression::new(ExprKind::Negate(Box::new(operand)), span));
        }

        self.parse_filter_chain()
    }

    /// `input | name`, `input | name(args)`, chained left to right.
    fn parse_filter_chain(&mut self) -> Result<Expression> {
        let mut expr = self.parse_chain()?;

        while self.check(&TokenKind::Pipe) {
            self.advance(); // consume |
            let (name, name_span) = self.expect_name("filter name after '|'")?;
            let (args, end) = if self.check(&TokenKind::LParen) {
                self.parse_arguments()?
            } else {
                (Vec::new(), name_span)
            };
            let span = expr.span.to(end);
            expr = Expression::new(
                ExprKind::Filter {
                    input: Box::new(expr),
                    name,
                    args,
                },
                span,
            );
        }

        Ok(expr)
    }

    /// Property, method and index access, freely interleaved.
    fn parse_chain(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&TokenKind::LBracket) {
                self.advance(); // consume [
                let index = self.parse_expression()?;
                let end = self.expect(&TokenKind::RBracket, "']' after index")?;
                let span = expr.span.to(end);
                expr = Expression::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
                continue;
            }

            let null_safe = if self.check(&TokenKind::Dot) {
                false
            } else if self.check(&TokenKind::QuestionDot) {
                true
            } else {
                break;
            };
            self.advance(); // consume . or ?.

            let (name, name_span) = self.expect_name("property name")?;
            let object = Box::new(expr);

            expr = if self.check(&TokenKind::LParen) {
                let (args, end) = self.parse_arguments()?;
                let span = object.span.to(end);
                let kind = if null_safe {
                    ExprKind::NullSafeMethodCall { object, name, args }
                } else {
                    ExprKind::MethodCall { object, name, args }
                };
                Expression::new(kind, span)
            } else {
                let span = object.span.to(name_span);
                let kind = if null_safe {
                    ExprKind::NullSafeProperty { object, name }
                } else {
                    ExprKind::Property { object, name }
                };
                Expression::new(kind, span)
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let token = self.peek().clone();

        let kind = match &token.kind {
            TokenKind::Identifier(name) => {
                if self.peek_at(1).kind == TokenKind::LParen {
                    return Err(self.error(
                        format!("Cannot call '{name}(...)': only methods and filters can be called"),
                        token.span,
                    ));
                }
                ExprKind::Variable(name.clone())
            }
            TokenKind::String(value) => ExprKind::String(value.clone()),
            TokenKind::Number(raw) => ExprKind::Number(raw.clone()),
            TokenKind::Boolean(b) => ExprKind::Boolean(*b),
            TokenKind::LParen => {
                self.advance(); // consume (
                let inner = self.parse_expression()?;
                let end = self.expect(&TokenKind::RParen, "')' to close group")?;
                return Ok(Expression::new(
                    ExprKind::Grouped(Box::new(inner)),
                    token.span.to(end),
                ));
            }
            _ => return Err(self.unexpected("in expression")),
        };

        self.advance();
        Ok(Expression::new(kind, token.span))
    }

    /// `( expr, expr, ... )`. Returns the arguments and the span of `)`.
    fn parse_arguments(&mut self) -> Result<(Vec<Expression>, Span)> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();

        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance(); // consume ,
            }
        }

        let end = self.expect(&TokenKind::RParen, "')' after arguments")?;
        Ok((args, end))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// An identifier, or a keyword used as a name (`post.content`, `| default`).
    fn expect_name(&mut self, what: &str) -> Result<(String, Span)> {
        let token = self.peek();
        let name = match &token.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Keyword(keyword) => keyword.as_str().to_string(),
            _ => return Err(self.unexpected(&format!("where {what} was expected"))),
        };
        let span = token.span;
        self.advance();
        Ok((name, span))
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Span> {
        if self.check(kind) {
            let span = self.peek().span;
            self.advance();
            Ok(span)
        } else {
            Err(self.error(
                format!("Expected {what}, found {}", self.peek().kind.describe()),
                self.peek().span,
            ))
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn unexpected(&self, context: &str) -> CompileError {
        let token = self.peek();
        self.error(
            format!("Unexpected {} {context}", token.kind.describe()),
            token.span,
        )
    }

    fn error(&self, message: String, span: Span) -> CompileError {
        CompileError::new(message, Location::at(self.file, span))
    }
}
