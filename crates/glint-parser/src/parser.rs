//! Body parser for Glint.
//!
//! Parses the token stream from `glint-lexer` into a `Template`: the header
//! declarations plus a tree of body nodes. Directives are recognized by the
//! keyword right after `{{`; every embedded expression is delegated to
//! `ExprParser`, which reports how many tokens it consumed.
//!
//! Uses recursive descent: each block directive parses its own body until
//! one of the keywords that may close it (`end`, `else`, `case`, `default`).

use crate::ast::{
    Body, Case, Expression, HeaderLine, NamedArg, Node, NodeKind, Template, TemplateKind,
};
use crate::expr_parser::ExprParser;
use glint_lexer::{CompileError, Keyword, Location, Span, Token, TokenKind};

type Result<T> = std::result::Result<T, CompileError>;

/// What stopped `parse_body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    /// `{{ <keyword> ...`, not consumed.
    Keyword(Keyword),
    /// End of input.
    Eof,
}

/// Glint template parser.
///
/// Converts the flat token stream into a `Template` using recursive descent.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    kind: Option<TemplateKind>,
    /// Fragment names seen so far; each must be unique per template.
    fragments: Vec<String>,
}

impl Parser {
    /// Create a new parser for the given tokens. `file` is used in errors.
    pub fn new(mut tokens: Vec<Token>, file: impl Into<String>) -> Self {
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(
                TokenKind::Eof,
                "",
                Span::new(end.end, end.end, end.line, end.column),
            ));
        }
        Self {
            tokens,
            pos: 0,
            file: file.into(),
            kind: None,
            fragments: Vec::new(),
        }
    }

    /// Force the template kind instead of reading `@layout` from the header.
    pub fn with_kind(mut self, kind: TemplateKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Parse the whole token stream.
    pub fn parse_template(mut self) -> Result<Template> {
        let mut header = Vec::new();
        while let TokenKind::Header(text) = &self.peek().kind {
            header.push(HeaderLine {
                text: text.clone(),
                span: self.peek().span,
            });
            self.advance();
        }

        let kind = self.kind.unwrap_or_else(|| {
            if header.iter().any(|h| h.directive() == "layout") {
                TemplateKind::Layout
            } else {
                TemplateKind::Page
            }
        });
        self.kind = Some(kind);

        let (body, terminator) = self.parse_body(&[])?;
        match terminator {
            Terminator::Eof => Ok(Template {
                kind,
                file: self.file.clone(),
                header,
                body,
            }),
            Terminator::Keyword(keyword) => Err(self.stray_keyword(keyword)),
        }
    }

    fn template_kind(&self) -> TemplateKind {
        self.kind.unwrap_or_default()
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Parse nodes until end of input or a `{{ keyword` where `keyword` is in
    /// `stops`. The stopping region is left unconsumed.
    fn parse_body(&mut self, stops: &[Keyword]) -> Result<(Body, Terminator)> {
        let mut nodes = Vec::new();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Eof => return Ok((Body::new(nodes), Terminator::Eof)),

                TokenKind::Text(text) => {
                    nodes.push(Node::new(NodeKind::Html(text.clone()), token.span));
                    self.advance();
                }

                TokenKind::Open { .. } => {
                    let directive = match &self.peek_at(1).kind {
                        TokenKind::Keyword(keyword) => Some(*keyword),
                        _ => None,
                    };
                    match directive {
                        Some(keyword @ (Keyword::End | Keyword::Else | Keyword::Case | Keyword::Default)) => {
                            if stops.contains(&keyword) {
                                return Ok((Body::new(nodes), Terminator::Keyword(keyword)));
                            }
                            return Err(self.stray_keyword(keyword));
                        }
                        Some(keyword) => nodes.push(self.parse_directive(keyword)?),
                        None => nodes.push(self.parse_output()?),
                    }
                }

                other => {
                    return Err(self.error(
                        format!("Unexpected {} in template body", other.describe()),
                        token.span,
                    ))
                }
            }
        }
    }

    fn parse_directive(&mut self, keyword: Keyword) -> Result<Node> {
        match keyword {
            Keyword::If => self.parse_if(),
            Keyword::For => self.parse_for(),
            Keyword::Switch => self.parse_switch(),
            Keyword::Set => self.parse_set(),
            Keyword::Raw => self.parse_raw(),
            Keyword::Include => self.parse_call(keyword),
            Keyword::Widget | Keyword::Component => self.parse_call(keyword),
            Keyword::Content => self.parse_content(),
            Keyword::Fragment => self.parse_named_block(keyword),
            Keyword::Slot => self.parse_named_block(keyword),
            Keyword::Block => self.parse_named_block(keyword),
            Keyword::Push => self.parse_named_block(keyword),
            Keyword::Stack => self.parse_stack(),
            Keyword::In => {
                let span = self.peek_at(1).span;
                Err(self.error("'in' is only valid inside 'for'".into(), span))
            }
            Keyword::End | Keyword::Else | Keyword::Case | Keyword::Default => {
                Err(self.stray_keyword(keyword))
            }
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// `{{ expr }}`
    fn parse_output(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        let expr = self.parse_expression()?;
        self.expect_close("expression")?;
        Ok(Node::new(NodeKind::Output(expr), open))
    }

    /// `{{ raw expr }}`
    fn parse_raw(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::Raw)?;
        let expr = self.parse_expression()?;
        self.expect_close("'raw' expression")?;
        Ok(Node::new(NodeKind::RawOutput(expr), open))
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// `{{ if cond }} ... [{{ else if cond }} ...] [{{ else }} ...] {{ end }}`
    fn parse_if(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::If)?;
        self.parse_if_tail(open)
    }

    /// Everything after `if`. An `else if` recurses here, and the nested
    /// `If` consumes the one shared `{{ end }}`.
    fn parse_if_tail(&mut self, open: Span) -> Result<Node> {
        let condition = self.parse_expression()?;
        self.expect_close("'if' condition")?;

        let (then_body, terminator) = self.parse_body(&[Keyword::Else, Keyword::End])?;

        let else_body = match terminator {
            Terminator::Keyword(Keyword::End) => {
                self.consume_end()?;
                None
            }
            Terminator::Keyword(Keyword::Else) => {
                let else_open = self.expect_open()?;
                self.expect_keyword(Keyword::Else)?;

                if self.peek().is_keyword(Keyword::If) {
                    self.advance(); // consume `if`
                    let nested = self.parse_if_tail(else_open)?;
                    Some(Body::new(vec![nested]))
                } else {
                    self.expect_close("'else'")?;
                    let (body, terminator) = self.parse_body(&[Keyword::End])?;
                    if terminator == Terminator::Eof {
                        return Err(self.missing_end("if", open));
                    }
                    self.consume_end()?;
                    Some(body)
                }
            }
            _ => return Err(self.missing_end("if", open)),
        };

        Ok(Node::new(
            NodeKind::If {
                condition,
                then_body,
                else_body,
            },
            open,
        ))
    }

    /// `{{ for item in items }} ... {{ end }}`
    fn parse_for(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::For)?;
        let variable = self.expect_identifier("loop variable after 'for'")?;
        self.expect_keyword(Keyword::In)?;
        let collection = self.parse_expression()?;
        self.expect_close("'for' collection")?;

        let body = self.parse_block_body("for", open)?;
        Ok(Node::new(
            NodeKind::For {
                variable,
                collection,
                body,
            },
            open,
        ))
    }

    /// `{{ switch subject }} {{ case v }} ... {{ default }} ... {{ end }}`
    fn parse_switch(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::Switch)?;
        let subject = self.parse_expression()?;
        self.expect_close("'switch' subject")?;

        let arms = [Keyword::Case, Keyword::Default, Keyword::End];
        let (preamble, mut terminator) = self.parse_body(&arms)?;
        if let Some(node) = preamble.nodes.iter().find(|n| !is_blank(n)) {
            return Err(self.error(
                "Only whitespace is allowed between 'switch' and its first 'case'".into(),
                node.span,
            ));
        }

        let mut cases = Vec::new();
        let mut default = None;

        loop {
            match terminator {
                Terminator::Keyword(Keyword::Case) => {
                    let case_open = self.expect_open()?;
                    if default.is_some() {
                        return Err(self.error(
                            "'case' cannot follow 'default' in a switch".into(),
                            case_open,
                        ));
                    }
                    self.expect_keyword(Keyword::Case)?;
                    let value = self.parse_expression()?;
                    self.expect_close("'case' value")?;
                    let (body, next) = self.parse_body(&arms)?;
                    cases.push(Case { value, body });
                    terminator = next;
                }
                Terminator::Keyword(Keyword::Default) => {
                    let default_open = self.expect_open()?;
                    if default.is_some() {
                        return Err(self.error(
                            "A switch can only have one 'default'".into(),
                            default_open,
                        ));
                    }
                    self.expect_keyword(Keyword::Default)?;
                    self.expect_close("'default'")?;
                    let (body, next) = self.parse_body(&arms)?;
                    default = Some(body);
                    terminator = next;
                }
                Terminator::Keyword(Keyword::End) => {
                    self.consume_end()?;
                    break;
                }
                _ => return Err(self.missing_end("switch", open)),
            }
        }

        Ok(Node::new(
            NodeKind::Switch {
                subject,
                cases,
                default,
            },
            open,
        ))
    }

    /// `{{ set name = expr }}`
    fn parse_set(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::Set)?;
        let name = self.expect_identifier("variable name after 'set'")?;
        if self.peek().kind != TokenKind::Equals {
            return Err(self.unexpected(&format!("where '=' after 'set {name}' was expected")));
        }
        self.advance(); // consume =
        let value = self.parse_expression()?;
        self.expect_close("'set' value")?;
        Ok(Node::new(NodeKind::Set { name, value }, open))
    }

    // =========================================================================
    // Structural directives
    // =========================================================================

    /// `{{ include "name" k=v }}` and `{{ widget "name" k=v }}`.
    fn parse_call(&mut self, keyword: Keyword) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(keyword)?;
        let name = self.expect_string(keyword)?;

        let mut args = Vec::new();
        while self.peek_at(1).kind == TokenKind::Equals {
            let key = match &self.peek().kind {
                TokenKind::Identifier(name) => name.clone(),
                TokenKind::Keyword(k) => k.as_str().to_string(),
                _ => break,
            };
            if args.iter().any(|a: &NamedArg| a.name == key) {
                return Err(self.error(
                    format!("Duplicate argument '{key}'"),
                    self.peek().span,
                ));
            }
            self.advance(); // consume key
            self.advance(); // consume =
            let value = self.parse_expression()?;
            args.push(NamedArg { name: key, value });
        }
        self.expect_close(&format!("'{}' arguments", keyword.as_str()))?;

        let kind = match keyword {
            Keyword::Include => NodeKind::Include { name, args },
            _ => NodeKind::Component { name, args },
        };
        Ok(Node::new(kind, open))
    }

    /// `{{ content }}`, layouts only.
    fn parse_content(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.require_layout(Keyword::Content, open)?;
        self.expect_keyword(Keyword::Content)?;
        self.expect_close("'content'")?;
        Ok(Node::new(NodeKind::Content, open))
    }

    /// `{{ stack "name" }}`
    fn parse_stack(&mut self) -> Result<Node> {
        let open = self.expect_open()?;
        self.expect_keyword(Keyword::Stack)?;
        let name = self.expect_string(Keyword::Stack)?;
        self.expect_close("'stack' name")?;
        Ok(Node::new(NodeKind::Stack { name }, open))
    }

    /// `fragment`, `slot`, `block` and `push`: a quoted name, a body, `end`.
    fn parse_named_block(&mut self, keyword: Keyword) -> Result<Node> {
        let open = self.expect_open()?;
        match keyword {
            Keyword::Slot => self.require_layout(keyword, open)?,
            Keyword::Block if self.template_kind() == TemplateKind::Layout => {
                return Err(self.error(
                    "'block' fills a layout slot and cannot be used inside a layout".into(),
                    open,
                ));
            }
            _ => {}
        }
        self.expect_keyword(keyword)?;
        let name_span = self.peek().span;
        let name = self.expect_string(keyword)?;
        if keyword == Keyword::Fragment {
            if self.fragments.contains(&name) {
                return Err(self.error(format!("fragment '{name}' is defined twice"), name_span));
            }
            self.fragments.push(name.clone());
        }
        self.expect_close(&format!("'{}' name", keyword.as_str()))?;
        let body = self.parse_block_body(keyword.as_str(), open)?;

        let kind = match keyword {
            Keyword::Fragment => NodeKind::Fragment { name, body },
            Keyword::Slot => NodeKind::Slot {
                name,
                default: (!body.is_empty()).then_some(body),
            },
            Keyword::Block => NodeKind::Block { name, body },
            Keyword::Push => NodeKind::Push { name, body },
            other => {
                return Err(self.error(
                    format!("'{}' is not a named block directive", other.as_str()),
                    open,
                ))
            }
        };
        Ok(Node::new(kind, open))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// A body closed by `{{ end }}`, which is consumed.
    fn parse_block_body(&mut self, directive: &str, open: Span) -> Result<Body> {
        let (body, terminator) = self.parse_body(&[Keyword::End])?;
        if terminator == Terminator::Eof {
            return Err(self.missing_end(directive, open));
        }
        self.consume_end()?;
        Ok(body)
    }

    fn require_layout(&self, keyword: Keyword, at: Span) -> Result<()> {
        if self.template_kind() == TemplateKind::Layout {
            Ok(())
        } else {
            Err(self.error(
                format!(
                    "'{}' is only allowed in a layout (declare '@layout' in the header)",
                    keyword.as_str()
                ),
                at,
            ))
        }
    }

    /// Delegate to the expression parser over the rest of the current region,
    /// closing `}}` included so errors point at it.
    fn parse_expression(&mut self) -> Result<Expression> {
        let end = self.tokens[self.pos..]
            .iter()
            .position(|t| matches!(t.kind, TokenKind::Close { .. } | TokenKind::Eof))
            .map_or(self.tokens.len(), |i| self.pos + i + 1);

        let mut parser = ExprParser::new(&self.tokens[self.pos..end], &self.file);
        let expr = parser.parse_expression()?;
        self.pos += parser.position();
        Ok(expr)
    }

    /// `{{ end }}`
    fn consume_end(&mut self) -> Result<()> {
        self.expect_open()?;
        self.expect_keyword(Keyword::End)?;
        self.expect_close("'end'")
    }

    fn expect_open(&mut self) -> Result<Span> {
        match self.peek().kind {
            TokenKind::Open { .. } => {
                let span = self.peek().span;
                self.advance();
                Ok(span)
            }
            _ => Err(self.unexpected("where '{{' was expected")),
        }
    }

    fn expect_close(&mut self, after: &str) -> Result<()> {
        match self.peek().kind {
            TokenKind::Close { .. } => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(
                format!(
                    "Expected '}}}}' after {after}, found {}",
                    self.peek().kind.describe()
                ),
                self.peek().span,
            )),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.peek().is_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("where '{}' was expected", keyword.as_str())))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("where a {what} was expected"))),
        }
    }

    fn expect_string(&mut self, keyword: Keyword) -> Result<String> {
        match &self.peek().kind {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(&format!(
                "where a quoted name after '{}' was expected",
                keyword.as_str()
            ))),
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn unexpected(&self, context: &str) -> CompileError {
        let token = self.peek();
        self.error(
            format!("Unexpected {} {context}", token.kind.describe()),
            token.span,
        )
    }

    fn stray_keyword(&self, keyword: Keyword) -> CompileError {
        let opener = match keyword {
            Keyword::Else => "'if'",
            Keyword::Case | Keyword::Default => "'switch'",
            _ => "a block directive",
        };
        self.error(
            format!("'{}' without a matching {opener}", keyword.as_str()),
            self.peek().span,
        )
    }

    fn missing_end(&self, directive: &str, open: Span) -> CompileError {
        self.error(
            format!(
                "Missing '{{{{ end }}}}' for '{directive}' opened at line {}",
                open.line
            ),
            open,
        )
    }

    fn error(&self, message: String, span: Span) -> CompileError {
        CompileError::new(message, Location::at(&self.file, span))
    }
}

/// Whitespace-only text, allowed between `switch` and its first arm.
fn is_blank(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::Html(text) if text.trim().is_empty())
}
