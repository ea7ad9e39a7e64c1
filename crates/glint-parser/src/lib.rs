//! Glint Parser
//!
//! Two parsers share the token stream produced by `glint-lexer`:
//!
//! - [`parser::Parser`] builds the body tree (text, output, directives)
//! - [`expr_parser::ExprParser`] parses the expressions embedded in regions
//!
//! # Example
//!
//! ```
//! use glint_parser::ast::NodeKind;
//!
//! let template = glint_parser::parse("<p>{{ name }}</p>", "hello.glint").unwrap();
//! assert_eq!(template.body.nodes.len(), 3);
//! assert!(matches!(template.body.nodes[1].kind, NodeKind::Output(_)));
//! ```

pub mod ast;
pub mod expr_parser;
pub mod parser;

pub use glint_lexer::{CompileError, Location};

use ast::{Template, TemplateKind};
use glint_lexer::Scanner;

/// Tokenize and parse a template. A `@layout` header line selects
/// [`TemplateKind::Layout`].
pub fn parse(source: &str, file: &str) -> Result<Template, CompileError> {
    let tokens = Scanner::tokenize(source, file)?;
    parser::Parser::new(tokens, file).parse_template()
}

/// Tokenize and parse a template as the given kind, ignoring the header.
pub fn parse_with_kind(
    source: &str,
    file: &str,
    kind: TemplateKind,
) -> Result<Template, CompileError> {
    let tokens = Scanner::tokenize(source, file)?;
    parser::Parser::new(tokens, file)
        .with_kind(kind)
        .parse_template()
}
