//! Glint Lexer
//!
//! Tokenizes Glint template sources into a stream of tokens.
//! Handles the optional `@` header, literal text, `{{ ... }}` regions,
//! comments, whitespace-trim markers and verbatim blocks.
//!
//! # Example
//!
//! ```
//! use glint_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("", "empty.glint").unwrap();
//! assert_eq!(tokens.len(), 1); // Just EOF
//! assert_eq!(tokens[0].kind, TokenKind::Eof);
//! ```

pub mod scanner;
pub mod token;

use std::fmt;

pub use scanner::Scanner;
pub use token::{Keyword, Span, Token, TokenKind};

/// A source position attached to every compile error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Location of a span inside `file`.
    pub fn at(file: &str, span: Span) -> Self {
        Self::new(file, span.line, span.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Error raised by the lexer and both parsers.
///
/// The pipeline is fail-fast: the first error aborts compilation of the template.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{location}: {message}")]
pub struct CompileError {
    pub message: String,
    pub location: Location,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Render the offending source line with a caret under the error column.
    ///
    /// ```text
    ///  --> page.glint:2:7
    ///   |
    /// 2 | <p>{{ if }}</p>
    ///   |       ^
    /// ```
    pub fn pointer(&self, source: &str) -> String {
        let line_no = self.location.line;
        let Some(line) = source.lines().nth(line_no.saturating_sub(1)) else {
            return format!(" --> {}\n", self.location);
        };
        let gutter = " ".repeat(line_no.to_string().len());
        let caret_pad: String = line
            .chars()
            .take(self.location.column.saturating_sub(1))
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        format!(
            "{gutter}--> {}\n{gutter} |\n{line_no} | {line}\n{gutter} | {caret_pad}^\n",
            self.location
        )
    }
}
