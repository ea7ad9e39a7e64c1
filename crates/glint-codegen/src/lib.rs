//! Glint Code Generator
//!
//! Turns a parsed template into a [`Procedure`]: a tree of ops over compiled
//! expressions with every name already resolved. A procedure can be emitted as
//! JavaScript source or rendered directly against JSON data.
//!
//! ```text
//! Template AST → generate() → Procedure ─┬→ emit()   → JavaScript
//!                                        └→ render() → HTML
//! ```
//!
//! # Example
//!
//! ```
//! use glint_codegen::Environment;
//! use serde_json::json;
//!
//! let procedure = glint_codegen::compile("<p>{{ name | upper }}</p>", "hello.glint").unwrap();
//! let html = procedure.render(&json!({ "name": "ada" }), &Environment::new()).unwrap();
//! assert_eq!(html, "<p>ADA</p>");
//! ```

pub mod emit;
pub mod escape;
pub mod filters;
pub mod generator;
pub mod ir;
pub mod library;
pub mod methods;
pub mod render;
pub mod resolve;
pub mod sink;
pub mod value;

pub use filters::FilterRegistry;
pub use generator::{condition_mode, generate};
pub use ir::{CExpr, CondMode, Op, Procedure};
pub use library::Library;
pub use render::{ComponentRenderer, Environment, RenderError, RenderState};
pub use resolve::{Access, DefaultResolver, LocalScope, NameResolver, Resolution, SnakeCaseResolver};
pub use sink::{HtmlBuffer, OutputSink};

use glint_lexer::{CompileError, Location};

/// Code generation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodegenError {
    /// The tree handed to the generator violates a parser guarantee.
    #[error("{location}: internal codegen error: {message}")]
    Internal { message: String, location: Location },

    #[error("{location}: unknown filter '{name}'")]
    UnknownFilter { name: String, location: Location },
}

/// Any error on the way from source text to HTML.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Procedure {
    /// Check that every filter the procedure calls exists in `filters`.
    pub fn link(&self, filters: &FilterRegistry) -> Result<(), CodegenError> {
        match self.filters.iter().find(|(name, _)| !filters.contains(name)) {
            Some((name, span)) => Err(CodegenError::UnknownFilter {
                name: name.clone(),
                location: Location::at(&self.file, *span),
            }),
            None => Ok(()),
        }
    }
}

/// Parse, generate and link a template with the default resolver and the
/// built-in filters.
pub fn compile(source: &str, file: &str) -> Result<Procedure, Error> {
    let template = glint_parser::parse(source, file)?;
    let procedure = generate(&template, &DefaultResolver)?;
    procedure.link(filters::builtin_filters())?;
    Ok(procedure)
}
