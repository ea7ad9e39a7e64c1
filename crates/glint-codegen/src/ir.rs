//! The rendering procedure produced by the generator.
//!
//! A tree of [`Op`]s over compiled expressions ([`CExpr`]). Name resolution
//! has already happened: every identifier is either a `Local` or a `Field`
//! with a fixed access strategy, and every property carries the key it reads.

use crate::resolve::Access;
use glint_lexer::Span;
use glint_parser::ast::{BinaryOp, HeaderLine, TemplateKind};
use serde_json::Value;

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub(crate) file: String,
    pub(crate) kind: TemplateKind,
    pub(crate) header: Vec<HeaderLine>,
    pub(crate) ops: Vec<Op>,
    pub(crate) fragments: Vec<String>,
    pub(crate) filters: Vec<(String, Span)>,
}

impl Procedure {
    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn header(&self) -> &[HeaderLine] {
        &self.header
    }

    /// Header value for `@directive`, e.g. `"base"` for `@extends "base"`.
    pub fn header_value(&self, directive: &str) -> Option<&str> {
        self.header.iter().find_map(|h| h.value_of(directive))
    }

    /// Names of the fragments, in source order.
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Distinct filter names used, in order of first use.
    pub fn filters_used(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.filters {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Find the body of fragment `name`.
    pub(crate) fn fragment_body(&self, name: &str) -> Option<&[Op]> {
        find_fragment(&self.ops, name)
    }
}

fn find_fragment<'a>(ops: &'a [Op], name: &str) -> Option<&'a [Op]> {
    ops.iter().find_map(|op| match op {
        Op::Fragment { name: n, body } if n == name => Some(body.as_slice()),
        op => op.children().into_iter().find_map(|body| find_fragment(body, name)),
    })
}

/// One step of a procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Write literal text.
    Raw(String),
    /// Stringify and write, entity-encoded when `escape` is set.
    Write { expr: CExpr, escape: bool },
    If {
        condition: CExpr,
        then_ops: Vec<Op>,
        else_ops: Vec<Op>,
        span: Span,
    },
    /// Iterate with `variable`, `variable_index`, `variable_first` and
    /// `variable_last` bound in each iteration.
    For {
        variable: String,
        collection: CExpr,
        body: Vec<Op>,
        span: Span,
    },
    /// Sequential equality chain: the first arm whose value equals the
    /// subject runs, otherwise `default`.
    Switch {
        subject: CExpr,
        arms: Vec<(CExpr, Vec<Op>)>,
        default: Vec<Op>,
    },
    /// Bind a local in the current scope.
    Set { name: String, value: CExpr },
    /// Render another template with the root data overlaid by `args`.
    Include {
        name: String,
        args: Vec<(String, CExpr)>,
        span: Span,
    },
    /// Render a widget with only `args` as its data.
    Component {
        name: String,
        args: Vec<(String, CExpr)>,
        span: Span,
    },
    /// Inline body that can also be rendered on its own.
    Fragment { name: String, body: Vec<Op> },
    /// The page output, inside a layout.
    Content,
    /// Page-supplied block `name`, or `default` when the page gave none.
    Slot { name: String, default: Vec<Op> },
    /// Capture output for the layout slot `name`.
    Block { name: String, body: Vec<Op> },
    /// Write every push to `name` made so far, in push order.
    Stack { name: String },
    /// Capture output onto the stack `name`.
    Push { name: String, body: Vec<Op> },
}

impl Op {
    /// Nested bodies, in source order.
    pub fn children(&self) -> Vec<&Vec<Op>> {
        match self {
            Op::If {
                then_ops, else_ops, ..
            } => vec![then_ops, else_ops],
            Op::For { body, .. }
            | Op::Fragment { body, .. }
            | Op::Block { body, .. }
            | Op::Push { body, .. } => vec![body],
            Op::Slot { default, .. } => vec![default],
            Op::Switch { arms, default, .. } => {
                let mut bodies: Vec<&Vec<Op>> = arms.iter().map(|(_, body)| body).collect();
                bodies.push(default);
                bodies
            }
            Op::Raw(_)
            | Op::Write { .. }
            | Op::Set { .. }
            | Op::Include { .. }
            | Op::Component { .. }
            | Op::Content
            | Op::Stack { .. } => Vec::new(),
        }
    }
}

/// How a condition is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondMode {
    /// The expression already yields a boolean and is used as-is.
    Direct,
    /// Wrapped in a "not absent and not false" check.
    Present,
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CExpr {
    Literal(Value),
    /// A template-local binding.
    Local(String),
    /// A field of the data context.
    Field { name: String, access: Access },
    Property {
        object: Box<CExpr>,
        key: String,
        null_safe: bool,
    },
    Method {
        object: Box<CExpr>,
        name: String,
        args: Vec<CExpr>,
        null_safe: bool,
        span: Span,
    },
    Index {
        object: Box<CExpr>,
        index: Box<CExpr>,
        span: Span,
    },
    /// Arithmetic, comparison, logic and `~`.
    Binary {
        left: Box<CExpr>,
        op: BinaryOp,
        right: Box<CExpr>,
        span: Span,
    },
    /// Null-safe structural equality, negated for `!=`.
    Equals {
        left: Box<CExpr>,
        right: Box<CExpr>,
        negated: bool,
    },
    Not(Box<CExpr>),
    Negate { operand: Box<CExpr>, span: Span },
    Ternary {
        condition: Box<CExpr>,
        then_expr: Box<CExpr>,
        else_expr: Box<CExpr>,
        span: Span,
    },
    Coalesce {
        left: Box<CExpr>,
        fallback: Box<CExpr>,
    },
    Filter {
        name: String,
        input: Box<CExpr>,
        args: Vec<CExpr>,
        span: Span,
    },
    /// Explicit parentheses from the source.
    Group(Box<CExpr>),
    /// "Not absent and not false".
    Present(Box<CExpr>),
}
