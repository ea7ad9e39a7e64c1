//! Abstract Syntax Tree for Glint templates.
//!
//! Contains the body-level nodes (text, output, directives) and the
//! expression-level nodes embedded in them. Every node owns its children;
//! both trees are built once by the parser and only read afterwards.

use glint_lexer::Span;

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Which side of the layout relationship a template is compiled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateKind {
    /// A regular page or partial. May define `block`s.
    #[default]
    Page,
    /// A layout. May use `content` and `slot`.
    Layout,
}

/// A parsed template: opaque header declarations plus the body tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub kind: TemplateKind,
    /// File identifier used in error locations.
    pub file: String,
    pub header: Vec<HeaderLine>,
    pub body: Body,
}

impl Template {
    /// Find a header declaration by directive name, e.g. `"extends"` for
    /// `@extends "base"`. Returns the text after the directive name.
    pub fn header_value(&self, directive: &str) -> Option<&str> {
        self.header.iter().find_map(|h| h.value_of(directive))
    }
}

/// One `@...` header line, kept verbatim for external analyzers.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLine {
    pub text: String,
    pub span: Span,
}

impl HeaderLine {
    /// The directive name without `@`: `param` for `@param User user`.
    pub fn directive(&self) -> &str {
        let rest = self.text.trim_start_matches('@');
        rest.split_whitespace().next().unwrap_or("")
    }

    /// The text after the directive name, trimmed, if the name matches.
    pub fn value_of(&self, directive: &str) -> Option<&str> {
        if self.directive() != directive {
            return None;
        }
        let rest = self.text.trim_start_matches('@').trim_start();
        Some(rest[directive.len()..].trim())
    }
}

// ---------------------------------------------------------------------------
// Body-level AST
// ---------------------------------------------------------------------------

/// An ordered sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub nodes: Vec<Node>,
}

impl Body {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of nodes including nested bodies.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(Node::node_count).sum()
    }
}

/// A body node with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    fn node_count(&self) -> usize {
        let nested: usize = match &self.kind {
            NodeKind::If {
                then_body,
                else_body,
                ..
            } => then_body.node_count() + else_body.as_ref().map_or(0, Body::node_count),
            NodeKind::For { body, .. }
            | NodeKind::Fragment { body, .. }
            | NodeKind::Block { body, .. }
            | NodeKind::Push { body, .. } => body.node_count(),
            NodeKind::Switch { cases, default, .. } => {
                cases.iter().map(|c| c.body.node_count()).sum::<usize>()
                    + default.as_ref().map_or(0, Body::node_count)
            }
            NodeKind::Slot { default, .. } => default.as_ref().map_or(0, Body::node_count),
            NodeKind::Html(_)
            | NodeKind::Output(_)
            | NodeKind::RawOutput(_)
            | NodeKind::Set { .. }
            | NodeKind::Include { .. }
            | NodeKind::Component { .. }
            | NodeKind::Content
            | NodeKind::Stack { .. } => 0,
        };
        1 + nested
    }
}

/// Body node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal markup, written unchanged.
    Html(String),

    /// `{{ expr }}` - escaped output.
    Output(Expression),

    /// `{{ raw expr }}` - unescaped output.
    RawOutput(Expression),

    /// `{{ if cond }} ... {{ else }} ... {{ end }}`.
    /// `else if` is stored as an else body holding a single nested `If`.
    If {
        condition: Expression,
        then_body: Body,
        else_body: Option<Body>,
    },

    /// `{{ for item in items }} ... {{ end }}`
    For {
        variable: String,
        collection: Expression,
        body: Body,
    },

    /// `{{ switch subject }} {{ case v }} ... {{ default }} ... {{ end }}`
    Switch {
        subject: Expression,
        cases: Vec<Case>,
        default: Option<Body>,
    },

    /// `{{ set name = expr }}`
    Set { name: String, value: Expression },

    /// `{{ include "name" k=v }}`
    Include { name: String, args: Vec<NamedArg> },

    /// `{{ widget "name" k=v }}` (also spelled `component`)
    Component { name: String, args: Vec<NamedArg> },

    /// `{{ fragment "name" }} ... {{ end }}`
    Fragment { name: String, body: Body },

    /// `{{ content }}` - the page output inside a layout.
    Content,

    /// `{{ slot "name" }} default ... {{ end }}`
    Slot { name: String, default: Option<Body> },

    /// `{{ block "name" }} ... {{ end }}`
    Block { name: String, body: Body },

    /// `{{ stack "name" }}`
    Stack { name: String },

    /// `{{ push "name" }} ... {{ end }}`
    Push { name: String, body: Body },
}

/// One `case` arm of a `switch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub value: Expression,
    pub body: Body,
}

/// A `key=value` argument of `include` and `widget`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: String,
    pub value: Expression,
}

// ---------------------------------------------------------------------------
// Expression-level AST
// ---------------------------------------------------------------------------

/// A complete expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Identifier: `user`, `item_index`
    Variable(String),

    /// String literal: `"hello"`, `'world'`
    String(String),

    /// Numeric literal, raw text as written: `42`, `3.14`
    Number(String),

    /// Boolean literal: `true`, `false`
    Boolean(bool),

    /// `user.name`
    Property {
        object: Box<Expression>,
        name: String,
    },

    /// `user?.name`
    NullSafeProperty {
        object: Box<Expression>,
        name: String,
    },

    /// `items.contains(x)`
    MethodCall {
        object: Box<Expression>,
        name: String,
        args: Vec<Expression>,
    },

    /// `user?.roles.contains(x)` - the `?.` link
    NullSafeMethodCall {
        object: Box<Expression>,
        name: String,
        args: Vec<Expression>,
    },

    /// `items[0]`
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },

    /// `a + b`, `count > 0`
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },

    /// `!active`
    Not(Box<Expression>),

    /// `-count`
    Negate(Box<Expression>),

    /// `count > 0 ? 'yes' : 'no'`
    Ternary {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    /// `name ?? 'anonymous'`
    NullCoalesce {
        left: Box<Expression>,
        fallback: Box<Expression>,
    },

    /// `name | truncate(10)`
    Filter {
        input: Box<Expression>,
        name: String,
        args: Vec<Expression>,
    },

    /// `(a + b)`
    Grouped(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    /// The operator as written in template source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "~",
        }
    }

    /// Operators whose result is always a boolean.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Or
                | BinaryOp::And
                | BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::LtEq
                | BinaryOp::GtEq
        )
    }
}
