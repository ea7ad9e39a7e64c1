//! Procedure interpreter.
//!
//! Executes a [`Procedure`] against a JSON data context, writing through an
//! [`OutputSink`]. Scopes, pushes and blocks live in a per-call
//! [`RenderState`], so one procedure can be rendered from many threads.

use crate::filters::{builtin_filters, FilterRegistry};
use crate::ir::{CExpr, Op, Procedure};
use crate::methods::{call_method, MethodError};
use crate::sink::{HtmlBuffer, OutputSink};
use crate::value::{
    array_at, as_integer, compare, is_present, loose_eq, number, stringify, type_name,
};
use glint_lexer::{Location, Span};
use glint_parser::ast::BinaryOp;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Renders widgets and included templates.
///
/// `state` is the caller's render state: pushes and blocks made by the nested
/// template stay visible to the caller's `stack` and `slot`.
pub trait ComponentRenderer {
    /// Render widget `name` with `args` as its only data.
    fn render_component(
        &self,
        name: &str,
        args: &Map<String, Value>,
        state: &mut RenderState,
    ) -> std::result::Result<String, String>;

    /// Render included template `name`. `data` is the caller's root data
    /// overlaid with the include arguments.
    fn render_include(
        &self,
        name: &str,
        data: &Map<String, Value>,
        state: &mut RenderState,
    ) -> std::result::Result<String, String> {
        self.render_component(name, data, state)
    }
}

/// Collaborators available while rendering.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    filters: &'a FilterRegistry,
    components: Option<&'a dyn ComponentRenderer>,
}

impl Default for Environment<'_> {
    fn default() -> Self {
        Self {
            filters: builtin_filters(),
            components: None,
        }
    }
}

impl<'a> Environment<'a> {
    /// Built-in filters, no component renderer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: &'a FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_components(mut self, components: &'a dyn ComponentRenderer) -> Self {
        self.components = Some(components);
        self
    }

    pub fn filters(&self) -> &FilterRegistry {
        self.filters
    }
}

/// Mutable state of one render call.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    scopes: Vec<Map<String, Value>>,
    stacks: HashMap<String, Vec<String>>,
    blocks: HashMap<String, String>,
    content: Option<String>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output of the page, written by `content` in a layout.
    pub fn set_content(&mut self, content: String) {
        self.content = Some(content);
    }

    /// Captured output of `block "name"`.
    pub fn block(&self, name: &str) -> Option<&str> {
        self.blocks.get(name).map(String::as_str)
    }

    /// Everything pushed to `name` so far, in push order.
    pub fn pushes(&self, name: &str) -> &[String] {
        self.stacks.get(name).map_or(&[], Vec::as_slice)
    }

    /// Run `f` for a nested template: no locals and no page content, but the
    /// same pushes and blocks.
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut RenderState) -> T) -> T {
        let scopes = std::mem::take(&mut self.scopes);
        let content = self.content.take();
        let result = f(self);
        self.scopes = scopes;
        self.content = content;
        result
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn bind(&mut self, name: &str, value: Value) {
        if self.scopes.is_empty() {
            self.scopes.push(Map::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }
}

/// Errors raised while rendering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("{location}: {message}")]
    Type { message: String, location: Location },

    #[error("{location}: division by zero")]
    DivisionByZero { location: Location },

    #[error("{location}: cannot iterate over {found}")]
    NotIterable { found: String, location: Location },

    #[error("{location}: unknown filter '{name}'")]
    UnknownFilter { name: String, location: Location },

    #[error("{location}: filter '{name}' failed: {message}")]
    Filter {
        name: String,
        message: String,
        location: Location,
    },

    #[error("{location}: unknown method '{name}'")]
    UnknownMethod { name: String, location: Location },

    #[error("{location}: method '{name}' failed: {message}")]
    Method {
        name: String,
        message: String,
        location: Location,
    },

    #[error("unknown fragment '{0}'")]
    UnknownFragment(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("layout chain of '{0}' loops back on itself")]
    LayoutCycle(String),

    #[error("{location}: '{name}' failed: {message}")]
    Component {
        name: String,
        message: String,
        location: Location,
    },
}

type Result<T> = std::result::Result<T, RenderError>;

impl Procedure {
    /// Render to a string with a fresh state.
    pub fn render(&self, data: &Value, env: &Environment) -> Result<String> {
        let mut out = HtmlBuffer::new();
        let mut state = RenderState::new();
        self.render_into(data, env, &mut out, &mut state)?;
        Ok(out.into_string())
    }

    /// Render into `out`, reading and updating `state`.
    pub fn render_into(
        &self,
        data: &Value,
        env: &Environment,
        out: &mut dyn OutputSink,
        state: &mut RenderState,
    ) -> Result<()> {
        let mut interpreter = Interpreter {
            procedure: self,
            data,
            env,
            state,
        };
        interpreter.scoped(&self.ops, out)
    }

    /// Render only the fragment `name`, with a fresh state.
    pub fn render_fragment(&self, name: &str, data: &Value, env: &Environment) -> Result<String> {
        let body = self
            .fragment_body(name)
            .ok_or_else(|| RenderError::UnknownFragment(name.to_string()))?;
        let mut out = HtmlBuffer::new();
        let mut state = RenderState::new();
        let mut interpreter = Interpreter {
            procedure: self,
            data,
            env,
            state: &mut state,
        };
        interpreter.scoped(body, &mut out)?;
        Ok(out.into_string())
    }
}

struct Interpreter<'r, 'e> {
    procedure: &'r Procedure,
    data: &'r Value,
    env: &'r Environment<'e>,
    state: &'r mut RenderState,
}

impl<'e> Interpreter<'_, 'e> {
    // =========================================================================
    // Ops
    // =========================================================================

    /// Run `ops` in a new scope frame.
    fn scoped(&mut self, ops: &[Op], out: &mut dyn OutputSink) -> Result<()> {
        self.state.scopes.push(Map::new());
        let result = self.ops(ops, out);
        self.state.scopes.pop();
        result
    }

    /// Run `ops` in a new scope frame and return their output.
    fn capture(&mut self, ops: &[Op]) -> Result<String> {
        let mut buffer = HtmlBuffer::new();
        self.scoped(ops, &mut buffer)?;
        Ok(buffer.into_string())
    }

    fn ops(&mut self, ops: &[Op], out: &mut dyn OutputSink) -> Result<()> {
        for op in ops {
            self.op(op, out)?;
        }
        Ok(())
    }

    fn op(&mut self, op: &Op, out: &mut dyn OutputSink) -> Result<()> {
        match op {
            Op::Raw(text) => out.write_raw(text),
            Op::Write { expr, escape } => {
                let text = stringify(&self.eval(expr)?);
                if *escape {
                    out.write_escaped(&text);
                } else {
                    out.write_raw(&text);
                }
            }
            Op::If {
                condition,
                then_ops,
                else_ops,
                span,
            } => {
                let value = self.eval(condition)?;
                if self.truth(&value, *span)? {
                    self.scoped(then_ops, out)?;
                } else {
                    self.scoped(else_ops, out)?;
                }
            }
            Op::For {
                variable,
                collection,
                body,
                span,
            } => {
                let items = match self.eval(collection)? {
                    Value::Array(items) => items,
                    Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                    Value::Null => Vec::new(),
                    other => {
                        return Err(RenderError::NotIterable {
                            found: type_name(&other).to_string(),
                            location: self.location(*span),
                        })
                    }
                };
                let last = items.len().saturating_sub(1);
                for (index, item) in items.into_iter().enumerate() {
                    let mut frame = Map::new();
                    frame.insert(variable.clone(), item);
                    frame.insert(format!("{variable}_index"), Value::from(index));
                    frame.insert(format!("{variable}_first"), Value::Bool(index == 0));
                    frame.insert(format!("{variable}_last"), Value::Bool(index == last));
                    self.state.scopes.push(frame);
                    let result = self.scoped(body, out);
                    self.state.scopes.pop();
                    result?;
                }
            }
            Op::Switch {
                subject,
                arms,
                default,
            } => {
                let subject = self.eval(subject)?;
                let mut matched = None;
                for (value, body) in arms {
                    if loose_eq(&subject, &self.eval(value)?) {
                        matched = Some(body);
                        break;
                    }
                }
                self.scoped(matched.unwrap_or(default), out)?;
            }
            Op::Set { name, value } => {
                let value = self.eval(value)?;
                self.state.bind(name, value);
            }
            Op::Include { name, args, span } => {
                let mut data = match self.data {
                    Value::Object(root) => root.clone(),
                    _ => Map::new(),
                };
                data.extend(self.args(args)?);
                let components = self.components(name, *span)?;
                let html = components
                    .render_include(name, &data, self.state)
                    .map_err(|message| self.component_error(name, message, *span))?;
                out.write_raw(&html);
            }
            Op::Component { name, args, span } => {
                let args = self.args(args)?;
                let components = self.components(name, *span)?;
                let html = components
                    .render_component(name, &args, self.state)
                    .map_err(|message| self.component_error(name, message, *span))?;
                out.write_raw(&html);
            }
            Op::Fragment { body, .. } => self.scoped(body, out)?,
            Op::Content => {
                if let Some(content) = &self.state.content {
                    out.write_raw(content);
                }
            }
            Op::Slot { name, default } => match self.state.blocks.get(name).cloned() {
                Some(html) => out.write_raw(&html),
                None => self.scoped(default, out)?,
            },
            Op::Block { name, body } => {
                let html = self.capture(body)?;
                self.state.blocks.insert(name.clone(), html);
            }
            Op::Stack { name } => {
                for html in self.state.pushes(name) {
                    out.write_raw(html);
                }
            }
            Op::Push { name, body } => {
                let html = self.capture(body)?;
                self.state.stacks.entry(name.clone()).or_default().push(html);
            }
        }
        Ok(())
    }

    fn args(&self, args: &[(String, CExpr)]) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        for (name, expr) in args {
            map.insert(name.clone(), self.eval(expr)?);
        }
        Ok(map)
    }

    fn components(&self, name: &str, span: Span) -> Result<&'e dyn ComponentRenderer> {
        self.env.components.ok_or_else(|| {
            self.component_error(name, "no component renderer is configured".into(), span)
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn eval(&self, expr: &CExpr) -> Result<Value> {
        match expr {
            CExpr::Literal(value) => Ok(value.clone()),
            CExpr::Local(name) => Ok(self.state.lookup(name).cloned().unwrap_or(Value::Null)),
            CExpr::Field { name, access } => Ok(match self.data {
                Value::Object(root) => root.get(access.key(name)).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            CExpr::Property { .. } | CExpr::Method { .. } | CExpr::Index { .. } => {
                Ok(self.chain(expr)?.unwrap_or(Value::Null))
            }
            CExpr::Binary {
                left,
                op,
                right,
                span,
            } => self.binary(left, *op, right, *span),
            CExpr::Equals {
                left,
                right,
                negated,
            } => {
                let equal = loose_eq(&self.eval(left)?, &self.eval(right)?);
                Ok(Value::Bool(equal != *negated))
            }
            CExpr::Not(operand) => Ok(Value::Bool(!is_present(&self.eval(operand)?))),
            CExpr::Negate { operand, span } => match self.eval(operand)? {
                Value::Number(n) => match n.as_i64() {
                    Some(i) if i != i64::MIN => Ok(Value::from(-i)),
                    _ => self.finite(-n.as_f64().unwrap_or_default(), *span),
                },
                other => Err(self.type_error(
                    format!("cannot negate {}", type_name(&other)),
                    *span,
                )),
            },
            CExpr::Ternary {
                condition,
                then_expr,
                else_expr,
                span,
            } => {
                if self.truth(&self.eval(condition)?, *span)? {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            CExpr::Coalesce { left, fallback } => match self.eval(left)? {
                Value::Null => self.eval(fallback),
                value => Ok(value),
            },
            CExpr::Filter {
                name,
                input,
                args,
                span,
            } => {
                let input = self.eval(input)?;
                let args = self.eval_all(args)?;
                let filter = self.env.filters.get(name).ok_or_else(|| RenderError::UnknownFilter {
                    name: name.clone(),
                    location: self.location(*span),
                })?;
                filter(&input, &args).map_err(|message| RenderError::Filter {
                    name: name.clone(),
                    message,
                    location: self.location(*span),
                })
            }
            CExpr::Group(inner) => self.eval(inner),
            CExpr::Present(inner) => Ok(Value::Bool(is_present(&self.eval(inner)?))),
        }
    }

    fn eval_all(&self, exprs: &[CExpr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    /// Evaluate a postfix chain. `None` means a `?.` link met an absent value:
    /// every later link of the chain is skipped, arguments included.
    fn chain(&self, expr: &CExpr) -> Result<Option<Value>> {
        match expr {
            CExpr::Property {
                object,
                key,
                null_safe,
            } => {
                let Some(target) = self.chain(object)? else {
                    return Ok(None);
                };
                Ok(match target {
                    Value::Null if *null_safe => None,
                    // Reading a property of anything but an object yields absent.
                    Value::Object(mut map) => Some(map.remove(key).unwrap_or(Value::Null)),
                    _ => Some(Value::Null),
                })
            }
            CExpr::Method {
                object,
                name,
                args,
                null_safe,
                span,
            } => {
                let Some(target) = self.chain(object)? else {
                    return Ok(None);
                };
                if *null_safe && target.is_null() {
                    return Ok(None);
                }
                let args = self.eval_all(args)?;
                call_method(&target, name, &args)
                    .map(Some)
                    .map_err(|err| match err {
                        MethodError::Unknown => RenderError::UnknownMethod {
                            name: name.clone(),
                            location: self.location(*span),
                        },
                        MethodError::Invalid(message) => RenderError::Method {
                            name: name.clone(),
                            message,
                            location: self.location(*span),
                        },
                    })
            }
            CExpr::Index {
                object,
                index,
                span,
            } => {
                let Some(target) = self.chain(object)? else {
                    return Ok(None);
                };
                let index = self.eval(index)?;
                match (&target, &index) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Some(Value::Null)),
                    (Value::Array(items), _) => match as_integer(&index) {
                        Some(i) => Ok(Some(array_at(items, i))),
                        None => Err(self.type_error(
                            format!("array index must be an integer, found {}", type_name(&index)),
                            *span,
                        )),
                    },
                    (Value::Object(map), Value::String(key)) => {
                        Ok(Some(map.get(key).cloned().unwrap_or(Value::Null)))
                    }
                    _ => Err(self.type_error(
                        format!(
                            "cannot index {} with {}",
                            type_name(&target),
                            type_name(&index)
                        ),
                        *span,
                    )),
                }
            }
            other => self.eval(other).map(Some),
        }
    }

    fn binary(&self, left: &CExpr, op: BinaryOp, right: &CExpr, span: Span) -> Result<Value> {
        // Logical operators short-circuit on presence.
        match op {
            BinaryOp::And => {
                let result = is_present(&self.eval(left)?) && is_present(&self.eval(right)?);
                return Ok(Value::Bool(result));
            }
            BinaryOp::Or => {
                let result = is_present(&self.eval(left)?) || is_present(&self.eval(right)?);
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;

        match op {
            BinaryOp::Concat => Ok(Value::from(stringify(&l) + &stringify(&r))),
            BinaryOp::Eq | BinaryOp::NotEq => Ok(Value::Bool(loose_eq(&l, &r) == (op == BinaryOp::Eq))),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let ordering = compare(&l, &r).ok_or_else(|| {
                    self.type_error(
                        format!(
                            "cannot compare {} {} {}",
                            type_name(&l),
                            op.symbol(),
                            type_name(&r)
                        ),
                        span,
                    )
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(Value::Bool(result))
            }
            _ => self.arithmetic(&l, op, &r, span),
        }
    }

    fn arithmetic(&self, l: &Value, op: BinaryOp, r: &Value, span: Span) -> Result<Value> {
        let (Value::Number(a), Value::Number(b)) = (l, r) else {
            return Err(self.type_error(
                format!(
                    "cannot apply '{}' to {} and {}",
                    op.symbol(),
                    type_name(l),
                    type_name(r)
                ),
                span,
            ));
        };

        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            let exact = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                    return Err(RenderError::DivisionByZero {
                        location: self.location(span),
                    })
                }
                BinaryOp::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
                BinaryOp::Mod => a.checked_rem(b),
                _ => None,
            };
            if let Some(result) = exact {
                return Ok(Value::from(result));
            }
        }

        let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
                return Err(RenderError::DivisionByZero {
                    location: self.location(span),
                })
            }
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            other => {
                return Err(self.type_error(
                    format!("'{}' is not an arithmetic operator", other.symbol()),
                    span,
                ))
            }
        };
        self.finite(result, span)
    }

    fn finite(&self, f: f64, span: Span) -> Result<Value> {
        number(f).ok_or_else(|| self.type_error("result is not a finite number".into(), span))
    }

    /// Truth of a condition: booleans as-is, absent is false.
    fn truth(&self, value: &Value, span: Span) -> Result<bool> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(self.type_error(
                format!("condition must be a boolean, found {}", type_name(other)),
                span,
            )),
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    fn location(&self, span: Span) -> Location {
        Location::at(&self.procedure.file, span)
    }

    fn type_error(&self, message: String, span: Span) -> RenderError {
        RenderError::Type {
            message,
            location: self.location(span),
        }
    }

    fn component_error(&self, name: &str, message: String, span: Span) -> RenderError {
        RenderError::Component {
            name: name.to_string(),
            message,
            location: self.location(span),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::DefaultResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(source: &str) -> Procedure {
        let template = glint_parser::parse(source, "test.glint").unwrap();
        crate::generate(&template, &DefaultResolver).unwrap()
    }

    fn render(source: &str, data: Value) -> String {
        compile(source).render(&data, &Environment::new()).unwrap()
    }

    fn render_err(source: &str, data: Value) -> RenderError {
        compile(source).render(&data, &Environment::new()).unwrap_err()
    }

    /// Echoes its name and arguments.
    struct Echo;

    impl ComponentRenderer for Echo {
        fn render_component(
            &self,
            name: &str,
            args: &Map<String, Value>,
            state: &mut RenderState,
        ) -> std::result::Result<String, String> {
            if name == "broken" {
                return Err("exploded".into());
            }
            if name == "pusher" {
                state.stacks.entry("js".into()).or_default().push("<script/>".into());
                return Ok(String::new());
            }
            Ok(format!("<{name} {}>", Value::Object(args.clone())))
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    #[test]
    fn test_text_passthrough() {
        assert_eq!(render("<h1>Hi</h1>", json!({})), "<h1>Hi</h1>");
    }

    #[test]
    fn test_escaped_and_raw_output() {
        let data = json!({ "v": "<script>alert('x')</script>" });
        assert_eq!(
            render("{{ v }}", data.clone()),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(render("{{ raw v }}", data), "<script>alert('x')</script>");
    }

    #[test]
    fn test_verbatim_is_not_evaluated() {
        assert_eq!(render("{{ verbatim }}{{ x }}{{ end }}", json!({ "x": 1 })), "{{ x }}");
    }

    #[test]
    fn test_comment_and_trim() {
        assert_eq!(render("<h1>A</h1>{{-- c --}}<p>B</p>", json!({})), "<h1>A</h1><p>B</p>");
        assert_eq!(
            render("<p>X</p>   \n  {{- y -}}  \n  <p>Z</p>", json!({ "y": "!" })),
            "<p>X</p>!<p>Z</p>"
        );
    }

    #[test]
    fn test_missing_values_render_empty() {
        assert_eq!(render("[{{ a }}][{{ a.b.c }}][{{ a?.b }}]", json!({})), "[][][]");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(render("{{ 7 / 2 }} {{ 6 / 2 }} {{ 1.5 + 1.5 }}", json!({})), "3.5 3 3");
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_filters_apply_left_to_right() {
        assert_eq!(render("{{ name | trim | upper }}", json!({ "name": "  ada " })), "ADA");
        assert_eq!(
            render("{{ title | truncate(5) }}", json!({ "title": "Hello world" })),
            "Hello..."
        );
    }

    #[test]
    fn test_default_filter_keyword_name() {
        assert_eq!(render("{{ nick | default(\"anon\") }}", json!({})), "anon");
    }

    #[test]
    fn test_arithmetic_and_concat() {
        let data = json!({ "price": 3, "qty": 4, "first": "Ada", "last": "L" });
        assert_eq!(render("{{ price * qty + 1 }}", data.clone()), "13");
        assert_eq!(render("{{ 10 % 4 }} {{ -price }}", data.clone()), "2 -3");
        assert_eq!(render("{{ first ~ \" \" ~ last }}", data.clone()), "Ada L");
        assert_eq!(render("{{ \"n=\" ~ qty }}", data), "n=4");
    }

    #[test]
    fn test_comparisons_and_logic() {
        let data = json!({ "n": 5, "s": "b", "t": true });
        assert_eq!(render("{{ n > 3 }} {{ n <= 4 }} {{ s < \"c\" }}", data.clone()), "true false true");
        assert_eq!(render("{{ t && missing }} {{ t || missing }} {{ !missing }}", data), "false true true");
    }

    #[test]
    fn test_equality_is_structural_and_null_safe() {
        let data = json!({ "a": [1, 2], "b": [1.0, 2.0], "n": null });
        assert_eq!(render("{{ a == b }} {{ n == missing }} {{ a != n }}", data), "true true true");
    }

    #[test]
    fn test_ternary_and_coalesce() {
        let data = json!({ "count": 0, "name": null });
        assert_eq!(render("{{ count > 0 ? \"yes\" : \"no\" }}", data.clone()), "no");
        assert_eq!(render("{{ name ?? \"anonymous\" }}", data.clone()), "anonymous");
        assert_eq!(render("{{ count ?? 5 }}", data), "0");
    }

    #[test]
    fn test_index_access() {
        let data = json!({ "items": ["a", "b", "c"], "map": { "k": "v" }, "key": "k" });
        assert_eq!(render("{{ items[0] }}{{ items[-1] }}{{ items[9] }}", data.clone()), "ac");
        assert_eq!(render("{{ map[key] }}{{ map[\"k\"] }}", data), "vv");
    }

    #[test]
    fn test_methods() {
        let data = json!({ "roles": ["admin"], "name": " Ada " });
        assert_eq!(render("{{ roles.contains(\"admin\") }}", data.clone()), "true");
        assert_eq!(render("{{ name.trim().toUpperCase() }}", data.clone()), "ADA");
        assert_eq!(
            render("[{{ user?.roles.contains(\"x\") }}][{{ user?.trim() }}]", data),
            "[][]"
        );
    }

    #[test]
    fn test_null_safe_skips_rest_of_chain() {
        let data = json!({ "user": { "name": "ada" } });
        // The argument would divide by zero if it were evaluated.
        assert_eq!(render("[{{ nobody?.name.get(1 / 0) }}]", data.clone()), "[]");
        assert_eq!(render("[{{ nobody?.tags[0].trim() }}]", data.clone()), "[]");
        assert_eq!(render("[{{ user?.name.toUpperCase() }}]", data.clone()), "[ADA]");
        assert_eq!(render("{{ if nobody?.roles.contains(\"x\") }}y{{ else }}n{{ end }}", data), "n");
    }

    #[test]
    fn test_plain_link_after_absent_still_runs() {
        // Without `?.` the method runs on the absent value.
        assert!(matches!(
            render_err("{{ nobody.name.get(1 / 0) }}", json!({})),
            RenderError::DivisionByZero { .. }
        ));
        assert_eq!(render("[{{ (nobody?.name).length() }}]", json!({})), "[0]");
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_presence() {
        let src = "{{ if user }}hi{{ else }}bye{{ end }}";
        assert_eq!(render(src, json!({ "user": {} })), "hi");
        assert_eq!(render(src, json!({ "user": 0 })), "hi");
        assert_eq!(render(src, json!({ "user": false })), "bye");
        assert_eq!(render(src, json!({})), "bye");
    }

    #[test]
    fn test_else_if_chain() {
        let src = "{{ if n == 1 }}one{{ else if n == 2 }}two{{ else }}many{{ end }}";
        assert_eq!(render(src, json!({ "n": 1 })), "one");
        assert_eq!(render(src, json!({ "n": 2 })), "two");
        assert_eq!(render(src, json!({ "n": 3 })), "many");
    }

    #[test]
    fn test_for_loop_metadata() {
        let src = "{{ for x in xs }}{{ x }}:{{ x_index }}:{{ x_first }}:{{ x_last }};{{ end }}";
        assert_eq!(render(src, json!({ "xs": ["a"] })), "a:0:true:true;");
        assert_eq!(
            render(src, json!({ "xs": ["a", "b"] })),
            "a:0:true:false;b:1:false:true;"
        );
    }

    #[test]
    fn test_for_over_empty_and_missing() {
        let src = "[{{ for x in xs }}{{ x_first }}{{ end }}]";
        assert_eq!(render(src, json!({ "xs": [] })), "[]");
        assert_eq!(render(src, json!({})), "[]");
    }

    #[test]
    fn test_for_over_object_values() {
        assert_eq!(
            render("{{ for v in m }}{{ v }}{{ end }}", json!({ "m": { "b": 2, "a": 1 } })),
            "12"
        );
    }

    #[test]
    fn test_for_over_scalar_is_error() {
        let err = render_err("\n{{ for x in n }}{{ end }}", json!({ "n": 3 }));
        assert_eq!(err.to_string(), "test.glint:2:1: cannot iterate over number");
    }

    #[test]
    fn test_switch_first_match_wins() {
        let src = "{{ switch s }}{{ case 1 }}a{{ case 1.0 }}b{{ default }}d{{ end }}";
        assert_eq!(render(src, json!({ "s": 1 })), "a");
        assert_eq!(render(src, json!({ "s": 2 })), "d");
        assert_eq!(
            render("{{ switch s }}{{ case 1 }}a{{ end }}", json!({ "s": 2 })),
            ""
        );
    }

    #[test]
    fn test_set_scoping() {
        let src = "{{ set x = 1 }}{{ if true }}{{ set x = 2 }}{{ x }}{{ end }}{{ x }}";
        assert_eq!(render(src, json!({})), "21");
        let src = "{{ for i in xs }}{{ set total = i * 2 }}{{ total }}{{ end }}";
        assert_eq!(render(src, json!({ "xs": [1, 2] })), "24");
    }

    #[test]
    fn test_direct_condition_must_be_boolean() {
        let err = render_err("{{ if a ? \"x\" : \"y\" }}{{ end }}", json!({ "a": true }));
        assert!(err.to_string().contains("condition must be a boolean, found string"));
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_division_by_zero() {
        let err = render_err("{{ 1 / n }}", json!({ "n": 0 }));
        assert!(matches!(err, RenderError::DivisionByZero { .. }));
        assert!(matches!(
            render_err("{{ 1.5 % n }}", json!({ "n": 0 })),
            RenderError::DivisionByZero { .. }
        ));
    }

    #[test]
    fn test_type_errors() {
        assert!(render_err("{{ \"a\" + 1 }}", json!({})).to_string().contains("cannot apply '+' to string and number"));
        assert!(render_err("{{ 1 < \"a\" }}", json!({})).to_string().contains("cannot compare number < string"));
        assert!(render_err("{{ -s }}", json!({ "s": "x" })).to_string().contains("cannot negate string"));
    }

    #[test]
    fn test_unknown_filter_and_method() {
        assert_eq!(
            render_err("{{ x | shout }}", json!({})).to_string(),
            "test.glint:1:4: unknown filter 'shout'"
        );
        assert!(matches!(
            render_err("{{ x.explode() }}", json!({ "x": 1 })),
            RenderError::UnknownMethod { .. }
        ));
    }

    // =========================================================================
    // Components, fragments, stacks
    // =========================================================================

    #[test]
    fn test_widget_gets_only_its_args() {
        let p = compile("{{ widget \"card\" title=t n=1 }}");
        let html = p
            .render(&json!({ "t": "<b>", "other": 1 }), &Environment::new().with_components(&Echo))
            .unwrap();
        assert_eq!(html, "<card {\"n\":1,\"title\":\"<b>\"}>");
    }

    #[test]
    fn test_include_overlays_root_data() {
        let p = compile("{{ include \"row\" a=2 }}");
        let html = p
            .render(&json!({ "a": 1, "b": 1 }), &Environment::new().with_components(&Echo))
            .unwrap();
        assert_eq!(html, "<row {\"a\":2,\"b\":1}>");
    }

    #[test]
    fn test_component_shares_render_state() {
        let p = compile("{{ widget \"pusher\" }}{{ stack \"js\" }}");
        let html = p
            .render(&json!({}), &Environment::new().with_components(&Echo))
            .unwrap();
        assert_eq!(html, "<script/>");
    }

    #[test]
    fn test_nested_state_keeps_pushes_and_hides_locals() {
        let mut state = RenderState::new();
        state.bind("x", json!(1));
        state.set_content("page".into());
        let seen = state.nested(|inner| {
            inner.stacks.entry("js".into()).or_default().push("a".into());
            (inner.lookup("x").cloned(), inner.content.clone())
        });
        assert_eq!(seen, (None, None));
        assert_eq!(state.pushes("js").to_vec(), vec!["a".to_string()]);
        assert_eq!(state.lookup("x"), Some(&json!(1)));
        assert_eq!(state.content.as_deref(), Some("page"));
    }

    #[test]
    fn test_component_failures() {
        let p = compile("{{ widget \"broken\" }}");
        let err = p
            .render(&json!({}), &Environment::new().with_components(&Echo))
            .unwrap_err();
        assert_eq!(err.to_string(), "test.glint:1:1: 'broken' failed: exploded");

        let err = p.render(&json!({}), &Environment::new()).unwrap_err();
        assert!(err.to_string().contains("no component renderer"));
    }

    #[test]
    fn test_fragment_renders_inline_and_alone() {
        let p = compile("<ul>{{ fragment \"row\" }}<li>{{ name }}</li>{{ end }}</ul>");
        let data = json!({ "name": "Ada" });
        assert_eq!(p.render(&data, &Environment::new()).unwrap(), "<ul><li>Ada</li></ul>");
        assert_eq!(
            p.render_fragment("row", &data, &Environment::new()).unwrap(),
            "<li>Ada</li>"
        );
        assert_eq!(
            p.render_fragment("nope", &data, &Environment::new()),
            Err(RenderError::UnknownFragment("nope".into()))
        );
    }

    #[test]
    fn test_push_and_stack() {
        let src = "{{ push \"js\" }}<a>{{ end }}{{ push \"js\" }}<b>{{ end }}[{{ stack \"js\" }}][{{ stack \"css\" }}]";
        assert_eq!(render(src, json!({})), "[<a><b>][]");
    }

    #[test]
    fn test_stack_only_sees_earlier_pushes() {
        let src = "{{ stack \"js\" }}|{{ push \"js\" }}x{{ end }}{{ stack \"js\" }}";
        assert_eq!(render(src, json!({})), "|x");
    }

    #[test]
    fn test_custom_filter_registry() {
        let mut filters = FilterRegistry::new();
        filters.register("shout", |v, _| Ok(Value::from(format!("{}!", stringify(v)))));
        let p = compile("{{ name | shout }}");
        let env = Environment::new().with_filters(&filters);
        assert_eq!(p.render(&json!({ "name": "hi" }), &env).unwrap(), "hi!");
    }

    #[test]
    fn test_render_into_shares_state() {
        let mut state = RenderState::new();
        let mut out = HtmlBuffer::new();
        let page = compile("{{ block \"title\" }}Home{{ end }}{{ push \"js\" }}p{{ end }}");
        page.render_into(&json!({}), &Environment::new(), &mut out, &mut state).unwrap();
        assert!(out.is_empty());
        assert_eq!(state.block("title"), Some("Home"));
        assert_eq!(state.pushes("js"), &["p".to_string()]);
    }
}
