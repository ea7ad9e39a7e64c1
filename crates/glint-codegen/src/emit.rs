//! JavaScript emitter.
//!
//! Turns a [`Procedure`] into the source of a JavaScript render function:
//!
//! ```text
//! function render(data, out, env) {
//!   out.raw("<p>");
//!   out.escaped(str(filters.upper(filters.trim(data.name))));
//!   out.raw("</p>");
//! }
//! ```
//!
//! The host links the function against a small runtime: `out.raw` /
//! `out.escaped`, the value helpers `str present eq at get iter safe`, the
//! `filters` and `methods` tables, and `env` (`include component content
//! slot block stack push`). `safe(v, f)` is `v == null ? null : f(v)`.
//!
//! Template locals are emitted as `$name`, temporaries as `$$name0`. Neither
//! can collide with `data`, `out`, `env`, a runtime helper or each other,
//! since template identifiers never contain `$`.

use crate::ir::{CExpr, Op, Procedure};
use crate::resolve::Access;
use glint_parser::ast::BinaryOp;
use serde_json::Value;
use std::fmt;

impl Procedure {
    /// JavaScript source for this procedure.
    pub fn emit(&self) -> String {
        let mut emitter = Emitter::default();
        emitter.function("function render(data, out, env) {", &self.ops, "}");

        let fragments: Vec<(&String, &[Op])> = self
            .fragments
            .iter()
            .filter_map(|name| self.fragment_body(name).map(|body| (name, body)))
            .collect();
        if !fragments.is_empty() {
            emitter.line("render.fragments = {");
            emitter.indent += 1;
            for (name, body) in fragments {
                let open = format!("{}: function (data, out, env) {{", js_string(name));
                emitter.function(&open, body, "},");
            }
            emitter.indent -= 1;
            emitter.line("};");
        }

        emitter.js
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.emit())
    }
}

#[derive(Default)]
struct Emitter {
    js: String,
    indent: usize,
    temp: usize,
    /// Locals per scope frame, innermost last: template name and JS name.
    scopes: Vec<Vec<(String, String)>>,
}

impl Emitter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.js.push_str("  ");
        }
        self.js.push_str(text);
        self.js.push('\n');
    }

    fn function(&mut self, open: &str, ops: &[Op], close: &str) {
        self.line(open);
        self.block(ops);
        self.line(close);
    }

    /// Emit `ops` one level deeper in a new scope frame.
    fn block(&mut self, ops: &[Op]) {
        self.indent += 1;
        self.scopes.push(Vec::new());
        for op in ops {
            self.op(op);
        }
        self.scopes.pop();
        self.indent -= 1;
    }

    /// Temporaries are spelled `$$name0`. Locals never contain `$$`.
    fn next_temp(&mut self) -> usize {
        let n = self.temp;
        self.temp += 1;
        n
    }

    fn local(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(local, _)| local == name)
            .map(|(_, js)| js.as_str())
    }

    // =========================================================================
    // Ops
    // =========================================================================

    fn op(&mut self, op: &Op) {
        match op {
            Op::Raw(text) => self.line(&format!("out.raw({});", js_string(text))),
            Op::Write { expr, escape } => {
                let method = if *escape { "escaped" } else { "raw" };
                let value = self.expr(expr);
                self.line(&format!("out.{method}(str({value}));"));
            }
            Op::If {
                condition,
                then_ops,
                else_ops,
                ..
            } => {
                let condition = self.expr(condition);
                self.line(&format!("if ({condition}) {{"));
                self.block(then_ops);
                self.else_chain(else_ops);
                self.line("}");
            }
            Op::For {
                variable,
                collection,
                body,
                ..
            } => {
                let n = self.next_temp();
                let (items, i) = (format!("$$items{n}"), format!("$$i{n}"));
                let collection = self.expr(collection);
                self.line("{");
                self.indent += 1;
                self.line(&format!("const {items} = iter({collection});"));
                self.line(&format!("for (let {i} = 0; {i} < {items}.length; {i}++) {{"));
                self.indent += 1;
                let locals: Vec<(String, String)> = ["", "_index", "_first", "_last"]
                    .iter()
                    .map(|suffix| {
                        let name = format!("{variable}{suffix}");
                        let js = format!("${name}");
                        (name, js)
                    })
                    .collect();
                self.line(&format!("let {} = {items}[{i}];", locals[0].1));
                self.line(&format!("let {} = {i};", locals[1].1));
                self.line(&format!("let {} = {i} === 0;", locals[2].1));
                self.line(&format!("let {} = {i} === {items}.length - 1;", locals[3].1));
                self.indent -= 1;
                self.scopes.push(locals);
                self.block(body);
                self.scopes.pop();
                self.line("}");
                self.indent -= 1;
                self.line("}");
            }
            Op::Switch {
                subject,
                arms,
                default,
            } => {
                let temp = format!("$$subject{}", self.next_temp());
                let subject = self.expr(subject);
                self.line("{");
                self.indent += 1;
                self.line(&format!("const {temp} = {subject};"));
                if arms.is_empty() {
                    self.line("{");
                    self.block(default);
                    self.line("}");
                } else {
                    for (i, (value, body)) in arms.iter().enumerate() {
                        let keyword = if i == 0 { "if" } else { "} else if" };
                        let value = self.expr(value);
                        self.line(&format!("{keyword} (eq({temp}, {value})) {{"));
                        self.block(body);
                    }
                    if !default.is_empty() {
                        self.line("} else {");
                        self.block(default);
                    }
                    self.line("}");
                }
                self.indent -= 1;
                self.line("}");
            }
            Op::Set { name, value } => {
                let value = self.expr(value);
                let current = self
                    .scopes
                    .last()
                    .and_then(|frame| frame.iter().rev().find(|(local, _)| local == name))
                    .map(|(_, js)| js.clone());
                match current {
                    Some(js) => self.line(&format!("{js} = {value};")),
                    None => {
                        // Redeclaring the outer name would put `value` in its temporal dead zone.
                        let js = if self.local(name).is_some() {
                            format!("${name}${}", self.next_temp())
                        } else {
                            format!("${name}")
                        };
                        self.line(&format!("let {js} = {value};"));
                        if let Some(frame) = self.scopes.last_mut() {
                            frame.push((name.clone(), js));
                        }
                    }
                }
            }
            Op::Include { name, args, .. } => {
                let mut fields = vec!["...data".to_string()];
                fields.extend(self.fields(args));
                self.line(&format!(
                    "out.raw(env.include({}, {{ {} }}));",
                    js_string(name),
                    fields.join(", ")
                ));
            }
            Op::Component { name, args, .. } => {
                let fields = self.fields(args);
                let object = if fields.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", fields.join(", "))
                };
                self.line(&format!(
                    "out.raw(env.component({}, {object}));",
                    js_string(name)
                ));
            }
            Op::Fragment { name, body } => {
                self.line(&format!("// fragment {}", js_string(name)));
                self.line("{");
                self.block(body);
                self.line("}");
            }
            Op::Content => self.line("out.raw(env.content);"),
            Op::Slot { name, default } => {
                if default.is_empty() {
                    self.line(&format!("env.slot({}, out);", js_string(name)));
                } else {
                    self.line(&format!("if (!env.slot({}, out)) {{", js_string(name)));
                    self.block(default);
                    self.line("}");
                }
            }
            Op::Block { name, body } => self.capture("block", name, body),
            Op::Stack { name } => {
                self.line(&format!("out.raw(env.stack({}));", js_string(name)));
            }
            Op::Push { name, body } => self.capture("push", name, body),
        }
    }

    /// `} else if (...) {` for a lone nested `If`, `} else {` otherwise.
    fn else_chain(&mut self, else_ops: &[Op]) {
        match else_ops {
            [] => {}
            [Op::If {
                condition,
                then_ops,
                else_ops,
                ..
            }] => {
                let condition = self.expr(condition);
                self.line(&format!("}} else if ({condition}) {{"));
                self.block(then_ops);
                self.else_chain(else_ops);
            }
            ops => {
                self.line("} else {");
                self.block(ops);
            }
        }
    }

    fn capture(&mut self, method: &str, name: &str, body: &[Op]) {
        self.line(&format!("env.{method}({}, (out) => {{", js_string(name)));
        self.block(body);
        self.line("});");
    }

    fn fields(&mut self, args: &[(String, CExpr)]) -> Vec<String> {
        args.iter()
            .map(|(key, value)| format!("{key}: {}", self.expr(value)))
            .collect()
    }

    // =========================================================================
    // Expression → JavaScript conversion
    // =========================================================================

    fn expr(&mut self, expr: &CExpr) -> String {
        match expr {
            CExpr::Literal(value) => value.to_string(),
            // Outside its scope (a fragment rendered alone) a local is absent.
            CExpr::Local(name) => self.local(name).unwrap_or("null").to_string(),
            CExpr::Field { name, access } => match access {
                Access::Direct => member("data", name),
                Access::Renamed(key) => member("data", key),
            },
            CExpr::Property { .. } | CExpr::Method { .. } | CExpr::Index { .. } => {
                let mut links = Vec::new();
                let mut base = expr;
                while let CExpr::Property { object, .. }
                | CExpr::Method { object, .. }
                | CExpr::Index { object, .. } = base
                {
                    links.push(base);
                    base = object.as_ref();
                }
                links.reverse();
                let base = self.expr(base);
                self.links(base, &links)
            }
            CExpr::Binary {
                left, op, right, ..
            } => match op {
                BinaryOp::And | BinaryOp::Or => format!(
                    "present({}) {} present({})",
                    self.expr(left),
                    op.symbol(),
                    self.expr(right)
                ),
                BinaryOp::Concat => format!("str({}) + str({})", self.expr(left), self.expr(right)),
                _ => format!("{} {} {}", self.operand(left), op.symbol(), self.operand(right)),
            },
            CExpr::Equals {
                left,
                right,
                negated,
            } => {
                let bang = if *negated { "!" } else { "" };
                format!("{bang}eq({}, {})", self.expr(left), self.expr(right))
            }
            CExpr::Not(operand) => format!("!present({})", self.expr(operand)),
            CExpr::Negate { operand: inner, .. } => format!("-{}", self.postfix(inner)),
            CExpr::Ternary {
                condition,
                then_expr,
                else_expr,
                ..
            } => format!(
                "{} ? {} : {}",
                self.operand(condition),
                self.operand(then_expr),
                self.operand(else_expr)
            ),
            CExpr::Coalesce { left, fallback } => {
                format!("{} ?? {}", self.operand(left), self.operand(fallback))
            }
            CExpr::Filter {
                name, input, args, ..
            } => {
                let mut parts = vec![self.expr(input)];
                parts.extend(args.iter().map(|arg| self.expr(arg)));
                format!("filters.{name}({})", parts.join(", "))
            }
            CExpr::Group(inner) => format!("({})", self.expr(inner)),
            CExpr::Present(inner) => format!("present({})", self.expr(inner)),
        }
    }

    /// Apply postfix `links` to `target` left to right. A `?.` link wraps the
    /// rest of the chain in `safe(target, (recv) => ...)`, so an absent
    /// target skips every later link and its arguments.
    fn links(&mut self, mut target: String, links: &[&CExpr]) -> String {
        for (i, link) in links.iter().enumerate() {
            let null_safe = matches!(
                link,
                CExpr::Property { null_safe: true, .. } | CExpr::Method { null_safe: true, .. }
            );
            if null_safe {
                let recv = format!("$$recv{}", self.next_temp());
                let applied = self.link(recv.clone(), link);
                let rest = self.links(applied, &links[i + 1..]);
                return format!("safe({target}, ({recv}) => {rest})");
            }
            target = self.link(target, link);
        }
        target
    }

    fn link(&mut self, target: String, link: &CExpr) -> String {
        match link {
            CExpr::Property { key, .. } => format!("get({target}, {})", js_string(key)),
            CExpr::Method { name, args, .. } => {
                let mut parts = vec![target];
                parts.extend(args.iter().map(|arg| self.expr(arg)));
                format!("methods.{name}({})", parts.join(", "))
            }
            CExpr::Index { index, .. } => format!("at({target}, {})", self.expr(index)),
            other => self.expr(other),
        }
    }

    /// Operand of an infix operator: compound expressions get parentheses.
    fn operand(&mut self, expr: &CExpr) -> String {
        match expr {
            CExpr::Binary { .. } | CExpr::Ternary { .. } | CExpr::Coalesce { .. } => {
                format!("({})", self.expr(expr))
            }
            _ => self.expr(expr),
        }
    }

    /// Operand of unary `-`: anything but a primary gets parentheses.
    fn postfix(&mut self, expr: &CExpr) -> String {
        match expr {
            CExpr::Binary { .. }
            | CExpr::Ternary { .. }
            | CExpr::Coalesce { .. }
            | CExpr::Not(_)
            | CExpr::Negate { .. } => format!("({})", self.expr(expr)),
            _ => self.expr(expr),
        }
    }
}

/// `data.key`, or `data["key"]` when the key is not a JavaScript identifier.
fn member(object: &str, key: &str) -> String {
    if is_identifier(key) {
        format!("{object}.{key}")
    } else {
        format!("{object}[{}]", js_string(key))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A JavaScript string literal (JSON strings are valid JavaScript).
fn js_string(text: &str) -> String {
    Value::from(text).to_string()
}
