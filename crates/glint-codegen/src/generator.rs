//! Body AST → `Procedure`.
//!
//! One exhaustive `match` per node category. Local names are tracked in a
//! [`LocalScope`] that mirrors the runtime scopes: every nested body opens a
//! frame, `for` declares its variable and companions, `set` declares in the
//! current frame.

use crate::ir::{CExpr, CondMode, Op, Procedure};
use crate::resolve::{LocalScope, NameResolver, Resolution};
use crate::CodegenError;
use glint_lexer::{Location, Span};
use glint_parser::ast::{
    BinaryOp, Body, ExprKind, Expression, NamedArg, NodeKind, Template, TemplateKind,
};
use serde_json::Value;

/// Generate the rendering procedure for a parsed template.
pub fn generate(template: &Template, resolver: &dyn NameResolver) -> Result<Procedure, CodegenError> {
    let mut generator = Generator {
        resolver,
        file: &template.file,
        kind: template.kind,
        scope: LocalScope::new(),
        fragments: Vec::new(),
        filters: Vec::new(),
    };
    let ops = generator.body(&template.body)?;

    Ok(Procedure {
        file: template.file.clone(),
        kind: template.kind,
        header: template.header.clone(),
        ops,
        fragments: generator.fragments,
        filters: generator.filters,
    })
}

/// How `expr` is tested when used as a condition.
pub fn condition_mode(expr: &Expression) -> CondMode {
    match &expr.kind {
        ExprKind::Binary { op, .. } if op.is_boolean() => CondMode::Direct,
        ExprKind::Not(_)
        | ExprKind::Boolean(_)
        | ExprKind::Ternary { .. }
        | ExprKind::MethodCall { .. }
        | ExprKind::NullSafeMethodCall { .. } => CondMode::Direct,
        ExprKind::Grouped(inner) => condition_mode(inner),
        _ => CondMode::Present,
    }
}

struct Generator<'a> {
    resolver: &'a dyn NameResolver,
    file: &'a str,
    kind: TemplateKind,
    scope: LocalScope,
    fragments: Vec<String>,
    filters: Vec<(String, Span)>,
}

impl Generator<'_> {
    // =========================================================================
    // Nodes
    // =========================================================================

    fn body(&mut self, body: &Body) -> Result<Vec<Op>, CodegenError> {
        let mut ops = Vec::with_capacity(body.nodes.len());
        for node in &body.nodes {
            match &node.kind {
                NodeKind::Html(text) => {
                    // Adjacent text (e.g. around an elided comment) becomes one write.
                    if let Some(Op::Raw(prev)) = ops.last_mut() {
                        prev.push_str(text);
                    } else if !text.is_empty() {
                        ops.push(Op::Raw(text.clone()));
                    }
                }
                NodeKind::Output(expr) => ops.push(Op::Write {
                    expr: self.expr(expr)?,
                    escape: true,
                }),
                NodeKind::RawOutput(expr) => ops.push(Op::Write {
                    expr: self.expr(expr)?,
                    escape: false,
                }),
                NodeKind::If {
                    condition,
                    then_body,
                    else_body,
                } => {
                    let condition = self.condition(condition)?;
                    let then_ops = self.nested(then_body)?;
                    let else_ops = match else_body {
                        Some(body) => self.nested(body)?,
                        None => Vec::new(),
                    };
                    ops.push(Op::If {
                        condition,
                        then_ops,
                        else_ops,
                        span: node.span,
                    });
                }
                NodeKind::For {
                    variable,
                    collection,
                    body,
                } => {
                    let collection = self.expr(collection)?;
                    self.scope.push();
                    self.scope.declare(variable.clone());
                    for suffix in ["index", "first", "last"] {
                        self.scope.declare(format!("{variable}_{suffix}"));
                    }
                    let body = self.body(body);
                    self.scope.pop();
                    ops.push(Op::For {
                        variable: variable.clone(),
                        collection,
                        body: body?,
                        span: node.span,
                    });
                }
                NodeKind::Switch {
                    subject,
                    cases,
                    default,
                } => {
                    let subject = self.expr(subject)?;
                    let mut arms = Vec::with_capacity(cases.len());
                    for case in cases {
                        arms.push((self.expr(&case.value)?, self.nested(&case.body)?));
                    }
                    let default = match default {
                        Some(body) => self.nested(body)?,
                        None => Vec::new(),
                    };
                    ops.push(Op::Switch {
                        subject,
                        arms,
                        default,
                    });
                }
                NodeKind::Set { name, value } => {
                    // The value is compiled before the name is in scope, so
                    // `set n = n + 1` reads the outer `n`.
                    let value = self.expr(value)?;
                    self.scope.declare(name.clone());
                    ops.push(Op::Set {
                        name: name.clone(),
                        value,
                    });
                }
                NodeKind::Include { name, args } => ops.push(Op::Include {
                    name: name.clone(),
                    args: self.args(args)?,
                    span: node.span,
                }),
                NodeKind::Component { name, args } => ops.push(Op::Component {
                    name: name.clone(),
                    args: self.args(args)?,
                    span: node.span,
                }),
                NodeKind::Fragment { name, body } => {
                    if self.fragments.contains(name) {
                        return Err(self.internal(
                            format!("fragment '{name}' is defined twice"),
                            node.span,
                        ));
                    }
                    self.fragments.push(name.clone());
                    ops.push(Op::Fragment {
                        name: name.clone(),
                        body: self.nested(body)?,
                    });
                }
                NodeKind::Content => {
                    self.expect_kind(TemplateKind::Layout, "content", node.span)?;
                    ops.push(Op::Content);
                }
                NodeKind::Slot { name, default } => {
                    self.expect_kind(TemplateKind::Layout, "slot", node.span)?;
                    let default = match default {
                        Some(body) => self.nested(body)?,
                        None => Vec::new(),
                    };
                    ops.push(Op::Slot {
                        name: name.clone(),
                        default,
                    });
                }
                NodeKind::Block { name, body } => {
                    self.expect_kind(TemplateKind::Page, "block", node.span)?;
                    ops.push(Op::Block {
                        name: name.clone(),
                        body: self.nested(body)?,
                    });
                }
                NodeKind::Stack { name } => ops.push(Op::Stack { name: name.clone() }),
                NodeKind::Push { name, body } => ops.push(Op::Push {
                    name: name.clone(),
                    body: self.nested(body)?,
                }),
            }
        }
        Ok(ops)
    }

    /// A body with its own scope frame.
    fn nested(&mut self, body: &Body) -> Result<Vec<Op>, CodegenError> {
        self.scope.push();
        let ops = self.body(body);
        self.scope.pop();
        ops
    }

    fn args(&mut self, args: &[NamedArg]) -> Result<Vec<(String, CExpr)>, CodegenError> {
        let mut compiled = Vec::with_capacity(args.len());
        for arg in args {
            compiled.push((arg.name.clone(), self.expr(&arg.value)?));
        }
        Ok(compiled)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn condition(&mut self, expr: &Expression) -> Result<CExpr, CodegenError> {
        let compiled = self.expr(expr)?;
        Ok(match condition_mode(expr) {
            CondMode::Direct => compiled,
            CondMode::Present => CExpr::Present(Box::new(compiled)),
        })
    }

    fn expr(&mut self, expr: &Expression) -> Result<CExpr, CodegenError> {
        let span = expr.span;
        let compiled = match &expr.kind {
            ExprKind::Variable(name) => match self.resolver.resolve(name, &self.scope) {
                Resolution::Local => CExpr::Local(name.clone()),
                Resolution::Field(access) => CExpr::Field {
                    name: name.clone(),
                    access,
                },
            },
            ExprKind::String(s) => CExpr::Literal(Value::from(s.as_str())),
            ExprKind::Number(raw) => CExpr::Literal(self.number(raw, span)?),
            ExprKind::Boolean(b) => CExpr::Literal(Value::Bool(*b)),
            ExprKind::Property { object, name } => self.property(object, name, false)?,
            ExprKind::NullSafeProperty { object, name } => self.property(object, name, true)?,
            ExprKind::MethodCall { object, name, args } => {
                self.method(object, name, args, false, span)?
            }
            ExprKind::NullSafeMethodCall { object, name, args } => {
                self.method(object, name, args, true, span)?
            }
            ExprKind::Index { object, index } => CExpr::Index {
                object: Box::new(self.expr(object)?),
                index: Box::new(self.expr(index)?),
                span,
            },
            ExprKind::Binary { left, op, right } => {
                let left = Box::new(self.expr(left)?);
                let right = Box::new(self.expr(right)?);
                match op {
                    BinaryOp::Eq | BinaryOp::NotEq => CExpr::Equals {
                        left,
                        right,
                        negated: *op == BinaryOp::NotEq,
                    },
                    _ => CExpr::Binary {
                        left,
                        op: *op,
                        right,
                        span,
                    },
                }
            }
            ExprKind::Not(operand) => CExpr::Not(Box::new(self.expr(operand)?)),
            ExprKind::Negate(operand) => CExpr::Negate {
                operand: Box::new(self.expr(operand)?),
                span,
            },
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => CExpr::Ternary {
                condition: Box::new(self.condition(condition)?),
                then_expr: Box::new(self.expr(then_expr)?),
                else_expr: Box::new(self.expr(else_expr)?),
                span,
            },
            ExprKind::NullCoalesce { left, fallback } => CExpr::Coalesce {
                left: Box::new(self.expr(left)?),
                fallback: Box::new(self.expr(fallback)?),
            },
            ExprKind::Filter { input, name, args } => {
                let input = Box::new(self.expr(input)?);
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.filters.push((name.clone(), span));
                CExpr::Filter {
                    name: name.clone(),
                    input,
                    args,
                    span,
                }
            }
            ExprKind::Grouped(inner) => CExpr::Group(Box::new(self.expr(inner)?)),
        };
        Ok(compiled)
    }

    fn property(
        &mut self,
        object: &Expression,
        name: &str,
        null_safe: bool,
    ) -> Result<CExpr, CodegenError> {
        let key = self.resolver.property(name).key(name).to_string();
        Ok(CExpr::Property {
            object: Box::new(self.expr(object)?),
            key,
            null_safe,
        })
    }

    fn method(
        &mut self,
        object: &Expression,
        name: &str,
        args: &[Expression],
        null_safe: bool,
        span: Span,
    ) -> Result<CExpr, CodegenError> {
        let object = Box::new(self.expr(object)?);
        let args = args
            .iter()
            .map(|a| self.expr(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CExpr::Method {
            object,
            name: name.to_string(),
            args,
            null_safe,
            span,
        })
    }

    fn number(&self, raw: &str, span: Span) -> Result<Value, CodegenError> {
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::from(i));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(crate::value::number)
            .ok_or_else(|| self.internal(format!("invalid number literal '{raw}'"), span))
    }

    fn expect_kind(
        &self,
        expected: TemplateKind,
        directive: &str,
        span: Span,
    ) -> Result<(), CodegenError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(self.internal(
                format!("'{directive}' reached the generator in a {:?} template", self.kind),
                span,
            ))
        }
    }

    fn internal(&self, message: String, span: Span) -> CodegenError {
        CodegenError::Internal {
            message,
            location: Location::at(self.file, span),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{Access, DefaultResolver, SnakeCaseResolver};
    use glint_parser::ast::{Body, Node};
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Procedure {
        let template = glint_parser::parse(source, "test.glint").unwrap();
        generate(&template, &DefaultResolver).unwrap()
    }

    fn expr(source: &str) -> Expression {
        glint_parser::expr_parser::ExprParser::parse(source).unwrap()
    }

    fn field(name: &str) -> CExpr {
        CExpr::Field {
            name: name.into(),
            access: Access::Direct,
        }
    }

    // =========================================================================
    // Condition modes
    // =========================================================================

    #[test]
    fn test_direct_conditions() {
        for source in [
            "a == b",
            "a < 1",
            "a && b",
            "!a",
            "true",
            "a ? b : c",
            "items.contains(x)",
            "user?.isAdmin()",
            "(a || b)",
        ] {
            assert_eq!(condition_mode(&expr(source)), CondMode::Direct, "{source}");
        }
    }

    #[test]
    fn test_present_conditions() {
        for source in ["user", "user.name", "items[0]", "a + b", "name | trim", "a ?? b", "'x'", "(user)"] {
            assert_eq!(condition_mode(&expr(source)), CondMode::Present, "{source}");
        }
    }

    #[test]
    fn test_if_wraps_plain_value_in_present() {
        let p = compile("{{ if user }}x{{ end }}");
        let Op::If { condition, .. } = &p.ops()[0] else {
            panic!("expected if");
        };
        assert_eq!(condition, &CExpr::Present(Box::new(field("user"))));
    }

    #[test]
    fn test_if_keeps_comparison_direct() {
        let p = compile("{{ if count > 0 }}x{{ end }}");
        let Op::If { condition, .. } = &p.ops()[0] else {
            panic!("expected if");
        };
        assert!(matches!(condition, CExpr::Binary { op: BinaryOp::Gt, .. }));
    }

    // =========================================================================
    // Text and output
    // =========================================================================

    #[test]
    fn test_text_and_writes() {
        let p = compile("<p>{{ a }}{{ raw b }}</p>");
        assert_eq!(
            p.ops(),
            &[
                Op::Raw("<p>".into()),
                Op::Write {
                    expr: field("a"),
                    escape: true
                },
                Op::Write {
                    expr: field("b"),
                    escape: false
                },
                Op::Raw("</p>".into()),
            ]
        );
    }

    #[test]
    fn test_empty_template_has_no_ops() {
        assert!(compile("").ops().is_empty());
    }

    #[test]
    fn test_equality_compiles_to_equals() {
        let p = compile("{{ a != 1 }}");
        let Op::Write { expr, .. } = &p.ops()[0] else {
            panic!("expected write");
        };
        assert_eq!(
            expr,
            &CExpr::Equals {
                left: Box::new(field("a")),
                right: Box::new(CExpr::Literal(Value::from(1))),
                negated: true,
            }
        );
    }

    #[test]
    fn test_number_literals() {
        let p = compile("{{ 42 }}{{ 2.5 }}");
        assert_eq!(
            p.ops()[0],
            Op::Write {
                expr: CExpr::Literal(Value::from(42)),
                escape: true
            }
        );
        assert_eq!(
            p.ops()[1],
            Op::Write {
                expr: CExpr::Literal(Value::from(2.5)),
                escape: true
            }
        );
    }

    // =========================================================================
    // Name resolution
    // =========================================================================

    #[test]
    fn test_loop_variables_are_locals() {
        let p = compile("{{ for item in items }}{{ item }}{{ item_last }}{{ end }}{{ item }}");
        let Op::For {
            collection, body, ..
        } = &p.ops()[0]
        else {
            panic!("expected for");
        };
        assert_eq!(collection, &field("items"));
        assert_eq!(
            body,
            &vec![
                Op::Write {
                    expr: CExpr::Local("item".into()),
                    escape: true
                },
                Op::Write {
                    expr: CExpr::Local("item_last".into()),
                    escape: true
                },
            ]
        );
        // Out of the loop, `item` is a field again.
        assert_eq!(
            p.ops()[1],
            Op::Write {
                expr: field("item"),
                escape: true
            }
        );
    }

    #[test]
    fn test_set_is_visible_to_later_siblings_only() {
        let p = compile("{{ total }}{{ set total = 1 }}{{ total }}");
        assert_eq!(
            p.ops()[0],
            Op::Write {
                expr: field("total"),
                escape: true
            }
        );
        assert_eq!(
            p.ops()[2],
            Op::Write {
                expr: CExpr::Local("total".into()),
                escape: true
            }
        );
    }

    #[test]
    fn test_set_inside_if_does_not_leak() {
        let p = compile("{{ if a }}{{ set x = 1 }}{{ end }}{{ x }}");
        assert_eq!(
            p.ops()[1],
            Op::Write {
                expr: field("x"),
                escape: true
            }
        );
    }

    #[test]
    fn test_snake_case_resolver_renames_fields_and_properties() {
        let template = glint_parser::parse("{{ userName.firstName }}", "t.glint").unwrap();
        let p = generate(&template, &SnakeCaseResolver).unwrap();
        assert_eq!(
            p.ops()[0],
            Op::Write {
                expr: CExpr::Property {
                    object: Box::new(CExpr::Field {
                        name: "userName".into(),
                        access: Access::Renamed("user_name".into()),
                    }),
                    key: "first_name".into(),
                    null_safe: false,
                },
                escape: true
            }
        );
    }

    // =========================================================================
    // Structure
    // =========================================================================

    #[test]
    fn test_switch_arms_in_order() {
        let p = compile("{{ switch s }}{{ case 1 }}a{{ case 2 }}b{{ default }}c{{ end }}");
        let Op::Switch { arms, default, .. } = &p.ops()[0] else {
            panic!("expected switch");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].0, CExpr::Literal(Value::from(1)));
        assert_eq!(arms[1].1, vec![Op::Raw("b".into())]);
        assert_eq!(default, &vec![Op::Raw("c".into())]);
    }

    #[test]
    fn test_fragments_are_registered() {
        let p = compile("{{ fragment \"a\" }}1{{ end }}{{ if x }}{{ fragment \"b\" }}2{{ end }}{{ end }}");
        assert_eq!(p.fragments(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_duplicate_fragment_is_internal_error() {
        // Hand-built: the parser rejects duplicate fragment names itself.
        let mut template = glint_parser::parse("{{ fragment \"a\" }}{{ end }}", "t.glint").unwrap();
        let fragment = template.body.nodes[0].clone();
        template.body.nodes.push(fragment);
        let err = generate(&template, &DefaultResolver).unwrap_err();
        assert!(matches!(err, CodegenError::Internal { .. }));
        assert!(err.to_string().contains("fragment 'a' is defined twice"));
    }

    #[test]
    fn test_filters_are_collected() {
        let p = compile("{{ name | trim | upper }}{{ x | trim }}");
        assert_eq!(p.filters_used(), vec!["trim", "upper"]);
    }

    #[test]
    fn test_content_in_page_is_internal_error() {
        // Hand-built: the parser never produces this.
        let template = Template {
            kind: TemplateKind::Page,
            file: "t.glint".into(),
            header: Vec::new(),
            body: Body::new(vec![Node::new(NodeKind::Content, Span::new(0, 0, 1, 1))]),
        };
        let err = generate(&template, &DefaultResolver).unwrap_err();
        assert!(matches!(err, CodegenError::Internal { .. }));
        assert!(err.to_string().starts_with("t.glint:1:1:"));
    }

    #[test]
    fn test_header_is_passed_through() {
        let p = compile("@extends \"base\"\n<p></p>");
        assert_eq!(p.header_value("extends"), Some("\"base\""));
        assert_eq!(p.kind(), TemplateKind::Page);
    }
}
