//! A set of named templates that can include, extend and embed each other.

use crate::filters::FilterRegistry;
use crate::ir::Procedure;
use crate::render::{ComponentRenderer, Environment, RenderError, RenderState};
use crate::resolve::{DefaultResolver, NameResolver};
use crate::sink::HtmlBuffer;
use crate::{generate, Error};
use glint_parser::ast::TemplateKind;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::collections::HashMap;

/// How deeply includes and widgets may nest before rendering gives up.
const MAX_DEPTH: usize = 64;

/// Compiled templates keyed by name.
///
/// Pages render through the layout named by `@extends`, and the library acts
/// as the [`ComponentRenderer`] for `include` and `widget`, so templates in
/// the same library can embed each other.
pub struct Library {
    templates: HashMap<String, Procedure>,
    resolver: Box<dyn NameResolver + Send + Sync>,
    filters: FilterRegistry,
    depth: Cell<usize>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    /// Empty library with the default resolver and built-in filters.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            resolver: Box::new(DefaultResolver),
            filters: FilterRegistry::builtin(),
            depth: Cell::new(0),
        }
    }

    /// Resolver for templates added from now on.
    pub fn with_resolver(mut self, resolver: impl NameResolver + Send + Sync + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Filters that templates are linked against and rendered with.
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Compile `source` and store it as `name`, replacing any template of the
    /// same name. `@layout` in the header makes it a layout.
    pub fn add(&mut self, name: &str, source: &str) -> Result<(), Error> {
        let template = glint_parser::parse(source, name)?;
        let procedure = generate(&template, self.resolver.as_ref())?;
        procedure.link(&self.filters)?;
        self.templates.insert(name.to_string(), procedure);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render `name`, then each layout up its `@extends` chain with the
    /// previous output as `content`.
    pub fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        self.render_with_state(name, data, &mut RenderState::new())
    }

    fn render_with_state(
        &self,
        name: &str,
        data: &Value,
        state: &mut RenderState,
    ) -> Result<String, RenderError> {
        let env = self.environment();
        let mut procedure = self.procedure(name)?;
        let mut html = render_with(procedure, data, &env, state)?;

        let mut chain = vec![name];
        while let Some(parent) = procedure.header_value("extends") {
            let parent = unquote(parent);
            if chain.contains(&parent) {
                return Err(RenderError::LayoutCycle(name.to_string()));
            }
            chain.push(parent);
            procedure = self.procedure(parent)?;
            state.set_content(html);
            html = render_with(procedure, data, &env, state)?;
        }
        Ok(html)
    }

    /// Render fragment `fragment` of template `name` on its own.
    pub fn render_fragment(
        &self,
        name: &str,
        fragment: &str,
        data: &Value,
    ) -> Result<String, RenderError> {
        self.procedure(name)?
            .render_fragment(fragment, data, &self.environment())
    }

    fn procedure(&self, name: &str) -> Result<&Procedure, RenderError> {
        self.templates
            .get(name)
            .ok_or_else(|| RenderError::UnknownTemplate(name.to_string()))
    }

    fn environment(&self) -> Environment<'_> {
        Environment::new()
            .with_filters(&self.filters)
            .with_components(self)
    }

    /// Render an included template or widget into the caller's `state`.
    fn nested(&self, name: &str, data: Value, state: &mut RenderState) -> Result<String, String> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(format!("templates nest deeper than {MAX_DEPTH} levels"));
        }
        self.depth.set(depth + 1);
        let result = state
            .nested(|state| self.render_with_state(name, &data, state))
            .map_err(|err| err.to_string());
        self.depth.set(depth);
        result
    }
}

/// Strip one pair of matching double or single quotes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn render_with(
    procedure: &Procedure,
    data: &Value,
    env: &Environment,
    state: &mut RenderState,
) -> Result<String, RenderError> {
    let mut out = HtmlBuffer::new();
    procedure.render_into(data, env, &mut out, state)?;
    Ok(out.into_string())
}

impl ComponentRenderer for Library {
    fn render_component(
        &self,
        name: &str,
        args: &Map<String, Value>,
        state: &mut RenderState,
    ) -> Result<String, String> {
        if self.get(name).is_some_and(|p| p.kind() == TemplateKind::Layout) {
            return Err(format!("'{name}' is a layout"));
        }
        self.nested(name, Value::Object(args.clone()), state)
    }

    fn render_include(
        &self,
        name: &str,
        data: &Map<String, Value>,
        state: &mut RenderState,
    ) -> Result<String, String> {
        self.nested(name, Value::Object(data.clone()), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::SnakeCaseResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn library(templates: &[(&str, &str)]) -> Library {
        let mut library = Library::new();
        for (name, source) in templates {
            library.add(name, source).unwrap();
        }
        library
    }

    const BASE: &str = "@layout\n<title>{{ slot \"title\" }}Site{{ end }}</title><main>{{ content }}</main>{{ stack \"js\" }}";

    // =========================================================================
    // Layouts
    // =========================================================================

    #[test]
    fn test_page_renders_through_layout() {
        let lib = library(&[
            ("base", BASE),
            (
                "home",
                "@extends \"base\"\n{{ block \"title\" }}Home{{ end }}{{ push \"js\" }}<script>a()</script>{{ end }}<p>{{ msg }}</p>",
            ),
        ]);
        assert_eq!(
            lib.render("home", &json!({ "msg": "hi" })).unwrap(),
            "<title>Home</title><main><p>hi</p></main><script>a()</script>"
        );
    }

    #[test]
    fn test_slot_default_without_block() {
        let lib = library(&[("base", BASE), ("about", "@extends \"base\"\nAbout")]);
        assert_eq!(
            lib.render("about", &json!({})).unwrap(),
            "<title>Site</title><main>About</main>"
        );
    }

    #[test]
    fn test_layout_chain() {
        let lib = library(&[
            ("outer", "@layout\n<html>{{ content }}</html>"),
            ("inner", "@layout\n@extends \"outer\"\n<body>{{ content }}</body>"),
            ("page", "@extends \"inner\"\nx"),
        ]);
        assert_eq!(lib.render("page", &json!({})).unwrap(), "<html><body>x</body></html>");
    }

    #[test]
    fn test_layout_cycle() {
        let lib = library(&[
            ("a", "@layout\n@extends \"b\"\n{{ content }}"),
            ("b", "@layout\n@extends \"a\"\n{{ content }}"),
            ("page", "@extends \"a\"\nx"),
        ]);
        assert_eq!(
            lib.render("page", &json!({})),
            Err(RenderError::LayoutCycle("page".into()))
        );
    }

    #[test]
    fn test_extends_accepts_single_quotes_and_spacing() {
        let lib = library(&[
            ("base", BASE),
            ("single", "@extends 'base'\nA"),
            ("spaced", "@ extends \"base\"\nB"),
        ]);
        assert_eq!(
            lib.render("single", &json!({})).unwrap(),
            "<title>Site</title><main>A</main>"
        );
        assert_eq!(
            lib.render("spaced", &json!({})).unwrap(),
            "<title>Site</title><main>B</main>"
        );
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"base\""), "base");
        assert_eq!(unquote("'base'"), "base");
        assert_eq!(unquote("base"), "base");
        assert_eq!(unquote("\"base'"), "\"base'");
    }

    #[test]
    fn test_missing_layout() {
        let lib = library(&[("page", "@extends \"nope\"\nx")]);
        assert_eq!(
            lib.render("page", &json!({})),
            Err(RenderError::UnknownTemplate("nope".into()))
        );
    }

    // =========================================================================
    // Include and widget
    // =========================================================================

    #[test]
    fn test_include_sees_root_data_and_args() {
        let lib = library(&[
            ("nav", "<nav>{{ site }}/{{ active }}</nav>"),
            ("page", "{{ include \"nav\" active=\"home\" }}"),
        ]);
        assert_eq!(
            lib.render("page", &json!({ "site": "glint" })).unwrap(),
            "<nav>glint/home</nav>"
        );
    }

    #[test]
    fn test_widget_sees_only_args() {
        let lib = library(&[
            ("card", "<div>{{ title }}{{ site }}</div>"),
            ("page", "{{ widget \"card\" title=\"<b>\" }}"),
        ]);
        assert_eq!(
            lib.render("page", &json!({ "site": "glint" })).unwrap(),
            "<div>&lt;b&gt;</div>"
        );
    }

    #[test]
    fn test_widget_cannot_be_a_layout() {
        let lib = library(&[("base", BASE), ("page", "{{ widget \"base\" }}")]);
        let err = lib.render("page", &json!({})).unwrap_err();
        assert!(err.to_string().contains("'base' is a layout"), "{err}");
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let lib = library(&[("loop", "{{ include \"loop\" }}")]);
        let err = lib.render("loop", &json!({})).unwrap_err();
        assert!(err.to_string().contains("nest deeper than 64"), "{err}");
        assert_eq!(lib.depth.get(), 0);
    }

    #[test]
    fn test_include_pushes_reach_layout_stack() {
        let lib = library(&[
            ("base", BASE),
            ("p", "{{ push \"js\" }}<script>p()</script>{{ end }}P"),
            ("w", "{{ push \"js\" }}<script>w()</script>{{ end }}W"),
            ("page", "@extends \"base\"\n{{ include \"p\" }}{{ widget \"w\" }}"),
        ]);
        assert_eq!(
            lib.render("page", &json!({})).unwrap(),
            "<title>Site</title><main>PW</main><script>p()</script><script>w()</script>"
        );
    }

    #[test]
    fn test_include_block_fills_layout_slot() {
        let lib = library(&[
            ("base", BASE),
            ("meta", "{{ block \"title\" }}From include{{ end }}"),
            ("page", "@extends \"base\"\n{{ include \"meta\" }}x"),
        ]);
        assert_eq!(
            lib.render("page", &json!({})).unwrap(),
            "<title>From include</title><main>x</main>"
        );
    }

    #[test]
    fn test_include_does_not_see_caller_locals() {
        let lib = library(&[
            ("show", "[{{ n }}]"),
            ("page", "{{ set n = 1 }}{{ include \"show\" }}{{ n }}"),
        ]);
        assert_eq!(lib.render("page", &json!({})).unwrap(), "[]1");
    }

    #[test]
    fn test_unknown_include() {
        let lib = library(&[("page", "{{ include \"nope\" }}")]);
        let err = lib.render("page", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unknown template 'nope'"), "{err}");
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    #[test]
    fn test_add_links_filters() {
        let mut lib = Library::new();
        let err = lib.add("page", "{{ x | shout }}").unwrap_err();
        assert!(matches!(err, Error::Codegen(_)));
        assert!(!lib.contains("page"));

        let mut filters = FilterRegistry::builtin();
        filters.register("shout", |v, _| Ok(Value::from(format!("{}!", crate::value::stringify(v)))));
        let mut lib = Library::new().with_filters(filters);
        lib.add("page", "{{ x | shout }}").unwrap();
        assert_eq!(lib.render("page", &json!({ "x": "a" })).unwrap(), "a!");
    }

    #[test]
    fn test_with_resolver() {
        let mut lib = Library::new().with_resolver(SnakeCaseResolver);
        lib.add("page", "{{ firstName }}").unwrap();
        assert_eq!(lib.render("page", &json!({ "first_name": "Ada" })).unwrap(), "Ada");
    }

    #[test]
    fn test_names_and_fragments() {
        let lib = library(&[
            ("b", "x"),
            ("a", "<table>{{ fragment \"row\" }}<tr>{{ r }}</tr>{{ end }}</table>"),
        ]);
        assert_eq!(lib.names(), vec!["a", "b"]);
        assert_eq!(lib.render_fragment("a", "row", &json!({ "r": 1 })).unwrap(), "<tr>1</tr>");
        assert_eq!(
            lib.render_fragment("a", "nope", &json!({})),
            Err(RenderError::UnknownFragment("nope".into()))
        );
    }
}
