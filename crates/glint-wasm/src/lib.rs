//! WASM bindings for the Glint compiler.
//!
//! Exposes `compile()`, `render()` and `version()` to JavaScript via
//! wasm-bindgen. Errors are thrown as JS errors carrying the
//! `file:line:column: message` text.

use glint_codegen::{Environment, Procedure};
use serde_json::Value;
use wasm_bindgen::prelude::*;

/// File name used in error locations.
const FILE: &str = "input.glint";

/// Compile Glint source to a JavaScript render function.
///
/// Returns `{ js: string, kind: "page" | "layout", fragments: string[],
/// filters: string[] }`. Throws if the template does not compile.
#[wasm_bindgen]
pub fn compile(source: &str) -> Result<JsValue, JsError> {
    let procedure = glint_codegen::compile(source, FILE).map_err(|e| JsError::new(&e.to_string()))?;

    let js_obj = js_sys::Object::new();
    set(&js_obj, "js", &procedure.emit().into())?;
    set(&js_obj, "kind", &kind_name(&procedure).into())?;
    set(&js_obj, "fragments", &string_array(procedure.fragments()).into())?;
    set(&js_obj, "filters", &string_array(&procedure.filters_used()).into())?;

    Ok(js_obj.into())
}

/// Render Glint source against `data` (any JSON-compatible value, `undefined`
/// for none). With `fragment`, only that fragment is rendered.
#[wasm_bindgen]
pub fn render(source: &str, data: JsValue, fragment: Option<String>) -> Result<String, JsError> {
    let data: Value = if data.is_undefined() || data.is_null() {
        Value::Object(Default::default())
    } else {
        serde_wasm_bindgen::from_value(data).map_err(|e| JsError::new(&e.to_string()))?
    };
    render_json(source, &data, fragment.as_deref()).map_err(|e| JsError::new(&e.to_string()))
}

/// Get the compiler version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn render_json(
    source: &str,
    data: &Value,
    fragment: Option<&str>,
) -> Result<String, glint_codegen::Error> {
    let procedure = glint_codegen::compile(source, FILE)?;
    let env = Environment::new();
    let html = match fragment {
        Some(name) => procedure.render_fragment(name, data, &env)?,
        None => procedure.render(data, &env)?,
    };
    Ok(html)
}

fn kind_name(procedure: &Procedure) -> &'static str {
    match procedure.kind() {
        glint_parser::ast::TemplateKind::Page => "page",
        glint_parser::ast::TemplateKind::Layout => "layout",
    }
}

fn set(obj: &js_sys::Object, key: &str, value: &JsValue) -> Result<(), JsError> {
    js_sys::Reflect::set(obj, &key.into(), value)
        .map(|_| ())
        .map_err(|_| JsError::new(&format!("Failed to set {key} property")))
}

fn string_array<S: AsRef<str>>(items: &[S]) -> js_sys::Array {
    items
        .iter()
        .map(|item| JsValue::from_str(item.as_ref()))
        .collect()
}
