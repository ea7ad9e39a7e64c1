//! Runtime value helpers.
//!
//! The data context is a `serde_json::Value`; `Null` stands for "absent".

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Largest integer magnitude a float may hold and still print as an integer.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_991.0;

/// Convert a value to output text.
///
/// Strings as-is, integral numbers without `.0`, booleans as `true`/`false`,
/// null as the empty string, arrays and objects as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Format a number, removing `.0` for integers.
pub fn format_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= EXACT_INTEGER_LIMIT => format!("{}", f as i64),
        Some(f) => format!("{f}"),
        None => n.to_string(),
    }
}

/// Build a number value, keeping integral results as integers.
///
/// Returns `None` for NaN and infinities, which JSON cannot hold.
pub fn number(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() <= EXACT_INTEGER_LIMIT {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

/// "Not absent and not false": the truthiness of `if` on plain values and of
/// `!`, `&&` and `||`.
pub fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Structural equality; numbers compare numerically so `1 == 1.0`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => left == right,
    }
}

/// Ordering for `< > <= >=`: number/number or string/string only.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Some(a.cmp(&b))
            } else {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Short type name for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integer view of a number value (`2.0` counts, `2.5` does not).
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= EXACT_INTEGER_LIMIT)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

/// Element of an array by index; negative indexes count from the end.
pub fn array_at(items: &[Value], index: i64) -> Value {
    let len = items.len() as i64;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        items[index as usize].clone()
    } else {
        Value::Null
    }
}
