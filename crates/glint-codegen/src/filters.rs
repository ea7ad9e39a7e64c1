//! Filter registry.
//!
//! Filters are named transforms applied with `|`: `{{ name | trim | upper }}`.
//! Each receives the evaluated input and its positional arguments.

use crate::escape::escape;
use crate::value::{as_integer, number, stringify, type_name};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A filter implementation. Errors are plain messages; the renderer adds
/// the filter name and source location.
pub type FilterFn = Box<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>;

/// Maps filter names to their implementations.
#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("trim", |v, args| {
            no_args("trim", args)?;
            Ok(Value::from(stringify(v).trim()))
        });
        registry.register("upper", |v, args| {
            no_args("upper", args)?;
            Ok(Value::from(stringify(v).to_uppercase()))
        });
        registry.register("lower", |v, args| {
            no_args("lower", args)?;
            Ok(Value::from(stringify(v).to_lowercase()))
        });
        registry.register("capitalize", |v, args| {
            no_args("capitalize", args)?;
            Ok(Value::from(capitalize(&stringify(v))))
        });
        registry.register("title", |v, args| {
            no_args("title", args)?;
            let words: Vec<String> = stringify(v).split(' ').map(capitalize).collect();
            Ok(Value::from(words.join(" ")))
        });
        registry.register("length", length);
        registry.register("default", |v, args| {
            let fallback = arg("default", args, 0)?;
            match v {
                Value::Null => Ok(fallback.clone()),
                Value::String(s) if s.is_empty() => Ok(fallback.clone()),
                _ => Ok(v.clone()),
            }
        });
        registry.register("join", join);
        registry.register("first", |v, args| {
            no_args("first", args)?;
            first_or_last(v, true)
        });
        registry.register("last", |v, args| {
            no_args("last", args)?;
            first_or_last(v, false)
        });
        registry.register("reverse", |v, args| {
            no_args("reverse", args)?;
            match v {
                Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
                Value::String(s) => Ok(Value::from(s.chars().rev().collect::<String>())),
                Value::Null => Ok(Value::Null),
                other => Err(format!("cannot reverse {}", type_name(other))),
            }
        });
        registry.register("truncate", |v, args| {
            let limit = as_integer(arg("truncate", args, 0)?)
                .filter(|n| *n >= 0)
                .ok_or("expects a non-negative length")? as usize;
            let suffix = args.get(1).map_or_else(|| "...".to_string(), stringify);
            let text = stringify(v);
            if text.chars().count() <= limit {
                return Ok(Value::from(text));
            }
            let mut cut: String = text.chars().take(limit).collect();
            cut.push_str(&suffix);
            Ok(Value::from(cut))
        });
        registry.register("replace", |v, args| {
            let from = stringify(arg("replace", args, 0)?);
            let to = stringify(arg("replace", args, 1)?);
            if from.is_empty() {
                return Ok(Value::from(stringify(v)));
            }
            Ok(Value::from(stringify(v).replace(&from, &to)))
        });
        registry.register("abs", |v, args| {
            no_args("abs", args)?;
            match v {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Ok(Value::from(i.saturating_abs())),
                    None => number(n.as_f64().unwrap_or_default().abs())
                        .ok_or_else(|| "result is not a finite number".to_string()),
                },
                other => Err(format!("expects a number, found {}", type_name(other))),
            }
        });
        registry.register("round", |v, args| {
            let digits = match args.first() {
                Some(d) => as_integer(d).ok_or("expects an integer precision")?,
                None => 0,
            };
            let Value::Number(n) = v else {
                return Err(format!("expects a number, found {}", type_name(v)));
            };
            let f = n.as_f64().unwrap_or_default();
            let scale = 10f64.powi(digits.clamp(0, 15) as i32);
            number((f * scale).round() / scale)
                .ok_or_else(|| "result is not a finite number".to_string())
        });
        registry.register("json", |v, args| {
            no_args("json", args)?;
            serde_json::to_string(v)
                .map(Value::from)
                .map_err(|e| e.to_string())
        });
        registry.register("escape", |v, args| {
            no_args("escape", args)?;
            Ok(Value::from(escape(&stringify(v))))
        });
        registry
    }

    /// Register (or replace) a filter.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Box::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered filter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The built-in registry, shared by every `Environment` that does not
/// bring its own.
pub fn builtin_filters() -> &'static FilterRegistry {
    static BUILTIN: OnceLock<FilterRegistry> = OnceLock::new();
    BUILTIN.get_or_init(FilterRegistry::builtin)
}

// =========================================================================
// Shared implementations
// =========================================================================

fn no_args(name: &str, args: &[Value]) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("'{name}' takes no arguments, got {}", args.len()))
    }
}

fn arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a Value, String> {
    args.get(index)
        .ok_or_else(|| format!("'{name}' expects at least {} argument(s)", index + 1))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Also used by the `length`/`size` methods.
pub(crate) fn length(v: &Value, args: &[Value]) -> Result<Value, String> {
    no_args("length", args)?;
    let len = match v {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => return Err(format!("{} has no length", type_name(other))),
    };
    Ok(Value::from(len))
}

/// Also used by the `join` method. The separator defaults to the empty string.
pub(crate) fn join(v: &Value, args: &[Value]) -> Result<Value, String> {
    let separator = args.first().map(stringify).unwrap_or_default();
    match v {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stringify).collect();
            Ok(Value::from(parts.join(&separator)))
        }
        Value::Null => Ok(Value::from("")),
        other => Err(format!("cannot join {}", type_name(other))),
    }
}

/// Also used by the `first`/`last` methods.
pub(crate) fn first_or_last(v: &Value, first: bool) -> Result<Value, String> {
    match v {
        Value::Array(items) => {
            let item = if first { items.first() } else { items.last() };
            Ok(item.cloned().unwrap_or(Value::Null))
        }
        Value::String(s) => {
            let c = if first { s.chars().next() } else { s.chars().last() };
            Ok(c.map_or(Value::Null, |c| Value::from(c.to_string())))
        }
        Value::Null => Ok(Value::Null),
        other => Err(format!("{} has no elements", type_name(other))),
    }
}
