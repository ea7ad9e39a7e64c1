//! Built-in methods callable on values: `items.contains(x)`, `name.trim()`.

use crate::filters;
use crate::value::{array_at, as_integer, loose_eq, stringify, type_name};
use serde_json::Value;

/// Names of every built-in method.
pub const METHODS: &[&str] = &[
    "length",
    "size",
    "isEmpty",
    "contains",
    "startsWith",
    "endsWith",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "keys",
    "values",
    "get",
    "first",
    "last",
    "join",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    /// No built-in method has this name.
    Unknown,
    /// The method exists but cannot apply to these operands.
    Invalid(String),
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        MethodError::Invalid(message)
    }
}

/// Call the built-in method `name` on `target`.
pub fn call_method(target: &Value, name: &str, args: &[Value]) -> Result<Value, MethodError> {
    match name {
        "length" | "size" => Ok(filters::length(target, args)?),
        "isEmpty" => {
            arity(name, args, 0)?;
            let empty = match target {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                _ => false,
            };
            Ok(Value::Bool(empty))
        }
        "contains" => {
            arity(name, args, 1)?;
            let needle = &args[0];
            let found = match target {
                Value::String(s) => s.contains(&stringify(needle)),
                Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
                Value::Object(map) => map.contains_key(&stringify(needle)),
                Value::Null => false,
                other => return Err(invalid(name, other)),
            };
            Ok(Value::Bool(found))
        }
        "startsWith" | "endsWith" => {
            arity(name, args, 1)?;
            let Value::String(s) = target else {
                return Err(invalid(name, target));
            };
            let affix = stringify(&args[0]);
            let matched = if name == "startsWith" {
                s.starts_with(&affix)
            } else {
                s.ends_with(&affix)
            };
            Ok(Value::Bool(matched))
        }
        "toUpperCase" | "toLowerCase" | "trim" => {
            arity(name, args, 0)?;
            let Value::String(s) = target else {
                return Err(invalid(name, target));
            };
            let result = match name {
                "toUpperCase" => s.to_uppercase(),
                "toLowerCase" => s.to_lowercase(),
                _ => s.trim().to_string(),
            };
            Ok(Value::from(result))
        }
        "keys" | "values" => {
            arity(name, args, 0)?;
            let Value::Object(map) = target else {
                return Err(invalid(name, target));
            };
            let items = if name == "keys" {
                map.keys().map(|k| Value::from(k.as_str())).collect()
            } else {
                map.values().cloned().collect()
            };
            Ok(Value::Array(items))
        }
        "get" => {
            arity(name, args, 1)?;
            match target {
                Value::Object(map) => Ok(map.get(&stringify(&args[0])).cloned().unwrap_or(Value::Null)),
                Value::Array(items) => match as_integer(&args[0]) {
                    Some(index) => Ok(array_at(items, index)),
                    None => Err(MethodError::Invalid(format!(
                        "'get' on an array expects an integer index, found {}",
                        type_name(&args[0])
                    ))),
                },
                Value::Null => Ok(Value::Null),
                other => Err(invalid(name, other)),
            }
        }
        "first" | "last" => {
            arity(name, args, 0)?;
            Ok(filters::first_or_last(target, name == "first")?)
        }
        "join" => {
            if args.len() > 1 {
                return Err(MethodError::Invalid(format!(
                    "'join' takes at most 1 argument, got {}",
                    args.len()
                )));
            }
            Ok(filters::join(target, args)?)
        }
        _ => Err(MethodError::Unknown),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), MethodError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(MethodError::Invalid(format!(
            "'{name}' takes {expected} argument(s), got {}",
            args.len()
        )))
    }
}

fn invalid(name: &str, target: &Value) -> MethodError {
    MethodError::Invalid(format!("'{name}' is not available on {}", type_name(target)))
}
