//! Argument values and their safe literal encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// A live argument value supplied with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ArgValue>),
    Object(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Int(_) => "integer",
            ArgValue::Float(_) => "float",
            ArgValue::String(_) => "string",
            ArgValue::List(_) => "list",
            ArgValue::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ArgValue::Null,
            serde_json::Value::Bool(b) => ArgValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Int(i),
                None => ArgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => ArgValue::String(s),
            serde_json::Value::Array(items) => {
                ArgValue::List(items.into_iter().map(ArgValue::from).collect())
            }
            serde_json::Value::Object(map) => ArgValue::Object(
                map.into_iter().map(|(k, v)| (k, ArgValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Int(i)
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        ArgValue::Float(f)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ArgValue::Null, Into::into)
    }
}

/// Escape a string for use inside a single-quoted literal. Only the quote
/// character changes.
pub fn escape_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// The standalone literal for `value`: `NULL`, a bare number, `true`/`false`,
/// or a quoted string.
pub fn encode_literal(key: &str, value: &ArgValue) -> Result<String> {
    match value {
        ArgValue::Null => Ok("NULL".to_string()),
        ArgValue::String(s) => Ok(format!("'{}'", escape_string(s))),
        ArgValue::Bool(b) => Ok(b.to_string()),
        ArgValue::Int(i) => Ok(i.to_string()),
        ArgValue::Float(f) => encode_float(key, *f),
        ArgValue::List(_) | ArgValue::Object(_) => Err(Error::UnsupportedType {
            key: key.to_string(),
            kind: value.kind(),
        }),
    }
}

/// The text of `value` when spliced into an enclosing string literal.
pub fn encode_embedded(key: &str, value: &ArgValue) -> Result<String> {
    match value {
        ArgValue::Null => Err(Error::Validation(format!(
            "argument '{}' is null and cannot be embedded in a string literal",
            key
        ))),
        ArgValue::String(s) => Ok(escape_string(s)),
        other => encode_literal(key, other),
    }
}

fn encode_float(key: &str, f: f64) -> Result<String> {
    if !f.is_finite() {
        return Err(Error::Validation(format!(
            "argument '{}' is not a finite number",
            key
        )));
    }
    // Display never uses exponent notation, so the text is plain decimal.
    Ok(f.to_string())
}
