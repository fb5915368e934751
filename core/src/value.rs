//! Typed values exchanged with configuration and host-function callers.
//!
//! Everything that crosses the boundary between the engine and its
//! configuration layer is one of four primitive kinds. Callers describe
//! arguments and results with [`Value`] instead of positional signature
//! strings, and conversions back into Rust types are checked.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag for a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Float,
    String,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A tagged primitive value.
///
/// Deserializes untagged, so TOML `3`, `3.5`, `"x"` and `true` map to the
/// four variants directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Boolean(_) => ValueKind::Boolean,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; nothing else converts.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Fetch argument `index` from `args` as a string, with a descriptive error.
pub fn expect_str<'a>(args: &'a [Value], index: usize, func: &str) -> anyhow::Result<&'a str> {
    let value = expect_arg(args, index, func)?;
    value.as_str().ok_or_else(|| type_error(func, index, ValueKind::String, value))
}

/// Fetch argument `index` from `args` as an integer.
pub fn expect_int(args: &[Value], index: usize, func: &str) -> anyhow::Result<i64> {
    let value = expect_arg(args, index, func)?;
    value.as_int().ok_or_else(|| type_error(func, index, ValueKind::Integer, value))
}

/// Fetch argument `index` from `args` as a boolean.
pub fn expect_bool(args: &[Value], index: usize, func: &str) -> anyhow::Result<bool> {
    let value = expect_arg(args, index, func)?;
    value.as_bool().ok_or_else(|| type_error(func, index, ValueKind::Boolean, value))
}

/// Check that `args` holds exactly `expected` values.
pub fn expect_arity(args: &[Value], expected: usize, func: &str) -> anyhow::Result<()> {
    if args.len() != expected {
        anyhow::bail!(
            "{}: expected {} argument(s), got {}",
            func,
            expected,
            args.len()
        );
    }
    Ok(())
}

fn expect_arg<'a>(args: &'a [Value], index: usize, func: &str) -> anyhow::Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| anyhow::anyhow!("{}: missing argument #{}", func, index + 1))
}

fn type_error(func: &str, index: usize, expected: ValueKind, got: &Value) -> anyhow::Error {
    anyhow::anyhow!(
        "{}: argument #{} should be {}, got {}",
        func,
        index + 1,
        expected,
        got.kind()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_accessors() {
        assert_eq!(Value::from(3).kind(), ValueKind::Integer);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(2).as_float(), Some(2.0));
        assert_eq!(Value::from(2.5).as_int(), None);
    }

    #[test]
    fn argument_checks_report_position_and_kind() {
        let args = vec![Value::from("ui"), Value::from(7)];
        assert_eq!(expect_str(&args, 0, "f").unwrap(), "ui");
        assert_eq!(expect_int(&args, 1, "f").unwrap(), 7);

        let err = expect_bool(&args, 1, "f").unwrap_err().to_string();
        assert!(err.contains("argument #2"), "{}", err);
        assert!(err.contains("boolean"), "{}", err);

        assert!(expect_str(&args, 5, "f").is_err());
        assert!(expect_arity(&args, 2, "f").is_ok());
        assert!(expect_arity(&args, 1, "f").is_err());
    }

    #[test]
    fn untagged_toml_values() {
        #[derive(Deserialize)]
        struct Holder {
            a: Value,
            b: Value,
            c: Value,
            d: Value,
        }
        let h: Holder = toml::from_str("a = 1\nb = 1.5\nc = \"s\"\nd = false\n").unwrap();
        assert_eq!(h.a, Value::Integer(1));
        assert_eq!(h.b, Value::Float(1.5));
        assert_eq!(h.c, Value::String("s".into()));
        assert_eq!(h.d, Value::Boolean(false));
    }
}
