//! Flat, typed settings store.
//!
//! Settings are read from a TOML document. Nested tables flatten into dotted
//! names (`cloud.timeout_ms`) and array elements into 1-based indices
//! (`select_keys.1`). Every getter takes a default that is returned when the
//! name is missing or holds a value of a different kind, so callers never
//! have to handle lookup failures.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, Value>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a TOML string.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let root: toml::Table = toml::from_str(content).context("parse settings")?;
        let mut settings = Self::new();
        for (name, value) in root {
            settings.insert_toml(name, value);
        }
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    fn insert_toml(&mut self, name: String, value: toml::Value) {
        match value {
            toml::Value::String(s) => {
                self.values.insert(name, Value::String(s));
            }
            toml::Value::Integer(i) => {
                self.values.insert(name, Value::Integer(i));
            }
            toml::Value::Float(f) => {
                self.values.insert(name, Value::Float(f));
            }
            toml::Value::Boolean(b) => {
                self.values.insert(name, Value::Boolean(b));
            }
            toml::Value::Datetime(d) => {
                self.values.insert(name, Value::String(d.to_string()));
            }
            toml::Value::Array(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    self.insert_toml(format!("{}.{}", name, i + 1), item);
                }
            }
            toml::Value::Table(table) => {
                for (key, item) in table {
                    self.insert_toml(format!("{}.{}", name, key), item);
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Kind of the value stored under `name`, if any.
    pub fn kind(&self, name: &str) -> Option<ValueKind> {
        self.values.get(name).map(Value::kind)
    }

    pub fn get_str(&self, name: &str, default: &str) -> String {
        self.get(name)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(Value::as_int).unwrap_or(default)
    }

    pub fn get_float(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(Value::as_float).unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Store a value, returning the previous one.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Option<Value> {
        self.values.insert(name.to_string(), value.into())
    }

    /// Collect the 1-based array stored under `name` (`name.1`, `name.2`, ...).
    pub fn get_list(&self, name: &str) -> Vec<Value> {
        let mut out = Vec::new();
        for i in 1.. {
            match self.values.get(&format!("{}.{}", name, i)) {
                Some(v) => out.push(v.clone()),
                None => break,
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
use_double_pinyin = true
selection_timeout = 1.5

[cloud]
timeout_ms = 800
provider = "baidu"

[colors]
requesting = [255, 0, 0]
"#;

    #[test]
    fn flattens_tables_and_arrays() {
        let s = Settings::from_toml_str(SAMPLE).unwrap();
        assert!(s.get_bool("use_double_pinyin", false));
        assert_eq!(s.get_int("cloud.timeout_ms", 0), 800);
        assert_eq!(s.get_str("cloud.provider", ""), "baidu");
        assert_eq!(s.get_int("colors.requesting.1", -1), 255);
        assert_eq!(s.get_list("colors.requesting").len(), 3);
        assert_eq!(s.kind("selection_timeout"), Some(ValueKind::Float));
    }

    #[test]
    fn mismatched_kind_returns_default() {
        let s = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(s.get_int("cloud.provider", -1), -1);
        assert_eq!(s.get_str("missing", "fallback"), "fallback");
        // integers widen to floats
        assert_eq!(s.get_float("cloud.timeout_ms", 0.0), 800.0);
    }

    #[test]
    fn set_overwrites() {
        let mut s = Settings::new();
        assert!(s.set("a", 1).is_none());
        assert_eq!(s.set("a", "x"), Some(Value::Integer(1)));
        assert_eq!(s.kind("a"), Some(ValueKind::String));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Settings::from_toml_str("= broken").is_err());
    }
}
