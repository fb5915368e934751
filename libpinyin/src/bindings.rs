//! Named, typed entry points into a [`PinyinContext`].
//!
//! Frontends and configuration scripts call engine functions by name with a
//! slice of [`Value`]s. Arity and argument kinds are checked before anything
//! runs, and every function returns exactly one value.
//!
//! | name                    | arguments                     | result  |
//! |-------------------------|-------------------------------|---------|
//! | `is_valid_pinyin`       | syllable                      | boolean |
//! | `is_valid_double_pinyin`| keys                          | boolean |
//! | `double_to_full_pinyin` | keys                          | string  |
//! | `bind_key`              | key, consonant, vowels (csv)  | boolean |
//! | `clear_scheme`          |                               | boolean |
//! | `request_count`         |                               | integer |
//! | `get_setting`           | dotted name                   | any     |

use anyhow::Context;
use cloudpinyin_core::value::{expect_arity, expect_str};
use cloudpinyin_core::{Settings, Value};
use tracing::debug;

use crate::context::PinyinContext;

pub const FUNCTIONS: &[&str] = &[
    "is_valid_pinyin",
    "is_valid_double_pinyin",
    "double_to_full_pinyin",
    "bind_key",
    "clear_scheme",
    "request_count",
    "get_setting",
];

pub struct HostBindings<'a> {
    context: &'a mut PinyinContext,
    settings: Settings,
}

impl<'a> HostBindings<'a> {
    /// Bind to `context`, snapshotting its configuration as settings.
    pub fn new(context: &'a mut PinyinContext) -> anyhow::Result<Self> {
        let settings = Settings::from_toml_str(&context.config().to_toml_string()?)
            .context("flatten context configuration")?;
        Ok(Self { context, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> anyhow::Result<Value> {
        debug!(name, argc = args.len(), "host call");
        match name {
            "is_valid_pinyin" => {
                expect_arity(args, 1, name)?;
                let syllable = expect_str(args, 0, name)?;
                Ok(self.context.mapper().is_valid_pinyin(syllable).into())
            }
            "is_valid_double_pinyin" => {
                expect_arity(args, 1, name)?;
                let keys = expect_str(args, 0, name)?;
                Ok(self.context.mapper().is_valid_double_pinyin(keys).into())
            }
            "double_to_full_pinyin" => {
                expect_arity(args, 1, name)?;
                let keys = expect_str(args, 0, name)?;
                Ok(self.context.mapper().query_text(keys).into())
            }
            "bind_key" => {
                expect_arity(args, 3, name)?;
                let key = single_char(expect_str(args, 0, name)?, name)?;
                let consonant = expect_str(args, 1, name)?;
                let vowels = split_vowels(expect_str(args, 2, name)?);
                self.context.mapper_mut().bind_key(key, consonant, vowels);
                Ok(true.into())
            }
            "clear_scheme" => {
                expect_arity(args, 0, name)?;
                self.context.mapper_mut().clear();
                Ok(true.into())
            }
            "request_count" => {
                expect_arity(args, 0, name)?;
                Ok(self.context.queue().request_count().into())
            }
            "get_setting" => {
                expect_arity(args, 1, name)?;
                let key = expect_str(args, 0, name)?;
                self.settings
                    .get(key)
                    .cloned()
                    .with_context(|| format!("{}: no setting named {}", name, key))
            }
            _ => anyhow::bail!("unknown function: {}", name),
        }
    }
}

fn single_char(s: &str, func: &str) -> anyhow::Result<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => anyhow::bail!("{}: key must be a single character, got {:?}", func, s),
    }
}

fn split_vowels(csv: &str) -> Vec<&str> {
    csv.split(',').map(str::trim).filter(|v| !v.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vowels_split_on_commas() {
        assert_eq!(split_vowels("uang, iang,,"), vec!["uang", "iang"]);
        assert!(split_vowels("").is_empty());
    }

    #[test]
    fn key_must_be_one_char() {
        assert_eq!(single_char(";", "bind_key").unwrap(), ';');
        assert!(single_char("", "bind_key").is_err());
        assert!(single_char("ab", "bind_key").is_err());
    }
}
