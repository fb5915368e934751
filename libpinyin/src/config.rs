//! Pinyin-specific configuration that extends the base `Config` from core.
//!
//! This configuration includes:
//! - All generic options from `cloudpinyin_core::Config` (flattened via serde)
//! - Double pinyin switches and scheme selection
//! - Custom key bindings layered over the preset
//! - The `[cloud]` fetcher table
//!
//! # Example
//!
//! ```rust
//! use cloudpinyin::PinyinConfig;
//!
//! let config = PinyinConfig::from_toml_str(r#"
//! worker_threads = 2
//! use_double_pinyin = true
//! double_pinyin_scheme = "XiaoHe"
//!
//! [cloud]
//! enabled = false
//! "#).unwrap();
//! assert_eq!(config.base().worker_threads, 2);
//! ```
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::cloud::{CloudInput, CloudProvider};
use crate::double_pinyin::{DoublePinyinScheme, KeyBinding, SchemeMapper};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PinyinConfig {
    /// Base configuration fields (worker pool sizing)
    #[serde(flatten)]
    pub base: cloudpinyin_core::Config,

    /// Decode keystrokes as double pinyin
    pub use_double_pinyin: bool,

    /// Reject keystroke text that is not complete double pinyin
    pub strict_double_pinyin: bool,

    /// Double pinyin scheme (e.g., "Microsoft", "ZiRanMa", "XiaoHe")
    pub double_pinyin_scheme: Option<String>,

    /// Bindings applied after the preset; a key listed here replaces the
    /// preset's binding for that key.
    pub key_bindings: Vec<KeyBinding>,

    pub cloud: CloudConfig,
}

impl Default for PinyinConfig {
    fn default() -> Self {
        Self {
            base: cloudpinyin_core::Config::default(),
            use_double_pinyin: false,
            strict_double_pinyin: false,
            double_pinyin_scheme: Some(DoublePinyinScheme::Microsoft.name().to_string()),
            key_bindings: Vec::new(),
            cloud: CloudConfig::default(),
        }
    }
}

/// Settings for the HTTP fetcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    /// "baidu" or "custom"
    pub provider: String,
    /// Endpoint used when `provider = "custom"`
    pub custom_url: Option<String>,
    pub timeout_ms: u64,
    /// Responses remembered per payload; 0 disables the cache
    pub cache_size: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "baidu".to_string(),
            custom_url: None,
            timeout_ms: 500,
            cache_size: 128,
        }
    }
}

impl CloudConfig {
    pub fn provider(&self) -> anyhow::Result<CloudProvider> {
        match self.provider.trim().to_ascii_lowercase().as_str() {
            "baidu" => Ok(CloudProvider::Baidu),
            "custom" => {
                let url = self
                    .custom_url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .context("cloud provider \"custom\" needs custom_url")?;
                Ok(CloudProvider::Custom(url.to_string()))
            }
            other => anyhow::bail!("unknown cloud provider: {}", other),
        }
    }

    /// Build the fetcher described by this table.
    pub fn build(&self) -> anyhow::Result<CloudInput> {
        let mut cloud = CloudInput::new(self.provider()?);
        cloud.set_enabled(self.enabled);
        cloud.set_timeout(self.timeout_ms);
        cloud.set_cache_size(self.cache_size);
        Ok(cloud)
    }
}

impl PinyinConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parse config {}", path.display()))
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get a reference to the base config
    pub fn base(&self) -> &cloudpinyin_core::Config {
        &self.base
    }

    /// Get a mutable reference to the base config
    pub fn base_mut(&mut self) -> &mut cloudpinyin_core::Config {
        &mut self.base
    }

    /// Selected preset, if any.
    pub fn scheme(&self) -> anyhow::Result<Option<DoublePinyinScheme>> {
        self.double_pinyin_scheme
            .as_deref()
            .map(str::parse)
            .transpose()
    }

    /// Preset bindings followed by the custom ones.
    pub fn resolved_bindings(&self) -> anyhow::Result<Vec<KeyBinding>> {
        let mut bindings = self.scheme()?.map(|s| s.bindings()).unwrap_or_default();
        bindings.extend(self.key_bindings.iter().cloned());
        Ok(bindings)
    }

    pub fn build_mapper(&self) -> anyhow::Result<SchemeMapper> {
        Ok(SchemeMapper::from_bindings(self.resolved_bindings()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let config = PinyinConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(PinyinConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn flattened_base_fields() {
        let config = PinyinConfig::from_toml_str("worker_threads = 1\nmax_pending_requests = 5").unwrap();
        assert_eq!(config.base().worker_threads, 1);
        assert_eq!(config.base().max_pending_requests, 5);
        assert!(!config.use_double_pinyin);
    }

    #[test]
    fn custom_bindings_override_preset() {
        let config = PinyinConfig::from_toml_str(
            r#"
            double_pinyin_scheme = "microsoft"

            [[key_bindings]]
            key = "u"
            consonant = "sh"
            vowels = ["ang"]
            "#,
        )
        .unwrap();
        let mapper = config.build_mapper().unwrap();
        assert_eq!(mapper.query('u', 'u'), "shang");
        assert_eq!(mapper.query('b', 'h'), "bang");
    }

    #[test]
    fn cleared_scheme_means_custom_only() {
        let config = PinyinConfig::from_toml_str(
            r#"
            [[key_bindings]]
            key = "q"
            consonant = "q"
            vowels = ["i"]
            "#,
        )
        .unwrap();
        // an explicit scheme key is absent, so the default preset applies
        assert_eq!(config.scheme().unwrap(), Some(DoublePinyinScheme::Microsoft));

        let mut bare = config.clone();
        bare.double_pinyin_scheme = None;
        let mapper = bare.build_mapper().unwrap();
        assert_eq!(mapper.len(), 1);
        assert_eq!(mapper.query('q', 'q'), "qi");
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let config = PinyinConfig::from_toml_str(r#"double_pinyin_scheme = "dvorak""#).unwrap();
        assert!(config.build_mapper().is_err());
    }

    #[test]
    fn cloud_provider_resolution() {
        let mut cloud = CloudConfig::default();
        assert_eq!(cloud.provider().unwrap(), CloudProvider::Baidu);

        cloud.provider = "Custom".into();
        assert!(cloud.provider().is_err());

        cloud.custom_url = Some("https://example.com/api".into());
        assert_eq!(
            cloud.provider().unwrap(),
            CloudProvider::Custom("https://example.com/api".into())
        );

        let fetcher = cloud.build().unwrap();
        assert!(!fetcher.is_enabled());
        assert_eq!(fetcher.timeout_ms(), 500);
    }
}
