//! cloudpinyin-core
//!
//! Language-agnostic pieces shared by the cloudpinyin crates: the cloud
//! request queue and its worker pool, the typed value boundary used by
//! configuration callers, and the generic configuration.
//!
//! Public API:
//! - `RequestQueue` / `CloudRequest` - concurrent cloud lookups with exactly-once delivery
//! - `Fetcher` - the fetch function contract
//! - `Value` / `ValueKind` - typed arguments and results
//! - `Settings` - flat typed settings loaded from TOML
//! - `Config` - worker pool sizing
use serde::{Deserialize, Serialize};

pub mod request_queue;
pub use request_queue::{
    CloudRequest, Fetcher, QueueError, RequestId, RequestQueue, RequestState, RequestsReadGuard,
};

mod worker;

pub mod value;
pub use value::{Value, ValueKind};

pub mod settings;
pub use settings::Settings;

/// Generic configuration for the request machinery.
///
/// Language-specific options live in `PinyinConfig`, which flattens this
/// struct into its own TOML table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of threads running cloud fetches concurrently
    pub worker_threads: usize,
    /// Requests that may wait for a free worker before `enqueue` blocks
    pub max_pending_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            max_pending_requests: 64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
