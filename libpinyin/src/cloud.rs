//! Cloud fetcher for pinyin corrections.
//!
//! `CloudInput` is the default [`Fetcher`] handed to the request queue: it
//! sends the pinyin payload to the configured provider and returns the raw
//! response body. Parsing into candidates is a separate step
//! ([`parse_candidates`]) so callers that only relay the body never pay for
//! it.
//!
//! Cloud input is disabled by default. A disabled client, a transport error
//! or a timeout all yield an empty response.
//!
//! Uses `reqwest` blocking client - fetches already run on queue workers, so
//! no async runtime is needed.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use cloudpinyin_core::Fetcher;
use lru::LruCache;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const BAIDU_ENDPOINT: &str = "https://olime.baidu.com/py";

/// Cloud input provider options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CloudProvider {
    /// Baidu Input API
    #[default]
    Baidu,
    /// Custom endpoint URL for user-deployed prediction server
    Custom(String),
}

/// A cloud candidate result with confidence score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudCandidate {
    /// The candidate text (Chinese characters)
    pub text: String,
    /// Confidence score (0.0-1.0, where 1.0 is highest confidence)
    pub confidence: f32,
}

/// Decode a provider response body into candidates.
///
/// Baidu returns an array of arrays, `[["你好","ni'hao"], ...]`, whose first
/// elements are the candidates. Custom endpoints return
/// `[{"text": "你好", "confidence": 0.95}, ...]`. An empty body has no
/// candidates.
pub fn parse_candidates(provider: &CloudProvider, body: &str) -> anyhow::Result<Vec<CloudCandidate>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match provider {
        CloudProvider::Baidu => {
            let rows: Vec<Vec<String>> =
                serde_json::from_str(body).context("malformed Baidu response")?;
            Ok(rows
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .map(|text| CloudCandidate {
                    text,
                    confidence: 0.8, // Baidu doesn't provide confidence scores
                })
                .collect())
        }
        CloudProvider::Custom(url) => serde_json::from_str(body)
            .with_context(|| format!("malformed response from {}", url)),
    }
}

/// Cloud client usable as a request queue fetcher.
pub struct CloudInput {
    provider: CloudProvider,
    enabled: bool,
    timeout_ms: u64,
    client: OnceCell<reqwest::blocking::Client>,
    cache: Option<Mutex<LruCache<String, String>>>,
}

impl CloudInput {
    /// Create a new (disabled) cloud input client with the specified provider.
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            enabled: false,
            timeout_ms: 500,
            client: OnceCell::new(),
            cache: None,
        }
    }

    pub fn provider(&self) -> &CloudProvider {
        &self.provider
    }

    /// Enable or disable cloud input.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check if cloud input is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the request timeout in milliseconds.
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
        self.client = OnceCell::new();
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Keep up to `capacity` responses keyed by payload; 0 disables caching.
    pub fn set_cache_size(&mut self, capacity: usize) {
        self.cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
    }

    pub fn cached_responses(&self) -> usize {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    /// Fetch and parse candidates for `pinyin` (blocking).
    ///
    /// Returns an empty vector when disabled, on failure, or when the body
    /// cannot be parsed.
    pub fn query(&self, pinyin: &str) -> Vec<CloudCandidate> {
        let body = self.fetch(pinyin);
        match parse_candidates(&self.provider, &body) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(error = %e, "discarding cloud response");
                vec![]
            }
        }
    }

    fn client(&self) -> anyhow::Result<&reqwest::blocking::Client> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(Duration::from_millis(self.timeout_ms))
                .build()
                .context("build HTTP client")
        })
    }

    fn request_body(&self, pinyin: &str) -> anyhow::Result<String> {
        let client = self.client()?;
        let response = match &self.provider {
            CloudProvider::Baidu => {
                let url = format!(
                    "{}?input={}&inputtype=py&bg=0&ed=20&result=hanzi&resultcoding=utf-8&ch_en=0&clientinfo=web&version=1",
                    BAIDU_ENDPOINT,
                    urlencoding::encode(pinyin)
                );
                client.get(&url).send()?
            }
            CloudProvider::Custom(url) => client
                .post(url)
                .json(&serde_json::json!({ "query": pinyin }))
                .send()?,
        };
        Ok(response.error_for_status()?.text()?)
    }

    fn cached(&self, payload: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(payload)
            .cloned()
    }

    fn remember(&self, payload: &str, body: &str) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(payload.to_string(), body.to_string());
        }
    }
}

impl Fetcher for CloudInput {
    fn fetch(&self, payload: &str) -> String {
        if !self.enabled || payload.is_empty() {
            return String::new();
        }
        if let Some(body) = self.cached(payload) {
            debug!(payload, "cloud response served from cache");
            return body;
        }
        match self.request_body(payload) {
            Ok(body) => {
                self.remember(payload, &body);
                body
            }
            Err(e) => {
                warn!(payload, error = %e, "cloud fetch failed");
                String::new()
            }
        }
    }
}

impl Default for CloudInput {
    fn default() -> Self {
        Self::new(CloudProvider::default())
    }
}

impl std::fmt::Debug for CloudInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudInput")
            .field("provider", &self.provider)
            .field("enabled", &self.enabled)
            .field("timeout_ms", &self.timeout_ms)
            .field("cached", &self.cached_responses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // nothing listens on the discard port
    const DEAD_ENDPOINT: &str = "http://127.0.0.1:9/";

    #[test]
    fn test_new_cloud_input() {
        let cloud = CloudInput::new(CloudProvider::Baidu);
        assert!(!cloud.is_enabled());
        assert_eq!(cloud.timeout_ms(), 500);
        assert_eq!(cloud.cached_responses(), 0);
    }

    #[test]
    fn test_enable_disable() {
        let mut cloud = CloudInput::new(CloudProvider::Baidu);
        cloud.set_enabled(true);
        assert!(cloud.is_enabled());
        cloud.set_enabled(false);
        assert!(!cloud.is_enabled());
    }

    #[test]
    fn test_fetch_when_disabled() {
        let cloud = CloudInput::new(CloudProvider::Baidu);
        assert_eq!(cloud.fetch("nihao"), "");
        assert!(cloud.query("nihao").is_empty());
    }

    #[test]
    fn test_fetch_empty_input() {
        let mut cloud = CloudInput::new(CloudProvider::Baidu);
        cloud.set_enabled(true);
        assert_eq!(cloud.fetch(""), "");
    }

    #[test]
    fn test_transport_error_yields_empty_body() {
        let mut cloud = CloudInput::new(CloudProvider::Custom(DEAD_ENDPOINT.into()));
        cloud.set_enabled(true);
        cloud.set_timeout(200);
        cloud.set_cache_size(4);
        assert_eq!(cloud.fetch("nihao"), "");
        // failures are not cached
        assert_eq!(cloud.cached_responses(), 0);
    }

    #[test]
    fn test_cache_short_circuits_request() {
        let mut cloud = CloudInput::new(CloudProvider::Custom(DEAD_ENDPOINT.into()));
        cloud.set_enabled(true);
        cloud.set_cache_size(2);
        cloud.remember("nihao", r#"[{"text":"你好","confidence":0.9}]"#);
        let candidates = cloud.query("nihao");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "你好");
    }

    #[test]
    fn test_cache_evicts_least_recent() {
        let mut cloud = CloudInput::default();
        cloud.set_cache_size(2);
        cloud.remember("a", "1");
        cloud.remember("b", "2");
        assert_eq!(cloud.cached("a").as_deref(), Some("1"));
        cloud.remember("c", "3");
        assert_eq!(cloud.cached_responses(), 2);
        assert!(cloud.cached("b").is_none());
    }

    #[test]
    fn test_parse_baidu_body() {
        let body = r#"[["你好","ni'hao"],["拟好","ni'hao"]]"#;
        let candidates = parse_candidates(&CloudProvider::Baidu, body).unwrap();
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["你好", "拟好"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_candidates(&CloudProvider::Baidu, "<html>").is_err());
        let custom = CloudProvider::Custom("https://example.com/api".into());
        assert!(parse_candidates(&custom, r#"{"text":1}"#).is_err());
        assert!(parse_candidates(&custom, "").unwrap().is_empty());
    }

    // Note: Real network tests would require network access
    #[test]
    #[ignore]
    fn test_query_baidu_real_network() {
        let mut cloud = CloudInput::new(CloudProvider::Baidu);
        cloud.set_enabled(true);

        let results = cloud.query("nihao");
        if !results.is_empty() {
            println!("Baidu results for 'nihao': {:?}", results);
            assert!(results.iter().any(|c| c.text.contains("你好")));
        }
    }
}
