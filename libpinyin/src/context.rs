//! Engine context: one double pinyin mapper, one request queue and one cloud
//! fetcher, built together from a [`PinyinConfig`].
//!
//! Everything a frontend needs is reached through a `PinyinContext` value;
//! several independent contexts can live in one process.

use std::sync::Arc;

use cloudpinyin_core::{CloudRequest, Fetcher, QueueError, RequestId, RequestQueue};
use tracing::debug;

use crate::cloud::CloudInput;
use crate::config::PinyinConfig;
use crate::double_pinyin::SchemeMapper;

pub struct PinyinContext {
    config: PinyinConfig,
    mapper: SchemeMapper,
    queue: Arc<RequestQueue>,
    fetcher: Arc<dyn Fetcher>,
}

impl PinyinContext {
    /// Build a context using the `[cloud]` table as fetcher.
    pub fn new(config: PinyinConfig) -> anyhow::Result<Self> {
        let cloud = config.cloud.build()?;
        Self::with_fetcher(config, Arc::new(cloud))
    }

    /// Build a context around a caller-supplied fetcher.
    pub fn with_fetcher(config: PinyinConfig, fetcher: Arc<dyn Fetcher>) -> anyhow::Result<Self> {
        let mapper = config.build_mapper()?;
        let conflicts = mapper.build_map();
        let queue = Arc::new(RequestQueue::new(config.base())?);
        debug!(
            keys = mapper.len(),
            conflicts,
            double_pinyin = config.use_double_pinyin,
            "pinyin context ready"
        );
        Ok(Self {
            config,
            mapper,
            queue,
            fetcher,
        })
    }

    /// Build a context with a given cloud client.
    pub fn with_cloud(config: PinyinConfig, cloud: CloudInput) -> anyhow::Result<Self> {
        Self::with_fetcher(config, Arc::new(cloud))
    }

    pub fn config(&self) -> &PinyinConfig {
        &self.config
    }

    pub fn mapper(&self) -> &SchemeMapper {
        &self.mapper
    }

    /// Mutable access for runtime rebinding; the map is rebuilt on next use.
    pub fn mapper_mut(&mut self) -> &mut SchemeMapper {
        &mut self.mapper
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    /// Text shown while composing: decoded double pinyin, or the keys as typed.
    pub fn preedit(&self, keys: &str) -> String {
        if self.config.use_double_pinyin {
            self.mapper.query_text(keys)
        } else {
            keys.to_string()
        }
    }

    /// Whether `keys` may be committed.
    ///
    /// Only strict double pinyin mode rejects anything.
    pub fn accepts(&self, keys: &str) -> bool {
        if self.config.use_double_pinyin && self.config.strict_double_pinyin {
            self.mapper.is_valid_double_pinyin(keys)
        } else {
            true
        }
    }

    /// Queue a cloud lookup for `pinyin`; `callback` runs once on a worker
    /// thread when the response is in.
    pub fn request_correction<C>(&self, pinyin: &str, callback: C) -> Result<RequestId, QueueError>
    where
        C: FnOnce(&CloudRequest) + Send + 'static,
    {
        self.queue
            .enqueue(pinyin, Arc::clone(&self.fetcher), callback)
    }
}

impl std::fmt::Debug for PinyinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinyinContext")
            .field("mapper", &self.mapper)
            .field("queue", &self.queue)
            .finish()
    }
}
