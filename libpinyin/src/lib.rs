//! cloudpinyin crate root
//!
//! Double pinyin decoding with configurable key schemes, plus asynchronous
//! cloud lookups routed through the `cloudpinyin-core` request queue.
//!
//! Public API exported here:
//! - `SchemeMapper`, `KeyBinding`, `DoublePinyinScheme` from `double_pinyin`
//! - `SyllableDictionary` from `dictionary`
//! - `CloudInput` and candidate parsing from `cloud`
//! - `PinyinConfig` / `CloudConfig` from `config`
//! - `PinyinContext` from `context`
//! - `HostBindings` from `bindings`

pub mod bindings;
pub mod cloud;
pub mod config;
pub mod context;
pub mod dictionary;
pub mod double_pinyin;

// Re-export the request machinery from core.
pub use cloudpinyin_core::{
    CloudRequest, Config, Fetcher, QueueError, RequestId, RequestQueue, RequestState, Settings,
    Value, ValueKind,
};

// Convenience re-exports for common types used by callers.
pub use bindings::HostBindings;
pub use cloud::{parse_candidates, CloudCandidate, CloudInput, CloudProvider};
pub use config::{CloudConfig, PinyinConfig};
pub use context::PinyinContext;
pub use dictionary::SyllableDictionary;
pub use double_pinyin::{
    Conflict, DecodedToken, DoublePinyinScheme, KeyBinding, SchemeMapper, TERMINAL_CONSONANT,
};
