//! Double Pinyin (Shuangpin 双拼) input method support
//!
//! Double pinyin represents every syllable with exactly two keys: the first
//! key supplies the initial consonant (shengmu 声母), the second the final
//! (yunmu 韵母). Which key stands for what is a matter of configuration, so
//! the scheme is described as a list of [`KeyBinding`]s:
//!
//! ```text
//! key 'u' -> consonant "sh", vowels ["u"]
//! key 'h' -> consonant "h",  vowels ["ang"]
//! ```
//!
//! [`SchemeMapper`] turns those bindings into a `(first, second) -> syllable`
//! table. For every ordered key pair it tries consonant(first) + vowel for
//! each vowel of the second key and keeps the combinations that are real
//! syllables, so `uh` decodes to `shang` and `ui` to `shi`.
//!
//! ## Presets
//!
//! 1. **Microsoft Shuangpin** (微软双拼)
//! 2. **ZiRanMa** (自然码)
//! 3. **XiaoHe** (小鹤)
//!
//! Zero-initial syllables are typed with `a`, `e` or `o` as the first key
//! (`aa` = a, `oj` = an in Microsoft). Keys whose consonant is
//! [`TERMINAL_CONSONANT`] only ever appear in second position.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dictionary::SyllableDictionary;

/// Consonant marking a key that never starts a syllable.
///
/// A lone trailing key bound to this consonant needs no further input, so
/// [`SchemeMapper::is_valid_double_pinyin`] accepts it.
pub const TERMINAL_CONSONANT: &str = "-";

/// One key of a double pinyin scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: char,
    /// Initial produced when this key comes first (may be empty)
    #[serde(default)]
    pub consonant: String,
    /// Finals produced when this key comes second, in priority order
    #[serde(default)]
    pub vowels: Vec<String>,
}

impl KeyBinding {
    pub fn new<C, V, S>(key: char, consonant: C, vowels: V) -> Self
    where
        C: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key,
            consonant: consonant.into(),
            vowels: vowels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Built-in double pinyin schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoublePinyinScheme {
    /// Microsoft Shuangpin (微软双拼) - Most popular scheme
    Microsoft,
    /// ZiRanMa (自然码) - Natural input method
    ZiRanMa,
    /// XiaoHe (小鹤) - Little crane scheme
    XiaoHe,
}

type PresetKey = (char, &'static str, &'static [&'static str]);

const MICROSOFT: &[PresetKey] = &[
    ('a', "", &["a"]),
    ('b', "b", &["ou"]),
    ('c', "c", &["iao"]),
    ('d', "d", &["uang", "iang"]),
    ('e', "", &["e"]),
    ('f', "f", &["en"]),
    ('g', "g", &["eng", "ng"]),
    ('h', "h", &["ang"]),
    ('i', "ch", &["i"]),
    ('j', "j", &["an"]),
    ('k', "k", &["ao"]),
    ('l', "l", &["ai"]),
    ('m', "m", &["ian"]),
    ('n', "n", &["in"]),
    ('o', "", &["uo", "o"]),
    ('p', "p", &["un"]),
    ('q', "q", &["iu"]),
    ('r', "r", &["uan", "er"]),
    ('s', "s", &["ong", "iong"]),
    ('t', "t", &["ue"]),
    ('u', "sh", &["u"]),
    ('v', "zh", &["ui", "v"]),
    ('w', "w", &["ia", "ua"]),
    ('x', "x", &["ie"]),
    ('y', "y", &["uai", "v"]),
    ('z', "z", &["ei"]),
    (';', TERMINAL_CONSONANT, &["ing"]),
];

const ZIRANMA: &[PresetKey] = &[
    ('a', "", &["a"]),
    ('b', "b", &["ou"]),
    ('c', "c", &["iao"]),
    ('d', "d", &["uang", "iang"]),
    ('e', "", &["e"]),
    ('f', "f", &["en"]),
    ('g', "g", &["eng"]),
    ('h', "h", &["ang"]),
    ('i', "ch", &["i"]),
    ('j', "j", &["an"]),
    ('k', "k", &["ao"]),
    ('l', "l", &["ai"]),
    ('m', "m", &["ian"]),
    ('n', "n", &["in"]),
    ('o', "", &["uo", "o"]),
    ('p', "p", &["un"]),
    ('q', "q", &["iu"]),
    ('r', "r", &["uan", "er"]),
    ('s', "s", &["ong", "iong"]),
    ('t', "t", &["ue"]),
    ('u', "sh", &["u"]),
    ('v', "zh", &["ui", "v"]),
    ('w', "w", &["ia", "ua"]),
    ('x', "x", &["ie"]),
    ('y', "y", &["uai", "ing"]),
    ('z', "z", &["ei"]),
];

const XIAOHE: &[PresetKey] = &[
    ('a', "", &["a"]),
    ('b', "b", &["in"]),
    ('c', "c", &["ao"]),
    ('d', "d", &["ai"]),
    ('e', "", &["e"]),
    ('f', "f", &["en"]),
    ('g', "g", &["eng"]),
    ('h', "h", &["ang"]),
    ('i', "ch", &["i"]),
    ('j', "j", &["an"]),
    ('k', "k", &["uai", "ing"]),
    ('l', "l", &["iang", "uang"]),
    ('m', "m", &["ian"]),
    ('n', "n", &["iao"]),
    ('o', "", &["uo", "o"]),
    ('p', "p", &["ie"]),
    ('q', "q", &["iu"]),
    ('r', "r", &["uan", "er"]),
    ('s', "s", &["ong", "iong"]),
    ('t', "t", &["ue"]),
    ('u', "sh", &["u"]),
    ('v', "zh", &["v", "ui"]),
    ('w', "w", &["ei"]),
    ('x', "x", &["ia", "ua"]),
    ('y', "y", &["un"]),
    ('z', "z", &["ou"]),
];

impl DoublePinyinScheme {
    pub const ALL: [DoublePinyinScheme; 3] = [
        DoublePinyinScheme::Microsoft,
        DoublePinyinScheme::ZiRanMa,
        DoublePinyinScheme::XiaoHe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DoublePinyinScheme::Microsoft => "Microsoft",
            DoublePinyinScheme::ZiRanMa => "ZiRanMa",
            DoublePinyinScheme::XiaoHe => "XiaoHe",
        }
    }

    /// Key bindings for this scheme, in key order.
    pub fn bindings(&self) -> Vec<KeyBinding> {
        let table = match self {
            DoublePinyinScheme::Microsoft => MICROSOFT,
            DoublePinyinScheme::ZiRanMa => ZIRANMA,
            DoublePinyinScheme::XiaoHe => XIAOHE,
        };
        table
            .iter()
            .map(|&(key, consonant, vowels)| KeyBinding::new(key, consonant, vowels.iter().copied()))
            .collect()
    }
}

impl fmt::Display for DoublePinyinScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DoublePinyinScheme {
    type Err = anyhow::Error;

    /// Case-insensitive scheme lookup ("microsoft", "ZiRanMa", "xiaohe").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown double pinyin scheme: {}", s))
    }
}

/// A key pair that produced two different syllables; the first one was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub keys: [char; 2],
    pub kept: String,
    pub rejected: String,
}

/// Built lookup table.
#[derive(Debug, Default)]
struct SyllableMap {
    slots: AHashMap<(char, char), String>,
    conflicts: Vec<Conflict>,
}

impl SyllableMap {
    fn get(&self, first: char, second: char) -> &str {
        self.slots
            .get(&(first, second))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug)]
enum MapCache {
    Stale,
    Fresh(Arc<SyllableMap>),
}

/// One unit of decoded keystroke text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedToken {
    /// Two bound keys. `syllable` is empty when the pair maps to nothing.
    Syllable { keys: [char; 2], syllable: String },
    /// A bound key with no partner before a separator or the end of input.
    Partial { key: char, consonant: String },
    /// A character that is not a bound key, copied through.
    Literal(char),
}

impl DecodedToken {
    /// Text this token contributes to the decoded string.
    ///
    /// A partial key with an empty consonant renders as `'`.
    pub fn text(&self) -> String {
        match self {
            DecodedToken::Syllable { syllable, .. } => syllable.clone(),
            DecodedToken::Partial { consonant, .. } if consonant.is_empty() => "'".to_string(),
            DecodedToken::Partial { consonant, .. } => consonant.clone(),
            DecodedToken::Literal(c) => c.to_string(),
        }
    }
}

/// Configurable double pinyin decoder.
///
/// Bindings are mutated through `&mut self`; lookups take `&self` and build
/// the pair table on first use after any change.
pub struct SchemeMapper {
    bindings: BTreeMap<char, KeyBinding>,
    dictionary: &'static SyllableDictionary,
    cache: RwLock<MapCache>,
}

impl SchemeMapper {
    /// An empty mapper validating against the standard dictionary.
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
            dictionary: SyllableDictionary::standard(),
            cache: RwLock::new(MapCache::Stale),
        }
    }

    pub fn from_bindings<I: IntoIterator<Item = KeyBinding>>(bindings: I) -> Self {
        let mut mapper = Self::new();
        for binding in bindings {
            mapper.bind(binding);
        }
        mapper
    }

    pub fn from_scheme(scheme: DoublePinyinScheme) -> Self {
        Self::from_bindings(scheme.bindings())
    }

    /// Register or replace the binding for `key`.
    pub fn bind_key<C, V, S>(&mut self, key: char, consonant: C, vowels: V)
    where
        C: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind(KeyBinding::new(key, consonant, vowels));
    }

    pub fn bind(&mut self, binding: KeyBinding) {
        self.bindings.insert(binding.key, binding);
        self.invalidate();
    }

    /// Remove every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        *self.cache.get_mut().unwrap_or_else(PoisonError::into_inner) = MapCache::Stale;
    }

    pub fn binding(&self, key: char) -> Option<&KeyBinding> {
        self.bindings.get(&key)
    }

    pub fn is_bound(&self, key: char) -> bool {
        self.bindings.contains_key(&key)
    }

    /// Bindings in ascending key order.
    pub fn bindings(&self) -> impl Iterator<Item = &KeyBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_valid_pinyin(&self, syllable: &str) -> bool {
        self.dictionary.contains(syllable)
    }

    /// Rebuild the pair table now and return the number of conflicts.
    ///
    /// Keys are visited in ascending order for both positions and vowels in
    /// binding order; the first syllable assigned to a pair wins. Producing
    /// the same syllable again is not a conflict.
    pub fn build_map(&self) -> usize {
        let map = Arc::new(self.compute_map());
        let conflicts = map.conflicts.len();
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = MapCache::Fresh(map);
        conflicts
    }

    fn compute_map(&self) -> SyllableMap {
        let mut map = SyllableMap::default();
        for first in self.bindings.values() {
            for second in self.bindings.values() {
                for vowel in &second.vowels {
                    let candidate = format!("{}{}", first.consonant, vowel);
                    if !self.dictionary.contains(&candidate) {
                        continue;
                    }
                    match map.slots.get(&(first.key, second.key)) {
                        None => {
                            map.slots.insert((first.key, second.key), candidate);
                        }
                        Some(kept) if *kept == candidate => {}
                        Some(kept) => {
                            debug!(
                                first = %first.key,
                                second = %second.key,
                                kept = %kept,
                                rejected = %candidate,
                                "double pinyin conflict"
                            );
                            map.conflicts.push(Conflict {
                                keys: [first.key, second.key],
                                kept: kept.clone(),
                                rejected: candidate,
                            });
                        }
                    }
                }
            }
        }
        if !map.conflicts.is_empty() {
            warn!(
                conflicts = map.conflicts.len(),
                "double pinyin scheme has conflicting key pairs"
            );
        }
        debug!(
            keys = self.bindings.len(),
            pairs = map.slots.len(),
            "double pinyin map built"
        );
        map
    }

    /// Current table, rebuilding it if bindings changed since the last build.
    fn map(&self) -> Arc<SyllableMap> {
        if let MapCache::Fresh(map) = &*self.cache.read().unwrap_or_else(PoisonError::into_inner) {
            return Arc::clone(map);
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match &*cache {
            MapCache::Fresh(map) => Arc::clone(map),
            MapCache::Stale => {
                let map = Arc::new(self.compute_map());
                *cache = MapCache::Fresh(Arc::clone(&map));
                map
            }
        }
    }

    /// Conflicts found by the most recent build.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.map().conflicts.clone()
    }

    /// Number of key pairs that decode to a syllable.
    pub fn mapped_pairs(&self) -> usize {
        self.map().slots.len()
    }

    /// Syllable for a key pair, or an empty string.
    pub fn query(&self, first: char, second: char) -> String {
        self.map().get(first, second).to_string()
    }

    /// Split keystroke text into syllables, partial keys and literals.
    ///
    /// Bound keys pair up two at a time. Any other character is copied as a
    /// literal and ends the current pair, so a bound key waiting for a
    /// partner becomes a `Partial`. The same happens at the end of input.
    pub fn decode(&self, text: &str) -> Vec<DecodedToken> {
        let map = self.map();
        let mut tokens = Vec::new();
        let mut pending: Option<char> = None;
        for ch in text.chars() {
            if self.bindings.contains_key(&ch) {
                match pending.take() {
                    Some(first) => tokens.push(DecodedToken::Syllable {
                        keys: [first, ch],
                        syllable: map.get(first, ch).to_string(),
                    }),
                    None => pending = Some(ch),
                }
            } else {
                if let Some(first) = pending.take() {
                    tokens.push(self.partial(first));
                }
                tokens.push(DecodedToken::Literal(ch));
            }
        }
        if let Some(first) = pending {
            tokens.push(self.partial(first));
        }
        tokens
    }

    fn partial(&self, key: char) -> DecodedToken {
        let consonant = self
            .bindings
            .get(&key)
            .map(|b| b.consonant.clone())
            .unwrap_or_default();
        DecodedToken::Partial { key, consonant }
    }

    /// Decode keystroke text to full pinyin.
    ///
    /// Every pair and partial key is preceded by one space once the output
    /// is non-empty, including after literals. A pair that maps to nothing
    /// still contributes its separator, so `"uh;auh"` decodes to
    /// `"shang  shang"`.
    pub fn query_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 3);
        for token in self.decode(text) {
            match token {
                DecodedToken::Literal(c) => out.push(c),
                word => {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&word.text());
                }
            }
        }
        out
    }

    /// Whether `text` is complete, well-formed double pinyin.
    ///
    /// Every key pair must map to a syllable, and a lone key left before a
    /// separator or at the end must be bound to [`TERMINAL_CONSONANT`].
    pub fn is_valid_double_pinyin(&self, text: &str) -> bool {
        self.decode(text).iter().all(|token| match token {
            DecodedToken::Syllable { syllable, .. } => !syllable.is_empty(),
            DecodedToken::Partial { consonant, .. } => consonant == TERMINAL_CONSONANT,
            DecodedToken::Literal(_) => true,
        })
    }
}

impl Default for SchemeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SchemeMapper {
    fn clone(&self) -> Self {
        Self {
            bindings: self.bindings.clone(),
            dictionary: self.dictionary,
            cache: RwLock::new(MapCache::Stale),
        }
    }
}

impl fmt::Debug for SchemeMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let built = matches!(
            &*self.cache.read().unwrap_or_else(PoisonError::into_inner),
            MapCache::Fresh(_)
        );
        f.debug_struct("SchemeMapper")
            .field("keys", &self.bindings.len())
            .field("built", &built)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa_mapper() -> SchemeMapper {
        let mut mapper = SchemeMapper::new();
        mapper.bind_key('q', "q", ["i", "ia", "iao"]);
        mapper.bind_key('a', "", ["a"]);
        mapper
    }

    #[test]
    fn microsoft_scheme_basic() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);

        // u=sh, h=ang
        assert_eq!(mapper.query('u', 'h'), "shang");
        // u=sh, i=i
        assert_eq!(mapper.query('u', 'i'), "shi");
        // b=b, h=ang
        assert_eq!(mapper.query('b', 'h'), "bang");
    }

    #[test]
    fn microsoft_scheme_zero_initial() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);
        assert_eq!(mapper.query('a', 'a'), "a");
        assert_eq!(mapper.query('e', 'e'), "e");
        assert_eq!(mapper.query('o', 'o'), "o");
        assert_eq!(mapper.query('o', 'l'), "ai");
        assert_eq!(mapper.query('o', 'r'), "er");
    }

    #[test]
    fn microsoft_semicolon_is_second_key_only() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);
        assert_eq!(mapper.query('x', ';'), "xing");
        assert_eq!(mapper.query(';', 'a'), "");
    }

    #[test]
    fn ziranma_scheme_basic() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::ZiRanMa);
        assert_eq!(mapper.query('y', 'y'), "ying");
        assert_eq!(mapper.query('k', 'y'), "kuai");
    }

    #[test]
    fn xiaohe_scheme_basic() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::XiaoHe);
        assert_eq!(mapper.query('x', 'l'), "xiang");
        assert_eq!(mapper.query('g', 'l'), "guang");
        assert_eq!(mapper.query('v', 'l'), "zhuang");
    }

    #[test]
    fn presets_have_no_conflicts() {
        for scheme in DoublePinyinScheme::ALL {
            let mapper = SchemeMapper::from_scheme(scheme);
            assert_eq!(mapper.build_map(), 0, "{} has conflicts", scheme);
        }
    }

    #[test]
    fn scheme_names_parse_case_insensitively() {
        assert_eq!(
            "microsoft".parse::<DoublePinyinScheme>().unwrap(),
            DoublePinyinScheme::Microsoft
        );
        assert_eq!(
            "XIAOHE".parse::<DoublePinyinScheme>().unwrap(),
            DoublePinyinScheme::XiaoHe
        );
        assert!("abc".parse::<DoublePinyinScheme>().is_err());
    }

    #[test]
    fn unmapped_pair_is_empty() {
        let mapper = qa_mapper();
        // "qa" is not a syllable
        assert_eq!(mapper.query('q', 'a'), "");
        assert_eq!(mapper.query('q', 'q'), "qi");
        assert_eq!(mapper.query('x', 'y'), "");
    }

    #[test]
    fn rebinding_invalidates_map() {
        let mut mapper = qa_mapper();
        assert_eq!(mapper.query('q', 'a'), "");
        mapper.bind_key('a', "", ["i"]);
        assert_eq!(mapper.query('q', 'a'), "qi");
        mapper.clear();
        assert_eq!(mapper.query('q', 'a'), "");
        assert!(mapper.is_empty());
    }

    #[test]
    fn separator_splits_pairing_groups() {
        let mapper = qa_mapper();
        assert_eq!(mapper.query_text("q,a"), "q, '");
        assert_eq!(
            mapper.decode("q,a"),
            vec![
                DecodedToken::Partial {
                    key: 'q',
                    consonant: "q".into()
                },
                DecodedToken::Literal(','),
                DecodedToken::Partial {
                    key: 'a',
                    consonant: String::new()
                },
            ]
        );
    }

    #[test]
    fn trailing_key_emits_consonant() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);
        assert_eq!(mapper.query_text("uihfu"), "shi hen sh");
        assert_eq!(mapper.query_text("uihko"), "shi hao '");
        assert_eq!(mapper.query_text("ui,u"), "shi, sh");
    }

    #[test]
    fn unmapped_pair_keeps_its_separator() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);
        assert_eq!(mapper.query_text("uh;auh"), "shang  shang");
        assert_eq!(mapper.query_text("ui,hf"), "shi, hen");
        assert_eq!(mapper.query_text("uh;a"), "shang ");
        // an empty output is never separated from what follows
        assert_eq!(mapper.query_text(";auh"), "shang");
    }

    #[test]
    fn conflicting_bindings_keep_first() {
        let mut mapper = SchemeMapper::new();
        mapper.bind_key('b', "b", ["ang"]);
        // second vowel also forms a valid syllable with 'b'
        mapper.bind_key('h', "h", ["ang", "eng"]);
        assert_eq!(mapper.build_map(), 2); // (b,h) and (h,h)
        assert_eq!(mapper.query('b', 'h'), "bang");
        let conflicts = mapper.conflicts();
        assert_eq!(conflicts[0].keys, ['b', 'h']);
        assert_eq!(conflicts[0].rejected, "beng");
    }

    #[test]
    fn duplicate_syllable_is_not_a_conflict() {
        let mut mapper = SchemeMapper::new();
        mapper.bind_key('l', "l", ["v"]);
        mapper.bind_key('y', "y", ["v", "v"]);
        assert_eq!(mapper.build_map(), 0);
        assert_eq!(mapper.query('l', 'y'), "lv");
    }

    #[test]
    fn clone_rebuilds_lazily() {
        let mapper = SchemeMapper::from_scheme(DoublePinyinScheme::Microsoft);
        assert_eq!(mapper.query('u', 'h'), "shang");
        let copy = mapper.clone();
        assert_eq!(copy.query('u', 'h'), "shang");
        assert_eq!(copy.len(), mapper.len());
    }
}
