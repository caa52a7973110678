//! Per-language ranking of the most frequent normalized keys.
//!
//! Built in a single pass over every accepted sentence before any selection
//! happens, then frozen. Only the top N keys per language are kept; a word
//! outside that set is never clozed, on the theory that a learner gets the
//! most value from gaps over common words.

use std::collections::{HashMap, HashSet};

use tracing::info;

/// Accumulates normalized-key counts during the corpus pass.
#[derive(Debug)]
pub struct FrequencyBuilder {
    counts: HashMap<String, HashMap<String, u64>>,
    top_words: usize,
}

impl FrequencyBuilder {
    pub fn new(top_words: usize) -> Self {
        Self {
            counts: HashMap::new(),
            top_words,
        }
    }

    /// Count one normalized key. Empty keys (all-punctuation fragments) and
    /// whitespace keys are excluded from ranking.
    pub fn observe(&mut self, lang: &str, key: &str) {
        if key.is_empty() || key.chars().all(char::is_whitespace) {
            return;
        }
        let bucket = self.counts.entry(lang.to_string()).or_default();
        *bucket.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Freeze into the top-N table. Ranking is by descending count; ties
    /// break on the key so reruns produce the same table.
    pub fn finish(self) -> FrequencyTable {
        let mut common = HashMap::with_capacity(self.counts.len());
        for (lang, counts) in self.counts {
            let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
            ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            ranked.truncate(self.top_words);
            let keys: HashSet<String> = ranked.into_iter().map(|(key, _)| key).collect();
            info!("frequency table: {} common keys for {lang}", keys.len());
            common.insert(lang, keys);
        }
        FrequencyTable { common }
    }
}

/// Frozen per-language "is among the top N most frequent" lookup.
#[derive(Debug, Default)]
pub struct FrequencyTable {
    common: HashMap<String, HashSet<String>>,
}

impl FrequencyTable {
    /// Whether `key` ranks among the language's most frequent keys. Unknown
    /// languages and the empty key are never common.
    pub fn is_common(&self, lang: &str, key: &str) -> bool {
        !key.is_empty()
            && self
                .common
                .get(lang)
                .is_some_and(|keys| keys.contains(key))
    }

    pub fn language_count(&self) -> usize {
        self.common.len()
    }

    #[cfg(test)]
    pub(crate) fn from_keys<'a>(lang: &str, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut common = HashMap::new();
        common.insert(
            lang.to_string(),
            keys.into_iter().map(str::to_string).collect(),
        );
        Self { common }
    }
}
