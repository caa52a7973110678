//! Per-language lookup from an inflected surface form to its single
//! unambiguous dictionary form.
//!
//! The dataset is one JSON object per line: `{"lang": ..., "word": ...,
//! "base_forms": [...]}`. Only entries with exactly one candidate base form
//! are kept; a form with several possible lemmas cannot be revealed safely
//! (showing the wrong one would mislead the learner), so ambiguity exclusion
//! is a load-time invariant rather than a runtime check. The dataset is
//! extracted from en.wiktionary, so some languages are missing and some have
//! very little data.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RawEntry {
    lang: String,
    word: String,
    base_forms: Vec<String>,
}

/// Per-language map from inflected form to its only candidate base form.
#[derive(Debug, Default)]
pub struct LemmaIndex {
    by_lang: HashMap<String, HashMap<String, String>>,
}

impl LemmaIndex {
    /// An index with no entries; `resolve` always misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a JSONL lemma dataset, dropping ambiguous entries and logging
    /// malformed lines.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open lemma dataset {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut by_lang: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut kept = 0usize;
        let mut ambiguous = 0usize;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line
                .with_context(|| format!("read line {} in {}", lineno + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: RawEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("{}:{} skipping malformed lemma entry: {err}", path.display(), lineno + 1);
                    continue;
                }
            };
            if entry.base_forms.len() != 1 {
                ambiguous += 1;
                continue;
            }
            let mut base_forms = entry.base_forms;
            by_lang
                .entry(entry.lang)
                .or_default()
                .insert(entry.word, base_forms.remove(0));
            kept += 1;
        }

        info!(
            "lemma index: {kept} unambiguous forms across {} languages",
            by_lang.len()
        );
        debug!("lemma index: dropped {ambiguous} ambiguous forms");
        Ok(Self { by_lang })
    }

    /// The base form for a normalized surface form, if one unambiguous entry
    /// exists for the language.
    pub fn resolve(&self, lang: &str, key: &str) -> Option<&str> {
        self.by_lang.get(lang)?.get(key).map(String::as_str)
    }

    pub fn language_count(&self) -> usize {
        self.by_lang.len()
    }

    pub fn form_count(&self) -> usize {
        self.by_lang.values().map(HashMap::len).sum()
    }
}
