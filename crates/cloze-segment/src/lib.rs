//! Per-language sentence segmentation and key normalization.
//!
//! Segmentation is polymorphic over a small set of strategies: UAX #29 word
//! boundaries for languages with usable boundary cues, greedy longest-match
//! dictionary segmentation for unspaced scripts, and plain whitespace
//! splitting as an explicit override. Every strategy upholds the same
//! contract: concatenating the returned fragments reproduces the input text
//! exactly ([`verify_reconstruction`] checks it).
//!
//! Strategy instances can be expensive to build (a dictionary model reads a
//! lexicon file), so [`SegmenterRegistry`] caches one per language for the
//! duration of a run. The registry is an explicit value owned by the pipeline
//! and shared by reference across workers; it is read-only after first use
//! per language.
//!
//! ```rust
//! use cloze_segment::SegmenterRegistry;
//!
//! let registry = SegmenterRegistry::new(None);
//! let segmenter = registry.for_language("eng").unwrap();
//! let fragments = segmenter.segment("The cat sat.");
//! assert_eq!(fragments.concat(), "The cat sat.");
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

/// Languages written without reliable word separators; these go through the
/// dictionary segmenter instead of UAX #29 boundaries.
const UNSPACED_LANGS: &[&str] = &[
    "cmn", "yue", "wuu", "lzh", "jpn", "tha", "khm", "lao", "mya",
];

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("failed to read lexicon {path}: {source}")]
    Lexicon {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("segmented fragments do not reconstruct the input text")]
    Reconstruction,
}

/// A segmentation strategy for one language.
#[derive(Debug)]
pub enum Segmenter {
    /// Unicode word boundaries (UAX #29); fragments include whitespace runs
    /// and punctuation.
    UnicodeWords,
    /// Greedy longest-match against a lexicon, for unspaced scripts.
    Dictionary(DictionaryModel),
    /// Split on whitespace, keeping the separators as fragments.
    Whitespace,
}

impl Segmenter {
    /// Split `text` into ordered, contiguous, non-overlapping fragments.
    pub fn segment<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self {
            Segmenter::UnicodeWords => text.split_word_bounds().collect(),
            Segmenter::Dictionary(model) => model.segment(text),
            Segmenter::Whitespace => split_keeping_whitespace(text),
        }
    }
}

/// Lexicon-backed longest-match model. Runs of text not covered by the
/// lexicon fall back to single grapheme clusters, so segmentation always
/// covers the input.
#[derive(Debug, Default)]
pub struct DictionaryModel {
    words: HashSet<String>,
    max_chars: usize,
}

impl DictionaryModel {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a lexicon file with one entry per line; blank lines are ignored.
    pub fn load(path: &Path) -> Result<Self, SegmentError> {
        let file = File::open(path).map_err(|source| SegmentError::Lexicon {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut words = HashSet::new();
        let mut max_chars = 0usize;
        for line in reader.lines() {
            let line = line.map_err(|source| SegmentError::Lexicon {
                path: path.to_path_buf(),
                source,
            })?;
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            max_chars = max_chars.max(entry.chars().count());
            words.insert(entry.to_string());
        }
        Ok(Self { words, max_chars })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn segment<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut fragments = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            if rest.starts_with(char::is_whitespace) {
                let end = rest
                    .find(|c: char| !c.is_whitespace())
                    .unwrap_or(rest.len());
                fragments.push(&rest[..end]);
                rest = &rest[end..];
                continue;
            }

            // Candidate end offsets after 1..=max_chars characters, longest
            // first.
            let ends: Vec<usize> = rest
                .char_indices()
                .map(|(i, _)| i)
                .skip(1)
                .chain([rest.len()])
                .take(self.max_chars)
                .collect();
            let matched = ends
                .iter()
                .rev()
                .copied()
                .find(|&end| self.words.contains(&rest[..end]));

            let end = match matched {
                Some(end) => end,
                None => rest
                    .graphemes(true)
                    .next()
                    .map(str::len)
                    .unwrap_or(rest.len()),
            };
            fragments.push(&rest[..end]);
            rest = &rest[end..];
        }
        fragments
    }
}

fn split_keeping_whitespace(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0usize;
    let mut current: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        match current {
            Some(prev) if prev != ws => {
                fragments.push(&text[start..i]);
                start = i;
                current = Some(ws);
            }
            Some(_) => {}
            None => current = Some(ws),
        }
    }
    if start < text.len() {
        fragments.push(&text[start..]);
    }
    fragments
}

/// Check the hard segmentation post-condition: fragments must concatenate to
/// the input byte for byte.
pub fn verify_reconstruction(text: &str, fragments: &[&str]) -> Result<(), SegmentError> {
    let total: usize = fragments.iter().map(|f| f.len()).sum();
    if total == text.len() && fragments.concat() == text {
        Ok(())
    } else {
        Err(SegmentError::Reconstruction)
    }
}

/// Lazily-built per-language cache of segmentation strategies.
///
/// Owned by the pipeline run and passed by reference to workers; never a
/// process-global.
pub struct SegmenterRegistry {
    cache: DashMap<String, Arc<Segmenter>>,
    lexicon_dir: Option<PathBuf>,
    whitespace_langs: HashSet<String>,
}

impl SegmenterRegistry {
    /// `lexicon_dir`, when given, is searched for `<lang>.txt` lexicon files
    /// for unspaced-script languages.
    pub fn new(lexicon_dir: Option<PathBuf>) -> Self {
        Self {
            cache: DashMap::new(),
            lexicon_dir,
            whitespace_langs: HashSet::new(),
        }
    }

    /// Force plain whitespace splitting for the given language codes.
    pub fn with_whitespace_langs<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitespace_langs = langs.into_iter().map(Into::into).collect();
        self
    }

    /// Fetch (building and caching on first use) the strategy for a language.
    pub fn for_language(&self, lang: &str) -> Result<Arc<Segmenter>, SegmentError> {
        if let Some(cached) = self.cache.get(lang) {
            return Ok(Arc::clone(cached.value()));
        }
        let built = Arc::new(self.build(lang)?);
        // First insert wins, so concurrent callers agree on one instance.
        let entry = self.cache.entry(lang.to_string()).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    fn build(&self, lang: &str) -> Result<Segmenter, SegmentError> {
        if self.whitespace_langs.contains(lang) {
            return Ok(Segmenter::Whitespace);
        }
        if UNSPACED_LANGS.contains(&lang) {
            if let Some(dir) = &self.lexicon_dir {
                let path = dir.join(format!("{lang}.txt"));
                if path.exists() {
                    let model = DictionaryModel::load(&path)?;
                    info!("loaded {} lexicon entries for {lang}", model.len());
                    return Ok(Segmenter::Dictionary(model));
                }
            }
            debug!("no lexicon for {lang}; using grapheme fallback");
            return Ok(Segmenter::Dictionary(DictionaryModel::empty()));
        }
        Ok(Segmenter::UnicodeWords)
    }
}

/// Projects a fragment to the key used for frequency and lemma lookup:
/// all Unicode punctuation removed, lowercased. The original fragment is
/// always what gets emitted, never the key.
pub struct Normalizer {
    punctuation: Regex,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            punctuation: Regex::new(r"\p{P}+").expect("punctuation class compiles"),
        }
    }

    /// An all-punctuation fragment normalizes to the empty key.
    pub fn key(&self, fragment: &str) -> String {
        self.punctuation.replace_all(fragment, "").to_lowercase()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
