use std::collections::HashSet;

/// Tuning knobs for cloze selection.
///
/// The defaults are the reference tuning; every factor is configuration
/// because the right values were still being iterated on when the generator
/// was designed. A `*_factor` of `f` means roughly a 1-in-`f` draw (see
/// each field).
#[derive(Clone, Debug)]
pub struct ClozeConfig {
    /// Upper bound on markers per sentence, real and empty combined.
    pub max_clozes: u32,
    /// How many placement attempts each sentence gets.
    pub attempt_budget: u32,
    /// After a placement, continue attempting with probability
    /// `1 / (another_cloze_factor + 1)`.
    pub another_cloze_factor: u32,
    /// When an unambiguous lemma exists, reveal it with probability
    /// `(hide_base_form_factor - 1) / hide_base_form_factor`; otherwise hide
    /// the word completely. If the dictionary form were always shown when
    /// available, its presence alone would mark the word's category.
    pub hide_base_form_factor: u32,
    /// Insert a no-op marker after a placement with probability
    /// `1 / empty_cloze_factor`.
    pub empty_cloze_factor: u32,
    /// Accept a whitespace fragment as a cloze target with probability
    /// `1 / tolerate_space_factor`.
    pub tolerate_space_factor: u32,
    /// Literal fragments that must never be hidden (recurring proper nouns
    /// used as stable anchors across many sentences).
    pub forbidden: HashSet<String>,
}

impl Default for ClozeConfig {
    fn default() -> Self {
        Self {
            max_clozes: 4,
            attempt_budget: 20,
            another_cloze_factor: 2,
            hide_base_form_factor: 2,
            empty_cloze_factor: 200,
            tolerate_space_factor: 200,
            forbidden: default_forbidden(),
        }
    }
}

/// Names that recur across the corpus as translation anchors.
pub fn default_forbidden() -> HashSet<String> {
    ["Layla", "Maria", "Mary", "Marias", "Muriel", "Tom"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Corpus ingestion and ranking bounds.
#[derive(Clone, Debug)]
pub struct CorpusConfig {
    /// Shortest accepted sentence, in characters.
    pub min_sentence_chars: usize,
    /// Longest accepted sentence, in characters.
    pub max_sentence_chars: usize,
    /// How many most-frequent words per language are eligible for clozing.
    pub top_words: usize,
    /// Seed for the one-time shuffle of linked pairs.
    pub shuffle_seed: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 20,
            max_sentence_chars: 250,
            top_words: 1000,
            shuffle_seed: 42,
        }
    }
}
