//! Orchestration of one generation run.
//!
//! Hard ordering: the frequency pass over the whole corpus completes before
//! any selection happens. After that, every selection is a pure function of
//! (sentence text, frozen tables, config), so pairs are processed in
//! parallel with no shared mutable state and the output order is still the
//! deterministic shuffled pair order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cloze_lemma::LemmaIndex;
use cloze_segment::{Normalizer, SegmenterRegistry};
use cloze_types::GeneratedCard;
use rayon::prelude::*;
use tracing::{error, info};

use crate::config::{ClozeConfig, CorpusConfig};
use crate::corpus::{LinksFile, LoadMode, SentenceFile, SentenceMap, link_pairs};
use crate::frequency::FrequencyBuilder;
use crate::selector::ClozeSelector;
use crate::writer::CardWriter;

pub struct PipelineConfig {
    pub sentences_path: PathBuf,
    pub links_path: PathBuf,
    /// JSONL lemma dataset; selection runs without base-form reveals when
    /// absent.
    pub lemmas_path: Option<PathBuf>,
    pub preview_path: PathBuf,
    pub details_path: PathBuf,
    /// Directory of `<lang>.txt` lexicons for unspaced scripts.
    pub lexicon_dir: Option<PathBuf>,
    /// Languages forced onto the whitespace splitter.
    pub whitespace_langs: Vec<String>,
    pub load_mode: LoadMode,
    pub corpus: CorpusConfig,
    pub cloze: ClozeConfig,
}

#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub sentences: u64,
    pub pairs: u64,
    pub cards: u64,
}

pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let registry = SegmenterRegistry::new(config.lexicon_dir.clone())
        .with_whitespace_langs(config.whitespace_langs.iter().cloned());
    let normalizer = Normalizer::new();

    let sentence_file = SentenceFile::open(&config.sentences_path, config.load_mode)
        .context("load sentence file")?;
    let mut sentences = SentenceMap::new();
    let mut frequency = FrequencyBuilder::new(config.corpus.top_words);
    for (idx, record) in sentence_file.sentences(&config.corpus).enumerate() {
        if idx > 0 && idx % 200_000 == 0 {
            info!("read {idx} sentence rows so far");
        }
        let segmenter = registry
            .for_language(record.lang)
            .context("build segmenter for frequency pass")?;
        for fragment in segmenter.segment(record.text) {
            frequency.observe(record.lang, &normalizer.key(fragment));
        }
        sentences.insert(record.id, (record.lang, record.text));
    }
    info!("imported {} sentences", sentences.len());
    let frequency = frequency.finish();

    let lemmas = match &config.lemmas_path {
        Some(path) => LemmaIndex::load(path)?,
        None => LemmaIndex::empty(),
    };

    let links = LinksFile::open(&config.links_path, config.load_mode).context("load links file")?;
    let pairs = link_pairs(&links, &sentences, config.corpus.shuffle_seed);
    let pair_count = pairs.len() as u64;

    let selector = ClozeSelector::new(&registry, &normalizer, &frequency, &lemmas, &config.cloze);
    let cards: Vec<Option<GeneratedCard>> = pairs
        .par_iter()
        .map(|pair| match selector.rewrite(pair.to_lang, pair.to_text) {
            Ok(Some(resulting_tokens)) => Some(GeneratedCard {
                from_lang: pair.from_lang.to_string(),
                to_lang: pair.to_lang.to_string(),
                from_id: pair.from_id,
                to_id: pair.to_id,
                from_txt: pair.from_text.to_string(),
                original_txt: pair.to_text.to_string(),
                resulting_tokens,
            }),
            Ok(None) => None,
            Err(err) => {
                // Tokenizer defect for this sentence; keep the run going.
                error!(
                    "skipping sentence {} ({}): {err}: {:?}",
                    pair.to_id, pair.to_lang, pair.to_text
                );
                None
            }
        })
        .collect();

    let mut writer = CardWriter::create(&config.preview_path, &config.details_path)?;
    for card in cards.iter().flatten() {
        writer.write(card)?;
        if writer.written() % 50_000 == 0 {
            info!("written {} cards out of {pair_count} pairs so far", writer.written());
        }
    }
    let card_count = writer.finish()?;
    info!("generation complete: {card_count} cards from {pair_count} pairs");

    Ok(RunSummary {
        sentences: sentences.len() as u64,
        pairs: pair_count,
        cards: card_count,
    })
}
