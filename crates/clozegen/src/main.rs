use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use clozegen::config::{ClozeConfig, CorpusConfig, default_forbidden};
use clozegen::corpus::LoadMode;
use clozegen::pipeline::{self, PipelineConfig};

#[derive(Parser)]
#[command(name = "clozegen")]
#[command(about = "Generate cloze-deletion flashcards from an aligned sentence corpus")]
struct Cli {
    /// The sentence file: id<TAB>lang<TAB>text
    sentences: PathBuf,
    /// The alignment file: from_id<TAB>to_id
    links: PathBuf,
    /// The base forms JSONL file
    base_forms: Option<PathBuf>,

    /// Preview output, one card per line
    #[arg(long, default_value = "universal_cards.tsv")]
    preview_out: PathBuf,
    /// Structured JSONL output for the downstream loader
    #[arg(long, default_value = "universal_cards.jsonl")]
    details_out: PathBuf,

    /// Directory of <lang>.txt lexicon files for unspaced scripts
    #[arg(long)]
    lexicon_dir: Option<PathBuf>,
    /// Force plain whitespace segmentation for a language (repeatable)
    #[arg(long = "whitespace-lang")]
    whitespace_langs: Vec<String>,
    /// How the corpus files are read
    #[arg(long, value_enum, default_value_t = LoadModeArg::Mmap)]
    load_mode: LoadModeArg,

    /// How many most-frequent words per language are cloze-eligible
    #[arg(long, default_value_t = 1000)]
    top_words: usize,
    /// Shortest accepted sentence, in characters
    #[arg(long, default_value_t = 20)]
    min_sentence_chars: usize,
    /// Longest accepted sentence, in characters
    #[arg(long, default_value_t = 250)]
    max_sentence_chars: usize,
    /// Seed for the one-time pair shuffle
    #[arg(long, default_value_t = 42)]
    shuffle_seed: u64,

    /// Most markers per sentence, real and empty combined
    #[arg(long, default_value_t = 4)]
    max_clozes: u32,
    /// Placement attempts per sentence
    #[arg(long, default_value_t = 20)]
    attempts: u32,
    /// Continue after a placement with probability 1/(f+1)
    #[arg(long, default_value_t = 2)]
    another_cloze_factor: u32,
    /// Hide an available base form completely with probability 1/f
    #[arg(long, default_value_t = 2)]
    hide_base_form_factor: u32,
    /// Insert a no-op marker with probability 1/f
    #[arg(long, default_value_t = 200)]
    empty_cloze_factor: u32,
    /// Accept a whitespace fragment as a cloze with probability 1/f
    #[arg(long, default_value_t = 200)]
    tolerate_space_factor: u32,
    /// Token that must never be hidden (repeatable; replaces the default set)
    #[arg(long = "forbidden")]
    forbidden: Vec<String>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LoadModeArg {
    Mmap,
    Owned,
}

impl From<LoadModeArg> for LoadMode {
    fn from(arg: LoadModeArg) -> Self {
        match arg {
            LoadModeArg::Mmap => LoadMode::Mmap,
            LoadModeArg::Owned => LoadMode::Owned,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = PipelineConfig {
        sentences_path: cli.sentences,
        links_path: cli.links,
        lemmas_path: cli.base_forms,
        preview_path: cli.preview_out,
        details_path: cli.details_out,
        lexicon_dir: cli.lexicon_dir,
        whitespace_langs: cli.whitespace_langs,
        load_mode: cli.load_mode.into(),
        corpus: CorpusConfig {
            min_sentence_chars: cli.min_sentence_chars,
            max_sentence_chars: cli.max_sentence_chars,
            top_words: cli.top_words,
            shuffle_seed: cli.shuffle_seed,
        },
        cloze: ClozeConfig {
            max_clozes: cli.max_clozes,
            attempt_budget: cli.attempts,
            another_cloze_factor: cli.another_cloze_factor,
            hide_base_form_factor: cli.hide_base_form_factor,
            empty_cloze_factor: cli.empty_cloze_factor,
            tolerate_space_factor: cli.tolerate_space_factor,
            forbidden: if cli.forbidden.is_empty() {
                default_forbidden()
            } else {
                cli.forbidden.into_iter().collect()
            },
        },
    };

    info!(
        "processing {} + {}",
        config.sentences_path.display(),
        config.links_path.display()
    );
    if let Some(path) = &config.lemmas_path {
        info!("using base forms at {}", path.display());
    }

    let start = Instant::now();
    let summary = pipeline::run(&config)?;
    info!(
        "{} sentences, {} pairs, {} cards in {} ms",
        summary.sentences,
        summary.pairs,
        summary.cards,
        start.elapsed().as_millis()
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
