pub mod config;
pub mod corpus;
pub mod frequency;
pub mod pipeline;
pub mod selector;
pub mod writer;

pub use config::{ClozeConfig, CorpusConfig, default_forbidden};
pub use corpus::LoadMode;
pub use pipeline::{PipelineConfig, RunSummary, run};
pub use selector::{ClozeSelector, sentence_seed};
