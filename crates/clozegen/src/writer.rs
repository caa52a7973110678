//! Serializes accepted cards to the two persisted formats.
//!
//! The preview file is one line per card (`from_txt<br>rewritten tokens`),
//! meant for eyeballing a generation run. The structured file is one JSON
//! object per line with every [`GeneratedCard`] field, consumed by the
//! downstream loader. Both files always receive the same cards in the same
//! order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cloze_types::GeneratedCard;

pub struct CardWriter {
    preview: BufWriter<File>,
    details: BufWriter<File>,
    written: u64,
}

impl CardWriter {
    pub fn create(preview_path: &Path, details_path: &Path) -> Result<Self> {
        let preview = File::create(preview_path)
            .with_context(|| format!("create {}", preview_path.display()))?;
        let details = File::create(details_path)
            .with_context(|| format!("create {}", details_path.display()))?;
        Ok(Self {
            preview: BufWriter::new(preview),
            details: BufWriter::new(details),
            written: 0,
        })
    }

    pub fn write(&mut self, card: &GeneratedCard) -> Result<()> {
        writeln!(self.preview, "{}", card.preview_line()).context("write preview line")?;
        let record = serde_json::to_string(card).context("serialize card record")?;
        writeln!(self.details, "{record}").context("write card record")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<u64> {
        self.preview.flush().context("flush preview output")?;
        self.details.flush().context("flush details output")?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn outputs_stay_synchronized() {
        let dir = TempDir::new().expect("temp dir");
        let preview_path = dir.path().join("cards.tsv");
        let details_path = dir.path().join("cards.jsonl");
        let mut writer = CardWriter::create(&preview_path, &details_path).unwrap();

        let card = GeneratedCard {
            from_lang: "eng".into(),
            to_lang: "ita".into(),
            from_id: 10,
            to_id: 20,
            from_txt: "The cat".into(),
            original_txt: "Il gatto".into(),
            resulting_tokens: vec!["{{c1::Il}}".into(), " ".into(), "gatto".into()],
        };
        writer.write(&card).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);

        let preview = std::fs::read_to_string(&preview_path).unwrap();
        assert_eq!(preview, "The cat<br>{{c1::Il}}   gatto\n");

        let details = std::fs::read_to_string(&details_path).unwrap();
        let record: serde_json::Value = serde_json::from_str(details.trim()).unwrap();
        assert_eq!(record["from_id"], 10);
        assert_eq!(record["original_txt"], "Il gatto");
        assert_eq!(record["resulting_tokens"][0], "{{c1::Il}}");
    }
}
