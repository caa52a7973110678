//! Streaming readers for the tab-separated sentence and link files, and the
//! join that turns them into cross-language sentence pairs.
//!
//! The corpus files are large (millions of rows), so they are backed by
//! either a memory map or an owned buffer, chosen at runtime via
//! [`LoadMode`]. Records borrow `&str` slices from the backing bytes; no row
//! is copied until it survives filtering.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::config::CorpusConfig;

/// Placeholder language code used by the upstream export for "unknown".
const NULL_LANG: &str = "\\N";

/// Strategy for loading corpus files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map the file (fast, zero-copy).
    Mmap,
    /// Read the file into an owned buffer (portable fallback).
    Owned,
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

fn load_file(path: &Path, mode: LoadMode) -> Result<Buffer> {
    match mode {
        LoadMode::Mmap => {
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            unsafe { Mmap::map(&file) }
                .map(Buffer::Mmap)
                .with_context(|| format!("mmap {}", path.display()))
        }
        LoadMode::Owned => {
            let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            Ok(Buffer::Owned(buf))
        }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r") {
        &line[..line.len() - 1]
    } else {
        line
    }
}

/// One accepted sentence row, borrowed from the backing buffer.
#[derive(Clone, Copy, Debug)]
pub struct SentenceRecord<'a> {
    pub id: u64,
    pub lang: &'a str,
    pub text: &'a str,
}

/// `id -> (lang, text)` for every sentence that survived filtering.
pub type SentenceMap<'a> = HashMap<u64, (&'a str, &'a str)>;

/// Two sentences judged to be mutual translations.
#[derive(Clone, Copy, Debug)]
pub struct SentencePair<'a> {
    pub from_lang: &'a str,
    pub to_lang: &'a str,
    pub from_id: u64,
    pub to_id: u64,
    pub from_text: &'a str,
    pub to_text: &'a str,
}

/// The sentence export: `id<TAB>lang<TAB>text`, one row per line.
pub struct SentenceFile {
    buf: Buffer,
}

impl SentenceFile {
    pub fn open(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        Ok(Self {
            buf: load_file(path.as_ref(), mode)?,
        })
    }

    /// Iterate accepted sentence records. Malformed rows (field count,
    /// non-integer id, invalid UTF-8) are logged and skipped; rows outside
    /// the length bounds or with a null language are dropped silently.
    pub fn sentences<'a>(
        &'a self,
        config: &'a CorpusConfig,
    ) -> impl Iterator<Item = SentenceRecord<'a>> + 'a {
        self.buf
            .as_slice()
            .split(|b| *b == b'\n')
            .enumerate()
            .filter_map(move |(lineno, raw_line)| {
                let line = strip_cr(raw_line);
                if line.is_empty() {
                    return None;
                }
                let line = match std::str::from_utf8(line) {
                    Ok(s) => s,
                    Err(_) => {
                        warn!("sentences:{} skipping row with invalid UTF-8", lineno + 1);
                        return None;
                    }
                };
                let record = match parse_sentence_row(line) {
                    Some(record) => record,
                    None => {
                        warn!("sentences:{} skipping malformed row", lineno + 1);
                        return None;
                    }
                };
                if record.lang.is_empty() || record.lang == NULL_LANG {
                    return None;
                }
                let chars = record.text.chars().count();
                if chars < config.min_sentence_chars || chars > config.max_sentence_chars {
                    return None;
                }
                Some(record)
            })
    }
}

fn parse_sentence_row(line: &str) -> Option<SentenceRecord<'_>> {
    let mut fields = line.split('\t');
    let id = fields.next()?.parse::<u64>().ok()?;
    let lang = fields.next()?;
    let text = fields.next()?;
    // A fourth field means the row is not `id<TAB>lang<TAB>text`.
    if fields.next().is_some() {
        return None;
    }
    Some(SentenceRecord { id, lang, text })
}

/// The alignment export: `from_id<TAB>to_id`, one row per line.
pub struct LinksFile {
    buf: Buffer,
}

impl LinksFile {
    pub fn open(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        Ok(Self {
            buf: load_file(path.as_ref(), mode)?,
        })
    }

    /// Iterate `(from_id, to_id)` pairs; malformed rows logged and skipped.
    pub fn links(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buf
            .as_slice()
            .split(|b| *b == b'\n')
            .enumerate()
            .filter_map(|(lineno, raw_line)| {
                let line = strip_cr(raw_line);
                if line.is_empty() {
                    return None;
                }
                let parsed = std::str::from_utf8(line).ok().and_then(|line| {
                    let mut fields = line.split('\t');
                    let from_id = fields.next()?.parse::<u64>().ok()?;
                    let to_id = fields.next()?.parse::<u64>().ok()?;
                    if fields.next().is_some() {
                        return None;
                    }
                    Some((from_id, to_id))
                });
                if parsed.is_none() {
                    warn!("links:{} skipping malformed row", lineno + 1);
                }
                parsed
            })
    }
}

/// Join alignment pairs whose endpoints both survived sentence filtering,
/// then shuffle once with a fixed seed.
///
/// The export inserts related sentences close together, so corpus order
/// correlates with topical clusters; the seeded shuffle breaks that up while
/// keeping reruns byte-identical. Per-sentence cloze choice is unaffected
/// (it is seeded from the sentence text, not from position).
pub fn link_pairs<'a>(
    links: &LinksFile,
    sentences: &SentenceMap<'a>,
    shuffle_seed: u64,
) -> Vec<SentencePair<'a>> {
    let mut pairs = Vec::new();
    for (idx, (from_id, to_id)) in links.links().enumerate() {
        if idx > 0 && idx % 100_000 == 0 {
            info!("read {idx} link rows so far");
        }
        let (Some(&(from_lang, from_text)), Some(&(to_lang, to_text))) =
            (sentences.get(&from_id), sentences.get(&to_id))
        else {
            continue;
        };
        pairs.push(SentencePair {
            from_lang,
            to_lang,
            from_id,
            to_id,
            from_text,
            to_text,
        });
    }

    info!("found {} sentence pairs, shuffling", pairs.len());
    let mut rng = ChaCha8Rng::seed_from_u64(shuffle_seed);
    pairs.shuffle(&mut rng);
    pairs
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn accepted(contents: &str, config: &CorpusConfig) -> Vec<u64> {
        let file = write_file(contents);
        let sentences = SentenceFile::open(file.path(), LoadMode::Owned).unwrap();
        sentences.sentences(config).map(|r| r.id).collect()
    }

    #[test]
    fn filters_length_and_null_language() {
        let config = CorpusConfig::default();
        let rows = concat!(
            "1\teng\tThe quick brown fox jumps over the dog.\n",
            "2\teng\ttoo short\n",
            "3\t\\N\tThis sentence has no usable language code.\n",
            "4\teng\t",
        );
        let long_tail = format!("{rows}{}\n", "x".repeat(300));
        assert_eq!(accepted(&long_tail, &config), vec![1]);
    }

    #[test]
    fn skips_malformed_rows() {
        let config = CorpusConfig::default();
        let rows = concat!(
            "not-a-number\teng\tA perfectly reasonable sentence here.\n",
            "5\n",
            "8\teng\tA sentence with an extra\ttab separated field.\n",
            "6\teng\tA perfectly reasonable sentence goes here.\n",
        );
        assert_eq!(accepted(rows, &config), vec![6]);
    }

    #[test]
    fn length_bounds_count_characters_not_bytes() {
        let config = CorpusConfig {
            min_sentence_chars: 5,
            max_sentence_chars: 10,
            ..CorpusConfig::default()
        };
        // Ten characters, thirty bytes.
        let rows = "7\tjpn\t日本語の文はここです\n";
        assert_eq!(accepted(rows, &config), vec![7]);
    }

    #[test]
    fn links_join_only_surviving_endpoints() {
        let links_file = write_file("1\t2\n1\t99\nbogus\n1\t2\t3\n2\t1\n");
        let links = LinksFile::open(links_file.path(), LoadMode::Owned).unwrap();

        let mut sentences = SentenceMap::new();
        sentences.insert(1, ("eng", "The cat sat on the mat."));
        sentences.insert(2, ("ita", "Il gatto sedeva sul tappeto."));

        let pairs = link_pairs(&links, &sentences, 42);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().any(|p| p.from_id == 1 && p.to_id == 2));
        assert!(pairs.iter().any(|p| p.from_id == 2 && p.to_id == 1));
    }

    #[test]
    fn shuffle_is_deterministic_for_a_seed() {
        let links_file = write_file("1\t2\n2\t1\n3\t1\n1\t3\n2\t3\n3\t2\n");
        let links = LinksFile::open(links_file.path(), LoadMode::Owned).unwrap();

        let mut sentences = SentenceMap::new();
        sentences.insert(1, ("eng", "one"));
        sentences.insert(2, ("ita", "two"));
        sentences.insert(3, ("deu", "three"));

        let first: Vec<_> = link_pairs(&links, &sentences, 42)
            .iter()
            .map(|p| (p.from_id, p.to_id))
            .collect();
        let second: Vec<_> = link_pairs(&links, &sentences, 42)
            .iter()
            .map(|p| (p.from_id, p.to_id))
            .collect();
        assert_eq!(first, second);
    }
}
