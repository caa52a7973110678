//! The cloze selection state machine.
//!
//! Given one target sentence, the frozen frequency table, and the lemma
//! index, [`ClozeSelector::rewrite`] produces the rewritten token sequence
//! with markers inserted, or nothing when no placement succeeded.
//!
//! Selection is deterministic per sentence: the RNG is a ChaCha8 stream
//! seeded with the xxh3 hash of the sentence text, so the same sentence
//! always yields the same card regardless of corpus ordering, batching, or
//! parallel execution. Draw order within one attempt is fixed: token index,
//! tolerate-space, hide-base-form, empty-cloze, empty position, another-
//! cloze.
//!
//! Control flow is an explicit phase machine (Sampling -> Validating ->
//! Placing -> Stopping) with a bounded attempt counter, so the acceptance
//! policy in [`ClozeSelector::validate`] stays testable apart from the
//! sampling step.

use cloze_lemma::LemmaIndex;
use cloze_segment::{Normalizer, SegmentError, SegmenterRegistry, verify_reconstruction};
use cloze_types::{Answer, Token, number_markers};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::ClozeConfig;
use crate::frequency::FrequencyTable;

/// Deterministic 64-bit seed derived from the sentence's own text.
pub fn sentence_seed(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

/// Rewrites one sentence at a time; cheap to construct, shares all tables by
/// reference, and is safe to use from parallel workers.
pub struct ClozeSelector<'a> {
    registry: &'a SegmenterRegistry,
    normalizer: &'a Normalizer,
    frequency: &'a FrequencyTable,
    lemmas: &'a LemmaIndex,
    config: &'a ClozeConfig,
}

enum Phase {
    Sampling,
    Validating { index: usize },
    Placing { index: usize, placement: Placement },
    Stopping,
}

#[derive(Debug, Eq, PartialEq)]
enum Placement {
    /// Replace the fragment, answer is the fragment itself.
    Literal,
    /// Replace the fragment, answer is its dictionary form.
    Lemma(String),
}

#[derive(Debug, Eq, PartialEq)]
enum Rejection {
    AlreadyMarker,
    AfterInvisibleMarker,
    SpaceNotTolerated,
    SpaceBeforeMarker,
    Uncommon,
    Forbidden,
}

impl<'a> ClozeSelector<'a> {
    pub fn new(
        registry: &'a SegmenterRegistry,
        normalizer: &'a Normalizer,
        frequency: &'a FrequencyTable,
        lemmas: &'a LemmaIndex,
        config: &'a ClozeConfig,
    ) -> Self {
        Self {
            registry,
            normalizer,
            frequency,
            lemmas,
            config,
        }
    }

    /// Rewrite a target sentence into rendered tokens with numbered markers.
    ///
    /// Returns `Ok(None)` when the attempt budget ran out with zero
    /// placements (the sentence simply produces no card). A reconstruction
    /// failure is an error for this sentence only; the caller logs and skips
    /// it.
    pub fn rewrite(&self, lang: &str, text: &str) -> Result<Option<Vec<String>>, SegmentError> {
        let segmenter = self.registry.for_language(lang)?;
        let fragments = segmenter.segment(text);
        // Checked once, on the pre-rewrite sequence; a violation here is a
        // tokenizer defect and must not silently corrupt the card.
        verify_reconstruction(text, &fragments)?;

        let mut tokens: Vec<Token> = fragments.into_iter().map(Token::text).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(sentence_seed(text));
        let placed = self.run(lang, &mut tokens, &mut rng);
        if placed == 0 {
            return Ok(None);
        }
        number_markers(&mut tokens);
        Ok(Some(tokens.iter().map(Token::render).collect()))
    }

    fn run(&self, lang: &str, tokens: &mut Vec<Token>, rng: &mut ChaCha8Rng) -> u32 {
        let max_clozes = self.config.max_clozes;
        let mut placed = 0u32;
        let mut attempts = 0u32;
        let mut phase = Phase::Sampling;
        loop {
            phase = match phase {
                Phase::Sampling => {
                    if tokens.is_empty()
                        || attempts >= self.config.attempt_budget
                        || placed >= max_clozes
                    {
                        Phase::Stopping
                    } else {
                        attempts += 1;
                        Phase::Validating {
                            index: rng.gen_range(0..tokens.len()),
                        }
                    }
                }
                Phase::Validating { index } => match self.validate(lang, tokens, index, rng) {
                    Ok(placement) => Phase::Placing { index, placement },
                    Err(_) => Phase::Sampling,
                },
                Phase::Placing { index, placement } => {
                    place(tokens, index, placement);
                    placed += 1;
                    if placed < max_clozes && one_in(rng, self.config.empty_cloze_factor) {
                        placed += insert_empty(tokens, rng);
                    }
                    if placed < max_clozes
                        && rng.gen_range(0..=self.config.another_cloze_factor) == 0
                    {
                        Phase::Sampling
                    } else {
                        Phase::Stopping
                    }
                }
                Phase::Stopping => break,
            };
        }
        placed
    }

    /// The acceptance policy for one sampled index.
    fn validate(
        &self,
        lang: &str,
        tokens: &[Token],
        index: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Placement, Rejection> {
        let token = &tokens[index];
        let Token::Text(fragment) = token else {
            return Err(Rejection::AlreadyMarker);
        };
        // A gap right after an invisible gap reads as one ambiguous blank.
        if index > 0 && invisible_gap(&tokens[index - 1]) {
            return Err(Rejection::AfterInvisibleMarker);
        }

        let key = self.normalizer.key(fragment);
        if token.is_whitespace() {
            if !one_in(rng, self.config.tolerate_space_factor) {
                return Err(Rejection::SpaceNotTolerated);
            }
            if tokens.get(index + 1).is_some_and(Token::is_marker) {
                return Err(Rejection::SpaceBeforeMarker);
            }
        } else if !self.frequency.is_common(lang, &key) {
            // Punctuation fragments normalize to the empty key and land here
            // too.
            return Err(Rejection::Uncommon);
        }
        if self.config.forbidden.contains(fragment.as_str()) {
            return Err(Rejection::Forbidden);
        }

        if let Some(base) = self.lemmas.resolve(lang, &key) {
            let distinct = base != key;
            if distinct && !one_in(rng, self.config.hide_base_form_factor) {
                return Ok(Placement::Lemma(base.to_string()));
            }
        }
        Ok(Placement::Literal)
    }
}

fn one_in(rng: &mut ChaCha8Rng, factor: u32) -> bool {
    rng.gen_range(1..=factor.max(1)) == 1
}

fn place(tokens: &mut [Token], index: usize, placement: Placement) {
    let Token::Text(fragment) = &tokens[index] else {
        return;
    };
    let answer = match placement {
        Placement::Literal => Answer::Literal(fragment.clone()),
        Placement::Lemma(base) => Answer::Lemma {
            base,
            shown: fragment.clone(),
        },
    };
    tokens[index] = Token::marker(answer);
}

/// Insert a no-op marker at a random position, unless the token that would
/// follow it is itself a marker, or the token before the insertion point is
/// an invisible gap (either way the learner could not tell the fake gap from
/// the real one). Returns how many markers were inserted.
fn insert_empty(tokens: &mut Vec<Token>, rng: &mut ChaCha8Rng) -> u32 {
    let index = rng.gen_range(0..tokens.len());
    if tokens[index].is_marker() {
        return 0;
    }
    if index > 0 && invisible_gap(&tokens[index - 1]) {
        return 0;
    }
    tokens.insert(index, Token::marker(Answer::Empty));
    1
}

/// A marker whose gap reveals nothing visible: an empty marker, or one whose
/// shown text is pure whitespace.
fn invisible_gap(token: &Token) -> bool {
    match token {
        Token::Marker(marker) => match &marker.answer {
            Answer::Empty => true,
            Answer::Literal(shown) | Answer::Lemma { shown, .. } => {
                shown.chars().all(char::is_whitespace)
            }
        },
        Token::Text(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn fixtures() -> (SegmenterRegistry, Normalizer, LemmaIndex) {
        (
            SegmenterRegistry::new(None),
            Normalizer::new(),
            LemmaIndex::empty(),
        )
    }

    /// Undo the rewrite: markers contribute their hidden text, empty markers
    /// contribute nothing.
    fn decode(rendered: &[String]) -> String {
        let mut out = String::new();
        for token in rendered {
            let Some(inner) = token
                .strip_prefix("{{c")
                .and_then(|rest| rest.strip_suffix("}}"))
            else {
                out.push_str(token);
                continue;
            };
            let (_, rest) = inner.split_once(':').expect("marker has a separator");
            if let Some(content) = rest.strip_prefix(':') {
                if content != "-" {
                    out.push_str(content);
                }
            } else {
                let (_, shown) = rest.split_once(':').expect("lemma marker has shown text");
                out.push_str(shown);
            }
        }
        out
    }

    fn marker_ordinals(rendered: &[String]) -> Vec<u32> {
        rendered
            .iter()
            .filter_map(|token| {
                let inner = token.strip_prefix("{{c")?;
                let digits: String = inner.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().ok()
            })
            .collect()
    }

    #[test]
    fn rewrites_deterministically() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::from_keys("eng", ["the", "cat", "sat", "on", "mat"]);
        let config = ClozeConfig::default();
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let text = "The cat sat on the mat.";
        let first = selector.rewrite("eng", text).unwrap();
        let _other = selector.rewrite("eng", "The mat sat on the cat.").unwrap();
        let second = selector.rewrite("eng", text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn placed_markers_decode_back_to_the_original() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::from_keys("eng", ["the", "cat", "sat", "on", "mat"]);
        let config = ClozeConfig::default();
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let text = "The cat sat on the mat.";
        let rendered = selector
            .rewrite("eng", text)
            .unwrap()
            .expect("a sentence full of frequent words gets a card");
        assert_eq!(decode(&rendered), text);
        assert!(rendered.iter().any(|t| t.starts_with("{{c")));
    }

    #[test]
    fn respects_the_cloze_cap() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::from_keys("eng", ["the", "cat", "sat", "on", "mat"]);
        let config = ClozeConfig {
            max_clozes: 2,
            another_cloze_factor: 0, // always keep attempting
            ..ClozeConfig::default()
        };
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let rendered = selector
            .rewrite("eng", "The cat sat on the mat and the cat sat down.")
            .unwrap()
            .expect("card expected");
        let markers = rendered.iter().filter(|t| t.starts_with("{{c")).count();
        assert!(markers <= 2, "placed {markers} markers: {rendered:?}");
    }

    #[test]
    fn ordinals_increase_left_to_right() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::from_keys("eng", ["the", "cat", "sat", "on", "mat", "and"]);
        let config = ClozeConfig {
            another_cloze_factor: 0,
            ..ClozeConfig::default()
        };
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let rendered = selector
            .rewrite("eng", "The cat sat on the mat and the cat sat down.")
            .unwrap()
            .expect("card expected");
        let ordinals = marker_ordinals(&rendered);
        let expected: Vec<u32> = (1..=ordinals.len() as u32).collect();
        assert_eq!(ordinals, expected);
    }

    #[test]
    fn sentence_with_no_eligible_tokens_yields_no_card() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::default();
        let config = ClozeConfig::default();
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        // No whitespace either, so the tolerate-space path cannot fire.
        let result = selector.rewrite("eng", "Parole.sconosciute.ovunque.");
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn forbidden_tokens_are_never_hidden() {
        let (registry, normalizer, lemmas) = fixtures();
        let table = FrequencyTable::from_keys("eng", ["tom", "saw"]);
        let config = ClozeConfig {
            forbidden: HashSet::from(["Tom".to_string()]),
            another_cloze_factor: 0,
            ..ClozeConfig::default()
        };
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        if let Some(rendered) = selector.rewrite("eng", "Tom saw Tom and Tom saw Tom.").unwrap() {
            for token in &rendered {
                assert!(
                    !(token.starts_with("{{c") && token.contains("Tom")),
                    "forbidden token hidden in {token}"
                );
            }
        }
    }

    #[test]
    fn validate_prefers_lemma_when_base_form_differs() {
        let (registry, normalizer, _) = fixtures();
        let mut lemma_rng = ChaCha8Rng::seed_from_u64(7);
        let table = FrequencyTable::from_keys("eng", ["cats"]);
        // Factor so large the hide-completely draw cannot realistically win.
        let config = ClozeConfig {
            hide_base_form_factor: u32::MAX,
            ..ClozeConfig::default()
        };
        let lemmas = {
            use std::io::Write;
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, r#"{{"lang": "eng", "word": "cats", "base_forms": ["cat"]}}"#).unwrap();
            LemmaIndex::load(file.path()).unwrap()
        };
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let tokens = vec![Token::text("cats")];
        let placement = selector.validate("eng", &tokens, 0, &mut lemma_rng).unwrap();
        assert_eq!(placement, Placement::Lemma("cat".to_string()));
    }

    #[test]
    fn validate_falls_back_to_literal_when_lemma_equals_key() {
        let (registry, normalizer, _) = fixtures();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let table = FrequencyTable::from_keys("eng", ["cat"]);
        let config = ClozeConfig {
            hide_base_form_factor: u32::MAX,
            ..ClozeConfig::default()
        };
        let lemmas = {
            use std::io::Write;
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, r#"{{"lang": "eng", "word": "cat", "base_forms": ["cat"]}}"#).unwrap();
            LemmaIndex::load(file.path()).unwrap()
        };
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let tokens = vec![Token::text("cat")];
        let placement = selector.validate("eng", &tokens, 0, &mut rng).unwrap();
        assert_eq!(placement, Placement::Literal);
    }

    #[test]
    fn validate_rejects_markers_and_their_neighbours() {
        let (registry, normalizer, lemmas) = fixtures();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let table = FrequencyTable::from_keys("eng", ["cat"]);
        let config = ClozeConfig::default();
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let tokens = vec![Token::marker(Answer::Empty), Token::text("cat")];
        assert_eq!(
            selector.validate("eng", &tokens, 0, &mut rng),
            Err(Rejection::AlreadyMarker)
        );
        assert_eq!(
            selector.validate("eng", &tokens, 1, &mut rng),
            Err(Rejection::AfterInvisibleMarker)
        );
    }

    #[test]
    fn validate_rejects_uncommon_and_punctuation() {
        let (registry, normalizer, lemmas) = fixtures();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let table = FrequencyTable::from_keys("eng", ["cat"]);
        let config = ClozeConfig::default();
        let selector = ClozeSelector::new(&registry, &normalizer, &table, &lemmas, &config);

        let tokens = vec![Token::text("rare"), Token::text("...")];
        assert_eq!(
            selector.validate("eng", &tokens, 0, &mut rng),
            Err(Rejection::Uncommon)
        );
        assert_eq!(
            selector.validate("eng", &tokens, 1, &mut rng),
            Err(Rejection::Uncommon)
        );
    }

    #[test]
    fn empty_marker_never_lands_before_an_existing_marker() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..64 {
            let mut tokens = vec![
                Token::marker(Answer::Literal("cat".into())),
                Token::marker(Answer::Literal("sat".into())),
            ];
            assert_eq!(insert_empty(&mut tokens, &mut rng), 0);
        }

        let mut inserted = 0;
        for _ in 0..64 {
            let mut tokens = vec![Token::text("cat"), Token::marker(Answer::Empty)];
            if insert_empty(&mut tokens, &mut rng) == 1 {
                inserted += 1;
                assert!(tokens[0].is_marker());
                assert!(!tokens[1].is_marker());
            }
        }
        assert!(inserted > 0);
    }

    #[test]
    fn empty_marker_never_lands_after_an_invisible_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..64 {
            let mut tokens = vec![Token::marker(Answer::Empty), Token::text("cat")];
            assert_eq!(insert_empty(&mut tokens, &mut rng), 0);
        }
        // A whitespace answer hides nothing visible either.
        for _ in 0..64 {
            let mut tokens = vec![
                Token::marker(Answer::Literal(" ".into())),
                Token::text("cat"),
            ];
            assert_eq!(insert_empty(&mut tokens, &mut rng), 0);
        }
    }
}
