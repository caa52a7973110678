//! Shared types for cloze-deletion card generation.
//!
//! A sentence is a sequence of [`Token`]s: original text fragments plus the
//! markers the selector inserted. Markers render to the textual encoding the
//! downstream renderers expect (`{{c1::cat}}`, `{{c1:cat:cats}}`,
//! `{{c1::-}}`), and marker ordinals are assigned in text order only after a
//! sentence is final, via [`number_markers`].
//!
//! ```rust
//! use cloze_types::{Answer, Marker, Token, number_markers};
//!
//! let mut tokens = vec![
//!     Token::marker(Answer::Literal("cat".into())),
//!     Token::text(" sat"),
//! ];
//! assert_eq!(number_markers(&mut tokens), 1);
//! assert_eq!(tokens[0].render(), "{{c1::cat}}");
//! ```

use serde::Serialize;

/// One fragment of a sentence, in original text order.
///
/// Concatenating the rendered text of all tokens that are not markers, plus
/// the hidden text of every marker, reproduces the original sentence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// A fragment of the original text: word, punctuation, or whitespace.
    Text(String),
    /// An inserted cloze marker.
    Marker(Marker),
}

/// A cloze marker with its (eventual) 1-based ordinal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Marker {
    /// 1-based position in text order; 0 until [`number_markers`] runs.
    pub ordinal: u32,
    pub answer: Answer,
}

/// What a marker hides and what it reveals as the answer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Answer {
    /// Hide the literal fragment; the answer is the fragment itself.
    Literal(String),
    /// Hide the fragment but reveal its dictionary form instead of the
    /// inflected text, so the presence of a base form carries no grammatical
    /// hint.
    Lemma { base: String, shown: String },
    /// A marker that hides nothing, inserted as pedagogical noise.
    Empty,
}

impl Token {
    pub fn text(fragment: impl Into<String>) -> Self {
        Token::Text(fragment.into())
    }

    pub fn marker(answer: Answer) -> Self {
        Token::Marker(Marker { ordinal: 0, answer })
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Token::Marker(_))
    }

    /// True for an original fragment consisting only of whitespace.
    pub fn is_whitespace(&self) -> bool {
        match self {
            Token::Text(s) => !s.is_empty() && s.chars().all(char::is_whitespace),
            Token::Marker(_) => false,
        }
    }

    /// The text a learner reads when the gap is revealed; empty markers and
    /// plain fragments reveal their own text.
    pub fn shown_text(&self) -> &str {
        match self {
            Token::Text(s) => s,
            Token::Marker(m) => match &m.answer {
                Answer::Literal(shown) => shown,
                Answer::Lemma { shown, .. } => shown,
                Answer::Empty => "",
            },
        }
    }

    /// Render to the persisted encoding.
    pub fn render(&self) -> String {
        match self {
            Token::Text(s) => s.clone(),
            Token::Marker(m) => match &m.answer {
                Answer::Literal(shown) => format!("{{{{c{}::{}}}}}", m.ordinal, shown),
                Answer::Lemma { base, shown } => {
                    format!("{{{{c{}:{}:{}}}}}", m.ordinal, base, shown)
                }
                Answer::Empty => format!("{{{{c{}::-}}}}", m.ordinal),
            },
        }
    }
}

/// Assign 1-based ordinals to all markers in text order and return how many
/// markers the sentence carries.
pub fn number_markers(tokens: &mut [Token]) -> u32 {
    let mut next = 0u32;
    for token in tokens.iter_mut() {
        if let Token::Marker(marker) = token {
            next += 1;
            marker.ordinal = next;
        }
    }
    next
}

/// One accepted card, as persisted to the structured output.
///
/// `resulting_tokens` holds the rendered token strings including markers;
/// `original_txt` is the target sentence before rewriting.
#[derive(Clone, Debug, Serialize)]
pub struct GeneratedCard {
    pub from_lang: String,
    pub to_lang: String,
    pub from_id: u64,
    pub to_id: u64,
    pub from_txt: String,
    pub original_txt: String,
    pub resulting_tokens: Vec<String>,
}

impl GeneratedCard {
    /// The human-readable preview line: from-text, a literal `<br>`, then the
    /// rewritten target joined with spaces.
    pub fn preview_line(&self) -> String {
        format!("{}<br>{}", self.from_txt, self.resulting_tokens.join(" "))
    }
}
