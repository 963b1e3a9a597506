//! Caption normalization and tokenization.
//!
//! The rule is fixed so vocabularies are reproducible:
//!
//! 1. Lower-case (unless `keep_case`).
//! 2. Drop literal `<sos>` / `<eos>` markers.
//! 3. Replace `, . ! ? ; : "` with a space (unless punctuation is kept).
//! 4. Split on whitespace.

pub mod table;

pub use table::{audio_id, CaptionEntry, CaptionTable};

use serde::{Deserialize, Serialize};

const PUNCTUATION: &[char] = &[',', '.', '!', '?', ';', ':', '"'];
const SPECIAL_MARKERS: &[&str] = &["<sos>", "<eos>"];

/// Normalization switches applied to every caption of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionOptions {
    pub keep_case: bool,
    /// Strip punctuation before splitting into words.
    pub remove_punctuation_words: bool,
    /// Strip punctuation before splitting into characters.
    pub remove_punctuation_chars: bool,
    /// Count a word once per caption in the word vocabulary frequencies.
    pub use_unique_words_per_caption: bool,
}

impl Default for CaptionOptions {
    fn default() -> Self {
        Self {
            keep_case: false,
            remove_punctuation_words: true,
            remove_punctuation_chars: true,
            use_unique_words_per_caption: false,
        }
    }
}

/// Clean a sentence and return its whitespace-separated words.
pub fn sentence_words(sentence: &str, keep_case: bool, remove_punctuation: bool) -> Vec<String> {
    let mut text = if keep_case {
        sentence.to_string()
    } else {
        sentence.to_lowercase()
    };

    if remove_punctuation {
        text = text.replace(PUNCTUATION, " ");
    }

    text.split_whitespace()
        .filter(|w| !SPECIAL_MARKERS.iter().any(|m| w.eq_ignore_ascii_case(m)))
        .map(str::to_string)
        .collect()
}

/// A single caption in its raw, cleaned and tokenized forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub raw: String,
    /// Normalized words joined by single spaces.
    pub cleaned: String,
    pub tokens: Vec<String>,
    /// Character tokens (one-char strings, spaces included).
    pub characters: Vec<String>,
}

impl Caption {
    pub fn new(raw: &str, options: &CaptionOptions) -> Self {
        let tokens = sentence_words(raw, options.keep_case, options.remove_punctuation_words);
        let cleaned = tokens.join(" ");

        let characters = if options.remove_punctuation_chars == options.remove_punctuation_words {
            cleaned.chars().map(String::from).collect()
        } else {
            sentence_words(raw, options.keep_case, options.remove_punctuation_chars)
                .join(" ")
                .chars()
                .map(String::from)
                .collect()
        };

        Self {
            raw: raw.to_string(),
            cleaned,
            tokens,
            characters,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
