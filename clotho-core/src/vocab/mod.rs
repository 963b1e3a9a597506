//! Deterministic token vocabulary with reserved sequence markers.
//!
//! Content tokens get indices `0..N` in first-seen order (captions in CSV row
//! order, then caption column order, then word order). The three reserved
//! markers are appended after them:
//!
//! | Marker  | Index |
//! |---------|-------|
//! | `<sos>` | N     |
//! | `<eos>` | N + 1 |
//! | `<unk>` | N + 2 |
//!
//! Encoding a token that is not in the vocabulary yields the `<unk>` index.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClothoError, Result};
use crate::record::Split;

pub const SOS_TOKEN: &str = "<sos>";
pub const EOS_TOKEN: &str = "<eos>";
pub const UNK_TOKEN: &str = "<unk>";

/// Immutable token ↔ index mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    frequencies: Vec<u64>,
    index: HashMap<String, u32>,
}

/// On-disk form: content tokens and their counts, in index order.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VocabularyFile {
    tokens: Vec<String>,
    frequencies: Vec<u64>,
    sos: u32,
    eos: u32,
    unk: u32,
}

impl Vocabulary {
    /// Build a vocabulary from token sequences, counting every occurrence.
    ///
    /// # Errors
    /// `ClothoError::EmptyCaptionSet` when no sequence contains a token.
    pub fn build<I, S, T>(split: Split, sequences: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self::build_counting(split, sequences, false)
    }

    /// Like [`Vocabulary::build`]; with `unique_per_sequence` a token repeated
    /// inside one sequence adds 1 to its frequency. Indices are the same
    /// either way.
    pub fn build_counting<I, S, T>(
        split: Split,
        sequences: I,
        unique_per_sequence: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut tokens: Vec<String> = Vec::new();
        let mut frequencies: Vec<u64> = Vec::new();
        let mut index: HashMap<String, u32> = HashMap::new();
        let mut counted: HashSet<u32> = HashSet::new();

        for sequence in sequences {
            counted.clear();
            for token in sequence {
                let token = token.as_ref();
                match index.get(token) {
                    Some(&idx) => {
                        if !unique_per_sequence || counted.insert(idx) {
                            frequencies[idx as usize] += 1;
                        }
                    }
                    None => {
                        counted.insert(tokens.len() as u32);
                        index.insert(token.to_string(), tokens.len() as u32);
                        tokens.push(token.to_string());
                        frequencies.push(1);
                    }
                }
            }
        }

        if tokens.is_empty() {
            return Err(ClothoError::EmptyCaptionSet { split });
        }

        Ok(Self {
            tokens,
            frequencies,
            index,
        })
    }

    /// Number of content tokens (reserved markers excluded).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Size of the index space, reserved markers included.
    pub fn size(&self) -> usize {
        self.tokens.len() + 3
    }

    pub fn sos(&self) -> u32 {
        self.tokens.len() as u32
    }

    pub fn eos(&self) -> u32 {
        self.tokens.len() as u32 + 1
    }

    pub fn unk(&self) -> u32 {
        self.tokens.len() as u32 + 2
    }

    /// Index of `token`, or `<unk>` when it was never observed.
    pub fn index_of(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or_else(|| self.unk())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Token for `index`, reserved markers included.
    pub fn token(&self, index: u32) -> Option<&str> {
        let n = self.tokens.len() as u32;
        match index {
            i if i < n => Some(self.tokens[i as usize].as_str()),
            i if i == n => Some(SOS_TOKEN),
            i if i == n + 1 => Some(EOS_TOKEN),
            i if i == n + 2 => Some(UNK_TOKEN),
            _ => None,
        }
    }

    pub fn frequency(&self, token: &str) -> u64 {
        self.index
            .get(token)
            .map(|&idx| self.frequencies[idx as usize])
            .unwrap_or(0)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// `<sos> t₀ … tₙ <eos>` as indices.
    pub fn encode<T: AsRef<str>>(&self, tokens: &[T]) -> Vec<u32> {
        let mut out = Vec::with_capacity(tokens.len() + 2);
        out.push(self.sos());
        out.extend(tokens.iter().map(|t| self.index_of(t.as_ref())));
        out.push(self.eos());
        out
    }

    /// Inverse of `encode`, dropping `<sos>`/`<eos>`.
    pub fn decode(&self, indices: &[u32]) -> Vec<&str> {
        indices
            .iter()
            .filter(|&&i| i != self.sos() && i != self.eos())
            .map(|&i| self.token(i).unwrap_or(UNK_TOKEN))
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = VocabularyFile {
            tokens: self.tokens.clone(),
            frequencies: self.frequencies.clone(),
            sos: self.sos(),
            eos: self.eos(),
            unk: self.unk(),
        };
        fs::write(path, serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }

    /// # Errors
    /// `ClothoError::Config` if the stored markers or counts are inconsistent.
    pub fn load(path: &Path) -> Result<Self> {
        let file: VocabularyFile = serde_json::from_slice(&fs::read(path)?)?;
        let n = file.tokens.len() as u32;
        if file.frequencies.len() != file.tokens.len()
            || (file.sos, file.eos, file.unk) != (n, n + 1, n + 2)
        {
            return Err(ClothoError::Config(format!(
                "vocabulary file {} is inconsistent",
                path.display()
            )));
        }

        let index = file
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();

        Ok(Self {
            tokens: file.tokens,
            frequencies: file.frequencies,
            index,
        })
    }
}
