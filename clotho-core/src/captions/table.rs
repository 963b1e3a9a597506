//! Annotation CSV → caption table.
//!
//! One row per audio file: a file-name column plus any number of caption
//! columns sharing a header prefix (`caption_1`, `caption_2`, …). The caption
//! ordinal is the 1-based position among the caption columns.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{ClothoError, Result};

/// Captions attached to one audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionEntry {
    pub file_name: String,
    /// `(ordinal, raw caption)` pairs in column order. Empty cells are absent.
    pub captions: Vec<(u32, String)>,
}

/// Record identifier of an audio file: its stem, `clip1.wav` → `clip1`.
pub fn audio_id(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Audio file name → captions, in CSV row order.
#[derive(Debug, Clone, Default)]
pub struct CaptionTable {
    entries: Vec<CaptionEntry>,
    by_file: HashMap<String, usize>,
}

impl CaptionTable {
    /// Build a table from already-parsed entries.
    ///
    /// # Errors
    /// `ClothoError::Config` if two entries name the same audio file, or two
    /// file names share a stem (`clip.wav`, `clip.flac`) and would map to the
    /// same record keys.
    pub fn from_entries(entries: Vec<CaptionEntry>) -> Result<Self> {
        let mut by_file = HashMap::with_capacity(entries.len());
        let mut by_id: HashMap<String, &str> = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if by_file.insert(entry.file_name.clone(), idx).is_some() {
                return Err(ClothoError::Config(format!(
                    "audio file {} is listed more than once",
                    entry.file_name
                )));
            }
            if let Some(other) = by_id.insert(audio_id(&entry.file_name), &entry.file_name) {
                return Err(ClothoError::Config(format!(
                    "audio files {other} and {} share the record id {}",
                    entry.file_name,
                    audio_id(&entry.file_name)
                )));
            }
        }
        Ok(Self { entries, by_file })
    }

    /// Read an annotations CSV.
    ///
    /// # Errors
    /// `ClothoError::Annotations` if the file cannot be parsed, the file-name
    /// column is missing, no caption column matches `caption_prefix`, or a
    /// file name repeats.
    pub fn read_csv(path: &Path, file_column: &str, caption_prefix: &str) -> Result<Self> {
        let annotations_err = |reason: String| ClothoError::Annotations {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| annotations_err(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| annotations_err(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let file_idx = headers
            .iter()
            .position(|h| h == file_column)
            .ok_or_else(|| annotations_err(format!("missing column '{file_column}'")))?;

        let caption_columns: Vec<(u32, usize)> = headers
            .iter()
            .enumerate()
            .filter(|(idx, h)| *idx != file_idx && h.starts_with(caption_prefix))
            .enumerate()
            .map(|(ordinal, (idx, _))| (ordinal as u32 + 1, idx))
            .collect();

        if caption_columns.is_empty() {
            return Err(annotations_err(format!(
                "no caption columns with prefix '{caption_prefix}'"
            )));
        }

        let mut entries = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| annotations_err(format!("row {}: {e}", line + 2)))?;
            let file_name = row.get(file_idx).unwrap_or_default().trim().to_string();
            if file_name.is_empty() {
                return Err(annotations_err(format!("row {} has no file name", line + 2)));
            }

            let captions = caption_columns
                .iter()
                .filter_map(|&(ordinal, idx)| {
                    row.get(idx)
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(|c| (ordinal, c.to_string()))
                })
                .collect();

            entries.push(CaptionEntry { file_name, captions });
        }

        debug!(
            path = %path.display(),
            rows = entries.len(),
            caption_columns = caption_columns.len(),
            "annotations read"
        );

        Self::from_entries(entries).map_err(|e| annotations_err(e.to_string()))
    }

    pub fn entries(&self) -> &[CaptionEntry] {
        &self.entries
    }

    pub fn get(&self, file_name: &str) -> Option<&CaptionEntry> {
        self.by_file.get(file_name).map(|&idx| &self.entries[idx])
    }

    /// Every raw caption, row by row then column by column.
    pub fn captions(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| e.captions.iter().map(|(_, c)| c.as_str()))
    }

    pub fn caption_count(&self) -> usize {
        self.entries.iter().map(|e| e.captions.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
