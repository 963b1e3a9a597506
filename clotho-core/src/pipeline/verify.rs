//! Consistency check of an assembled split against its sources.
//!
//! For every caption in the annotations, the stored record must exist, carry
//! the same raw caption and the same samples as a fresh decode of its audio
//! file, and its word/character indices must decode back to the cleaned
//! caption through the split's stored vocabularies.

use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::{debug, info};

use super::workers::for_each_job;
use super::PipelineDiagnostics;
use crate::audio::AudioReader;
use crate::captions::{audio_id, Caption, CaptionEntry, CaptionOptions, CaptionTable};
use crate::error::{ClothoError, Result};
use crate::record::{RecordKey, Split};
use crate::store::RecordStore;
use crate::vocab::Vocabulary;

pub struct DatasetVerifier<'a> {
    pub reader: &'a dyn AudioReader,
    pub store: &'a dyn RecordStore,
    pub options: CaptionOptions,
    pub words_vocabulary_file_name: &'a str,
    pub characters_vocabulary_file_name: &'a str,
    pub nb_workers: usize,
    pub diagnostics: &'a PipelineDiagnostics,
}

impl DatasetVerifier<'_> {
    /// Check every record of `split`. Returns the number of records checked.
    ///
    /// # Errors
    /// `SplitNotFound` if the split is not assembled, `Verification` on the
    /// first inconsistent record.
    pub fn verify(&self, split: Split, audio_dir: &Path, table: &CaptionTable) -> Result<usize> {
        if !self.store.stage(split)?.has_raw_records() {
            return Err(ClothoError::SplitNotFound {
                split,
                path: self.store.location(split),
            });
        }

        let words = self
            .store
            .read_vocabulary(split, self.words_vocabulary_file_name)?;
        let characters = self
            .store
            .read_vocabulary(split, self.characters_vocabulary_file_name)?;

        let stored = self.store.list(split)?;
        let expected = table.caption_count();
        if stored.len() != expected {
            let key = stored
                .first()
                .cloned()
                .unwrap_or_else(|| RecordKey::new(split, "", 0));
            return Err(ClothoError::Verification {
                key,
                reason: format!(
                    "{} records stored, annotations list {expected} captions",
                    stored.len()
                ),
            });
        }

        info!(split = %split, records = expected, "verifying split");

        let jobs: Vec<&CaptionEntry> = table.entries().iter().collect();
        for_each_job(self.nb_workers, jobs, |entry| {
            self.verify_entry(split, audio_dir, entry, &words, &characters)
        })?;

        info!(split = %split, records = expected, "split verified");
        Ok(expected)
    }

    fn verify_entry(
        &self,
        split: Split,
        audio_dir: &Path,
        entry: &CaptionEntry,
        words: &Vocabulary,
        characters: &Vocabulary,
    ) -> Result<()> {
        if entry.captions.is_empty() {
            return Ok(());
        }
        let audio = self.reader.read(&audio_dir.join(&entry.file_name))?;
        let id = audio_id(&entry.file_name);

        for (ordinal, raw) in &entry.captions {
            let key = RecordKey::new(split, id.clone(), *ordinal);
            let fail = |reason: String| ClothoError::Verification {
                key: key.clone(),
                reason,
            };

            let record = self.store.read(&key)?;
            if record.file_name != entry.file_name {
                return Err(fail(format!(
                    "file name {} differs from annotations ({})",
                    record.file_name, entry.file_name
                )));
            }
            if record.caption.raw != *raw {
                return Err(fail("raw caption differs from annotations".into()));
            }

            let stored_audio = record
                .raw_audio()
                .ok_or_else(|| fail("record has no raw audio".into()))?;
            if stored_audio.samples != audio.samples {
                return Err(fail("samples differ from the audio file".into()));
            }

            let expected = Caption::new(raw, &self.options);
            if record.caption.cleaned != expected.cleaned {
                return Err(fail(format!(
                    "cleaned caption `{}` differs from `{}`",
                    record.caption.cleaned, expected.cleaned
                )));
            }
            check_indices(words, &record.word_indices, &expected.tokens, " ")
                .map_err(|r| fail(format!("word indices: {r}")))?;
            check_indices(characters, &record.char_indices, &expected.characters, "")
                .map_err(|r| fail(format!("character indices: {r}")))?;

            self.diagnostics
                .records_verified
                .fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "record verified");
        }
        Ok(())
    }
}

/// `indices` must be `<sos> tokens… <eos>` under `vocabulary`.
fn check_indices(
    vocabulary: &Vocabulary,
    indices: &[u32],
    tokens: &[String],
    separator: &str,
) -> std::result::Result<(), String> {
    if indices.first() != Some(&vocabulary.sos()) || indices.last() != Some(&vocabulary.eos()) {
        return Err("not bracketed by <sos>/<eos>".into());
    }
    let decoded = vocabulary.decode(indices).join(separator);
    let original = tokens.join(separator);
    if decoded != original {
        return Err(format!("decode to `{decoded}`, expected `{original}`"));
    }
    Ok(())
}
