//! Record assembly: audio files × caption table → raw-audio records.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::workers::for_each_job;
use super::PipelineDiagnostics;
use crate::audio::AudioReader;
use crate::captions::{audio_id, Caption, CaptionEntry, CaptionOptions, CaptionTable};
use crate::error::{ClothoError, Result};
use crate::record::{Payload, Record, RecordKey, Split, SplitManifest};
use crate::store::RecordStore;
use crate::vocab::Vocabulary;

/// Word and character vocabularies of one split.
#[derive(Debug, Clone)]
pub struct SplitVocabularies {
    pub words: Arc<Vocabulary>,
    pub characters: Arc<Vocabulary>,
}

impl SplitVocabularies {
    /// Build both vocabularies from every caption of `table`.
    ///
    /// # Errors
    /// `ClothoError::EmptyCaptionSet` when the table yields no tokens.
    pub fn build(split: Split, table: &CaptionTable, options: &CaptionOptions) -> Result<Self> {
        let captions: Vec<Caption> = table
            .captions()
            .map(|raw| Caption::new(raw, options))
            .collect();

        let words = Vocabulary::build_counting(
            split,
            captions.iter().map(|c| c.tokens.iter()),
            options.use_unique_words_per_caption,
        )?;
        let characters = Vocabulary::build(split, captions.iter().map(|c| c.characters.iter()))?;

        info!(
            split = %split,
            captions = captions.len(),
            words = words.len(),
            characters = characters.len(),
            "vocabularies built"
        );

        Ok(Self {
            words: Arc::new(words),
            characters: Arc::new(characters),
        })
    }
}

/// Keys of the records written by one assembly run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSplit {
    pub split: Split,
    /// Sorted.
    pub keys: Vec<RecordKey>,
}

impl AssembledSplit {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub struct RecordAssembler<'a> {
    pub reader: &'a dyn AudioReader,
    pub store: &'a dyn RecordStore,
    pub options: CaptionOptions,
    pub words_vocabulary_file_name: &'a str,
    pub characters_vocabulary_file_name: &'a str,
    pub nb_workers: usize,
    pub diagnostics: &'a PipelineDiagnostics,
}

impl RecordAssembler<'_> {
    /// Assemble every captioned audio file of `audio_dir` into records.
    ///
    /// Nothing is written unless every table entry has its audio file. The
    /// split manifest is dropped first and committed after the last record.
    ///
    /// # Errors
    /// `MissingAudioFile` before any write; `AudioDecode`, `Io` or `Json`
    /// while writing, in which case the split is left without a manifest.
    pub fn assemble(
        &self,
        split: Split,
        audio_dir: &Path,
        table: &CaptionTable,
        vocabularies: &SplitVocabularies,
    ) -> Result<AssembledSplit> {
        let missing = table
            .entries()
            .iter()
            .find(|e| !audio_dir.join(&e.file_name).is_file());
        if let Some(entry) = missing {
            return Err(ClothoError::MissingAudioFile {
                split,
                file_name: entry.file_name.clone(),
            });
        }

        for skipped in uncaptioned_files(audio_dir, table)? {
            debug!(split = %split, file = %skipped.display(), "no captions, skipping");
            self.diagnostics
                .audio_files_skipped
                .fetch_add(1, Ordering::Relaxed);
        }

        let mut keys: Vec<RecordKey> = table
            .entries()
            .iter()
            .flat_map(|e| {
                let id = audio_id(&e.file_name);
                e.captions
                    .iter()
                    .map(move |(ordinal, _)| RecordKey::new(split, id.clone(), *ordinal))
            })
            .collect();
        keys.sort();

        self.store.invalidate(split)?;
        self.store
            .write_vocabulary(split, self.words_vocabulary_file_name, &vocabularies.words)?;
        self.store.write_vocabulary(
            split,
            self.characters_vocabulary_file_name,
            &vocabularies.characters,
        )?;

        info!(
            split = %split,
            files = table.len(),
            records = keys.len(),
            location = %self.store.location(split).display(),
            "assembling split"
        );

        let jobs: Vec<&CaptionEntry> = table.entries().iter().collect();
        for_each_job(self.nb_workers, jobs, |entry| {
            self.assemble_entry(split, audio_dir, entry, vocabularies)
        })?;

        self.store
            .commit(&SplitManifest::assembled(split, keys.len()))?;
        info!(split = %split, records = keys.len(), "split assembled");

        Ok(AssembledSplit { split, keys })
    }

    fn assemble_entry(
        &self,
        split: Split,
        audio_dir: &Path,
        entry: &CaptionEntry,
        vocabularies: &SplitVocabularies,
    ) -> Result<()> {
        if entry.captions.is_empty() {
            warn!(split = %split, file = %entry.file_name, "all caption cells empty");
            return Ok(());
        }

        let audio = self.reader.read(&audio_dir.join(&entry.file_name))?;
        self.diagnostics
            .audio_files_read
            .fetch_add(1, Ordering::Relaxed);
        let id = audio_id(&entry.file_name);

        for (ordinal, raw) in &entry.captions {
            let caption = Caption::new(raw, &self.options);
            let record = Record {
                split,
                audio_id: id.clone(),
                file_name: entry.file_name.clone(),
                caption_ordinal: *ordinal,
                word_indices: vocabularies.words.encode(&caption.tokens),
                char_indices: vocabularies.characters.encode(&caption.characters),
                caption,
                payload: Payload::RawAudio {
                    audio: audio.clone(),
                },
            };
            self.store.write(&record)?;
            self.diagnostics
                .records_assembled
                .fetch_add(1, Ordering::Relaxed);
            debug!(key = %record.key(), "record written");
        }
        Ok(())
    }
}

/// Files in `audio_dir` with no caption-table entry.
fn uncaptioned_files(audio_dir: &Path, table: &CaptionTable) -> Result<Vec<PathBuf>> {
    let listed: HashSet<&str> = table.entries().iter().map(|e| e.file_name.as_str()).collect();
    let mut skipped = Vec::new();
    for entry in fs::read_dir(audio_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if !listed.contains(name.to_string_lossy().as_ref()) {
            skipped.push(entry.path());
        }
    }
    skipped.sort();
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::AudioClip;
    use crate::store::MemoryRecordStore;

    /// Reader returning a fixed clip for every path, counting calls.
    struct FixedReader(std::sync::atomic::AtomicUsize);

    impl AudioReader for FixedReader {
        fn read(&self, _path: &Path) -> Result<AudioClip> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(AudioClip::new(vec![0.25, -0.5, 0.75], 16_000))
        }
    }

    fn table() -> CaptionTable {
        CaptionTable::from_entries(vec![
            CaptionEntry {
                file_name: "clip1.wav".into(),
                captions: vec![(1, "a dog barks".into()), (2, "a dog is barking".into())],
            },
            CaptionEntry {
                file_name: "rain.wav".into(),
                captions: vec![(1, "Rain falls.".into())],
            },
        ])
        .unwrap()
    }

    fn audio_dir(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            std::fs::write(dir.path().join(f), b"").unwrap();
        }
        dir
    }

    fn run(
        store: &MemoryRecordStore,
        dir: &Path,
        nb_workers: usize,
    ) -> (Result<AssembledSplit>, PipelineDiagnostics, usize) {
        let reader = FixedReader(Default::default());
        let diagnostics = PipelineDiagnostics::default();
        let options = CaptionOptions::default();
        let table = table();
        let vocabularies = SplitVocabularies::build(Split::Development, &table, &options).unwrap();
        let assembler = RecordAssembler {
            reader: &reader,
            store,
            options,
            words_vocabulary_file_name: "words.json",
            characters_vocabulary_file_name: "chars.json",
            nb_workers,
            diagnostics: &diagnostics,
        };
        let result = assembler.assemble(Split::Development, dir, &table, &vocabularies);
        let reads = reader.0.load(Ordering::Relaxed);
        (result, diagnostics, reads)
    }

    #[test]
    fn one_record_per_caption_sharing_audio() {
        let dir = audio_dir(&["clip1.wav", "rain.wav"]);
        let store = MemoryRecordStore::new("raw");
        let (result, _, reads) = run(&store, dir.path(), 2);
        let assembled = result.unwrap();

        assert_eq!(assembled.len(), 3);
        assert_eq!(reads, 2, "each audio file is decoded once");

        let first = store.read(&RecordKey::new(Split::Development, "clip1", 1)).unwrap();
        let second = store.read(&RecordKey::new(Split::Development, "clip1", 2)).unwrap();
        assert_eq!(first.raw_audio(), second.raw_audio());
        assert_eq!(first.caption.cleaned, "a dog barks");
        assert_eq!(second.caption.cleaned, "a dog is barking");
        assert_eq!(store.stage(Split::Development).unwrap(), crate::record::SplitStage::Assembled);
    }

    #[test]
    fn indices_are_bracketed_by_markers() {
        let dir = audio_dir(&["clip1.wav", "rain.wav"]);
        let store = MemoryRecordStore::new("raw");
        run(&store, dir.path(), 1).0.unwrap();

        let words = store.read_vocabulary(Split::Development, "words.json").unwrap();
        let rec = store.read(&RecordKey::new(Split::Development, "rain", 1)).unwrap();
        assert_eq!(rec.word_indices.first(), Some(&words.sos()));
        assert_eq!(rec.word_indices.last(), Some(&words.eos()));
        assert_eq!(words.decode(&rec.word_indices), vec!["rain", "falls"]);
    }

    #[test]
    fn missing_audio_writes_nothing() {
        let dir = audio_dir(&["clip1.wav"]);
        let store = MemoryRecordStore::new("raw");
        let (result, _, reads) = run(&store, dir.path(), 2);

        match result.unwrap_err() {
            ClothoError::MissingAudioFile { split, file_name } => {
                assert_eq!(split, Split::Development);
                assert_eq!(file_name, "rain.wav");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reads, 0);
        assert!(store.is_empty());
        assert!(store.manifest(Split::Development).unwrap().is_none());
    }

    #[test]
    fn uncaptioned_audio_is_skipped() {
        let dir = audio_dir(&["clip1.wav", "rain.wav", "extra.wav"]);
        let store = MemoryRecordStore::new("raw");
        let (result, diagnostics, _) = run(&store, dir.path(), 1);

        assert_eq!(result.unwrap().len(), 3);
        let snap = diagnostics.snapshot();
        assert_eq!(snap.audio_files_skipped, 1);
        assert_eq!(snap.records_assembled, 3);
    }
}
