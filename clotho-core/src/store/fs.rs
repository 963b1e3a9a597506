//! One JSON file per record under `<root>/<split dir>/`.
//!
//! ```text
//! <root>/
//!   <development dir>/
//!     manifest.json
//!     words_vocabulary.json
//!     <prefix><audio_id>_<ordinal>.json
//!   <evaluation dir>/
//!     …
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written record.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{RecordStore, MANIFEST_FILE_NAME};
use crate::error::{ClothoError, Result};
use crate::record::{Record, RecordKey, Split, SplitManifest};
use crate::vocab::Vocabulary;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
    development_dir: String,
    evaluation_dir: String,
    file_prefix: String,
}

impl FsRecordStore {
    pub fn new(
        root: impl Into<PathBuf>,
        development_dir: impl Into<String>,
        evaluation_dir: impl Into<String>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            development_dir: development_dir.into(),
            evaluation_dir: evaluation_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self, split: Split) -> PathBuf {
        match split {
            Split::Development => self.root.join(&self.development_dir),
            Split::Evaluation => self.root.join(&self.evaluation_dir),
        }
    }

    pub fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.split_dir(key.split).join(format!(
            "{}.{RECORD_EXTENSION}",
            key.file_stem(&self.file_prefix)
        ))
    }

    fn manifest_path(&self, split: Split) -> PathBuf {
        self.split_dir(split).join(MANIFEST_FILE_NAME)
    }

    fn vocabulary_path(&self, split: Split, name: &str) -> PathBuf {
        self.split_dir(split).join(name)
    }
}

/// Serialize `value` next to `path` and rename it into place.
fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));

    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl RecordStore for FsRecordStore {
    fn location(&self, split: Split) -> PathBuf {
        self.split_dir(split)
    }

    fn list(&self, split: Split) -> Result<Vec<RecordKey>> {
        let dir = self.split_dir(split);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_record = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s == RECORD_EXTENSION)
                .unwrap_or(false);
            if !is_record {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = RecordKey::from_file_stem(split, &self.file_prefix, stem) {
                keys.push(key);
            }
        }
        keys.sort();
        debug!(split = %split, dir = %dir.display(), records = keys.len(), "listed records");
        Ok(keys)
    }

    fn read(&self, key: &RecordKey) -> Result<Record> {
        let reader = BufReader::new(File::open(self.record_path(key))?);
        let record: Record = serde_json::from_reader(reader)?;
        if record.key() != *key {
            return Err(ClothoError::InvalidRecord {
                key: key.clone(),
                reason: format!("file holds record {}", record.key()),
            });
        }
        Ok(record)
    }

    fn write(&self, record: &Record) -> Result<()> {
        write_json_atomic(&self.record_path(&record.key()), record)
    }

    fn manifest(&self, split: Split) -> Result<Option<SplitManifest>> {
        match fs::read(self.manifest_path(split)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, manifest: &SplitManifest) -> Result<()> {
        write_json_atomic(&self.manifest_path(manifest.split), manifest)
    }

    fn invalidate(&self, split: Split) -> Result<()> {
        remove_if_present(&self.manifest_path(split))?;
        let stale = self.list(split)?;
        for key in &stale {
            remove_if_present(&self.record_path(key))?;
        }
        if !stale.is_empty() {
            debug!(split = %split, records = stale.len(), "removed previous records");
        }
        Ok(())
    }

    fn write_vocabulary(&self, split: Split, name: &str, vocabulary: &Vocabulary) -> Result<()> {
        vocabulary.save(&self.vocabulary_path(split, name))
    }

    fn read_vocabulary(&self, split: Split, name: &str) -> Result<Vocabulary> {
        Vocabulary::load(&self.vocabulary_path(split, name))
    }
}
