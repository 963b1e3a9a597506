//! Record storage.
//!
//! The pipeline only needs to enumerate a split, read one record by key,
//! write one record by key (overwrite), and commit or clear a split.
//! `FsRecordStore` keeps one JSON file per record; `MemoryRecordStore` keeps
//! serialized records in memory for in-process runs and tests.

pub mod fs;
pub mod memory;

pub use fs::FsRecordStore;
pub use memory::MemoryRecordStore;

use std::path::PathBuf;

use crate::error::Result;
use crate::record::{Record, RecordKey, Split, SplitManifest, SplitStage};
use crate::vocab::Vocabulary;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Contract for record storage backends.
///
/// Writes to distinct keys may happen concurrently from worker threads.
pub trait RecordStore: Send + Sync {
    /// Human-readable location of a split, used in errors and logs.
    fn location(&self, split: Split) -> PathBuf;

    /// All record keys of a split, sorted. Empty when the split is absent.
    fn list(&self, split: Split) -> Result<Vec<RecordKey>>;

    fn read(&self, key: &RecordKey) -> Result<Record>;

    /// Write `record` under its key, replacing any previous version.
    fn write(&self, record: &Record) -> Result<()>;

    fn manifest(&self, split: Split) -> Result<Option<SplitManifest>>;

    /// Mark the split's stage complete.
    fn commit(&self, manifest: &SplitManifest) -> Result<()>;

    /// Drop the split's manifest, then every record of the split.
    ///
    /// Called before a stage writes its first record, so a split never mixes
    /// records of two runs.
    fn invalidate(&self, split: Split) -> Result<()>;

    fn write_vocabulary(&self, split: Split, name: &str, vocabulary: &Vocabulary) -> Result<()>;

    fn read_vocabulary(&self, split: Split, name: &str) -> Result<Vocabulary>;

    /// Stage recorded in the split's manifest; `NotAssembled` without one.
    fn stage(&self, split: Split) -> Result<SplitStage> {
        Ok(self
            .manifest(split)?
            .filter(|m| m.is_current_format())
            .map(|m| m.stage)
            .unwrap_or(SplitStage::NotAssembled))
    }
}
