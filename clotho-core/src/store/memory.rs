//! In-memory store. Records are kept serialized so reads behave like the
//! file-system store (fresh buffers, same JSON layout).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use parking_lot::Mutex;

use super::RecordStore;
use crate::error::{ClothoError, Result};
use crate::record::{Record, RecordKey, Split, SplitManifest};
use crate::vocab::Vocabulary;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    name: String,
    records: Mutex<BTreeMap<RecordKey, Vec<u8>>>,
    manifests: Mutex<HashMap<Split, SplitManifest>>,
    vocabularies: Mutex<HashMap<(Split, String), Vocabulary>>,
}

impl MemoryRecordStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Serialized bytes of a stored record.
    pub fn raw_bytes(&self, key: &RecordKey) -> Option<Vec<u8>> {
        self.records.lock().get(key).cloned()
    }
}

impl RecordStore for MemoryRecordStore {
    fn location(&self, split: Split) -> PathBuf {
        PathBuf::from(format!("memory://{}/{split}", self.name))
    }

    fn list(&self, split: Split) -> Result<Vec<RecordKey>> {
        Ok(self
            .records
            .lock()
            .keys()
            .filter(|k| k.split == split)
            .cloned()
            .collect())
    }

    fn read(&self, key: &RecordKey) -> Result<Record> {
        let bytes = self.records.lock().get(key).cloned().ok_or_else(|| {
            ClothoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no record {key} in {}", self.location(key.split).display()),
            ))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write(&self, record: &Record) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.records.lock().insert(record.key(), bytes);
        Ok(())
    }

    fn manifest(&self, split: Split) -> Result<Option<SplitManifest>> {
        Ok(self.manifests.lock().get(&split).cloned())
    }

    fn commit(&self, manifest: &SplitManifest) -> Result<()> {
        self.manifests
            .lock()
            .insert(manifest.split, manifest.clone());
        Ok(())
    }

    fn invalidate(&self, split: Split) -> Result<()> {
        self.manifests.lock().remove(&split);
        self.records.lock().retain(|key, _| key.split != split);
        Ok(())
    }

    fn write_vocabulary(&self, split: Split, name: &str, vocabulary: &Vocabulary) -> Result<()> {
        self.vocabularies
            .lock()
            .insert((split, name.to_string()), vocabulary.clone());
        Ok(())
    }

    fn read_vocabulary(&self, split: Split, name: &str) -> Result<Vocabulary> {
        self.vocabularies
            .lock()
            .get(&(split, name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ClothoError::Config(format!("no vocabulary {name} for split {split}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clip::AudioClip;
    use crate::captions::{Caption, CaptionOptions};
    use crate::record::{Payload, SplitStage};

    fn record(split: Split, audio_id: &str, ordinal: u32) -> Record {
        Record {
            split,
            audio_id: audio_id.into(),
            file_name: format!("{audio_id}.wav"),
            caption_ordinal: ordinal,
            caption: Caption::new("a bell rings", &CaptionOptions::default()),
            word_indices: vec![3, 0, 1, 2, 4],
            char_indices: vec![],
            payload: Payload::RawAudio {
                audio: AudioClip::new(vec![0.1, 0.2], 16_000),
            },
        }
    }

    #[test]
    fn list_filters_by_split() {
        let store = MemoryRecordStore::new("raw");
        store.write(&record(Split::Development, "a", 1)).unwrap();
        store.write(&record(Split::Evaluation, "b", 1)).unwrap();
        store.write(&record(Split::Development, "a", 2)).unwrap();

        let keys = store.list(Split::Development).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.split == Split::Development));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn read_returns_a_fresh_copy() {
        let store = MemoryRecordStore::new("raw");
        let rec = record(Split::Development, "a", 1);
        store.write(&rec).unwrap();
        assert_eq!(store.read(&rec.key()).unwrap(), rec);
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = MemoryRecordStore::new("raw");
        let err = store
            .read(&RecordKey::new(Split::Evaluation, "nope", 1))
            .unwrap_err();
        assert!(matches!(err, ClothoError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn manifest_drives_stage() {
        let store = MemoryRecordStore::new("raw");
        assert_eq!(store.stage(Split::Development).unwrap(), SplitStage::NotAssembled);
        store.commit(&SplitManifest::assembled(Split::Development, 1)).unwrap();
        assert_eq!(store.stage(Split::Development).unwrap(), SplitStage::Assembled);
        store.invalidate(Split::Development).unwrap();
        assert_eq!(store.stage(Split::Development).unwrap(), SplitStage::NotAssembled);
    }

    #[test]
    fn invalidate_drops_records_of_the_split() {
        let store = MemoryRecordStore::new("raw");
        store.write(&record(Split::Development, "a", 1)).unwrap();
        store.write(&record(Split::Evaluation, "b", 1)).unwrap();
        store.invalidate(Split::Development).unwrap();
        assert!(store.list(Split::Development).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }
}
