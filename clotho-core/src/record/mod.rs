//! The persisted unit: one audio clip paired with one caption.

pub mod manifest;

pub use manifest::{SplitManifest, SplitStage, MANIFEST_FORMAT_VERSION};

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::audio::clip::AudioClip;
use crate::captions::Caption;
use crate::error::{ClothoError, Result};

/// A dataset partition, processed independently end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Development,
    Evaluation,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Development, Split::Evaluation];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Development => "development",
            Split::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a record: `(split, audio id, caption ordinal)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub split: Split,
    pub audio_id: String,
    /// 1-based caption column position.
    pub ordinal: u32,
}

impl RecordKey {
    pub fn new(split: Split, audio_id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            split,
            audio_id: audio_id.into(),
            ordinal,
        }
    }

    /// File stem used by file-system stores: `<prefix><audio_id>_<ordinal>`.
    pub fn file_stem(&self, prefix: &str) -> String {
        format!("{prefix}{}_{}", self.audio_id, self.ordinal)
    }

    /// Inverse of [`RecordKey::file_stem`]. `None` for foreign file names.
    pub fn from_file_stem(split: Split, prefix: &str, stem: &str) -> Option<Self> {
        let rest = stem.strip_prefix(prefix)?;
        let (audio_id, ordinal) = rest.rsplit_once('_')?;
        if audio_id.is_empty() {
            return None;
        }
        let ordinal = ordinal.parse().ok()?;
        Some(Self::new(split, audio_id, ordinal))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.split, self.audio_id, self.ordinal)
    }
}

/// Raw samples before extraction, feature matrix after. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    RawAudio { audio: AudioClip },
    /// `(time, feature-dimension)` matrix.
    Features { features: Array2<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub split: Split,
    /// Audio file stem, e.g. `clip1` for `clip1.wav`.
    pub audio_id: String,
    pub file_name: String,
    pub caption_ordinal: u32,
    pub caption: Caption,
    /// `<sos> words… <eos>` indices into the split's word vocabulary.
    pub word_indices: Vec<u32>,
    /// `<sos> chars… <eos>` indices into the split's character vocabulary.
    pub char_indices: Vec<u32>,
    pub payload: Payload,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.split, self.audio_id.clone(), self.caption_ordinal)
    }

    pub fn stage(&self) -> SplitStage {
        match self.payload {
            Payload::RawAudio { .. } => SplitStage::Assembled,
            Payload::Features { .. } => SplitStage::FeatureExtracted,
        }
    }

    pub fn raw_audio(&self) -> Option<&AudioClip> {
        match &self.payload {
            Payload::RawAudio { audio } => Some(audio),
            Payload::Features { .. } => None,
        }
    }

    pub fn features(&self) -> Option<&Array2<f32>> {
        match &self.payload {
            Payload::Features { features } => Some(features),
            Payload::RawAudio { .. } => None,
        }
    }

    /// New record version with the raw audio replaced by `features`.
    ///
    /// # Errors
    /// `ClothoError::InvalidRecord` if this record carries no raw audio.
    pub fn with_features(&self, features: Array2<f32>) -> Result<Record> {
        if self.raw_audio().is_none() {
            return Err(ClothoError::InvalidRecord {
                key: self.key(),
                reason: "record has no raw audio".into(),
            });
        }
        Ok(Record {
            split: self.split,
            audio_id: self.audio_id.clone(),
            file_name: self.file_name.clone(),
            caption_ordinal: self.caption_ordinal,
            caption: self.caption.clone(),
            word_indices: self.word_indices.clone(),
            char_indices: self.char_indices.clone(),
            payload: Payload::Features { features },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::CaptionOptions;

    fn raw_record() -> Record {
        Record {
            split: Split::Development,
            audio_id: "clip1".into(),
            file_name: "clip1.wav".into(),
            caption_ordinal: 2,
            caption: Caption::new("a dog barks", &CaptionOptions::default()),
            word_indices: vec![3, 0, 1, 2, 4],
            char_indices: vec![],
            payload: Payload::RawAudio {
                audio: AudioClip::new(vec![0.5, -0.25, 0.125], 16_000),
            },
        }
    }

    #[test]
    fn key_round_trips_through_file_stem() {
        let key = RecordKey::new(Split::Evaluation, "forest_birds_02", 5);
        let stem = key.file_stem("clotho_file_");
        assert_eq!(stem, "clotho_file_forest_birds_02_5");
        assert_eq!(
            RecordKey::from_file_stem(Split::Evaluation, "clotho_file_", &stem),
            Some(key)
        );
    }

    #[test]
    fn foreign_file_stems_are_ignored() {
        assert_eq!(RecordKey::from_file_stem(Split::Development, "", "manifest"), None);
        assert_eq!(
            RecordKey::from_file_stem(Split::Development, "", "words_vocabulary"),
            None
        );
        assert_eq!(RecordKey::from_file_stem(Split::Development, "x_", "y_1"), None);
    }

    #[test]
    fn key_display_names_split_clip_and_ordinal() {
        let key = RecordKey::new(Split::Development, "clip1", 1);
        assert_eq!(key.to_string(), "development/clip1#1");
    }

    #[test]
    fn with_features_replaces_raw_audio() {
        let record = raw_record();
        let features = Array2::from_elem((4, 64), 1.5f32);
        let extracted = record.with_features(features.clone()).unwrap();

        assert!(extracted.raw_audio().is_none());
        assert_eq!(extracted.features(), Some(&features));
        assert_eq!(extracted.stage(), SplitStage::FeatureExtracted);
        assert_eq!(extracted.caption, record.caption);
        assert_eq!(extracted.word_indices, record.word_indices);
        assert_eq!(extracted.key(), record.key());
    }

    #[test]
    fn feature_record_cannot_be_extracted_again() {
        let extracted = raw_record()
            .with_features(Array2::zeros((1, 8)))
            .unwrap();
        let err = extracted.with_features(Array2::zeros((1, 8))).unwrap_err();
        assert!(matches!(err, ClothoError::InvalidRecord { .. }));
    }

    #[test]
    fn payload_serializes_under_its_variant_name() {
        let json = serde_json::to_value(raw_record()).unwrap();
        assert_eq!(json["payload"]["rawAudio"]["audio"]["sampleRate"], 16_000);
        assert!(json["payload"].get("features").is_none());
        assert_eq!(json["split"], "development");
        assert_eq!(json["captionOrdinal"], 2);

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, raw_record());
    }
}
