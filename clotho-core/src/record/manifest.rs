//! Per-split commit marker.
//!
//! A split directory is authoritative only once its manifest exists. The
//! manifest is removed when a stage run starts and written after the last
//! record of that stage, so an aborted run leaves no manifest behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Split;

/// Bumped whenever the record layout changes.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Pipeline state of one split.
///
/// ```text
/// NotAssembled ──assemble──► Assembled ──extract──► FeatureExtracted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStage {
    NotAssembled,
    Assembled,
    FeatureExtracted,
}

impl SplitStage {
    /// Whether raw-audio records can be read for this split.
    pub fn has_raw_records(self) -> bool {
        self == SplitStage::Assembled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitManifest {
    pub split: Split,
    pub stage: SplitStage,
    pub records: usize,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// `package::callable` of the feature function, feature stage only.
    pub feature_function: Option<String>,
    /// Feature dimension, feature stage only.
    pub feature_columns: Option<usize>,
}

impl SplitManifest {
    pub fn assembled(split: Split, records: usize) -> Self {
        Self {
            split,
            stage: SplitStage::Assembled,
            records,
            format_version: MANIFEST_FORMAT_VERSION,
            created_at: Utc::now(),
            feature_function: None,
            feature_columns: None,
        }
    }

    pub fn extracted(
        split: Split,
        records: usize,
        feature_function: String,
        feature_columns: Option<usize>,
    ) -> Self {
        Self {
            split,
            stage: SplitStage::FeatureExtracted,
            records,
            format_version: MANIFEST_FORMAT_VERSION,
            created_at: Utc::now(),
            feature_function: Some(feature_function),
            feature_columns,
        }
    }

    pub fn is_current_format(&self) -> bool {
        self.format_version == MANIFEST_FORMAT_VERSION
    }
}
