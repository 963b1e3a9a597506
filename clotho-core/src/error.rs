use std::path::PathBuf;

use thiserror::Error;

use crate::record::{RecordKey, Split};

/// All errors produced by clotho-core.
#[derive(Debug, Error)]
pub enum ClothoError {
    #[error("split {split} has no captions to build a vocabulary from")]
    EmptyCaptionSet { split: Split },

    #[error("caption entry of split {split} references missing audio file {file_name}")]
    MissingAudioFile { split: Split, file_name: String },

    #[error("cannot resolve feature function {reference}: {reason}")]
    FeatureFunctionResolution { reference: String, reason: String },

    #[error("feature extraction failed for {key}: {reason}")]
    FeatureExtraction { key: RecordKey, reason: String },

    #[error("split {split} has not been assembled under {path}")]
    SplitNotFound { split: Split, path: PathBuf },

    #[error("split {split} under {path} holds {listed} records but its manifest commits {committed}")]
    SplitMismatch {
        split: Split,
        path: PathBuf,
        listed: usize,
        committed: usize,
    },

    #[error("annotations file {path}: {reason}")]
    Annotations { path: PathBuf, reason: String },

    #[error("cannot decode audio file {path}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("invalid record {key}: {reason}")]
    InvalidRecord { key: RecordKey, reason: String },

    #[error("verification of {key} failed: {reason}")]
    Verification { key: RecordKey, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClothoError>;
