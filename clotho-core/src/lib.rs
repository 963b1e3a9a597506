//! # clotho-core
//!
//! Audio-captioning dataset preparation: turns audio clips plus CSV caption
//! annotations into one serialized record per (clip, caption) pair, then
//! replaces the raw samples of every record with a feature matrix.
//!
//! ## Architecture
//!
//! ```text
//! captions CSV ─► CaptionTable ─► Vocabulary (words, characters)
//!                                       │
//! WAV files ─► AudioReader ─► RecordAssembler ─► RecordStore (raw stage)
//!                                                     │
//!                       FeatureRegistry::resolve ─► FeatureOrchestrator
//!                                                     │
//!                                              RecordStore (feature stage)
//! ```
//!
//! `SplitCoordinator` runs the stages per split. Each stage drops the
//! split's manifest when it starts and commits a new one after its last
//! record, so only completed splits are ever marked as such.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod captions;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod vocab;

// Convenience re-exports for downstream crates
pub use audio::{clip::AudioClip, AudioReader, WavReader};
pub use captions::{Caption, CaptionOptions, CaptionTable};
pub use config::{DatasetSettings, FeatureSettings};
pub use error::{ClothoError, Result};
pub use features::{FeatureExtractor, FeatureFunction, FeatureRef, FeatureRegistry};
pub use pipeline::{
    CoordinatorConfig, PipelineDiagnostics, RunReport, SplitCoordinator, SplitReport,
    SplitSource, Workflow,
};
pub use record::{Payload, Record, RecordKey, Split, SplitManifest, SplitStage};
pub use store::{FsRecordStore, MemoryRecordStore, RecordStore};
pub use vocab::Vocabulary;
