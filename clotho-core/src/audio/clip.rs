//! Decoded audio shared between every record of one clip.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Samples sit behind an `Arc` so the records built from one audio file share
/// a single buffer instead of copying it per caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Arc<[f32]>,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Returns the duration of this clip in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when both clips point at the same sample buffer.
    pub fn shares_samples_with(&self, other: &AudioClip) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}
