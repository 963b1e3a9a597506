//! Audio reading: WAV file → mono f32 samples at the dataset rate.
//!
//! The assembler only depends on the `AudioReader` trait, so other decoders
//! (or synthetic audio in tests) can be plugged in.

pub mod clip;
pub mod resample;

use std::path::Path;

use tracing::debug;

use crate::error::{ClothoError, Result};
use clip::AudioClip;
use resample::RateConverter;

/// Input frames per resampler call when converting whole files.
const RESAMPLE_CHUNK: usize = 1024;

/// Contract for audio decoders used by the record assembler.
pub trait AudioReader: Send + Sync {
    /// Decode `path` into mono samples at a fixed rate.
    ///
    /// # Errors
    /// `ClothoError::AudioDecode` when the file cannot be decoded.
    fn read(&self, path: &Path) -> Result<AudioClip>;
}

/// `hound`-backed PCM WAV reader.
#[derive(Debug, Clone)]
pub struct WavReader {
    /// Output sample rate (Hz). Files at other rates are resampled.
    pub sample_rate: u32,
    /// Down-mix multi-channel files by averaging. When `false`, multi-channel
    /// input is rejected.
    pub to_mono: bool,
}

impl WavReader {
    pub fn new(sample_rate: u32, to_mono: bool) -> Self {
        Self {
            sample_rate,
            to_mono,
        }
    }

    fn decode_err(path: &Path, reason: impl ToString) -> ClothoError {
        ClothoError::AudioDecode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn read_interleaved(path: &Path) -> Result<(Vec<f32>, hound::WavSpec)> {
        let mut reader = hound::WavReader::open(path).map_err(|e| Self::decode_err(path, e))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Self::decode_err(path, e))?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample <= 16 {
                    reader
                        .samples::<i16>()
                        .map(|s| s.map(|v| v as f32 / 32768.0))
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| Self::decode_err(path, e))?
                } else {
                    let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| v as f32 / scale))
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map_err(|e| Self::decode_err(path, e))?
                }
            }
        };

        Ok((interleaved, spec))
    }
}

/// Average interleaved frames into one channel.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

impl AudioReader for WavReader {
    fn read(&self, path: &Path) -> Result<AudioClip> {
        let (interleaved, spec) = Self::read_interleaved(path)?;
        let channels = usize::from(spec.channels.max(1));

        if channels > 1 && !self.to_mono {
            return Err(Self::decode_err(
                path,
                format!("{channels} channels and down-mixing is disabled"),
            ));
        }

        let mono = downmix(&interleaved, channels);
        let samples = if spec.sample_rate == self.sample_rate {
            mono
        } else {
            let mut rc = RateConverter::new(spec.sample_rate, self.sample_rate, RESAMPLE_CHUNK)?;
            rc.convert_all(&mono)
                .map_err(|e| Self::decode_err(path, format!("resampling failed: {e}")))?
        };

        debug!(
            path = %path.display(),
            source_rate = spec.sample_rate,
            channels,
            samples = samples.len(),
            "audio decoded"
        );

        Ok(AudioClip::new(samples, self.sample_rate))
    }
}
