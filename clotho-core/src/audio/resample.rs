//! Whole-file sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Dataset clips are stored at one configured rate. A `RateConverter` is
//! built per file whose native rate differs and converts the complete
//! signal in one call.

use rubato::{FastFixedIn, PolynomialDegree, ResampleError, Resampler};

use crate::error::{ClothoError, Result};

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when the rates already match.
    resampler: Option<FastFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    /// Input frames rubato consumes per call.
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `ClothoError::Config` if rubato rejects the rates.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                source_rate,
                target_rate,
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| {
                ClothoError::Config(format!(
                    "cannot resample {source_rate} Hz to {target_rate} Hz: {e}"
                ))
            })?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        Ok(Self {
            resampler: Some(resampler),
            source_rate,
            target_rate,
            chunk_size,
            output_buf,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Number of output samples `convert_all` yields for `len` input samples.
    pub fn output_len(&self, len: usize) -> usize {
        (len as u64 * u64::from(self.target_rate)).div_ceil(u64::from(self.source_rate)) as usize
    }

    /// Convert a complete signal.
    ///
    /// The last partial chunk is padded with silence and the resampler delay
    /// is trimmed, so the result holds exactly `output_len(samples.len())`
    /// samples.
    pub fn convert_all(&mut self, samples: &[f32]) -> std::result::Result<Vec<f32>, ResampleError> {
        let expected = self.output_len(samples.len());
        let chunk_size = self.chunk_size;
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };
        let delay = resampler.output_delay();

        let mut out = Vec::with_capacity(expected + delay + self.output_buf[0].len());
        let mut block = vec![0.0f32; chunk_size];
        let mut offset = 0;
        while offset < samples.len() || out.len() < expected + delay {
            let end = (offset + chunk_size).min(samples.len());
            let taken = end.saturating_sub(offset);
            if taken > 0 {
                block[..taken].copy_from_slice(&samples[offset..end]);
            }
            block[taken..].fill(0.0);
            offset = end;

            let (_, produced) =
                resampler.process_into_buffer(&[&block[..]], &mut self.output_buf, None)?;
            if produced == 0 && offset >= samples.len() {
                break;
            }
            out.extend_from_slice(&self.output_buf[0][..produced]);
        }

        out.drain(..delay.min(out.len()));
        out.resize(expected, 0.0);
        Ok(out)
    }
}
