//! Built-in `features::log_mel_bands`: log mel-band energies.
//!
//! Pipeline per clip:
//!
//! ```text
//! samples ─► peak-normalise ─► [reflect pad] ─► window ─► FFT ─► |X|^power
//!         ─► mel filterbank ─► ln(x + ε) ─► (frames, nb_mels)
//! ```
//!
//! The filterbank uses triangular filters on the Slaney (default) or HTK mel
//! scale, optionally area-normalised.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{FeatureArgs, FeatureFunction, ParamKind, ParamSpec};
use crate::error::{ClothoError, Result};

pub const PACKAGE: &str = "features";
pub const CALLABLE: &str = "log_mel_bands";

/// Parameters accepted by `features::log_mel_bands`.
pub fn params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::required("sr", ParamKind::Int),
        ParamSpec::optional("nb_fft", ParamKind::Int, 1024),
        ParamSpec::optional("hop_size", ParamKind::Int, 512),
        ParamSpec::optional("nb_mels", ParamKind::Int, 64),
        ParamSpec::optional("f_min", ParamKind::Float, 0.0),
        ParamSpec::nullable("f_max", ParamKind::Float),
        ParamSpec::optional("htk", ParamKind::Bool, false),
        ParamSpec::optional("power", ParamKind::Float, 1.0),
        ParamSpec::optional("norm", ParamKind::Bool, true),
        ParamSpec::optional("window_function", ParamKind::Str, "hann"),
        ParamSpec::optional("center", ParamKind::Bool, true),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Hann,
    Hamming,
}

impl Window {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(Window::Hann),
            "hamming" => Ok(Window::Hamming),
            other => Err(ClothoError::Config(format!(
                "unsupported window function `{other}` (hann, hamming)"
            ))),
        }
    }

    /// Periodic window of length `n`.
    fn build(self, n: usize) -> Vec<f32> {
        let (a0, a1) = match self {
            Window::Hann => (0.5, 0.5),
            Window::Hamming => (0.54, 0.46),
        };
        (0..n)
            .map(|i| a0 - a1 * (2.0 * PI * i as f32 / n as f32).cos())
            .collect()
    }
}

/// Validated `log_mel_bands` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMelConfig {
    pub sr: u32,
    pub nb_fft: usize,
    pub hop_size: usize,
    pub nb_mels: usize,
    pub f_min: f32,
    /// Defaults to Nyquist.
    pub f_max: Option<f32>,
    pub htk: bool,
    pub power: f32,
    pub norm: bool,
    pub window: Window,
    pub center: bool,
}

impl Default for LogMelConfig {
    fn default() -> Self {
        Self {
            sr: 44_100,
            nb_fft: 1024,
            hop_size: 512,
            nb_mels: 64,
            f_min: 0.0,
            f_max: None,
            htk: false,
            power: 1.0,
            norm: true,
            window: Window::Hann,
            center: true,
        }
    }
}

pub struct LogMelBands {
    config: LogMelConfig,
    window: Vec<f32>,
    /// `[nb_mels][nb_fft / 2 + 1]`
    mel_filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl LogMelBands {
    /// # Errors
    /// `ClothoError::Config` for sizes of zero, a non-positive power, or a
    /// frequency range outside `[0, sr / 2]`.
    pub fn new(config: LogMelConfig) -> Result<Self> {
        if config.sr == 0 || config.nb_fft == 0 || config.hop_size == 0 || config.nb_mels == 0 {
            return Err(ClothoError::Config(
                "sr, nb_fft, hop_size and nb_mels must be positive".into(),
            ));
        }
        if config.power.is_nan() || config.power <= 0.0 {
            return Err(ClothoError::Config(format!(
                "power must be positive, got {}",
                config.power
            )));
        }
        let nyquist = config.sr as f32 / 2.0;
        let f_max = config.f_max.unwrap_or(nyquist);
        if config.f_min < 0.0 || f_max <= config.f_min || f_max > nyquist {
            return Err(ClothoError::Config(format!(
                "mel range [{}, {f_max}] Hz must lie within [0, {nyquist}] Hz",
                config.f_min
            )));
        }

        let window = config.window.build(config.nb_fft);
        let mel_filters = build_mel_filters(
            config.nb_fft,
            config.sr,
            config.nb_mels,
            config.f_min,
            f_max,
            config.htk,
            config.norm,
        );
        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.nb_fft);

        Ok(Self {
            config,
            window,
            mel_filters,
            fft,
        })
    }

    pub fn from_args(args: &FeatureArgs) -> Result<Self> {
        let sr = u32::try_from(args.usize("sr")?)
            .map_err(|_| ClothoError::Config("sr does not fit in 32 bits".into()))?;
        let window = Window::parse(args.opt_str("window_function")?.unwrap_or("hann"))?;

        Self::new(LogMelConfig {
            sr,
            nb_fft: args.usize("nb_fft")?,
            hop_size: args.usize("hop_size")?,
            nb_mels: args.usize("nb_mels")?,
            f_min: args.f64("f_min")? as f32,
            f_max: args.opt_f64("f_max")?.map(|f| f as f32),
            htk: args.bool("htk")?,
            power: args.f64("power")? as f32,
            norm: args.bool("norm")?,
            window,
            center: args.bool("center")?,
        })
    }

    pub fn config(&self) -> &LogMelConfig {
        &self.config
    }

    /// Number of frames produced for `len` input samples.
    pub fn frame_count(&self, len: usize) -> usize {
        let n_fft = self.config.nb_fft;
        let padded = if self.config.center { len + n_fft / 2 * 2 } else { len };
        if padded < n_fft {
            1
        } else {
            1 + (padded - n_fft) / self.config.hop_size
        }
    }
}

impl FeatureFunction for LogMelBands {
    fn extract(&self, samples: &[f32]) -> Result<Array2<f32>> {
        let n_fft = self.config.nb_fft;
        let n_freqs = n_fft / 2 + 1;
        let hop = self.config.hop_size;

        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let normalized: Vec<f32> = if peak > 0.0 {
            samples.iter().map(|s| s / peak).collect()
        } else {
            samples.to_vec()
        };

        let mut framed = if self.config.center {
            reflect_pad(&normalized, n_fft / 2)
        } else {
            normalized
        };
        if framed.len() < n_fft {
            framed.resize(n_fft, 0.0);
        }

        let n_frames = self.frame_count(samples.len());
        let mut mel = Array2::<f32>::zeros((n_frames, self.config.nb_mels));
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut spectrum = vec![0.0f32; n_freqs];

        for frame in 0..n_frames {
            let start = frame * hop;
            for (i, v) in fft_buf.iter_mut().enumerate() {
                *v = Complex::new(framed[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut fft_buf);

            for (k, s) in spectrum.iter_mut().enumerate() {
                let energy = fft_buf[k].norm_sqr();
                *s = if self.config.power == 2.0 {
                    energy
                } else {
                    energy.powf(self.config.power / 2.0)
                };
            }

            for (m, filter) in self.mel_filters.iter().enumerate() {
                let energy: f32 = filter.iter().zip(&spectrum).map(|(w, s)| w * s).sum();
                mel[[frame, m]] = energy;
            }
        }

        mel.mapv_inplace(|v| (f64::from(v) + f64::EPSILON).ln() as f32);
        Ok(mel)
    }
}

fn build_mel_filters(
    fft_size: usize,
    sr: u32,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
    htk: bool,
    norm: bool,
) -> Vec<Vec<f32>> {
    let scale = MelScale::from_htk_flag(htk);
    let n_freqs = fft_size / 2 + 1;
    let mel_min = scale.to_mel(fmin);
    let mel_max = scale.to_mel(fmax);

    let hz_pts: Vec<f32> = (0..=(n_mels + 1))
        .map(|i| scale.to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();
    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|k| k as f32 * sr as f32 / fft_size as f32)
        .collect();

    let mut filters = vec![vec![0f32; n_freqs]; n_mels];
    for (m, filter) in filters.iter_mut().enumerate() {
        let lower = hz_pts[m];
        let center = hz_pts[m + 1];
        let upper = hz_pts[m + 2];
        let down_denom = (center - lower).max(1e-10);
        let up_denom = (upper - center).max(1e-10);
        let enorm = if norm {
            2.0 / (upper - lower).max(1e-10)
        } else {
            1.0
        };

        for (w_out, &freq) in filter.iter_mut().zip(&fft_freqs) {
            let w = if freq >= lower && freq <= center {
                (freq - lower) / down_denom
            } else if freq > center && freq <= upper {
                (upper - freq) / up_denom
            } else {
                0.0
            };
            *w_out = (w * enorm).max(0.0);
        }
    }
    filters
}

/// Mirror `pad` samples onto both ends without repeating the edge sample.
///
/// Indices are folded over a period of `2 * (len - 1)`, so pads longer than
/// the signal keep bouncing between its ends.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    match samples.len() {
        _ if pad == 0 => samples.to_vec(),
        0 => vec![0.0; 2 * pad],
        1 => vec![samples[0]; 2 * pad + 1],
        len => {
            let period = 2 * (len - 1);
            (0..len + 2 * pad)
                .map(|i| {
                    // Shift by a whole number of periods to stay unsigned.
                    let folded = (i + period * pad.div_ceil(period) - pad) % period;
                    samples[folded.min(period - folded)]
                })
                .collect()
        }
    }
}

/// Mel frequency scale used to place the filterbank edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MelScale {
    /// `2595 * log10(1 + hz / 700)`.
    Htk,
    /// Linear below 1 kHz, logarithmic above (Auditory Toolbox).
    Slaney,
}

const SLANEY_HZ_PER_MEL: f32 = 200.0 / 3.0;
const SLANEY_BREAK_HZ: f32 = 1_000.0;
const SLANEY_BREAK_MEL: f32 = SLANEY_BREAK_HZ / SLANEY_HZ_PER_MEL;

fn slaney_log_step() -> f32 {
    6.4_f32.ln() / 27.0
}

impl MelScale {
    fn from_htk_flag(htk: bool) -> Self {
        if htk {
            MelScale::Htk
        } else {
            MelScale::Slaney
        }
    }

    fn to_mel(self, hz: f32) -> f32 {
        match self {
            MelScale::Htk => 2595.0 * (hz / 700.0).ln_1p() / std::f32::consts::LN_10,
            MelScale::Slaney if hz < SLANEY_BREAK_HZ => hz / SLANEY_HZ_PER_MEL,
            MelScale::Slaney => {
                SLANEY_BREAK_MEL + (hz / SLANEY_BREAK_HZ).ln() / slaney_log_step()
            }
        }
    }

    fn to_hz(self, mel: f32) -> f32 {
        match self {
            MelScale::Htk => 700.0 * (mel * std::f32::consts::LN_10 / 2595.0).exp_m1(),
            MelScale::Slaney if mel < SLANEY_BREAK_MEL => mel * SLANEY_HZ_PER_MEL,
            MelScale::Slaney => {
                SLANEY_BREAK_HZ * (slaney_log_step() * (mel - SLANEY_BREAK_MEL)).exp()
            }
        }
    }
}
