//! Acoustic feature extraction for enrollment: MFCCs with temporal
//! derivatives.
//!
//! ## Pipeline
//!
//! ```text
//! NormalizedAudio ─► resample to 16 kHz ─► zero-pad to ≥ 1600 samples
//!        ─► pre-emphasis ─► centered STFT (Hann, reflect pad)
//!        ─► mel filterbank (40) ─► log ─► DCT-II → 13 MFCCs/frame
//!        ─► Δ, ΔΔ when frames > 1 → (39, frames)
//! ```
//!
//! Short clips are padded, never rejected. Every decode or compute
//! failure surfaces as `FeatureExtraction` — this module never fabricates
//! placeholder features to keep a caller happy; a synthetic matrix stored
//! as a real voice profile would poison later biometric comparison.

mod mel;

use std::sync::Arc;

use ndarray::{s, Array2};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use crate::audio::{resample, NormalizedAudio};
use crate::error::{Result, VocalisError};
use crate::model::FeatureSet;

/// Extraction parameters. Defaults match the enrollment corpus format.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Rate all analysis runs at (Hz). Input at other rates is resampled.
    pub sample_rate: u32,
    /// Cepstral coefficients per frame.
    pub n_mfcc: usize,
    pub fft_size: usize,
    pub hop_length: usize,
    pub mel_bands: usize,
    /// First-order pre-emphasis coefficient.
    pub pre_emphasis: f32,
    /// Clips shorter than this many samples are zero-padded up to it.
    pub min_samples: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_mfcc: 13,
            fft_size: 2048,
            hop_length: 512,
            mel_bands: 40,
            pre_emphasis: 0.97,
            min_samples: 1600, // 0.1 s at 16 kHz
        }
    }
}

/// MFCC feature extractor with precomputed window, filterbank, DCT basis
/// and FFT plan. Cheap to share behind an `Arc`.
pub struct FeatureExtractor {
    config: FeatureConfig,
    hann: Vec<f32>,
    mel_filters: Vec<Vec<f32>>,
    dct: Vec<Vec<f32>>,
    fft: Arc<dyn rustfft::Fft<f32>>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let hann = mel::build_hann_window(config.fft_size);
        let nyquist = config.sample_rate as f32 / 2.0;
        let mel_filters = mel::build_mel_filters(
            config.fft_size,
            config.sample_rate,
            config.mel_bands,
            0.0,
            nyquist,
        );
        let dct = mel::build_dct_basis(config.n_mfcc, config.mel_bands);
        let fft = Arc::from(FftPlanner::<f32>::new().plan_fft_forward(config.fft_size));

        Self {
            config,
            hann,
            mel_filters,
            dct,
            fft,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract the feature matrix for one normalized clip.
    ///
    /// # Errors
    /// `FeatureExtraction` when the audio never decoded or resampling
    /// fails. Short audio is not an error.
    pub fn extract(&self, audio: &NormalizedAudio) -> Result<FeatureSet> {
        let pcm = audio.decoded.as_ref().ok_or_else(|| {
            VocalisError::FeatureExtraction("audio could not be decoded".into())
        })?;

        let mut samples = if pcm.sample_rate == self.config.sample_rate {
            pcm.samples.clone()
        } else {
            resample::convert_clip(&pcm.samples, pcm.sample_rate, self.config.sample_rate)
                .map_err(|e| VocalisError::FeatureExtraction(format!("resample: {e}")))?
        };

        // Pad, never reject: a 50 ms clip still yields a valid (if thin)
        // feature matrix.
        if samples.len() < self.config.min_samples {
            debug!(
                samples = samples.len(),
                min = self.config.min_samples,
                "padding short clip"
            );
            samples.resize(self.config.min_samples, 0.0);
        }

        let duration_secs = samples.len() as f64 / self.config.sample_rate as f64;

        let emphasized = pre_emphasize(&samples, self.config.pre_emphasis);
        let mfcc = self.mfcc(&emphasized);
        let frame_count = mfcc.shape()[1];

        let matrix = if frame_count > 1 {
            let delta = temporal_delta(&mfcc);
            let delta2 = temporal_delta(&delta);
            let mut stacked =
                Array2::<f32>::zeros((self.config.n_mfcc * 3, frame_count));
            stacked
                .slice_mut(s![0..self.config.n_mfcc, ..])
                .assign(&mfcc);
            stacked
                .slice_mut(s![self.config.n_mfcc..self.config.n_mfcc * 2, ..])
                .assign(&delta);
            stacked
                .slice_mut(s![self.config.n_mfcc * 2.., ..])
                .assign(&delta2);
            stacked
        } else {
            mfcc
        };

        debug!(
            rows = matrix.shape()[0],
            frames = frame_count,
            duration_secs,
            "features extracted"
        );

        Ok(FeatureSet {
            matrix,
            duration_secs,
            sample_rate: self.config.sample_rate,
            frame_count,
        })
    }

    /// Centered STFT → mel energies → log → DCT. Returns (n_mfcc, frames).
    fn mfcc(&self, samples: &[f32]) -> Array2<f32> {
        let fft_size = self.config.fft_size;
        let hop = self.config.hop_length;
        let n_freqs = fft_size / 2 + 1;

        let centered = mel::reflect_pad(samples, fft_size / 2);
        let frames = 1 + samples.len() / hop;

        let mut out = Array2::<f32>::zeros((self.config.n_mfcc, frames));
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); fft_size];
        let mut mel_energies = vec![0f32; self.config.mel_bands];

        for frame in 0..frames {
            let start = frame * hop;

            for (i, v) in fft_buf.iter_mut().enumerate() {
                *v = Complex::new(centered[start + i] * self.hann[i], 0.0);
            }
            self.fft.process(&mut fft_buf);

            for (m, energy) in mel_energies.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for k in 0..n_freqs {
                    acc += self.mel_filters[m][k] * fft_buf[k].norm_sqr();
                }
                *energy = acc.max(1e-10).log10() * 10.0;
            }

            for (k, basis_row) in self.dct.iter().enumerate() {
                let coeff: f32 = basis_row
                    .iter()
                    .zip(&mel_energies)
                    .map(|(b, e)| b * e)
                    .sum();
                out[[k, frame]] = coeff;
            }
        }

        out
    }
}

/// `y'[0] = y[0]; y'[n] = y[n] − α·y[n−1]`.
fn pre_emphasize(samples: &[f32], alpha: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0f32;
    for (i, &s) in samples.iter().enumerate() {
        if i == 0 {
            out.push(s);
        } else {
            out.push(s - alpha * prev);
        }
        prev = s;
    }
    out
}

/// Regression-based temporal derivative with a ±2 frame window; indices
/// past the edges clamp to the first/last frame.
fn temporal_delta(features: &Array2<f32>) -> Array2<f32> {
    const WINDOW: isize = 2;
    let (rows, frames) = (features.shape()[0], features.shape()[1]);
    let denom: f32 = 2.0 * (1..=WINDOW).map(|n| (n * n) as f32).sum::<f32>();

    let clamp = |t: isize| -> usize { t.clamp(0, frames as isize - 1) as usize };

    let mut out = Array2::<f32>::zeros((rows, frames));
    for r in 0..rows {
        for t in 0..frames as isize {
            let mut acc = 0.0f32;
            for n in 1..=WINDOW {
                acc += n as f32
                    * (features[[r, clamp(t + n)]] - features[[r, clamp(t - n)]]);
            }
            out[[r, t as usize]] = acc / denom;
        }
    }
    out
}
