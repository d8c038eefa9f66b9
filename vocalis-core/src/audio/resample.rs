//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Uploaded clips arrive at whatever rate the client recorded (44.1 kHz
//! and 48 kHz are common). Feature extraction runs at 16 kHz.
//! `RateConverter` bridges that gap; [`convert_clip`] wraps it for the
//! offline whole-clip case, flushing the tail with zeros so short
//! utterances are not truncated.
//!
//! When source rate == target rate, `RateConverter` is a zero-copy
//! passthrough — no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{Result, VocalisError};

/// Input frame count per rubato call.
const CHUNK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Accumulation buffer — holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `VocalisError::AudioUnreadable` if rubato fails to
    /// initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VocalisError::AudioUnreadable(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block
    /// is available for rubato. Any remainder is kept for the next call.
    ///
    /// In passthrough mode (same rates), input is returned directly.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Input samples buffered but not yet resampled.
    pub fn pending(&self) -> usize {
        if self.resampler.is_some() {
            self.input_buf.len()
        } else {
            0
        }
    }

    /// Returns `true` when source rate == target rate.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample an entire clip from `source_rate` to `target_rate`.
///
/// The tail that does not fill a whole rubato chunk is flushed with
/// zeros, then the output is trimmed to the expected length so the
/// duration is preserved.
pub fn convert_clip(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let mut rc = RateConverter::new(source_rate, target_rate, CHUNK)?;
    let mut out = rc.process(samples);

    let pending = rc.pending();
    if pending > 0 {
        let flush = vec![0.0f32; CHUNK - pending];
        out.extend(rc.process(&flush));
    }

    let expected =
        (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    out.truncate(expected);
    Ok(out)
}
