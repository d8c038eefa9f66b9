//! WAV decode/encode helpers built on hound.
//!
//! Uploads arrive as whatever the browser recorded. The direct path only
//! understands RIFF/WAV; anything else goes through the external
//! transcoder. Multi-channel audio is mixed down to mono by averaging,
//! integer formats are scaled into [-1.0, 1.0].

use std::io::Cursor;

use crate::error::{Result, VocalisError};

/// Decoded mono PCM at its native sample rate.
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl DecodedPcm {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode WAV bytes to mono f32 at the file's native rate.
///
/// # Errors
/// `AudioUnreadable` when the bytes are not a decodable WAV stream or use
/// an unsupported bit depth.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedPcm> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| VocalisError::AudioUnreadable(format!("wav parse: {e}")))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(VocalisError::AudioUnreadable("wav reports zero channels".into()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav samples: {e}")))?,
        (hound::SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav samples: {e}")))?,
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav samples: {e}")))?,
        (hound::SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav samples: {e}")))?,
        (hound::SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav samples: {e}")))?,
        (format, bits) => {
            return Err(VocalisError::AudioUnreadable(format!(
                "unsupported wav format: {format:?} @ {bits} bits"
            )));
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        let frames = interleaved.len() / channels;
        let mut mono = Vec::with_capacity(frames);
        for f in 0..frames {
            let base = f * channels;
            let sum: f32 = interleaved[base..base + channels].iter().sum();
            mono.push(sum / channels as f32);
        }
        mono
    };

    Ok(DecodedPcm {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav write: {e}")))?;
        for &sample in samples {
            let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer
                .write_sample(v)
                .map_err(|e| VocalisError::AudioUnreadable(format!("wav write: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VocalisError::AudioUnreadable(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}
