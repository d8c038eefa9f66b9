//! Audio normalization: turn an uploaded blob of unknown encoding into
//! something the rest of the pipeline can work with.
//!
//! ## Decision ladder
//!
//! 1. Empty payload → `EmptyAudio`, nothing else runs.
//! 2. Direct WAV decode at native rate → accepted as-is.
//! 3. External transcoder to canonical 16 kHz / mono / 16-bit PCM,
//!    bounded by a timeout.
//! 4. Transcoder failed or timed out → keep the original bytes with
//!    `decoded = None`. Downstream stages fail explicitly on undecoded
//!    audio; silently succeeding here would hide the real problem.
//!
//! The transcoder implementation owns its temp artifacts; the worker
//! thread holding the call keeps running past an adapter-side timeout so
//! cleanup still happens.

pub mod decode;
pub mod resample;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, VocalisError};
use crate::stores::Transcoder;

pub use decode::DecodedPcm;

/// Bound on one external transcode call.
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Canonical target for transcoded audio.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Normalizer output: the byte payload that gets persisted/fed to ASR,
/// plus decoded PCM when any decode path succeeded.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    /// Original upload, or the transcoded WAV when transcoding ran.
    pub bytes: Vec<u8>,
    /// `None` when neither direct decode nor transcoding produced PCM.
    pub decoded: Option<DecodedPcm>,
    /// Whether `bytes` came out of the external transcoder.
    pub transcoded: bool,
}

impl NormalizedAudio {
    pub fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }
}

/// Validates and canonicalizes raw uploads.
pub struct AudioNormalizer {
    transcoder: Option<Arc<dyn Transcoder>>,
    timeout: Duration,
}

impl AudioNormalizer {
    pub fn new(transcoder: Option<Arc<dyn Transcoder>>) -> Self {
        Self {
            transcoder,
            timeout: TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Normalize one uploaded payload.
    ///
    /// # Errors
    /// Only `EmptyAudio`. Every other problem degrades to an undecoded
    /// `NormalizedAudio` so the caller's downstream stages can fail with
    /// their own, more specific error kinds.
    pub fn normalize(&self, raw: Vec<u8>) -> Result<NormalizedAudio> {
        if raw.is_empty() {
            return Err(VocalisError::EmptyAudio);
        }

        match decode::decode_wav(&raw) {
            Ok(pcm) if !pcm.samples.is_empty() => {
                debug!(
                    samples = pcm.samples.len(),
                    sample_rate = pcm.sample_rate,
                    "direct decode accepted"
                );
                return Ok(NormalizedAudio {
                    bytes: raw,
                    decoded: Some(pcm),
                    transcoded: false,
                });
            }
            Ok(_) => debug!("direct decode produced zero samples, trying transcode"),
            Err(e) => debug!("direct decode failed ({e}), trying transcode"),
        }

        if let Some(transcoder) = &self.transcoder {
            match self.transcode_bounded(transcoder, &raw) {
                Ok(canonical) => match decode::decode_wav(&canonical) {
                    Ok(pcm) if !pcm.samples.is_empty() => {
                        debug!(
                            samples = pcm.samples.len(),
                            sample_rate = pcm.sample_rate,
                            "transcoded audio accepted"
                        );
                        return Ok(NormalizedAudio {
                            bytes: canonical,
                            decoded: Some(pcm),
                            transcoded: true,
                        });
                    }
                    Ok(_) => warn!("transcoder returned an empty clip"),
                    Err(e) => warn!("transcoder output not decodable: {e}"),
                },
                Err(e) => warn!("transcode failed, falling back to original bytes: {e}"),
            }
        }

        Ok(NormalizedAudio {
            bytes: raw,
            decoded: None,
            transcoded: false,
        })
    }

    /// Run the transcoder on a worker thread, bounded by `self.timeout`.
    ///
    /// On timeout the worker keeps running to completion (and drops its
    /// artifacts); only the wait here is abandoned.
    fn transcode_bounded(
        &self,
        transcoder: &Arc<dyn Transcoder>,
        raw: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let transcoder = Arc::clone(transcoder);
        let input = raw.to_vec();

        std::thread::spawn(move || {
            let _ = tx.send(transcoder.to_canonical_pcm(&input));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => anyhow::bail!("transcode timed out after {:?}", self.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTranscoder(Vec<u8>);

    impl Transcoder for FixedTranscoder {
        fn to_canonical_pcm(&self, _raw: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct HangingTranscoder;

    impl Transcoder for HangingTranscoder {
        fn to_canonical_pcm(&self, _raw: &[u8]) -> anyhow::Result<Vec<u8>> {
            std::thread::sleep(Duration::from_secs(5));
            Ok(Vec::new())
        }
    }

    fn wav_16k(samples: usize) -> Vec<u8> {
        decode::encode_wav_pcm16(&vec![0.25; samples], 16_000).unwrap()
    }

    #[test]
    fn empty_payload_is_rejected() {
        let normalizer = AudioNormalizer::new(None);
        let err = normalizer.normalize(Vec::new()).unwrap_err();
        assert!(matches!(err, VocalisError::EmptyAudio));
    }

    #[test]
    fn decodable_wav_is_accepted_as_is() {
        let normalizer = AudioNormalizer::new(None);
        let bytes = wav_16k(1600);
        let out = normalizer.normalize(bytes.clone()).unwrap();
        assert!(out.is_decoded());
        assert!(!out.transcoded);
        assert_eq!(out.bytes, bytes);
    }

    #[test]
    fn undecodable_bytes_go_through_the_transcoder() {
        let canonical = wav_16k(800);
        let normalizer = AudioNormalizer::new(Some(Arc::new(FixedTranscoder(canonical))));
        let out = normalizer.normalize(b"opus-ish garbage".to_vec()).unwrap();
        assert!(out.is_decoded());
        assert!(out.transcoded);
        assert_eq!(out.decoded.unwrap().sample_rate, 16_000);
    }

    #[test]
    fn transcoder_timeout_falls_back_to_original_bytes() {
        let normalizer = AudioNormalizer::new(Some(Arc::new(HangingTranscoder)))
            .with_timeout(Duration::from_millis(50));
        let raw = b"opus-ish garbage".to_vec();
        let out = normalizer.normalize(raw.clone()).unwrap();
        assert!(!out.is_decoded());
        assert!(!out.transcoded);
        assert_eq!(out.bytes, raw);
    }

    #[test]
    fn no_transcoder_falls_back_to_original_bytes() {
        let normalizer = AudioNormalizer::new(None);
        let raw = b"opus-ish garbage".to_vec();
        let out = normalizer.normalize(raw.clone()).unwrap();
        assert!(!out.is_decoded());
        assert_eq!(out.bytes, raw);
    }
}
