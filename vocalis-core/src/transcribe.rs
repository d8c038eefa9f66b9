//! Transcription adapter wrapping an external ASR engine.
//!
//! The engine is a black box behind [`SpeechToText`]. The adapter's one
//! job is the fail-soft contract: whatever goes wrong inside the engine
//! (error, panic-free timeout, unintelligible audio), the verification
//! path receives an *empty transcript* and moves on. A speaker who fails
//! to produce intelligible speech should be rejected by the scorer, not
//! error out of the attempt.
//!
//! Engines that stage audio through temp files must clean them up on
//! every path; the worker thread here runs the call to completion even
//! when the adapter stops waiting, so engine-side cleanup always executes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::audio::NormalizedAudio;

/// Default bound on one ASR call.
pub const DEFAULT_ASR_TIMEOUT: Duration = Duration::from_secs(30);

/// Contract for speech-to-text engines.
pub trait SpeechToText: Send + Sync {
    /// Transcribe one normalized clip.
    ///
    /// # Errors
    /// Any engine-internal failure. Callers going through
    /// [`TranscriptionAdapter`] never see it — it degrades to `""`.
    fn transcribe(&self, audio: &NormalizedAudio) -> anyhow::Result<String>;
}

/// Fail-soft, timeout-bounded wrapper around a [`SpeechToText`] engine.
pub struct TranscriptionAdapter {
    engine: Arc<dyn SpeechToText>,
    timeout: Duration,
}

impl TranscriptionAdapter {
    pub fn new(engine: Arc<dyn SpeechToText>) -> Self {
        Self {
            engine,
            timeout: DEFAULT_ASR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the engine, returning its transcript or `""` on any failure.
    pub fn transcribe_or_empty(&self, audio: &Arc<NormalizedAudio>) -> String {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let engine = Arc::clone(&self.engine);
        let audio = Arc::clone(audio);

        std::thread::spawn(move || {
            let _ = tx.send(engine.transcribe(&audio));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(text)) => {
                let text = text.trim().to_string();
                debug!(chars = text.len(), "transcription completed");
                text
            }
            Ok(Err(e)) => {
                warn!("ASR engine failed, treating as empty transcript: {e}");
                String::new()
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "ASR call timed out, treating as empty transcript");
                String::new()
            }
        }
    }
}

/// Echo-style engine returning a fixed transcript. Lets the full
/// verification pipeline be exercised end-to-end without a real ASR
/// install.
pub struct FixedTranscript(pub String);

impl SpeechToText for FixedTranscript {
    fn transcribe(&self, _audio: &NormalizedAudio) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_audio() -> Arc<NormalizedAudio> {
        Arc::new(NormalizedAudio {
            bytes: vec![0u8; 64],
            decoded: None,
            transcoded: false,
        })
    }

    #[test]
    fn fixed_transcript_passes_through_trimmed() {
        let adapter =
            TranscriptionAdapter::new(Arc::new(FixedTranscript("  hello world ".into())));
        assert_eq!(adapter.transcribe_or_empty(&dummy_audio()), "hello world");
    }

    #[test]
    fn engine_error_degrades_to_empty() {
        struct Broken;
        impl SpeechToText for Broken {
            fn transcribe(&self, _: &NormalizedAudio) -> anyhow::Result<String> {
                anyhow::bail!("model weights corrupt")
            }
        }

        let adapter = TranscriptionAdapter::new(Arc::new(Broken));
        assert_eq!(adapter.transcribe_or_empty(&dummy_audio()), "");
    }

    #[test]
    fn engine_timeout_degrades_to_empty() {
        struct Slow;
        impl SpeechToText for Slow {
            fn transcribe(&self, _: &NormalizedAudio) -> anyhow::Result<String> {
                std::thread::sleep(Duration::from_secs(5));
                Ok("too late".into())
            }
        }

        let adapter = TranscriptionAdapter::new(Arc::new(Slow))
            .with_timeout(Duration::from_millis(50));
        assert_eq!(adapter.transcribe_or_empty(&dummy_audio()), "");
    }
}
