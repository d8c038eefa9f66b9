//! `VocalisEngine` — top-level orchestrator for the challenge-response
//! pipeline.
//!
//! ## Attempt flow
//!
//! ```text
//! issue_challenge ──► vault (phrase from PhraseGenerator)
//!
//! verify ──► vault.validate_and_consume   (hard gate, fail-fast)
//!              └─► AudioNormalizer ─► RawAudioStore.save
//!                    └─► TranscriptionAdapter (fail-soft → "")
//!                          └─► score ─► decision
//!                                └─► RecordStore.insert_attempt (always)
//!
//! enroll ──► ceiling check ─► AudioNormalizer ─► RawAudioStore.save
//!              └─► FeatureExtractor (hard failure → artifact deleted)
//!                    └─► RecordStore.insert_enrollment (transactional)
//! ```
//!
//! Feature extraction and ASR are CPU-bound/blocking; the async `verify`
//! and `enroll` wrappers run the work through `spawn_blocking` so
//! challenge issuance and other lightweight lookups never queue behind
//! them.
//!
//! Once a challenge is consumed it stays consumed: a caller aborting
//! mid-attempt cannot resurrect it, which is exactly the property that
//! makes the challenge single-use under cancellation races.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::audio::AudioNormalizer;
use crate::challenge::{ChallengeVault, DEFAULT_TTL};
use crate::error::{Result, VocalisError};
use crate::features::{FeatureConfig, FeatureExtractor};
use crate::model::{
    new_id, Decision, EnrollOutcome, EnrollmentSample, EnrollmentSummary, IdentityId,
    IssuedChallenge, VerificationAttempt, VerifyOutcome,
};
use crate::phrase::PhraseGenerator;
use crate::score;
use crate::stores::{IdentityStore, RawAudioStore, RecordStore, Transcoder};
use crate::transcribe::{SpeechToText, TranscriptionAdapter, DEFAULT_ASR_TIMEOUT};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Challenge lifetime. Default: 300 s.
    pub challenge_ttl: Duration,
    /// Text-match acceptance threshold. Default: 0.80.
    pub text_threshold: f64,
    /// Live enrollment samples allowed per identity. Default: 5.
    pub max_enrollments: usize,
    /// Bound on one external transcode call. Default: 30 s.
    pub transcode_timeout: Duration,
    /// Bound on one ASR call. Default: 30 s.
    pub asr_timeout: Duration,
    /// Feature extraction parameters.
    pub features: FeatureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: DEFAULT_TTL,
            text_threshold: score::DEFAULT_THRESHOLD,
            max_enrollments: 5,
            transcode_timeout: crate::audio::TRANSCODE_TIMEOUT,
            asr_timeout: DEFAULT_ASR_TIMEOUT,
            features: FeatureConfig::default(),
        }
    }
}

/// External collaborators the engine is wired to.
pub struct Collaborators {
    pub identities: Arc<dyn IdentityStore>,
    pub audio: Arc<dyn RawAudioStore>,
    pub records: Arc<dyn RecordStore>,
    /// `None` disables the transcode fallback path.
    pub transcoder: Option<Arc<dyn Transcoder>>,
    pub asr: Arc<dyn SpeechToText>,
}

/// The engine. `Send + Sync`; wrap in `Arc` and share.
pub struct VocalisEngine {
    config: EngineConfig,
    identities: Arc<dyn IdentityStore>,
    audio: Arc<dyn RawAudioStore>,
    records: Arc<dyn RecordStore>,
    vault: ChallengeVault,
    phrases: PhraseGenerator,
    normalizer: AudioNormalizer,
    extractor: FeatureExtractor,
    adapter: TranscriptionAdapter,
}

impl VocalisEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let vault = ChallengeVault::new(config.challenge_ttl);
        let normalizer = AudioNormalizer::new(collaborators.transcoder)
            .with_timeout(config.transcode_timeout);
        let extractor = FeatureExtractor::new(config.features.clone());
        let adapter =
            TranscriptionAdapter::new(collaborators.asr).with_timeout(config.asr_timeout);

        Self {
            config,
            identities: collaborators.identities,
            audio: collaborators.audio,
            records: collaborators.records,
            vault,
            phrases: PhraseGenerator::new(),
            normalizer,
            extractor,
            adapter,
        }
    }

    /// Replace the phrase generator (e.g. a seeded one for tests, or one
    /// wired to the remote word service).
    pub fn with_phrase_generator(mut self, phrases: PhraseGenerator) -> Self {
        self.phrases = phrases;
        self
    }

    // ── Challenge issuance ───────────────────────────────────────────────

    /// Issue a one-time challenge for `identity_id`.
    ///
    /// # Errors
    /// `IdentityNotFound` when the identity collaborator does not know
    /// the id.
    pub fn issue_challenge(&self, identity_id: IdentityId) -> Result<IssuedChallenge> {
        if !self.identities.exists(identity_id)? {
            return Err(VocalisError::IdentityNotFound(identity_id));
        }

        let phrase = self.phrases.generate();
        let challenge = self.vault.issue(identity_id, phrase);

        Ok(IssuedChallenge {
            challenge_id: challenge.challenge_id,
            phrase: challenge.phrase,
            expires_at: challenge.expires_at,
        })
    }

    // ── Verification ─────────────────────────────────────────────────────

    /// Async wrapper: runs [`Self::verify_blocking`] on the blocking pool.
    pub async fn verify(
        self: &Arc<Self>,
        challenge_id: String,
        identity_id: IdentityId,
        raw_audio: Vec<u8>,
    ) -> Result<VerifyOutcome> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            engine.verify_blocking(&challenge_id, identity_id, raw_audio)
        })
        .await
        .map_err(|e| VocalisError::Other(anyhow::anyhow!("verify task panicked: {e}")))?
    }

    /// Run one verification attempt to completion.
    ///
    /// Challenge validation is the only precondition gate: once it
    /// passes, the attempt record is written exactly once whatever the
    /// outcome, rejection included. The verification audio artifact is
    /// deleted after the attempt on every path.
    ///
    /// # Errors
    /// Challenge-lifecycle kinds before any audio work; `EmptyAudio`
    /// for a zero-byte upload; `Storage` when the attempt record cannot
    /// be persisted.
    pub fn verify_blocking(
        &self,
        challenge_id: &str,
        identity_id: IdentityId,
        raw_audio: Vec<u8>,
    ) -> Result<VerifyOutcome> {
        // 1. Hard gate. Distinct error kinds surface directly.
        let challenge = self.vault.validate_and_consume(challenge_id, identity_id)?;

        // 2. Canonicalize and persist the upload.
        let normalized = Arc::new(self.normalizer.normalize(raw_audio)?);
        let handle = self
            .audio
            .save(&normalized.bytes, &format!("verification-{identity_id}"))?;

        let result = self.run_attempt(&challenge.phrase, challenge_id, identity_id, &normalized);

        // Verification artifacts are transient — remove on every path.
        if let Err(e) = self.audio.delete(&handle) {
            warn!(handle, "failed to delete verification audio: {e}");
        }

        result
    }

    fn run_attempt(
        &self,
        phrase: &str,
        challenge_id: &str,
        identity_id: IdentityId,
        normalized: &Arc<crate::audio::NormalizedAudio>,
    ) -> Result<VerifyOutcome> {
        // 3. Fail-soft transcription.
        let transcript = self.adapter.transcribe_or_empty(normalized);

        // 4./5. Score and decide.
        let matched = score::score(phrase, &transcript, self.config.text_threshold);
        let decision = if matched.passed {
            Decision::Accepted
        } else {
            Decision::Rejected
        };

        // 6. Audit record — written exactly once, rejected included.
        let attempt = VerificationAttempt {
            attempt_id: new_id("att"),
            identity_id,
            challenge_id: challenge_id.to_string(),
            phrase_used: phrase.to_string(),
            transcript: transcript.clone(),
            text_score: matched.similarity,
            text_passed: matched.passed,
            biometric_score: None, // reserved, never computed here
            final_decision: decision,
            timestamp: Utc::now(),
        };
        self.records.insert_attempt(&attempt)?;

        info!(
            attempt_id = %attempt.attempt_id,
            identity_id,
            decision = decision.as_str(),
            similarity = matched.similarity,
            "verification attempt recorded"
        );

        Ok(VerifyOutcome {
            decision,
            similarity: matched.similarity,
            transcript,
            attempt_id: attempt.attempt_id,
        })
    }

    // ── Enrollment ───────────────────────────────────────────────────────

    /// Async wrapper: runs [`Self::enroll_blocking`] on the blocking pool.
    pub async fn enroll(
        self: &Arc<Self>,
        identity_id: IdentityId,
        raw_audio: Vec<u8>,
        sample_index: usize,
    ) -> Result<EnrollOutcome> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            engine.enroll_blocking(identity_id, raw_audio, sample_index)
        })
        .await
        .map_err(|e| VocalisError::Other(anyhow::anyhow!("enroll task panicked: {e}")))?
    }

    /// Enroll one voice sample for `identity_id`.
    ///
    /// On feature-extraction failure the persisted raw-audio artifact is
    /// deleted — no orphaned blob without a matching feature record —
    /// and the failure propagates with the sample index attached.
    ///
    /// # Errors
    /// `IdentityNotFound`, `EnrollmentLimitReached`, `EmptyAudio`,
    /// `FeatureExtraction`, `Storage`.
    pub fn enroll_blocking(
        &self,
        identity_id: IdentityId,
        raw_audio: Vec<u8>,
        sample_index: usize,
    ) -> Result<EnrollOutcome> {
        if !self.identities.exists(identity_id)? {
            return Err(VocalisError::IdentityNotFound(identity_id));
        }

        let count = self.records.enrollment_count(identity_id)?;
        if count >= self.config.max_enrollments {
            return Err(VocalisError::EnrollmentLimitReached {
                identity_id,
                limit: self.config.max_enrollments,
            });
        }

        let normalized = self.normalizer.normalize(raw_audio)?;
        let handle = self
            .audio
            .save(&normalized.bytes, &format!("enrollment-{identity_id}"))?;

        let features = match self.extractor.extract(&normalized) {
            Ok(f) => f,
            Err(e) => {
                if let Err(del) = self.audio.delete(&handle) {
                    warn!(handle, "failed to delete orphaned enrollment audio: {del}");
                }
                return Err(VocalisError::FeatureExtraction(format!(
                    "sample {sample_index}: {e}"
                )));
            }
        };

        let sample = EnrollmentSample {
            sample_id: new_id("enr"),
            identity_id,
            raw_audio_ref: handle.clone(),
            features,
            created_at: Utc::now(),
        };

        if let Err(e) = self.records.insert_enrollment(&sample) {
            if let Err(del) = self.audio.delete(&handle) {
                warn!(handle, "failed to delete orphaned enrollment audio: {del}");
            }
            return Err(e);
        }

        let shape = sample.features.shape();
        info!(
            sample_id = %sample.sample_id,
            identity_id,
            sample_index,
            rows = shape.0,
            frames = shape.1,
            "enrollment sample stored"
        );

        Ok(EnrollOutcome {
            sample_id: sample.sample_id,
            feature_shape: shape,
            duration_secs: sample.features.duration_secs,
        })
    }

    // ── Audit views ──────────────────────────────────────────────────────

    /// Recent verification attempts for an identity, newest first.
    pub fn attempts(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<VerificationAttempt>> {
        self.records.attempts_for(identity_id, limit)
    }

    /// Enrollment inventory for an identity.
    pub fn enrollments(&self, identity_id: IdentityId) -> Result<Vec<EnrollmentSummary>> {
        self.records.enrollments_for(identity_id)
    }

    /// How many more samples the identity may enroll.
    pub fn remaining_enrollments(&self, identity_id: IdentityId) -> Result<usize> {
        let count = self.records.enrollment_count(identity_id)?;
        Ok(self.config.max_enrollments.saturating_sub(count))
    }
}
