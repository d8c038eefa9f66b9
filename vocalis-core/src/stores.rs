//! Collaborator contracts consumed by the pipeline.
//!
//! The engine never talks to MySQL, ffmpeg or Whisper directly — it talks
//! to these traits. `vocalis-store` ships reference implementations
//! (SQLite, filesystem, ffmpeg, CLI ASR); tests inject in-memory fakes.
//!
//! Collaborator internals report failures as `anyhow::Error`; the engine
//! maps them onto the `VocalisError` taxonomy at the seam.

use crate::error::Result;
use crate::model::{
    EnrollmentSample, EnrollmentSummary, IdentityId, VerificationAttempt,
};

/// Existence check against the external identity system.
pub trait IdentityStore: Send + Sync {
    /// # Errors
    /// Returns an error only when the backing store is unreachable;
    /// an unknown identity is `Ok(false)`.
    fn exists(&self, identity_id: IdentityId) -> Result<bool>;
}

/// Blob storage for uploaded audio artifacts.
pub trait RawAudioStore: Send + Sync {
    /// Persist `bytes` and return an opaque handle. `label` is a
    /// human-readable hint (e.g. `"enrollment-42"`) implementations may
    /// fold into the handle.
    fn save(&self, bytes: &[u8], label: &str) -> Result<String>;

    /// Delete a previously saved artifact. Deleting an already-removed
    /// handle is not an error.
    fn delete(&self, handle: &str) -> Result<()>;
}

/// Transactional persistence for enrollment samples and attempt records.
///
/// Multi-row writes (sample + feature rows, attempt insert + decision
/// update) must be atomic: a failure leaves no partial rows visible.
pub trait RecordStore: Send + Sync {
    /// Number of live enrollment samples for an identity.
    fn enrollment_count(&self, identity_id: IdentityId) -> Result<usize>;

    /// Insert one enrollment sample (with features) as a single transaction.
    fn insert_enrollment(&self, sample: &EnrollmentSample) -> Result<()>;

    /// Enrollment inventory for an identity, newest first.
    fn enrollments_for(&self, identity_id: IdentityId) -> Result<Vec<EnrollmentSummary>>;

    /// Append one verification attempt as a single transaction.
    fn insert_attempt(&self, attempt: &VerificationAttempt) -> Result<()>;

    /// Recent attempts for an identity, newest first.
    fn attempts_for(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<VerificationAttempt>>;
}

/// External audio transcoder (e.g. ffmpeg) producing canonical
/// 16 kHz / mono / 16-bit PCM WAV bytes.
///
/// Implementations own their intermediate artifacts and must clean them
/// up on every exit path. The normalizer bounds the call with a timeout.
pub trait Transcoder: Send + Sync {
    fn to_canonical_pcm(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;
}
