use thiserror::Error;

use crate::model::IdentityId;

/// All errors produced by vocalis-core.
///
/// Challenge-lifecycle failures are deliberately split into distinct
/// variants so callers can react per kind (expired challenges get purged,
/// consumed ones get reported as replay, etc.) instead of string-sniffing.
#[derive(Debug, Error)]
pub enum VocalisError {
    #[error("identity not found: {0}")]
    IdentityNotFound(IdentityId),

    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("challenge already consumed: {0}")]
    ChallengeConsumed(String),

    #[error("challenge expired: {0}")]
    ChallengeExpired(String),

    #[error("challenge {challenge_id} was issued to a different identity")]
    OwnerMismatch { challenge_id: String },

    #[error("audio payload is empty")]
    EmptyAudio,

    #[error("audio unreadable: {0}")]
    AudioUnreadable(String),

    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("enrollment limit reached: {limit} samples already stored for identity {identity_id}")]
    EnrollmentLimitReached {
        identity_id: IdentityId,
        limit: usize,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VocalisError>;
