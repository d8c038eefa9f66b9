//! Core data model: challenges, enrollment samples, verification attempts.
//!
//! `EnrollmentSample` and `VerificationAttempt` are persistence records —
//! attempts are append-only, samples are immutable once written (superseded
//! samples get deleted, never mutated). `Challenge` lives only in the
//! transient vault.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Opaque identity reference. Identities themselves are owned by an
/// external identity collaborator; the pipeline only checks existence.
pub type IdentityId = i64;

/// A one-time spoken challenge issued to an identity.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub challenge_id: String,
    pub identity_id: IdentityId,
    pub phrase: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Flips exactly once, under the vault lock.
    pub consumed: bool,
}

/// What `issue_challenge` hands back to the caller. The phrase is shown to
/// the speaker; the id is echoed back with the recorded audio.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedChallenge {
    pub challenge_id: String,
    pub phrase: String,
    pub expires_at: DateTime<Utc>,
}

/// MFCC-based acoustic features for one utterance.
///
/// `matrix` is (13, frames) for single-frame clips and (39, frames) once
/// delta and delta-delta rows are stacked on.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub matrix: Array2<f32>,
    /// Duration of the (possibly zero-padded) audio in seconds.
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub frame_count: usize,
}

impl FeatureSet {
    /// (rows, frames) of the feature matrix.
    pub fn shape(&self) -> (usize, usize) {
        let s = self.matrix.shape();
        (s[0], s[1])
    }

    /// Row-major copy for JSON persistence.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.matrix
            .outer_iter()
            .map(|row| row.to_vec())
            .collect()
    }
}

/// One enrolled utterance with its derived features.
#[derive(Debug, Clone)]
pub struct EnrollmentSample {
    pub sample_id: String,
    pub identity_id: IdentityId,
    /// Handle returned by the raw-audio collaborator.
    pub raw_audio_ref: String,
    pub features: FeatureSet,
    pub created_at: DateTime<Utc>,
}

/// Lightweight per-sample view for enrollment inventory listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    pub sample_id: String,
    pub duration_secs: f64,
    pub frame_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Final outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Decision::Accepted),
            "rejected" => Ok(Decision::Rejected),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Scoring detail for one expected/transcribed phrase pair.
///
/// This is exactly what lands in the attempt audit record, so a reviewer
/// can reconstruct why an attempt was accepted or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMatch {
    pub expected_phrase: String,
    pub transcript: String,
    pub levenshtein_distance: usize,
    pub max_length: usize,
    /// Rounded to 4 decimals.
    pub similarity: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// Append-only audit record, written exactly once per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAttempt {
    pub attempt_id: String,
    pub identity_id: IdentityId,
    pub challenge_id: String,
    pub phrase_used: String,
    pub transcript: String,
    pub text_score: f64,
    pub text_passed: bool,
    /// Reserved for voice-biometric comparison against enrolled features.
    /// Never computed by the current pipeline.
    pub biometric_score: Option<f64>,
    pub final_decision: Decision,
    pub timestamp: DateTime<Utc>,
}

/// What `verify` returns to the caller — decision plus the diagnosable
/// score and transcript, rejection included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub decision: Decision,
    pub similarity: f64,
    pub transcript: String,
    pub attempt_id: String,
}

/// What `enroll` returns to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollOutcome {
    pub sample_id: String,
    /// (rows, frames) of the stored feature matrix.
    pub feature_shape: (usize, usize),
    pub duration_secs: f64,
}

/// Generate a collision-resistant id: `<prefix>-<micros>-<random>`.
pub fn new_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:08x}",
        Utc::now().timestamp_micros(),
        rand::random::<u32>()
    )
}
