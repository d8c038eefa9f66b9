//! # vocalis-core
//!
//! Challenge-response voice verification pipeline SDK.
//!
//! ## Architecture
//!
//! ```text
//! issue_challenge → PhraseGenerator → ChallengeVault (TTL, single-use)
//!
//! verify(audio) → ChallengeVault.validate_and_consume
//!                       │
//!                 AudioNormalizer (decode | transcode)
//!                       │
//!                 TranscriptionAdapter (fail-soft → "")
//!                       │
//!                 score (Levenshtein similarity, threshold 0.80)
//!                       │
//!                 RecordStore.insert_attempt → VerifyOutcome
//!
//! enroll(audio) → AudioNormalizer → FeatureExtractor (MFCC+Δ+ΔΔ)
//!                       │
//!                 RecordStore.insert_enrollment → EnrollOutcome
//! ```
//!
//! Storage, transcoding and ASR sit behind traits in [`stores`] and
//! [`transcribe`]; `vocalis-store` ships the reference implementations.
//! Blocking pipelines run through `spawn_blocking` via the async wrappers
//! on [`VocalisEngine`].

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod challenge;
pub mod engine;
pub mod error;
pub mod features;
pub mod model;
pub mod phrase;
pub mod score;
pub mod stores;
pub mod transcribe;

// Convenience re-exports for downstream crates
pub use challenge::ChallengeVault;
pub use engine::{Collaborators, EngineConfig, VocalisEngine};
pub use error::{Result, VocalisError};
pub use model::{
    Decision, EnrollOutcome, EnrollmentSample, EnrollmentSummary, FeatureSet, IdentityId,
    IssuedChallenge, TextMatch, VerificationAttempt, VerifyOutcome,
};
pub use phrase::{PhraseGenerator, WordCategory, WordSource};
pub use stores::{IdentityStore, RawAudioStore, RecordStore, Transcoder};
pub use transcribe::SpeechToText;

#[cfg(feature = "remote-words")]
pub use phrase::remote::RemoteWordSource;
