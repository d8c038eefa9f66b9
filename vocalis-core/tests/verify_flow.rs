use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use vocalis_core::audio::decode::encode_wav_pcm16;
use vocalis_core::audio::NormalizedAudio;
use vocalis_core::model::new_id;
use vocalis_core::{
    Collaborators, Decision, EngineConfig, EnrollmentSample, EnrollmentSummary, IdentityId,
    IdentityStore, PhraseGenerator, RawAudioStore, RecordStore, SpeechToText,
    VerificationAttempt, VocalisEngine, VocalisError,
};

struct KnownIdentities(HashSet<IdentityId>);

impl IdentityStore for KnownIdentities {
    fn exists(&self, identity_id: IdentityId) -> vocalis_core::Result<bool> {
        Ok(self.0.contains(&identity_id))
    }
}

#[derive(Default)]
struct BlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl RawAudioStore for BlobStore {
    fn save(&self, bytes: &[u8], label: &str) -> vocalis_core::Result<String> {
        let handle = format!("{label}/{}", new_id("blob"));
        self.blobs.lock().insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    fn delete(&self, handle: &str) -> vocalis_core::Result<()> {
        self.blobs.lock().remove(handle);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryRecords {
    enrollments: Mutex<Vec<EnrollmentSample>>,
    attempts: Mutex<Vec<VerificationAttempt>>,
}

impl RecordStore for MemoryRecords {
    fn enrollment_count(&self, identity_id: IdentityId) -> vocalis_core::Result<usize> {
        Ok(self
            .enrollments
            .lock()
            .iter()
            .filter(|s| s.identity_id == identity_id)
            .count())
    }

    fn insert_enrollment(&self, sample: &EnrollmentSample) -> vocalis_core::Result<()> {
        self.enrollments.lock().push(sample.clone());
        Ok(())
    }

    fn enrollments_for(
        &self,
        identity_id: IdentityId,
    ) -> vocalis_core::Result<Vec<EnrollmentSummary>> {
        Ok(self
            .enrollments
            .lock()
            .iter()
            .rev()
            .filter(|s| s.identity_id == identity_id)
            .map(|s| EnrollmentSummary {
                sample_id: s.sample_id.clone(),
                duration_secs: s.features.duration_secs,
                frame_count: s.features.frame_count,
                created_at: s.created_at,
            })
            .collect())
    }

    fn insert_attempt(&self, attempt: &VerificationAttempt) -> vocalis_core::Result<()> {
        self.attempts.lock().push(attempt.clone());
        Ok(())
    }

    fn attempts_for(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> vocalis_core::Result<Vec<VerificationAttempt>> {
        Ok(self
            .attempts
            .lock()
            .iter()
            .rev()
            .filter(|a| a.identity_id == identity_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// ASR fake whose transcript is set after the challenge phrase is known.
#[derive(Default)]
struct ScriptedAsr {
    transcript: Mutex<String>,
}

impl ScriptedAsr {
    fn say(&self, text: &str) {
        *self.transcript.lock() = text.to_string();
    }
}

impl SpeechToText for ScriptedAsr {
    fn transcribe(&self, _audio: &NormalizedAudio) -> anyhow::Result<String> {
        Ok(self.transcript.lock().clone())
    }
}

struct Harness {
    engine: Arc<VocalisEngine>,
    records: Arc<MemoryRecords>,
    blobs: Arc<BlobStore>,
    asr: Arc<ScriptedAsr>,
}

const SPEAKER: IdentityId = 42;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn harness() -> Harness {
    init_tracing();
    let records = Arc::new(MemoryRecords::default());
    let blobs = Arc::new(BlobStore::default());
    let asr = Arc::new(ScriptedAsr::default());

    let engine = VocalisEngine::new(
        EngineConfig::default(),
        Collaborators {
            identities: Arc::new(KnownIdentities(HashSet::from([SPEAKER]))),
            audio: Arc::clone(&blobs) as Arc<dyn RawAudioStore>,
            records: Arc::clone(&records) as Arc<dyn RecordStore>,
            transcoder: None,
            asr: Arc::clone(&asr) as Arc<dyn SpeechToText>,
        },
    )
    .with_phrase_generator(PhraseGenerator::seeded(7));

    Harness {
        engine: Arc::new(engine),
        records,
        blobs,
        asr,
    }
}

fn spoken_clip() -> Vec<u8> {
    // Half a second of a 220 Hz tone at 16 kHz.
    let samples: Vec<f32> = (0..8_000)
        .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 16_000.0).sin() * 0.3)
        .collect();
    encode_wav_pcm16(&samples, 16_000).unwrap()
}

#[test]
fn exact_repeat_is_accepted_with_full_similarity() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    assert_eq!(issued.phrase.split_whitespace().count(), 5);

    h.asr.say(&issued.phrase);
    let outcome = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap();

    assert_eq!(outcome.decision, Decision::Accepted);
    assert_eq!(outcome.similarity, 1.0);
    assert_eq!(outcome.transcript, issued.phrase);

    let attempts = h.engine.attempts(SPEAKER, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].final_decision, Decision::Accepted);
    assert_eq!(attempts[0].phrase_used, issued.phrase);
    assert!(attempts[0].biometric_score.is_none());
}

#[test]
fn unrelated_speech_is_rejected_and_still_audited() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    h.asr.say("completely unrelated words spoken here");
    let outcome = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap();

    assert_eq!(outcome.decision, Decision::Rejected);
    assert!(outcome.similarity < 0.80, "similarity {}", outcome.similarity);

    // Rejection is an auditable outcome, not an error.
    let attempts = h.engine.attempts(SPEAKER, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].final_decision, Decision::Rejected);

    // Verification audio never outlives the attempt.
    assert!(h.blobs.blobs.lock().is_empty());
}

#[test]
fn challenge_cannot_be_replayed() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    h.asr.say(&issued.phrase);
    h.engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap();

    let err = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap_err();
    assert!(matches!(err, VocalisError::ChallengeConsumed(_)));

    // Only the first attempt was recorded.
    assert_eq!(h.records.attempts.lock().len(), 1);
}

#[test]
fn silent_asr_rejects_but_consumes_the_challenge() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    h.asr.say("");
    let outcome = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap();

    assert_eq!(outcome.decision, Decision::Rejected);
    assert_eq!(outcome.similarity, 0.0);

    let err = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap_err();
    assert!(matches!(err, VocalisError::ChallengeConsumed(_)));
}

#[test]
fn challenge_for_one_identity_rejects_another_caller() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    let err = h
        .engine
        .verify_blocking(&issued.challenge_id, 999, spoken_clip())
        .unwrap_err();
    assert!(matches!(err, VocalisError::OwnerMismatch { .. }));

    // The mismatch did not burn the challenge.
    h.asr.say(&issued.phrase);
    let outcome = h
        .engine
        .verify_blocking(&issued.challenge_id, SPEAKER, spoken_clip())
        .unwrap();
    assert_eq!(outcome.decision, Decision::Accepted);
}

#[test]
fn enrollment_fills_to_the_ceiling_then_refuses() {
    let h = harness();

    for i in 1..=5 {
        let outcome = h.engine.enroll_blocking(SPEAKER, spoken_clip(), i).unwrap();
        assert_eq!(outcome.feature_shape.0, 39);
        assert!(outcome.feature_shape.1 > 1);
    }

    let err = h.engine.enroll_blocking(SPEAKER, spoken_clip(), 6).unwrap_err();
    assert!(matches!(
        err,
        VocalisError::EnrollmentLimitReached { limit: 5, .. }
    ));

    let inventory = h.engine.enrollments(SPEAKER).unwrap();
    assert_eq!(inventory.len(), 5);
    assert_eq!(h.engine.remaining_enrollments(SPEAKER).unwrap(), 0);
    // Exactly the five enrollment blobs persist.
    assert_eq!(h.blobs.blobs.lock().len(), 5);
}

#[test]
fn unknown_identity_cannot_enroll_or_be_challenged() {
    let h = harness();

    let err = h.engine.issue_challenge(1).unwrap_err();
    assert!(matches!(err, VocalisError::IdentityNotFound(1)));

    let err = h.engine.enroll_blocking(1, spoken_clip(), 1).unwrap_err();
    assert!(matches!(err, VocalisError::IdentityNotFound(1)));
    assert!(h.records.enrollments.lock().is_empty());
}

#[tokio::test]
async fn async_wrappers_run_the_same_pipelines() {
    let h = harness();

    let issued = h.engine.issue_challenge(SPEAKER).unwrap();
    h.asr.say(&issued.phrase);

    let outcome = h
        .engine
        .verify(issued.challenge_id.clone(), SPEAKER, spoken_clip())
        .await
        .unwrap();
    assert_eq!(outcome.decision, Decision::Accepted);

    let enrolled = h.engine.enroll(SPEAKER, spoken_clip(), 1).await.unwrap();
    assert_eq!(enrolled.feature_shape.0, 39);
}
