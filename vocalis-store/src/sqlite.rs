//! SQLite-backed identity and record store.
//!
//! Schema layout mirrors the audit requirements: enrollment metadata and
//! the (large) feature matrices live in separate tables, written in one
//! transaction so a crash never leaves a sample without its features.
//! Attempts are append-only; the decision column is finalized in the same
//! transaction as the insert.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use ndarray::Array2;
use rusqlite::{params, Connection};
use tracing::debug;

use vocalis_core::model::{
    Decision, EnrollmentSample, EnrollmentSummary, IdentityId, VerificationAttempt,
};
use vocalis_core::{IdentityStore, RecordStore, Result, VocalisError};

fn db_err(e: impl std::fmt::Display) -> VocalisError {
    VocalisError::Storage(e.to_string())
}

/// Connection-per-call SQLite store. Cheap to clone; safe to share across
/// the engine's blocking pool (WAL mode, short transactions).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path).map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS identities (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS voice_enrollments (
              sample_id TEXT PRIMARY KEY,
              identity_id INTEGER NOT NULL REFERENCES identities(id),
              raw_audio_ref TEXT NOT NULL,
              duration_secs REAL NOT NULL,
              sample_rate INTEGER NOT NULL,
              frame_count INTEGER NOT NULL,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS voice_enrollment_features (
              sample_id TEXT PRIMARY KEY
                REFERENCES voice_enrollments(sample_id) ON DELETE CASCADE,
              n_rows INTEGER NOT NULL,
              n_frames INTEGER NOT NULL,
              matrix_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification_attempts (
              attempt_id TEXT PRIMARY KEY,
              identity_id INTEGER NOT NULL REFERENCES identities(id),
              challenge_id TEXT NOT NULL,
              phrase_used TEXT NOT NULL,
              transcript TEXT NOT NULL,
              text_score REAL NOT NULL,
              text_passed INTEGER NOT NULL,
              biometric_score REAL,
              final_decision TEXT NOT NULL DEFAULT 'rejected',
              created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_enrollments_identity
              ON voice_enrollments(identity_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_attempts_identity
              ON verification_attempts(identity_id, created_at DESC);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Register an identity, returning its id. Re-registering an existing
    /// username returns the existing id.
    pub fn create_identity(&self, username: &str) -> Result<IdentityId> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO identities (username, created_at) VALUES (?1, ?2)",
            params![username, Utc::now().timestamp()],
        )
        .map_err(db_err)?;
        conn.query_row(
            "SELECT id FROM identities WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    /// Load the stored feature matrix for one enrollment sample.
    pub fn load_features(&self, sample_id: &str) -> Result<Array2<f32>> {
        let conn = self.open()?;
        let (rows, frames, json): (i64, i64, String) = conn
            .query_row(
                "SELECT n_rows, n_frames, matrix_json FROM voice_enrollment_features
                 WHERE sample_id = ?1",
                params![sample_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(db_err)?;
        let data: Vec<Vec<f32>> = serde_json::from_str(&json).map_err(db_err)?;
        let flat: Vec<f32> = data.into_iter().flatten().collect();
        Array2::from_shape_vec((rows as usize, frames as usize), flat).map_err(db_err)
    }

    /// Delete one enrollment sample (features cascade).
    pub fn delete_enrollment(&self, sample_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM voice_enrollments WHERE sample_id = ?1",
            params![sample_id],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

impl IdentityStore for SqliteStore {
    fn exists(&self, identity_id: IdentityId) -> Result<bool> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM identities WHERE id = ?1",
                params![identity_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

impl RecordStore for SqliteStore {
    fn enrollment_count(&self, identity_id: IdentityId) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM voice_enrollments WHERE identity_id = ?1",
                params![identity_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn insert_enrollment(&self, sample: &EnrollmentSample) -> Result<()> {
        let (rows, frames) = sample.features.shape();
        let matrix_json =
            serde_json::to_string(&sample.features.to_rows()).map_err(db_err)?;

        let mut conn = self.open()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            r#"
            INSERT INTO voice_enrollments
            (sample_id, identity_id, raw_audio_ref, duration_secs, sample_rate, frame_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                sample.sample_id,
                sample.identity_id,
                sample.raw_audio_ref,
                sample.features.duration_secs,
                sample.features.sample_rate,
                sample.features.frame_count as i64,
                sample.created_at.timestamp(),
            ],
        )
        .map_err(db_err)?;
        tx.execute(
            "INSERT INTO voice_enrollment_features (sample_id, n_rows, n_frames, matrix_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![sample.sample_id, rows as i64, frames as i64, matrix_json],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        debug!(sample_id = %sample.sample_id, rows, frames, "enrollment sample persisted");
        Ok(())
    }

    fn enrollments_for(&self, identity_id: IdentityId) -> Result<Vec<EnrollmentSummary>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT sample_id, duration_secs, frame_count, created_at
                 FROM voice_enrollments WHERE identity_id = ?1
                 ORDER BY created_at DESC",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query(params![identity_id]).map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            let ts: i64 = row.get(3).map_err(db_err)?;
            out.push(EnrollmentSummary {
                sample_id: row.get(0).map_err(db_err)?,
                duration_secs: row.get(1).map_err(db_err)?,
                frame_count: row.get::<_, i64>(2).map_err(db_err)? as usize,
                created_at: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }

    fn insert_attempt(&self, attempt: &VerificationAttempt) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            r#"
            INSERT INTO verification_attempts
            (attempt_id, identity_id, challenge_id, phrase_used, transcript,
             text_score, text_passed, biometric_score, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                attempt.attempt_id,
                attempt.identity_id,
                attempt.challenge_id,
                attempt.phrase_used,
                attempt.transcript,
                attempt.text_score,
                if attempt.text_passed { 1_i64 } else { 0_i64 },
                attempt.biometric_score,
                attempt.timestamp.timestamp(),
            ],
        )
        .map_err(db_err)?;
        // Decision is finalized in the same transaction as the insert, so
        // no attempt row is ever visible in a half-written state.
        tx.execute(
            "UPDATE verification_attempts SET final_decision = ?2 WHERE attempt_id = ?1",
            params![attempt.attempt_id, attempt.final_decision.as_str()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn attempts_for(
        &self,
        identity_id: IdentityId,
        limit: usize,
    ) -> Result<Vec<VerificationAttempt>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT attempt_id, challenge_id, phrase_used, transcript,
                        text_score, text_passed, biometric_score, final_decision, created_at
                 FROM verification_attempts WHERE identity_id = ?1
                 ORDER BY created_at DESC, attempt_id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let mut rows = stmt
            .query(params![identity_id, limit as i64])
            .map_err(db_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            let decision: String = row.get(7).map_err(db_err)?;
            let ts: i64 = row.get(8).map_err(db_err)?;
            out.push(VerificationAttempt {
                attempt_id: row.get(0).map_err(db_err)?,
                identity_id,
                challenge_id: row.get(1).map_err(db_err)?,
                phrase_used: row.get(2).map_err(db_err)?,
                transcript: row.get(3).map_err(db_err)?,
                text_score: row.get(4).map_err(db_err)?,
                text_passed: row.get::<_, i64>(5).map_err(db_err)? != 0,
                biometric_score: row.get(6).map_err(db_err)?,
                final_decision: decision.parse::<Decision>().map_err(db_err)?,
                timestamp: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocalis_core::model::{new_id, FeatureSet};

    fn temp_store() -> SqliteStore {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let path = std::env::temp_dir().join(format!("{}.db", new_id("vocalis-test")));
        SqliteStore::new(path).unwrap()
    }

    fn sample_for(identity_id: IdentityId) -> EnrollmentSample {
        EnrollmentSample {
            sample_id: new_id("enr"),
            identity_id,
            raw_audio_ref: "uploads/test.wav".into(),
            features: FeatureSet {
                matrix: Array2::from_shape_fn((39, 8), |(r, c)| (r * 8 + c) as f32),
                duration_secs: 0.256,
                sample_rate: 16_000,
                frame_count: 8,
            },
            created_at: Utc::now(),
        }
    }

    fn attempt_for(identity_id: IdentityId, decision: Decision) -> VerificationAttempt {
        VerificationAttempt {
            attempt_id: new_id("att"),
            identity_id,
            challenge_id: new_id("chal"),
            phrase_used: "42 blue river jumps 17".into(),
            transcript: "42 blue river jumps 17".into(),
            text_score: 1.0,
            text_passed: decision == Decision::Accepted,
            biometric_score: None,
            final_decision: decision,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn identity_registration_is_idempotent() {
        let store = temp_store();
        let a = store.create_identity("morgan").unwrap();
        let b = store.create_identity("morgan").unwrap();
        assert_eq!(a, b);
        assert!(store.exists(a).unwrap());
        assert!(!store.exists(a + 100).unwrap());
    }

    #[test]
    fn enrollment_round_trips_with_features() {
        let store = temp_store();
        let id = store.create_identity("morgan").unwrap();
        let sample = sample_for(id);
        store.insert_enrollment(&sample).unwrap();

        assert_eq!(store.enrollment_count(id).unwrap(), 1);
        let listing = store.enrollments_for(id).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].sample_id, sample.sample_id);
        assert_eq!(listing[0].frame_count, 8);

        let matrix = store.load_features(&sample.sample_id).unwrap();
        assert_eq!(matrix.shape(), &[39, 8]);
        assert_eq!(matrix[[2, 3]], 19.0);
    }

    #[test]
    fn duplicate_sample_id_leaves_no_partial_rows() {
        let store = temp_store();
        let id = store.create_identity("morgan").unwrap();
        let sample = sample_for(id);
        store.insert_enrollment(&sample).unwrap();

        // Same primary key again: whole transaction must roll back.
        let err = store.insert_enrollment(&sample).unwrap_err();
        assert!(matches!(err, VocalisError::Storage(_)));
        assert_eq!(store.enrollment_count(id).unwrap(), 1);
    }

    #[test]
    fn deleting_enrollment_cascades_to_features() {
        let store = temp_store();
        let id = store.create_identity("morgan").unwrap();
        let sample = sample_for(id);
        store.insert_enrollment(&sample).unwrap();

        store.delete_enrollment(&sample.sample_id).unwrap();
        assert_eq!(store.enrollment_count(id).unwrap(), 0);
        assert!(store.load_features(&sample.sample_id).is_err());
    }

    #[test]
    fn attempts_list_newest_first_with_decision() {
        let store = temp_store();
        let id = store.create_identity("morgan").unwrap();
        store
            .insert_attempt(&attempt_for(id, Decision::Rejected))
            .unwrap();
        store
            .insert_attempt(&attempt_for(id, Decision::Accepted))
            .unwrap();

        let attempts = store.attempts_for(id, 10).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].final_decision, Decision::Accepted);
        assert_eq!(attempts[1].final_decision, Decision::Rejected);
        assert!(attempts.iter().all(|a| a.biometric_score.is_none()));

        let limited = store.attempts_for(id, 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn attempts_are_scoped_per_identity() {
        let store = temp_store();
        let a = store.create_identity("morgan").unwrap();
        let b = store.create_identity("riley").unwrap();
        store.insert_attempt(&attempt_for(a, Decision::Accepted)).unwrap();

        assert_eq!(store.attempts_for(a, 10).unwrap().len(), 1);
        assert!(store.attempts_for(b, 10).unwrap().is_empty());
    }
}
