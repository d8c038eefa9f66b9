//! Challenge lifecycle: issue, validate, single-use consume.
//!
//! ## State machine
//!
//! ```text
//! Issued ──validate_and_consume──► Consumed   (terminal)
//!    │
//!    ├── expiry observed at validation ──► evicted (terminal)
//!    └── identity mismatch ──► Rejected (challenge left intact)
//! ```
//!
//! The vault is an injected value, not ambient state: every engine (and
//! every test) owns its own instance. All checks and the consumed-flag
//! flip happen under one `parking_lot::Mutex` acquisition, which makes
//! `validate_and_consume` linearizable per challenge id — under
//! concurrent duplicate calls exactly one returns the challenge and the
//! rest observe `ChallengeConsumed`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Result, VocalisError};
use crate::model::{new_id, Challenge, IdentityId};

/// Default challenge lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// In-memory store of live challenges.
pub struct ChallengeVault {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, Challenge>>,
}

impl ChallengeVault {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh challenge for `identity_id` carrying `phrase`.
    pub fn issue(&self, identity_id: IdentityId, phrase: String) -> Challenge {
        let now = Utc::now();
        let challenge = Challenge {
            challenge_id: new_id("chal"),
            identity_id,
            phrase,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };

        info!(
            challenge_id = %challenge.challenge_id,
            identity_id,
            expires_at = %challenge.expires_at,
            "challenge issued"
        );

        self.entries
            .lock()
            .insert(challenge.challenge_id.clone(), challenge.clone());
        challenge
    }

    /// Atomically check existence, expiry, consumption and ownership, then
    /// mark the challenge consumed.
    ///
    /// Expiry wins over every other outcome: a stale challenge reports
    /// `ChallengeExpired` (and is evicted) even if it was never consumed.
    /// Consumption is never rolled back — a caller that aborts after this
    /// returns cannot replay the challenge.
    ///
    /// # Errors
    /// `ChallengeNotFound`, `ChallengeExpired`, `ChallengeConsumed` or
    /// `OwnerMismatch`, per the checks above.
    pub fn validate_and_consume(
        &self,
        challenge_id: &str,
        identity_id: IdentityId,
    ) -> Result<Challenge> {
        let mut entries = self.entries.lock();

        let challenge = entries
            .get_mut(challenge_id)
            .ok_or_else(|| VocalisError::ChallengeNotFound(challenge_id.to_string()))?;

        if Utc::now() > challenge.expires_at {
            debug!(challenge_id, "evicting expired challenge");
            entries.remove(challenge_id);
            return Err(VocalisError::ChallengeExpired(challenge_id.to_string()));
        }

        if challenge.consumed {
            return Err(VocalisError::ChallengeConsumed(challenge_id.to_string()));
        }

        if challenge.identity_id != identity_id {
            return Err(VocalisError::OwnerMismatch {
                challenge_id: challenge_id.to_string(),
            });
        }

        challenge.consumed = true;
        debug!(challenge_id, identity_id, "challenge consumed");
        Ok(challenge.clone())
    }

    /// Number of challenges currently held (consumed ones included until
    /// their expiry is observed).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
