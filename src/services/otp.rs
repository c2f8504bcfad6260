//! OTP challenge state machine.
//!
//! Every sensitive mutation except initial account activation (whose OTP
//! material lives on the account row until it is consumed) is gated by a
//! challenge held here, keyed by `(session id, flow)`. Per flow the states
//! are `NONE -> PENDING -> (CONSUMED | EXPIRED)`, with both terminal states
//! collapsing straight back to `NONE`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::services::hashing;

pub const OTP_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeFlow {
    Login,
    FaceUpdate,
    AccountDeletion,
}

/// Flow-specific state carried from the request step to the confirm step.
#[derive(Debug, Clone)]
pub enum ChallengePayload {
    Login { user_id: i64, similarity: f32 },
    FaceUpdate { user_id: i64, image: Vec<u8> },
    AccountDeletion { user_id: i64 },
}

#[derive(Debug)]
struct Challenge {
    otp_hash: String,
    expires_at: DateTime<Utc>,
    payload: ChallengePayload,
}

#[derive(Debug)]
pub enum VerifyOutcome {
    /// Hash matched before expiry; the challenge is consumed and its payload
    /// handed back for the mutation.
    Ok(ChallengePayload),
    /// Past expiry. Pending state is cleared even if the code was correct.
    Expired,
    /// Wrong code. The challenge stays pending and re-verifiable until
    /// expiry; no attempt counter is kept.
    Invalid,
    /// Nothing pending for this (session, flow); the caller must restart.
    NoActiveChallenge,
}

pub struct OtpChallengeManager {
    ttl: Duration,
    pending: Mutex<HashMap<(String, ChallengeFlow), Challenge>>,
}

impl OtpChallengeManager {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a challenge and returns the plaintext code for delivery. Only
    /// the argon2 hash is retained. A prior pending challenge of the same
    /// flow is replaced; challenges never stack.
    pub fn start(
        &self,
        session_id: &str,
        flow: ChallengeFlow,
        payload: ChallengePayload,
    ) -> Result<String, argon2::password_hash::Error> {
        let otp = generate_code();
        let challenge = Challenge {
            otp_hash: hashing::hash_otp(&otp)?,
            expires_at: Utc::now() + self.ttl,
            payload,
        };

        let mut pending = self.pending.lock().expect("challenge store poisoned");
        pending.insert((session_id.to_string(), flow), challenge);

        Ok(otp)
    }

    pub fn verify(&self, session_id: &str, flow: ChallengeFlow, supplied: &str) -> VerifyOutcome {
        let key = (session_id.to_string(), flow);
        let mut pending = self.pending.lock().expect("challenge store poisoned");

        let Some(challenge) = pending.get(&key) else {
            return VerifyOutcome::NoActiveChallenge;
        };

        if Utc::now() > challenge.expires_at {
            pending.remove(&key);
            return VerifyOutcome::Expired;
        }

        match hashing::verify_otp(supplied, &challenge.otp_hash) {
            Ok(true) => {
                let challenge = pending.remove(&key).expect("checked above");
                VerifyOutcome::Ok(challenge.payload)
            }
            Ok(false) => VerifyOutcome::Invalid,
            Err(e) => {
                // A corrupt stored hash can only be our bug; treat the code
                // as wrong rather than consuming the challenge.
                tracing::error!(?flow, "otp hash verification failed: {}", e);
                VerifyOutcome::Invalid
            }
        }
    }

    /// Drops a pending challenge without consuming it, e.g. when the code
    /// email could not be delivered.
    pub fn cancel(&self, session_id: &str, flow: ChallengeFlow) {
        let mut pending = self.pending.lock().expect("challenge store poisoned");
        pending.remove(&(session_id.to_string(), flow));
    }
}

/// 6 decimal digits from the thread-local CSPRNG.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Codes are exactly 6 ASCII digits; anything else is rejected before the
/// hash comparison.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}
