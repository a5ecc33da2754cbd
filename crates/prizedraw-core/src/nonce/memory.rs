//! In-process nonce guard.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{DEFAULT_NONCE_TTL, NonceGuard, NonceGuardError, SWEEP_INTERVAL, marker_key};

#[derive(Debug, Default)]
struct Markers {
    expiries: HashMap<String, Instant>,
    claims_since_sweep: u64,
}

/// Process-local [`NonceGuard`].
///
/// Expired markers are treated as absent on claim and swept every
/// 1024 claims, so memory stays proportional to the claims made
/// within one TTL window.
#[derive(Debug)]
pub struct InMemoryNonceGuard {
    ttl: Duration,
    markers: Mutex<Markers>,
}

impl InMemoryNonceGuard {
    /// Creates a guard with the default 5 minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_NONCE_TTL)
    }

    /// Creates a guard with a custom TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            markers: Mutex::new(Markers::default()),
        }
    }

    /// Claims as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`NonceGuardError::Unavailable`] if the marker lock is
    /// poisoned.
    pub fn claim_at(
        &self,
        user_id: &str,
        nonce: &str,
        now: Instant,
    ) -> Result<bool, NonceGuardError> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|_| NonceGuardError::Unavailable("nonce marker lock poisoned".into()))?;

        markers.claims_since_sweep += 1;
        if markers.claims_since_sweep >= SWEEP_INTERVAL {
            markers.expiries.retain(|_, expires_at| *expires_at > now);
            markers.claims_since_sweep = 0;
        }

        let key = marker_key(user_id, nonce);
        match markers.expiries.get(&key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                markers.expiries.insert(key, now + self.ttl);
                Ok(true)
            },
        }
    }

    /// Number of markers currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.lock().map_or(0, |m| m.expiries.len())
    }

    /// Returns true if no markers are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryNonceGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceGuard for InMemoryNonceGuard {
    fn claim(&self, user_id: &str, nonce: &str) -> Result<bool, NonceGuardError> {
        self.claim_at(user_id, nonce, Instant::now())
    }
}
