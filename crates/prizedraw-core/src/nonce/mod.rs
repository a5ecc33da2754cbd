//! Single-use nonce register for score submissions.
//!
//! # Design
//!
//! The [`NonceGuard`] trait abstracts an atomic "set if absent, with expiry"
//! over the composite key `(user_id, nonce)`. A claim succeeds exactly once
//! per key inside the TTL window, no matter how many concurrent submissions
//! race for it. Implementations must never split the claim into a separate
//! check and set.
//!
//! Two implementations are provided:
//!
//! - [`InMemoryNonceGuard`]: process-local map guarded by a mutex
//! - [`SqliteNonceGuard`]: durable markers in the store's `nonce_markers`
//!   table, claimed with a single upsert statement
//!
//! Both sweep expired markers every 1024 claims, so storage stays
//! proportional to the claims made within one TTL window.
//!
//! # Residual risk
//!
//! Markers expire after the TTL (5 minutes by default) to bound the guard's
//! footprint. The unique nonce column on game records is the durable replay
//! barrier behind it. A replay that arrives after the marker expired *and*
//! after the game record was lost would be accepted; normal clients never
//! resubmit a finished game that late, so this is accepted rather than
//! guaranteed against.

mod memory;
mod sqlite;

use std::time::Duration;

use thiserror::Error;

pub use memory::InMemoryNonceGuard;
pub use sqlite::SqliteNonceGuard;

/// Claims between sweeps of expired markers.
pub(crate) const SWEEP_INTERVAL: u64 = 1024;

/// Default marker lifetime.
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors from the key-space backing a nonce guard.
#[derive(Debug, Error)]
pub enum NonceGuardError {
    /// The backing store failed.
    #[error("nonce store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic single-use register keyed by `(user_id, nonce)`.
pub trait NonceGuard: Send + Sync {
    /// Claims the nonce for the user.
    ///
    /// Returns `Ok(true)` if the key was absent (or expired) and is now
    /// marked, `Ok(false)` if it was already claimed inside the TTL window.
    ///
    /// # Errors
    ///
    /// Returns [`NonceGuardError`] if the backing key-space fails. Callers
    /// must treat this as a rejection.
    fn claim(&self, user_id: &str, nonce: &str) -> Result<bool, NonceGuardError>;
}

/// Marker key for a user's nonce.
///
/// The user id is length-prefixed so that no `(user, nonce)` pair can alias
/// another one.
pub(crate) fn marker_key(user_id: &str, nonce: &str) -> String {
    format!("nonce:{}:{user_id}:{nonce}", user_id.len())
}
