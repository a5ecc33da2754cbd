//! Durable nonce guard on the store's `nonce_markers` table.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::{Connection, params};

use super::{DEFAULT_NONCE_TTL, NonceGuard, NonceGuardError, SWEEP_INTERVAL, marker_key};
use crate::store::{SqliteStore, now_ns};

/// [`NonceGuard`] whose markers survive process restarts.
///
/// A claim is one statement:
///
/// ```sql
/// INSERT INTO nonce_markers (marker, expires_at_ns) VALUES (?, ?)
/// ON CONFLICT (marker) DO UPDATE SET expires_at_ns = excluded.expires_at_ns
/// WHERE nonce_markers.expires_at_ns <= ?now
/// ```
///
/// which changes a row only when the marker is absent or expired. Every
/// 1024th claim (counted across clones) also deletes expired markers.
#[derive(Debug, Clone)]
pub struct SqliteNonceGuard {
    store: SqliteStore,
    ttl: Duration,
    claims_since_sweep: Arc<AtomicU64>,
}

impl SqliteNonceGuard {
    /// Creates a guard with the default 5 minute TTL.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self::with_ttl(store, DEFAULT_NONCE_TTL)
    }

    /// Creates a guard with a custom TTL.
    #[must_use]
    pub fn with_ttl(store: SqliteStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            claims_since_sweep: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claims as of `now_ns` (nanoseconds since Unix epoch).
    ///
    /// # Errors
    ///
    /// Returns [`NonceGuardError::Unavailable`] if the statement fails.
    pub fn claim_at(&self, user_id: &str, nonce: &str, now_ns: u64) -> Result<bool, NonceGuardError> {
        let expires_at_ns = now_ns.saturating_add(self.ttl.as_nanos() as u64);
        let conn = self
            .store
            .lock()
            .map_err(|e| NonceGuardError::Unavailable(e.to_string()))?;

        let changed = conn
            .execute(
                "INSERT INTO nonce_markers (marker, expires_at_ns) VALUES (?1, ?2)
                 ON CONFLICT (marker) DO UPDATE SET expires_at_ns = excluded.expires_at_ns
                 WHERE nonce_markers.expires_at_ns <= ?3",
                params![marker_key(user_id, nonce), expires_at_ns, now_ns],
            )
            .map_err(unavailable)?;

        if self.claims_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_INTERVAL {
            self.claims_since_sweep.store(0, Ordering::Relaxed);
            delete_expired(&conn, now_ns)?;
        }
        Ok(changed == 1)
    }

    /// Deletes markers that expired before `now_ns`. Returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`NonceGuardError::Unavailable`] if the statement fails.
    pub fn purge_expired(&self, now_ns: u64) -> Result<usize, NonceGuardError> {
        let conn = self
            .store
            .lock()
            .map_err(|e| NonceGuardError::Unavailable(e.to_string()))?;
        delete_expired(&conn, now_ns)
    }

    /// Number of stored markers, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`NonceGuardError::Unavailable`] if the query fails.
    pub fn marker_count(&self) -> Result<u64, NonceGuardError> {
        let conn = self
            .store
            .lock()
            .map_err(|e| NonceGuardError::Unavailable(e.to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nonce_markers", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count as u64)
    }
}

fn delete_expired(conn: &Connection, now_ns: u64) -> Result<usize, NonceGuardError> {
    conn.execute(
        "DELETE FROM nonce_markers WHERE expires_at_ns <= ?1",
        params![now_ns],
    )
    .map_err(unavailable)
}

#[allow(clippy::needless_pass_by_value)]
fn unavailable(err: rusqlite::Error) -> NonceGuardError {
    NonceGuardError::Unavailable(err.to_string())
}

impl NonceGuard for SqliteNonceGuard {
    fn claim(&self, user_id: &str, nonce: &str) -> Result<bool, NonceGuardError> {
        self.claim_at(user_id, nonce, now_ns())
    }
}
