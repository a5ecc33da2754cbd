//! Hash-chained audit log of successful draws.
//!
//! Each draw appends one [`DrawRecord`] link:
//!
//! ```text
//! data_hash  = digest(user_id || award_id || timestamp_ns)
//! final_hash = digest(data_hash || prev_hash)
//! ```
//!
//! where `prev_hash` is the `final_hash` of the previous link, or the
//! configured genesis value for the first one. The append runs inside the
//! draw transaction, which holds the database write lock, so two draws can
//! never link to the same predecessor.
//!
//! Recomputing the chain from genesis detects any edit, deletion, or
//! reordering of stored links. It does not protect against someone who can
//! run transactions and rewrite the whole chain.

use thiserror::Error;
use tracing::debug;

use crate::crypto::{Digest, is_digest_hex};
use crate::store::{DrawRecord, Repository, SqliteStore, StoreError, now_ns};

/// Links read per batch while verifying.
const VERIFY_BATCH_SIZE: u64 = 1000;

/// Errors raised while verifying the chain.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A link does not match its recomputed digests.
    #[error("audit chain broken at seq_id={seq_id}: {details}")]
    ChainBroken {
        /// Sequence ID of the first bad link.
        seq_id: u64,
        /// What did not match.
        details: String,
    },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainReport {
    /// Number of links verified.
    pub links: u64,
    /// `final_hash` of the last link, `None` for an empty chain.
    pub head: Option<String>,
}

/// Appends and verifies audit links.
#[derive(Debug, Clone)]
pub struct AuditChain {
    genesis: String,
}

impl AuditChain {
    /// Creates a chain rooted at `genesis`.
    #[must_use]
    pub fn new(genesis: impl Into<String>) -> Self {
        Self {
            genesis: genesis.into(),
        }
    }

    /// Predecessor digest of the first link.
    #[must_use]
    pub fn genesis(&self) -> &str {
        &self.genesis
    }

    /// Digest of one draw's own data.
    #[must_use]
    pub fn data_hash(user_id: &str, award_id: i64, timestamp_ns: u64) -> String {
        let award_id = award_id.to_string();
        let timestamp_ns = timestamp_ns.to_string();
        Digest::hex_parts(&[user_id, &award_id, &timestamp_ns])
    }

    /// Appends a link for a finalized draw. Must run inside the draw
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the latest link cannot be read or the new one
    /// cannot be inserted.
    pub fn append(
        &self,
        repo: &Repository<'_>,
        user_id: &str,
        award_id: i64,
        award_name: &str,
    ) -> Result<DrawRecord, StoreError> {
        self.append_at(repo, user_id, award_id, award_name, now_ns())
    }

    /// Appends a link with an explicit draw timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the latest link cannot be read or the new one
    /// cannot be inserted.
    pub fn append_at(
        &self,
        repo: &Repository<'_>,
        user_id: &str,
        award_id: i64,
        award_name: &str,
        timestamp_ns: u64,
    ) -> Result<DrawRecord, StoreError> {
        let prev_hash = repo
            .latest_draw_record()?
            .map_or_else(|| self.genesis.clone(), |link| link.final_hash);

        let data_hash = Self::data_hash(user_id, award_id, timestamp_ns);
        let final_hash = Digest::chain(&data_hash, &prev_hash);

        let mut record = DrawRecord {
            seq_id: None,
            user_id: user_id.to_string(),
            award_id,
            award_name: award_name.to_string(),
            prev_hash,
            data_hash,
            final_hash,
            created_at_ns: timestamp_ns,
        };
        let seq_id = repo.insert_draw_record(&record)?;
        record.seq_id = Some(seq_id);

        debug!(seq_id, final_hash = %record.final_hash, "audit link appended");
        Ok(record)
    }

    /// Verifies every stored link from genesis forward.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad link.
    pub fn verify(&self, store: &SqliteStore) -> Result<ChainReport, AuditError> {
        let mut verifier = ChainVerifier::new(&self.genesis);
        let mut cursor = 0;

        loop {
            let links = store.draw_records(cursor, VERIFY_BATCH_SIZE)?;
            let Some(last) = links.last() else {
                break;
            };
            cursor = last.seq_id.unwrap_or(0) + 1;

            for link in &links {
                verifier.push(link)?;
            }
        }

        Ok(verifier.finish())
    }

    /// Verifies an in-memory sequence of links in chain order.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad link.
    pub fn verify_links<'a>(
        &self,
        links: impl IntoIterator<Item = &'a DrawRecord>,
    ) -> Result<ChainReport, AuditError> {
        let mut verifier = ChainVerifier::new(&self.genesis);
        for link in links {
            verifier.push(link)?;
        }
        Ok(verifier.finish())
    }
}

struct ChainVerifier {
    expected_prev: String,
    links: u64,
    head: Option<String>,
}

impl ChainVerifier {
    fn new(genesis: &str) -> Self {
        Self {
            expected_prev: genesis.to_string(),
            links: 0,
            head: None,
        }
    }

    fn push(&mut self, link: &DrawRecord) -> Result<(), AuditError> {
        let seq_id = link.seq_id.unwrap_or(0);
        let broken = |details: &str| AuditError::ChainBroken {
            seq_id,
            details: details.to_string(),
        };

        if !is_digest_hex(&link.data_hash) || !is_digest_hex(&link.final_hash) {
            return Err(broken("stored digest is not 64 lowercase hex characters"));
        }
        if link.prev_hash != self.expected_prev {
            return Err(broken("prev_hash does not match the previous link"));
        }
        let data_hash = AuditChain::data_hash(&link.user_id, link.award_id, link.created_at_ns);
        if link.data_hash != data_hash {
            return Err(broken("data_hash does not match the recorded draw"));
        }
        if link.final_hash != Digest::chain(&link.data_hash, &link.prev_hash) {
            return Err(broken("final_hash mismatch"));
        }

        self.expected_prev.clone_from(&link.final_hash);
        self.head = Some(link.final_hash.clone());
        self.links += 1;
        Ok(())
    }

    fn finish(self) -> ChainReport {
        ChainReport {
            links: self.links,
            head: self.head,
        }
    }
}
