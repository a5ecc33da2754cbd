//! Score submission signatures.
//!
//! A client signs a finished game by hashing the canonical string
//!
//! ```text
//! nonce || score || duration || timestamp || secret
//! ```
//!
//! where integers are rendered in base 10 with no padding and `||` is plain
//! concatenation. The field order is part of the wire protocol: reordering is
//! a breaking change for every deployed client.
//!
//! Verification recomputes the digest from the submitted fields and compares
//! it to the candidate in constant time. Any mutation of score, duration or
//! timestamp after signing changes the digest, so tampering is detected
//! without needing the original payload.

use subtle::ConstantTimeEq;

use crate::crypto::Digest;

/// The signed fields of a score submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorePayload<'a> {
    /// Single-use token issued for this game.
    pub nonce: &'a str,
    /// Final score.
    pub score: i64,
    /// Game duration in seconds.
    pub duration: i64,
    /// Client timestamp, signed verbatim.
    pub timestamp: &'a str,
}

impl<'a> ScorePayload<'a> {
    /// Creates a payload view over submitted fields.
    #[must_use]
    pub const fn new(nonce: &'a str, score: i64, duration: i64, timestamp: &'a str) -> Self {
        Self {
            nonce,
            score,
            duration,
            timestamp,
        }
    }
}

/// Computes the signature a well-behaved client sends for `payload`.
#[must_use]
pub fn sign(secret: &str, payload: &ScorePayload<'_>) -> String {
    let score = payload.score.to_string();
    let duration = payload.duration.to_string();
    Digest::hex_parts(&[
        payload.nonce,
        &score,
        &duration,
        payload.timestamp,
        secret,
    ])
}

/// Returns true if `candidate` is the signature of `payload` under `secret`.
///
/// Never fails: malformed candidates (wrong length, uppercase hex, garbage)
/// simply do not match.
#[must_use]
pub fn verify(secret: &str, payload: &ScorePayload<'_>, candidate: &str) -> bool {
    let expected = sign(secret, payload);
    bool::from(expected.as_bytes().ct_eq(candidate.as_bytes()))
}
