//! Error taxonomy for score submissions and draws.
//!
//! Every error aborts the transaction it was raised in. None are retried by
//! the engine; retry policy belongs to the caller, which can tell the kinds
//! apart through [`EngineError::kind`] and show [`EngineError::user_message`].

use thiserror::Error;

use crate::nonce::NonceGuardError;
use crate::store::StoreError;

/// Stable classification of [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Nonce already claimed.
    Replay,
    /// Submission signature mismatch.
    InvalidSignature,
    /// Malformed score or duration.
    InvalidData,
    /// Score rate above the anti-cheat threshold.
    AbnormalBehavior,
    /// User has no draw chances.
    NoChances,
    /// No award available, fallback tier included.
    InventoryExhausted,
    /// Concurrent exhaustion beat both the selection and the fallback.
    PrizeCollision,
    /// User was never registered.
    UnknownUser,
    /// Nonce key-space failure.
    NonceGuardUnavailable,
    /// Storage failure.
    Storage,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replay => "replay",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidData => "invalid_data",
            Self::AbnormalBehavior => "abnormal_behavior",
            Self::NoChances => "no_chances",
            Self::InventoryExhausted => "inventory_exhausted",
            Self::PrizeCollision => "prize_collision",
            Self::UnknownUser => "unknown_user",
            Self::NonceGuardUnavailable => "nonce_guard_unavailable",
            Self::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the score ledger and the draw engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The nonce was already used for a submission.
    #[error("nonce {nonce} already claimed by {user_id}")]
    Replay {
        /// Submitting user.
        user_id: String,
        /// Replayed nonce.
        nonce: String,
    },

    /// The submission signature does not match its fields.
    #[error("invalid submission signature")]
    InvalidSignature,

    /// Score or duration out of range.
    #[error("invalid game data: {reason}")]
    InvalidData {
        /// What was wrong.
        reason: String,
    },

    /// Score rate exceeds the configured maximum.
    #[error("abnormal game behavior: {rate:.2} points/s exceeds {limit:.2}")]
    AbnormalBehavior {
        /// Observed points per second.
        rate: f64,
        /// Configured maximum.
        limit: f64,
    },

    /// The user has no chances left.
    #[error("no chances remaining for {user_id}")]
    NoChances {
        /// Drawing user.
        user_id: String,
    },

    /// Nothing can be awarded, not even the fallback tier.
    #[error("award inventory exhausted: no candidate and no sunshine award in stock")]
    InventoryExhausted,

    /// The selected award and the fallback both ran out mid-draw.
    #[error("prize collision on award {award_id} and no fallback stock")]
    PrizeCollision {
        /// The award whose stock ran out.
        award_id: i64,
    },

    /// The user is not registered.
    #[error("unknown user: {user_id}")]
    UnknownUser {
        /// The missing user.
        user_id: String,
    },

    /// The nonce guard could not be consulted.
    #[error(transparent)]
    NonceGuard(#[from] NonceGuardError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Replay { .. } => ErrorKind::Replay,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::InvalidData { .. } => ErrorKind::InvalidData,
            Self::AbnormalBehavior { .. } => ErrorKind::AbnormalBehavior,
            Self::NoChances { .. } => ErrorKind::NoChances,
            Self::InventoryExhausted => ErrorKind::InventoryExhausted,
            Self::PrizeCollision { .. } => ErrorKind::PrizeCollision,
            Self::UnknownUser { .. } => ErrorKind::UnknownUser,
            Self::NonceGuard(_) => ErrorKind::NonceGuardUnavailable,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Message suitable for showing to the player. Distinct per kind.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Replay => "This game was already submitted. Please start a new game.",
            ErrorKind::InvalidSignature => "Score rejected: the submission failed verification.",
            ErrorKind::InvalidData => "Score rejected: the game data is invalid.",
            ErrorKind::AbnormalBehavior => "Score rejected: abnormal game behavior detected.",
            ErrorKind::NoChances => "No draw chances left. Play again to earn more.",
            ErrorKind::InventoryExhausted => "All prizes have been given out.",
            ErrorKind::PrizeCollision => "The prize pool is busy. Please try again later.",
            ErrorKind::UnknownUser => "Please sign in again.",
            ErrorKind::NonceGuardUnavailable | ErrorKind::Storage => {
                "The service is temporarily unavailable."
            },
        }
    }

    /// True for conditions that point at catalog misconfiguration or
    /// infrastructure trouble rather than player behavior.
    #[must_use]
    pub const fn requires_escalation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InventoryExhausted
                | ErrorKind::PrizeCollision
                | ErrorKind::NonceGuardUnavailable
                | ErrorKind::Storage
        )
    }

    /// True for the draw failures governed by the system-fault policy.
    #[must_use]
    pub const fn is_inventory_fault(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InventoryExhausted | ErrorKind::PrizeCollision
        )
    }
}
