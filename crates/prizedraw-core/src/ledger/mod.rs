//! Score ledger.
//!
//! Turns a signed game result into score and draw chances. Checks run in
//! a fixed order:
//!
//! 1. Require a registered user, so unknown ids never reach the guard.
//! 2. Claim the nonce with the [`NonceGuard`]; a second claim is a replay.
//! 3. Verify the submission signature.
//! 4. Require `duration > 0` and `score >= 0`.
//! 5. Reject score rates above `game.max_score_per_second`.
//! 6. `earned = score / game.score_to_chance_ratio`, rounded down.
//! 7. In one transaction, record the game and credit score and chances.
//!    A credit that would overflow the user's counters is invalid data.
//!
//! The nonce claim is never released, even when a later step rejects the
//! submission. A payload rejected as cheating cannot be retried under the
//! same nonce.

// Score rates only need float precision.
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EventConfig;
use crate::error::EngineError;
use crate::integrity::{self, ScorePayload};
use crate::nonce::NonceGuard;
use crate::store::{Credit, GameRecord, Repository, SqliteStore, StoreError, now_ns};

/// A finished game as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    /// Submitting user.
    pub user_id: String,
    /// Final score.
    pub score: i64,
    /// Game duration in seconds.
    pub duration: i64,
    /// Nonce from the game ticket.
    pub nonce: String,
    /// Client signature over nonce, score, duration, and timestamp.
    pub signature: String,
    /// Client timestamp, signed verbatim.
    pub timestamp: String,
}

impl ScoreSubmission {
    fn payload(&self) -> ScorePayload<'_> {
        ScorePayload::new(&self.nonce, self.score, self.duration, &self.timestamp)
    }
}

/// Handle for a new game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameTicket {
    /// Display id, `"{user_id}-{unix_seconds}"`.
    pub game_id: String,
    /// Single-use nonce the client must sign and submit.
    pub nonce: String,
}

/// Accepts score submissions.
#[derive(Clone)]
pub struct ScoreLedger {
    config: Arc<EventConfig>,
    store: SqliteStore,
    guard: Arc<dyn NonceGuard>,
}

impl std::fmt::Debug for ScoreLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreLedger")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ScoreLedger {
    /// Creates a ledger over `store`, claiming nonces through `guard`.
    #[must_use]
    pub fn new(config: Arc<EventConfig>, store: SqliteStore, guard: Arc<dyn NonceGuard>) -> Self {
        Self {
            config,
            store,
            guard,
        }
    }

    /// Issues a fresh nonce for a registered user.
    ///
    /// Nothing is recorded; the nonce becomes binding when a submission
    /// claims it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownUser`] if the user is not registered.
    pub fn start_game(&self, user_id: &str) -> Result<GameTicket, EngineError> {
        if self.store.user(user_id)?.is_none() {
            return Err(unknown_user(user_id));
        }

        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(GameTicket {
            game_id: format!("{user_id}-{unix_secs}"),
            nonce: Uuid::new_v4().simple().to_string(),
        })
    }

    /// Accepts a submission and returns the number of chances earned.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Replay`], [`EngineError::InvalidSignature`],
    /// [`EngineError::InvalidData`], [`EngineError::AbnormalBehavior`],
    /// [`EngineError::UnknownUser`], or an infrastructure error. Nothing is
    /// persisted on error, except the nonce claim.
    pub fn submit(&self, submission: &ScoreSubmission) -> Result<i64, EngineError> {
        let user_id = submission.user_id.as_str();
        let game = &self.config.game;

        if self.store.user(user_id)?.is_none() {
            return Err(unknown_user(user_id));
        }

        if !self.guard.claim(user_id, &submission.nonce)? {
            warn!(user_id, nonce = %submission.nonce, "replayed score submission");
            return Err(replay(submission));
        }

        if !integrity::verify(
            game.app_secret.expose_secret(),
            &submission.payload(),
            &submission.signature,
        ) {
            warn!(user_id, nonce = %submission.nonce, "score submission signature mismatch");
            return Err(EngineError::InvalidSignature);
        }

        if submission.duration <= 0 {
            return Err(EngineError::InvalidData {
                reason: format!("duration must be positive, got {}", submission.duration),
            });
        }
        if submission.score < 0 {
            return Err(EngineError::InvalidData {
                reason: format!("score must not be negative, got {}", submission.score),
            });
        }

        let rate = submission.score as f64 / submission.duration as f64;
        if rate > game.max_score_per_second {
            warn!(
                user_id,
                score = submission.score,
                duration = submission.duration,
                rate,
                "abnormal score rate"
            );
            return Err(EngineError::AbnormalBehavior {
                rate,
                limit: game.max_score_per_second,
            });
        }

        let earned = submission.score / game.score_to_chance_ratio;
        let record = GameRecord {
            seq_id: None,
            user_id: user_id.to_string(),
            game_id: GameRecord::game_id_for(user_id, &submission.nonce),
            score: submission.score,
            duration: submission.duration,
            nonce: submission.nonce.clone(),
            signature: submission.signature.clone(),
            timestamp: submission.timestamp.clone(),
            created_at_ns: now_ns(),
        };

        self.store.immediate(|tx| {
            let repo = Repository::new(tx);
            match repo.insert_game_record(&record) {
                Ok(_) => {},
                Err(StoreError::UniqueViolation { detail }) => {
                    warn!(user_id, %detail, "nonce already recorded");
                    return Err(replay(submission));
                },
                Err(err) => return Err(err.into()),
            }
            match repo.credit_user(user_id, submission.score, earned)? {
                Credit::Applied => Ok(()),
                Credit::UnknownUser => Err(unknown_user(user_id)),
                Credit::Overflow => {
                    warn!(user_id, score = submission.score, "score credit would overflow");
                    Err(EngineError::InvalidData {
                        reason: "score would overflow the user's total".to_string(),
                    })
                },
            }
        })?;

        info!(user_id, score = submission.score, earned, "score accepted");
        Ok(earned)
    }
}

fn unknown_user(user_id: &str) -> EngineError {
    EngineError::UnknownUser {
        user_id: user_id.to_string(),
    }
}

fn replay(submission: &ScoreSubmission) -> EngineError {
    EngineError::Replay {
        user_id: submission.user_id.clone(),
        nonce: submission.nonce.clone(),
    }
}
