//! Service facade.
//!
//! [`PromoService`] is what a transport layer calls into. It owns the
//! configuration snapshot, the store, and the nonce guard, and hands them to
//! the [`ScoreLedger`] and the [`DrawEngine`]. Each call is one synchronous
//! operation returning a payload or an [`EngineError`].

use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditError, ChainReport};
use crate::config::EventConfig;
use crate::draw::{DrawEngine, DrawOutcome};
use crate::error::EngineError;
use crate::ledger::{GameTicket, ScoreLedger, ScoreSubmission};
use crate::nonce::{NonceGuard, SqliteNonceGuard};
use crate::store::{SqliteStore, StoreError, User};

/// Entry point for score submissions and draws.
#[derive(Debug, Clone)]
pub struct PromoService {
    config: Arc<EventConfig>,
    store: SqliteStore,
    ledger: ScoreLedger,
    engine: DrawEngine,
}

impl PromoService {
    /// Wires a service from its parts.
    #[must_use]
    pub fn new(config: Arc<EventConfig>, store: SqliteStore, guard: Arc<dyn NonceGuard>) -> Self {
        let ledger = ScoreLedger::new(Arc::clone(&config), store.clone(), guard);
        let engine = DrawEngine::new(Arc::clone(&config), store.clone());
        Self {
            config,
            store,
            ledger,
            engine,
        }
    }

    /// Opens the configured database and claims nonces in the same file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: Arc<EventConfig>) -> Result<Self, StoreError> {
        let store = SqliteStore::open(&config.storage.database)?;
        let guard = SqliteNonceGuard::with_ttl(store.clone(), config.game.nonce_ttl());
        info!(database = %config.storage.database.display(), "store opened");
        Ok(Self::new(config, store, Arc::new(guard)))
    }

    /// Configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Underlying store, for read accessors.
    #[must_use]
    pub const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Seeds the configured catalog into an empty store. Returns the number
    /// of awards inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding fails.
    pub fn seed_catalog(&self) -> Result<usize, StoreError> {
        let inserted = self.store.seed_awards(&self.config.awards)?;
        if inserted > 0 {
            info!(inserted, "award catalog seeded");
        }
        Ok(inserted)
    }

    /// Finds or creates a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn register_user(&self, user_id: &str) -> Result<User, EngineError> {
        Ok(self.store.register_user(user_id)?)
    }

    /// Issues a game ticket. See [`ScoreLedger::start_game`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownUser`] for unregistered users.
    pub fn start_game(&self, user_id: &str) -> Result<GameTicket, EngineError> {
        self.ledger.start_game(user_id)
    }

    /// Accepts a score. See [`ScoreLedger::submit`].
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn submit_score(&self, submission: &ScoreSubmission) -> Result<i64, EngineError> {
        self.ledger.submit(submission)
    }

    /// Runs a draw. See [`DrawEngine::draw`].
    ///
    /// # Errors
    ///
    /// Returns the failure reason.
    pub fn draw(&self, user_id: &str) -> Result<DrawOutcome, EngineError> {
        self.engine.draw(user_id)
    }

    /// Verifies the whole audit chain from genesis.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad link.
    pub fn verify_audit_chain(&self) -> Result<ChainReport, AuditError> {
        self.engine.audit().verify(&self.store)
    }
}
