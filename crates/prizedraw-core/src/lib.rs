//! prizedraw-core - transactional prize draw and anti-cheat engine
//!
//! Players finish a game, submit a signed score, earn draw chances, and spend
//! them on a weighted draw against a finite shared award inventory. Every
//! successful draw is appended to a hash-chained audit log.
//!
//! # Modules
//!
//! - [`crypto`]: SHA-256 hex digests and the chain genesis value
//! - [`integrity`]: Score submission signatures
//! - [`nonce`]: Single-use nonce register (in-memory and `SQLite`)
//! - [`store`]: `SQLite` store with conditional updates and unique inserts
//! - [`ledger`]: Score ledger converting accepted games into chances
//! - [`draw`]: Draw engine with weighted selection and inventory fallback
//! - [`audit`]: Hash-chained draw audit log and its verifier
//! - [`config`]: Immutable event configuration
//! - [`error`]: Engine error taxonomy
//! - [`service`]: [`PromoService`] facade wiring it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use prizedraw_core::config::EventConfig;
//! use prizedraw_core::PromoService;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(EventConfig::load("prizedraw.toml".as_ref())?);
//! let service = PromoService::open(config)?;
//! service.seed_catalog()?;
//!
//! service.register_user("alice")?;
//! let ticket = service.start_game("alice")?;
//! println!("play with nonce {}", ticket.nonce);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod draw;
pub mod error;
pub mod integrity;
pub mod ledger;
pub mod nonce;
pub mod service;
pub mod store;

pub use audit::{AuditChain, AuditError, ChainReport};
pub use draw::{DrawEngine, DrawOutcome};
pub use error::{EngineError, ErrorKind};
pub use ledger::{GameTicket, ScoreLedger, ScoreSubmission};
pub use service::PromoService;
