//! Transactional storage for users, the award catalog, and the two
//! append-only trails (game records and draw audit links).
//!
//! The store is `SQLite` in WAL mode. The engine relies on four primitives,
//! all provided by [`Repository`]:
//!
//! - **Conditional decrement**: `UPDATE ... SET n = n - 1 WHERE ... AND n > 0`
//!   for chances and stock, reporting whether a row changed
//! - **Unique-checked insert**: game records are unique by nonce and by
//!   submission id; violations surface as [`StoreError::UniqueViolation`]
//! - **Ordered audit read**: the latest draw link by sequence ID
//! - **Catalog filter read**: every award with stock left
//!
//! # Example
//!
//! ```rust,no_run
//! use prizedraw_core::store::{AwardCategory, AwardSpec, SqliteStore};
//!
//! # fn example() -> Result<(), prizedraw_core::store::StoreError> {
//! let store = SqliteStore::open("/path/to/prizedraw.db")?;
//! store.seed_awards(&[AwardSpec {
//!     name: "Thanks for playing".into(),
//!     category: AwardCategory::Sunshine,
//!     total: 100_000,
//!     weight: 90,
//!     value: 0,
//!     image_url: String::new(),
//! }])?;
//! let user = store.register_user("alice")?;
//! assert_eq!(user.chances, 0);
//! # Ok(())
//! # }
//! ```

mod models;
mod storage;

#[cfg(test)]
mod tests;

pub use models::{Award, AwardCategory, AwardSpec, DrawRecord, GameRecord, User};
pub use storage::{Credit, Repository, SqliteStore, StoreError, now_ns};
