//! `SQLite`-backed store implementation.
//!
//! [`SqliteStore`] owns a single connection behind a mutex; every engine
//! operation runs as one `BEGIN IMMEDIATE` transaction so the write lock is
//! held from the first read to the commit. [`Repository`] carries the SQL for
//! a borrowed connection or transaction and is the only place that touches
//! table layouts.

// SQLite returns i64 for row IDs, counts, and timestamps, which are always
// non-negative here. Timestamps won't overflow i64 until the year 2262.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Row, Transaction, TransactionBehavior,
    params,
};
use thiserror::Error;

use super::models::{Award, AwardCategory, AwardSpec, DrawRecord, GameRecord, User};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// How long a second process waits for the write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const AWARD_COLUMNS: &str = "id, name, category, total, remaining, weight, value, image_url";
const DRAW_COLUMNS: &str =
    "seq_id, user_id, award_id, award_name, prev_hash, data_hash, final_hash, created_at_ns";
const GAME_COLUMNS: &str =
    "seq_id, user_id, game_id, score, duration, nonce, signature, timestamp, created_at_ns";

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A uniqueness constraint rejected an insert.
    #[error("uniqueness constraint violated: {detail}")]
    UniqueViolation {
        /// Constraint description reported by `SQLite`.
        detail: String,
    },

    /// Another thread panicked while holding the connection.
    #[error("store connection lock poisoned")]
    LockPoisoned,
}

/// Outcome of [`Repository::credit_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    /// Both counters were updated.
    Applied,
    /// No such user.
    UnknownUser,
    /// A counter would have passed `i64::MAX`; nothing was changed.
    Overflow,
}

/// Current wall-clock time in nanoseconds since Unix epoch.
#[must_use]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// The transactional store backing users, awards, and both audit trails.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` succeeds, rolls back otherwise.
    pub(crate) fn immediate<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.immediate_with(f, |_| false)
    }

    /// Like [`Self::immediate`], but commits the work done so far when `f`
    /// fails with an error for which `keep` returns true. The error is still
    /// returned to the caller.
    pub(crate) fn immediate_with<T, E, F, K>(&self, f: F, keep: K) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        K: FnOnce(&E) -> bool,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            },
            Err(err) => {
                if keep(&err) {
                    tx.commit().map_err(StoreError::from)?;
                } else {
                    tx.rollback().map_err(StoreError::from)?;
                }
                Err(err)
            },
        }
    }

    /// Runs read-only queries against the current committed state.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `f` or by acquiring the connection.
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Repository<'_>) -> Result<T, StoreError>,
    {
        let conn = self.lock()?;
        f(&Repository::new(&conn))
    }

    /// Finds or creates the user with `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be inserted or read back.
    pub fn register_user(&self, user_id: &str) -> Result<User, StoreError> {
        self.immediate(|tx| {
            let repo = Repository::new(tx);
            repo.insert_user_if_absent(user_id, now_ns())?;
            repo.user(user_id)?.ok_or(StoreError::Database(
                rusqlite::Error::QueryReturnedNoRows,
            ))
        })
    }

    /// Seeds the award catalog. Only acts on an empty catalog; returns the
    /// number of awards inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; no awards are inserted then.
    pub fn seed_awards(&self, specs: &[AwardSpec]) -> Result<usize, StoreError> {
        self.immediate(|tx| {
            let repo = Repository::new(tx);
            if repo.award_count()? > 0 {
                return Ok(0);
            }
            for spec in specs {
                repo.insert_award(spec)?;
            }
            Ok(specs.len())
        })
    }

    /// Reads a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.read(|repo| repo.user(user_id))
    }

    /// Reads an award.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn award(&self, award_id: i64) -> Result<Option<Award>, StoreError> {
        self.read(|repo| repo.award(award_id))
    }

    /// Reads the whole catalog in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn awards(&self) -> Result<Vec<Award>, StoreError> {
        self.read(|repo| repo.awards())
    }

    /// Reads up to `limit` audit links with `seq_id >= cursor`, in chain order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn draw_records(&self, cursor: u64, limit: u64) -> Result<Vec<DrawRecord>, StoreError> {
        self.read(|repo| repo.draw_records_from(cursor, limit))
    }

    /// Counts audit links citing `award_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn draw_count_for_award(&self, award_id: i64) -> Result<u64, StoreError> {
        self.read(|repo| repo.draw_count_for_award(award_id))
    }

    /// Reads a user's accepted submissions in acceptance order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn game_records_for_user(&self, user_id: &str) -> Result<Vec<GameRecord>, StoreError> {
        self.read(|repo| repo.game_records_for_user(user_id))
    }
}

/// SQL for one borrowed connection or transaction.
pub struct Repository<'c> {
    conn: &'c Connection,
}

impl<'c> Repository<'c> {
    /// Wraps a connection. Transactions deref to connections.
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Reads a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id, total_score, chances, created_at_ns FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        user_id: row.get(0)?,
                        total_score: row.get(1)?,
                        chances: row.get(2)?,
                        created_at_ns: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Inserts a user unless one already exists. Returns true on insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_user_if_absent(&self, user_id: &str, now_ns: u64) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, total_score, chances, created_at_ns)
             VALUES (?1, 0, 0, ?2)",
            params![user_id, now_ns],
        )?;
        Ok(changed == 1)
    }

    /// Takes one chance from the user if they have any.
    ///
    /// Returns false when the user has no chances (or does not exist).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn take_chance_if_positive(&self, user_id: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE users SET chances = chances - 1 WHERE user_id = ?1 AND chances > 0",
            params![user_id],
        )?;
        Ok(changed == 1)
    }

    /// Adds `score_delta` to the total score and `chance_delta` to the
    /// chances of a user. Both deltas must be non-negative.
    ///
    /// The update only applies when neither counter would pass `i64::MAX`;
    /// `SQLite` would otherwise store the sum as a REAL and the row could no
    /// longer be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn credit_user(
        &self,
        user_id: &str,
        score_delta: i64,
        chance_delta: i64,
    ) -> Result<Credit, StoreError> {
        let changed = self.conn.execute(
            "UPDATE users
             SET total_score = total_score + ?2, chances = chances + ?3
             WHERE user_id = ?1
               AND total_score <= ?4 - ?2
               AND chances <= ?4 - ?3",
            params![user_id, score_delta, chance_delta, i64::MAX],
        )?;
        if changed == 1 {
            return Ok(Credit::Applied);
        }
        Ok(if self.user(user_id)?.is_some() {
            Credit::Overflow
        } else {
            Credit::UnknownUser
        })
    }

    /// Number of catalog entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn award_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM awards", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Inserts a catalog entry with full stock. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_award(&self, spec: &AwardSpec) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO awards (name, category, total, remaining, weight, value, image_url)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6)",
            params![
                spec.name,
                spec.category,
                spec.total,
                spec.weight,
                spec.value,
                spec.image_url,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Reads an award.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn award(&self, award_id: i64) -> Result<Option<Award>, StoreError> {
        let award = self
            .conn
            .query_row(
                &format!("SELECT {AWARD_COLUMNS} FROM awards WHERE id = ?1"),
                params![award_id],
                award_from_row,
            )
            .optional()?;
        Ok(award)
    }

    /// Reads the whole catalog in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn awards(&self) -> Result<Vec<Award>, StoreError> {
        self.query_awards(&format!("SELECT {AWARD_COLUMNS} FROM awards ORDER BY id ASC"))
    }

    /// Reads every award with stock left, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn awards_in_stock(&self) -> Result<Vec<Award>, StoreError> {
        self.query_awards(&format!(
            "SELECT {AWARD_COLUMNS} FROM awards WHERE remaining > 0 ORDER BY id ASC"
        ))
    }

    /// First sunshine-tier award (by id) that still has stock.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn first_sunshine_in_stock(&self) -> Result<Option<Award>, StoreError> {
        let award = self
            .conn
            .query_row(
                &format!(
                    "SELECT {AWARD_COLUMNS} FROM awards
                     WHERE category = ?1 AND remaining > 0
                     ORDER BY id ASC LIMIT 1"
                ),
                params![AwardCategory::Sunshine],
                award_from_row,
            )
            .optional()?;
        Ok(award)
    }

    /// Takes one unit of stock from the award if any is left.
    ///
    /// Returns false when the award is out of stock (or does not exist).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn take_award_if_in_stock(&self, award_id: i64) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE awards SET remaining = remaining - 1 WHERE id = ?1 AND remaining > 0",
            params![award_id],
        )?;
        Ok(changed == 1)
    }

    /// Whether the user already won an award with this name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_won_award(&self, user_id: &str, award_name: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM draw_records WHERE user_id = ?1 AND award_name = ?2)",
            params![user_id, award_name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Inserts a game record. Returns its sequence ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the nonce or submission id
    /// has been recorded before.
    pub fn insert_game_record(&self, record: &GameRecord) -> Result<u64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO game_records
                 (user_id, game_id, score, duration, nonce, signature, timestamp, created_at_ns)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.user_id,
                    record.game_id,
                    record.score,
                    record.duration,
                    record.nonce,
                    record.signature,
                    record.timestamp,
                    record.created_at_ns,
                ],
            )
            .map_err(map_unique_violation)?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// Reads a user's accepted submissions in acceptance order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn game_records_for_user(&self, user_id: &str) -> Result<Vec<GameRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GAME_COLUMNS} FROM game_records WHERE user_id = ?1 ORDER BY seq_id ASC"
        ))?;
        let records = stmt
            .query_map(params![user_id], |row| {
                Ok(GameRecord {
                    seq_id: Some(row.get::<_, i64>(0)? as u64),
                    user_id: row.get(1)?,
                    game_id: row.get(2)?,
                    score: row.get(3)?,
                    duration: row.get(4)?,
                    nonce: row.get(5)?,
                    signature: row.get(6)?,
                    timestamp: row.get(7)?,
                    created_at_ns: row.get::<_, i64>(8)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Reads the most recent audit link.
    ///
    /// Sequence IDs are assigned under the write lock, so the highest one is
    /// also the most recently created link.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_draw_record(&self) -> Result<Option<DrawRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {DRAW_COLUMNS} FROM draw_records ORDER BY seq_id DESC LIMIT 1"),
                [],
                draw_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Appends an audit link. Returns its sequence ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_draw_record(&self, record: &DrawRecord) -> Result<u64, StoreError> {
        self.conn.execute(
            "INSERT INTO draw_records
             (user_id, award_id, award_name, prev_hash, data_hash, final_hash, created_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_id,
                record.award_id,
                record.award_name,
                record.prev_hash,
                record.data_hash,
                record.final_hash,
                record.created_at_ns,
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// Reads up to `limit` audit links with `seq_id >= cursor`, in chain order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn draw_records_from(&self, cursor: u64, limit: u64) -> Result<Vec<DrawRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRAW_COLUMNS} FROM draw_records
             WHERE seq_id >= ?1
             ORDER BY seq_id ASC
             LIMIT ?2"
        ))?;
        let records = stmt
            .query_map(params![cursor, limit], draw_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Counts audit links citing `award_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn draw_count_for_award(&self, award_id: i64) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM draw_records WHERE award_id = ?1",
            params![award_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn query_awards(&self, sql: &str) -> Result<Vec<Award>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let awards = stmt
            .query_map([], award_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(awards)
    }
}

fn award_from_row(row: &Row<'_>) -> rusqlite::Result<Award> {
    Ok(Award {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        total: row.get(3)?,
        remaining: row.get(4)?,
        weight: row.get(5)?,
        value: row.get(6)?,
        image_url: row.get(7)?,
    })
}

fn draw_from_row(row: &Row<'_>) -> rusqlite::Result<DrawRecord> {
    Ok(DrawRecord {
        seq_id: Some(row.get::<_, i64>(0)? as u64),
        user_id: row.get(1)?,
        award_id: row.get(2)?,
        award_name: row.get(3)?,
        prev_hash: row.get(4)?,
        data_hash: row.get(5)?,
        final_hash: row.get(6)?,
        created_at_ns: row.get::<_, i64>(7)? as u64,
    })
}

fn map_unique_violation(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, ref detail)
            if failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
        {
            StoreError::UniqueViolation {
                detail: detail.clone().unwrap_or_else(|| failure.to_string()),
            }
        },
        other => StoreError::Database(other),
    }
}
