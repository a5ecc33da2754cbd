//! Event configuration.
//!
//! The configuration is parsed once from TOML, patched from the environment,
//! validated, and then shared read-only (behind an `Arc`) by every
//! component. Nothing mutates it at runtime.
//!
//! ```toml
//! [game]
//! app_secret = "change-me"
//! score_to_chance_ratio = 1000
//! max_score_per_second = 50.0
//!
//! [draw]
//! exclusive_award = "Vacation Reward Card"
//! on_system_fault = "refund"
//!
//! [storage]
//! database = "prizedraw.db"
//!
//! [[awards]]
//! name = "Thanks for playing"
//! category = "sunshine"
//! total = 100000
//! weight = 900
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::crypto::GENESIS_HASH;
use crate::store::AwardSpec;

/// Environment variable overriding `game.app_secret`.
pub const ENV_APP_SECRET: &str = "APP_SECRET";

/// Environment variable overriding `storage.database`.
pub const ENV_DATABASE: &str = "DB_DATASOURCE";

/// Top-level event configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    /// Score submission settings.
    pub game: GameConfig,

    /// Draw engine settings.
    #[serde(default)]
    pub draw: DrawConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Award catalog, seeded once into an empty store.
    #[serde(default)]
    pub awards: Vec<AwardSpec>,
}

/// Score submission settings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    /// Secret shared with the game client for submission signatures.
    #[serde(deserialize_with = "deserialize_secret")]
    pub app_secret: SecretString,

    /// Points needed for one draw chance.
    #[serde(default = "default_score_to_chance_ratio")]
    pub score_to_chance_ratio: i64,

    /// Highest plausible score rate; faster games are rejected as abnormal.
    #[serde(default = "default_max_score_per_second")]
    pub max_score_per_second: f64,

    /// Lifetime of nonce markers in seconds.
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,
}

impl GameConfig {
    /// Nonce marker lifetime.
    #[must_use]
    pub const fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }
}

/// What happens to the deducted chance when a draw fails for a system
/// reason (inventory exhausted, collision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemFaultPolicy {
    /// Roll the whole draw back, returning the chance.
    #[default]
    Refund,
    /// Keep the chance deduction and report the error.
    Forfeit,
}

/// Draw engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrawConfig {
    /// Award a user may win at most once in a lifetime.
    #[serde(default = "default_exclusive_award")]
    pub exclusive_award: Option<String>,

    /// Predecessor digest of the first audit link.
    #[serde(default = "default_genesis_hash")]
    pub genesis_hash: String,

    /// Chance handling on system faults.
    #[serde(default)]
    pub on_system_fault: SystemFaultPolicy,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            exclusive_award: default_exclusive_award(),
            genesis_hash: default_genesis_hash(),
            on_system_fault: SystemFaultPolicy::default(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the `SQLite` database.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

const fn default_score_to_chance_ratio() -> i64 {
    1000
}

const fn default_max_score_per_second() -> f64 {
    50.0
}

const fn default_nonce_ttl_secs() -> u64 {
    300
}

#[allow(clippy::unnecessary_wraps)]
fn default_exclusive_award() -> Option<String> {
    Some("Vacation Reward Card".to_string())
}

fn default_genesis_hash() -> String {
    GENESIS_HASH.to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("prizedraw.db")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl EventConfig {
    /// Loads, patches from the process environment, and validates a TOML
    /// configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML string without consulting the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces secrets and paths with values from `lookup` where present.
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_APP_SECRET).filter(|v| !v.is_empty()) {
            self.game.app_secret = SecretString::from(secret);
        }
        if let Some(database) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.storage.database = PathBuf::from(database);
        }
    }

    /// Checks invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.app_secret.expose_secret().is_empty() {
            return Err(ConfigError::Validation("game.app_secret must not be empty".into()));
        }
        if self.game.score_to_chance_ratio <= 0 {
            return Err(ConfigError::Validation(format!(
                "game.score_to_chance_ratio must be positive, got {}",
                self.game.score_to_chance_ratio
            )));
        }
        let rate = self.game.max_score_per_second;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "game.max_score_per_second must be a positive number, got {rate}"
            )));
        }
        if self.game.nonce_ttl_secs == 0 {
            return Err(ConfigError::Validation("game.nonce_ttl_secs must be at least 1".into()));
        }
        if self.draw.genesis_hash.is_empty() {
            return Err(ConfigError::Validation("draw.genesis_hash must not be empty".into()));
        }

        let mut names = HashSet::new();
        for award in &self.awards {
            if award.name.is_empty() {
                return Err(ConfigError::Validation("award name must not be empty".into()));
            }
            if !names.insert(award.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate award name: {}",
                    award.name
                )));
            }
            if award.total < 0 || award.weight < 0 || award.value < 0 {
                return Err(ConfigError::Validation(format!(
                    "award {} has a negative total, weight, or value",
                    award.name
                )));
            }
        }
        Ok(())
    }
}
