//! Row models for the prize draw tables.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Prize tier.
///
/// Stored as an integer code so the catalog stays compact and sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardCategory {
    /// Top prizes, very limited stock.
    Grand,
    /// Ordinary prizes.
    Regular,
    /// Low-value consolation tier with effectively unlimited stock. Used as
    /// the fallback whenever the primary selection cannot be honoured.
    Sunshine,
    /// Credits `value` points to the winner's total score.
    Points,
}

impl AwardCategory {
    /// Storage code for this category.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Grand => 1,
            Self::Regular => 2,
            Self::Sunshine => 3,
            Self::Points => 4,
        }
    }

    /// Parses a storage code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Grand),
            2 => Some(Self::Regular),
            3 => Some(Self::Sunshine),
            4 => Some(Self::Points),
            _ => None,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grand => "grand",
            Self::Regular => "regular",
            Self::Sunshine => "sunshine",
            Self::Points => "points",
        }
    }
}

impl std::fmt::Display for AwardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for AwardCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for AwardCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Stable identifier resolved by the identity provider.
    pub user_id: String,
    /// Accumulated score, including point-prize credits.
    pub total_score: i64,
    /// Remaining draw chances. Never negative.
    pub chances: i64,
    /// Registration time in nanoseconds since Unix epoch.
    pub created_at_ns: u64,
}

/// A catalog entry as configured before seeding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwardSpec {
    /// Display name, unique within the catalog.
    pub name: String,
    /// Prize tier.
    pub category: AwardCategory,
    /// Initial stock.
    pub total: i64,
    /// Relative draw weight.
    #[serde(default)]
    pub weight: i64,
    /// Points credited on win (points tier only).
    #[serde(default)]
    pub value: i64,
    /// Image reference for display.
    #[serde(default)]
    pub image_url: String,
}

/// A catalog entry with live inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Award {
    /// Surrogate id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Prize tier.
    pub category: AwardCategory,
    /// Initial stock.
    pub total: i64,
    /// Stock left. Always `0 <= remaining <= total`.
    pub remaining: i64,
    /// Relative draw weight.
    pub weight: i64,
    /// Points credited on win (points tier only).
    pub value: i64,
    /// Image reference for display.
    pub image_url: String,
}

impl Award {
    /// Points this award credits to the winner, if any.
    #[must_use]
    pub const fn point_credit(&self) -> Option<i64> {
        match self.category {
            AwardCategory::Points if self.value > 0 => Some(self.value),
            _ => None,
        }
    }
}

/// One accepted score submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameRecord {
    /// Sequence ID (assigned on insert).
    pub seq_id: Option<u64>,
    /// Submitting user.
    pub user_id: String,
    /// Globally unique submission id, `"{user_id}-{nonce}"`.
    pub game_id: String,
    /// Submitted score.
    pub score: i64,
    /// Submitted duration in seconds.
    pub duration: i64,
    /// Single-use nonce. Unique system-wide.
    pub nonce: String,
    /// Client signature as submitted.
    pub signature: String,
    /// Client timestamp as signed.
    pub timestamp: String,
    /// Acceptance time in nanoseconds since Unix epoch.
    pub created_at_ns: u64,
}

impl GameRecord {
    /// Builds the submission id for a user and nonce.
    #[must_use]
    pub fn game_id_for(user_id: &str, nonce: &str) -> String {
        format!("{user_id}-{nonce}")
    }
}

/// One link of the draw audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawRecord {
    /// Sequence ID (assigned on insert). Defines chain order.
    pub seq_id: Option<u64>,
    /// Winning user.
    pub user_id: String,
    /// Awarded prize id.
    pub award_id: i64,
    /// Awarded prize name at draw time.
    pub award_name: String,
    /// `final_hash` of the previous link, or the genesis value.
    pub prev_hash: String,
    /// `digest(user_id || award_id || created_at_ns)`.
    pub data_hash: String,
    /// `digest(data_hash || prev_hash)`.
    pub final_hash: String,
    /// Draw time in nanoseconds since Unix epoch.
    pub created_at_ns: u64,
}
