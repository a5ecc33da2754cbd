//! [`DrawEngine`] implementation.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::selection;
use crate::audit::AuditChain;
use crate::config::{EventConfig, SystemFaultPolicy};
use crate::error::EngineError;
use crate::store::{Award, Credit, DrawRecord, Repository, SqliteStore};

/// Result of a committed draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawOutcome {
    /// The awarded prize, with stock as of this draw.
    pub award: Award,
    /// True when the sunshine fallback replaced the weighted pick.
    pub fallback: bool,
    /// Audit link recorded for this draw.
    pub link: DrawRecord,
}

/// Runs draws against the shared inventory.
#[derive(Debug, Clone)]
pub struct DrawEngine {
    config: Arc<EventConfig>,
    store: SqliteStore,
    audit: AuditChain,
}

impl DrawEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(config: Arc<EventConfig>, store: SqliteStore) -> Self {
        let audit = AuditChain::new(config.draw.genesis_hash.clone());
        Self {
            config,
            store,
            audit,
        }
    }

    /// Audit chain used for appends.
    #[must_use]
    pub const fn audit(&self) -> &AuditChain {
        &self.audit
    }

    /// Draws one award for `user_id` using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoChances`], [`EngineError::UnknownUser`],
    /// [`EngineError::InventoryExhausted`], [`EngineError::PrizeCollision`],
    /// or a storage error.
    pub fn draw(&self, user_id: &str) -> Result<DrawOutcome, EngineError> {
        self.draw_with_rng(user_id, &mut rand::thread_rng())
    }

    /// Draws one award for `user_id` using `rng` for the weighted pick.
    ///
    /// # Errors
    ///
    /// See [`Self::draw`].
    pub fn draw_with_rng<R>(&self, user_id: &str, rng: &mut R) -> Result<DrawOutcome, EngineError>
    where
        R: Rng + ?Sized,
    {
        let policy = self.config.draw.on_system_fault;
        let result = self.store.immediate_with(
            |tx| self.draw_in(&Repository::new(tx), user_id, rng),
            |err: &EngineError| policy == SystemFaultPolicy::Forfeit && err.is_inventory_fault(),
        );

        match &result {
            Ok(outcome) => info!(
                user_id,
                award_id = outcome.award.id,
                award = %outcome.award.name,
                fallback = outcome.fallback,
                seq_id = outcome.link.seq_id,
                "draw committed"
            ),
            Err(err) if err.requires_escalation() => error!(
                user_id,
                kind = %err.kind(),
                policy = ?policy,
                error = %err,
                "draw failed on system fault"
            ),
            Err(err) => debug!(user_id, kind = %err.kind(), "draw rejected"),
        }
        result
    }

    fn draw_in<R>(
        &self,
        repo: &Repository<'_>,
        user_id: &str,
        rng: &mut R,
    ) -> Result<DrawOutcome, EngineError>
    where
        R: Rng + ?Sized,
    {
        if !repo.take_chance_if_positive(user_id)? {
            return Err(if repo.user(user_id)?.is_some() {
                EngineError::NoChances {
                    user_id: user_id.to_string(),
                }
            } else {
                EngineError::UnknownUser {
                    user_id: user_id.to_string(),
                }
            });
        }

        let mut candidates = repo.awards_in_stock()?;
        if let Some(exclusive) = self.exclusive_award() {
            if repo.has_won_award(user_id, exclusive)? {
                candidates.retain(|award| award.name != exclusive);
            }
        }

        let (selected, mut fallback) = match selection::select(&candidates, rng) {
            Some(award) => (award.clone(), false),
            None => {
                let award = repo
                    .first_sunshine_in_stock()?
                    .ok_or(EngineError::InventoryExhausted)?;
                (award, true)
            },
        };

        let (award, collided) = commit_inventory(repo, selected)?;
        fallback |= collided;

        if let Some(points) = award.point_credit() {
            match repo.credit_user(user_id, points, 0)? {
                Credit::Applied => {},
                Credit::UnknownUser => {
                    return Err(EngineError::UnknownUser {
                        user_id: user_id.to_string(),
                    });
                },
                Credit::Overflow => {
                    return Err(EngineError::InvalidData {
                        reason: format!("{points} prize points would overflow the user's total"),
                    });
                },
            }
        }

        let link = self.audit.append(repo, user_id, award.id, &award.name)?;
        Ok(DrawOutcome {
            award,
            fallback,
            link,
        })
    }

    fn exclusive_award(&self) -> Option<&str> {
        self.config
            .draw
            .exclusive_award
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}

/// Takes one unit of `selected`'s stock, falling back once to the first
/// sunshine award in stock if `selected` ran out since it was read.
///
/// Returns the awarded prize with its post-draw stock, and whether the
/// fallback was used.
pub(crate) fn commit_inventory(
    repo: &Repository<'_>,
    selected: Award,
) -> Result<(Award, bool), EngineError> {
    if repo.take_award_if_in_stock(selected.id)? {
        return Ok((taken(selected), false));
    }

    warn!(
        award_id = selected.id,
        "selected award ran out before commit, trying sunshine fallback"
    );
    let collision = EngineError::PrizeCollision {
        award_id: selected.id,
    };
    let Some(fallback) = repo.first_sunshine_in_stock()? else {
        return Err(collision);
    };
    if repo.take_award_if_in_stock(fallback.id)? {
        Ok((taken(fallback), true))
    } else {
        Err(collision)
    }
}

fn taken(mut award: Award) -> Award {
    award.remaining -= 1;
    award
}

