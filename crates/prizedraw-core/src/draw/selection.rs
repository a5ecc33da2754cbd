//! Weighted award selection.
//!
//! Selection walks the candidates in order, accumulating weight, and picks
//! the first one whose cumulative weight exceeds a ticket drawn uniformly
//! from `[0, total_weight)`. Equal cumulative bounds favour the earlier
//! candidate. Zero or negative weights contribute nothing, so such awards
//! are only reachable through the degenerate case.

use rand::Rng;

use crate::store::Award;

/// Sum of the positive candidate weights, saturating.
#[must_use]
pub fn total_weight(candidates: &[Award]) -> i64 {
    candidates
        .iter()
        .fold(0_i64, |acc, award| acc.saturating_add(award.weight.max(0)))
}

/// Picks the candidate that owns `ticket` in the cumulative weight walk.
///
/// When the total weight is not positive the first candidate is returned.
/// A ticket past the total falls through to the last candidate. Returns
/// `None` only for an empty slice.
#[must_use]
pub fn pick_by_ticket(candidates: &[Award], ticket: i64) -> Option<&Award> {
    if total_weight(candidates) <= 0 {
        return candidates.first();
    }

    let mut cumulative = 0_i64;
    for award in candidates {
        cumulative = cumulative.saturating_add(award.weight.max(0));
        if ticket < cumulative {
            return Some(award);
        }
    }
    candidates.last()
}

/// Draws a ticket from `rng` and picks the matching candidate.
pub fn select<'a, R>(candidates: &'a [Award], rng: &mut R) -> Option<&'a Award>
where
    R: Rng + ?Sized,
{
    let total = total_weight(candidates);
    let ticket = if total > 0 { rng.gen_range(0..total) } else { 0 };
    pick_by_ticket(candidates, ticket)
}
