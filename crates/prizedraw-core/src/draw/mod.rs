//! Draw engine.
//!
//! A draw runs as one `BEGIN IMMEDIATE` transaction:
//!
//! 1. Take one chance with a conditional decrement (`chances > 0`).
//! 2. Load every award with stock left.
//! 3. Drop the exclusive award if the user already won it.
//! 4. Pick a candidate by weight (see [`selection`]).
//! 5. With no candidates, fall back to the first sunshine award in stock,
//!    or fail with [`EngineError::InventoryExhausted`].
//! 6. Take one unit of stock with a conditional decrement. If the award ran
//!    out in the meantime, try the first sunshine award in stock exactly
//!    once, then fail with [`EngineError::PrizeCollision`].
//! 7. Credit point awards to the user's total score.
//! 8. Append the audit link.
//!
//! Any error rolls the whole transaction back, except that under
//! [`SystemFaultPolicy::Forfeit`](crate::config::SystemFaultPolicy::Forfeit)
//! the chance deduction of step 1 is kept for the two inventory faults.
//!
//! [`EngineError::InventoryExhausted`]: crate::EngineError::InventoryExhausted
//! [`EngineError::PrizeCollision`]: crate::EngineError::PrizeCollision

mod engine;
pub mod selection;

#[cfg(test)]
mod tests;

pub use engine::{DrawEngine, DrawOutcome};
