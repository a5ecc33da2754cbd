//! `prizedraw draw`.

use anyhow::Result;
use prizedraw_core::PromoService;

/// Spends one chance and prints the outcome with its audit link.
pub fn run(service: &PromoService, user_id: &str) -> Result<()> {
    let outcome = service.draw(user_id).map_err(super::engine_error)?;
    super::print_json(&outcome)
}
