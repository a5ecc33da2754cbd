//! `prizedraw verify-chain`.

use anyhow::{Context, Result};
use prizedraw_core::PromoService;

/// Verifies every audit link and prints the chain length and head.
pub fn verify(service: &PromoService) -> Result<()> {
    let report = service
        .verify_audit_chain()
        .context("audit chain verification failed")?;
    super::print_json(&report)
}
