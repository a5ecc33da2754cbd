//! `prizedraw init`.

use anyhow::{Context, Result};
use prizedraw_core::PromoService;
use serde::Serialize;

#[derive(Serialize)]
struct InitReport {
    database: String,
    seeded: usize,
    awards: usize,
}

/// Seeds the catalog into a fresh store and reports the catalog size.
pub fn run(service: &PromoService) -> Result<()> {
    let seeded = service.seed_catalog().context("failed to seed catalog")?;
    let awards = service
        .store()
        .awards()
        .context("failed to read catalog")?
        .len();

    super::print_json(&InitReport {
        database: service.config().storage.database.display().to_string(),
        seeded,
        awards,
    })
}
