//! Subcommand implementations.

pub mod audit;
pub mod draw;
pub mod game;
pub mod init;

use anyhow::{Context, Result, anyhow};
use prizedraw_core::EngineError;
use serde::Serialize;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

/// Turns an engine error into a report carrying its stable kind and the
/// player-facing message.
pub fn engine_error(err: EngineError) -> anyhow::Error {
    let escalate = if err.requires_escalation() {
        " [escalate]"
    } else {
        ""
    };
    anyhow!(
        "{}: {}{escalate} ({err})",
        err.kind(),
        err.user_message()
    )
}
