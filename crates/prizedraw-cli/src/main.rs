//! prizedraw - operator and test client for the prize draw engine
//!
//! Every subcommand opens the configured database, runs one operation, and
//! prints the result as JSON on stdout. Logs go to stderr or `--log-file`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prizedraw_core::PromoService;
use prizedraw_core::config::EventConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "prizedraw")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Event configuration file.
    #[arg(short, long, default_value = "prizedraw.toml")]
    config: PathBuf,

    /// Database path, overriding the configuration and `DB_DATASOURCE`.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log filter directive (e.g. `info`, `prizedraw_core=debug`).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the schema and seed the award catalog.
    Init,

    /// Find or create a user.
    Register {
        user_id: String,
    },

    /// Issue a game ticket (fresh nonce) for a user.
    Start {
        user_id: String,
    },

    /// Compute a submission signature with the configured secret.
    Sign(commands::game::SignArgs),

    /// Submit a finished game.
    Submit(commands::game::SubmitArgs),

    /// Spend one chance on a draw.
    Draw {
        user_id: String,
    },

    /// Recompute the audit chain from genesis.
    VerifyChain,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = EventConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    debug!(
        config = %cli.config.display(),
        database = %config.storage.database.display(),
        awards = config.awards.len(),
        "configuration loaded"
    );
    let service = PromoService::open(Arc::new(config)).context("failed to open store")?;

    match cli.command {
        Commands::Init => commands::init::run(&service),
        Commands::Register { user_id } => commands::game::register(&service, &user_id),
        Commands::Start { user_id } => commands::game::start(&service, &user_id),
        Commands::Sign(args) => commands::game::sign(&service, &args),
        Commands::Submit(args) => commands::game::submit(&service, &args),
        Commands::Draw { user_id } => commands::draw::run(&service, &user_id),
        Commands::VerifyChain => commands::audit::verify(&service),
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Some(log_file) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    }
    Ok(())
}
