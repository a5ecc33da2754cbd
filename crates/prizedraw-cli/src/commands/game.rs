//! User and score commands: `register`, `start`, `sign`, `submit`.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Args;
use prizedraw_core::integrity::{self, ScorePayload};
use prizedraw_core::{PromoService, ScoreSubmission};
use secrecy::ExposeSecret;
use serde::Serialize;

/// Fields of a finished game.
#[derive(Args, Debug)]
pub struct GameArgs {
    /// Nonce from `prizedraw start`.
    #[arg(long)]
    pub nonce: String,

    /// Final score.
    #[arg(long, allow_negative_numbers = true)]
    pub score: i64,

    /// Game duration in seconds.
    #[arg(long, allow_negative_numbers = true)]
    pub duration: i64,

    /// Client timestamp; defaults to the current Unix time.
    #[arg(long)]
    pub timestamp: Option<String>,
}

impl GameArgs {
    fn timestamp(&self) -> String {
        self.timestamp.clone().unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
                .to_string()
        })
    }
}

/// Arguments of `prizedraw sign`.
#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub game: GameArgs,
}

/// Arguments of `prizedraw submit`.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Submitting user.
    pub user_id: String,

    #[command(flatten)]
    pub game: GameArgs,

    /// Client signature; computed with the configured secret when omitted.
    #[arg(long)]
    pub signature: Option<String>,
}

#[derive(Serialize)]
struct Signed<'a> {
    nonce: &'a str,
    score: i64,
    duration: i64,
    timestamp: &'a str,
    signature: String,
}

#[derive(Serialize)]
struct Accepted<'a> {
    user_id: &'a str,
    earned_chances: i64,
    total_score: Option<i64>,
    chances: Option<i64>,
}

/// Registers a user and prints the stored record.
pub fn register(service: &PromoService, user_id: &str) -> Result<()> {
    let user = service.register_user(user_id).map_err(super::engine_error)?;
    super::print_json(&user)
}

/// Issues a game ticket.
pub fn start(service: &PromoService, user_id: &str) -> Result<()> {
    let ticket = service.start_game(user_id).map_err(super::engine_error)?;
    super::print_json(&ticket)
}

/// Prints the signature a client would send for the given game.
pub fn sign(service: &PromoService, args: &SignArgs) -> Result<()> {
    let game = &args.game;
    let timestamp = game.timestamp();
    let signature = sign_with_config(service, game, &timestamp);

    super::print_json(&Signed {
        nonce: &game.nonce,
        score: game.score,
        duration: game.duration,
        timestamp: &timestamp,
        signature,
    })
}

/// Submits a game and prints the chances earned.
pub fn submit(service: &PromoService, args: &SubmitArgs) -> Result<()> {
    let game = &args.game;
    let timestamp = game.timestamp();
    let signature = args
        .signature
        .clone()
        .unwrap_or_else(|| sign_with_config(service, game, &timestamp));

    let submission = ScoreSubmission {
        user_id: args.user_id.clone(),
        score: game.score,
        duration: game.duration,
        nonce: game.nonce.clone(),
        signature,
        timestamp,
    };
    let earned = service
        .submit_score(&submission)
        .map_err(super::engine_error)?;

    let user = service.store().user(&args.user_id)?;
    super::print_json(&Accepted {
        user_id: &args.user_id,
        earned_chances: earned,
        total_score: user.as_ref().map(|u| u.total_score),
        chances: user.as_ref().map(|u| u.chances),
    })
}

fn sign_with_config(service: &PromoService, game: &GameArgs, timestamp: &str) -> String {
    let payload = ScorePayload::new(&game.nonce, game.score, game.duration, timestamp);
    integrity::sign(service.config().game.app_secret.expose_secret(), &payload)
}
