//! Storage boundary: the contracts the draw engine depends on, and their
//! SQLite implementation.

pub mod models;
pub mod store;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::Result;
use crate::types::{ClaimStatus, NewDraw, NewWinner, Participant, PrizeStructure};
use models::{Draw, DrawWithWinners, ForfeitUpdate, Promotion, WinnerRecord};

pub use store::SqliteStore;

/// Durable draw results.
pub trait ResultStore: Send + Sync {
    /// True if a Completed (or CompletedNoParticipants) draw exists for the pair.
    fn exists_completed_draw(
        &self,
        draw_date: NaiveDate,
        prize_structure_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Write the draw and all its winners in one transaction, re-checking
    /// [`exists_completed_draw`](Self::exists_completed_draw) inside it.
    /// Fails with `DrawAlreadyExecuted` if another completed draw won the race.
    /// The returned records are read inside the write transaction: an `Ok`
    /// always means committed, an `Err` always means nothing was written.
    fn persist_draw(
        &self,
        draw: &NewDraw,
        winners: &[NewWinner],
    ) -> impl Future<Output = Result<DrawWithWinners>> + Send;

    /// Record an attempt that did not complete. Never blocks later attempts.
    fn record_failed_draw(&self, draw: &NewDraw) -> impl Future<Output = Result<Draw>> + Send;

    fn get_winner(&self, winner_id: i64) -> impl Future<Output = Result<Option<WinnerRecord>>> + Send;

    /// Lowest-ranked pending runner-up for the tier, if any.
    fn next_runner_up(
        &self,
        draw_id: i64,
        prize_tier_id: i64,
    ) -> impl Future<Output = Result<Option<WinnerRecord>>> + Send;

    /// Forfeit the winner and promote the lowest-ranked pending runner-up of
    /// its draw and tier, in one transaction. The runner-up is chosen inside
    /// that transaction, so concurrent forfeitures in a tier promote distinct
    /// runner-ups. Nothing changes when no runner-up is left.
    fn promote_runner_up(&self, forfeit: &ForfeitUpdate) -> impl Future<Output = Result<Promotion>> + Send;

    /// Move a record from `from` to `to`; fails if it is no longer in `from`.
    fn update_claim_status(
        &self,
        winner_id: i64,
        from: ClaimStatus,
        to: ClaimStatus,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Supplies the draw pool, already filtered for blacklist and opt-out.
pub trait EligibilityProvider: Send + Sync {
    fn eligible_participants(
        &self,
        draw_date: NaiveDate,
        structure: &PrizeStructure,
    ) -> impl Future<Output = Result<Vec<Participant>>> + Send;
}

/// Supplies prize structures with their tiers.
pub trait PrizeConfigProvider: Send + Sync {
    fn prize_structure(
        &self,
        prize_structure_id: i64,
    ) -> impl Future<Output = Result<Option<PrizeStructure>>> + Send;
}

/// Open (creating if missing) the SQLite database and run migrations.
pub async fn connect(db_path: &str, max_connections: u32) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Private in-memory database on a single pinned connection.
pub async fn connect_in_memory() -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
