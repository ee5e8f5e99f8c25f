use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::config::COMMIT_RETRY_BACKOFF_MS;
use crate::db::models::{
    Draw, DrawWithWinners, ForfeitUpdate, ParticipantRow, PrizeStructureRow, Promotion,
    WinnerRecord,
};
use crate::db::{EligibilityProvider, PrizeConfigProvider, ResultStore};
use crate::error::{AppError, Result};
use crate::types::{
    ClaimStatus, DrawStatus, NewDraw, NewWinner, Participant, PrizeStructure, PrizeTier,
};

const DRAW_COLUMNS: &str = "id, draw_date, prize_structure_id, status, eligible_count, \
     total_weight, executed_by, created_at_ns";

const WINNER_COLUMNS: &str = "id, draw_id, prize_tier_id, msisdn, is_runner_up, runner_up_rank, \
     points_at_win, claim_status, forfeited_at_ns, forfeit_reason, promoted_from_id, created_at_ns";

/// SQLite-backed draw results, eligibility and prize configuration.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_draw(&self, draw_id: i64) -> Result<Option<Draw>> {
        let mut conn = self.pool.acquire().await?;
        fetch_draw(&mut conn, draw_id).await
    }

    pub async fn list_draws(&self, draw_date: NaiveDate) -> Result<Vec<Draw>> {
        let draws = sqlx::query_as::<_, Draw>(&format!(
            "SELECT {DRAW_COLUMNS} FROM draws WHERE draw_date = ? ORDER BY id"
        ))
        .bind(draw_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(draws)
    }

    /// Winners of a draw, tiers in processing order: winners first, then
    /// runner-ups by rank.
    pub async fn list_winners(&self, draw_id: i64) -> Result<Vec<WinnerRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_winners(&mut conn, draw_id).await
    }

    pub async fn draw_with_winners(&self, draw_id: i64) -> Result<Option<DrawWithWinners>> {
        let Some(draw) = self.get_draw(draw_id).await? else {
            return Ok(None);
        };
        let winners = self.list_winners(draw_id).await?;
        Ok(Some(DrawWithWinners { draw, winners }))
    }

    async fn try_persist_draw(&self, draw: &NewDraw, winners: &[NewWinner]) -> Result<DrawWithWinners> {
        let mut tx = self.pool.begin().await?;

        if completed_draw_exists(&mut tx, draw.draw_date, draw.prize_structure_id).await? {
            return Err(already_executed(draw));
        }

        let draw_id = match insert_draw(&mut tx, draw, draw.status).await {
            Err(AppError::Database(e)) if is_unique_violation(&e) => {
                return Err(already_executed(draw));
            }
            other => other?,
        };

        for w in winners {
            sqlx::query(
                r#"
                INSERT INTO winners (
                    draw_id, prize_tier_id, msisdn, is_runner_up, runner_up_rank,
                    points_at_win, claim_status, created_at_ns
                ) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
                "#,
            )
            .bind(draw_id)
            .bind(w.prize_tier_id)
            .bind(&w.msisdn)
            .bind(w.is_runner_up)
            .bind(w.runner_up_rank.map(i64::from))
            .bind(to_i64(w.points_at_win, "points_at_win")?)
            .bind(draw.created_at_ns)
            .execute(&mut *tx)
            .await?;
        }

        let saved = DrawWithWinners {
            draw: fetch_draw(&mut tx, draw_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?,
            winners: fetch_winners(&mut tx, draw_id).await?,
        };

        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                already_executed(draw)
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(saved)
    }

    async fn try_promote_runner_up(&self, forfeit: &ForfeitUpdate) -> Result<Promotion> {
        let mut tx = self.pool.begin().await?;

        // Write first: the transaction takes the write lock on its first
        // statement, so it waits out a concurrent forfeiture instead of
        // failing to upgrade a stale read.
        let (draw_id, prize_tier_id): (i64, i64) = sqlx::query_as(
            r#"
            UPDATE winners
            SET claim_status = 'forfeited', forfeited_at_ns = ?, forfeit_reason = ?
            WHERE id = ? AND is_runner_up = 0
              AND claim_status IN ('pending', 'notified', 'promoted')
            RETURNING draw_id, prize_tier_id
            "#,
        )
        .bind(forfeit.forfeited_at_ns)
        .bind(&forfeit.reason)
        .bind(forfeit.winner_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::InvalidForfeiture {
            winner_id: forfeit.winner_id,
            reason: "winner is no longer pending, notified or promoted".to_string(),
        })?;

        let promoted = sqlx::query_as::<_, WinnerRecord>(&format!(
            r#"
            UPDATE winners
            SET is_runner_up = 0, claim_status = 'promoted', promoted_from_id = ?
            WHERE id = (
                SELECT id FROM winners
                WHERE draw_id = ? AND prize_tier_id = ?
                  AND is_runner_up = 1 AND claim_status = 'pending'
                ORDER BY runner_up_rank ASC, id ASC
                LIMIT 1
            )
            RETURNING {WINNER_COLUMNS}
            "#
        ))
        .bind(forfeit.winner_id)
        .bind(draw_id)
        .bind(prize_tier_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NoEligibleRunnerUp { draw_id, prize_tier_id })?;

        let forfeited = fetch_winner(&mut tx, forfeit.winner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("winner {}", forfeit.winner_id)))?;

        tx.commit().await?;
        Ok(Promotion { forfeited, promoted })
    }
}

impl ResultStore for SqliteStore {
    async fn exists_completed_draw(&self, draw_date: NaiveDate, prize_structure_id: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        completed_draw_exists(&mut conn, draw_date, prize_structure_id).await
    }

    async fn persist_draw(&self, draw: &NewDraw, winners: &[NewWinner]) -> Result<DrawWithWinners> {
        let what = format!("draw for {}", draw.draw_date);
        let saved = retry_transient(&what, move || self.try_persist_draw(draw, winners)).await?;
        info!(draw_id = saved.draw.id, winners = saved.winners.len(), "Draw committed");
        Ok(saved)
    }

    async fn record_failed_draw(&self, draw: &NewDraw) -> Result<Draw> {
        let mut tx = self.pool.begin().await?;
        let draw_id = insert_draw(&mut tx, draw, DrawStatus::Failed).await?;
        let failed = fetch_draw(&mut tx, draw_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))?;
        tx.commit().await?;
        Ok(failed)
    }

    async fn get_winner(&self, winner_id: i64) -> Result<Option<WinnerRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_winner(&mut conn, winner_id).await
    }

    async fn next_runner_up(&self, draw_id: i64, prize_tier_id: i64) -> Result<Option<WinnerRecord>> {
        let runner_up = sqlx::query_as::<_, WinnerRecord>(&format!(
            "SELECT {WINNER_COLUMNS} FROM winners \
             WHERE draw_id = ? AND prize_tier_id = ? AND is_runner_up = 1 AND claim_status = 'pending' \
             ORDER BY runner_up_rank ASC LIMIT 1"
        ))
        .bind(draw_id)
        .bind(prize_tier_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(runner_up)
    }

    async fn promote_runner_up(&self, forfeit: &ForfeitUpdate) -> Result<Promotion> {
        let what = format!("forfeiture of winner {}", forfeit.winner_id);
        retry_transient(&what, move || self.try_promote_runner_up(forfeit)).await
    }

    async fn update_claim_status(&self, winner_id: i64, from: ClaimStatus, to: ClaimStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE winners SET claim_status = ? WHERE id = ? AND claim_status = ? AND is_runner_up = 0",
        )
        .bind(to)
        .bind(winner_id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidClaimTransition { winner_id, from, to });
        }
        Ok(())
    }
}

impl EligibilityProvider for SqliteStore {
    /// Points earned from the structure's `valid_from` through the draw date,
    /// summed per MSISDN, blacklisted numbers removed.
    async fn eligible_participants(
        &self,
        draw_date: NaiveDate,
        structure: &PrizeStructure,
    ) -> Result<Vec<Participant>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT e.msisdn AS msisdn, SUM(e.points) AS weight
            FROM point_entries e
            WHERE e.earned_on >= ? AND e.earned_on <= ?
              AND e.msisdn NOT IN (SELECT msisdn FROM blacklist)
            GROUP BY e.msisdn
            HAVING SUM(e.points) > 0
            ORDER BY e.msisdn
            "#,
        )
        .bind(structure.valid_from)
        .bind(draw_date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let weight = u64::try_from(r.weight).map_err(|_| {
                    AppError::Validation(format!("negative point total for {}", r.msisdn))
                })?;
                Ok(Participant { msisdn: r.msisdn, weight })
            })
            .collect()
    }
}

impl PrizeConfigProvider for SqliteStore {
    async fn prize_structure(&self, prize_structure_id: i64) -> Result<Option<PrizeStructure>> {
        let Some(row) = sqlx::query_as::<_, PrizeStructureRow>(
            "SELECT id, name, is_active, valid_from, valid_until FROM prize_structures WHERE id = ?",
        )
        .bind(prize_structure_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tiers = sqlx::query_as::<_, PrizeTier>(
            r#"
            SELECT id, prize_structure_id, name, winner_count, runner_up_count,
                   processing_order, display_value
            FROM prize_tiers
            WHERE prize_structure_id = ?
            ORDER BY processing_order, id
            "#,
        )
        .bind(prize_structure_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PrizeStructure {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            tiers,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn completed_draw_exists(
    conn: &mut SqliteConnection,
    draw_date: NaiveDate,
    prize_structure_id: i64,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM draws
        WHERE draw_date = ? AND prize_structure_id = ?
          AND status IN ('completed', 'completed_no_participants')
        "#,
    )
    .bind(draw_date)
    .bind(prize_structure_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

async fn fetch_draw(conn: &mut SqliteConnection, draw_id: i64) -> Result<Option<Draw>> {
    let draw = sqlx::query_as::<_, Draw>(&format!("SELECT {DRAW_COLUMNS} FROM draws WHERE id = ?"))
        .bind(draw_id)
        .fetch_optional(conn)
        .await?;
    Ok(draw)
}

async fn fetch_winner(conn: &mut SqliteConnection, winner_id: i64) -> Result<Option<WinnerRecord>> {
    let winner = sqlx::query_as::<_, WinnerRecord>(&format!(
        "SELECT {WINNER_COLUMNS} FROM winners WHERE id = ?"
    ))
    .bind(winner_id)
    .fetch_optional(conn)
    .await?;
    Ok(winner)
}

async fn fetch_winners(conn: &mut SqliteConnection, draw_id: i64) -> Result<Vec<WinnerRecord>> {
    let winners = sqlx::query_as::<_, WinnerRecord>(&format!(
        r#"
        SELECT {WINNER_COLUMNS} FROM winners
        WHERE draw_id = ?
        ORDER BY (SELECT t.processing_order FROM prize_tiers t WHERE t.id = winners.prize_tier_id),
                 prize_tier_id, runner_up_rank IS NOT NULL, runner_up_rank, id
        "#
    ))
    .bind(draw_id)
    .fetch_all(conn)
    .await?;
    Ok(winners)
}

async fn insert_draw(
    tx: &mut Transaction<'_, Sqlite>,
    draw: &NewDraw,
    status: DrawStatus,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO draws (
            draw_date, prize_structure_id, status, eligible_count,
            total_weight, executed_by, created_at_ns
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(draw.draw_date)
    .bind(draw.prize_structure_id)
    .bind(status)
    .bind(to_i64(draw.eligible_count, "eligible_count")?)
    .bind(to_i64(draw.total_weight, "total_weight")?)
    .bind(&draw.executed_by)
    .bind(draw.created_at_ns)
    .execute(&mut **tx)
    .await?;
    Ok(result.last_insert_rowid())
}

fn already_executed(draw: &NewDraw) -> AppError {
    AppError::DrawAlreadyExecuted {
        draw_date: draw.draw_date,
        prize_structure_id: draw.prize_structure_id,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Busy/locked database or pool starvation. A failed commit leaves nothing
/// behind, so the whole transaction can be replayed.
fn is_transient(e: &AppError) -> bool {
    match e {
        AppError::Database(sqlx::Error::PoolTimedOut) => true,
        AppError::Database(sqlx::Error::Database(db)) => matches!(
            db.code().as_deref(),
            Some("5" | "6" | "261" | "262" | "517" | "773")
        ),
        _ => false,
    }
}

/// Run a write transaction, replaying it on transient errors per
/// `COMMIT_RETRY_BACKOFF_MS`.
async fn retry_transient<T, F, Fut>(what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Err(e) if is_transient(&e) && attempt < COMMIT_RETRY_BACKOFF_MS.len() => {
                let backoff = COMMIT_RETRY_BACKOFF_MS[attempt];
                attempt += 1;
                warn!(attempt, backoff_ms = backoff, "Transient error committing {what}: {e}; retrying");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            other => return other,
        }
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{field} {value} exceeds i64")))
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub async fn store() -> SqliteStore {
        SqliteStore::new(crate::db::connect_in_memory().await.unwrap())
    }

    /// Insert an active structure valid from 2024-01-01 with the given
    /// `(name, winners, runner_ups, processing_order)` tiers.
    pub async fn seed_structure(store: &SqliteStore, tiers: &[(&str, u32, u32, i64)]) -> PrizeStructure {
        let id = sqlx::query(
            "INSERT INTO prize_structures (name, is_active, valid_from, valid_until) VALUES (?, 1, ?, NULL)",
        )
        .bind("Daily Draw")
        .bind(date(2024, 1, 1))
        .execute(store.pool())
        .await
        .unwrap()
        .last_insert_rowid();

        for &(name, winners, runner_ups, order) in tiers {
            sqlx::query(
                "INSERT INTO prize_tiers (prize_structure_id, name, winner_count, runner_up_count, processing_order, display_value) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(name)
            .bind(winners)
            .bind(runner_ups)
            .bind(order)
            .bind("N10,000")
            .execute(store.pool())
            .await
            .unwrap();
        }

        store.prize_structure(id).await.unwrap().unwrap()
    }

    pub fn new_draw(structure: &PrizeStructure, status: DrawStatus) -> NewDraw {
        NewDraw {
            draw_date: date(2024, 3, 1),
            prize_structure_id: structure.id,
            status,
            eligible_count: 3,
            total_weight: 30,
            executed_by: "admin@example.com".to_string(),
            created_at_ns: 1_700_000_000_000_000_000,
        }
    }

    pub fn new_winner(tier_id: i64, msisdn: &str, rank: Option<u32>) -> NewWinner {
        NewWinner {
            prize_tier_id: tier_id,
            msisdn: msisdn.to_string(),
            is_runner_up: rank.is_some(),
            runner_up_rank: rank,
            points_at_win: 10,
        }
    }
}
