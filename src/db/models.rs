//! Database row types for the draw tables in `migrations/`.
//! Used by sqlx for typed queries and serialized as-is by the API.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{ClaimStatus, DrawStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Draw {
    pub id: i64,
    pub draw_date: NaiveDate,
    pub prize_structure_id: i64,
    pub status: DrawStatus,
    pub eligible_count: i64,
    pub total_weight: i64,
    pub executed_by: String,
    pub created_at_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WinnerRecord {
    pub id: i64,
    pub draw_id: i64,
    pub prize_tier_id: i64,
    pub msisdn: String,
    pub is_runner_up: bool,
    pub runner_up_rank: Option<i64>,
    pub points_at_win: i64,
    pub claim_status: ClaimStatus,
    pub forfeited_at_ns: Option<i64>,
    pub forfeit_reason: Option<String>,
    /// On a promoted record: the forfeited winner it replaced.
    pub promoted_from_id: Option<i64>,
    pub created_at_ns: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PrizeStructureRow {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ParticipantRow {
    pub msisdn: String,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawWithWinners {
    pub draw: Draw,
    pub winners: Vec<WinnerRecord>,
}

/// Winner side of a forfeiture.
#[derive(Debug, Clone)]
pub struct ForfeitUpdate {
    pub winner_id: i64,
    pub reason: String,
    pub forfeited_at_ns: i64,
}

/// Both records after a forfeiture, as committed.
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub forfeited: WinnerRecord,
    pub promoted: WinnerRecord,
}
