use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Participants and prize configuration
// ---------------------------------------------------------------------------

/// One eligible participant. `weight` is the number of entries (points) held
/// when the draw starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub msisdn: String,
    pub weight: u64,
}

impl Participant {
    pub fn new(msisdn: impl Into<String>, weight: u64) -> Self {
        Self { msisdn: msisdn.into(), weight }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PrizeTier {
    pub id: i64,
    pub prize_structure_id: i64,
    pub name: String,
    pub winner_count: u32,
    pub runner_up_count: u32,
    /// Tiers run in ascending order; earlier tiers take precedence.
    pub processing_order: i64,
    pub display_value: String,
}

impl PrizeTier {
    pub fn slots(&self) -> u64 {
        u64::from(self.winner_count) + u64::from(self.runner_up_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeStructure {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub valid_from: NaiveDate,
    /// Open-ended when None.
    pub valid_until: Option<NaiveDate>,
    pub tiers: Vec<PrizeTier>,
}

impl PrizeStructure {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_until.map_or(true, |until| date <= until)
    }

    /// Tiers in processing order. Ties on `processing_order` fall back to the tier id.
    pub fn ordered_tiers(&self) -> Vec<&PrizeTier> {
        let mut tiers: Vec<&PrizeTier> = self.tiers.iter().collect();
        tiers.sort_by_key(|t| (t.processing_order, t.id));
        tiers
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DrawStatus {
    Pending,
    Completed,
    /// Eligible list was empty; a successful draw with no winners.
    CompletedNoParticipants,
    Failed,
}

impl DrawStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, DrawStatus::Completed | DrawStatus::CompletedNoParticipants)
    }
}

impl std::fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DrawStatus::Pending => "pending",
            DrawStatus::Completed => "completed",
            DrawStatus::CompletedNoParticipants => "completed_no_participants",
            DrawStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Notified,
    Claimed,
    /// Terminal.
    Forfeited,
    /// Former runner-up standing in for a forfeited winner.
    Promoted,
}

impl ClaimStatus {
    /// Happy-path transitions only. Forfeiture goes through the promoter, which
    /// pairs it with a runner-up promotion.
    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::Pending, ClaimStatus::Notified)
                | (ClaimStatus::Promoted, ClaimStatus::Notified)
                | (ClaimStatus::Notified, ClaimStatus::Claimed)
        )
    }

    pub fn is_forfeitable(self) -> bool {
        matches!(
            self,
            ClaimStatus::Pending | ClaimStatus::Notified | ClaimStatus::Promoted
        )
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Notified => "notified",
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Forfeited => "forfeited",
            ClaimStatus::Promoted => "promoted",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Draw assembly: built by the engine, handed to the store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRequest {
    pub draw_date: NaiveDate,
    pub prize_structure_id: i64,
    pub executed_by: String,
}

/// A draw ready to be written. `eligible_count` and `total_weight` are fixed
/// when the pool is built and never recomputed.
#[derive(Debug, Clone)]
pub struct NewDraw {
    pub draw_date: NaiveDate,
    pub prize_structure_id: i64,
    pub status: DrawStatus,
    pub eligible_count: u64,
    pub total_weight: u64,
    pub executed_by: String,
    pub created_at_ns: i64,
}

/// A winner or runner-up picked by tier selection, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWinner {
    pub prize_tier_id: i64,
    pub msisdn: String,
    pub is_runner_up: bool,
    /// 1-based, only set for runner-ups.
    pub runner_up_rank: Option<u32>,
    pub points_at_win: u64,
}

/// How many of a tier's slots were actually filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierFill {
    pub prize_tier_id: i64,
    pub tier_name: String,
    pub winners_requested: u32,
    pub winners_filled: u32,
    pub runner_ups_requested: u32,
    pub runner_ups_filled: u32,
}

impl TierFill {
    pub fn slots_requested(&self) -> u64 {
        u64::from(self.winners_requested) + u64::from(self.runner_ups_requested)
    }

    pub fn slots_filled(&self) -> u64 {
        u64::from(self.winners_filled) + u64::from(self.runner_ups_filled)
    }

    pub fn is_partial(&self) -> bool {
        self.slots_filled() < self.slots_requested()
    }

    pub fn summary(&self) -> String {
        format!(
            "filled {} of {} slots",
            self.slots_filled(),
            self.slots_requested()
        )
    }
}

/// Nanosecond UTC epoch timestamp.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(id: i64, order: i64) -> PrizeTier {
        PrizeTier {
            id,
            prize_structure_id: 1,
            name: format!("tier {id}"),
            winner_count: 1,
            runner_up_count: 0,
            processing_order: order,
            display_value: "N1,000".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn validity_window_is_inclusive() {
        let mut structure = PrizeStructure {
            id: 1,
            name: "Daily".to_string(),
            is_active: true,
            valid_from: date(2024, 1, 1),
            valid_until: Some(date(2024, 1, 31)),
            tiers: vec![],
        };
        assert!(structure.is_valid_on(date(2024, 1, 1)));
        assert!(structure.is_valid_on(date(2024, 1, 31)));
        assert!(!structure.is_valid_on(date(2023, 12, 31)));
        assert!(!structure.is_valid_on(date(2024, 2, 1)));

        structure.valid_until = None;
        assert!(structure.is_valid_on(date(2030, 6, 1)));
    }

    #[test]
    fn tiers_sort_by_order_then_id() {
        let structure = PrizeStructure {
            id: 1,
            name: "Daily".to_string(),
            is_active: true,
            valid_from: date(2024, 1, 1),
            valid_until: None,
            tiers: vec![tier(9, 2), tier(4, 1), tier(3, 2)],
        };
        let ids: Vec<i64> = structure.ordered_tiers().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 3, 9]);
    }

    #[test]
    fn claim_transitions() {
        assert!(ClaimStatus::Pending.can_transition_to(ClaimStatus::Notified));
        assert!(ClaimStatus::Notified.can_transition_to(ClaimStatus::Claimed));
        assert!(ClaimStatus::Promoted.can_transition_to(ClaimStatus::Notified));
        assert!(!ClaimStatus::Pending.can_transition_to(ClaimStatus::Claimed));
        assert!(!ClaimStatus::Claimed.can_transition_to(ClaimStatus::Notified));
        assert!(!ClaimStatus::Forfeited.can_transition_to(ClaimStatus::Notified));

        assert!(ClaimStatus::Notified.is_forfeitable());
        assert!(!ClaimStatus::Claimed.is_forfeitable());
        assert!(!ClaimStatus::Forfeited.is_forfeitable());
    }

    #[test]
    fn tier_fill_summary() {
        let fill = TierFill {
            prize_tier_id: 1,
            tier_name: "Grand".to_string(),
            winners_requested: 3,
            winners_filled: 2,
            runner_ups_requested: 0,
            runner_ups_filled: 0,
        };
        assert!(fill.is_partial());
        assert_eq!(fill.summary(), "filled 2 of 3 slots");
    }
}
