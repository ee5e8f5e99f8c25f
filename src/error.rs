use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use thiserror::Error;

use crate::types::ClaimStatus;

#[derive(Debug, Error)]
pub enum AppError {
    /// Not a failure on its own: tier selection treats it as "stop filling slots".
    #[error("weighted pool is exhausted")]
    PoolExhausted,

    #[error("invalid random range: upper bound must be > 0, got {0}")]
    InvalidRange(u64),

    #[error("secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("a completed draw already exists for {draw_date} (prize structure {prize_structure_id})")]
    DrawAlreadyExecuted {
        draw_date: NaiveDate,
        prize_structure_id: i64,
    },

    #[error("a draw for {draw_date} (prize structure {prize_structure_id}) is already running")]
    DrawInProgress {
        draw_date: NaiveDate,
        prize_structure_id: i64,
    },

    #[error("no pending runner-up left for draw {draw_id}, prize tier {prize_tier_id}")]
    NoEligibleRunnerUp { draw_id: i64, prize_tier_id: i64 },

    #[error("invalid prize structure: {0}")]
    InvalidPrizeStructure(String),

    #[error("winner {winner_id} cannot be forfeited: {reason}")]
    InvalidForfeiture { winner_id: i64, reason: String },

    #[error("winner {winner_id} cannot move from {from} to {to}")]
    InvalidClaimTransition {
        winner_id: i64,
        from: ClaimStatus,
        to: ClaimStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable machine-readable code reported alongside the human-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PoolExhausted => "pool_exhausted",
            AppError::InvalidRange(_) => "invalid_range",
            AppError::RandomnessUnavailable(_) => "randomness_unavailable",
            AppError::DrawAlreadyExecuted { .. } => "draw_already_executed",
            AppError::DrawInProgress { .. } => "draw_in_progress",
            AppError::NoEligibleRunnerUp { .. } => "no_eligible_runner_up",
            AppError::InvalidPrizeStructure(_) => "invalid_prize_structure",
            AppError::InvalidForfeiture { .. } => "invalid_forfeiture",
            AppError::InvalidClaimTransition { .. } => "invalid_claim_transition",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Database(_) => "database",
            AppError::Migration(_) => "migration",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::DrawAlreadyExecuted { .. } | AppError::DrawInProgress { .. } => {
                StatusCode::CONFLICT
            }
            AppError::NoEligibleRunnerUp { .. }
            | AppError::InvalidPrizeStructure(_)
            | AppError::InvalidForfeiture { .. }
            | AppError::InvalidClaimTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            AppError::RandomnessUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "code": self.code(),
            "reason": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
