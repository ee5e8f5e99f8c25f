use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::HealthState;
use crate::api::latency::DrawLatency;
use crate::db::models::{Draw, DrawWithWinners, WinnerRecord};
use crate::db::{EligibilityProvider, PrizeConfigProvider, SqliteStore};
use crate::engine::{DrawOrchestrator, DrawOutcome, OsRandom, Promotion, RunnerUpPromoter};
use crate::error::AppError;
use crate::state::InflightDraws;
use crate::types::{now_ns, DrawRequest, TierFill};

#[derive(Clone)]
pub struct ApiState {
    pub store: SqliteStore,
    pub health: Arc<HealthState>,
    pub latency: Arc<DrawLatency>,
    pub inflight: Arc<InflightDraws>,
}

impl ApiState {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(DrawLatency::new()),
            inflight: InflightDraws::new(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/draws", post(post_draw).get(get_draws))
        .route("/draws/:id", get(get_draw))
        .route("/winners/:id/notify", post(post_notify))
        .route("/winners/:id/claim", post(post_claim))
        .route("/winners/:id/forfeit", post(post_forfeit))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request bodies and query params
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DrawsQuery {
    pub date: NaiveDate,
}

#[derive(Deserialize)]
pub struct ForfeitBody {
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct DrawResponse {
    pub draw: Draw,
    pub winners: Vec<WinnerRecord>,
    pub tiers: Vec<TierFill>,
    /// One line per tier that could not be filled, e.g. "Grand: filled 2 of 3 slots".
    pub partial_tiers: Vec<String>,
}

impl From<DrawOutcome> for DrawResponse {
    fn from(outcome: DrawOutcome) -> Self {
        let partial_tiers = outcome
            .tiers
            .iter()
            .filter(|t| t.is_partial())
            .map(|t| format!("{}: {}", t.tier_name, t.summary()))
            .collect();
        Self {
            draw: outcome.draw,
            winners: outcome.winners,
            tiers: outcome.tiers,
            partial_tiers,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub draws_completed: u64,
    pub draws_failed: u64,
    pub draws_rejected: u64,
    pub draws_in_flight: usize,
    pub last_draw_at_ns: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Draw handlers
// ---------------------------------------------------------------------------

async fn post_draw(
    State(state): State<ApiState>,
    Json(request): Json<DrawRequest>,
) -> Result<Json<DrawResponse>, AppError> {
    let started = Instant::now();
    let _guard = state
        .inflight
        .try_acquire(request.draw_date, request.prize_structure_id)
        .inspect_err(|_| state.health.record_rejected())?;

    let structure = state
        .store
        .prize_structure(request.prize_structure_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("prize structure {}", request.prize_structure_id)))?;
    let participants = state.store.eligible_participants(request.draw_date, &structure).await?;

    let orchestrator = DrawOrchestrator::new(state.store.clone());
    let mut rng = OsRandom::new();
    let result = orchestrator
        .execute(&request, &structure, participants, &mut rng)
        .await;
    state.latency.record(started.elapsed());

    match result {
        Ok(outcome) => {
            if outcome.draw.status.is_completed() {
                state.health.record_completed(now_ns().max(0) as u64);
            }
            info!(
                draw_id = outcome.draw.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Draw request served",
            );
            Ok(Json(DrawResponse::from(outcome)))
        }
        Err(e) => {
            match &e {
                AppError::DrawAlreadyExecuted { .. } | AppError::DrawInProgress { .. } => {
                    state.health.record_rejected()
                }
                AppError::Validation(_) | AppError::InvalidPrizeStructure(_) => {}
                _ => state.health.record_failed(),
            }
            Err(e)
        }
    }
}

async fn get_draws(
    State(state): State<ApiState>,
    Query(params): Query<DrawsQuery>,
) -> Result<Json<Vec<Draw>>, AppError> {
    Ok(Json(state.store.list_draws(params.date).await?))
}

async fn get_draw(
    State(state): State<ApiState>,
    Path(draw_id): Path<i64>,
) -> Result<Json<DrawWithWinners>, AppError> {
    state
        .store
        .draw_with_winners(draw_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))
}

// ---------------------------------------------------------------------------
// Claim handlers
// ---------------------------------------------------------------------------

async fn post_notify(
    State(state): State<ApiState>,
    Path(winner_id): Path<i64>,
) -> Result<Json<WinnerRecord>, AppError> {
    let promoter = RunnerUpPromoter::new(state.store.clone());
    Ok(Json(promoter.notify(winner_id).await?))
}

async fn post_claim(
    State(state): State<ApiState>,
    Path(winner_id): Path<i64>,
) -> Result<Json<WinnerRecord>, AppError> {
    let promoter = RunnerUpPromoter::new(state.store.clone());
    Ok(Json(promoter.claim(winner_id).await?))
}

async fn post_forfeit(
    State(state): State<ApiState>,
    Path(winner_id): Path<i64>,
    Json(body): Json<ForfeitBody>,
) -> Result<Json<Promotion>, AppError> {
    let promoter = RunnerUpPromoter::new(state.store.clone());
    Ok(Json(promoter.forfeit(winner_id, &body.reason).await?))
}

// ---------------------------------------------------------------------------
// Service handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").execute(state.store.pool()).await.is_ok();
    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        db_ok,
        draws_completed: state.health.draws_completed(),
        draws_failed: state.health.draws_failed(),
        draws_rejected: state.health.draws_rejected(),
        draws_in_flight: state.inflight.len(),
        last_draw_at_ns: state.health.last_draw_at_ns(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1_000.0);
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: to_ms(p50),
        p95_ms: to_ms(p95),
        p99_ms: to_ms(p99),
    })
}
