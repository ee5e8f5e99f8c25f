use std::collections::HashSet;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::models::{Draw, WinnerRecord};
use crate::db::ResultStore;
use crate::engine::pool::WeightedPool;
use crate::engine::random::SecureRandom;
use crate::engine::tier::select_tier;
use crate::error::{AppError, Result};
use crate::types::{
    now_ns, DrawRequest, DrawStatus, NewDraw, NewWinner, Participant, PrizeStructure, TierFill,
};

/// Result of one draw execution as committed, plus the per-tier fill report.
#[derive(Debug, Clone, Serialize)]
pub struct DrawOutcome {
    pub draw: Draw,
    pub winners: Vec<WinnerRecord>,
    pub tiers: Vec<TierFill>,
}

/// Runs a draw end to end: preconditions, weighted selection over every tier,
/// and an all-or-nothing commit.
///
/// Each call owns its pool and exclusion set. Draws are never retried here: a
/// retry must be a fresh draw with fresh randomness, which is the caller's call.
pub struct DrawOrchestrator<S> {
    store: S,
}

impl<S: ResultStore> DrawOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn execute<R: SecureRandom + Send + ?Sized>(
        &self,
        request: &DrawRequest,
        structure: &PrizeStructure,
        participants: Vec<Participant>,
        rng: &mut R,
    ) -> Result<DrawOutcome> {
        validate(request, structure)?;

        if self
            .store
            .exists_completed_draw(request.draw_date, request.prize_structure_id)
            .await?
        {
            return Err(AppError::DrawAlreadyExecuted {
                draw_date: request.draw_date,
                prize_structure_id: request.prize_structure_id,
            });
        }

        let mut pool = WeightedPool::new(participants)?;
        let mut draw = NewDraw {
            draw_date: request.draw_date,
            prize_structure_id: request.prize_structure_id,
            status: DrawStatus::Completed,
            eligible_count: pool.len() as u64,
            total_weight: pool.total_weight(),
            executed_by: request.executed_by.clone(),
            created_at_ns: now_ns(),
        };

        info!(
            event = "DRAW_STARTED",
            draw_date = %draw.draw_date,
            prize_structure_id = draw.prize_structure_id,
            eligible = draw.eligible_count,
            total_weight = draw.total_weight,
            executed_by = %draw.executed_by,
            "DRAW STARTED | {} participants | {} entries",
            draw.eligible_count, draw.total_weight,
        );

        let (winners, tiers) = if pool.is_empty() {
            draw.status = DrawStatus::CompletedNoParticipants;
            let fills = structure.ordered_tiers().into_iter().map(empty_fill).collect();
            (Vec::new(), fills)
        } else {
            match run_selection(&mut pool, structure, rng) {
                Ok(selected) => selected,
                Err(e) => {
                    self.mark_failed(&draw, &e).await;
                    return Err(e);
                }
            }
        };

        let saved = match self.store.persist_draw(&draw, &winners).await {
            Ok(saved) => saved,
            Err(e @ AppError::DrawAlreadyExecuted { .. }) => {
                warn!(
                    event = "DRAW_CONFLICT",
                    draw_date = %draw.draw_date,
                    prize_structure_id = draw.prize_structure_id,
                    "Another completed draw was committed first; discarding this result",
                );
                return Err(e);
            }
            Err(e) => {
                self.mark_failed(&draw, &e).await;
                return Err(e);
            }
        };

        info!(
            event = "DRAW_COMPLETED",
            draw_id = saved.draw.id,
            status = %saved.draw.status,
            winners = saved.winners.iter().filter(|w| !w.is_runner_up).count(),
            runner_ups = saved.winners.iter().filter(|w| w.is_runner_up).count(),
            "DRAW COMPLETED | id: {} | status: {}",
            saved.draw.id, saved.draw.status,
        );

        Ok(DrawOutcome { draw: saved.draw, winners: saved.winners, tiers })
    }

    async fn mark_failed(&self, draw: &NewDraw, cause: &AppError) {
        error!(
            event = "DRAW_FAILED",
            draw_date = %draw.draw_date,
            prize_structure_id = draw.prize_structure_id,
            code = cause.code(),
            "DRAW FAILED | {cause}",
        );
        if let Err(e) = self.store.record_failed_draw(draw).await {
            error!("Could not record failed draw for {}: {e}", draw.draw_date);
        }
    }
}

/// Select winners and runner-ups for every tier in processing order from one
/// shared pool. Winners of earlier tiers are excluded from later ones.
pub fn run_selection<R: SecureRandom + ?Sized>(
    pool: &mut WeightedPool,
    structure: &PrizeStructure,
    rng: &mut R,
) -> Result<(Vec<NewWinner>, Vec<TierFill>)> {
    let mut excluded: HashSet<String> = HashSet::new();
    let mut winners = Vec::new();
    let mut fills = Vec::with_capacity(structure.tiers.len());

    for tier in structure.ordered_tiers() {
        let selection = select_tier(pool, tier, &mut excluded, rng)?;
        let fill = selection.fill;
        if fill.is_partial() {
            warn!(
                event = "TIER_FILLED",
                prize_tier_id = fill.prize_tier_id,
                tier = %fill.tier_name,
                filled = fill.slots_filled(),
                requested = fill.slots_requested(),
                "TIER PARTIAL | {} | {}",
                fill.tier_name, fill.summary(),
            );
        } else {
            info!(
                event = "TIER_FILLED",
                prize_tier_id = fill.prize_tier_id,
                tier = %fill.tier_name,
                filled = fill.slots_filled(),
                requested = fill.slots_requested(),
                "TIER FILLED  | {} | {}",
                fill.tier_name, fill.summary(),
            );
        }
        winners.extend(selection.picks);
        fills.push(fill);
    }

    Ok((winners, fills))
}

fn validate(request: &DrawRequest, structure: &PrizeStructure) -> Result<()> {
    if request.executed_by.trim().is_empty() {
        return Err(AppError::Validation("executed_by must not be empty".to_string()));
    }
    if request.prize_structure_id != structure.id {
        return Err(AppError::InvalidPrizeStructure(format!(
            "requested structure {} but was given structure {}",
            request.prize_structure_id, structure.id
        )));
    }
    if !structure.is_active {
        return Err(AppError::InvalidPrizeStructure(format!(
            "prize structure {} is not active",
            structure.id
        )));
    }
    if !structure.is_valid_on(request.draw_date) {
        return Err(AppError::InvalidPrizeStructure(format!(
            "prize structure {} is not valid on {}",
            structure.id, request.draw_date
        )));
    }
    if structure.tiers.is_empty() {
        return Err(AppError::InvalidPrizeStructure(format!(
            "prize structure {} has no prize tiers",
            structure.id
        )));
    }
    if let Some(stray) = structure.tiers.iter().find(|t| t.prize_structure_id != structure.id) {
        return Err(AppError::InvalidPrizeStructure(format!(
            "prize tier {} belongs to structure {}",
            stray.id, stray.prize_structure_id
        )));
    }
    Ok(())
}

fn empty_fill(tier: &crate::types::PrizeTier) -> TierFill {
    TierFill {
        prize_tier_id: tier.id,
        tier_name: tier.name.clone(),
        winners_requested: tier.winner_count,
        winners_filled: 0,
        runner_ups_requested: tier.runner_up_count,
        runner_ups_filled: 0,
    }
}
