use tracing::info;

use crate::db::models::{ForfeitUpdate, WinnerRecord};
use crate::db::ResultStore;
use crate::error::{AppError, Result};
use crate::types::{now_ns, ClaimStatus};

pub use crate::db::models::Promotion;

/// Claim lifecycle of committed winner records: notification, claiming, and
/// forfeiture with promotion of the next runner-up.
pub struct RunnerUpPromoter<S> {
    store: S,
}

impl<S: ResultStore> RunnerUpPromoter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Forfeit a confirmed winner and promote the lowest-ranked pending
    /// runner-up of the same draw and tier. Exactly one promotion per call;
    /// calling again on the same record fails without touching anything.
    pub async fn forfeit(&self, winner_id: i64, reason: &str) -> Result<Promotion> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("a forfeiture reason is required".to_string()));
        }

        let winner = self.load(winner_id).await?;
        if winner.is_runner_up {
            return Err(AppError::InvalidForfeiture {
                winner_id,
                reason: "runner-ups cannot be forfeited".to_string(),
            });
        }
        if !winner.claim_status.is_forfeitable() {
            return Err(AppError::InvalidForfeiture {
                winner_id,
                reason: format!("already {}", winner.claim_status),
            });
        }

        // The runner-up is picked inside the store's transaction, so two
        // forfeitures in one tier never race for the same rank.
        let promotion = self
            .store
            .promote_runner_up(&ForfeitUpdate {
                winner_id,
                reason: reason.to_string(),
                forfeited_at_ns: now_ns(),
            })
            .await?;

        info!(
            event = "RUNNER_UP_PROMOTED",
            draw_id = winner.draw_id,
            prize_tier_id = winner.prize_tier_id,
            forfeited_id = winner_id,
            promoted_id = promotion.promoted.id,
            rank = promotion.promoted.runner_up_rank,
            reason,
            "FORFEIT | winner {} forfeited, runner-up {} promoted",
            winner_id, promotion.promoted.id,
        );

        Ok(promotion)
    }

    pub async fn notify(&self, winner_id: i64) -> Result<WinnerRecord> {
        self.advance(winner_id, ClaimStatus::Notified).await
    }

    pub async fn claim(&self, winner_id: i64) -> Result<WinnerRecord> {
        self.advance(winner_id, ClaimStatus::Claimed).await
    }

    async fn advance(&self, winner_id: i64, to: ClaimStatus) -> Result<WinnerRecord> {
        let winner = self.load(winner_id).await?;
        let from = winner.claim_status;
        if winner.is_runner_up || !from.can_transition_to(to) {
            return Err(AppError::InvalidClaimTransition { winner_id, from, to });
        }
        self.store.update_claim_status(winner_id, from, to).await?;
        info!(winner_id, from = %from, to = %to, "Claim status updated");
        self.load(winner_id).await
    }

    async fn load(&self, winner_id: i64) -> Result<WinnerRecord> {
        self.store
            .get_winner(winner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("winner {winner_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DrawWithWinners;
    use crate::db::store::testing::{new_draw, new_winner, seed_structure, store};
    use crate::db::SqliteStore;
    use crate::types::DrawStatus;

    /// One tier: winner "A", then the given runner-ups in rank order.
    async fn committed_draw(runner_ups: &[&str]) -> (SqliteStore, DrawWithWinners) {
        let store = store().await;
        let structure = seed_structure(&store, &[("Grand", 1, runner_ups.len() as u32, 1)]).await;
        let tier = structure.tiers[0].id;
        let mut winners = vec![new_winner(tier, "A", None)];
        for (i, m) in runner_ups.iter().enumerate() {
            winners.push(new_winner(tier, m, Some(i as u32 + 1)));
        }
        let saved = store
            .persist_draw(&new_draw(&structure, DrawStatus::Completed), &winners)
            .await
            .unwrap();
        (store, saved)
    }

    #[tokio::test]
    async fn scenario_d_forfeit_promotes_rank_one_once() {
        let (store, saved) = committed_draw(&["B"]).await;
        let promoter = RunnerUpPromoter::new(store.clone());
        let winner_id = saved.winners[0].id;

        let promotion = promoter.forfeit(winner_id, "did not respond").await.unwrap();
        assert_eq!(promotion.forfeited.claim_status, ClaimStatus::Forfeited);
        assert!(promotion.forfeited.forfeited_at_ns.is_some());
        assert_eq!(promotion.promoted.msisdn, "B");
        assert_eq!(promotion.promoted.claim_status, ClaimStatus::Promoted);
        assert!(!promotion.promoted.is_runner_up);
        assert_eq!(promotion.promoted.promoted_from_id, Some(winner_id));

        let err = promoter.forfeit(winner_id, "did not respond").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidForfeiture { .. }));
        let after = store.list_winners(saved.draw.id).await.unwrap();
        assert_eq!(after.iter().filter(|w| w.claim_status == ClaimStatus::Promoted).count(), 1);
    }

    #[tokio::test]
    async fn promotion_walks_ranks_in_order() {
        let (store, saved) = committed_draw(&["B", "C"]).await;
        let promoter = RunnerUpPromoter::new(store);

        let first = promoter.forfeit(saved.winners[0].id, "ineligible").await.unwrap();
        assert_eq!(first.promoted.msisdn, "B");

        // A promoted winner can forfeit in turn.
        let second = promoter.forfeit(first.promoted.id, "ineligible").await.unwrap();
        assert_eq!(second.promoted.msisdn, "C");
        assert_eq!(second.promoted.promoted_from_id, Some(first.promoted.id));

        let err = promoter.forfeit(second.promoted.id, "ineligible").await.unwrap_err();
        assert!(matches!(err, AppError::NoEligibleRunnerUp { .. }));
    }

    #[tokio::test]
    async fn no_runner_up_leaves_winner_untouched() {
        let (store, saved) = committed_draw(&[]).await;
        let promoter = RunnerUpPromoter::new(store.clone());
        let winner_id = saved.winners[0].id;

        let err = promoter.forfeit(winner_id, "duplicate claim").await.unwrap_err();
        assert!(matches!(err, AppError::NoEligibleRunnerUp { .. }));
        let w = store.get_winner(winner_id).await.unwrap().unwrap();
        assert_eq!(w.claim_status, ClaimStatus::Pending);
    }

    #[tokio::test]
    async fn runner_ups_and_claimed_winners_cannot_be_forfeited() {
        let (store, saved) = committed_draw(&["B"]).await;
        let promoter = RunnerUpPromoter::new(store);
        let (winner_id, runner_up_id) = (saved.winners[0].id, saved.winners[1].id);

        let err = promoter.forfeit(runner_up_id, "n/a").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidForfeiture { .. }));

        promoter.notify(winner_id).await.unwrap();
        let claimed = promoter.claim(winner_id).await.unwrap();
        assert_eq!(claimed.claim_status, ClaimStatus::Claimed);

        let err = promoter.forfeit(winner_id, "too late").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidForfeiture { .. }));
    }

    #[tokio::test]
    async fn claim_requires_notification() {
        let (store, saved) = committed_draw(&["B"]).await;
        let promoter = RunnerUpPromoter::new(store);
        let winner_id = saved.winners[0].id;

        let err = promoter.claim(winner_id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidClaimTransition { from: ClaimStatus::Pending, to: ClaimStatus::Claimed, .. }
        ));

        let err = promoter.notify(saved.winners[1].id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidClaimTransition { .. }));
    }

    #[tokio::test]
    async fn blank_reason_and_unknown_winner_are_rejected() {
        let (store, saved) = committed_draw(&["B"]).await;
        let promoter = RunnerUpPromoter::new(store);

        let err = promoter.forfeit(saved.winners[0].id, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = promoter.forfeit(424_242, "gone").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
