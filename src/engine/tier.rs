use std::collections::HashSet;

use crate::engine::pool::WeightedPool;
use crate::engine::random::SecureRandom;
use crate::error::{AppError, Result};
use crate::types::{NewWinner, PrizeTier, TierFill};

/// Picks for one tier: winners first, then runner-ups by rank.
#[derive(Debug, Clone)]
pub struct TierSelection {
    pub picks: Vec<NewWinner>,
    pub fill: TierFill,
}

/// Fill one tier's winner and runner-up slots from the shared pool.
///
/// Every MSISDN in `excluded` is taken out of the pool before sampling starts.
/// Each pick is removed from the pool, so nobody appears twice in a draw.
/// Winners are added to `excluded`; runner-ups are not, since they have not won.
/// Running out of participants ends the tier early and is reported through
/// [`TierFill`], not as an error.
pub fn select_tier<R: SecureRandom + ?Sized>(
    pool: &mut WeightedPool,
    tier: &PrizeTier,
    excluded: &mut HashSet<String>,
    rng: &mut R,
) -> Result<TierSelection> {
    for msisdn in excluded.iter() {
        pool.remove(msisdn);
    }

    let mut picks = Vec::with_capacity(tier.slots().min(pool.len() as u64) as usize);
    let mut winners_filled: u32 = 0;
    let mut runner_ups_filled: u32 = 0;

    for _ in 0..tier.slots() {
        let picked = match pool.sample(rng) {
            Ok(p) => p,
            Err(AppError::PoolExhausted) => break,
            Err(e) => return Err(e),
        };
        pool.remove(&picked.msisdn);

        if winners_filled < tier.winner_count {
            winners_filled += 1;
            excluded.insert(picked.msisdn.clone());
            picks.push(NewWinner {
                prize_tier_id: tier.id,
                msisdn: picked.msisdn,
                is_runner_up: false,
                runner_up_rank: None,
                points_at_win: picked.weight,
            });
        } else {
            runner_ups_filled += 1;
            picks.push(NewWinner {
                prize_tier_id: tier.id,
                msisdn: picked.msisdn,
                is_runner_up: true,
                runner_up_rank: Some(runner_ups_filled),
                points_at_win: picked.weight,
            });
        }
    }

    Ok(TierSelection {
        picks,
        fill: TierFill {
            prize_tier_id: tier.id,
            tier_name: tier.name.clone(),
            winners_requested: tier.winner_count,
            winners_filled,
            runner_ups_requested: tier.runner_up_count,
            runner_ups_filled,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::testing::{FailingRandom, ScriptedRandom};
    use crate::engine::random::OsRandom;
    use crate::types::Participant;

    fn tier(winners: u32, runner_ups: u32) -> PrizeTier {
        PrizeTier {
            id: 11,
            prize_structure_id: 1,
            name: "Grand Prize".to_string(),
            winner_count: winners,
            runner_up_count: runner_ups,
            processing_order: 1,
            display_value: "N1,000,000".to_string(),
        }
    }

    fn pool(items: &[(&str, u64)]) -> WeightedPool {
        WeightedPool::new(items.iter().map(|&(m, w)| Participant::new(m, w))).unwrap()
    }

    #[test]
    fn scenario_a_one_winner_one_runner_up() {
        let mut p = pool(&[("A", 10), ("B", 5), ("C", 0)]);
        let mut excluded = HashSet::new();
        let sel = select_tier(&mut p, &tier(1, 1), &mut excluded, &mut OsRandom::new()).unwrap();

        assert_eq!(sel.picks.len(), 2);
        let winner = &sel.picks[0];
        let runner_up = &sel.picks[1];
        assert!(!winner.is_runner_up);
        assert_eq!(winner.runner_up_rank, None);
        assert!(runner_up.is_runner_up);
        assert_eq!(runner_up.runner_up_rank, Some(1));
        assert_ne!(winner.msisdn, runner_up.msisdn);
        for pick in &sel.picks {
            assert!(pick.msisdn == "A" || pick.msisdn == "B");
            let expected = if pick.msisdn == "A" { 10 } else { 5 };
            assert_eq!(pick.points_at_win, expected);
        }

        assert_eq!(excluded, HashSet::from([winner.msisdn.clone()]));
        assert!(p.is_empty());
        assert!(!sel.fill.is_partial());
    }

    #[test]
    fn scenario_b_partial_fill_is_not_an_error() {
        let mut p = pool(&[("A", 1), ("B", 1)]);
        let sel = select_tier(&mut p, &tier(3, 0), &mut HashSet::new(), &mut OsRandom::new()).unwrap();

        assert_eq!(sel.picks.len(), 2);
        assert_eq!(sel.fill.winners_filled, 2);
        assert_eq!(sel.fill.winners_requested, 3);
        assert_eq!(sel.fill.summary(), "filled 2 of 3 slots");
    }

    #[test]
    fn runner_up_ranks_follow_selection_order() {
        // A: [0,1) B: [1,2) C: [2,3) D: [3,4); ticket 0 always hits the first live slot.
        let mut p = pool(&[("A", 1), ("B", 1), ("C", 1), ("D", 1)]);
        let mut rng = ScriptedRandom::new([0, 0, 0, 0]);
        let sel = select_tier(&mut p, &tier(1, 3), &mut HashSet::new(), &mut rng).unwrap();

        let order: Vec<(&str, Option<u32>)> = sel
            .picks
            .iter()
            .map(|w| (w.msisdn.as_str(), w.runner_up_rank))
            .collect();
        assert_eq!(
            order,
            vec![("A", None), ("B", Some(1)), ("C", Some(2)), ("D", Some(3))]
        );
    }

    #[test]
    fn excluded_msisdns_are_prefiltered() {
        let mut p = pool(&[("A", 100), ("B", 1)]);
        let mut excluded = HashSet::from(["A".to_string()]);
        let sel = select_tier(&mut p, &tier(1, 0), &mut excluded, &mut OsRandom::new()).unwrap();

        assert_eq!(sel.picks[0].msisdn, "B");
        assert!(!p.contains("A"));
        assert_eq!(excluded.len(), 2);
    }

    #[test]
    fn runner_ups_are_not_added_to_exclusions() {
        let mut p = pool(&[("A", 1), ("B", 1), ("C", 1)]);
        let mut excluded = HashSet::new();
        let sel = select_tier(&mut p, &tier(0, 2), &mut excluded, &mut OsRandom::new()).unwrap();

        assert_eq!(sel.picks.len(), 2);
        assert!(sel.picks.iter().all(|w| w.is_runner_up));
        assert!(excluded.is_empty());
    }

    #[test]
    fn empty_tier_draws_nothing() {
        let mut p = pool(&[("A", 1)]);
        let sel = select_tier(&mut p, &tier(0, 0), &mut HashSet::new(), &mut OsRandom::new()).unwrap();
        assert!(sel.picks.is_empty());
        assert_eq!(p.total_weight(), 1);
    }

    #[test]
    fn randomness_failure_propagates() {
        let mut p = pool(&[("A", 1), ("B", 1), ("C", 1)]);
        let mut rng = FailingRandom { remaining: 1 };
        let err = select_tier(&mut p, &tier(3, 0), &mut HashSet::new(), &mut rng).unwrap_err();
        assert!(matches!(err, AppError::RandomnessUnavailable(_)));
    }
}
