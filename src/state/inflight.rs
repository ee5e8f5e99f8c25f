use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashSet;

use crate::error::{AppError, Result};

/// (DrawDate, PrizeStructureId) pairs with a draw currently executing in this
/// process. A second request for a held pair is rejected up front instead of
/// racing the first one to the commit.
///
/// The database constraint stays authoritative; this only saves a wasted draw.
pub struct InflightDraws {
    keys: DashSet<(NaiveDate, i64)>,
}

/// Holds one pair in [`InflightDraws`] until dropped.
pub struct InflightGuard {
    owner: Arc<InflightDraws>,
    key: (NaiveDate, i64),
}

impl InflightDraws {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { keys: DashSet::new() })
    }

    pub fn try_acquire(self: &Arc<Self>, draw_date: NaiveDate, prize_structure_id: i64) -> Result<InflightGuard> {
        let key = (draw_date, prize_structure_id);
        if !self.keys.insert(key) {
            return Err(AppError::DrawInProgress { draw_date, prize_structure_id });
        }
        Ok(InflightGuard { owner: Arc::clone(self), key })
    }

    pub fn is_running(&self, draw_date: NaiveDate, prize_structure_id: i64) -> bool {
        self.keys.contains(&(draw_date, prize_structure_id))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.owner.keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn second_acquire_for_same_pair_is_rejected() {
        let inflight = InflightDraws::new();
        let _guard = inflight.try_acquire(day(1), 7).unwrap();

        let err = inflight.try_acquire(day(1), 7).err().unwrap();
        assert!(matches!(err, AppError::DrawInProgress { prize_structure_id: 7, .. }));
        assert!(inflight.is_running(day(1), 7));
    }

    #[test]
    fn other_pairs_are_independent() {
        let inflight = InflightDraws::new();
        let _a = inflight.try_acquire(day(1), 7).unwrap();
        let _b = inflight.try_acquire(day(2), 7).unwrap();
        let _c = inflight.try_acquire(day(1), 8).unwrap();
        assert_eq!(inflight.len(), 3);
    }

    #[test]
    fn dropping_the_guard_releases_the_pair() {
        let inflight = InflightDraws::new();
        {
            let _guard = inflight.try_acquire(day(1), 7).unwrap();
            assert!(inflight.is_running(day(1), 7));
        }
        assert!(inflight.is_empty());
        assert!(inflight.try_acquire(day(1), 7).is_ok());
    }
}
