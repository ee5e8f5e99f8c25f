use std::collections::HashMap;

use tracing::debug;

use crate::engine::random::SecureRandom;
use crate::error::{AppError, Result};
use crate::types::Participant;

// ---------------------------------------------------------------------------
// WeightedPool
// ---------------------------------------------------------------------------

/// Largest total weight a pool accepts. Weights are stored as SQLite INTEGER,
/// so anything above i64::MAX could be drawn but never committed.
pub const MAX_TOTAL_WEIGHT: u64 = i64::MAX as u64;

/// Participants still able to win during one draw, sampled proportionally to weight.
///
/// Weights live in a Fenwick tree indexed by participant slot, so a uniform
/// ticket in `[0, total_weight)` resolves to its owner in O(log n) and removal
/// is a single O(log n) update. Memory is O(participants), independent of how
/// many points they hold.
#[derive(Debug)]
pub struct WeightedPool {
    /// Slot → participant with its original (merged) weight. Never shrinks.
    entries: Vec<Participant>,
    /// 1-based Fenwick tree over live weights; `tree[0]` is unused.
    tree: Vec<u64>,
    /// msisdn → slot, live participants only.
    index: HashMap<String, usize>,
    total: u64,
}

impl WeightedPool {
    /// Build a pool, dropping zero-weight participants and merging repeated
    /// MSISDNs by summing their weights.
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Result<Self> {
        let mut entries: Vec<Participant> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut total: u64 = 0;

        for p in participants {
            if p.weight == 0 {
                continue;
            }
            total = total
                .checked_add(p.weight)
                .filter(|t| *t <= MAX_TOTAL_WEIGHT)
                .ok_or_else(|| {
                    AppError::Validation(format!("total pool weight exceeds {MAX_TOTAL_WEIGHT}"))
                })?;
            match index.get(&p.msisdn) {
                Some(&slot) => {
                    debug!(msisdn = %p.msisdn, "merging duplicate participant entry");
                    entries[slot].weight += p.weight;
                }
                None => {
                    index.insert(p.msisdn.clone(), entries.len());
                    entries.push(p);
                }
            }
        }

        // Linear-time Fenwick construction.
        let n = entries.len();
        let mut tree = vec![0u64; n + 1];
        for (slot, p) in entries.iter().enumerate() {
            tree[slot + 1] += p.weight;
            let parent = (slot + 1) + lowbit(slot + 1);
            if parent <= n {
                tree[parent] += tree[slot + 1];
            }
        }

        Ok(Self { entries, tree, index, total })
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Live participant count.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn contains(&self, msisdn: &str) -> bool {
        self.index.contains_key(msisdn)
    }

    /// Draw one participant with probability `weight / total_weight`.
    /// The participant stays in the pool; call [`remove`](Self::remove) to take it out.
    pub fn sample<R: SecureRandom + ?Sized>(&self, rng: &mut R) -> Result<Participant> {
        if self.total == 0 {
            return Err(AppError::PoolExhausted);
        }
        let ticket = rng.next_below(self.total)?;
        let slot = self.find_slot(ticket);
        Ok(self.entries[slot].clone())
    }

    /// Take a participant out for the rest of the draw. Returns the weight
    /// removed, or None if it was not (or no longer) in the pool.
    pub fn remove(&mut self, msisdn: &str) -> Option<u64> {
        let slot = self.index.remove(msisdn)?;
        let weight = self.entries[slot].weight;
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] -= weight;
            i += lowbit(i);
        }
        self.total -= weight;
        Some(weight)
    }

    /// Slot owning `ticket`: the one whose cumulative range `[start, end)` contains it.
    /// Removed slots have an empty range and are never returned.
    fn find_slot(&self, ticket: u64) -> usize {
        let n = self.entries.len();
        let mut pos = 0usize;
        let mut remaining = ticket;
        let mut step = if n == 0 { 0 } else { 1usize << (usize::BITS - 1 - n.leading_zeros()) };
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                pos = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        // `pos` slots have cumulative weight <= ticket, so the owner is slot `pos` (0-based).
        pos
    }
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
