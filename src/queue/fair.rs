//! # FairPriorityQueue
//!
//! Ordered container keyed by [`PriorityTier`]; lower tiers dequeue first, FIFO
//! within a tier, except that favored entries are placed according to the
//! [`FairnessPolicy`].
//!
//! ```text
//! tiers: BTreeMap<PriorityTier, VecDeque<Slot>>
//!
//!   TIER1 : [a]
//!   FREE  : [r r r r r r F F r r r r]      regular = r, favored = F
//!                        ▲
//!                        └─ new favored lands after `regular_ahead(regular)` r's
//!                           and after every F already in the run
//! ```
//!
//! The queue has no lock of its own: the owning registry holds it under one
//! exclusive lock together with its membership index, so the fairness scan and
//! the insert always happen in the same critical section.

use std::collections::{BTreeMap, VecDeque};

use crate::policies::FairnessPolicy;
use crate::queue::{PriorityTier, WorkId};

#[derive(Debug)]
struct Slot<T> {
    id: WorkId,
    favored: bool,
    item: T,
}

/// Priority queue with a bounded favored fast-lane.
#[derive(Debug)]
pub struct FairPriorityQueue<T> {
    tiers: BTreeMap<PriorityTier, VecDeque<Slot<T>>>,
    fairness: FairnessPolicy,
    len: usize,
}

impl<T> FairPriorityQueue<T> {
    /// Creates an empty queue.
    pub fn new(fairness: FairnessPolicy) -> Self {
        Self {
            tiers: BTreeMap::new(),
            fairness,
            len: 0,
        }
    }

    /// Inserts `item` and returns its 0-based position across all tiers.
    ///
    /// Regular items (or any item while fairness is disabled) are appended to
    /// their tier. Favored items keep `regular_ahead(n)` regular items of the
    /// tier ahead of them and stay behind every favored item already queued.
    pub fn add(&mut self, tier: PriorityTier, id: WorkId, favored: bool, item: T) -> usize {
        let before: usize = self.tiers.range(..tier).map(|(_, run)| run.len()).sum();
        let run = self.tiers.entry(tier).or_default();

        let index = if favored && self.fairness.enabled() {
            let regular = run.iter().filter(|s| !s.favored).count();
            fair_index(run, self.fairness.regular_ahead(regular))
        } else {
            run.len()
        };

        run.insert(index, Slot { id, favored, item });
        self.len += 1;
        before + index
    }

    /// Returns the next item without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.tiers
            .values()
            .find_map(|run| run.front())
            .map(|slot| &slot.item)
    }

    /// Removes and returns the next item.
    pub fn dequeue(&mut self) -> Option<T> {
        let mut first = self.tiers.first_entry()?;
        let slot = first.get_mut().pop_front();
        if first.get().is_empty() {
            first.remove();
        }
        if slot.is_some() {
            self.len -= 1;
        }
        slot.map(|s| s.item)
    }

    /// 0-based position of `id` across all tiers.
    pub fn position_of(&self, id: WorkId) -> Option<usize> {
        self.iter_slots().position(|slot| slot.id == id)
    }

    /// Removes `id`; returns the item if it was queued.
    pub fn remove(&mut self, id: WorkId) -> Option<T> {
        let (tier, index) = self.tiers.iter().find_map(|(tier, run)| {
            run.iter().position(|s| s.id == id).map(|index| (*tier, index))
        })?;

        let run = self.tiers.get_mut(&tier)?;
        let slot = run.remove(index)?;
        if run.is_empty() {
            self.tiers.remove(&tier);
        }
        self.len -= 1;
        Some(slot.item)
    }

    /// Removes every item, returning them in dequeue order.
    pub fn drain(&mut self) -> Vec<T> {
        let tiers = std::mem::take(&mut self.tiers);
        self.len = 0;
        tiers
            .into_values()
            .flat_map(|run| run.into_iter().map(|s| s.item))
            .collect()
    }

    /// Items in dequeue order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.iter_slots().map(|slot| &slot.item)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn iter_slots(&self) -> impl Iterator<Item = &Slot<T>> {
        self.tiers.values().flat_map(|run| run.iter())
    }
}

/// Insertion index for a favored item inside one tier run.
fn fair_index<T>(run: &VecDeque<Slot<T>>, regular_ahead: usize) -> usize {
    let mut regular_seen = 0;
    let mut after_regular = 0;
    let mut after_favored = 0;

    for (i, slot) in run.iter().enumerate() {
        if slot.favored {
            after_favored = i + 1;
        } else if regular_seen < regular_ahead {
            regular_seen += 1;
            after_regular = i + 1;
        }
    }
    after_regular.max(after_favored).min(run.len())
}
