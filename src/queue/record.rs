//! # Work records.
//!
//! A [`WorkRecord`] is one unit of trade work: who asked for it, which routine
//! serves it, how urgent it is, and the opaque payload the worker body needs.
//! Once admitted by the [`QueueRegistry`](crate::QueueRegistry) it is wrapped in
//! a [`QueuedWork`], which adds the live `processing`/`canceled` flags.
//!
//! ## Lifecycle
//! ```text
//! WorkRecord ──add──► QueuedWork{processing=false} ──dequeue──► processing=true ──► released
//!                                  │                                   │
//!                                  └─ cancel: canceled=true            └─ requeue: fresh copy, retry=true
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Caller-assigned identity of one work record, unique for the process lifetime.
pub type WorkId = u64;

/// Opaque identity of a submitter (e.g. chat account id).
pub type SubmitterId = u64;

/// Identity shared by all records of one batch request.
pub type BatchGroupId = u64;

/// Coarse priority bucket; lower values are serviced first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorityTier(pub u32);

impl PriorityTier {
    /// Highest tier (sudo / privileged submissions).
    pub const TIER1: PriorityTier = PriorityTier(1);
    /// Second tier; retries are never placed below it.
    pub const TIER2: PriorityTier = PriorityTier(2);
    /// Default tier for regular submissions.
    pub const FREE: PriorityTier = PriorityTier(u32::MAX);
}

impl Default for PriorityTier {
    fn default() -> Self {
        PriorityTier::FREE
    }
}

/// Work category; every routine has its own queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Routine {
    /// Trade a generated item to the submitter.
    LinkTrade,
    /// Clone whatever the submitter shows.
    Clone,
    /// Dump the submitter's offered items.
    Dump,
    /// Check the seed of the submitter's item.
    SeedCheck,
    /// Rewrite original-trainer data on the submitter's item.
    FixOt,
}

impl Routine {
    /// Every routine, in display order.
    pub const ALL: [Routine; 5] = [
        Routine::LinkTrade,
        Routine::Clone,
        Routine::Dump,
        Routine::SeedCheck,
        Routine::FixOt,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Routine::LinkTrade => "link_trade",
            Routine::Clone => "clone",
            Routine::Dump => "dump",
            Routine::SeedCheck => "seed_check",
            Routine::FixOt => "fix_ot",
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a record inside a batch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchInfo {
    /// Group shared by every record of the batch.
    pub group: BatchGroupId,
    /// 1-based index of this record.
    pub index: u32,
    /// Number of records in the batch.
    pub total: u32,
}

/// One unit of work.
#[derive(Clone, Debug)]
pub struct WorkRecord<P> {
    /// Caller-assigned unique id.
    pub id: WorkId,
    /// Who submitted it.
    pub submitter: SubmitterId,
    /// Which queue serves it.
    pub routine: Routine,
    /// Priority tier; overwritten by the registry on admission.
    pub tier: PriorityTier,
    /// Favored submitters get the bounded fast-lane.
    pub favored: bool,
    /// Opaque trade data.
    pub payload: P,
    /// Batch membership (`None` for single requests).
    pub batch: Option<BatchInfo>,
    /// Set on the fresh copy enqueued after an abort.
    pub retry: bool,
    /// Display name of the submitter, used in position messages.
    pub label: Option<String>,
}

impl<P> WorkRecord<P> {
    /// Creates a regular, non-batch record at [`PriorityTier::FREE`].
    pub fn new(id: WorkId, submitter: SubmitterId, routine: Routine, payload: P) -> Self {
        Self {
            id,
            submitter,
            routine,
            tier: PriorityTier::FREE,
            favored: false,
            payload,
            batch: None,
            retry: false,
            label: None,
        }
    }

    /// Marks the record as coming from a favored submitter.
    pub fn favored(mut self, favored: bool) -> Self {
        self.favored = favored;
        self
    }

    /// Attaches batch membership.
    pub fn in_batch(mut self, group: BatchGroupId, index: u32, total: u32) -> Self {
        self.batch = Some(BatchInfo {
            group,
            index,
            total,
        });
        self
    }

    /// Attaches a display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// 1-based batch index (1 for non-batch records).
    pub fn batch_index(&self) -> u32 {
        self.batch.map_or(1, |b| b.index)
    }

    /// Batch size (1 for non-batch records).
    pub fn batch_total(&self) -> u32 {
        self.batch.map_or(1, |b| b.total)
    }

    /// Batch group, if any.
    pub fn batch_group(&self) -> Option<BatchGroupId> {
        self.batch.map(|b| b.group)
    }

    /// Items of the batch still to do, counting this one.
    pub(crate) fn remaining_items(&self) -> usize {
        let total = self.batch_total();
        total.saturating_sub(self.batch_index()).saturating_add(1) as usize
    }
}

/// A record admitted into the registry, with its live flags.
#[derive(Debug)]
pub struct QueuedWork<P> {
    record: WorkRecord<P>,
    arrival: u64,
    processing: AtomicBool,
    canceled: AtomicBool,
    released: AtomicBool,
}

impl<P> QueuedWork<P> {
    pub(crate) fn new(record: WorkRecord<P>, arrival: u64) -> Self {
        Self {
            record,
            arrival,
            processing: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// The admitted record.
    pub fn record(&self) -> &WorkRecord<P> {
        &self.record
    }

    /// Shorthand for `record().id`.
    pub fn id(&self) -> WorkId {
        self.record.id
    }

    /// True once a worker has claimed it.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// True if the submitter or an operator canceled it.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Admission order inside the registry.
    pub(crate) fn arrival(&self) -> u64 {
        self.arrival
    }

    pub(crate) fn mark_processing(&self) {
        self.processing.store(true, Ordering::Release);
    }

    pub(crate) fn mark_canceled(&self) -> bool {
        !self.canceled.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` exactly once: for the caller that releases the entry.
    pub(crate) fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_tier1_first() {
        assert!(PriorityTier::TIER1 < PriorityTier::TIER2);
        assert!(PriorityTier::TIER2 < PriorityTier::FREE);
    }

    #[test]
    fn batch_accessors() {
        let single = WorkRecord::new(1, 7, Routine::LinkTrade, ());
        assert_eq!((single.batch_index(), single.batch_total()), (1, 1));
        assert_eq!(single.remaining_items(), 1);

        let item = WorkRecord::new(2, 7, Routine::LinkTrade, ()).in_batch(9, 2, 5);
        assert_eq!(item.batch_group(), Some(9));
        assert_eq!(item.remaining_items(), 4);
    }

    #[test]
    fn release_happens_once() {
        let w = QueuedWork::new(WorkRecord::new(1, 1, Routine::Dump, ()), 0);
        assert!(w.release());
        assert!(!w.release());
    }
}
