//! # Claim guard.
//!
//! A [`Claim`] is a worker's hold on one dequeued record. Settling it
//! releases the submitter's membership exactly once:
//!
//! - [`complete`](Claim::complete): result folded into the batch (if any)
//! - [`cancel`](Claim::cancel): record dropped, the rest of its batch aborted
//! - [`requeue`](Claim::requeue): fresh retry copy enqueued at `TIER2` or better
//! - dropped without settling: same as `cancel` (a panicking executor cannot
//!   leave the submitter stuck in the queue)

use std::sync::Arc;

use crate::queue::{AddResult, BatchProgress, QueueRegistry, QueuedWork, WorkRecord};

/// Exclusive hold on a record being processed.
pub struct Claim<P: Send + Sync + 'static> {
    registry: Arc<QueueRegistry<P>>,
    entry: Arc<QueuedWork<P>>,
}

impl<P: Send + Sync + 'static> Claim<P> {
    pub(crate) fn new(registry: Arc<QueueRegistry<P>>, entry: Arc<QueuedWork<P>>) -> Self {
        Self { registry, entry }
    }

    /// The claimed record.
    pub fn record(&self) -> &WorkRecord<P> {
        self.entry.record()
    }

    /// Marks the record done with `output`.
    pub fn complete(self, output: P) -> BatchProgress<P> {
        self.registry.complete_entry(&self.entry, output)
    }

    /// Abandons the record and every waiting item of its batch.
    pub fn cancel(self) {
        self.registry.abandon_entry(&self.entry);
    }

    /// Puts a retry copy of the record back in line.
    pub fn requeue(self) -> AddResult
    where
        P: Clone,
    {
        self.registry.requeue_entry(&self.entry)
    }
}

impl<P: Send + Sync + 'static> Drop for Claim<P> {
    fn drop(&mut self) {
        // No-op when already settled.
        self.registry.abandon_entry(&self.entry);
    }
}

impl<P: Send + Sync + 'static> std::fmt::Debug for Claim<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = self.entry.record();
        f.debug_struct("Claim")
            .field("id", &r.id)
            .field("submitter", &r.submitter)
            .field("routine", &r.routine)
            .finish()
    }
}
