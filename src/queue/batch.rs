//! # Batch groups.
//!
//! A batch is one logical request materialized as several [`WorkRecord`]s that
//! share a [`BatchGroupId`]. The registry keeps one [`BatchGroup`] per active
//! batch and folds every completed item into it; the group is dropped once the
//! last item completes or the batch is aborted.
//!
//! [`WorkRecord`]: crate::WorkRecord

use std::time::SystemTime;

use crate::queue::{BatchGroupId, SubmitterId};

/// Results collected so far for one batch request.
#[derive(Clone, Debug)]
pub struct BatchGroup<P> {
    /// Group id shared by every record of the batch.
    pub group_id: BatchGroupId,
    /// Owner of the batch.
    pub submitter: SubmitterId,
    /// Number of items requested.
    pub total: u32,
    /// Completed items, in completion order.
    pub completed: Vec<P>,
    /// Set when the last item completed.
    pub released_at: Option<SystemTime>,
}

impl<P> BatchGroup<P> {
    pub(crate) fn new(group_id: BatchGroupId, submitter: SubmitterId, total: u32) -> Self {
        Self {
            group_id,
            submitter,
            total,
            completed: Vec::new(),
            released_at: None,
        }
    }

    /// Appends one result; returns `true` when the batch is now complete.
    pub(crate) fn push(&mut self, item: P) -> bool {
        self.completed.push(item);
        let done = self.is_complete();
        if done {
            self.released_at = Some(SystemTime::now());
        }
        done
    }

    /// True once every requested item has a result.
    pub fn is_complete(&self) -> bool {
        self.completed.len() >= self.total as usize
    }
}

/// Outcome of completing one claimed record.
#[derive(Debug)]
pub enum BatchProgress<P> {
    /// The record was not part of a batch.
    NotBatched,
    /// More items of the batch are outstanding.
    InProgress {
        /// Items completed so far.
        completed: u32,
        /// Items requested.
        total: u32,
    },
    /// Last item done; the group has been cleared from the registry.
    Complete(BatchGroup<P>),
    /// The claim had already been settled.
    AlreadySettled,
}
