//! # QueueRegistry: admission, membership and position authority.
//!
//! One registry owns a [`FairPriorityQueue`] per [`Routine`] plus the
//! membership index (submitter → active records) used to reject duplicate
//! submissions. Every mutation happens under **one** exclusive lock, so two
//! near-simultaneous submissions from the same submitter can never both see
//! "not present"; position queries take the shared side of the same lock.
//!
//! ## Admission
//! ```text
//! add(records, allow_multiple, privileged)
//!   write lock ─┬─ closed?            (unless privileged) → Rejected(QueueClosed)
//!               ├─ already a member?  (unless privileged) → AlreadyInQueue
//!               │    allow_multiple: ok only if every existing entry shares the batch group
//!               ├─ active ≥ max?      (unless privileged) → Full
//!               ├─ validators, every record             → Rejected(Invalid)
//!               ├─ duplicate work id?                   → Rejected(DuplicateWorkId)
//!               └─ insert: tier = TIER1 | FREE, membership, batch group
//!   unlock ──► publish WorkQueued
//! ```
//!
//! ## Claims
//! Workers take records with [`try_dequeue`](QueueRegistry::try_dequeue) or the
//! idle-backoff loop [`next`](QueueRegistry::next). The returned [`Claim`]
//! releases membership exactly once, whether it is completed, canceled,
//! requeued or simply dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::select;

use crate::core::QueueSettings;
use crate::events::{Bus, Event, EventKind};
use crate::policies::FairnessPolicy;
use crate::queue::{
    BatchGroup, BatchGroupId, BatchProgress, Claim, FairPriorityQueue, PositionResult,
    PriorityTier, QueuedWork, Routine, SubmitterId, Validate, WorkId, WorkRecord,
};
use crate::workers::WorkerContext;

/// Outcome of a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddResult {
    /// Every record was enqueued.
    Added,
    /// The submitter already has active records.
    AlreadyInQueue,
    /// The registry holds its configured maximum.
    Full,
    /// A check refused the submission.
    Rejected(RejectReason),
}

impl AddResult {
    /// True for [`AddResult::Added`].
    pub fn is_added(&self) -> bool {
        matches!(self, AddResult::Added)
    }
}

/// Why a submission was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue is closed to regular submissions.
    QueueClosed,
    /// A record with this id is already active.
    DuplicateWorkId(WorkId),
    /// A validator refused a record.
    Invalid(String),
    /// The legality collaborator refused a candidate (0-based item index).
    Legality {
        /// Index of the candidate within the submission.
        index: usize,
        /// Collaborator message.
        reason: String,
    },
    /// A batch submission had no records.
    EmptyBatch,
    /// Batch records disagree on submitter, routine or group.
    MixedBatch,
    /// The batch has more items than a `u32` index can number.
    BatchTooLarge(usize),
}

/// Result of [`QueueRegistry::clear_submitter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearResult {
    /// Waiting records were removed.
    Removed,
    /// Nothing removed: the only records are being processed.
    CurrentlyProcessing,
    /// Waiting records removed; another one is being processed.
    CurrentlyProcessingRemoved,
    /// The submitter has no active records.
    NotInQueue,
}

/// Per-routine counts for the operator surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutineSummary {
    /// The routine.
    pub routine: Routine,
    /// Records waiting in its queue.
    pub waiting: usize,
    /// Records claimed by a worker.
    pub processing: usize,
}

type Entry<P> = Arc<QueuedWork<P>>;

/// Everything guarded by the registry lock.
struct RegistryState<P> {
    queues: HashMap<Routine, FairPriorityQueue<Entry<P>>>,
    members: HashMap<WorkId, Entry<P>>,
    by_submitter: HashMap<SubmitterId, Vec<WorkId>>,
    batches: HashMap<BatchGroupId, BatchGroup<P>>,
}

impl<P> RegistryState<P> {
    fn new(fairness: FairnessPolicy) -> Self {
        let queues = Routine::ALL
            .into_iter()
            .map(|r| (r, FairPriorityQueue::new(fairness)))
            .collect();
        Self {
            queues,
            members: HashMap::new(),
            by_submitter: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    fn queue_mut(&mut self, routine: Routine) -> &mut FairPriorityQueue<Entry<P>> {
        self.queues
            .entry(routine)
            .or_insert_with(|| FairPriorityQueue::new(FairnessPolicy::disabled()))
    }

    fn insert(&mut self, entry: Entry<P>) {
        let record = entry.record();
        let (routine, tier, id, favored, submitter) = (
            record.routine,
            record.tier,
            record.id,
            record.favored,
            record.submitter,
        );
        self.queue_mut(routine).add(tier, id, favored, Arc::clone(&entry));
        self.by_submitter.entry(submitter).or_default().push(id);
        self.members.insert(id, entry);
    }

    /// Drops membership of `entry` (queue removal is the caller's business).
    fn forget(&mut self, entry: &QueuedWork<P>) {
        let record = entry.record();
        self.members.remove(&record.id);
        if let Some(ids) = self.by_submitter.get_mut(&record.submitter) {
            ids.retain(|id| *id != record.id);
            if ids.is_empty() {
                self.by_submitter.remove(&record.submitter);
            }
        }
    }

    /// Removes a waiting entry from both its queue and membership.
    ///
    /// All-or-nothing: if the entry is waiting but missing from its queue,
    /// nothing changes.
    fn take_waiting(&mut self, id: WorkId) -> Option<Entry<P>> {
        let entry = self.members.get(&id).cloned()?;
        if !entry.is_processing() {
            self.queue_mut(entry.record().routine).remove(id)?;
        }
        self.forget(&entry);
        Some(entry)
    }

    /// Forgets a batch group whose request can no longer complete.
    ///
    /// Groups otherwise live until their last item is completed, even while
    /// no item is queued (continuation items may arrive later).
    fn abort_group(&mut self, group: Option<BatchGroupId>) {
        if let Some(group) = group {
            self.batches.remove(&group);
        }
    }

    fn waiting_in_group(&self, group: BatchGroupId) -> Vec<WorkId> {
        self.members
            .values()
            .filter(|e| e.record().batch_group() == Some(group) && !e.is_processing())
            .map(|e| e.id())
            .collect()
    }
}

/// Admission, ordering and membership authority for every routine queue.
pub struct QueueRegistry<P> {
    state: RwLock<RegistryState<P>>,
    settings: QueueSettings,
    validators: Vec<Arc<dyn Validate<P>>>,
    open: AtomicBool,
    arrivals: AtomicU64,
    bus: Bus,
}

impl<P: Send + Sync + 'static> QueueRegistry<P> {
    /// Creates an open registry with one empty queue per routine.
    pub fn new(
        settings: QueueSettings,
        fairness: FairnessPolicy,
        validators: Vec<Arc<dyn Validate<P>>>,
        bus: Bus,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RegistryState::new(fairness)),
            settings,
            validators,
            open: AtomicBool::new(true),
            arrivals: AtomicU64::new(0),
            bus,
        })
    }

    // ---------------------------
    // Admission
    // ---------------------------

    /// Submits one record.
    ///
    /// `allow_multiple` lets a submitter continue an active batch (the record
    /// must carry the same batch group as every active entry). `privileged`
    /// bypasses the duplicate, size and open checks and places the record in
    /// [`PriorityTier::TIER1`].
    pub fn add(&self, record: WorkRecord<P>, allow_multiple: bool, privileged: bool) -> AddResult {
        self.admit(vec![record], allow_multiple, privileged)
    }

    /// Submits all records of one batch atomically.
    ///
    /// Records must share submitter, routine and batch group; validators run
    /// for each of them.
    pub fn add_batch(&self, records: Vec<WorkRecord<P>>, privileged: bool) -> AddResult {
        let Some(first) = records.first() else {
            return AddResult::Rejected(RejectReason::EmptyBatch);
        };
        let (submitter, routine, group) = (first.submitter, first.routine, first.batch_group());
        let uniform = group.is_some()
            && records.iter().all(|r| {
                r.submitter == submitter && r.routine == routine && r.batch_group() == group
            });
        if !uniform {
            return AddResult::Rejected(RejectReason::MixedBatch);
        }
        self.admit(records, true, privileged)
    }

    fn admit(
        &self,
        mut records: Vec<WorkRecord<P>>,
        allow_multiple: bool,
        privileged: bool,
    ) -> AddResult {
        let Some(first) = records.first() else {
            return AddResult::Rejected(RejectReason::EmptyBatch);
        };
        let submitter = first.submitter;
        let group = first.batch_group();

        let mut state = self.state.write();

        if !privileged {
            if !self.is_open() {
                return AddResult::Rejected(RejectReason::QueueClosed);
            }
            if let Some(existing) = state.by_submitter.get(&submitter) {
                if !allow_multiple {
                    return AddResult::AlreadyInQueue;
                }
                let same_batch = group.is_some()
                    && existing
                        .iter()
                        .filter_map(|id| state.members.get(id))
                        .all(|e| e.record().batch_group() == group);
                if !same_batch {
                    return AddResult::AlreadyInQueue;
                }
            }
            if let Some(limit) = self.settings.queue_limit() {
                if state.members.len() >= limit {
                    return AddResult::Full;
                }
            }
        }

        for record in &records {
            for validator in &self.validators {
                if let Err(reason) = validator.validate(record) {
                    return AddResult::Rejected(RejectReason::Invalid(reason));
                }
            }
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if state.members.contains_key(&record.id) || !seen.insert(record.id) {
                return AddResult::Rejected(RejectReason::DuplicateWorkId(record.id));
            }
        }

        let tier = if privileged {
            PriorityTier::TIER1
        } else {
            PriorityTier::FREE
        };
        if let Some(info) = records[0].batch {
            state
                .batches
                .entry(info.group)
                .or_insert_with(|| BatchGroup::new(info.group, submitter, info.total));
        }

        let mut queued = Vec::with_capacity(records.len());
        for mut record in records.drain(..) {
            record.tier = tier;
            queued.push((record.id, record.routine));
            state.insert(Arc::new(QueuedWork::new(record, self.next_arrival())));
        }
        drop(state);

        for (id, routine) in queued {
            self.bus
                .publish(Event::new(EventKind::WorkQueued).with_work(id, submitter, routine));
        }
        AddResult::Added
    }

    /// Closes (`false`) or reopens (`true`) the queue for regular submitters.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }

    /// True while regular submissions are accepted.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    // ---------------------------
    // Removal
    // ---------------------------

    /// Removes a record from membership and, if waiting, from its queue.
    ///
    /// Returns `false` (and changes nothing) if it is not active.
    pub fn remove(&self, id: WorkId) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.take_waiting(id) else {
            return false;
        };
        entry.release();
        state.abort_group(entry.record().batch_group());
        drop(state);

        self.publish_work(EventKind::WorkCanceled, &entry);
        true
    }

    /// Flags a waiting record as canceled; workers skip it on dequeue.
    ///
    /// Returns `false` if it is unknown, already canceled, or being processed.
    pub fn cancel(&self, id: WorkId) -> bool {
        let state = self.state.read();
        match state.members.get(&id) {
            Some(entry) if !entry.is_processing() => entry.mark_canceled(),
            _ => false,
        }
    }

    /// Removes every waiting record of `submitter`.
    pub fn clear_submitter(&self, submitter: SubmitterId) -> ClearResult {
        let mut state = self.state.write();
        let Some(ids) = state.by_submitter.get(&submitter).cloned() else {
            return ClearResult::NotInQueue;
        };

        let mut removed = Vec::new();
        let mut processing = 0;
        for id in ids {
            match state.members.get(&id) {
                Some(e) if e.is_processing() => processing += 1,
                Some(_) => {
                    if let Some(entry) = state.take_waiting(id) {
                        entry.release();
                        state.abort_group(entry.record().batch_group());
                        removed.push(entry);
                    }
                }
                None => {}
            }
        }
        drop(state);

        for entry in &removed {
            self.publish_work(EventKind::WorkCanceled, entry);
        }
        match (removed.is_empty(), processing > 0) {
            (false, true) => ClearResult::CurrentlyProcessingRemoved,
            (false, false) => ClearResult::Removed,
            (true, true) => ClearResult::CurrentlyProcessing,
            (true, false) => ClearResult::NotInQueue,
        }
    }

    /// Drops every waiting record of `routine`; returns how many.
    pub fn clear_routine(&self, routine: Routine) -> usize {
        let mut state = self.state.write();
        let drained = state.queue_mut(routine).drain();
        for entry in &drained {
            state.forget(entry);
            entry.release();
        }
        for entry in &drained {
            state.abort_group(entry.record().batch_group());
        }
        drop(state);

        for entry in &drained {
            self.publish_work(EventKind::WorkCanceled, entry);
        }
        drained.len()
    }

    /// Drops every waiting record of every routine; returns how many.
    pub fn clear_all(&self) -> usize {
        Routine::ALL.into_iter().map(|r| self.clear_routine(r)).sum()
    }

    // ---------------------------
    // Claims
    // ---------------------------

    /// Takes the next record of `routine`, skipping canceled ones.
    pub fn try_dequeue(self: &Arc<Self>, routine: Routine) -> Option<Claim<P>> {
        let mut skipped = Vec::new();
        let mut state = self.state.write();

        let claimed = loop {
            let Some(entry) = state.queue_mut(routine).dequeue() else {
                break None;
            };
            if entry.is_canceled() {
                state.forget(&entry);
                entry.release();
                state.abort_group(entry.record().batch_group());
                skipped.push(entry);
                continue;
            }
            entry.mark_processing();
            break Some(entry);
        };
        drop(state);

        for entry in &skipped {
            self.publish_work(EventKind::WorkCanceled, entry);
        }
        let entry = claimed?;
        self.publish_work(EventKind::WorkStarted, &entry);
        Some(Claim::new(Arc::clone(self), entry))
    }

    /// Waits for the next record of `routine`, polling with idle backoff.
    ///
    /// Honors pause (no polling while paused) and returns `None` once the
    /// worker context is cancelled.
    pub async fn next(self: &Arc<Self>, routine: Routine, ctx: &WorkerContext) -> Option<Claim<P>> {
        let backoff = self.settings.idle_backoff();
        let mut idle: u32 = 0;

        loop {
            if !ctx.resume_point().await {
                return None;
            }
            if let Some(claim) = self.try_dequeue(routine) {
                ctx.touch();
                return Some(claim);
            }

            let delay = backoff.next(idle);
            idle = idle.saturating_add(1);
            select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => return None,
            }
        }
    }

    pub(crate) fn complete_entry(&self, entry: &QueuedWork<P>, output: P) -> BatchProgress<P> {
        let mut state = self.state.write();
        if !entry.release() {
            return BatchProgress::AlreadySettled;
        }
        state.forget(entry);

        let progress = match entry.record().batch_group() {
            None => BatchProgress::NotBatched,
            Some(group) => match state.batches.get_mut(&group) {
                None => BatchProgress::NotBatched,
                Some(batch) => {
                    if batch.push(output) {
                        match state.batches.remove(&group) {
                            Some(done) => BatchProgress::Complete(done),
                            None => BatchProgress::NotBatched,
                        }
                    } else {
                        BatchProgress::InProgress {
                            completed: batch.completed.len() as u32,
                            total: batch.total,
                        }
                    }
                }
            },
        };
        drop(state);

        self.publish_work(EventKind::WorkCompleted, entry);
        if let BatchProgress::Complete(batch) = &progress {
            self.bus.publish(
                Event::new(EventKind::BatchCompleted)
                    .with_submitter(batch.submitter)
                    .with_attempt(batch.total),
            );
        }
        progress
    }

    /// Releases a claimed entry and aborts the rest of its batch.
    pub(crate) fn abandon_entry(&self, entry: &QueuedWork<P>) -> bool {
        let mut state = self.state.write();
        if !entry.release() {
            return false;
        }
        state.forget(entry);

        let mut aborted = Vec::new();
        if let Some(group) = entry.record().batch_group() {
            for id in state.waiting_in_group(group) {
                if let Some(other) = state.take_waiting(id) {
                    other.release();
                    aborted.push(other);
                }
            }
            state.abort_group(Some(group));
        }
        drop(state);

        self.publish_work(EventKind::WorkCanceled, entry);
        for other in &aborted {
            self.publish_work(EventKind::WorkCanceled, other);
        }
        true
    }

    /// Releases a claimed entry and enqueues a fresh retry copy of it.
    pub(crate) fn requeue_entry(&self, entry: &QueuedWork<P>) -> AddResult
    where
        P: Clone,
    {
        let mut state = self.state.write();
        if !entry.release() {
            return AddResult::Rejected(RejectReason::DuplicateWorkId(entry.id()));
        }
        state.forget(entry);

        let mut fresh = entry.record().clone();
        fresh.retry = true;
        fresh.tier = fresh.tier.min(PriorityTier::TIER2);
        state.insert(Arc::new(QueuedWork::new(fresh, self.next_arrival())));
        drop(state);

        self.publish_work(EventKind::WorkRequeued, entry);
        AddResult::Added
    }

    // ---------------------------
    // Queries
    // ---------------------------

    /// Position of `submitter`'s record `id` in its routine queue.
    ///
    /// Items ahead = records being processed in the routine (one slot each)
    /// + remaining items of every waiting request placed earlier (batches
    /// counted once, by what they still have to do). `None` if the record is
    /// not active or belongs to someone else.
    pub fn check_position(&self, submitter: SubmitterId, id: WorkId) -> Option<PositionResult> {
        let state = self.state.read();
        let entry = state.members.get(&id).filter(|e| e.record().submitter == submitter)?;
        let record = entry.record();
        let routine = record.routine;
        let own_group = record.batch_group();

        let processing = state
            .members
            .values()
            .filter(|e| e.record().routine == routine && e.is_processing())
            .count();

        let mut seen_groups = HashSet::new();
        let mut ahead = processing;
        let mut waiting_total = 0;
        let mut found = false;

        if let Some(queue) = state.queues.get(&routine) {
            for other in queue.iter() {
                let weight = request_weight(other, &mut seen_groups);
                waiting_total += weight;

                let same_request = other.id() == id
                    || (own_group.is_some() && other.record().batch_group() == own_group);
                if same_request {
                    found = true;
                } else if !found {
                    ahead += weight;
                }
            }
        }

        if entry.is_processing() {
            return Some(PositionResult {
                work_id: id,
                routine,
                position: 0,
                total_outstanding: processing + waiting_total,
                batch_index: record.batch_index(),
                batch_total: record.batch_total(),
                processing: true,
            });
        }

        // Member but not (yet) visible in a queue: place it behind everything.
        let mut total = processing + waiting_total;
        if !found {
            ahead = total;
            total += record.remaining_items();
        }

        Some(PositionResult {
            work_id: id,
            routine,
            position: ahead + 1,
            total_outstanding: total,
            batch_index: record.batch_index(),
            batch_total: record.batch_total(),
            processing: false,
        })
    }

    /// Active record ids of `submitter`, oldest first.
    pub fn submitter_entries(&self, submitter: SubmitterId) -> Vec<WorkId> {
        let state = self.state.read();
        let mut entries: Vec<_> = state
            .by_submitter
            .get(&submitter)
            .into_iter()
            .flatten()
            .filter_map(|id| state.members.get(id))
            .map(|e| (e.arrival(), e.id()))
            .collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Waiting records of `routine`, in dequeue order.
    pub fn waiting(&self, routine: Routine) -> Vec<Arc<QueuedWork<P>>> {
        let state = self.state.read();
        state
            .queues
            .get(&routine)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of active records (waiting + processing).
    pub fn len(&self) -> usize {
        self.state.read().members.len()
    }

    /// True when no record is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts per routine.
    pub fn summary(&self) -> Vec<RoutineSummary> {
        let state = self.state.read();
        Routine::ALL
            .into_iter()
            .map(|routine| RoutineSummary {
                routine,
                waiting: state.queues.get(&routine).map_or(0, |q| q.len()),
                processing: state
                    .members
                    .values()
                    .filter(|e| e.record().routine == routine && e.is_processing())
                    .count(),
            })
            .collect()
    }

    /// Active batch groups.
    pub fn batch_count(&self) -> usize {
        self.state.read().batches.len()
    }

    fn next_arrival(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::Relaxed)
    }

    fn publish_work(&self, kind: EventKind, entry: &QueuedWork<P>) {
        let r = entry.record();
        self.bus
            .publish(Event::new(kind).with_work(r.id, r.submitter, r.routine));
    }
}

/// Items a waiting record stands for; a batch counts once, at its first
/// waiting record, with everything it still has to do.
fn request_weight<P>(entry: &QueuedWork<P>, seen_groups: &mut HashSet<BatchGroupId>) -> usize {
    if entry.is_canceled() {
        return 0;
    }
    match entry.record().batch_group() {
        Some(group) if !seen_groups.insert(group) => 0,
        _ => entry.record().remaining_items(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max_queue_count: usize) -> Arc<QueueRegistry<&'static str>> {
        let settings = QueueSettings {
            max_queue_count,
            ..Default::default()
        };
        QueueRegistry::new(settings, FairnessPolicy::disabled(), Vec::new(), Bus::new(64))
    }

    fn single(id: WorkId, submitter: SubmitterId) -> WorkRecord<&'static str> {
        WorkRecord::new(id, submitter, Routine::LinkTrade, "pk")
    }

    fn batch(first_id: WorkId, submitter: SubmitterId, group: BatchGroupId, total: u32) -> Vec<WorkRecord<&'static str>> {
        (1..=total)
            .map(|i| {
                WorkRecord::new(first_id + u64::from(i) - 1, submitter, Routine::LinkTrade, "pk")
                    .in_batch(group, i, total)
            })
            .collect()
    }

    #[test]
    fn second_submission_is_rejected() {
        let reg = registry(0);
        assert_eq!(reg.add(single(1, 7), false, false), AddResult::Added);
        assert_eq!(reg.add(single(2, 7), false, false), AddResult::AlreadyInQueue);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.submitter_entries(7), vec![1]);
    }

    #[test]
    fn batch_continuation_only_within_same_group() {
        let reg = registry(0);
        let mut items = batch(10, 7, 100, 3);
        let third = items.pop().expect("3 items");
        assert!(reg.add_batch(items, false).is_added());

        assert_eq!(reg.add(third, true, false), AddResult::Added);
        let stranger = single(20, 7).in_batch(200, 1, 1);
        assert_eq!(reg.add(stranger, true, false), AddResult::AlreadyInQueue);
        assert_eq!(reg.add(single(21, 7), true, false), AddResult::AlreadyInQueue);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.batch_count(), 1);
    }

    #[test]
    fn full_unless_privileged() {
        let reg = registry(2);
        assert!(reg.add(single(1, 1), false, false).is_added());
        assert!(reg.add(single(2, 2), false, false).is_added());
        assert_eq!(reg.add(single(3, 3), false, false), AddResult::Full);

        assert!(reg.add(single(4, 4), false, true).is_added());
        assert_eq!(reg.len(), 3);

        // Privileged records go to TIER1, ahead of everyone.
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        assert_eq!(claim.record().id, 4);
        assert_eq!(claim.record().tier, PriorityTier::TIER1);
    }

    #[test]
    fn closed_queue_rejects_regular_submitters() {
        let reg = registry(0);
        reg.set_open(false);
        assert_eq!(
            reg.add(single(1, 1), false, false),
            AddResult::Rejected(RejectReason::QueueClosed)
        );
        assert!(reg.add(single(2, 2), false, true).is_added());
        reg.set_open(true);
        assert!(reg.add(single(3, 3), false, false).is_added());
    }

    #[test]
    fn validators_run_for_every_batch_item() {
        let no_ten_plus_two = |r: &WorkRecord<&'static str>| {
            if r.id == 12 { Err("item not allowed".to_string()) } else { Ok(()) }
        };
        let reg = QueueRegistry::new(
            QueueSettings::default(),
            FairnessPolicy::disabled(),
            vec![Arc::new(no_ten_plus_two) as Arc<dyn Validate<&'static str>>],
            Bus::new(16),
        );
        assert_eq!(
            reg.add_batch(batch(10, 7, 1, 3), false),
            AddResult::Rejected(RejectReason::Invalid("item not allowed".into()))
        );
        assert!(reg.is_empty());
        assert_eq!(reg.batch_count(), 0);
    }

    #[test]
    fn malformed_batches_are_rejected() {
        let reg = registry(0);
        assert_eq!(reg.add_batch(Vec::new(), false), AddResult::Rejected(RejectReason::EmptyBatch));

        let mut mixed = batch(10, 7, 1, 2);
        mixed[1].submitter = 8;
        assert_eq!(reg.add_batch(mixed, false), AddResult::Rejected(RejectReason::MixedBatch));

        let mut dup = batch(10, 7, 1, 2);
        dup[1].id = 10;
        assert_eq!(
            reg.add_batch(dup, false),
            AddResult::Rejected(RejectReason::DuplicateWorkId(10))
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn position_counts_items_not_requests() {
        let reg = registry(0);
        reg.add(single(1, 1), false, false);
        reg.add_batch(batch(10, 2, 500, 3), false);
        reg.add(single(20, 3), false, false);

        let c = reg.check_position(3, 20).expect("queued");
        assert_eq!((c.position, c.total_outstanding), (5, 5));

        let b2 = reg.check_position(2, 11).expect("queued");
        assert_eq!((b2.position, b2.batch_index, b2.batch_total), (2, 2, 3));

        // Someone else's id reveals nothing.
        assert!(reg.check_position(9, 20).is_none());

        let a = reg.try_dequeue(Routine::LinkTrade).expect("a");
        let a_pos = reg.check_position(1, 1).expect("processing");
        assert!(a_pos.processing);
        assert_eq!(a_pos.position, 0);

        let b1 = reg.try_dequeue(Routine::LinkTrade).expect("b1");
        let c = reg.check_position(3, 20).expect("queued");
        // 2 processing + 2 remaining batch items ahead.
        assert_eq!((c.position, c.total_outstanding), (5, 5));

        let _ = a.complete("done");
        let _ = b1.complete("b1");
        let c = reg.check_position(3, 20).expect("queued");
        assert_eq!((c.position, c.total_outstanding), (3, 3));
    }

    #[test]
    fn claim_completion_releases_membership_and_collects_batch() {
        let reg = registry(0);
        reg.add_batch(batch(10, 7, 42, 2), false);

        let first = reg.try_dequeue(Routine::LinkTrade).expect("first");
        match first.complete("x") {
            BatchProgress::InProgress { completed, total } => assert_eq!((completed, total), (1, 2)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reg.submitter_entries(7), vec![11]);

        let second = reg.try_dequeue(Routine::LinkTrade).expect("second");
        match second.complete("y") {
            BatchProgress::Complete(group) => {
                assert_eq!(group.group_id, 42);
                assert_eq!(group.completed, vec!["x", "y"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reg.is_empty());
        assert_eq!(reg.batch_count(), 0);
        assert!(reg.add(single(1, 7), false, false).is_added());
    }

    #[test]
    fn batch_survives_until_continuation_items_complete() {
        let reg = registry(0);
        let mut items = batch(10, 7, 42, 3).into_iter();
        let (first, second, third) = (
            items.next().expect("1/3"),
            items.next().expect("2/3"),
            items.next().expect("3/3"),
        );
        let mut rx = reg.bus.subscribe();

        assert!(reg.add(first, false, false).is_added());
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("first");
        assert!(matches!(
            claim.complete("a"),
            BatchProgress::InProgress { completed: 1, total: 3 }
        ));
        assert!(reg.is_empty());
        assert_eq!(reg.batch_count(), 1);

        assert!(reg.add(second, true, false).is_added());
        assert!(reg.add(third, true, false).is_added());
        assert_eq!(reg.batch_count(), 1);

        let claim = reg.try_dequeue(Routine::LinkTrade).expect("second");
        assert!(matches!(
            claim.complete("b"),
            BatchProgress::InProgress { completed: 2, total: 3 }
        ));
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("third");
        match claim.complete("c") {
            BatchProgress::Complete(group) => assert_eq!(group.completed, vec!["a", "b", "c"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reg.batch_count(), 0);

        let mut batch_done = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::BatchCompleted {
                batch_done += 1;
            }
        }
        assert_eq!(batch_done, 1);
    }

    #[test]
    fn privileged_submitter_may_queue_twice() {
        let reg = registry(0);
        assert!(reg.add(single(1, 7), false, false).is_added());
        assert_eq!(reg.add(single(2, 7), false, true), AddResult::Added);

        let mut ids = reg.submitter_entries(7);
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);

        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        assert_eq!(claim.record().id, 2);
        assert_eq!(claim.record().tier, PriorityTier::TIER1);
    }

    #[test]
    fn dropped_claim_aborts_the_batch() {
        let reg = registry(0);
        reg.add_batch(batch(10, 7, 42, 3), false);
        reg.add(single(50, 8), false, false);

        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        drop(claim);

        assert!(reg.submitter_entries(7).is_empty());
        assert_eq!(reg.batch_count(), 0);
        assert_eq!(reg.len(), 1);
        let next = reg.try_dequeue(Routine::LinkTrade).expect("next");
        assert_eq!(next.record().id, 50);
    }

    #[test]
    fn requeue_moves_retry_to_tier2() {
        let reg = registry(0);
        reg.add(single(1, 1), false, false);
        reg.add(single(2, 2), false, false);

        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        assert_eq!(claim.requeue(), AddResult::Added);
        assert_eq!(reg.len(), 2);

        let retried = reg.try_dequeue(Routine::LinkTrade).expect("retry first");
        assert_eq!(retried.record().id, 1);
        assert!(retried.record().retry);
        assert_eq!(retried.record().tier, PriorityTier::TIER2);
    }

    #[test]
    fn canceled_entries_are_skipped() {
        let reg = registry(0);
        reg.add(single(1, 1), false, false);
        reg.add(single(2, 2), false, false);

        assert!(reg.cancel(1));
        assert!(!reg.cancel(1));
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        assert_eq!(claim.record().id, 2);
        assert!(reg.submitter_entries(1).is_empty());
        assert!(!reg.cancel(2), "processing records cannot be flagged");
    }

    #[test]
    fn remove_is_all_or_nothing() {
        let reg = registry(0);
        reg.add(single(1, 1), false, false);
        assert!(reg.remove(1));
        assert!(!reg.remove(1));
        assert!(reg.is_empty());
        assert!(reg.try_dequeue(Routine::LinkTrade).is_none());
    }

    #[test]
    fn clear_submitter_reports_processing() {
        let reg = registry(0);
        assert_eq!(reg.clear_submitter(7), ClearResult::NotInQueue);

        reg.add_batch(batch(10, 7, 1, 3), false);
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        assert_eq!(reg.clear_submitter(7), ClearResult::CurrentlyProcessingRemoved);
        assert_eq!(reg.clear_submitter(7), ClearResult::CurrentlyProcessing);
        assert_eq!(reg.submitter_entries(7), vec![10]);
        drop(claim);
        assert_eq!(reg.clear_submitter(7), ClearResult::NotInQueue);
    }

    #[test]
    fn clear_all_and_summary() {
        let reg = registry(0);
        reg.add(single(1, 1), false, false);
        reg.add(WorkRecord::new(2, 2, Routine::Dump, "pk"), false, false);
        reg.add(WorkRecord::new(3, 3, Routine::Dump, "pk"), false, false);
        let _claim = reg.try_dequeue(Routine::Dump).expect("claim");

        let dump = reg
            .summary()
            .into_iter()
            .find(|s| s.routine == Routine::Dump)
            .expect("dump row");
        assert_eq!((dump.waiting, dump.processing), (1, 1));

        assert_eq!(reg.clear_all(), 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn queue_events_are_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let reg: Arc<QueueRegistry<&'static str>> = QueueRegistry::new(
            QueueSettings::default(),
            FairnessPolicy::disabled(),
            Vec::new(),
            bus,
        );
        reg.add(single(1, 7), false, false);
        let claim = reg.try_dequeue(Routine::LinkTrade).expect("claim");
        let _ = claim.complete("ok");

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::WorkQueued, EventKind::WorkStarted, EventKind::WorkCompleted]
        );
    }
}
