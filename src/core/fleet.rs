//! # Fleet: composition root of workers, recovery and queues.
//!
//! A [`Fleet`] owns the event bus, the [`SubscriberSet`], the worker roster,
//! the [`RecoverySupervisor`] and the [`QueueRegistry`]. Everything an
//! operator or a chat command surface needs goes through it.
//!
//! ## Architecture
//! ```text
//! chat command ──► Fleet::submit ──► Legality::generate_or_validate (once per candidate)
//!                                         └─► QueueRegistry::add / add_batch
//!
//! Fleet::register(worker) ──► WorkerHandle (child token of the fleet token)
//!                               └─► roster ◄── RecoverySupervisor (tick | crash signal)
//!
//! Bus ◄── publish(Event) ── handles, supervisor, registry, fleet
//!  └─► subscriber listener ──► SubscriberSet ──► LogWriter, chat bridge, ...
//! ```
//!
//! ## Shutdown path
//! ```text
//! shutdown():
//!   ├─ publish ShutdownRequested, close the queue
//!   ├─ cancel fleet token (supervisor + every worker run)
//!   ├─ wait for workers within cfg.grace
//!   │    ├─ ok      → AllStoppedWithin
//!   │    └─ timeout → GraceExceeded (FleetError::GraceExceeded)
//!   └─ drain the subscriber listener
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{FleetConfig, Legality, WorkerRegistry};
use crate::error::{FleetError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::queue::{
    AddResult, BatchGroupId, QueueRegistry, RejectReason, Routine, SubmitterId, WorkId, WorkRecord,
};
use crate::recovery::{RecoveryState, RecoverySupervisor};
use crate::subscribers::SubscriberSet;
use crate::workers::{Execute, QueueWorker, WorkerHandle, WorkerRef};

/// Who submits what, and with which privileges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Submitting user.
    pub submitter: SubmitterId,
    /// Work category.
    pub routine: Routine,
    /// Eligible for the favored fast lane.
    pub favored: bool,
    /// Bypasses duplicate, size and open checks; queued at `TIER1`.
    pub privileged: bool,
    /// Display label (trainer name) used in position messages.
    pub label: Option<String>,
}

impl Submission {
    /// Plain, non-favored submission.
    pub fn new(submitter: SubmitterId, routine: Routine) -> Self {
        Self {
            submitter,
            routine,
            favored: false,
            privileged: false,
            label: None,
        }
    }

    /// Marks the submitter as favored.
    pub fn favored(mut self, favored: bool) -> Self {
        self.favored = favored;
        self
    }

    /// Marks the submission as privileged.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Sets the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Outcome of [`Fleet::submit`] / [`Fleet::submit_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// What the registry (or the legality engine) decided.
    pub result: AddResult,
    /// Ids assigned to the records (empty if nothing was queued).
    pub work_ids: Vec<WorkId>,
    /// Batch group, for batch submissions that were queued.
    pub group: Option<BatchGroupId>,
}

impl Receipt {
    fn rejected(result: AddResult) -> Self {
        Self {
            result,
            work_ids: Vec::new(),
            group: None,
        }
    }

    /// First queued id (what position queries use).
    pub fn first_id(&self) -> Option<WorkId> {
        self.work_ids.first().copied()
    }
}

/// Fleet of supervised workers sharing one set of routine queues.
pub struct Fleet<P: Send + Sync + 'static> {
    cfg: FleetConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    roster: Arc<WorkerRegistry>,
    supervisor: Arc<RecoverySupervisor>,
    queues: Arc<QueueRegistry<P>>,
    crash_signal: Arc<Notify>,
    runtime_token: CancellationToken,
    listener_token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
    ids: AtomicU64,
}

impl<P: Send + Sync + 'static> Fleet<P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: FleetConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        roster: Arc<WorkerRegistry>,
        supervisor: Arc<RecoverySupervisor>,
        queues: Arc<QueueRegistry<P>>,
        crash_signal: Arc<Notify>,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs,
            roster,
            supervisor,
            queues,
            crash_signal,
            runtime_token,
            listener_token: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
            ids: AtomicU64::new(1),
        }
    }

    /// Spawns the subscriber listener and the supervisor loop.
    pub(crate) fn spawn_background(&self) {
        let listener = self.subscriber_listener();
        let supervisor = tokio::spawn(
            Arc::clone(&self.supervisor).run(self.runtime_token.child_token()),
        );
        self.background.lock().extend([listener, supervisor]);
    }

    /// Forwards bus events to the subscriber set until the listener token
    /// fires, then drains what is left in the channel.
    fn subscriber_listener(&self) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.listener_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
            while let Ok(ev) = rx.try_recv() {
                set.emit(&ev);
            }
        })
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    /// The shared routine queues.
    pub fn queues(&self) -> &Arc<QueueRegistry<P>> {
        &self.queues
    }

    /// A new receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Sorted names of the registered workers.
    pub async fn workers(&self) -> Vec<String> {
        self.roster.list().await
    }

    // ---------------------------
    // Workers
    // ---------------------------

    /// Registers a stopped worker.
    pub async fn register(&self, worker: WorkerRef) -> Result<Arc<WorkerHandle>, FleetError> {
        let handle = Arc::new(WorkerHandle::new(
            worker,
            self.runtime_token.clone(),
            self.bus.clone(),
            Arc::clone(&self.crash_signal),
        ));
        let member = self.roster.insert(handle).await?;
        self.bus
            .publish(Event::new(EventKind::WorkerRegistered).with_worker(member.handle.name()));
        Ok(member.handle)
    }

    /// Registers a worker serving `routine` through `executor`.
    pub async fn register_queue_worker<E>(
        &self,
        name: impl Into<String>,
        routine: Routine,
        executor: Arc<E>,
    ) -> Result<Arc<WorkerHandle>, FleetError>
    where
        P: Clone,
        E: Execute<P>,
    {
        let body = QueueWorker::arc(name, routine, Arc::clone(&self.queues), executor);
        self.register(body).await
    }

    /// Starts every registered worker that is not running.
    pub async fn start_all(&self) -> Result<(), FleetError> {
        for member in self.roster.snapshot().await {
            match member.handle.start() {
                Ok(()) | Err(WorkerError::AlreadyRunning) => {}
                Err(source) => {
                    return Err(FleetError::Worker {
                        name: member.handle.name().to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Starts one worker and clears its intentional-stop flag.
    pub async fn start_worker(&self, name: &str) -> Result<(), FleetError> {
        let member = self.roster.require(name).await?;
        member.record.clear_intentionally_stopped();
        member.handle.start().map_err(|source| FleetError::Worker {
            name: name.to_string(),
            source,
        })
    }

    /// Stops one worker on purpose; a recovery in flight will not restart it.
    pub async fn stop_worker(&self, name: &str) -> Result<(), FleetError> {
        let member = self.roster.require(name).await?;
        member.record.mark_intentionally_stopped();
        member.handle.stop().await;
        Ok(())
    }

    /// Parks a worker at its next resume point.
    pub async fn pause_worker(&self, name: &str) -> Result<(), FleetError> {
        self.roster.require(name).await?.handle.pause();
        Ok(())
    }

    /// Lets a paused worker continue.
    pub async fn resume_worker(&self, name: &str) -> Result<(), FleetError> {
        self.roster.require(name).await?.handle.resume();
        Ok(())
    }

    // ---------------------------
    // Recovery
    // ---------------------------

    /// Tells the supervisor to leave `name` alone; returns the previous flag.
    pub async fn mark_intentionally_stopped(&self, name: &str) -> Result<bool, FleetError> {
        Ok(self.roster.require(name).await?.record.mark_intentionally_stopped())
    }

    /// Makes `name` eligible for recovery again; returns the previous flag.
    pub async fn clear_intentionally_stopped(&self, name: &str) -> Result<bool, FleetError> {
        Ok(self.roster.require(name).await?.record.clear_intentionally_stopped())
    }

    /// Operator override: clears failures, crash history and halt state.
    pub async fn reset_recovery_state(&self, name: &str) -> Result<(), FleetError> {
        if self.supervisor.reset(name).await {
            Ok(())
        } else {
            Err(FleetError::UnknownWorker(name.to_string()))
        }
    }

    /// Records an error caught by the worker's owner and wakes the supervisor.
    pub async fn report_crash(&self, name: &str, error: impl Into<String>) -> Result<(), FleetError> {
        if self.supervisor.report_crash(name, error).await {
            Ok(())
        } else {
            Err(FleetError::UnknownWorker(name.to_string()))
        }
    }

    /// Lets the supervisor act on crashes again.
    pub fn enable(&self) {
        self.supervisor.enable();
    }

    /// Keeps the supervisor watching but not acting.
    pub fn disable(&self) {
        self.supervisor.disable();
    }

    /// Snapshot of one worker's recovery state.
    pub async fn recovery_state(&self, name: &str) -> Option<RecoveryState> {
        self.supervisor.state(name).await
    }

    /// Snapshots of every worker.
    pub async fn recovery_states(&self) -> Vec<RecoveryState> {
        self.supervisor.states().await
    }

    // ---------------------------
    // Submissions
    // ---------------------------

    /// Allocates a fresh work id.
    pub fn next_work_id(&self) -> WorkId {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Validates one candidate and queues it.
    pub fn submit<L>(&self, legality: &L, sub: &Submission, request: &L::Request) -> Receipt
    where
        L: Legality<P>,
    {
        let payload = match legality.generate_or_validate(request) {
            Ok(payload) => payload,
            Err(err) => {
                return Receipt::rejected(AddResult::Rejected(RejectReason::Legality {
                    index: 0,
                    reason: err.reason,
                }));
            }
        };

        let id = self.next_work_id();
        let record = self.record(id, sub, payload);
        let result = self.queues.add(record, false, sub.privileged);
        let work_ids = if result.is_added() { vec![id] } else { Vec::new() };
        Receipt {
            result,
            work_ids,
            group: None,
        }
    }

    /// Validates every candidate (stopping at the first refusal) and queues
    /// them as one batch.
    pub fn submit_batch<L>(&self, legality: &L, sub: &Submission, requests: &[L::Request]) -> Receipt
    where
        L: Legality<P>,
    {
        if requests.is_empty() {
            return Receipt::rejected(AddResult::Rejected(RejectReason::EmptyBatch));
        }

        let mut payloads = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match legality.generate_or_validate(request) {
                Ok(payload) => payloads.push(payload),
                Err(err) => {
                    return Receipt::rejected(AddResult::Rejected(RejectReason::Legality {
                        index,
                        reason: err.reason,
                    }));
                }
            }
        }

        let total = match batch_total(payloads.len()) {
            Ok(total) => total,
            Err(reason) => return Receipt::rejected(AddResult::Rejected(reason)),
        };
        let group = self.next_work_id();
        let records: Vec<_> = payloads
            .into_iter()
            .zip(1..=total)
            .map(|(payload, index)| {
                self.record(self.next_work_id(), sub, payload)
                    .in_batch(group, index, total)
            })
            .collect();
        let ids: Vec<_> = records.iter().map(|r| r.id).collect();

        let result = self.queues.add_batch(records, sub.privileged);
        if result.is_added() {
            Receipt {
                result,
                work_ids: ids,
                group: Some(group),
            }
        } else {
            Receipt::rejected(result)
        }
    }

    fn record(&self, id: WorkId, sub: &Submission, payload: P) -> WorkRecord<P> {
        let record = WorkRecord::new(id, sub.submitter, sub.routine, payload).favored(sub.favored);
        match &sub.label {
            Some(label) => record.with_label(label.clone()),
            None => record,
        }
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Closes the queue, cancels every worker and the supervisor, and waits
    /// up to `cfg.grace` for the workers to return.
    pub async fn shutdown(&self) -> Result<(), FleetError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.queues.set_open(false);
        self.runtime_token.cancel();

        let members = self.roster.snapshot().await;
        let grace = self.cfg.grace;
        let stops = join_all(members.iter().map(|m| m.handle.stop()));
        let res = match tokio::time::timeout(grace, stops).await {
            Ok(_) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_elapsed) => {
                let running: Vec<String> = members
                    .iter()
                    .filter(|m| m.handle.is_running())
                    .map(|m| m.handle.name().to_string())
                    .collect();
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(running.join(",")),
                );
                Err(FleetError::GraceExceeded { grace, running })
            }
        };

        self.listener_token.cancel();
        let background: Vec<_> = std::mem::take(&mut *self.background.lock());
        for h in background {
            let _ = h.await;
        }
        self.subs.shutdown().await;
        res
    }
}

/// Number of items in a batch, as carried by each record's `1..=total` index.
fn batch_total(len: usize) -> Result<u32, RejectReason> {
    u32::try_from(len).map_err(|_| RejectReason::BatchTooLarge(len))
}
