//! # Runtime events emitted by the fleet, the recovery supervisor and the queues.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Recovery events**: crash detection and the restart sequence
//! - **Worker events**: registration and operator-driven start/stop
//! - **Queue events**: work moving through the registry
//! - **Runtime events**: shutdown
//!
//! The [`Event`] struct carries the metadata (worker name, attempt, delay,
//! reason, work id, ...) that applies to its kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RecoveryAttempted)
//!     .with_worker("bot-1")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(10));
//!
//! assert_eq!(ev.kind, EventKind::RecoveryAttempted);
//! assert_eq!(ev.worker.as_deref(), Some("bot-1"));
//! assert_eq!(ev.delay_ms, Some(10_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::queue::{Routine, SubmitterId, WorkId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Shutdown events ===
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// All workers stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    GraceExceeded,

    // === Worker events ===
    /// Worker handle registered with the fleet.
    ///
    /// Sets: `worker`.
    WorkerRegistered,

    /// Worker body started (operator start or recovery restart).
    ///
    /// Sets: `worker`.
    WorkerStarted,

    /// Worker body exited (stop, error, or panic).
    ///
    /// Sets: `worker`, `reason` (error text, absent on clean exit).
    WorkerExited,

    // === Recovery events ===
    /// Unintentional stop detected.
    ///
    /// Sets: `worker`, `attempt` (number the next recovery would use), `reason`
    /// (last reported error, if any).
    WorkerCrashed,

    /// A restart attempt has begun.
    ///
    /// Sets: `worker`, `attempt`, `delay_ms` (sleep before starting).
    RecoveryAttempted,

    /// The worker is running again after a restart attempt.
    ///
    /// Sets: `worker`, `attempt`.
    RecoverySucceeded,

    /// A restart attempt did not bring the worker back.
    ///
    /// Sets: `worker`, `attempt`, `reason`.
    RecoveryFailed,

    /// Terminal: no more restarts until an operator reset.
    ///
    /// Sets: `worker`, `attempt` (failures so far), `reason`
    /// (`attempts_exhausted` or `crash_rate_limited`).
    RecoveryExhausted,

    /// Consecutive failures were forgiven after a stable run.
    ///
    /// Sets: `worker`, `attempt` (failures forgiven).
    StabilityReset,

    /// An operator cleared the recovery state.
    ///
    /// Sets: `worker`.
    RecoveryReset,

    // === Queue events ===
    /// Work accepted into a queue.
    ///
    /// Sets: `work_id`, `submitter`, `routine`.
    WorkQueued,

    /// A worker claimed the work.
    ///
    /// Sets: `work_id`, `submitter`, `routine`.
    WorkStarted,

    /// Work finished successfully.
    WorkCompleted,

    /// Work was canceled or abandoned.
    WorkCanceled,

    /// Work was aborted and a fresh copy re-enqueued.
    WorkRequeued,

    /// Every item of a batch has completed.
    ///
    /// Sets: `submitter`, `attempt` (number of items).
    BatchCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the worker, if applicable.
    pub worker: Option<Arc<str>>,
    /// Attempt number (starting from 1) or a count, see [`EventKind`].
    pub attempt: Option<u32>,
    /// Delay before the next action in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (error text, halt label).
    pub reason: Option<Arc<str>>,

    /// Work item, for queue events.
    pub work_id: Option<WorkId>,
    /// Submitter, for queue events.
    pub submitter: Option<SubmitterId>,
    /// Routine, for queue events.
    pub routine: Option<Routine>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            attempt: None,
            delay_ms: None,
            reason: None,
            work_id: None,
            submitter: None,
            routine: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches the work identity of a queue event.
    #[inline]
    pub fn with_work(mut self, id: WorkId, submitter: SubmitterId, routine: Routine) -> Self {
        self.work_id = Some(id);
        self.submitter = Some(submitter);
        self.routine = Some(routine);
        self
    }

    /// Attaches a submitter.
    #[inline]
    pub fn with_submitter(mut self, submitter: SubmitterId) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// True for the four operator-facing recovery signals and the terminal one.
    #[inline]
    pub fn is_recovery(&self) -> bool {
        matches!(
            self.kind,
            EventKind::WorkerCrashed
                | EventKind::RecoveryAttempted
                | EventKind::RecoverySucceeded
                | EventKind::RecoveryFailed
                | EventKind::RecoveryExhausted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::WorkerRegistered);
        let b = Event::new(EventKind::WorkerRegistered);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates_at_u32() {
        let ev = Event::new(EventKind::RecoveryAttempted).with_delay(Duration::from_secs(u64::MAX / 4));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn recovery_classification() {
        assert!(Event::new(EventKind::RecoveryFailed).is_recovery());
        assert!(!Event::new(EventKind::WorkQueued).is_recovery());
    }
}
