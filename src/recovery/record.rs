//! # Per-worker recovery bookkeeping.
//!
//! [`RecoveryRecord`] splits its fields by writer:
//! - supervisor-only counters (`consecutive_failures`, crash history, last
//!   attempt, halt marker) live behind one mutex and are only changed by the
//!   recovery supervisor or an operator reset;
//! - the two caller-writable flags (`intentionally_stopped`, `is_recovering`)
//!   are atomics updated with swap / compare-exchange.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Why a crashed worker is no longer recovered automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HaltReason {
    /// `consecutive_failures` reached `max_recovery_attempts`.
    AttemptsExhausted,
    /// Too many crashes inside the crash window.
    CrashRateLimited,
}

impl HaltReason {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            HaltReason::AttemptsExhausted => "attempts_exhausted",
            HaltReason::CrashRateLimited => "crash_rate_limited",
        }
    }
}

/// Crash timestamps inside a rolling window, oldest first.
#[derive(Debug, Default)]
pub(crate) struct CrashHistory {
    entries: VecDeque<Instant>,
}

impl CrashHistory {
    pub(crate) fn push(&mut self, at: Instant) {
        self.entries.push_back(at);
    }

    /// Drops entries older than `window` and returns how many remain.
    pub(crate) fn prune(&mut self, now: Instant, window: Duration) -> usize {
        while let Some(&oldest) = self.entries.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.entries.pop_front();
        }
        self.entries.len()
    }

    /// Entries younger than `window`, without pruning.
    pub(crate) fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.entries
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Supervisor-owned counters.
#[derive(Debug, Default)]
pub(crate) struct RecoveryCounters {
    pub(crate) consecutive_failures: u32,
    pub(crate) history: CrashHistory,
    pub(crate) last_recovery_attempt: Option<Instant>,
    pub(crate) last_error: Option<String>,
    pub(crate) halted: Option<HaltReason>,
    /// A `WorkerCrashed` event was emitted for the current outage.
    pub(crate) crash_reported: bool,
    /// A halt was reported through `RecoveryExhausted`.
    pub(crate) halt_reported: bool,
}

/// Recovery state of one worker.
#[derive(Debug, Default)]
pub struct RecoveryRecord {
    intentionally_stopped: AtomicBool,
    is_recovering: AtomicBool,
    counters: Mutex<RecoveryCounters>,
}

impl RecoveryRecord {
    /// Sets the intentional-stop flag; returns its previous value.
    pub fn mark_intentionally_stopped(&self) -> bool {
        self.intentionally_stopped.swap(true, Ordering::AcqRel)
    }

    /// Clears the intentional-stop flag; returns its previous value.
    pub fn clear_intentionally_stopped(&self) -> bool {
        self.intentionally_stopped.swap(false, Ordering::AcqRel)
    }

    /// True if a caller stopped the worker on purpose.
    pub fn is_intentionally_stopped(&self) -> bool {
        self.intentionally_stopped.load(Ordering::Acquire)
    }

    /// True while a recovery sequence is in flight.
    pub fn is_recovering(&self) -> bool {
        self.is_recovering.load(Ordering::Acquire)
    }

    /// Claims the in-flight flag; `None` if a recovery already runs.
    pub(crate) fn begin_recovery(self: &Arc<Self>) -> Option<RecoveringGuard> {
        self.is_recovering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RecoveringGuard(Arc::clone(self)))
    }

    pub(crate) fn counters(&self) -> parking_lot::MutexGuard<'_, RecoveryCounters> {
        self.counters.lock()
    }

    /// Records an error reported by the worker body or its owner.
    pub fn record_error(&self, error: impl Into<String>) {
        self.counters.lock().last_error = Some(error.into());
    }

    /// Operator override: forgets failures, crash history, halt state and the
    /// in-flight flag.
    pub fn reset(&self) {
        let mut c = self.counters.lock();
        c.consecutive_failures = 0;
        c.history.clear();
        c.last_recovery_attempt = None;
        c.halted = None;
        c.crash_reported = false;
        c.halt_reported = false;
        drop(c);
        self.is_recovering.store(false, Ordering::Release);
    }
}

/// Clears `is_recovering` on every exit path of a recovery sequence.
#[derive(Debug)]
pub(crate) struct RecoveringGuard(Arc<RecoveryRecord>);

impl Drop for RecoveringGuard {
    fn drop(&mut self) {
        self.0.is_recovering.store(false, Ordering::Release);
    }
}
