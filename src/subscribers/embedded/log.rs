//! # LogWriter: renders events through `tracing`
//!
//! A subscriber that turns every [`Event`] into a structured `tracing` record.
//! Recovery and failure signals are logged at `warn`/`error`, queue traffic at
//! `debug`, the rest at `info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! WARN  worker crashed worker="bot-1" attempt=1 reason="connection lost: socket closed"
//! INFO  recovery attempted worker="bot-1" attempt=1 delay_ms=5000
//! INFO  recovery succeeded worker="bot-1" attempt=1
//! ERROR recovery exhausted worker="bot-2" attempt=3 reason="attempts_exhausted"
//! DEBUG work queued work_id=5001 submitter=42 routine=LinkTrade
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::WorkerCrashed => {
                tracing::warn!(worker, attempt = ?e.attempt, reason, "worker crashed");
            }
            EventKind::RecoveryAttempted => {
                tracing::info!(worker, attempt = ?e.attempt, delay_ms = ?e.delay_ms, "recovery attempted");
            }
            EventKind::RecoverySucceeded => {
                tracing::info!(worker, attempt = ?e.attempt, "recovery succeeded");
            }
            EventKind::RecoveryFailed => {
                tracing::warn!(worker, attempt = ?e.attempt, reason, "recovery failed");
            }
            EventKind::RecoveryExhausted => {
                tracing::error!(worker, attempt = ?e.attempt, reason, "recovery exhausted");
            }
            EventKind::StabilityReset => {
                tracing::info!(worker, forgiven = ?e.attempt, "failures forgiven after stable run");
            }
            EventKind::RecoveryReset => tracing::info!(worker, "recovery state reset"),
            EventKind::WorkerRegistered => tracing::info!(worker, "worker registered"),
            EventKind::WorkerStarted => tracing::info!(worker, "worker started"),
            EventKind::WorkerExited => tracing::info!(worker, reason, "worker exited"),
            EventKind::WorkQueued
            | EventKind::WorkStarted
            | EventKind::WorkCompleted
            | EventKind::WorkCanceled
            | EventKind::WorkRequeued => {
                tracing::debug!(
                    kind = ?e.kind,
                    work_id = ?e.work_id,
                    submitter = ?e.submitter,
                    routine = ?e.routine,
                    "queue"
                );
            }
            EventKind::BatchCompleted => {
                tracing::debug!(submitter = ?e.submitter, items = ?e.attempt, "batch completed");
            }
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::AllStoppedWithin => tracing::info!("all workers stopped within grace"),
            EventKind::GraceExceeded => tracing::warn!("shutdown grace exceeded"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
