//! # Worker execution context.
//!
//! A [`WorkerContext`] is handed to the worker body on every start. It bundles
//! the run's cancellation token (a child of the fleet token), the pause switch
//! and the liveness signals the handle exposes to operators.
//!
//! ## Rules
//! - The body should check [`WorkerContext::is_cancelled`] (or await
//!   [`WorkerContext::cancelled`]) and exit promptly with `Ok(())` or
//!   `Err(WorkerError::Canceled)`.
//! - Between units of work the body calls [`WorkerContext::resume_point`]; it
//!   parks while the worker is paused.
//! - [`WorkerContext::touch`] and [`WorkerContext::set_connected`] feed
//!   `last_activity` / `is_connected` on the handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::select;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Activity and connection state shared between a handle and every run of its worker.
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    last_activity: Mutex<Option<Instant>>,
    connected: AtomicBool,
}

impl Liveness {
    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Some(Instant::now());
    }

    pub(crate) fn last_activity(&self) -> Option<Instant> {
        *self.last_activity.lock()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Per-run context of a worker body.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    name: Arc<str>,
    token: CancellationToken,
    paused: watch::Receiver<bool>,
    liveness: Arc<Liveness>,
}

impl WorkerContext {
    pub(crate) fn new(
        name: Arc<str>,
        token: CancellationToken,
        paused: watch::Receiver<bool>,
        liveness: Arc<Liveness>,
    ) -> Self {
        Self {
            name,
            token,
            paused,
            liveness,
        }
    }

    /// Detached context (never paused, own token). Handy in tests and for
    /// driving a worker body outside a fleet.
    pub fn detached(name: impl Into<Arc<str>>, token: CancellationToken) -> Self {
        let (_tx, paused) = watch::channel(false);
        Self::new(name.into(), token, paused, Arc::default())
    }

    /// Name of the worker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancellation token of this run.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the run has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the run is asked to stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// True while the worker is paused.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Waits until the worker is not paused.
    ///
    /// Returns `false` if the run was cancelled meanwhile.
    pub async fn resume_point(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let mut paused = self.paused.clone();
        select! {
            res = paused.wait_for(|p| !*p) => res.is_ok() || !self.token.is_cancelled(),
            _ = self.token.cancelled() => false,
        }
    }

    /// Records activity (a poll, a trade step, a heartbeat).
    pub fn touch(&self) {
        self.liveness.touch();
    }

    /// Records the remote connection state.
    pub fn set_connected(&self, connected: bool) {
        self.liveness.set_connected(connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resume_point_waits_while_paused() {
        let (tx, rx) = watch::channel(true);
        let ctx = WorkerContext::new("w".into(), CancellationToken::new(), rx, Arc::default());
        assert!(ctx.is_paused());

        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.resume_point().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tx.send_replace(false);
        assert!(waiter.await.expect("join"));
    }

    #[tokio::test]
    async fn resume_point_gives_up_on_cancel() {
        let (_tx, rx) = watch::channel(true);
        let token = CancellationToken::new();
        let ctx = WorkerContext::new("w".into(), token.clone(), rx, Arc::default());
        token.cancel();
        assert!(!ctx.resume_point().await);
    }

    #[test]
    fn liveness_tracks_activity_and_connection() {
        let ctx = WorkerContext::detached("w", CancellationToken::new());
        assert!(ctx.liveness.last_activity().is_none());
        ctx.touch();
        ctx.set_connected(true);
        assert!(ctx.liveness.last_activity().is_some());
        assert!(ctx.liveness.is_connected());
    }
}
