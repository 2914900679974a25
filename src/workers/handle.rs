//! # WorkerHandle: control surface of one fleet member.
//!
//! The handle owns the lifecycle of a [`Worker`] body:
//!
//! ```text
//! start() ──► child token of the fleet token
//!          ├─► worker.spawn(ctx) on a tokio task (panics caught)
//!          └─► publish WorkerStarted
//!
//! body returns ──► running = false
//!               ├─ token cancelled (stop/shutdown) → WorkerExited (graceful)
//!               └─ otherwise                       → WorkerExited + last_error,
//!                                                    crash signal notified
//!
//! stop() ──► stop_epoch += 1, cancel token, await body
//! ```
//!
//! ## Rules
//! - A stop always wins over a concurrent restart: the recovery supervisor
//!   captures [`stop_epoch`](WorkerHandle::stop_epoch) before its backoff sleep
//!   and restarts through [`start_unless_stopped_since`](WorkerHandle::start_unless_stopped_since),
//!   which refuses once a stop happened in between.
//! - Pausing never cancels the body; it parks at its next
//!   [`resume_point`](crate::WorkerContext::resume_point).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;
use crate::workers::context::Liveness;
use crate::workers::{WorkerContext, WorkerRef};

/// State of the current run, guarded by one mutex so that start and stop
/// observe each other.
#[derive(Default)]
struct RunSlot {
    stop_epoch: u64,
    runs: u32,
    token: Option<CancellationToken>,
    join: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

/// Control and observation handle of one worker.
pub struct WorkerHandle {
    name: Arc<str>,
    worker: WorkerRef,
    root: CancellationToken,
    bus: Bus,
    crash_signal: Arc<Notify>,
    slot: Mutex<RunSlot>,
    running: Arc<AtomicBool>,
    stopping: AtomicBool,
    paused: watch::Sender<bool>,
    liveness: Arc<Liveness>,
    last_error: Arc<Mutex<Option<WorkerError>>>,
}

impl WorkerHandle {
    /// Creates a stopped handle.
    ///
    /// Runs are children of `root`; unexpected exits notify `crash_signal`.
    pub fn new(
        worker: WorkerRef,
        root: CancellationToken,
        bus: Bus,
        crash_signal: Arc<Notify>,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            name: Arc::from(worker.name()),
            worker,
            root,
            bus,
            crash_signal,
            slot: Mutex::new(RunSlot::default()),
            running: Arc::new(AtomicBool::new(false)),
            stopping: AtomicBool::new(false),
            paused,
            liveness: Arc::default(),
            last_error: Arc::default(),
        }
    }

    /// Worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts the body.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut slot = self.slot.lock();
        self.start_locked(&mut slot)
    }

    /// Starts the body unless [`stop`](Self::stop) was called after `epoch`
    /// was observed. Returns `Ok(false)` when the stop wins.
    pub fn start_unless_stopped_since(&self, epoch: u64) -> Result<bool, WorkerError> {
        let mut slot = self.slot.lock();
        if slot.stop_epoch != epoch {
            return Ok(false);
        }
        self.start_locked(&mut slot).map(|()| true)
    }

    fn start_locked(&self, slot: &mut RunSlot) -> Result<(), WorkerError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(WorkerError::AlreadyRunning);
        }
        slot.runs = slot.runs.saturating_add(1);

        let token = self.root.child_token();
        let ctx = WorkerContext::new(
            Arc::clone(&self.name),
            token.clone(),
            self.paused.subscribe(),
            Arc::clone(&self.liveness),
        );
        let fut = self.worker.spawn(ctx);

        let exit = RunExit {
            name: Arc::clone(&self.name),
            token: token.clone(),
            running: Arc::clone(&self.running),
            last_error: Arc::clone(&self.last_error),
            crash_signal: Arc::clone(&self.crash_signal),
            bus: self.bus.clone(),
        };
        let join = tokio::spawn(async move {
            let res = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(res) => res,
                Err(panic) => Err(WorkerError::Panicked {
                    info: panic_message(panic.as_ref()),
                }),
            };
            exit.settle(res);
        });

        slot.token = Some(token);
        slot.join = Some(join);
        slot.started_at = Some(Instant::now());
        self.liveness.touch();

        self.bus.publish(
            Event::new(EventKind::WorkerStarted)
                .with_worker(Arc::clone(&self.name))
                .with_attempt(slot.runs),
        );
        Ok(())
    }

    /// Stops the body and waits for it to return.
    ///
    /// Idempotent; a no-op on a handle that never started.
    pub async fn stop(&self) {
        let (token, join) = {
            let mut slot = self.slot.lock();
            slot.stop_epoch = slot.stop_epoch.wrapping_add(1);
            (slot.token.take(), slot.join.take())
        };
        let Some(join) = join else { return };

        let _stopping = StoppingGuard::set(&self.stopping);
        if let Some(token) = token {
            token.cancel();
        }
        let _ = join.await;
    }

    /// Parks the body at its next resume point.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Lets a paused body continue.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// True while the body is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True while a stop is waiting for the body.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Last time the body (or a start) reported activity.
    pub fn last_activity(&self) -> Option<Instant> {
        self.liveness.last_activity()
    }

    /// Remote connection state last reported by the body.
    pub fn is_connected(&self) -> bool {
        self.liveness.is_connected()
    }

    /// Start time of the current (or last) run.
    pub fn started_at(&self) -> Option<Instant> {
        self.slot.lock().started_at
    }

    /// Time since the current run started; `None` while not running.
    pub fn uptime(&self) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        self.started_at().map(|t| t.elapsed())
    }

    /// Number of stops so far.
    pub fn stop_epoch(&self) -> u64 {
        self.slot.lock().stop_epoch
    }

    /// Number of starts so far.
    pub fn runs(&self) -> u32 {
        self.slot.lock().runs
    }

    /// Error of the last unexpected exit.
    pub fn last_error(&self) -> Option<WorkerError> {
        self.last_error.lock().clone()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Everything the spawned task needs to report the end of a run.
struct RunExit {
    name: Arc<str>,
    token: CancellationToken,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<WorkerError>>>,
    crash_signal: Arc<Notify>,
    bus: Bus,
}

impl RunExit {
    fn settle(self, res: Result<(), WorkerError>) {
        let stopped = self.token.is_cancelled();
        let error = match res {
            Ok(()) | Err(WorkerError::Canceled) if stopped => None,
            Ok(()) => Some(WorkerError::fail("worker body returned")),
            Err(e) => Some(e),
        };

        let mut ev = Event::new(EventKind::WorkerExited).with_worker(Arc::clone(&self.name));
        if let Some(e) = &error {
            ev = ev.with_reason(e.to_string());
            *self.last_error.lock() = Some(e.clone());
        }
        self.running.store(false, Ordering::Release);
        self.bus.publish(ev);

        if !stopped {
            self.crash_signal.notify_one();
        }
    }
}

struct StoppingGuard<'a>(&'a AtomicBool);

impl<'a> StoppingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::WorkerFn;

    fn handle(worker: WorkerRef) -> (WorkerHandle, Arc<Notify>) {
        let signal = Arc::new(Notify::new());
        let h = WorkerHandle::new(worker, CancellationToken::new(), Bus::new(16), Arc::clone(&signal));
        (h, signal)
    }

    fn idle_worker() -> WorkerRef {
        WorkerFn::arc("idle", |ctx: WorkerContext| async move {
            ctx.cancelled().await;
            Err::<(), _>(WorkerError::Canceled)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_stop_is_graceful() {
        let (h, _) = handle(idle_worker());
        h.start().expect("start");
        assert!(h.is_running());
        assert_eq!(h.start(), Err(WorkerError::AlreadyRunning));

        h.stop().await;
        assert!(!h.is_running());
        assert!(!h.is_stopping());
        assert!(h.last_error().is_none());
        assert_eq!(h.stop_epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_recorded_and_signalled() {
        let w = WorkerFn::arc("flaky", |_ctx: WorkerContext| async move {
            Err::<(), _>(WorkerError::disconnected("socket closed"))
        });
        let (h, signal) = handle(w);
        h.start().expect("start");
        signal.notified().await;

        assert!(!h.is_running());
        assert_eq!(h.last_error(), Some(WorkerError::disconnected("socket closed")));
    }

    #[tokio::test(start_paused = true)]
    async fn panic_is_captured() {
        let w = WorkerFn::arc("boom", |_ctx: WorkerContext| async move {
            if true {
                panic!("kaboom");
            }
            Ok::<(), WorkerError>(())
        });
        let (h, signal) = handle(w);
        h.start().expect("start");
        signal.notified().await;

        match h.last_error() {
            Some(WorkerError::Panicked { info }) => assert!(info.contains("kaboom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wins_over_pending_restart() {
        let (h, _) = handle(idle_worker());
        let epoch = h.stop_epoch();
        h.stop().await;
        assert_eq!(h.start_unless_stopped_since(epoch), Ok(false));
        assert!(!h.is_running());

        let epoch = h.stop_epoch();
        assert_eq!(h.start_unless_stopped_since(epoch), Ok(true));
        assert!(h.is_running());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_parks_the_body() {
        let steps = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let w = WorkerFn::arc("stepper", {
            let steps = Arc::clone(&steps);
            move |ctx: WorkerContext| {
                let steps = Arc::clone(&steps);
                async move {
                    while ctx.resume_point().await {
                        steps.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok::<(), WorkerError>(())
                }
            }
        });
        let (h, _) = handle(w);
        h.start().expect("start");
        tokio::time::sleep(Duration::from_millis(55)).await;

        h.pause();
        tokio::time::sleep(Duration::from_millis(15)).await;
        let frozen = steps.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(steps.load(Ordering::SeqCst), frozen);
        assert!(h.is_running());

        h.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(steps.load(Ordering::SeqCst) > frozen);
        h.stop().await;
        assert!(h.last_error().is_none());
    }
}
