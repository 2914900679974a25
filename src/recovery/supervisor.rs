//! # RecoverySupervisor: crash detection and throttled restarts.
//!
//! One supervisor watches every worker of a fleet. It runs as a single loop
//! woken by a fixed-interval tick or by a crash signal, and splits each pass
//! into two phases:
//!
//! ```text
//! wake (tick | crash signal)
//!   │
//!   ├─► scan   (roster read, short)
//!   │     for each worker:
//!   │       running  ──► uptime ≥ min stable → consecutive_failures = 0 (StabilityReset)
//!   │       stopping / recovering → skip
//!   │       crashed  ──► 1. intentionally stopped (and not allowed) → skip
//!   │                    ── WorkerCrashed (once per outage)
//!   │                    disabled → report only, stop here
//!   │                    2. failures ≥ max attempts   → halt (RecoveryExhausted)
//!   │                    3. crashes in window ≥ max   → halt (RecoveryExhausted)
//!   │                    4. last attempt + backoff(failures) not elapsed → wait
//!   │                    5. claim is_recovering → candidate
//!   │
//!   └─► recover (one JoinSet task per candidate, optional semaphore)
//!         failures += 1, history.push(now), last attempt = now
//!         RecoveryAttempted
//!         sleep backoff(failures − 1)            (cancellable)
//!         start unless stopped since the scan    (a stop wins)
//!         sleep observation window               (cancellable)
//!         running ? RecoverySucceeded : RecoveryFailed
//!         is_recovering cleared on every exit path
//! ```
//!
//! ## Rules
//! - A halt (`AttemptsExhausted`, `CrashRateLimited`) is sticky: the worker is
//!   never attempted again until an operator reset.
//! - A recovery task that fails or panics is isolated by the `JoinSet`; the
//!   loop keeps scanning the other workers.
//! - Cancellation at any await point leaves the worker's run flag untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio::{pin, select};
use tokio_util::sync::CancellationToken;

use crate::core::{Member, WorkerRegistry};
use crate::events::{Bus, Event, EventKind};
use crate::policies::RecoveryPolicy;
use crate::recovery::record::{RecoveringGuard, RecoveryCounters};
use crate::recovery::{HaltReason, RecoveryPhase, RecoveryRecord, RecoveryState};

/// Timing knobs of the supervisor loop.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SupervisorParams {
    pub(crate) tick: Duration,
    pub(crate) observation: Duration,
    pub(crate) max_concurrent: Option<usize>,
}

/// A crashed worker that passed the eligibility checks.
struct Candidate {
    member: Member,
    stop_epoch: u64,
    _guard: RecoveringGuard,
}

/// Watches every worker of a fleet and restarts the crashed ones.
pub struct RecoverySupervisor {
    policy: RecoveryPolicy,
    params: SupervisorParams,
    enabled: AtomicBool,
    roster: Arc<WorkerRegistry>,
    bus: Bus,
    wake: Arc<Notify>,
    semaphore: Option<Arc<Semaphore>>,
}

impl RecoverySupervisor {
    pub(crate) fn new(
        policy: RecoveryPolicy,
        params: SupervisorParams,
        roster: Arc<WorkerRegistry>,
        bus: Bus,
        wake: Arc<Notify>,
    ) -> Arc<Self> {
        let semaphore = params.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));
        Arc::new(Self {
            policy,
            params,
            enabled: AtomicBool::new(true),
            roster,
            bus,
            wake,
            semaphore,
        })
    }

    /// The validated restart rules.
    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Resumes acting on crashes (history is kept).
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Stops acting on crashes without forgetting any history.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// True unless disabled by an operator or by `enable_recovery = false`.
    pub fn is_enabled(&self) -> bool {
        self.policy.enabled() && self.enabled.load(Ordering::Acquire)
    }

    /// Records an error for `worker` and triggers an immediate scan.
    ///
    /// Returns `false` for an unknown worker.
    pub async fn report_crash(&self, worker: &str, error: impl Into<String>) -> bool {
        let Some(member) = self.roster.get(worker).await else {
            return false;
        };
        member.record.record_error(error);
        self.wake.notify_one();
        true
    }

    /// Operator override: clears failures, history and halt state.
    pub async fn reset(&self, worker: &str) -> bool {
        let Some(member) = self.roster.get(worker).await else {
            return false;
        };
        member.record.reset();
        self.bus.publish(Event::new(EventKind::RecoveryReset).with_worker(worker));
        self.wake.notify_one();
        true
    }

    /// Snapshot of one worker.
    pub async fn state(&self, worker: &str) -> Option<RecoveryState> {
        let member = self.roster.get(worker).await?;
        Some(self.state_of(&member, Instant::now()))
    }

    /// Snapshots of every worker, sorted by name.
    pub async fn states(&self) -> Vec<RecoveryState> {
        let now = Instant::now();
        self.roster
            .snapshot()
            .await
            .iter()
            .map(|m| self.state_of(m, now))
            .collect()
    }

    fn state_of(&self, member: &Member, now: Instant) -> RecoveryState {
        let (handle, record) = (&member.handle, &member.record);
        let c = record.counters();

        let phase = if record.is_recovering() {
            RecoveryPhase::Recovering
        } else if handle.is_running() {
            RecoveryPhase::Healthy
        } else if let Some(reason) = c.halted {
            RecoveryPhase::Exhausted(reason)
        } else if record.is_intentionally_stopped() && !self.policy.recover_intentional_stops() {
            RecoveryPhase::Stopped
        } else {
            RecoveryPhase::Crashed
        };

        RecoveryState {
            worker: handle.name().to_string(),
            phase,
            consecutive_failures: c.consecutive_failures,
            crashes_in_window: c.history.count_within(now, self.policy.crash_window()),
            since_last_attempt: c.last_recovery_attempt.map(|t| now.saturating_duration_since(t)),
            uptime: handle.uptime(),
            last_error: c.last_error.clone(),
            intentionally_stopped: record.is_intentionally_stopped(),
            is_recovering: record.is_recovering(),
            halted: c.halted,
        }
    }

    /// Drives the loop until `token` is cancelled, then waits for in-flight
    /// recoveries to unwind.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = time::interval(self.params.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inflight = JoinSet::new();

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
                Some(res) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(err) = res {
                        tracing::error!(error = %err, "recovery task aborted");
                    }
                    continue;
                }
            }

            for candidate in self.scan().await {
                let me = Arc::clone(&self);
                let token = token.clone();
                inflight.spawn(async move { me.recover(candidate, token).await });
            }
        }

        while inflight.join_next().await.is_some() {}
    }

    /// Health pass over every worker; returns the ones to recover now.
    async fn scan(&self) -> Vec<Candidate> {
        let members = self.roster.snapshot().await;
        let now = Instant::now();
        let enabled = self.is_enabled();

        members
            .into_iter()
            .filter_map(|m| self.evaluate(m, now, enabled))
            .collect()
    }

    fn evaluate(&self, member: Member, now: Instant, enabled: bool) -> Option<Candidate> {
        let (handle, record) = (&member.handle, &member.record);
        let name = handle.name();

        if handle.is_running() {
            let mut c = record.counters();
            c.crash_reported = false;
            let stable = handle
                .uptime()
                .is_some_and(|up| up >= self.policy.minimum_stable_uptime());
            if stable && c.consecutive_failures > 0 {
                let forgiven = std::mem::take(&mut c.consecutive_failures);
                drop(c);
                tracing::debug!(worker = name, forgiven, "stable uptime reached");
                self.bus.publish(
                    Event::new(EventKind::StabilityReset)
                        .with_worker(name)
                        .with_attempt(forgiven),
                );
            }
            return None;
        }
        if handle.is_stopping() || record.is_recovering() {
            return None;
        }

        // 1. intentional stop
        if record.is_intentionally_stopped() && !self.policy.recover_intentional_stops() {
            return None;
        }

        let mut c = record.counters();
        if !c.crash_reported {
            c.crash_reported = true;
            if let Some(err) = handle.last_error() {
                c.last_error = Some(err.to_string());
            }
            let mut ev = Event::new(EventKind::WorkerCrashed)
                .with_worker(name)
                .with_attempt(c.consecutive_failures.saturating_add(1));
            if let Some(err) = &c.last_error {
                ev = ev.with_reason(err.as_str());
            }
            self.bus.publish(ev);
        }
        if !enabled || c.halted.is_some() {
            return None;
        }

        // 2. attempts exhausted
        if c.consecutive_failures >= self.policy.max_attempts() {
            self.halt(name, &mut c, HaltReason::AttemptsExhausted);
            return None;
        }

        // 3. crash rate
        let crashes = c.history.prune(now, self.policy.crash_window());
        if crashes >= self.policy.max_crashes_in_window() as usize {
            self.halt(name, &mut c, HaltReason::CrashRateLimited);
            return None;
        }

        // 4. backoff since the last attempt
        if let Some(last) = c.last_recovery_attempt {
            let wait = self.policy.backoff_delay(c.consecutive_failures);
            if now.saturating_duration_since(last) < wait {
                return None;
            }
        }
        drop(c);

        // 5. recover
        let guard = record.begin_recovery()?;
        Some(Candidate {
            stop_epoch: handle.stop_epoch(),
            member,
            _guard: guard,
        })
    }

    fn halt(&self, name: &str, c: &mut RecoveryCounters, reason: HaltReason) {
        c.halted = Some(reason);
        if std::mem::replace(&mut c.halt_reported, true) {
            return;
        }
        tracing::warn!(worker = name, reason = reason.as_label(), "automatic recovery halted");
        self.bus.publish(
            Event::new(EventKind::RecoveryExhausted)
                .with_worker(name)
                .with_attempt(c.consecutive_failures)
                .with_reason(reason.as_label()),
        );
    }

    /// One recovery sequence. The candidate's guard clears `is_recovering`
    /// whichever way this returns.
    async fn recover(&self, candidate: Candidate, token: CancellationToken) {
        let Candidate {
            member, stop_epoch, ..
        } = &candidate;
        let (handle, record) = (&member.handle, &member.record);
        let name = handle.name();

        let _permit = match &self.semaphore {
            Some(sem) => {
                let permit = Arc::clone(sem).acquire_owned();
                pin!(permit);
                select! {
                    res = &mut permit => match res {
                        Ok(p) => Some(p),
                        Err(_closed) => return,
                    },
                    _ = token.cancelled() => return,
                }
            }
            None => None,
        };

        let attempt = {
            let mut c = record.counters();
            let now = Instant::now();
            c.consecutive_failures = c.consecutive_failures.saturating_add(1);
            c.history.push(now);
            c.last_recovery_attempt = Some(now);
            c.consecutive_failures
        };
        let delay = self.policy.backoff_delay(attempt - 1);
        self.bus.publish(
            Event::new(EventKind::RecoveryAttempted)
                .with_worker(name)
                .with_attempt(attempt)
                .with_delay(delay),
        );

        if !sleep_or_cancel(delay, &token).await {
            return;
        }

        match handle.start_unless_stopped_since(*stop_epoch) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(worker = name, attempt, "stop requested during recovery");
                return;
            }
            Err(err) => {
                tracing::debug!(worker = name, attempt, error = %err, "restart refused");
                if !handle.is_running() {
                    self.fail(name, record, attempt, err.to_string());
                    return;
                }
            }
        }

        if !sleep_or_cancel(self.params.observation, &token).await {
            return;
        }

        if handle.is_running() {
            record.counters().crash_reported = false;
            self.bus.publish(
                Event::new(EventKind::RecoverySucceeded)
                    .with_worker(name)
                    .with_attempt(attempt),
            );
        } else {
            let reason = handle
                .last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "worker not running after restart".to_string());
            self.fail(name, record, attempt, reason);
        }
    }

    fn fail(&self, name: &str, record: &RecoveryRecord, attempt: u32, reason: String) {
        {
            let mut c = record.counters();
            c.last_error = Some(reason.clone());
            c.crash_reported = false;
        }
        self.bus.publish(
            Event::new(EventKind::RecoveryFailed)
                .with_worker(name)
                .with_attempt(attempt)
                .with_reason(reason),
        );
        self.wake.notify_one();
    }
}

/// Sleeps for `d`; returns `false` if `token` fired first.
async fn sleep_or_cancel(d: Duration, token: &CancellationToken) -> bool {
    select! {
        _ = time::sleep(d) => true,
        _ = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use crate::error::WorkerError;
    use crate::policies::RecoverySettings;
    use crate::workers::{WorkerContext, WorkerFn, WorkerHandle, WorkerRef};

    struct Rig {
        sup: Arc<RecoverySupervisor>,
        roster: Arc<WorkerRegistry>,
        bus: Bus,
        wake: Arc<Notify>,
        root: CancellationToken,
    }

    impl Rig {
        fn new(settings: RecoverySettings) -> Self {
            let policy = RecoveryPolicy::new(&settings).expect("valid settings");
            let params = SupervisorParams {
                tick: Duration::from_secs(1),
                observation: Duration::from_secs(2),
                max_concurrent: None,
            };
            let roster = Arc::new(WorkerRegistry::default());
            let bus = Bus::new(256);
            let wake = Arc::new(Notify::new());
            let sup = RecoverySupervisor::new(
                policy,
                params,
                Arc::clone(&roster),
                bus.clone(),
                Arc::clone(&wake),
            );
            Self {
                sup,
                roster,
                bus,
                wake,
                root: CancellationToken::new(),
            }
        }

        async fn add(&self, worker: WorkerRef) -> Member {
            let handle = WorkerHandle::new(
                worker,
                self.root.clone(),
                self.bus.clone(),
                Arc::clone(&self.wake),
            );
            self.roster.insert(Arc::new(handle)).await.expect("unique")
        }

        fn spawn(&self) -> tokio::task::JoinHandle<()> {
            tokio::spawn(Arc::clone(&self.sup).run(self.root.clone()))
        }
    }

    fn settings() -> RecoverySettings {
        RecoverySettings {
            initial_recovery_delay_seconds: 1,
            max_recovery_delay_seconds: 8,
            ..RecoverySettings::default()
        }
    }

    fn always_failing() -> WorkerRef {
        WorkerFn::arc("flaky", |_ctx: WorkerContext| async {
            Err::<(), _>(WorkerError::disconnected("console unreachable"))
        })
    }

    fn idle(name: &'static str) -> WorkerRef {
        WorkerFn::arc(name, |ctx: WorkerContext| async move {
            ctx.cancelled().await;
            Ok::<(), WorkerError>(())
        })
    }

    /// Fails on the first run, then behaves.
    fn fails_once() -> WorkerRef {
        let runs = Arc::new(AtomicU32::new(0));
        WorkerFn::arc("fails-once", move |ctx: WorkerContext| {
            let first = runs.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    return Err(WorkerError::fail("boot failed"));
                }
                ctx.cancelled().await;
                Ok(())
            }
        })
    }

    async fn secs(s: f64) {
        time::sleep(Duration::from_secs_f64(s)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_sticky_until_reset() {
        let rig = Rig::new(settings());
        let m = rig.add(always_failing()).await;
        let run = rig.spawn();
        m.handle.start().expect("start");

        secs(60.0).await;
        let st = rig.sup.state("flaky").await.expect("registered");
        assert_eq!(st.consecutive_failures, 3);
        assert_eq!(st.halted, Some(HaltReason::AttemptsExhausted));
        assert_eq!(st.phase, RecoveryPhase::Exhausted(HaltReason::AttemptsExhausted));
        assert_eq!(m.handle.runs(), 4);
        assert_eq!(st.last_error.as_deref(), Some("connection lost: console unreachable"));

        // Far more time than any backoff: still nothing.
        secs(3600.0 * 5.0).await;
        assert_eq!(m.handle.runs(), 4);
        assert!(rig.sup.state("flaky").await.expect("registered").is_halted());

        assert!(rig.sup.reset("flaky").await);
        secs(5.0).await;
        assert!(m.handle.runs() > 4);

        rig.root.cancel();
        run.await.expect("supervisor exits");
    }

    #[tokio::test(start_paused = true)]
    async fn crash_rate_limit_halts() {
        let rig = Rig::new(RecoverySettings {
            max_recovery_attempts: 10,
            max_crashes_in_window: 2,
            ..settings()
        });
        let m = rig.add(always_failing()).await;
        let _run = rig.spawn();
        m.handle.start().expect("start");

        secs(120.0).await;
        let st = rig.sup.state("flaky").await.expect("registered");
        assert_eq!(st.halted, Some(HaltReason::CrashRateLimited));
        assert_eq!(st.crashes_in_window, 2);
        assert_eq!(m.handle.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_uptime_forgives_failures() {
        let rig = Rig::new(settings());
        let m = rig.add(idle("steady")).await;
        m.record.counters().consecutive_failures = 3;
        let mut rx = rig.bus.subscribe();
        let _run = rig.spawn();
        m.handle.start().expect("start");

        secs(599.5).await;
        assert_eq!(m.record.counters().consecutive_failures, 3);

        secs(1.0).await;
        assert_eq!(m.record.counters().consecutive_failures, 0);
        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::StabilityReset));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_recovery_reports_and_clears_flag() {
        let rig = Rig::new(settings());
        let m = rig.add(fails_once()).await;
        let mut rx = rig.bus.subscribe();
        let _run = rig.spawn();
        assert!(!m.record.is_recovering());
        m.handle.start().expect("start");

        secs(10.0).await;
        let st = rig.sup.state("fails-once").await.expect("registered");
        assert_eq!(st.phase, RecoveryPhase::Healthy);
        assert_eq!(st.consecutive_failures, 1);
        assert!(!st.is_recovering);

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .filter(|k| {
                matches!(
                    k,
                    EventKind::WorkerCrashed
                        | EventKind::RecoveryAttempted
                        | EventKind::RecoverySucceeded
                        | EventKind::RecoveryFailed
                )
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::WorkerCrashed,
                EventKind::RecoveryAttempted,
                EventKind::RecoverySucceeded
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_attempt_clears_flag_and_keeps_run_state() {
        let rig = Rig::new(settings());
        let m = rig.add(always_failing()).await;
        let run = rig.spawn();
        m.handle.start().expect("start");

        secs(0.5).await;
        assert!(m.record.is_recovering(), "inside the first backoff sleep");

        rig.root.cancel();
        run.await.expect("supervisor exits");
        assert!(!m.record.is_recovering());
        assert!(!m.handle.is_running());
        assert_eq!(m.handle.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_recovery_wins() {
        let rig = Rig::new(settings());
        let m = rig.add(always_failing()).await;
        let _run = rig.spawn();
        m.handle.start().expect("start");

        secs(0.5).await;
        assert!(m.record.is_recovering());
        m.record.mark_intentionally_stopped();
        m.handle.stop().await;

        secs(60.0).await;
        assert_eq!(m.handle.runs(), 1);
        assert!(!m.handle.is_running());
        assert!(!m.record.is_recovering());
        let st = rig.sup.state("flaky").await.expect("registered");
        assert_eq!(st.phase, RecoveryPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn intentional_stops_recovered_when_allowed() {
        let rig = Rig::new(RecoverySettings {
            recover_intentional_stops: true,
            ..settings()
        });
        let m = rig.add(idle("ops")).await;
        let _run = rig.spawn();
        m.handle.start().expect("start");

        m.record.mark_intentionally_stopped();
        m.handle.stop().await;
        secs(10.0).await;
        assert!(m.handle.is_running());
        assert_eq!(m.handle.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_supervisor_only_watches() {
        let rig = Rig::new(settings());
        let m = rig.add(always_failing()).await;
        rig.sup.disable();
        let mut rx = rig.bus.subscribe();
        let _run = rig.spawn();
        m.handle.start().expect("start");

        secs(60.0).await;
        assert_eq!(m.handle.runs(), 1);
        assert_eq!(m.record.counters().consecutive_failures, 0);
        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        let crashed = kinds.iter().filter(|k| **k == EventKind::WorkerCrashed).count();
        assert_eq!(crashed, 1);
        assert!(!kinds.contains(&EventKind::RecoveryAttempted));

        rig.sup.enable();
        secs(2.0).await;
        assert_eq!(m.handle.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn report_crash_records_error() {
        let rig = Rig::new(settings());
        let _m = rig.add(idle("reporter")).await;
        assert!(rig.sup.report_crash("reporter", "memory read failed").await);
        assert!(!rig.sup.report_crash("ghost", "x").await);

        let st = rig.sup.state("reporter").await.expect("registered");
        assert_eq!(st.last_error.as_deref(), Some("memory read failed"));
    }
}
