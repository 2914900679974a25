use std::sync::Arc;
use std::time::Duration;

use fleetvisor::{
    AddResult, Event, EventKind, Fleet, FleetBuilder, FleetConfig, Legality, LegalityError,
    PriorityTier, RecoveryPhase, Routine, Subscribe, Submission, WorkRecord, WorkerContext,
    WorkerError, WorkerFn,
};
use parking_lot::Mutex;
use tokio::sync::Barrier;

struct Passthrough;

impl Legality<String> for Passthrough {
    type Request = String;

    fn generate_or_validate(&self, request: &String) -> Result<String, LegalityError> {
        Ok(request.clone())
    }
}

/// Keeps the recovery signals it sees.
#[derive(Default)]
struct RecoveryLog {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait::async_trait]
impl Subscribe for RecoveryLog {
    async fn on_event(&self, ev: &Event) {
        if ev.is_recovery() {
            self.kinds.lock().push(ev.kind);
        }
    }

    fn name(&self) -> &'static str {
        "recovery-log"
    }
}

fn fleet_with(subs: Vec<Arc<dyn Subscribe>>) -> Arc<Fleet<String>> {
    let mut cfg = FleetConfig {
        health_check_interval: Duration::from_secs(1),
        post_start_observation: Duration::from_secs(2),
        ..FleetConfig::default()
    };
    cfg.recovery.initial_recovery_delay_seconds = 1;
    cfg.recovery.max_recovery_delay_seconds = 4;
    FleetBuilder::new(cfg)
        .with_subscribers(subs)
        .build()
        .expect("valid config")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_submissions_from_one_submitter_admit_one() {
    for _ in 0..50 {
        let fleet = fleet_with(Vec::new());
        let barrier = Arc::new(Barrier::new(2));

        let joins: Vec<_> = [5001, 5002]
            .into_iter()
            .map(|id| {
                let fleet = Arc::clone(&fleet);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    let record = WorkRecord::new(id, 77, Routine::LinkTrade, format!("set-{id}"));
                    fleet.queues().add(record, false, false)
                })
            })
            .collect();

        let mut results = Vec::new();
        for j in joins {
            results.push(j.await.expect("join"));
        }
        let added = results.iter().filter(|r| r.is_added()).count();
        let duplicate = results
            .iter()
            .filter(|r| **r == AddResult::AlreadyInQueue)
            .count();
        assert_eq!((added, duplicate), (1, 1));
        assert_eq!(fleet.queues().len(), 1);

        fleet.shutdown().await.expect("shutdown");
    }
}

#[tokio::test(start_paused = true)]
async fn privileged_submission_bypasses_a_full_closed_queue() {
    let fleet = fleet_with(Vec::new());
    fleet.queues().set_open(false);

    let regular = fleet.submit(
        &Passthrough,
        &Submission::new(1, Routine::Dump),
        &"Snorlax".to_string(),
    );
    assert!(!regular.result.is_added());

    let sudo = fleet.submit(
        &Passthrough,
        &Submission::new(2, Routine::Dump).privileged(true),
        &"Mewtwo".to_string(),
    );
    assert_eq!(sudo.result, AddResult::Added);
    let waiting = fleet.queues().waiting(Routine::Dump);
    assert_eq!(waiting[0].record().tier, PriorityTier::TIER1);

    fleet.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_is_recovered_and_reported() {
    let log = Arc::new(RecoveryLog::default());
    let fleet = fleet_with(vec![log.clone() as Arc<dyn Subscribe>]);

    let crashed_once = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&crashed_once);
    let bot = WorkerFn::arc("bot-1", move |ctx: WorkerContext| {
        let flag = Arc::clone(&flag);
        async move {
            if !flag.swap(true, std::sync::atomic::Ordering::AcqRel) {
                return Err(WorkerError::disconnected("console unreachable"));
            }
            ctx.cancelled().await;
            Ok(())
        }
    });
    let handle = fleet.register(bot).await.expect("register");
    fleet.start_all().await.expect("start");

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(handle.is_running());
    assert_eq!(handle.runs(), 2);
    let st = fleet.recovery_state("bot-1").await.expect("state");
    assert_eq!(st.phase, RecoveryPhase::Healthy);
    assert_eq!(st.consecutive_failures, 1);
    assert_eq!(st.last_error.as_deref(), Some("connection lost: console unreachable"));

    fleet.shutdown().await.expect("shutdown");
    assert_eq!(
        *log.kinds.lock(),
        vec![
            EventKind::WorkerCrashed,
            EventKind::RecoveryAttempted,
            EventKind::RecoverySucceeded,
        ]
    );
}
