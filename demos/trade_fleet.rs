//! # Demo: trade_fleet
//!
//! Two trade bots serve the link-trade queue; one of them drops its console
//! connection on the first request and is brought back by the recovery
//! supervisor. A third "dump" bot sits idle until shutdown.
//!
//! ## Flow
//! ```text
//! submit ──► ShowdownParser (legality) ──► QueueRegistry
//!                                            ├─► bot-a (QueueWorker) ──► TradeSession::execute
//!                                            └─► bot-b (QueueWorker) ──► crash ──► requeue (TIER2)
//!                                                                           └─► RecoverySupervisor restarts bot-b
//! Bus ──► LogWriter (tracing)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example trade_fleet
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fleetvisor::{
    Execute, FleetBuilder, FleetConfig, Legality, LegalityError, LogWriter, Outcome, Routine,
    Subscribe, Submission, WorkRecord, WorkerContext, WorkerError,
};
use tracing_subscriber::EnvFilter;

/// Parses a one-line showdown set ("Species @ Item").
struct ShowdownParser;

impl Legality<String> for ShowdownParser {
    type Request = String;

    fn generate_or_validate(&self, request: &String) -> Result<String, LegalityError> {
        let species = request.split('@').next().unwrap_or_default().trim();
        if species.is_empty() {
            return Err(LegalityError::new("no species in set"));
        }
        Ok(request.trim().to_string())
    }
}

/// Pretends to drive a console trade session.
struct TradeSession {
    flaky: AtomicBool,
}

#[async_trait::async_trait]
impl Execute<String> for TradeSession {
    async fn execute(&self, record: &WorkRecord<String>, ctx: &WorkerContext) -> Outcome<String> {
        if self.flaky.swap(false, Ordering::AcqRel) {
            ctx.set_connected(false);
            return Outcome::Failed(WorkerError::disconnected("console unreachable"));
        }
        ctx.set_connected(true);
        tokio::select! {
            _ = ctx.cancelled() => Outcome::Canceled,
            _ = tokio::time::sleep(Duration::from_millis(300)) => {
                tracing::info!(worker = ctx.name(), work_id = record.id, set = %record.payload, "traded");
                Outcome::Completed(record.payload.clone())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = FleetConfig {
        health_check_interval: Duration::from_millis(500),
        post_start_observation: Duration::from_millis(500),
        grace: Duration::from_secs(3),
        ..FleetConfig::default()
    };
    cfg.recovery.initial_recovery_delay_seconds = 1;
    cfg.queue.max_queue_count = 30;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let fleet = FleetBuilder::<String>::new(cfg).with_subscribers(subs).build()?;

    fleet
        .register_queue_worker(
            "bot-a",
            Routine::LinkTrade,
            Arc::new(TradeSession { flaky: AtomicBool::new(false) }),
        )
        .await?;
    fleet
        .register_queue_worker(
            "bot-b",
            Routine::LinkTrade,
            Arc::new(TradeSession { flaky: AtomicBool::new(true) }),
        )
        .await?;
    fleet
        .register_queue_worker(
            "bot-dump",
            Routine::Dump,
            Arc::new(TradeSession { flaky: AtomicBool::new(false) }),
        )
        .await?;
    fleet.start_all().await?;

    let sets = [
        (101, "Pikachu @ Light Ball", false),
        (102, "Garchomp @ Choice Scarf", true),
        (103, "Ferrothorn @ Leftovers", false),
        (104, " @ Nothing", false),
    ];
    for (submitter, set, favored) in sets {
        let sub = Submission::new(submitter, Routine::LinkTrade).favored(favored);
        let receipt = fleet.submit(&ShowdownParser, &sub, &set.to_string());
        tracing::info!(submitter, result = ?receipt.result, "submitted");
        let position = receipt
            .first_id()
            .and_then(|id| fleet.queues().check_position(submitter, id));
        if let Some(pos) = position {
            tracing::info!(submitter, "{}", pos.describe(Duration::from_secs(20)));
        }
    }

    let batch = ["Mew @ Lum Berry".to_string(), "Celebi @ Leftovers".to_string()];
    let receipt = fleet.submit_batch(&ShowdownParser, &Submission::new(105, Routine::LinkTrade), &batch);
    tracing::info!(result = ?receipt.result, group = ?receipt.group, "batch submitted");

    tokio::time::sleep(Duration::from_secs(4)).await;
    for st in fleet.recovery_states().await {
        tracing::info!(
            worker = %st.worker,
            phase = st.phase.as_label(),
            failures = st.consecutive_failures,
            "recovery state"
        );
    }

    fleet.shutdown().await?;
    Ok(())
}
