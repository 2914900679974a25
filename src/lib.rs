//! # fleetvisor
//!
//! **Fleetvisor** supervises a fleet of long-running trade automation workers
//! and feeds them from fair, tiered priority queues.
//!
//! It provides two cooperating subsystems behind one composition root:
//! - a **recovery supervisor** that detects crashed workers and restarts them
//!   with exponential backoff, a crash-rate limit and sticky halts;
//! - a **queue registry** that admits trade requests (single or batch), orders
//!   them by tier with a bounded fast lane for favored submitters, and hands
//!   them to workers exactly once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   chat command / operator
//!            │
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Fleet (composition root)                                         │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - WorkerRegistry (name → WorkerHandle + RecoveryRecord)          │
//! │  - RecoverySupervisor (tick | crash signal)                       │
//! │  - QueueRegistry (one queue per Routine, one lock)                │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//!   │ WorkerHandle │   │ WorkerHandle │   │ WorkerHandle │     │
//!   │ QueueWorker  │   │ QueueWorker  │   │  WorkerFn    │     │
//!   └┬─────────────┘   └┬─────────────┘   └┬─────────────┘     │
//!    │ next(routine)    │ next(routine)    │                   │
//!    │ Claim ──► Execute│ ...              │ WorkerExited      │
//!    ▼                  ▼                  ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                 (capacity: FleetConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │       (in Fleet)       │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                    LogWriter  chat bridge  metrics
//! ```
//!
//! ### Recovery
//! ```text
//! worker exits unexpectedly ──► crash signal ──► RecoverySupervisor::scan
//!   ├─ intentionally stopped?          → leave alone
//!   ├─ failures ≥ max attempts          → halt (sticky until reset)
//!   ├─ crashes in window ≥ max          → halt (sticky until reset)
//!   ├─ backoff since last attempt?      → wait for a later tick
//!   └─ recover: sleep(backoff) ─► start (a stop wins) ─► observe ─► succeeded | failed
//! ```
//!
//! ### Queueing
//! ```text
//! submit ─► Legality (once per candidate) ─► QueueRegistry::add / add_batch
//!             closed? member? full? validators? ─► FairPriorityQueue (tier, favored lane)
//! QueueWorker ─► next(routine) ─► Claim ─► complete | cancel | requeue (tier ≤ TIER2)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Fleet**         | Register, start, stop, pause workers; submit work; shut down. | [`Fleet`], [`FleetBuilder`]                 |
//! | **Workers**       | Define worker bodies as closures or queue executors.          | [`Worker`], [`WorkerFn`], [`Execute`]       |
//! | **Recovery**      | Crash detection, backoff, halts, operator reset.              | [`RecoverySupervisor`], [`RecoveryState`]   |
//! | **Queues**        | Tiered fair queues, batches, positions.                       | [`QueueRegistry`], [`Claim`]                |
//! | **Policies**      | Validated recovery, backoff and fairness rules.               | [`RecoveryPolicy`], [`FairnessPolicy`]      |
//! | **Subscriber API**| Hook into fleet events (logging, chat relays, metrics).       | [`Subscribe`]                               |
//! | **Errors**        | Typed errors for configuration, workers and the fleet.        | [`ConfigError`], [`WorkerError`]            |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fleetvisor::{
//!     Fleet, FleetBuilder, FleetConfig, Legality, LegalityError, Routine, Submission, WorkerFn,
//! };
//!
//! struct Accept;
//!
//! impl Legality<String> for Accept {
//!     type Request = String;
//!     fn generate_or_validate(&self, request: &String) -> Result<String, LegalityError> {
//!         Ok(request.clone())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fleet: Arc<Fleet<String>> = FleetBuilder::new(FleetConfig::default()).build()?;
//!
//!     let idle = WorkerFn::arc("bot-1", |ctx: fleetvisor::WorkerContext| async move {
//!         ctx.cancelled().await;
//!         Ok::<_, fleetvisor::WorkerError>(())
//!     });
//!     fleet.register(idle).await?;
//!     fleet.start_all().await?;
//!
//!     let receipt = fleet.submit(&Accept, &Submission::new(42, Routine::LinkTrade), &"Pikachu".to_string());
//!     assert!(receipt.result.is_added());
//!
//!     fleet.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod queue;
mod recovery;
mod subscribers;
mod workers;

// ---- Public re-exports ----

pub use core::{Fleet, FleetBuilder, FleetConfig, Legality, QueueSettings, Receipt, Submission};
pub use error::{ConfigError, FleetError, LegalityError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, FairnessPolicy, FairnessSettings, RecoveryPolicy, RecoverySettings};
pub use queue::{
    AddResult, BatchGroup, BatchGroupId, BatchInfo, BatchProgress, Claim, ClearResult,
    FairPriorityQueue, PositionResult, PriorityTier, QueueRegistry, QueuedWork, RejectReason,
    Routine, RoutineSummary, SubmitterId, Validate, WorkId, WorkRecord,
};
pub use recovery::{HaltReason, RecoveryPhase, RecoveryRecord, RecoveryState, RecoverySupervisor};
pub use subscribers::{Subscribe, SubscriberSet};
pub use workers::{
    BoxWorkerFuture, Execute, Outcome, QueueWorker, Worker, WorkerContext, WorkerFn, WorkerHandle,
    WorkerRef,
};

// Optional: expose the built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
