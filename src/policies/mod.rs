//! Recovery, backoff and fairness policies.
//!
//! This module groups the knobs that control **if/when** a crashed worker is
//! restarted, **how long** to wait between attempts, and **how far** favored
//! submitters may jump the queue.
//!
//! ## Contents
//! - [`RecoveryPolicy`] validated restart rules (+ [`RecoverySettings`] value surface)
//! - [`BackoffPolicy`] how delays evolve (first / factor / max)
//! - [`FairnessPolicy`] favored fast-lane bound (+ [`FairnessSettings`])
//!
//! ## Quick wiring
//! ```text
//! FleetConfig { recovery: RecoverySettings, queue: QueueSettings { fairness, .. } }
//!      └─► FleetBuilder::build() validates into:
//!           - RecoveryPolicy  → RecoverySupervisor
//!           - FairnessPolicy  → QueueRegistry → FairPriorityQueue::add
//! ```

mod backoff;
mod fairness;
mod recovery;

pub use backoff::BackoffPolicy;
pub use fairness::{FairnessPolicy, FairnessSettings};
pub use recovery::{RecoveryPolicy, RecoverySettings};
