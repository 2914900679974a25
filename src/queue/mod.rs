//! Work queues: records, fair ordering, batches and the registry.
//!
//! ## Contents
//! - [`WorkRecord`], [`QueuedWork`], [`PriorityTier`], [`Routine`] the data model
//! - [`FairPriorityQueue`] tiered queue with a bounded favored fast lane
//! - [`QueueRegistry`] admission, membership, positions (one lock)
//! - [`Claim`] exactly-once release of a dequeued record
//! - [`BatchGroup`] / [`BatchProgress`] multi-item requests
//! - [`Validate`] pre-enqueue checks
//! - [`PositionResult`] caller-facing position/ETA

mod batch;
mod claim;
mod fair;
mod position;
mod record;
mod registry;
mod validator;

pub use batch::{BatchGroup, BatchProgress};
pub use claim::Claim;
pub use fair::FairPriorityQueue;
pub use position::PositionResult;
pub use record::{
    BatchGroupId, BatchInfo, PriorityTier, QueuedWork, Routine, SubmitterId, WorkId, WorkRecord,
};
pub use registry::{AddResult, ClearResult, QueueRegistry, RejectReason, RoutineSummary};
pub use validator::Validate;
