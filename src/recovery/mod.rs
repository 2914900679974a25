//! Crash recovery: per-worker records, the supervisor loop and snapshots.
//!
//! ## Contents
//! - [`RecoverySupervisor`] detects crashes and restarts workers with backoff
//! - [`RecoveryRecord`] per-worker counters and caller flags
//! - [`RecoveryState`] / [`RecoveryPhase`] read-only operator view
//! - [`HaltReason`] why automatic recovery gave up

mod record;
mod state;
mod supervisor;

pub use record::{HaltReason, RecoveryRecord};
pub use state::{RecoveryPhase, RecoveryState};
pub(crate) use supervisor::SupervisorParams;
pub use supervisor::RecoverySupervisor;
