//! # Read-only recovery snapshots for operators.

use std::time::Duration;

use crate::recovery::HaltReason;

/// Coarse state of a worker as seen by the recovery supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryPhase {
    /// Running.
    Healthy,
    /// Not running; eligible for recovery.
    Crashed,
    /// A recovery sequence is in flight.
    Recovering,
    /// Not running and halted until an operator reset.
    Exhausted(HaltReason),
    /// Stopped on purpose; left alone.
    Stopped,
}

impl RecoveryPhase {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RecoveryPhase::Healthy => "healthy",
            RecoveryPhase::Crashed => "crashed",
            RecoveryPhase::Recovering => "recovering",
            RecoveryPhase::Exhausted(_) => "exhausted",
            RecoveryPhase::Stopped => "stopped",
        }
    }
}

/// Point-in-time view of one worker's recovery record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryState {
    /// Worker name.
    pub worker: String,
    /// Derived phase.
    pub phase: RecoveryPhase,
    /// Failed recoveries since the last stable run or reset.
    pub consecutive_failures: u32,
    /// Crashes recorded inside the current crash window.
    pub crashes_in_window: usize,
    /// Time since the last recovery attempt.
    pub since_last_attempt: Option<Duration>,
    /// Uptime of the current run.
    pub uptime: Option<Duration>,
    /// Last error reported for this worker.
    pub last_error: Option<String>,
    /// Caller flag consulted before recovering.
    pub intentionally_stopped: bool,
    /// A recovery sequence is in flight.
    pub is_recovering: bool,
    /// Set once automatic recovery gave up.
    pub halted: Option<HaltReason>,
}

impl RecoveryState {
    /// True when the worker needs an operator.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }
}
