//! Error types used by the fleet runtime, its workers and its collaborators.
//!
//! - [`ConfigError`]: invalid policy or configuration values (fail fast at construction).
//! - [`FleetError`]: failures of the composition root itself.
//! - [`WorkerError`]: failures raised by a worker body or its control methods.
//! - [`LegalityError`]: structured rejection from the legality collaborator.
//!
//! Submission outcomes (`AlreadyInQueue`, `Full`, ...) are **not** errors; see
//! [`AddResult`](crate::AddResult).

use std::time::Duration;
use thiserror::Error;

/// # Invalid configuration.
///
/// Raised by [`RecoveryPolicy`](crate::RecoveryPolicy) and
/// [`FleetBuilder::build`](crate::FleetBuilder::build). Values are never
/// silently clamped, except the recovery delay cap.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `max_recovery_attempts` must be at least 1.
    #[error("max_recovery_attempts must be >= 1 (got {0})")]
    MaxAttempts(u32),

    /// `backoff_multiplier` must be finite and at least 1.0.
    #[error("backoff_multiplier must be a finite value >= 1.0 (got {0})")]
    BackoffMultiplier(f64),

    /// `max_crashes_in_window` must be at least 1.
    #[error("max_crashes_in_window must be >= 1 (got {0})")]
    MaxCrashesInWindow(u32),

    /// `crash_history_window_minutes` must be at least 1.
    #[error("crash_history_window_minutes must be >= 1 (got {0})")]
    CrashWindow(u64),

    /// `skip_percentage` must lie in `[0, 100]`.
    #[error("skip_percentage must be within [0, 100] (got {0})")]
    SkipPercentage(u32),

    /// The supervisor tick interval must be non-zero.
    #[error("health check interval must be non-zero")]
    TickInterval,
}

/// # Errors produced by the fleet composition root.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FleetError {
    /// No worker with that name is registered.
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),

    /// A worker with that name is already registered.
    #[error("worker '{0}' is already registered")]
    DuplicateWorker(String),

    /// A worker control operation failed.
    #[error("worker '{name}': {source}")]
    Worker {
        /// Worker name.
        name: String,
        /// Underlying failure.
        #[source]
        source: WorkerError,
    },

    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; still running: {running:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Workers that did not stop in time.
        running: Vec<String>,
    },
}

/// # Errors produced by worker bodies and worker control.
///
/// `Fail`, `Disconnected` are considered retryable by the recovery supervisor;
/// `Fatal` is still recovered (the policy decides), but is labelled separately.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Worker body failed but may succeed after a restart.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Connection to the remote session was lost.
    #[error("connection lost: {error}")]
    Disconnected {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure reported by the body.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Body exited because its context was cancelled.
    #[error("context cancelled")]
    Canceled,

    /// `start` was called on a running worker.
    #[error("worker already running")]
    AlreadyRunning,

    /// Body panicked.
    #[error("worker panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl WorkerError {
    /// Shorthand for [`WorkerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        WorkerError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`WorkerError::Disconnected`].
    pub fn disconnected(error: impl Into<String>) -> Self {
        WorkerError::Disconnected {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::WorkerError;
    ///
    /// assert_eq!(WorkerError::fail("boom").as_label(), "worker_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fail { .. } => "worker_failed",
            WorkerError::Disconnected { .. } => "worker_disconnected",
            WorkerError::Fatal { .. } => "worker_fatal",
            WorkerError::Canceled => "worker_canceled",
            WorkerError::AlreadyRunning => "worker_already_running",
            WorkerError::Panicked { .. } => "worker_panicked",
        }
    }

    /// Indicates whether restarting the worker may help.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::WorkerError;
    ///
    /// assert!(WorkerError::disconnected("socket closed").is_retryable());
    /// assert!(!WorkerError::Fatal { error: "bad firmware".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Fail { .. } | WorkerError::Disconnected { .. } | WorkerError::Panicked { .. }
        )
    }
}

/// # Rejection produced by the legality collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct LegalityError {
    /// Human-readable reason, shown to the submitter.
    pub reason: String,
}

impl LegalityError {
    /// Creates a new legality error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
