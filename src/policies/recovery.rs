//! # Recovery policy.
//!
//! [`RecoverySettings`] is the plain value surface an operator configures
//! (integers and booleans, `serde`-friendly). [`RecoveryPolicy`] is its
//! validated, immutable form consumed by the
//! [`RecoverySupervisor`](crate::RecoverySupervisor).
//!
//! ```text
//! RecoverySettings ──try_from──► RecoveryPolicy
//!                    (fail fast)     ├─ enabled
//!                                    ├─ max_attempts
//!                                    ├─ backoff: BackoffPolicy   (delay cap is the only clamp)
//!                                    ├─ crash_window / max_crashes_in_window
//!                                    ├─ recover_intentional_stops
//!                                    └─ minimum_stable_uptime
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Operator-facing recovery configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Master switch; when false crashed workers are only reported.
    pub enable_recovery: bool,
    /// Consecutive failed recoveries before giving up (>= 1).
    pub max_recovery_attempts: u32,
    /// Delay before the first restart.
    pub initial_recovery_delay_seconds: u64,
    /// Upper bound for the restart delay.
    pub max_recovery_delay_seconds: u64,
    /// Growth factor of the restart delay (>= 1.0).
    pub backoff_multiplier: f64,
    /// Length of the rolling crash window.
    pub crash_history_window_minutes: u64,
    /// Crashes tolerated inside the window before recovery stops.
    pub max_crashes_in_window: u32,
    /// Restart workers that an operator stopped on purpose.
    pub recover_intentional_stops: bool,
    /// Uptime after which consecutive failures are forgiven.
    pub minimum_stable_uptime_seconds: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enable_recovery: true,
            max_recovery_attempts: 3,
            initial_recovery_delay_seconds: 5,
            max_recovery_delay_seconds: 300,
            backoff_multiplier: 2.0,
            crash_history_window_minutes: 60,
            max_crashes_in_window: 5,
            recover_intentional_stops: false,
            minimum_stable_uptime_seconds: 600,
        }
    }
}

/// Validated recovery policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryPolicy {
    enabled: bool,
    max_attempts: u32,
    backoff: BackoffPolicy,
    crash_window: Duration,
    max_crashes_in_window: u32,
    recover_intentional_stops: bool,
    minimum_stable_uptime: Duration,
}

impl TryFrom<&RecoverySettings> for RecoveryPolicy {
    type Error = ConfigError;

    fn try_from(s: &RecoverySettings) -> Result<Self, Self::Error> {
        if s.max_recovery_attempts < 1 {
            return Err(ConfigError::MaxAttempts(s.max_recovery_attempts));
        }
        if !s.backoff_multiplier.is_finite() || s.backoff_multiplier < 1.0 {
            return Err(ConfigError::BackoffMultiplier(s.backoff_multiplier));
        }
        if s.max_crashes_in_window < 1 {
            return Err(ConfigError::MaxCrashesInWindow(s.max_crashes_in_window));
        }
        if s.crash_history_window_minutes < 1 {
            return Err(ConfigError::CrashWindow(s.crash_history_window_minutes));
        }

        Ok(Self {
            enabled: s.enable_recovery,
            max_attempts: s.max_recovery_attempts,
            backoff: BackoffPolicy {
                first: Duration::from_secs(s.initial_recovery_delay_seconds),
                max: Duration::from_secs(s.max_recovery_delay_seconds),
                factor: s.backoff_multiplier,
            },
            crash_window: Duration::from_secs(s.crash_history_window_minutes.saturating_mul(60)),
            max_crashes_in_window: s.max_crashes_in_window,
            recover_intentional_stops: s.recover_intentional_stops,
            minimum_stable_uptime: Duration::from_secs(s.minimum_stable_uptime_seconds),
        })
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            crash_window: Duration::from_secs(60 * 60),
            max_crashes_in_window: 5,
            recover_intentional_stops: false,
            minimum_stable_uptime: Duration::from_secs(600),
        }
    }
}

impl RecoveryPolicy {
    /// Validates `settings`.
    pub fn new(settings: &RecoverySettings) -> Result<Self, ConfigError> {
        Self::try_from(settings)
    }

    /// Delay before recovery attempt `n` (0-indexed):
    /// `min(initial × multiplier^n, max)`.
    #[inline]
    pub fn backoff_delay(&self, n: u32) -> Duration {
        self.backoff.next(n)
    }

    /// True when recovery is switched on in configuration.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Consecutive failures after which the worker is given up on.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Rolling window for crash-rate limiting.
    pub fn crash_window(&self) -> Duration {
        self.crash_window
    }

    /// Crashes tolerated within [`crash_window`](Self::crash_window).
    pub fn max_crashes_in_window(&self) -> u32 {
        self.max_crashes_in_window
    }

    /// Whether intentional stops are recovered too.
    pub fn recover_intentional_stops(&self) -> bool {
        self.recover_intentional_stops
    }

    /// Uptime after which consecutive failures are forgiven.
    pub fn minimum_stable_uptime(&self) -> Duration {
        self.minimum_stable_uptime
    }

    /// Underlying backoff parameters.
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }
}
