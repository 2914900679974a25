//! # Fleet configuration.
//!
//! [`FleetConfig`] centralizes the runtime knobs of a fleet. It embeds the two
//! operator-facing value surfaces, [`RecoverySettings`] and [`QueueSettings`],
//! which are plain `serde` structs; loading them is up to the caller.
//!
//! ## Sentinel values
//! - `max_concurrent_recoveries = 0` → unlimited (no semaphore created)
//! - `QueueSettings::max_queue_count = 0` → unlimited queue size
//! - `grace = 0s` → do not wait for workers on shutdown

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::{BackoffPolicy, FairnessSettings, RecoverySettings};

/// Operator-facing queue configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Favored fast-lane parameters.
    #[serde(flatten)]
    pub fairness: FairnessSettings,
    /// Maximum number of active records (`0` = unlimited). Privileged
    /// submissions ignore it.
    pub max_queue_count: usize,
    /// First idle poll delay of a worker waiting for work.
    pub idle_poll_min_ms: u64,
    /// Idle poll delay cap.
    pub idle_poll_max_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            fairness: FairnessSettings::default(),
            max_queue_count: 0,
            idle_poll_min_ms: 250,
            idle_poll_max_ms: 2_000,
        }
    }
}

impl QueueSettings {
    /// Returns the queue size limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        match self.max_queue_count {
            0 => None,
            n => Some(n),
        }
    }

    /// Backoff used by idle workers between empty polls.
    pub fn idle_backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.idle_poll_min_ms),
            max: Duration::from_millis(self.idle_poll_max_ms.max(self.idle_poll_min_ms)),
            factor: 2.0,
        }
    }
}

/// Global configuration of a [`Fleet`](crate::Fleet).
///
/// ## Field semantics
/// - `health_check_interval`: supervisor tick period (non-zero)
/// - `post_start_observation`: how long a restarted worker must stay up to count as recovered
/// - `max_concurrent_recoveries`: recovery sequences in flight at once (`0` = unlimited)
/// - `grace`: maximum wait for workers to stop on shutdown
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct FleetConfig {
    /// Supervisor tick period.
    pub health_check_interval: Duration,
    /// Observation window after a restart.
    pub post_start_observation: Duration,
    /// Concurrent recovery limit (`0` = unlimited).
    pub max_concurrent_recoveries: usize,
    /// Shutdown grace period.
    pub grace: Duration,
    /// Event bus capacity.
    pub bus_capacity: usize,
    /// Restart rules.
    pub recovery: RecoverySettings,
    /// Queue rules.
    pub queue: QueueSettings,
}

impl FleetConfig {
    /// Returns the recovery concurrency limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn recovery_concurrency(&self) -> Option<usize> {
        match self.max_concurrent_recoveries {
            0 => None,
            n => Some(n),
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for FleetConfig {
    /// - `health_check_interval = 10s`
    /// - `post_start_observation = 5s`
    /// - `max_concurrent_recoveries = 0` (unlimited)
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(10),
            post_start_observation: Duration::from_secs(5),
            max_concurrent_recoveries: 0,
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            recovery: RecoverySettings::default(),
            queue: QueueSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        let cfg = FleetConfig::default();
        assert_eq!(cfg.recovery_concurrency(), None);
        assert_eq!(cfg.queue.queue_limit(), None);

        let q = QueueSettings {
            max_queue_count: 30,
            ..Default::default()
        };
        assert_eq!(q.queue_limit(), Some(30));
    }

    #[test]
    fn idle_backoff_cap_never_below_first() {
        let q = QueueSettings {
            idle_poll_min_ms: 500,
            idle_poll_max_ms: 100,
            ..Default::default()
        };
        let b = q.idle_backoff();
        assert_eq!(b.next(0), Duration::from_millis(500));
        assert_eq!(b.next(5), Duration::from_millis(500));
    }

    #[test]
    fn queue_settings_flatten_fairness() {
        let q: QueueSettings = serde_json::from_str(
            r#"{ "enable_favoritism": false, "skip_percentage": 40, "max_queue_count": 12 }"#,
        )
        .expect("json");
        assert!(!q.fairness.enable_favoritism);
        assert_eq!(q.fairness.skip_percentage, 40);
        assert_eq!(q.fairness.minimum_regular_users_first, 3);
        assert_eq!(q.max_queue_count, 12);
    }
}
