//! # Favored-submitter fairness.
//!
//! Favored submitters may jump ahead of *part* of the regular submitters
//! waiting in the same tier, never all of them:
//!
//! ```text
//! skip = ceil(regular_waiting × (100 − skip_percentage) / 100)
//! if regular_waiting ≥ minimum_regular_users_first:
//!     skip = max(skip, minimum_regular_users_first)
//! ```
//!
//! `skip` regular entries stay ahead of the newcomer. The computation uses the
//! tier composition at insertion time only; later arrivals do not move
//! entries that are already placed.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Operator-facing fairness configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessSettings {
    /// Enables the favored fast-lane.
    pub enable_favoritism: bool,
    /// Share of waiting regular submitters a favored one may jump, in percent.
    pub skip_percentage: u32,
    /// Regular submitters always served before a favored jump (when that many wait).
    pub minimum_regular_users_first: u32,
}

impl Default for FairnessSettings {
    fn default() -> Self {
        Self {
            enable_favoritism: true,
            skip_percentage: 50,
            minimum_regular_users_first: 3,
        }
    }
}

/// Validated fairness policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FairnessPolicy {
    enabled: bool,
    skip_percentage: u32,
    minimum_regular_first: usize,
}

impl FairnessPolicy {
    /// Validates `settings` (`skip_percentage` must lie in `[0, 100]`).
    pub fn new(settings: &FairnessSettings) -> Result<Self, ConfigError> {
        if settings.skip_percentage > 100 {
            return Err(ConfigError::SkipPercentage(settings.skip_percentage));
        }
        Ok(Self {
            enabled: settings.enable_favoritism,
            skip_percentage: settings.skip_percentage,
            minimum_regular_first: settings.minimum_regular_users_first as usize,
        })
    }

    /// Plain FIFO within every tier.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            skip_percentage: 0,
            minimum_regular_first: 0,
        }
    }

    /// True when favored entries get the fast-lane.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Number of regular entries that must stay ahead of a favored newcomer
    /// when `regular_waiting` regular entries are queued in its tier.
    ///
    /// ```rust
    /// use fleetvisor::{FairnessPolicy, FairnessSettings};
    ///
    /// let p = FairnessPolicy::new(&FairnessSettings {
    ///     enable_favoritism: true,
    ///     skip_percentage: 40,
    ///     minimum_regular_users_first: 3,
    /// }).unwrap();
    /// assert_eq!(p.regular_ahead(100), 60);
    /// assert_eq!(p.regular_ahead(4), 3);
    /// assert_eq!(p.regular_ahead(2), 2);
    /// ```
    pub fn regular_ahead(&self, regular_waiting: usize) -> usize {
        let keep = (100 - self.skip_percentage) as usize;
        let mut skip = (regular_waiting * keep).div_ceil(100);
        if regular_waiting >= self.minimum_regular_first {
            skip = skip.max(self.minimum_regular_first);
        }
        skip.min(regular_waiting)
    }
}

impl Default for FairnessPolicy {
    fn default() -> Self {
        // Default settings are within range.
        Self {
            enabled: true,
            skip_percentage: 50,
            minimum_regular_first: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(pct: u32, min_first: u32) -> FairnessPolicy {
        FairnessPolicy::new(&FairnessSettings {
            enable_favoritism: true,
            skip_percentage: pct,
            minimum_regular_users_first: min_first,
        })
        .expect("valid")
    }

    #[test]
    fn rounds_up() {
        assert_eq!(policy(40, 0).regular_ahead(101), 61);
        assert_eq!(policy(50, 0).regular_ahead(3), 2);
    }

    #[test]
    fn minimum_applies_only_when_enough_wait() {
        let p = policy(100, 3);
        assert_eq!(p.regular_ahead(10), 3);
        assert_eq!(p.regular_ahead(2), 0);
    }

    #[test]
    fn zero_percent_keeps_everyone_ahead() {
        assert_eq!(policy(0, 0).regular_ahead(17), 17);
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        let s = FairnessSettings {
            skip_percentage: 101,
            ..Default::default()
        };
        assert_eq!(FairnessPolicy::new(&s), Err(ConfigError::SkipPercentage(101)));
    }
}
