//! # Exponential backoff.
//!
//! [`BackoffPolicy`] controls how delays grow after repeated failures. It is
//! used for recovery restarts and for the idle poll loop of queue workers.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`. Each
//! attempt derives its delay from the attempt number only, so the sequence is
//! non-decreasing for `factor >= 1.0`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(5),
//!     max: Duration::from_secs(60),
//!     factor: 2.0,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(5));
//! assert_eq!(backoff.next(1), Duration::from_secs(10));
//! assert_eq!(backoff.next(10), Duration::from_secs(60));
//! ```

use std::time::Duration;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for attempt 0.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` for a non-decreasing sequence).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns `first = 5s`, `factor = 2.0`, `max = 300s`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            max: Duration::from_secs(300),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// `min(first × factor^attempt, max)`. Overflowing or non-finite
    /// intermediate values resolve to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
        }
    }

    #[test]
    fn attempt_zero_returns_first() {
        assert_eq!(policy(100, 30_000, 2.0).next(0), Duration::from_millis(100));
    }

    #[test]
    fn exponential_growth() {
        let p = policy(100, 30_000, 2.0);
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(2), Duration::from_millis(400));
        assert_eq!(p.next(3), Duration::from_millis(800));
        assert_eq!(p.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn constant_factor() {
        let p = policy(500, 30_000, 1.0);
        for attempt in 0..10 {
            assert_eq!(p.next(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn first_exceeds_max() {
        assert_eq!(policy(10_000, 5_000, 2.0).next(0), Duration::from_millis(5_000));
    }

    #[test]
    fn huge_attempts_saturate_to_max() {
        let p = policy(100, 1_000, 10.0);
        assert_eq!(p.next(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn monotonic_and_bounded() {
        for factor in [1.0, 1.5, 2.0, 3.7] {
            let p = policy(250, 60_000, factor);
            let mut prev = Duration::ZERO;
            for attempt in 0..200 {
                let d = p.next(attempt);
                assert!(d >= prev, "factor {factor} attempt {attempt}: {d:?} < {prev:?}");
                assert!(d <= p.max);
                prev = d;
            }
        }
    }
}
