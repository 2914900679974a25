//! # Queue position reporting.

use std::time::Duration;

use crate::queue::{Routine, WorkId};

/// Where a submitter's record stands in its routine queue.
///
/// Counts are in *items*: a waiting batch contributes every item it still has
/// to do, a record being processed occupies one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionResult {
    /// The record asked about.
    pub work_id: WorkId,
    /// Its routine.
    pub routine: Routine,
    /// 1-based place in line (`0` while it is being processed).
    pub position: usize,
    /// Items outstanding in the routine, processing ones included.
    pub total_outstanding: usize,
    /// 1-based index inside its batch.
    pub batch_index: u32,
    /// Size of its batch (1 for single requests).
    pub batch_total: u32,
    /// A worker is handling it right now.
    pub processing: bool,
}

impl PositionResult {
    /// Items ahead of this record.
    pub fn ahead(&self) -> usize {
        self.position.saturating_sub(1)
    }

    /// Estimated wait, given the average time one item takes.
    pub fn eta(&self, per_item: Duration) -> Duration {
        per_item.saturating_mul(self.ahead().min(u32::MAX as usize) as u32)
    }

    /// Caller-facing position/ETA line.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use fleetvisor::{PositionResult, Routine};
    ///
    /// let p = PositionResult {
    ///     work_id: 1, routine: Routine::LinkTrade, position: 4, total_outstanding: 9,
    ///     batch_index: 1, batch_total: 1, processing: false,
    /// };
    /// assert_eq!(
    ///     p.describe(Duration::from_secs(60)),
    ///     "You are 4/9 in the link_trade queue. Estimated wait: 3 minutes."
    /// );
    /// ```
    pub fn describe(&self, per_item: Duration) -> String {
        if self.processing {
            return if self.batch_total > 1 {
                format!(
                    "Your batch is being processed now (item {}/{}).",
                    self.batch_index, self.batch_total
                )
            } else {
                "Your request is being processed now.".to_string()
            };
        }

        let batch = if self.batch_total > 1 {
            format!(" (batch of {})", self.batch_total)
        } else {
            String::new()
        };
        format!(
            "You are {}/{} in the {} queue{}. Estimated wait: {}.",
            self.position,
            self.total_outstanding,
            self.routine,
            batch,
            humanize(self.eta(per_item))
        )
    }
}

fn humanize(d: Duration) -> String {
    let minutes = d.as_secs().div_ceil(60);
    match minutes {
        0 => "none".to_string(),
        1 => "1 minute".to_string(),
        m => format!("{m} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting(position: usize, batch_total: u32) -> PositionResult {
        PositionResult {
            work_id: 1,
            routine: Routine::Clone,
            position,
            total_outstanding: 10,
            batch_index: 1,
            batch_total,
            processing: false,
        }
    }

    #[test]
    fn head_of_line_has_no_wait() {
        let p = waiting(1, 1);
        assert_eq!(p.eta(Duration::from_secs(45)), Duration::ZERO);
        assert!(p.describe(Duration::from_secs(45)).ends_with("Estimated wait: none."));
    }

    #[test]
    fn batch_is_mentioned() {
        let p = waiting(2, 3);
        assert_eq!(
            p.describe(Duration::from_secs(30)),
            "You are 2/10 in the clone queue (batch of 3). Estimated wait: 1 minute."
        );
    }

    #[test]
    fn processing_message() {
        let p = PositionResult {
            processing: true,
            position: 0,
            ..waiting(0, 1)
        };
        assert_eq!(p.describe(Duration::from_secs(30)), "Your request is being processed now.");
    }
}
