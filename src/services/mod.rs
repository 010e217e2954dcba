pub mod features;
pub mod preference;
pub mod recommendation;
pub mod similarity;

use crate::error::SkipReason;
use std::collections::HashMap;

/// Outcome of a batch sweep. Skips never abort the sweep; they are counted
/// per reason so the skip policy stays visible and testable.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub processed: usize,
    pub skipped: HashMap<SkipReason, usize>,
}

impl SweepReport {
    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}
