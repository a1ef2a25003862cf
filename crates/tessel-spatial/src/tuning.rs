use serde::{Deserialize, Serialize};

use crate::config::QuadTreeConfig;
use crate::quadtree::QuadTreeMetrics;

/// Paired split/merge events per pass that count as thrashing.
const THRASH_EVENTS: u64 = 2;
const THRESHOLD_STEP: f64 = 0.1;
const MIN_MERGE_THRESHOLD: f64 = 0.1;
const MAX_MERGE_THRESHOLD: f64 = 0.9;
/// Quiet passes double the interval up to this multiple of the configured one.
const MAX_BACKOFF: f64 = 8.0;
/// Average leaf fill (fraction of capacity) below which the tree counts as sparse.
const SPARSE_FILL: f64 = 0.25;

/// Revised tunables reported after an auto-tune pass.
///
/// Only the merge hysteresis and the pass period are ever revised; the
/// boundary, capacity and maximum depth stay as configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningUpdate {
    /// New merge threshold.
    pub merge_threshold: f64,
    /// New rebalance interval in simulated seconds.
    pub rebalance_interval: f64,
}

/// Timer and counter baseline for auto-tune passes.
#[derive(Debug, Clone)]
pub(crate) struct AutoTuner {
    elapsed: f64,
    seen_splits: u64,
    seen_merges: u64,
    base_interval: f64,
}

impl AutoTuner {
    pub(crate) fn new(base_interval: f64) -> Self {
        Self {
            elapsed: 0.0,
            seen_splits: 0,
            seen_merges: 0,
            base_interval,
        }
    }

    /// Accumulate `dt`; returns `true` when a pass is due.
    pub(crate) fn advance(&mut self, dt: f64, interval: f64) -> bool {
        if !(dt.is_finite() && dt > 0.0) {
            return false;
        }
        self.elapsed += dt;
        if self.elapsed < interval {
            return false;
        }
        self.elapsed = 0.0;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.elapsed = 0.0;
        self.seen_splits = 0;
        self.seen_merges = 0;
    }

    /// Compare counters against the previous pass and propose new tunables.
    ///
    /// Splits and merges in the same window mean nodes are flapping across
    /// the merge boundary, so the threshold drops to widen the gap between
    /// split and merge populations. A window with no restructuring backs
    /// the timer off and, if the tree is sparse, lets it merge sooner.
    pub(crate) fn evaluate(
        &mut self,
        metrics: &QuadTreeMetrics,
        config: &QuadTreeConfig,
    ) -> Option<TuningUpdate> {
        let splits = metrics.splits.saturating_sub(self.seen_splits);
        let merges = metrics.merges.saturating_sub(self.seen_merges);
        self.seen_splits = metrics.splits;
        self.seen_merges = metrics.merges;

        let mut threshold = config.merge_threshold;
        let mut interval = config.rebalance_interval;

        if splits.min(merges) >= THRASH_EVENTS {
            if threshold > MIN_MERGE_THRESHOLD {
                threshold = (threshold - THRESHOLD_STEP).max(MIN_MERGE_THRESHOLD);
            }
            interval = self.base_interval;
        } else if splits == 0 && merges == 0 {
            interval = (interval * 2.0).min(self.base_interval * MAX_BACKOFF);
            let sparse = metrics.nodes > 1
                && metrics.avg_items_per_node < config.capacity as f64 * SPARSE_FILL;
            if sparse && threshold < MAX_MERGE_THRESHOLD {
                threshold = (threshold + THRESHOLD_STEP).min(MAX_MERGE_THRESHOLD);
            }
        }

        if threshold == config.merge_threshold && interval == config.rebalance_interval {
            return None;
        }
        Some(TuningUpdate {
            merge_threshold: threshold,
            rebalance_interval: interval,
        })
    }
}
