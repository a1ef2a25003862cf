use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SpatialResult};
use crate::geometry::Rect;

/// Deepest `max_depth` a configuration may ask for.
pub const MAX_DEPTH_LIMIT: u32 = 32;

/// Tunables for a [`QuadTree`](crate::QuadTree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadTreeConfig {
    /// Region covered by the root node. Points outside are rejected.
    pub boundary: Rect,
    /// Items a leaf holds before it splits.
    pub capacity: usize,
    /// Depth at which leaves stop splitting and simply grow.
    pub max_depth: u32,
    /// A subdivided node collapses once its subtree holds at most
    /// `capacity * merge_threshold` items.
    pub merge_threshold: f64,
    /// Simulated seconds between auto-tune passes.
    pub rebalance_interval: f64,
    /// Whether the auto-tune timer runs at all.
    pub auto_tune: bool,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            boundary: Rect::new(0.0, 0.0, 1000.0, 1000.0),
            capacity: 8,
            max_depth: 8,
            merge_threshold: 0.5,
            rebalance_interval: 5.0,
            auto_tune: false,
        }
    }
}

impl QuadTreeConfig {
    /// Set the root boundary.
    pub fn with_boundary(mut self, boundary: Rect) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set the leaf capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the maximum subdivision depth.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the merge threshold (fraction of capacity).
    pub fn with_merge_threshold(mut self, merge_threshold: f64) -> Self {
        self.merge_threshold = merge_threshold;
        self
    }

    /// Set the auto-tune period in simulated seconds.
    pub fn with_rebalance_interval(mut self, seconds: f64) -> Self {
        self.rebalance_interval = seconds;
        self
    }

    /// Enable or disable auto-tuning.
    pub fn with_auto_tune(mut self, enabled: bool) -> Self {
        self.auto_tune = enabled;
        self
    }

    /// Population at or below which a subdivided node collapses.
    pub fn merge_population(&self) -> f64 {
        self.capacity as f64 * self.merge_threshold
    }

    /// Check every field.
    pub fn validate(&self) -> SpatialResult<()> {
        if !self.boundary.is_valid() {
            let Rect {
                x,
                y,
                width,
                height,
            } = self.boundary;
            return Err(ConfigError::InvalidBoundary {
                x,
                y,
                width,
                height,
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(ConfigError::MaxDepth(self.max_depth));
        }
        if !(0.0..=1.0).contains(&self.merge_threshold) {
            return Err(ConfigError::MergeThreshold(self.merge_threshold));
        }
        if !(self.rebalance_interval.is_finite() && self.rebalance_interval > 0.0) {
            return Err(ConfigError::RebalanceInterval(self.rebalance_interval));
        }
        Ok(())
    }
}
