/// Alias for `Result<T, ConfigError>`.
pub type SpatialResult<T> = Result<T, ConfigError>;

/// Reasons a [`QuadTreeConfig`](crate::QuadTreeConfig) is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The boundary has a non-finite coordinate or a non-positive size.
    #[error("invalid boundary: {x},{y} {width}x{height}")]
    InvalidBoundary {
        /// Left edge.
        x: f64,
        /// Top edge.
        y: f64,
        /// Width.
        width: f64,
        /// Height.
        height: f64,
    },

    /// A node must be able to hold at least one item.
    #[error("capacity must be at least 1")]
    ZeroCapacity,

    /// The merge threshold is a fraction of capacity.
    #[error("merge threshold must lie in [0, 1], got {0}")]
    MergeThreshold(f64),

    /// The auto-tune timer needs a positive, finite period.
    #[error("rebalance interval must be positive, got {0}")]
    RebalanceInterval(f64),

    /// Each level can add four nodes, so depth is capped.
    #[error("max depth must be at most {limit}, got {0}", limit = crate::config::MAX_DEPTH_LIMIT)]
    MaxDepth(u32),
}
