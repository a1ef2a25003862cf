use std::path::PathBuf;

use tessel_spatial::ConfigError;

/// Alias for `Result<T, WorldError>`.
pub type WorldResult<T> = Result<T, WorldError>;

/// Errors raised while building or configuring a world.
///
/// Normal per-tick operations never fail; these only come from the edges
/// where configuration enters the system.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The spatial index configuration is invalid.
    #[error("invalid spatial configuration: {0}")]
    Spatial(#[from] ConfigError),

    /// The per-tick delta bound is not a positive finite number.
    #[error("max_delta must be a positive finite number, got {0}")]
    MaxDelta(f64),

    /// The position kind is an empty string.
    #[error("position_kind must not be empty")]
    EmptyPositionKind,

    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration text is not valid JSON for [`WorldConfig`](crate::WorldConfig).
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
