use std::path::Path;

use serde::{Deserialize, Serialize};
use tessel_core::ComponentKind;
use tessel_spatial::QuadTreeConfig;

use crate::component::TRANSFORM;
use crate::error::{WorldError, WorldResult};

/// Configuration for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Spatial index settings.
    pub spatial: QuadTreeConfig,
    /// Upper bound on the per-tick delta in simulated seconds.
    pub max_delta: f64,
    /// Component kind whose values carry the positions mirrored into the index.
    pub position_kind: ComponentKind,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            spatial: QuadTreeConfig::default(),
            max_delta: 0.1,
            position_kind: TRANSFORM,
        }
    }
}

impl WorldConfig {
    /// Set the spatial index settings.
    pub fn with_spatial(mut self, spatial: QuadTreeConfig) -> Self {
        self.spatial = spatial;
        self
    }

    /// Set the per-tick delta bound.
    pub fn with_max_delta(mut self, seconds: f64) -> Self {
        self.max_delta = seconds;
        self
    }

    /// Set the kind mirrored into the spatial index.
    pub fn with_position_kind(mut self, kind: impl Into<ComponentKind>) -> Self {
        self.position_kind = kind.into();
        self
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> WorldResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check every field, including the nested spatial settings.
    pub fn validate(&self) -> WorldResult<()> {
        self.spatial.validate()?;
        if !(self.max_delta.is_finite() && self.max_delta > 0.0) {
            return Err(WorldError::MaxDelta(self.max_delta));
        }
        if self.position_kind.as_str().is_empty() {
            return Err(WorldError::EmptyPositionKind);
        }
        Ok(())
    }

    /// Pretty-printed JSON, as accepted by [`from_json_str`](Self::from_json_str).
    pub fn to_json_pretty(&self) -> WorldResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
