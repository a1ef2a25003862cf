//! Quadtree spatial index for Tessel.
//!
//! A [`QuadTree`] holds at most one position per entity. Leaves split into
//! four quadrants once they overflow and collapse back when their subtree
//! population drops low enough, so the tree follows the population as it
//! moves. Membership is answered from an entity-to-node map without walking
//! the tree.

/// Configuration types and validation.
pub mod config;
/// Error types for the spatial crate.
pub mod error;
/// Axis-aligned rectangles and positioned items.
pub mod geometry;
/// The quadtree itself.
pub mod quadtree;
/// Merge-hysteresis auto-tuning.
pub mod tuning;

/// Re-export of [`config::QuadTreeConfig`].
pub use config::QuadTreeConfig;
/// Re-exports of [`error::ConfigError`] and [`error::SpatialResult`].
pub use error::{ConfigError, SpatialResult};
/// Re-exports of [`geometry::Rect`] and [`geometry::SpatialItem`].
pub use geometry::{Rect, SpatialItem};
/// Re-exports of [`quadtree::QuadTree`] and [`quadtree::QuadTreeMetrics`].
pub use quadtree::{QuadTree, QuadTreeMetrics};
/// Re-export of [`tuning::TuningUpdate`].
pub use tuning::TuningUpdate;
