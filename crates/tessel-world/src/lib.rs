//! World wiring for Tessel.
//!
//! A [`World`] owns a component store, the per-kind change notifier over
//! it, and a quadtree that follows one position-bearing kind through a
//! [`SpatialSync`] subscription. Writes made through the world reach the
//! index before the write returns, so spatial queries always observe the
//! current frame.

/// Deferred writes queued from inside change callbacks.
pub mod command;
/// Concrete component records and their kind keys.
pub mod component;
/// World configuration and loading.
pub mod config;
/// Error types for world construction and configuration.
pub mod error;
/// The store-to-index mirror.
pub mod sync;
/// The world itself.
pub mod world;

/// Re-exports of [`command::Command`] and [`command::CommandQueue`].
pub use command::{Command, CommandQueue};
/// Re-exports of the component records and kind keys.
pub use component::{
    Component, HEALTH, Health, SPRITE, Sprite, TRANSFORM, Transform, VELOCITY, Velocity,
};
/// Re-export of [`config::WorldConfig`].
pub use config::WorldConfig;
/// Re-exports of [`error::WorldError`] and [`error::WorldResult`].
pub use error::{WorldError, WorldResult};
/// Re-export of [`sync::SpatialSync`].
pub use sync::SpatialSync;
/// Re-export of [`world::World`].
pub use world::World;
