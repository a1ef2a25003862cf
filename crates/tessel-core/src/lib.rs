//! Core types for Tessel: entities, the component store, and change notification.
//!
//! The [`ComponentStore`] is a sparse table keyed by `(kind, entity)` that
//! reports every write synchronously to its listeners. The
//! [`ChangeNotifier`] wraps a store and fans those events out per component
//! kind, installing exactly one store subscription per kind that has
//! interested parties.

/// Monotonic simulation clock.
pub mod clock;
/// Entity handles and the handle allocator.
pub mod entity;
/// Change events emitted by the store.
pub mod event;
/// Component kind keys.
pub mod kind;
/// Per-kind change notification layered over the store.
pub mod notify;
/// The sparse component store.
pub mod store;

/// Re-export of [`clock::SimClock`].
pub use clock::SimClock;
/// Re-exports of [`entity::Entity`] and [`entity::EntityAllocator`].
pub use entity::{Entity, EntityAllocator};
/// Re-exports of [`event::ChangeType`] and [`event::ComponentEvent`].
pub use event::{ChangeType, ComponentEvent};
/// Re-export of [`kind::ComponentKind`].
pub use kind::ComponentKind;
/// Re-exports of [`notify::ChangeNotifier`] and [`notify::Subscription`].
pub use notify::{ChangeNotifier, Subscription};
/// Re-exports of [`store::ComponentStore`], [`store::ListenerId`] and [`store::QueryRow`].
pub use store::{ComponentStore, ListenerId, QueryRow};
