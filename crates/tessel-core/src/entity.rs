use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle identifying a game object.
///
/// An entity carries no data of its own; its meaning comes entirely from
/// the components attached to it in a [`ComponentStore`](crate::ComponentStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Wrap a raw handle value.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Return the raw handle value.
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out entity handles from a monotonically increasing counter.
///
/// Handles are never reused, even after every component of an entity has
/// been detached.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    next: u64,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Create an allocator whose first handle is `#1`.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate a fresh handle.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next;
        self.next += 1;
        Entity(id)
    }

    /// The raw value the next call to [`allocate`](Self::allocate) will return.
    pub fn peek_next(&self) -> u64 {
        self.next
    }

    /// Move the counter forward so the next handle is at least `next`.
    ///
    /// Used when restoring a saved world. The counter never moves backwards.
    pub fn resume_from(&mut self, next: u64) {
        self.next = self.next.max(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_monotonic() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let c = alloc.allocate();
        assert!(a < b && b < c);
        assert_eq!(a.id(), 1);
        assert_eq!(alloc.peek_next(), 4);
    }

    #[test]
    fn resume_never_moves_backwards() {
        let mut alloc = EntityAllocator::new();
        alloc.resume_from(10);
        assert_eq!(alloc.allocate().id(), 10);
        alloc.resume_from(3);
        assert_eq!(alloc.allocate().id(), 11);
    }

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(Entity::from_raw(42).to_string(), "#42");
    }
}
