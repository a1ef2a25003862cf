use std::fmt;

use crate::entity::Entity;
use crate::kind::ComponentKind;

/// What happened to a `(kind, entity)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// A value was attached where none existed.
    Add,
    /// An existing value was replaced or flagged as mutated in place.
    Update,
    /// The value was detached.
    Remove,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// A change reported synchronously by the store.
///
/// `value` borrows the current value from the store and is always `None`
/// for [`ChangeType::Remove`].
#[derive(Debug)]
pub struct ComponentEvent<'a, V> {
    /// What happened.
    pub change: ChangeType,
    /// The affected entity.
    pub entity: Entity,
    /// The affected component kind.
    pub kind: &'a ComponentKind,
    /// The current value, absent on removal.
    pub value: Option<&'a V>,
}
