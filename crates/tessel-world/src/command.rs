use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tessel_core::{ComponentKind, Entity};

use crate::component::Component;

/// A world mutation requested from inside a change callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Attach or replace a value.
    Add {
        /// Target entity.
        entity: Entity,
        /// Target kind.
        kind: ComponentKind,
        /// New value.
        value: Component,
    },
    /// Detach a value.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Target kind.
        kind: ComponentKind,
    },
    /// Re-announce the current value as updated.
    MarkUpdated {
        /// Target entity.
        entity: Entity,
        /// Target kind.
        kind: ComponentKind,
    },
    /// Detach every kind the entity holds.
    Despawn(Entity),
}

/// Shared handle for queueing mutations while the world is emitting.
///
/// Callbacks cannot borrow the world they are called from, so they push
/// commands here instead. The world drains the queue once the write that
/// triggered the callback has finished delivering; each drained command
/// emits its own events, which may queue further commands.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Rc<RefCell<VecDeque<Command>>>,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&self, command: Command) {
        self.pending.borrow_mut().push_back(command);
    }

    /// Queue an attach-or-replace.
    pub fn add(&self, entity: Entity, kind: impl Into<ComponentKind>, value: impl Into<Component>) {
        self.push(Command::Add {
            entity,
            kind: kind.into(),
            value: value.into(),
        });
    }

    /// Queue a detach.
    pub fn remove(&self, entity: Entity, kind: impl Into<ComponentKind>) {
        self.push(Command::Remove {
            entity,
            kind: kind.into(),
        });
    }

    /// Queue an update notification for the current value.
    pub fn mark_updated(&self, entity: Entity, kind: impl Into<ComponentKind>) {
        self.push(Command::MarkUpdated {
            entity,
            kind: kind.into(),
        });
    }

    /// Queue removal of every component of `entity`.
    pub fn despawn(&self, entity: Entity) {
        self.push(Command::Despawn(entity));
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Take the oldest command.
    pub(crate) fn pop(&self) -> Option<Command> {
        self.pending.borrow_mut().pop_front()
    }

    /// Drop every queued command.
    pub(crate) fn clear(&self) {
        self.pending.borrow_mut().clear();
    }
}
