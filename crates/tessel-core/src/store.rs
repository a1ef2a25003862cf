use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::clock::SimClock;
use crate::entity::{Entity, EntityAllocator};
use crate::event::{ChangeType, ComponentEvent};
use crate::kind::ComponentKind;

/// Identifies a store listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type ListenerFn<V> = Box<dyn FnMut(&ComponentEvent<'_, V>)>;

struct Listener<V> {
    id: ListenerId,
    kind: Option<ComponentKind>,
    callback: ListenerFn<V>,
}

/// One row of a [`ComponentStore::query`] result.
#[derive(Debug)]
pub struct QueryRow<'s, V> {
    /// The matching entity.
    pub entity: Entity,
    /// One value per requested kind, in request order.
    pub values: Vec<&'s V>,
}

/// Sparse table mapping `(kind, entity)` to a component value.
///
/// Every write is reported synchronously to the listeners registered at the
/// time of the write, in subscription order. A listener that panics is
/// logged and skipped; delivery continues with the next listener.
pub struct ComponentStore<V> {
    tables: HashMap<ComponentKind, HashMap<Entity, V>>,
    entities: EntityAllocator,
    clock: SimClock,
    listeners: Vec<Listener<V>>,
    next_listener: u64,
}

impl<V> fmt::Debug for ComponentStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("kinds", &self.tables.len())
            .field("next_entity", &self.entities.peek_next())
            .field("listeners", &self.listeners.len())
            .field("tick", &self.clock.tick())
            .finish()
    }
}

impl<V> Default for ComponentStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ComponentStore<V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            entities: EntityAllocator::new(),
            clock: SimClock::new(),
            listeners: Vec::new(),
            next_listener: 1,
        }
    }

    // -- Entities --

    /// Allocate a new entity handle. No other side effects.
    pub fn create_entity(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// The entity allocator, for inspection and persistence.
    pub fn entities(&self) -> &EntityAllocator {
        &self.entities
    }

    /// Move the entity counter forward after a restore.
    pub fn resume_entities_from(&mut self, next: u64) {
        self.entities.resume_from(next);
    }

    // -- Components --

    /// Insert or replace the value for `(entity, kind)`.
    ///
    /// Emits [`ChangeType::Add`] for a new pair and [`ChangeType::Update`]
    /// when a previous value was replaced.
    pub fn add_component(
        &mut self,
        entity: Entity,
        kind: impl Into<ComponentKind>,
        value: V,
    ) -> ChangeType {
        let kind = kind.into();
        let table = self.tables.entry(kind.clone()).or_default();
        let change = match table.insert(entity, value) {
            Some(_) => ChangeType::Update,
            None => ChangeType::Add,
        };
        let event = ComponentEvent {
            change,
            entity,
            kind: &kind,
            value: table.get(&entity),
        };
        emit(&mut self.listeners, &event);
        change
    }

    /// Detach `(entity, kind)`. Returns the removed value, or `None` (and
    /// emits nothing) if the pair was absent.
    pub fn remove_component(&mut self, entity: Entity, kind: &str) -> Option<V> {
        let removed = self.tables.get_mut(kind)?.remove(&entity)?;
        let (kind, _) = self.tables.get_key_value(kind)?;
        let event = ComponentEvent {
            change: ChangeType::Remove,
            entity,
            kind,
            value: None,
        };
        emit(&mut self.listeners, &event);
        Some(removed)
    }

    /// The current value for `(entity, kind)`.
    pub fn get_component(&self, entity: Entity, kind: &str) -> Option<&V> {
        self.tables.get(kind)?.get(&entity)
    }

    /// Mutable access to a value. The store cannot see mutations made
    /// through this reference; follow up with
    /// [`mark_component_updated`](Self::mark_component_updated).
    pub fn get_component_mut(&mut self, entity: Entity, kind: &str) -> Option<&mut V> {
        self.tables.get_mut(kind)?.get_mut(&entity)
    }

    /// Whether `(entity, kind)` currently holds a value.
    pub fn has_component(&self, entity: Entity, kind: &str) -> bool {
        self.get_component(entity, kind).is_some()
    }

    /// Re-emit [`ChangeType::Update`] for the current value without changing
    /// it. Returns `false` if the pair is absent.
    pub fn mark_component_updated(&mut self, entity: Entity, kind: &str) -> bool {
        let Some((kind, table)) = self.tables.get_key_value(kind) else {
            return false;
        };
        let Some(value) = table.get(&entity) else {
            return false;
        };
        let event = ComponentEvent {
            change: ChangeType::Update,
            entity,
            kind,
            value: Some(value),
        };
        emit(&mut self.listeners, &event);
        true
    }

    // -- Queries --

    /// Entities holding every listed kind, paired with their values.
    ///
    /// Seeded from the first kind's table, so the order follows that
    /// table's iteration order and is not stable across removals. An empty
    /// kind list yields an empty result.
    pub fn query<K: AsRef<str>>(&self, kinds: &[K]) -> Vec<QueryRow<'_, V>> {
        let Some((first, rest)) = kinds.split_first() else {
            return Vec::new();
        };
        let Some(seed) = self.tables.get(first.as_ref()) else {
            return Vec::new();
        };
        let mut others = Vec::with_capacity(rest.len());
        for kind in rest {
            match self.tables.get(kind.as_ref()) {
                Some(table) => others.push(table),
                None => return Vec::new(),
            }
        }

        seed.iter()
            .filter_map(|(entity, value)| {
                let mut values = Vec::with_capacity(kinds.len());
                values.push(value);
                for table in &others {
                    values.push(table.get(entity)?);
                }
                Some(QueryRow {
                    entity: *entity,
                    values,
                })
            })
            .collect()
    }

    /// Iterate every `(entity, value)` pair of one kind.
    pub fn iter_kind<'s>(&'s self, kind: &str) -> impl Iterator<Item = (Entity, &'s V)> + 's {
        self.tables
            .get(kind)
            .into_iter()
            .flat_map(|table| table.iter().map(|(entity, value)| (*entity, value)))
    }

    /// Entities holding a value of `kind`.
    pub fn entities_with(&self, kind: &str) -> Vec<Entity> {
        self.iter_kind(kind).map(|(entity, _)| entity).collect()
    }

    /// Kinds currently attached to `entity`.
    pub fn kinds_of(&self, entity: Entity) -> Vec<ComponentKind> {
        self.tables
            .iter()
            .filter(|(_, table)| table.contains_key(&entity))
            .map(|(kind, _)| kind.clone())
            .collect()
    }

    /// Every kind that has ever held a value.
    pub fn kinds(&self) -> impl Iterator<Item = &ComponentKind> {
        self.tables.keys()
    }

    /// Number of values currently stored under `kind`.
    pub fn kind_len(&self, kind: &str) -> usize {
        self.tables.get(kind).map_or(0, HashMap::len)
    }

    // -- Clock --

    /// Advance the simulation clock by one tick of `dt` seconds.
    pub fn advance_clock(&mut self, dt: f64) -> u64 {
        self.clock.advance(dt)
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Reset the clock to a previously saved tick count and elapsed time.
    pub fn restore_clock(&mut self, tick: u64, elapsed: f64) {
        self.clock.resume(tick, elapsed);
    }

    // -- Listeners --

    /// Register a listener for every change of every kind.
    pub fn subscribe(&mut self, callback: impl FnMut(&ComponentEvent<'_, V>) + 'static) -> ListenerId {
        self.push_listener(None, Box::new(callback))
    }

    /// Register a listener that only sees changes of `kind`.
    pub fn subscribe_kind(
        &mut self,
        kind: impl Into<ComponentKind>,
        callback: impl FnMut(&ComponentEvent<'_, V>) + 'static,
    ) -> ListenerId {
        self.push_listener(Some(kind.into()), Box::new(callback))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn push_listener(&mut self, kind: Option<ComponentKind>, callback: ListenerFn<V>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(Listener { id, kind, callback });
        id
    }
}

/// Deliver one event to every matching listener in subscription order.
fn emit<V>(listeners: &mut [Listener<V>], event: &ComponentEvent<'_, V>) {
    for listener in listeners.iter_mut() {
        if listener.kind.as_ref().is_some_and(|k| k != event.kind) {
            continue;
        }
        let callback = &mut listener.callback;
        if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!(
                listener = %listener.id,
                entity = %event.entity,
                kind = %event.kind,
                change = %event.change,
                "listener panicked; event discarded for this listener"
            );
        }
    }
}
