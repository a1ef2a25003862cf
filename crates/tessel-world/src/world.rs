use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tessel_core::{
    ChangeNotifier, ChangeType, ComponentKind, ComponentStore, Entity, QueryRow, SimClock,
    Subscription,
};
use tessel_spatial::{QuadTree, QuadTreeConfig, QuadTreeMetrics, Rect, SpatialItem, TuningUpdate};
use tracing::{debug, warn};

use crate::command::{Command, CommandQueue};
use crate::component::Component;
use crate::config::WorldConfig;
use crate::error::WorldResult;
use crate::sync::{self, SpatialSync};

/// Deferred commands applied per top-level write before the rest are
/// discarded as a runaway feedback loop.
const MAX_DEFERRED_COMMANDS: usize = 10_000;

/// One simulation world: a component store, its per-kind change
/// notification, and a spatial index mirroring the configured position kind.
///
/// Every write goes through the store and is delivered synchronously, so
/// by the time a write method returns the index already reflects it.
/// Commands queued by callbacks through [`commands`](Self::commands) are
/// applied before the write method returns as well.
pub struct World {
    notifier: ChangeNotifier<Component>,
    index: Rc<RefCell<QuadTree>>,
    sync: Option<SpatialSync>,
    commands: CommandQueue,
    config: WorldConfig,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("store", self.notifier.store())
            .field("spatial", &self.spatial_metrics())
            .field("position_kind", &self.config.position_kind)
            .field("synced", &self.sync.is_some())
            .finish()
    }
}

impl World {
    /// Build an empty world and connect the spatial mirror.
    pub fn new(config: WorldConfig) -> WorldResult<Self> {
        config.validate()?;
        let index = Rc::new(RefCell::new(QuadTree::new(config.spatial.clone())?));
        let mut notifier = ChangeNotifier::default();
        let sync = SpatialSync::install(&mut notifier, &index, config.position_kind.clone());
        Ok(Self {
            notifier,
            index,
            sync: Some(sync),
            commands: CommandQueue::new(),
            config,
        })
    }

    /// The configuration this world was built with. Spatial tunables may
    /// since have been revised; see [`spatial_config_snapshot`](Self::spatial_config_snapshot).
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &ComponentStore<Component> {
        self.notifier.store()
    }

    /// A handle for queueing writes from inside change callbacks.
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }

    // -- Entities and components --

    /// Allocate a fresh entity handle.
    pub fn create_entity(&mut self) -> Entity {
        self.notifier.store_mut().create_entity()
    }

    /// Insert or replace a component value.
    pub fn add_component(
        &mut self,
        entity: Entity,
        kind: impl Into<ComponentKind>,
        value: impl Into<Component>,
    ) -> ChangeType {
        let change = self
            .notifier
            .store_mut()
            .add_component(entity, kind, value.into());
        self.flush_commands();
        change
    }

    /// Detach a component value. Absent pairs are a no-op.
    pub fn remove_component(&mut self, entity: Entity, kind: &str) -> Option<Component> {
        let removed = self.notifier.store_mut().remove_component(entity, kind);
        self.flush_commands();
        removed
    }

    /// The current value for `(entity, kind)`.
    pub fn get_component(&self, entity: Entity, kind: &str) -> Option<&Component> {
        self.store().get_component(entity, kind)
    }

    /// Whether `(entity, kind)` holds a value.
    pub fn has_component(&self, entity: Entity, kind: &str) -> bool {
        self.store().has_component(entity, kind)
    }

    /// Mutate a value in place and announce the change as an update.
    /// Returns `false` if the pair is absent.
    pub fn modify_component(
        &mut self,
        entity: Entity,
        kind: &str,
        edit: impl FnOnce(&mut Component),
    ) -> bool {
        let Some(value) = self.notifier.store_mut().get_component_mut(entity, kind) else {
            return false;
        };
        edit(value);
        self.mark_component_updated(entity, kind)
    }

    /// Re-announce the current value as updated.
    pub fn mark_component_updated(&mut self, entity: Entity, kind: &str) -> bool {
        let marked = self.notifier.store_mut().mark_component_updated(entity, kind);
        self.flush_commands();
        marked
    }

    /// Entities holding every listed kind, with their values.
    pub fn query<K: AsRef<str>>(&self, kinds: &[K]) -> Vec<QueryRow<'_, Component>> {
        self.store().query(kinds)
    }

    /// Detach every kind `entity` holds, each with its own removal event.
    /// Returns how many were detached. The handle is not recycled.
    pub fn despawn(&mut self, entity: Entity) -> usize {
        let detached = self.detach_all(entity);
        self.flush_commands();
        detached
    }

    // -- Subscriptions --

    /// Subscribe to changes of one kind. See [`ChangeNotifier::on_component_change`].
    ///
    /// Subscribers of the position kind run after the spatial mirror, so the
    /// index is already current when they are called.
    pub fn on_component_change(
        &mut self,
        kind: impl Into<ComponentKind>,
        callback: impl FnMut(Entity, Option<&Component>, ChangeType) + 'static,
    ) -> Subscription {
        self.notifier.on_component_change(kind, callback)
    }

    /// Cancel a subscription.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.notifier.unsubscribe(subscription)
    }

    /// Subscribers listening to `kind`, the spatial mirror included.
    pub fn listener_count(&self, kind: &str) -> usize {
        self.notifier.listener_count(kind)
    }

    /// Whether anything listens to `kind`.
    pub fn has_listeners(&self, kind: &str) -> bool {
        self.notifier.has_listeners(kind)
    }

    /// Drop every subscriber, the spatial mirror included. The index keeps
    /// its contents but no longer follows the store.
    pub fn clear_all_listeners(&mut self) {
        self.sync = None;
        self.notifier.clear_all_listeners();
        self.commands.clear();
    }

    // -- Time --

    /// Run one tick of at most `max_delta` seconds.
    ///
    /// Negative or non-finite deltas count as zero. Advances the clock and
    /// the spatial auto-tune timer. Returns the new tick number.
    pub fn tick(&mut self, dt: f64) -> u64 {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_delta)
        } else {
            0.0
        };
        let tick = self.notifier.store_mut().advance_clock(dt);
        self.index.borrow_mut().tick(dt);
        tick
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimClock {
        self.store().clock()
    }

    // -- Spatial --

    /// Items whose point lies in `range`.
    pub fn query_region(&self, range: &Rect) -> Vec<SpatialItem> {
        self.index.borrow().query(range)
    }

    /// Items within `radius` of `(x, y)`.
    pub fn query_radius(&self, x: f64, y: f64, radius: f64) -> Vec<SpatialItem> {
        self.index.borrow().query_radius(x, y, radius)
    }

    /// Whether `entity` is in the spatial index.
    pub fn is_tracked(&self, entity: Entity) -> bool {
        self.index.borrow().has(entity)
    }

    /// The indexed position of `entity`.
    pub fn tracked_position(&self, entity: Entity) -> Option<SpatialItem> {
        self.index.borrow().get(entity)
    }

    /// Spatial index metrics.
    pub fn spatial_metrics(&self) -> QuadTreeMetrics {
        self.index.borrow().metrics()
    }

    /// The spatial configuration currently in force, including any
    /// auto-tune revisions.
    pub fn spatial_config_snapshot(&self) -> QuadTreeConfig {
        self.index.borrow().config().clone()
    }

    /// Register the callback fired when auto-tuning revises the spatial
    /// tunables, so the host can persist them.
    pub fn on_spatial_tune(&mut self, callback: impl FnMut(&TuningUpdate) + 'static) {
        self.index.borrow_mut().on_tune(callback);
    }

    // -- Persistence support --

    /// Rebuild state saved by an external persistence layer.
    ///
    /// Resets the clock to `tick` and `elapsed`, moves the allocator to at
    /// least `next_entity` and replays every record through the store
    /// (subscribers see ordinary add events). The spatial mirror stays
    /// subscribed throughout, so it keeps its place ahead of position
    /// subscribers registered after [`new`](Self::new); it indexes the
    /// replayed positions as they arrive. Meant for a freshly built world.
    pub fn restore<K: Into<ComponentKind>>(
        &mut self,
        tick: u64,
        elapsed: f64,
        next_entity: u64,
        records: impl IntoIterator<Item = (Entity, K, Component)>,
    ) {
        self.index.borrow_mut().clear();

        let store = self.notifier.store_mut();
        store.restore_clock(tick, elapsed);
        store.resume_entities_from(next_entity);
        let mut replayed = 0usize;
        for (entity, kind, value) in records {
            store.add_component(entity, kind, value);
            replayed += 1;
        }
        self.flush_commands();

        let position_kind = self.config.position_kind.clone();
        if self.sync.is_some() {
            // Positions stored before the restore never passed the mirror.
            sync::prime(
                self.notifier.store(),
                &mut self.index.borrow_mut(),
                position_kind.as_str(),
            );
        } else {
            let mirror = SpatialSync::install(&mut self.notifier, &self.index, position_kind);
            self.sync = Some(mirror);
        }
        debug!(
            replayed,
            indexed = self.index.borrow().len(),
            tick,
            elapsed,
            "world restored"
        );
    }

    // -- Internals --

    fn detach_all(&mut self, entity: Entity) -> usize {
        let store = self.notifier.store_mut();
        store
            .kinds_of(entity)
            .into_iter()
            .filter(|kind| store.remove_component(entity, kind.as_str()).is_some())
            .count()
    }

    /// Apply commands queued by callbacks until the queue is empty.
    fn flush_commands(&mut self) {
        let mut applied = 0usize;
        while let Some(command) = self.commands.pop() {
            if applied == MAX_DEFERRED_COMMANDS {
                warn!(
                    dropped = self.commands.len() + 1,
                    "deferred command limit reached; discarding the rest"
                );
                self.commands.clear();
                return;
            }
            applied += 1;
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        let store = self.notifier.store_mut();
        match command {
            Command::Add {
                entity,
                kind,
                value,
            } => {
                store.add_component(entity, kind, value);
            }
            Command::Remove { entity, kind } => {
                store.remove_component(entity, kind.as_str());
            }
            Command::MarkUpdated { entity, kind } => {
                store.mark_component_updated(entity, kind.as_str());
            }
            Command::Despawn(entity) => {
                self.detach_all(entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{HEALTH, Health, TRANSFORM, Transform, VELOCITY, Velocity};

    type Seen = Rc<RefCell<Vec<(Entity, ChangeType)>>>;

    fn world() -> World {
        World::new(WorldConfig::default().with_spatial(
            QuadTreeConfig::default()
                .with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0))
                .with_capacity(4),
        ))
        .unwrap()
    }

    #[test]
    fn new_world_has_only_the_spatial_mirror() {
        let world = world();
        assert_eq!(world.listener_count("Transform"), 1);
        assert_eq!(world.store().listener_count(), 1);
        assert_eq!(world.spatial_metrics().items, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = WorldConfig::default().with_max_delta(-1.0);
        assert!(World::new(config).is_err());
    }

    #[test]
    fn positions_flow_into_the_index() {
        let mut world = world();
        let e = world.create_entity();
        assert_eq!(world.add_component(e, TRANSFORM, Transform::at(10.0, 10.0)), ChangeType::Add);
        assert!(world.is_tracked(e));

        assert_eq!(world.add_component(e, TRANSFORM, Transform::at(90.0, 90.0)), ChangeType::Update);
        assert_eq!(world.tracked_position(e), Some(SpatialItem::new(e, 90.0, 90.0)));
        assert!(world.query_region(&Rect::new(0.0, 0.0, 50.0, 50.0)).is_empty());

        world.remove_component(e, "Transform");
        assert!(!world.is_tracked(e));
    }

    #[test]
    fn modify_component_moves_the_entity() {
        let mut world = world();
        let e = world.create_entity();
        world.add_component(e, TRANSFORM, Transform::at(10.0, 10.0));
        let modified = world.modify_component(e, "Transform", |c| {
            if let Some(t) = c.as_transform_mut() {
                t.x = 70.0;
            }
        });
        assert!(modified);
        assert_eq!(world.tracked_position(e), Some(SpatialItem::new(e, 70.0, 10.0)));
        assert!(!world.modify_component(e, "Health", |_| {}));
    }

    #[test]
    fn out_of_bounds_positions_are_not_indexed() {
        let mut world = world();
        let e = world.create_entity();
        world.add_component(e, TRANSFORM, Transform::at(500.0, 10.0));
        assert!(world.has_component(e, "Transform"));
        assert!(!world.is_tracked(e));
        world.add_component(e, TRANSFORM, Transform::at(50.0, 10.0));
        assert!(world.is_tracked(e));
    }

    #[test]
    fn despawn_detaches_every_kind() {
        let mut world = world();
        let seen: Seen = Rc::default();
        let sink = Rc::clone(&seen);
        let _sub = world.on_component_change(HEALTH, move |entity, value, change| {
            assert!(change != ChangeType::Remove || value.is_none());
            sink.borrow_mut().push((entity, change));
        });

        let e = world.create_entity();
        world.add_component(e, TRANSFORM, Transform::at(5.0, 5.0));
        world.add_component(e, VELOCITY, Velocity { dx: 1.0, dy: 0.0 });
        world.add_component(e, HEALTH, Health::full(3));

        assert_eq!(world.despawn(e), 3);
        assert!(world.store().kinds_of(e).is_empty());
        assert!(!world.is_tracked(e));
        assert_eq!(*seen.borrow(), vec![(e, ChangeType::Add), (e, ChangeType::Remove)]);
        assert_ne!(world.create_entity(), e);
    }

    #[test]
    fn callbacks_can_queue_writes() {
        let mut world = world();
        let commands = world.commands();
        // Depleted health removes the entity's position.
        let _sub = world.on_component_change(HEALTH, move |entity, value, _| {
            if value.and_then(Component::as_health).is_some_and(Health::is_depleted) {
                commands.remove(entity, TRANSFORM);
            }
        });

        let e = world.create_entity();
        world.add_component(e, TRANSFORM, Transform::at(5.0, 5.0));
        world.add_component(e, HEALTH, Health::full(2));
        assert!(world.is_tracked(e));

        world.add_component(e, HEALTH, Health { current: 0, max: 2 });
        assert!(!world.has_component(e, "Transform"));
        assert!(!world.is_tracked(e));
        assert!(world.commands().is_empty());
    }

    #[test]
    fn queued_commands_cascade_until_quiet() {
        let mut world = world();
        let commands = world.commands();
        let _sub = world.on_component_change("Counter", move |entity, value, _| {
            let n = value
                .and_then(|v| match v {
                    Component::Data(data) => data.as_u64(),
                    _ => None,
                })
                .unwrap_or(0);
            if n < 5 {
                commands.add(entity, "Counter", Component::Data((n + 1).into()));
            }
        });
        let e = world.create_entity();
        world.add_component(e, "Counter", Component::Data(0.into()));
        assert_eq!(
            world.get_component(e, "Counter"),
            Some(&Component::Data(5.into()))
        );
    }

    #[test]
    fn runaway_feedback_is_cut_off() {
        let mut world = world();
        let commands = world.commands();
        let _sub = world.on_component_change("Echo", move |entity, _, _| {
            commands.mark_updated(entity, "Echo");
        });
        let e = world.create_entity();
        world.add_component(e, "Echo", Component::Data(serde_json::Value::Null));
        assert!(world.commands().is_empty());
    }

    #[test]
    fn tick_clamps_the_delta() {
        let mut world = world();
        assert_eq!(world.tick(5.0), 1);
        assert!((world.clock().elapsed() - 0.1).abs() < 1e-12);
        world.tick(-1.0);
        world.tick(f64::NAN);
        assert_eq!(world.clock().tick(), 3);
        assert!((world.clock().elapsed() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn query_radius_uses_the_index() {
        let mut world = world();
        let near = world.create_entity();
        let far = world.create_entity();
        world.add_component(near, TRANSFORM, Transform::at(11.0, 10.0));
        world.add_component(far, TRANSFORM, Transform::at(40.0, 40.0));
        let found: Vec<Entity> = world
            .query_radius(10.0, 10.0, 5.0)
            .into_iter()
            .map(|item| item.entity)
            .collect();
        assert_eq!(found, vec![near]);
    }

    #[test]
    fn query_joins_kinds() {
        let mut world = world();
        let mover = world.create_entity();
        let statue = world.create_entity();
        world.add_component(mover, TRANSFORM, Transform::at(1.0, 1.0));
        world.add_component(mover, VELOCITY, Velocity { dx: 1.0, dy: 1.0 });
        world.add_component(statue, TRANSFORM, Transform::at(2.0, 2.0));
        let rows = world.query(&["Transform", "Velocity"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity, mover);
    }

    #[test]
    fn restore_rebuilds_store_and_index() {
        let mut source = world();
        let a = source.create_entity();
        let b = source.create_entity();
        source.add_component(a, TRANSFORM, Transform::at(10.0, 10.0));
        source.add_component(b, TRANSFORM, Transform::at(80.0, 20.0));
        source.add_component(b, HEALTH, Health::full(7));
        source.tick(0.05);

        let records: Vec<(Entity, ComponentKind, Component)> = source
            .store()
            .kinds()
            .flat_map(|kind| {
                source
                    .store()
                    .iter_kind(kind.as_str())
                    .map(move |(entity, value)| (entity, kind.clone(), value.clone()))
            })
            .collect();

        let mut restored = world();
        restored.restore(
            source.clock().tick(),
            source.clock().elapsed(),
            source.store().entities().peek_next(),
            records,
        );

        assert!(restored.is_tracked(a) && restored.is_tracked(b));
        assert_eq!(restored.spatial_metrics().items, 2);
        assert_eq!(restored.get_component(b, "Health"), Some(&Component::Health(Health::full(7))));
        assert!((restored.clock().elapsed() - 0.05).abs() < 1e-12);
        assert_eq!(restored.clock().tick(), 1);
        assert_eq!(restored.listener_count("Transform"), 1);
        let fresh = restored.create_entity();
        assert!(fresh != a && fresh != b);

        // Mirroring resumes after the restore.
        restored.remove_component(a, "Transform");
        assert!(!restored.is_tracked(a));
    }

    #[test]
    fn position_subscribers_keep_running_after_the_mirror_across_restore() {
        let mut world = world();
        let index = Rc::clone(&world.index);
        let indexed_when_called: Rc<RefCell<Vec<bool>>> = Rc::default();
        let sink = Rc::clone(&indexed_when_called);
        let _sub = world.on_component_change(TRANSFORM, move |entity, value, _| {
            if value.is_some() {
                sink.borrow_mut().push(index.borrow().has(entity));
            }
        });

        let saved = Entity::from_raw(1);
        world.restore(
            4,
            0.2,
            2,
            [(saved, TRANSFORM, Component::from(Transform::at(30.0, 30.0)))],
        );
        assert_eq!(world.listener_count("Transform"), 2);
        assert_eq!(world.clock().tick(), 4);

        let fresh = world.create_entity();
        world.add_component(fresh, TRANSFORM, Transform::at(60.0, 60.0));
        assert_eq!(*indexed_when_called.borrow(), vec![true, true]);
        assert!(world.is_tracked(saved) && world.is_tracked(fresh));
    }

    #[test]
    fn restore_reconnects_a_cleared_mirror() {
        let mut world = world();
        world.clear_all_listeners();
        let saved = Entity::from_raw(1);
        let records = [(saved, TRANSFORM, Component::from(Transform::at(5.0, 5.0)))];
        world.restore(0, 0.0, 2, records);
        assert!(world.is_tracked(saved));
        assert_eq!(world.listener_count("Transform"), 1);
    }

    #[test]
    fn clear_all_listeners_disconnects_the_mirror() {
        let mut world = world();
        let _sub = world.on_component_change(HEALTH, |_, _, _| {});
        world.clear_all_listeners();
        assert!(!world.has_listeners("Transform"));
        assert!(!world.has_listeners("Health"));
        assert_eq!(world.store().listener_count(), 0);
    }

    #[test]
    fn auto_tune_reports_through_the_world() {
        let mut world = World::new(WorldConfig::default().with_spatial(
            QuadTreeConfig::default()
                .with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0))
                .with_capacity(2)
                .with_max_depth(2)
                .with_merge_threshold(1.0)
                .with_rebalance_interval(0.1)
                .with_auto_tune(true),
        ))
        .unwrap();
        let tuned: Rc<RefCell<Vec<TuningUpdate>>> = Rc::default();
        let sink = Rc::clone(&tuned);
        world.on_spatial_tune(move |update| sink.borrow_mut().push(*update));

        let a = world.create_entity();
        let b = world.create_entity();
        let c = world.create_entity();
        world.add_component(a, TRANSFORM, Transform::at(10.0, 10.0));
        world.add_component(b, TRANSFORM, Transform::at(12.0, 12.0));
        for _ in 0..2 {
            world.add_component(c, TRANSFORM, Transform::at(14.0, 14.0));
            world.remove_component(c, "Transform");
        }
        world.tick(0.1);

        assert_eq!(tuned.borrow().len(), 1);
        assert!(world.spatial_config_snapshot().merge_threshold < 1.0);
        assert!((world.config().spatial.merge_threshold - 1.0).abs() < f64::EPSILON);
    }
}
