use std::cell::RefCell;
use std::rc::Rc;

use tessel_core::{ChangeNotifier, ChangeType, ComponentKind, ComponentStore, Entity, Subscription};
use tessel_spatial::{QuadTree, SpatialItem};
use tracing::{debug, warn};

use crate::component::Component;

/// Keeps a [`QuadTree`] mirroring the positions held under one component kind.
///
/// Installed as an ordinary subscriber of that kind: adds insert, updates
/// move (or drop the entity once its value no longer carries a position),
/// removals remove. Subscriptions only see future writes, so installing
/// also primes the tree with every value already in the store.
#[derive(Debug)]
pub struct SpatialSync {
    subscription: Subscription,
}

impl SpatialSync {
    /// Subscribe to `kind` and prime `index` from the current store contents.
    pub fn install(
        notifier: &mut ChangeNotifier<Component>,
        index: &Rc<RefCell<QuadTree>>,
        kind: impl Into<ComponentKind>,
    ) -> Self {
        let kind = kind.into();
        let mirror = Rc::clone(index);
        let subscription = notifier.on_component_change(kind.clone(), move |entity, value, change| {
            match mirror.try_borrow_mut() {
                Ok(mut tree) => mirror_change(&mut tree, entity, value, change),
                Err(_) => warn!(%entity, %change, "spatial index busy; change not mirrored"),
            }
        });
        let primed = prime(notifier.store(), &mut index.borrow_mut(), kind.as_str());
        debug!(%kind, primed, "spatial sync installed");
        Self { subscription }
    }

    /// The kind being mirrored.
    pub fn kind(&self) -> &ComponentKind {
        self.subscription.kind()
    }

    /// Stop mirroring. The tree keeps whatever it holds.
    pub fn uninstall(self, notifier: &mut ChangeNotifier<Component>) -> bool {
        notifier.unsubscribe(self.subscription)
    }
}

/// Insert every positioned value of `kind` into `tree`. Returns how many
/// were accepted.
pub fn prime(store: &ComponentStore<Component>, tree: &mut QuadTree, kind: &str) -> usize {
    store
        .iter_kind(kind)
        .filter_map(|(entity, value)| {
            let (x, y) = value.position()?;
            Some(SpatialItem::new(entity, x, y))
        })
        .filter(|item| {
            let accepted = tree.insert(*item);
            if !accepted {
                warn!(entity = %item.entity, x = item.x, y = item.y, "position outside spatial boundary");
            }
            accepted
        })
        .count()
}

fn mirror_change(tree: &mut QuadTree, entity: Entity, value: Option<&Component>, change: ChangeType) {
    let position = value.and_then(Component::position);
    match (change, position) {
        (ChangeType::Remove, _) | (_, None) => {
            tree.remove(entity);
            return;
        }
        (ChangeType::Add, Some((x, y))) => {
            tree.insert(SpatialItem::new(entity, x, y));
        }
        (ChangeType::Update, Some((x, y))) => {
            tree.update(entity, x, y);
        }
    }
    if !tree.has(entity) {
        warn!(%entity, %change, "position outside spatial boundary; entity not indexed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{TRANSFORM, Transform};
    use tessel_spatial::{QuadTreeConfig, Rect};

    fn index() -> Rc<RefCell<QuadTree>> {
        let config = QuadTreeConfig::default().with_boundary(Rect::new(0.0, 0.0, 100.0, 100.0));
        Rc::new(RefCell::new(QuadTree::new(config).unwrap()))
    }

    #[test]
    fn install_primes_existing_positions() {
        let mut notifier: ChangeNotifier<Component> = ChangeNotifier::default();
        let store = notifier.store_mut();
        let a = store.create_entity();
        let b = store.create_entity();
        let far = store.create_entity();
        store.add_component(a, TRANSFORM, Transform::at(10.0, 10.0).into());
        store.add_component(b, TRANSFORM, Transform::at(20.0, 20.0).into());
        store.add_component(far, TRANSFORM, Transform::at(500.0, 20.0).into());

        let index = index();
        let _sync = SpatialSync::install(&mut notifier, &index, TRANSFORM);
        let tree = index.borrow();
        assert!(tree.has(a) && tree.has(b));
        assert!(!tree.has(far));
    }

    #[test]
    fn mirrors_add_update_and_remove() {
        let mut notifier: ChangeNotifier<Component> = ChangeNotifier::default();
        let index = index();
        let _sync = SpatialSync::install(&mut notifier, &index, TRANSFORM);
        let store = notifier.store_mut();
        let e = store.create_entity();

        store.add_component(e, TRANSFORM, Transform::at(5.0, 5.0).into());
        assert_eq!(index.borrow().get(e), Some(SpatialItem::new(e, 5.0, 5.0)));

        store.add_component(e, TRANSFORM, Transform::at(60.0, 70.0).into());
        assert_eq!(index.borrow().get(e), Some(SpatialItem::new(e, 60.0, 70.0)));

        store.remove_component(e, "Transform");
        assert!(!index.borrow().has(e));
    }

    #[test]
    fn value_without_position_is_dropped() {
        let mut notifier: ChangeNotifier<Component> = ChangeNotifier::default();
        let index = index();
        let _sync = SpatialSync::install(&mut notifier, &index, "Marker");
        let store = notifier.store_mut();
        let e = store.create_entity();
        store.add_component(e, "Marker", Component::Data(serde_json::json!({ "x": 1, "y": 2 })));
        assert!(index.borrow().has(e));
        store.add_component(e, "Marker", Component::Data(serde_json::json!({ "label": "gone" })));
        assert!(!index.borrow().has(e));
    }

    #[test]
    fn update_out_of_bounds_drops_stale_entry() {
        let mut notifier: ChangeNotifier<Component> = ChangeNotifier::default();
        let index = index();
        let _sync = SpatialSync::install(&mut notifier, &index, TRANSFORM);
        let store = notifier.store_mut();
        let e = store.create_entity();

        store.add_component(e, TRANSFORM, Transform::at(40.0, 40.0).into());
        store.add_component(e, TRANSFORM, Transform::at(400.0, 40.0).into());
        assert!(!index.borrow().has(e));
        assert!(index.borrow().query(&Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());

        store.add_component(e, TRANSFORM, Transform::at(50.0, 40.0).into());
        assert_eq!(index.borrow().get(e), Some(SpatialItem::new(e, 50.0, 40.0)));
    }

    #[test]
    fn uninstall_stops_mirroring() {
        let mut notifier: ChangeNotifier<Component> = ChangeNotifier::default();
        let index = index();
        let sync = SpatialSync::install(&mut notifier, &index, TRANSFORM);
        assert_eq!(sync.kind(), &TRANSFORM);
        assert!(sync.uninstall(&mut notifier));
        assert!(!notifier.has_listeners("Transform"));

        let e = notifier.store_mut().create_entity();
        notifier.store_mut().add_component(e, TRANSFORM, Transform::at(1.0, 1.0).into());
        assert!(!index.borrow().has(e));
    }
}
