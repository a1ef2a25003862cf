use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::entity::Entity;
use crate::event::ChangeType;
use crate::kind::ComponentKind;
use crate::store::{ComponentStore, ListenerId};

type Callback<V> = Rc<RefCell<dyn FnMut(Entity, Option<&V>, ChangeType)>>;

struct Subscriber<V> {
    id: u64,
    callback: Callback<V>,
}

/// Subscribers of one kind plus the single store listener feeding them.
struct KindChannel<V> {
    bridge: ListenerId,
    subscribers: Rc<RefCell<Vec<Subscriber<V>>>>,
}

/// Handle returned by [`ChangeNotifier::on_component_change`].
///
/// Pass it back to [`ChangeNotifier::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use = "dropping a subscription handle leaks the listener until clear_all_listeners"]
pub struct Subscription {
    id: u64,
    kind: ComponentKind,
}

impl Subscription {
    /// The kind this subscription listens to.
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }
}

/// Per-kind change notification over a [`ComponentStore`].
///
/// Consumers subscribe to one component kind instead of filtering the
/// store's mixed-kind event stream themselves. The first subscriber of a
/// kind installs one kind-filtered listener on the store; later subscribers
/// share it, and the last unsubscribe tears it down again.
pub struct ChangeNotifier<V> {
    store: ComponentStore<V>,
    channels: HashMap<ComponentKind, KindChannel<V>>,
    next_id: u64,
}

impl<V> fmt::Debug for ChangeNotifier<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("store", &self.store)
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl<V: 'static> Default for ChangeNotifier<V> {
    fn default() -> Self {
        Self::new(ComponentStore::new())
    }
}

impl<V: 'static> ChangeNotifier<V> {
    /// Wrap a store.
    pub fn new(store: ComponentStore<V>) -> Self {
        Self {
            store,
            channels: HashMap::new(),
            next_id: 1,
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &ComponentStore<V> {
        &self.store
    }

    /// Mutable access to the wrapped store. Writes made through it are
    /// delivered to subscribers as usual.
    pub fn store_mut(&mut self) -> &mut ComponentStore<V> {
        &mut self.store
    }

    /// Subscribe to changes of one kind.
    ///
    /// The callback receives the entity, the current value (always `None`
    /// on removal) and the change type. Callbacks of one kind run in
    /// subscription order; a panicking callback is logged and skipped.
    pub fn on_component_change(
        &mut self,
        kind: impl Into<ComponentKind>,
        callback: impl FnMut(Entity, Option<&V>, ChangeType) + 'static,
    ) -> Subscription {
        let kind = kind.into();
        let id = self.next_id;
        self.next_id += 1;

        if !self.channels.contains_key(&kind) {
            let channel = self.install_bridge(kind.clone());
            self.channels.insert(kind.clone(), channel);
        }
        if let Some(channel) = self.channels.get(&kind) {
            channel.subscribers.borrow_mut().push(Subscriber {
                id,
                callback: Rc::new(RefCell::new(callback)),
            });
        }

        Subscription { id, kind }
    }

    /// Stop delivery to a subscriber. Tears down the kind's store listener
    /// when its last subscriber leaves. Returns `false` if the subscription
    /// was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let Some(channel) = self.channels.get(&subscription.kind) else {
            return false;
        };
        let now_empty = {
            let mut subscribers = channel.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|s| s.id != subscription.id);
            if subscribers.len() == before {
                return false;
            }
            subscribers.is_empty()
        };

        if !now_empty {
            return true;
        }
        if let Some(channel) = self.channels.remove(&subscription.kind) {
            self.store.unsubscribe(channel.bridge);
            debug!(kind = %subscription.kind, "change bridge torn down");
        }
        true
    }

    /// Number of subscribers currently listening to `kind`.
    pub fn listener_count(&self, kind: &str) -> usize {
        self.channels
            .get(kind)
            .map_or(0, |channel| channel.subscribers.borrow().len())
    }

    /// Whether `kind` has any subscriber (and therefore a store listener).
    pub fn has_listeners(&self, kind: &str) -> bool {
        self.channels.contains_key(kind)
    }

    /// Number of store listeners installed by this notifier.
    pub fn bridge_count(&self) -> usize {
        self.channels.len()
    }

    /// Drop every subscriber and every store listener this notifier
    /// installed. Used on world teardown.
    pub fn clear_all_listeners(&mut self) {
        for (kind, channel) in self.channels.drain() {
            self.store.unsubscribe(channel.bridge);
            debug!(%kind, "change bridge torn down");
        }
    }

    fn install_bridge(&mut self, kind: ComponentKind) -> KindChannel<V> {
        let subscribers: Rc<RefCell<Vec<Subscriber<V>>>> = Rc::default();
        let fanout = Rc::clone(&subscribers);
        let bridge = self.store.subscribe_kind(kind.clone(), move |event| {
            // Snapshot so unsubscribes during delivery only affect later emissions.
            let targets: Vec<Callback<V>> = fanout
                .borrow()
                .iter()
                .map(|s| Rc::clone(&s.callback))
                .collect();
            for callback in targets {
                let Ok(mut callback) = callback.try_borrow_mut() else {
                    continue;
                };
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                    (&mut *callback)(event.entity, event.value, event.change)
                }));
                if delivered.is_err() {
                    warn!(
                        kind = %event.kind,
                        entity = %event.entity,
                        change = %event.change,
                        "change subscriber panicked; event discarded for this subscriber"
                    );
                }
            }
        });
        debug!(%kind, %bridge, "change bridge installed");
        KindChannel {
            bridge,
            subscribers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Seen = Rc<RefCell<Vec<(Entity, Option<i32>, ChangeType)>>>;

    fn collector(seen: &Seen) -> impl FnMut(Entity, Option<&i32>, ChangeType) + 'static {
        let sink = Rc::clone(seen);
        move |entity: Entity, value: Option<&i32>, change: ChangeType| {
            sink.borrow_mut().push((entity, value.copied(), change))
        }
    }

    #[test]
    fn subscribe_then_unsubscribe_tears_bridge_down() {
        let mut notifier: ChangeNotifier<i32> = ChangeNotifier::default();
        let sub = notifier.on_component_change("Transform", |_, _, _| {});
        assert!(notifier.has_listeners("Transform"));
        assert_eq!(notifier.store().listener_count(), 1);

        assert!(notifier.unsubscribe(sub.clone()));
        assert_eq!(notifier.listener_count("Transform"), 0);
        assert!(!notifier.has_listeners("Transform"));
        assert_eq!(notifier.store().listener_count(), 0);
        assert!(!notifier.unsubscribe(sub));
    }

    #[test]
    fn subscribers_of_one_kind_share_a_single_bridge() {
        let mut notifier: ChangeNotifier<i32> = ChangeNotifier::default();
        let a = notifier.on_component_change("Health", |_, _, _| {});
        let b = notifier.on_component_change("Health", |_, _, _| {});
        let _c = notifier.on_component_change("Transform", |_, _, _| {});
        assert_eq!(notifier.listener_count("Health"), 2);
        assert_eq!(notifier.bridge_count(), 2);
        assert_eq!(notifier.store().listener_count(), 2);

        notifier.unsubscribe(a);
        assert!(notifier.has_listeners("Health"));
        notifier.unsubscribe(b);
        assert!(!notifier.has_listeners("Health"));
        assert_eq!(notifier.store().listener_count(), 1);
    }

    #[test]
    fn delivers_only_the_subscribed_kind() {
        let mut notifier = ChangeNotifier::default();
        let seen: Seen = Rc::default();
        let _sub = notifier.on_component_change("Health", collector(&seen));

        let store = notifier.store_mut();
        let e = store.create_entity();
        store.add_component(e, "Transform", 1);
        store.add_component(e, "Health", 10);
        store.add_component(e, "Health", 9);
        store.remove_component(e, "Health");

        assert_eq!(
            *seen.borrow(),
            vec![
                (e, Some(10), ChangeType::Add),
                (e, Some(9), ChangeType::Update),
                (e, None, ChangeType::Remove),
            ]
        );
    }

    #[test]
    fn unsubscribed_callback_receives_nothing_further() {
        let mut notifier = ChangeNotifier::default();
        let seen: Seen = Rc::default();
        let sub = notifier.on_component_change("Health", collector(&seen));
        let e = notifier.store_mut().create_entity();
        notifier.store_mut().add_component(e, "Health", 1);
        notifier.unsubscribe(sub);
        notifier.store_mut().add_component(e, "Health", 2);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let mut notifier = ChangeNotifier::default();
        let seen: Seen = Rc::default();
        let _bad = notifier.on_component_change("Health", |_, _, _| panic!("broken consumer"));
        let _good = notifier.on_component_change("Health", collector(&seen));
        let e = notifier.store_mut().create_entity();
        notifier.store_mut().add_component(e, "Health", 4);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn clear_all_listeners_drops_everything() {
        let mut notifier: ChangeNotifier<i32> = ChangeNotifier::default();
        let _a = notifier.on_component_change("Health", |_, _, _| {});
        let _b = notifier.on_component_change("Transform", |_, _, _| {});
        notifier.clear_all_listeners();
        assert_eq!(notifier.bridge_count(), 0);
        assert!(!notifier.has_listeners("Health"));
        assert_eq!(notifier.store().listener_count(), 0);
    }

    #[test]
    fn repeated_scene_transitions_do_not_grow_subscriptions() {
        let mut notifier: ChangeNotifier<i32> = ChangeNotifier::default();
        for _ in 0..50 {
            let sub = notifier.on_component_change("Transform", |_, _, _| {});
            notifier.unsubscribe(sub);
        }
        assert_eq!(notifier.store().listener_count(), 0);
    }
}
