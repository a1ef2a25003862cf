use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessel_core::Entity;
use tracing::{debug, info};

use crate::config::QuadTreeConfig;
use crate::error::SpatialResult;
use crate::geometry::{Rect, SpatialItem};
use crate::tuning::{AutoTuner, TuningUpdate};

type NodeId = usize;

const ROOT: NodeId = 0;

/// A region of the tree. A node is a leaf while `children` is `None`.
#[derive(Debug, Clone)]
struct Node {
    boundary: Rect,
    depth: u32,
    parent: Option<NodeId>,
    items: Vec<SpatialItem>,
    children: Option<[NodeId; 4]>,
}

impl Node {
    fn leaf(boundary: Rect, depth: u32, parent: Option<NodeId>) -> Self {
        Self {
            boundary,
            depth,
            parent,
            items: Vec::new(),
            children: None,
        }
    }
}

/// Counters describing the tree's current shape and lifetime activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadTreeMetrics {
    /// Tracked entities.
    pub items: usize,
    /// Live nodes, including the root.
    pub nodes: usize,
    /// Leaf splits since creation or the last [`QuadTree::clear`].
    pub splits: u64,
    /// Subtree merges since creation or the last [`QuadTree::clear`].
    pub merges: u64,
    /// `items / nodes`.
    pub avg_items_per_node: f64,
}

type TuneCallback = Box<dyn FnMut(&TuningUpdate)>;

/// Region quadtree holding at most one position per entity.
///
/// Nodes live in an arena and refer to each other by index; freed nodes are
/// recycled by later splits. An entity-to-node map answers membership and
/// locates items for update and removal without a tree walk.
pub struct QuadTree {
    config: QuadTreeConfig,
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    locations: HashMap<Entity, NodeId>,
    splits: u64,
    merges: u64,
    tuner: AutoTuner,
    on_tune: Option<TuneCallback>,
}

impl fmt::Debug for QuadTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadTree")
            .field("boundary", &self.config.boundary)
            .field("items", &self.locations.len())
            .field("nodes", &self.node_count())
            .field("splits", &self.splits)
            .field("merges", &self.merges)
            .finish()
    }
}

impl QuadTree {
    /// Create an empty tree: a single leaf covering `config.boundary`.
    pub fn new(config: QuadTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        let tuner = AutoTuner::new(config.rebalance_interval);
        Ok(Self {
            nodes: vec![Node::leaf(config.boundary, 0, None)],
            free: Vec::new(),
            locations: HashMap::new(),
            splits: 0,
            merges: 0,
            tuner,
            on_tune: None,
            config,
        })
    }

    /// Current configuration, including any auto-tune revisions.
    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    /// The root boundary.
    pub fn boundary(&self) -> Rect {
        self.config.boundary
    }

    /// Register the host callback fired whenever auto-tuning revises the
    /// merge threshold or rebalance interval.
    pub fn on_tune(&mut self, callback: impl FnMut(&TuningUpdate) + 'static) {
        self.on_tune = Some(Box::new(callback));
    }

    // -- Membership --

    /// Whether `entity` has a position in the tree.
    pub fn has(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// The stored position of `entity`.
    pub fn get(&self, entity: Entity) -> Option<SpatialItem> {
        let node = self.locations.get(&entity)?;
        self.nodes[*node]
            .items
            .iter()
            .find(|item| item.entity == entity)
            .copied()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no entity is tracked.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    // -- Mutation --

    /// Insert an item. Returns `false`, storing nothing, if the point lies
    /// outside the root boundary.
    ///
    /// Inserting an entity that is already tracked moves it.
    pub fn insert(&mut self, item: SpatialItem) -> bool {
        if !self.config.boundary.contains(item.x, item.y) {
            debug!(entity = %item.entity, x = item.x, y = item.y, "insert outside boundary rejected");
            return false;
        }
        if self.locations.contains_key(&item.entity) {
            return self.update(item.entity, item.x, item.y);
        }
        self.insert_from(ROOT, item);
        true
    }

    /// Move `entity` to `(x, y)`, inserting it if it is not tracked yet.
    ///
    /// A move that stays inside the entity's current leaf is applied in
    /// place; any other move removes and re-inserts from the root. Always
    /// returns `true`. A point outside the root boundary is not stored, and
    /// an entity moved there is dropped from the tree, so check [`has`]
    /// to learn whether it is still indexed.
    ///
    /// [`has`]: QuadTree::has
    pub fn update(&mut self, entity: Entity, x: f64, y: f64) -> bool {
        if !self.config.boundary.contains(x, y) {
            if self.remove(entity) {
                debug!(%entity, x, y, "moved outside boundary; evicted");
            }
            return true;
        }
        let Some(&id) = self.locations.get(&entity) else {
            self.insert_from(ROOT, SpatialItem::new(entity, x, y));
            return true;
        };

        let node = &mut self.nodes[id];
        let moved_in_place = node.children.is_none()
            && node.boundary.contains(x, y)
            && node
                .items
                .iter_mut()
                .find(|item| item.entity == entity)
                .map(|item| {
                    item.x = x;
                    item.y = y;
                })
                .is_some();
        if moved_in_place {
            return true;
        }

        self.remove(entity);
        self.insert_from(ROOT, SpatialItem::new(entity, x, y));
        true
    }

    /// Remove `entity`. Returns `false` if it was not tracked.
    ///
    /// Ancestors whose subtree population falls to
    /// `capacity * merge_threshold` or below collapse back into leaves.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(id) = self.locations.remove(&entity) else {
            return false;
        };
        let items = &mut self.nodes[id].items;
        if let Some(pos) = items.iter().position(|item| item.entity == entity) {
            items.swap_remove(pos);
        }
        self.collapse_upward(id);
        true
    }

    /// Reset to a single empty leaf at the configured boundary and zero
    /// every counter.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::leaf(self.config.boundary, 0, None));
        self.free.clear();
        self.locations.clear();
        self.splits = 0;
        self.merges = 0;
        self.tuner.reset();
    }

    // -- Queries --

    /// Every item whose point lies within `range` (edges inclusive).
    ///
    /// Subtrees whose boundary does not touch `range` are skipped without
    /// visiting their children.
    pub fn query(&self, range: &Rect) -> Vec<SpatialItem> {
        let mut found = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.boundary.intersects(range) {
                continue;
            }
            found.extend(
                node.items
                    .iter()
                    .filter(|item| range.contains(item.x, item.y))
                    .copied(),
            );
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        found
    }

    /// Every item within Euclidean distance `radius` of `(x, y)`.
    pub fn query_radius(&self, x: f64, y: f64, radius: f64) -> Vec<SpatialItem> {
        let radius_squared = radius * radius;
        let mut found = self.query(&Rect::around(x, y, radius));
        found.retain(|item| item.distance_squared(x, y) <= radius_squared);
        found
    }

    /// Shape and activity counters.
    pub fn metrics(&self) -> QuadTreeMetrics {
        let items = self.locations.len();
        let nodes = self.node_count();
        QuadTreeMetrics {
            items,
            nodes,
            splits: self.splits,
            merges: self.merges,
            avg_items_per_node: items as f64 / nodes as f64,
        }
    }

    // -- Auto-tuning --

    /// Feed simulated time to the auto-tune timer. Runs a pass and returns
    /// the revision when one is due and changes something. Does nothing
    /// unless `auto_tune` is enabled.
    pub fn tick(&mut self, dt: f64) -> Option<TuningUpdate> {
        if !self.config.auto_tune {
            return None;
        }
        if !self.tuner.advance(dt, self.config.rebalance_interval) {
            return None;
        }
        self.rebalance()
    }

    /// Run an auto-tune pass now, regardless of the timer.
    pub fn rebalance(&mut self) -> Option<TuningUpdate> {
        let metrics = self.metrics();
        let update = self.tuner.evaluate(&metrics, &self.config)?;
        info!(
            from_threshold = self.config.merge_threshold,
            to_threshold = update.merge_threshold,
            interval = update.rebalance_interval,
            splits = metrics.splits,
            merges = metrics.merges,
            "spatial index retuned"
        );
        self.config.merge_threshold = update.merge_threshold;
        self.config.rebalance_interval = update.rebalance_interval;
        if let Some(callback) = self.on_tune.as_mut() {
            callback(&update);
        }
        Some(update)
    }

    // -- Internals --

    fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Descend from `start` and store the item, splitting full leaves on
    /// the way. The point must lie within `start`'s boundary.
    fn insert_from(&mut self, start: NodeId, item: SpatialItem) {
        let mut id = start;
        loop {
            let node = &self.nodes[id];
            if let Some(children) = node.children {
                let claimed = children
                    .into_iter()
                    .find(|&child| self.nodes[child].boundary.contains(item.x, item.y));
                match claimed {
                    Some(child) => {
                        id = child;
                        continue;
                    }
                    // Rounding left the point on no child; keep it here rather than lose it.
                    None => break,
                }
            }
            if node.items.len() < self.config.capacity || node.depth >= self.config.max_depth {
                break;
            }
            self.subdivide(id);
        }
        self.nodes[id].items.push(item);
        self.locations.insert(item.entity, id);
    }

    /// Turn leaf `id` into four child leaves and push its items down.
    fn subdivide(&mut self, id: NodeId) {
        let (boundary, depth) = {
            let node = &self.nodes[id];
            (node.boundary, node.depth)
        };
        let quadrants = boundary.quadrants();
        let children = quadrants.map(|quadrant| self.alloc(Node::leaf(quadrant, depth + 1, Some(id))));
        let items = std::mem::take(&mut self.nodes[id].items);
        self.nodes[id].children = Some(children);
        self.splits += 1;
        debug!(node = id, depth, items = items.len(), "quadtree node split");

        for item in items {
            self.insert_from(id, item);
        }
    }

    /// Walk from `start` towards the root, collapsing subdivided nodes
    /// whose population is low enough. Populations only grow towards the
    /// root, so the walk stops at the first subdivided node that stays.
    fn collapse_upward(&mut self, start: NodeId) {
        let limit = self.config.merge_population().floor() as usize;
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if self.nodes[id].children.is_some() {
                if self.population_within(id, limit).is_none() {
                    return;
                }
                self.merge(id);
            }
            cursor = self.nodes[id].parent;
        }
    }

    /// Number of items in the subtree at `id`, or `None` once it exceeds `limit`.
    fn population_within(&self, id: NodeId, limit: usize) -> Option<usize> {
        let mut total = 0usize;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            total += node.items.len();
            if total > limit {
                return None;
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        Some(total)
    }

    /// Gather every descendant item into `id` and free its descendants.
    fn merge(&mut self, id: NodeId) {
        let Some(children) = self.nodes[id].children.take() else {
            return;
        };
        let mut gathered = Vec::new();
        let mut stack = Vec::from(children);
        let mut freed = 0usize;
        while let Some(child) = stack.pop() {
            let node = &mut self.nodes[child];
            gathered.append(&mut node.items);
            if let Some(grandchildren) = node.children.take() {
                stack.extend(grandchildren);
            }
            node.parent = None;
            self.free.push(child);
            freed += 1;
        }
        for item in &gathered {
            self.locations.insert(item.entity, id);
        }
        self.nodes[id].items.extend(gathered);
        self.merges += 1;
        debug!(
            node = id,
            freed,
            items = self.nodes[id].items.len(),
            "quadtree subtree merged"
        );
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }
}
