use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tessel_core::{ChangeType, Entity};
use tessel_spatial::{QuadTreeMetrics, Rect};
use tessel_world::{TRANSFORM, Transform, VELOCITY, Velocity, World};
use tracing::info;

/// Fraction of the shorter boundary side an entity may cover per second.
const SPEED_FRACTION: f64 = 0.25;
/// Radius of the proximity cross-check, as a fraction of the boundary width.
const CHECK_RADIUS_FRACTION: f64 = 0.1;

pub struct SimulateArgs {
    pub entities: usize,
    pub ticks: u64,
    pub seed: u64,
    pub config: Option<PathBuf>,
    pub auto_tune: bool,
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
struct TransformEvents {
    added: usize,
    updated: usize,
    removed: usize,
}

impl TransformEvents {
    fn record(&mut self, change: ChangeType) {
        match change {
            ChangeType::Add => self.added += 1,
            ChangeType::Update => self.updated += 1,
            ChangeType::Remove => self.removed += 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    seed: u64,
    ticks: u64,
    elapsed: f64,
    spawned: usize,
    despawned: usize,
    alive: usize,
    transform_events: TransformEvents,
    retunes: usize,
    merge_threshold: f64,
    rebalance_interval: f64,
    metrics: QuadTreeMetrics,
}

pub fn run(args: &SimulateArgs) -> Result<(), String> {
    let mut config = super::load_config(args.config.as_deref())?;
    if args.auto_tune {
        config.spatial.auto_tune = true;
    }
    let boundary = config.spatial.boundary;
    let dt = config.max_delta;
    let mut world = World::new(config).map_err(|e| e.to_string())?;

    let events = Rc::new(RefCell::new(TransformEvents::default()));
    let sink = Rc::clone(&events);
    let subscription = world.on_component_change(TRANSFORM, move |_, _, change| {
        sink.borrow_mut().record(change);
    });
    let retunes = Rc::new(Cell::new(0usize));
    let tuned = Rc::clone(&retunes);
    world.on_spatial_tune(move |_| tuned.set(tuned.get() + 1));

    // Spawn
    let mut rng = StdRng::seed_from_u64(args.seed);
    let speed = boundary.width.min(boundary.height) * SPEED_FRACTION;
    let mut alive: Vec<Entity> = (0..args.entities)
        .map(|_| spawn(&mut world, &mut rng, &boundary, speed))
        .collect();

    // Run, culling every other entity halfway through
    let cull_at = args.ticks / 2;
    let mut despawned = 0;
    for tick in 0..args.ticks {
        if tick == cull_at {
            let mut position = 0usize;
            alive.retain(|&entity| {
                position += 1;
                if position % 2 == 0 {
                    world.despawn(entity);
                    despawned += 1;
                    false
                } else {
                    true
                }
            });
        }
        move_all(&mut world, &boundary, dt);
        world.tick(dt);
    }

    verify_index(&world, &boundary)?;
    world.unsubscribe(subscription);

    let spatial = world.spatial_config_snapshot();
    let report = Report {
        seed: args.seed,
        ticks: args.ticks,
        elapsed: world.clock().elapsed(),
        spawned: args.entities,
        despawned,
        alive: alive.len(),
        transform_events: events.take(),
        retunes: retunes.get(),
        merge_threshold: spatial.merge_threshold,
        rebalance_interval: spatial.rebalance_interval,
        metrics: world.spatial_metrics(),
    };
    info!(
        ticks = report.ticks,
        alive = report.alive,
        nodes = report.metrics.nodes,
        "simulation finished"
    );

    if args.json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn spawn(world: &mut World, rng: &mut StdRng, boundary: &Rect, speed: f64) -> Entity {
    let entity = world.create_entity();
    let x = rng.random_range(boundary.x..=boundary.right());
    let y = rng.random_range(boundary.y..=boundary.bottom());
    let velocity = Velocity {
        dx: rng.random_range(-speed..=speed),
        dy: rng.random_range(-speed..=speed),
    };
    world.add_component(entity, TRANSFORM, Transform::at(x, y));
    world.add_component(entity, VELOCITY, velocity);
    entity
}

/// Integrate velocities, reflecting off the boundary edges.
fn move_all(world: &mut World, boundary: &Rect, dt: f64) {
    let mut movers: Vec<(Entity, Transform, Velocity)> = world
        .query(&[TRANSFORM.as_str(), VELOCITY.as_str()])
        .into_iter()
        .filter_map(|row| {
            let transform = *row.values[0].as_transform()?;
            let velocity = *row.values[1].as_velocity()?;
            Some((row.entity, transform, velocity))
        })
        .collect();
    // Store iteration order is unspecified; fix it so runs replay per seed.
    movers.sort_by_key(|(entity, _, _)| *entity);

    for (entity, mut transform, mut velocity) in movers {
        transform.x += velocity.dx * dt;
        transform.y += velocity.dy * dt;
        let bounced_x = reflect(&mut transform.x, &mut velocity.dx, boundary.x, boundary.right());
        let bounced_y = reflect(&mut transform.y, &mut velocity.dy, boundary.y, boundary.bottom());
        world.add_component(entity, TRANSFORM, transform);
        if bounced_x || bounced_y {
            world.add_component(entity, VELOCITY, velocity);
        }
    }
}

fn reflect(position: &mut f64, velocity: &mut f64, min: f64, max: f64) -> bool {
    let reflected = if *position < min {
        2.0 * min - *position
    } else if *position > max {
        2.0 * max - *position
    } else {
        return false;
    };
    *position = reflected.clamp(min, max);
    *velocity = -*velocity;
    true
}

/// Cross-check the index against the store: every transform tracked at
/// its exact coordinates, and a radius query agreeing with a linear scan.
fn verify_index(world: &World, boundary: &Rect) -> Result<(), String> {
    let store = world.store();
    let metrics = world.spatial_metrics();
    if metrics.items != store.kind_len(TRANSFORM.as_str()) {
        return Err(format!(
            "spatial index holds {} items but {} entities have a transform",
            metrics.items,
            store.kind_len(TRANSFORM.as_str())
        ));
    }
    for (entity, value) in store.iter_kind(TRANSFORM.as_str()) {
        let Some((x, y)) = value.position() else {
            continue;
        };
        let tracked = world.tracked_position(entity);
        if tracked.is_none_or(|item| item.x != x || item.y != y) {
            return Err(format!("spatial index out of sync for entity {entity}"));
        }
    }

    let (cx, cy) = (
        boundary.x + boundary.width / 2.0,
        boundary.y + boundary.height / 2.0,
    );
    let radius = boundary.width * CHECK_RADIUS_FRACTION;
    let mut indexed: Vec<Entity> = world
        .query_radius(cx, cy, radius)
        .into_iter()
        .map(|item| item.entity)
        .collect();
    let mut scanned: Vec<Entity> = store
        .iter_kind(TRANSFORM.as_str())
        .filter_map(|(entity, value)| {
            let (x, y) = value.position()?;
            let (dx, dy) = (x - cx, y - cy);
            (dx * dx + dy * dy <= radius * radius).then_some(entity)
        })
        .collect();
    indexed.sort();
    scanned.sort();
    if indexed != scanned {
        return Err(format!(
            "radius query found {} entities, linear scan found {}",
            indexed.len(),
            scanned.len()
        ));
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!(
        "  {} {}",
        "Simulation".bold(),
        format!(
            "({} ticks, seed={}, {} entities)",
            report.ticks, report.seed, report.spawned
        )
        .dimmed()
    );
    println!(
        "  {:.2}s simulated, {} alive, {} despawned",
        report.elapsed, report.alive, report.despawned
    );
    println!("  Index in sync: {}", "yes".green());
    println!();

    println!("  {}", "Spatial Index".bold().underline());
    println!();

    let m = &report.metrics;
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["items".to_string(), m.items.to_string()]);
    table.add_row(vec!["nodes".to_string(), m.nodes.to_string()]);
    table.add_row(vec!["splits".to_string(), m.splits.to_string()]);
    table.add_row(vec!["merges".to_string(), m.merges.to_string()]);
    table.add_row(vec![
        "avg items/node".to_string(),
        format!("{:.2}", m.avg_items_per_node),
    ]);
    table.add_row(vec![
        "merge threshold".to_string(),
        format!("{:.2}", report.merge_threshold),
    ]);
    table.add_row(vec![
        "rebalance interval".to_string(),
        format!("{:.2}s", report.rebalance_interval),
    ]);
    table.add_row(vec!["retunes".to_string(), report.retunes.to_string()]);
    println!("{table}");
    println!();

    let events = &report.transform_events;
    println!(
        "  Transform events: {} added, {} updated, {} removed",
        events.added, events.updated, events.removed
    );
}
