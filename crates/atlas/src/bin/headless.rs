//! # ATLAS Headless
//!
//! Runs the demo scene without any renderer and logs one line per frame.
//!
//! ```bash
//! atlas_headless --frames 600
//! atlas_headless --config sim.toml --resources templates.toml --walk 2.0
//! RUST_LOG=atlas=debug atlas_headless
//! ```
//!
//! Scene: a missile launcher lobbing at a wall, a turret firing bullets
//! through a door's trigger volume, and an optional focus walk along +X that
//! streams cells out and back in.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use atlas::systems::{spawn_door, BulletSystem, DoorSystem, MissileSystem, TriggerSystem};
use atlas::{
    BulletResource, GameComponents, GameEvents, Launcher, MissileResource, PhaseContext,
    ResourceTable, Scheduler, SimulationConfig, System, SystemAccess, World,
};
use atlas_core::{EntityId, SchemaBuilder, SimResult};
use atlas_shared::{Vec3, TICK_RATE};
use atlas_world::Body;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "atlas_headless", about = "Run the ATLAS demo scene headless")]
struct Args {
    /// Simulation config (TOML). Defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resource templates (TOML). A built-in set is used when absent.
    #[arg(long)]
    resources: Option<PathBuf>,

    /// Frames to run.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Seconds per frame.
    #[arg(long, default_value_t = 1.0 / TICK_RATE as f32)]
    dt: f32,

    /// Focus movement along +X per frame, in world units.
    #[arg(long, default_value_t = 0.0)]
    walk: f32,

    /// Frames between turret shots.
    #[arg(long, default_value_t = 20)]
    fire_every: u64,
}

/// Counts impacts delivered to the wall.
struct ImpactCounter {
    events: GameEvents,
    wall: EntityId,
    hits: u32,
}

impl System for ImpactCounter {
    fn name(&self) -> &str {
        "impact_counter"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new()
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        for delivery in ctx.deliveries_for(self.wall) {
            if delivery.event_type != self.events.impact {
                continue;
            }
            let impact = self.events.read_impact(ctx.bus, delivery.event)?;
            self.hits += 1;
            tracing::info!(
                source = %impact.source,
                x = impact.position.x,
                y = impact.position.y,
                explosion = impact.explosion,
                hits = self.hits,
                "wall hit"
            );
        }
        Ok(())
    }
}

fn builtin_resources() -> SimResult<ResourceTable> {
    let mut table = ResourceTable::new();
    table.insert_missile(MissileResource {
        id: 1,
        half_extent: 0.5,
        mass: 20.0,
        friction: 0.5,
        mesh_id: 7,
        explosion_id: 3,
        lifetime: 10.0,
    })?;
    table.insert_bullet(BulletResource {
        id: 1,
        speed: 400.0,
        range: 300.0,
        half_extent: 0.05,
    })?;
    Ok(table)
}

fn run(args: &Args) -> SimResult<()> {
    let config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    let resources = match &args.resources {
        Some(path) => ResourceTable::load(path)?,
        None => builtin_resources()?,
    };
    let bullet = resources.bullet(1)?.clone();

    let mut schema = SchemaBuilder::new();
    let events = GameEvents::register(&mut schema)?;
    let mut world = World::new(config.clone(), schema.build(), Arc::new(resources))?;
    let components = GameComponents::register(world.registry_mut())?;
    world.flush_streaming(std::time::Duration::from_secs(5));

    // Scene
    let wall = world.spawn(Some(Body::fixed(
        Vec3::new(60.0, 0.0, 0.0),
        Vec3::new(1.0, 20.0, 20.0),
    )))?;
    world.bus().register_event_receiver(wall, events.impact)?;

    let missiles = MissileSystem::new(components, events);
    world.spawn_with(missiles.launcher(Launcher {
        muzzle: Vec3::new(0.0, 2.0, 0.0),
        aim: Vec3::new(1.0, 0.4, 0.0),
        muzzle_speed: 30.0,
        resource: 1,
        interval: 1.5,
        cooldown: 0.0,
        remaining: 20,
    }))?;

    let (door, _) = spawn_door(
        &mut world,
        &components,
        &events,
        Body::fixed(Vec3::new(0.0, 0.0, -40.0), Vec3::new(2.0, 3.0, 0.25)),
        Body::fixed(Vec3::new(0.0, 0.0, -40.0), Vec3::new(4.0, 4.0, 4.0)),
    )?;
    let turret = world.spawn(None)?;
    let gun = BulletSystem::new(components, events);

    let mut scheduler = Scheduler::from_config(&config);
    scheduler.add_system(missiles)?;
    scheduler.add_system(BulletSystem::new(components, events))?;
    scheduler.add_system(TriggerSystem::new(components, events))?;
    scheduler.add_system(DoorSystem::new(components, events))?;
    scheduler.add_system(ImpactCounter {
        events,
        wall,
        hits: 0,
    })?;
    tracing::info!(batches = ?scheduler.batches(), "scheduler ready");

    for frame in 0..args.frames {
        if args.fire_every > 0 && frame % args.fire_every == 0 {
            let shot = gun.spawn(turret, &bullet, Vec3::new(-10.0, 3.5, -40.0), Vec3::X);
            if let Err(error) = world.spawn_with(shot) {
                tracing::warn!(%error, "turret cannot fire");
            }
        }
        if args.walk != 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let x = args.walk * frame as f32;
            world.request_focus(Vec3::new(x, 0.0, 0.0))?;
        }

        let report = scheduler.run_frame(&mut world, args.dt);
        if !report.completed {
            for failure in &report.failures {
                tracing::error!(system = %failure.system, phase = %failure.phase, error = %failure.error, "halted");
            }
            let skipped = scheduler.skip_failed();
            tracing::warn!(?skipped, "skipping failed systems to keep the demo running");
            continue;
        }
        tracing::debug!(
            frame = report.frame,
            entities = world.registry().alive_count(),
            overlaps = report.overlaps,
            deliveries = report.deliveries,
            loads = report.streaming.cells_loaded,
            evictions = report.streaming.cells_evicted,
            door_open = world.registry().has_flag(door, components.door_open),
            total_us = report.timings.total_us,
            "frame"
        );
    }

    let stats = world.flush_streaming(std::time::Duration::from_secs(5));
    tracing::info!(
        frames = args.frames,
        entities = world.registry().alive_count(),
        saves_failed = stats.save_failures,
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "simulation aborted");
            ExitCode::FAILURE
        }
    }
}
