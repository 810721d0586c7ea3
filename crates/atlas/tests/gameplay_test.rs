//! # Gameplay Systems Integration Test
//!
//! The sample systems running together: a bullet crossing a trigger volume
//! opens and then closes the door that owns it, and a missile fired by a
//! launcher reports its impact to the wall it hits.

use std::sync::Arc;

use atlas::systems::{spawn_door, BulletSystem, DoorSystem, MissileSystem, TriggerSystem};
use atlas::{
    BulletResource, Door, FailurePolicy, GameComponents, GameEvents, Impact, Launcher,
    MissileResource, PhaseContext, ResourceTable, Scheduler, SimulationConfig, System,
    SystemAccess, World,
};
use atlas_core::{EntityId, SchemaBuilder, SimResult};
use atlas_shared::Vec3;
use atlas_world::Body;
use parking_lot::Mutex;

fn config() -> SimulationConfig {
    SimulationConfig {
        window_size: 3,
        lattice: [16, 8, 16],
        inline_io: true,
        parallel: false,
        ..SimulationConfig::default()
    }
}

fn resources() -> ResourceTable {
    let mut table = ResourceTable::new();
    table
        .insert_bullet(BulletResource {
            id: 1,
            speed: 5.0,
            range: 100.0,
            half_extent: 0.1,
        })
        .unwrap();
    table
        .insert_missile(MissileResource {
            id: 1,
            half_extent: 0.5,
            mass: 1.0,
            friction: 0.0,
            mesh_id: 0,
            explosion_id: 9,
            lifetime: 30.0,
        })
        .unwrap();
    table
}

fn setup() -> (World, GameComponents, GameEvents) {
    let mut schema = SchemaBuilder::new();
    let events = GameEvents::register(&mut schema).unwrap();
    let mut world = World::new(config(), schema.build(), Arc::new(resources())).unwrap();
    let components = GameComponents::register(world.registry_mut()).unwrap();
    (world, components, events)
}

fn door_state(world: &World, components: &GameComponents, door: EntityId) -> (bool, Door) {
    (
        world.registry().has_flag(door, components.door_open),
        world.registry().get::<Door>(door, components.door).unwrap(),
    )
}

#[test]
fn test_bullet_through_trigger_opens_and_closes_door() {
    let (mut world, components, events) = setup();
    let (door, trigger) = spawn_door(
        &mut world,
        &components,
        &events,
        Body::fixed(Vec3::new(0.0, 0.0, 20.0), Vec3::new(2.0, 3.0, 0.25)),
        Body::fixed(Vec3::ZERO, Vec3::splat(4.0)),
    )
    .unwrap();
    assert!(world.bus().is_subscribed(door, events.enter_trigger));

    let turret = world.spawn(None).unwrap();
    let gun = BulletSystem::new(components, events);
    let template = world.resources().bullet(1).unwrap().clone();
    let bullet = world
        .spawn_with(gun.spawn(turret, &template, Vec3::new(-10.0, 0.0, 0.0), Vec3::X))
        .unwrap();

    let mut scheduler = Scheduler::new(FailurePolicy::Halt, false);
    scheduler.add_system(gun).unwrap();
    scheduler
        .add_system(TriggerSystem::new(components, events))
        .unwrap();
    scheduler.add_system(DoorSystem::new(components, events)).unwrap();

    // x: -10 -> -5, still short of the volume.
    assert!(scheduler.run_frame(&mut world, 1.0).completed);
    assert!(!door_state(&world, &components, door).0);

    // x: -5 -> 0, enters; the crossing is delivered next frame.
    assert!(scheduler.run_frame(&mut world, 1.0).completed);
    assert!(world
        .overlaps()
        .contains(&(bullet.min(trigger), bullet.max(trigger))));
    assert!(!door_state(&world, &components, door).0);

    // x: 0 -> 5, door opens.
    assert!(scheduler.run_frame(&mut world, 1.0).completed);
    let (open, state) = door_state(&world, &components, door);
    assert!(open);
    assert_eq!(
        state,
        Door {
            occupants: 1,
            times_opened: 1,
        }
    );

    // x: 5 -> 10, leaves; then the door closes.
    assert!(scheduler.run_frame(&mut world, 1.0).completed);
    assert!(door_state(&world, &components, door).0);
    assert!(scheduler.run_frame(&mut world, 1.0).completed);
    let (open, state) = door_state(&world, &components, door);
    assert!(!open);
    assert_eq!(
        state,
        Door {
            occupants: 0,
            times_opened: 1,
        }
    );

    // Triggers are not solid: the bullet flew on.
    assert!(world.registry().is_alive(bullet));
}

#[test]
fn test_dead_door_drops_crossings() {
    let (mut world, components, events) = setup();
    let (door, _) = spawn_door(
        &mut world,
        &components,
        &events,
        Body::fixed(Vec3::new(0.0, 0.0, 20.0), Vec3::new(2.0, 3.0, 0.25)),
        Body::fixed(Vec3::ZERO, Vec3::splat(4.0)),
    )
    .unwrap();
    world.despawn(door).unwrap();

    let turret = world.spawn(None).unwrap();
    let gun = BulletSystem::new(components, events);
    let template = world.resources().bullet(1).unwrap().clone();
    world
        .spawn_with(gun.spawn(turret, &template, Vec3::new(-3.0, 0.0, 0.0), Vec3::X))
        .unwrap();

    let mut scheduler = Scheduler::new(FailurePolicy::Halt, false);
    scheduler.add_system(gun).unwrap();
    scheduler
        .add_system(TriggerSystem::new(components, events))
        .unwrap();
    scheduler.add_system(DoorSystem::new(components, events)).unwrap();

    for _ in 0..3 {
        let report = scheduler.run_frame(&mut world, 1.0);
        assert!(report.completed);
        assert!(report.failures.is_empty());
        assert_eq!(report.deliveries, 0);
    }
}

/// Collects impacts delivered to one entity.
struct ImpactLog {
    events: GameEvents,
    target: EntityId,
    seen: Arc<Mutex<Vec<Impact>>>,
}

impl System for ImpactLog {
    fn name(&self) -> &str {
        "impact_log"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new()
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        for delivery in ctx.deliveries_for(self.target) {
            let impact = self.events.read_impact(ctx.bus, delivery.event)?;
            self.seen.lock().push(impact);
        }
        Ok(())
    }
}

#[test]
fn test_launcher_fires_missile_into_wall() {
    let (mut world, components, events) = setup();
    let wall = world
        .spawn(Some(Body::fixed(
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(1.0, 10.0, 10.0),
        )))
        .unwrap();
    world.bus().register_event_receiver(wall, events.impact).unwrap();

    let missiles = MissileSystem::new(components, events);
    let launcher = world
        .spawn_with(missiles.launcher(Launcher {
            muzzle: Vec3::new(0.0, 2.0, 0.0),
            aim: Vec3::X,
            muzzle_speed: 20.0,
            resource: 1,
            interval: 10.0,
            cooldown: 0.0,
            remaining: 1,
        }))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(FailurePolicy::Halt, false);
    scheduler.add_system(missiles).unwrap();
    scheduler
        .add_system(ImpactLog {
            events,
            target: wall,
            seen: Arc::clone(&seen),
        })
        .unwrap();

    // Fired in create, flies through the wall in dynamics, hits in logic.
    let report = scheduler.run_frame(&mut world, 0.5);
    assert!(report.completed);
    assert_eq!(world.registry().with_component(components.missile).count(), 0);
    let fired = world
        .registry()
        .get::<Launcher>(launcher, components.launcher)
        .unwrap();
    assert_eq!(fired.remaining, 0);
    assert!(seen.lock().is_empty());

    // Delivered next frame; the launcher is spent.
    let report = scheduler.run_frame(&mut world, 0.5);
    assert!(report.completed);
    assert_eq!(report.deliveries, 1);
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].explosion, 9);
    assert_eq!(seen[0].position.x, 10.0);
    assert!(world.registry().is_alive(launcher));
    assert_eq!(world.registry().with_component(components.missile).count(), 0);
}
