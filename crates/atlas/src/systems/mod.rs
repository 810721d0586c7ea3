//! # Sample Systems
//!
//! Gameplay systems built on the [`System`](crate::system::System) contract.
//! They stand in for the external collaborators and exercise every part of
//! the substrate.
//!
//! | System           | Create        | Dynamics                  | Logic                     |
//! |------------------|---------------|---------------------------|---------------------------|
//! | `MissileSystem`  | launchers fire| ballistic motion, swept   | impact events, despawn    |
//! | `BulletSystem`   |               | straight motion, swept    | impact events, despawn    |
//! | `TriggerSystem`  |               |                           | enter/leave events        |
//! | `DoorSystem`     |               |                           | open/close on crossings   |

pub mod bullet;
pub mod door;
pub mod missile;
pub mod trigger;

pub use bullet::BulletSystem;
pub use door::{spawn_door, DoorSystem};
pub use missile::MissileSystem;
pub use trigger::TriggerSystem;

use atlas_core::{ComponentTypeId, EntityId, SimError, SimResult};
use atlas_shared::{Aabb, Vec3};
use atlas_world::{ActiveGrid, BroadPhase, Mobility};

use crate::events::{GameEvents, Impact};
use crate::system::PhaseContext;

/// First static, solid entity a projectile overlaps, ignoring its owner.
fn solid_hit(
    ctx: &PhaseContext<'_>,
    projectile: EntityId,
    owner: EntityId,
    trigger_volume: ComponentTypeId,
) -> Option<EntityId> {
    let broad_phase = ctx.broad_phase.read();
    ctx.overlaps_of(projectile).find(|&other| {
        other != owner
            && matches!(broad_phase.mobility(other), Ok(Mobility::Static))
            && !ctx.registry.has_component(other, trigger_volume)
    })
}

/// Sends an impact to `target` if it listens for impacts.
fn report_impact(
    ctx: &PhaseContext<'_>,
    events: &GameEvents,
    target: EntityId,
    impact: &Impact,
) -> SimResult<()> {
    if !ctx.bus.is_subscribed(target, events.impact) {
        return Ok(());
    }
    let event = events.write_impact(ctx.bus, impact)?;
    ctx.bus.send_event(target, event)?;
    tracing::debug!(projectile = %impact.source, %target, "impact");
    Ok(())
}

/// Moves a projectile's proxy to its swept box and its grid cell to the
/// end position.
///
/// Returns false if the projectile left the window or the world and should
/// be despawned.
fn sweep(
    broad_phase: &mut BroadPhase,
    grid: &mut ActiveGrid,
    id: EntityId,
    start: Vec3,
    end: Vec3,
    half_extent: f32,
) -> SimResult<bool> {
    if broad_phase.contains(id) {
        let half = Vec3::splat(half_extent);
        broad_phase.set_swept(id, Aabb::from_center(start, half), Aabb::from_center(end, half))?;
    }
    match grid.update_entity_cell(id, end) {
        Ok(_) => Ok(true),
        Err(SimError::OutOfRange(bound)) => {
            tracing::debug!(entity = %id, %bound, "projectile left the simulated area");
            Ok(false)
        }
        Err(error) => Err(error),
    }
}

fn slot(id: EntityId) -> usize {
    id.index() as usize
}
