//! Straight-flying bullets.
//!
//! A bullet can cover many times its own size in one frame, so its proxy is
//! the box swept between the start and end of the step.

use atlas_core::{EntityId, SimError, SimResult};
use atlas_shared::Vec3;
use atlas_world::Body;

use super::{report_impact, slot, solid_hit, sweep};
use crate::commands::Spawn;
use crate::components::{Bullet, GameComponents, Transform};
use crate::events::{GameEvents, Impact};
use crate::physics::advance_straight;
use crate::resources::BulletResource;
use crate::system::{PhaseContext, System, SystemAccess};

/// Moves bullets and reports what they hit.
pub struct BulletSystem {
    components: GameComponents,
    events: GameEvents,
}

impl BulletSystem {
    /// Creates the system.
    #[must_use]
    pub const fn new(components: GameComponents, events: GameEvents) -> Self {
        Self { components, events }
    }

    /// A bullet fired by `owner` from `position` along `direction`.
    #[must_use]
    pub fn spawn(
        &self,
        owner: EntityId,
        resource: &BulletResource,
        position: Vec3,
        direction: Vec3,
    ) -> Spawn {
        Spawn::new()
            .with_body(Body::moving(position, Vec3::splat(resource.half_extent)))
            .with(
                self.components.transform,
                Transform::moving(position, direction, resource.speed),
            )
            .with(
                self.components.bullet,
                Bullet {
                    owner,
                    resource: resource.id,
                    travelled: 0.0,
                },
            )
    }
}

impl System for BulletSystem {
    fn name(&self) -> &str {
        "bullet"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new()
            .write(self.components.transform)
            .write(self.components.bullet)
            .read(self.components.trigger_volume)
            .spatial_write()
    }

    fn update_dynamics(&mut self, ctx: &PhaseContext<'_>, dt: f32) -> SimResult<()> {
        let mut transforms = ctx.registry.write::<Transform>(self.components.transform)?;
        let mut bullets = ctx.registry.write::<Bullet>(self.components.bullet)?;

        // Resolve every template before moving anything.
        let flights = ctx
            .registry
            .with_component(self.components.bullet)
            .filter(|&id| transforms.contains(slot(id)))
            .map(|id| {
                let bullet = bullets.get(slot(id)).ok_or(SimError::entity(id))?;
                Ok((id, ctx.resources.bullet(bullet.resource)?))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let mut broad_phase = ctx.broad_phase.write();
        let mut grid = ctx.grid.write();
        for (id, resource) in flights {
            let (Some(transform), Some(bullet)) =
                (transforms.get_mut(slot(id)), bullets.get_mut(slot(id)))
            else {
                continue;
            };

            let start = transform.position;
            bullet.travelled += advance_straight(transform, resource.speed, dt);
            let inside = sweep(
                &mut broad_phase,
                &mut grid,
                id,
                start,
                transform.position,
                resource.half_extent,
            )?;
            if !inside || bullet.travelled >= resource.range {
                ctx.commands.despawn(id);
            }
        }
        Ok(())
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        let transforms = ctx.registry.read::<Transform>(self.components.transform)?;
        let bullets = ctx.registry.read::<Bullet>(self.components.bullet)?;

        for id in ctx.registry.with_component(self.components.bullet) {
            let Some(bullet) = bullets.get(slot(id)) else {
                continue;
            };
            let Some(target) = solid_hit(ctx, id, bullet.owner, self.components.trigger_volume)
            else {
                continue;
            };
            let position = transforms.get(slot(id)).map_or(Vec3::ZERO, |t| t.position);
            let impact = Impact {
                source: id,
                position,
                explosion: 0,
            };
            report_impact(ctx, &self.events, target, &impact)?;
            ctx.commands.despawn(id);
        }
        Ok(())
    }
}
