//! Launchers and the ballistic missiles they fire.

use atlas_core::{EntityId, SimError, SimResult};
use atlas_shared::Vec3;
use atlas_world::Body;

use super::{report_impact, slot, solid_hit, sweep};
use crate::commands::Spawn;
use crate::components::{GameComponents, Launcher, Missile, Transform};
use crate::events::{GameEvents, Impact};
use crate::physics::integrate_ballistic;
use crate::resources::MissileResource;
use crate::system::{PhaseContext, System, SystemAccess};

/// Fires, flies and detonates missiles.
///
/// - create: every launcher whose cooldown ran out queues one missile
/// - dynamics: gravity and drag, swept proxy, lifetime
/// - logic: the first solid static overlap is an impact
pub struct MissileSystem {
    components: GameComponents,
    events: GameEvents,
}

impl MissileSystem {
    /// Creates the system.
    #[must_use]
    pub const fn new(components: GameComponents, events: GameEvents) -> Self {
        Self { components, events }
    }

    /// An entity carrying `launcher`.
    #[must_use]
    pub fn launcher(&self, launcher: Launcher) -> Spawn {
        Spawn::new().with(self.components.launcher, launcher)
    }

    fn missile(&self, owner: EntityId, launcher: &Launcher, resource: &MissileResource) -> Spawn {
        Spawn::new()
            .with_body(Body::moving(launcher.muzzle, Vec3::splat(resource.half_extent)))
            .with(
                self.components.transform,
                Transform::moving(launcher.muzzle, launcher.aim, launcher.muzzle_speed),
            )
            .with(
                self.components.missile,
                Missile {
                    owner,
                    resource: resource.id,
                    age: 0.0,
                },
            )
    }
}

impl System for MissileSystem {
    fn name(&self) -> &str {
        "missile"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new()
            .write(self.components.launcher)
            .write(self.components.transform)
            .write(self.components.missile)
            .read(self.components.trigger_volume)
            .spatial_write()
    }

    fn update_create(&mut self, ctx: &PhaseContext<'_>, dt: f32) -> SimResult<()> {
        let mut launchers = ctx.registry.write::<Launcher>(self.components.launcher)?;

        let armed = ctx
            .registry
            .with_component(self.components.launcher)
            .filter_map(|id| launchers.get(slot(id)).map(|l| (id, l)))
            .filter(|(_, l)| l.remaining > 0)
            .map(|(id, l)| Ok((id, ctx.resources.missile(l.resource)?)))
            .collect::<SimResult<Vec<_>>>()?;

        for (id, resource) in armed {
            let Some(launcher) = launchers.get_mut(slot(id)) else {
                continue;
            };
            launcher.cooldown -= dt;
            if launcher.cooldown > 0.0 {
                continue;
            }
            launcher.cooldown += launcher.interval;
            launcher.remaining -= 1;
            ctx.commands.spawn(self.missile(id, launcher, resource));
            tracing::trace!(launcher = %id, left = launcher.remaining, "missile fired");
        }
        Ok(())
    }

    fn update_dynamics(&mut self, ctx: &PhaseContext<'_>, dt: f32) -> SimResult<()> {
        let mut transforms = ctx.registry.write::<Transform>(self.components.transform)?;
        let mut missiles = ctx.registry.write::<Missile>(self.components.missile)?;

        let flights = ctx
            .registry
            .with_component(self.components.missile)
            .filter(|&id| transforms.contains(slot(id)))
            .map(|id| {
                let missile = missiles.get(slot(id)).ok_or(SimError::entity(id))?;
                Ok((id, ctx.resources.missile(missile.resource)?))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let mut broad_phase = ctx.broad_phase.write();
        let mut grid = ctx.grid.write();
        for (id, resource) in flights {
            let (Some(transform), Some(missile)) =
                (transforms.get_mut(slot(id)), missiles.get_mut(slot(id)))
            else {
                continue;
            };

            missile.age += dt;
            if missile.age >= resource.lifetime {
                tracing::trace!(missile = %id, "missile expired");
                ctx.commands.despawn(id);
                continue;
            }

            let start = transform.position;
            integrate_ballistic(transform, resource.mass, resource.friction, dt);
            let inside = sweep(
                &mut broad_phase,
                &mut grid,
                id,
                start,
                transform.position,
                resource.half_extent,
            )?;
            if !inside {
                ctx.commands.despawn(id);
            }
        }
        Ok(())
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        let transforms = ctx.registry.read::<Transform>(self.components.transform)?;
        let missiles = ctx.registry.read::<Missile>(self.components.missile)?;

        for id in ctx.registry.with_component(self.components.missile) {
            let Some(missile) = missiles.get(slot(id)) else {
                continue;
            };
            let Some(target) = solid_hit(ctx, id, missile.owner, self.components.trigger_volume)
            else {
                continue;
            };
            let resource = ctx.resources.missile(missile.resource)?;
            let impact = Impact {
                source: id,
                position: transforms.get(slot(id)).map_or(Vec3::ZERO, |t| t.position),
                explosion: i64::from(resource.explosion_id),
            };
            report_impact(ctx, &self.events, target, &impact)?;
            ctx.commands.despawn(id);
        }
        Ok(())
    }
}
