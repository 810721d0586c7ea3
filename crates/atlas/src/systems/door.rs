//! Doors opened by their trigger volumes.

use atlas_core::{EntityId, SimResult};
use atlas_world::Body;

use super::slot;
use crate::commands::Spawn;
use crate::components::{Door, GameComponents, TriggerVolume};
use crate::events::GameEvents;
use crate::system::{PhaseContext, System, SystemAccess};
use crate::world::World;

/// Counts occupants from trigger crossings; a door with at least one
/// occupant is open (`door_open` flag set).
pub struct DoorSystem {
    components: GameComponents,
    events: GameEvents,
}

impl DoorSystem {
    /// Creates the system.
    #[must_use]
    pub const fn new(components: GameComponents, events: GameEvents) -> Self {
        Self { components, events }
    }
}

impl System for DoorSystem {
    fn name(&self) -> &str {
        "door"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new().write(self.components.door)
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        let mut doors = ctx.registry.write::<Door>(self.components.door)?;

        for delivery in ctx.deliveries {
            let entering = delivery.event_type == self.events.enter_trigger;
            if !entering && delivery.event_type != self.events.leave_trigger {
                continue;
            }
            let receiver = delivery.receiver;
            if !ctx.registry.has_component(receiver, self.components.door) {
                continue;
            }
            let Some(door) = doors.get_mut(slot(receiver)) else {
                continue;
            };

            let crossing = self.events.read_crossing(ctx.bus, delivery.event)?;
            let was_open = door.occupants > 0;
            if entering {
                door.occupants += 1;
            } else {
                door.occupants = door.occupants.saturating_sub(1);
            }

            match (was_open, door.occupants > 0) {
                (false, true) => {
                    door.times_opened += 1;
                    ctx.commands.add_flag(receiver, self.components.door_open);
                    tracing::debug!(door = %receiver, by = %crossing.subject, "door opened");
                }
                (true, false) => {
                    ctx.commands.remove_flag(receiver, self.components.door_open);
                    tracing::debug!(door = %receiver, by = %crossing.subject, "door closed");
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Spawns a closed door and the trigger volume that opens it, and
/// subscribes the door to the volume's crossings.
///
/// Returns `(door, trigger)`.
///
/// # Errors
///
/// Any spawn error; nothing is left behind on failure.
pub fn spawn_door(
    world: &mut World,
    components: &GameComponents,
    events: &GameEvents,
    door: Body,
    trigger: Body,
) -> SimResult<(EntityId, EntityId)> {
    let door_id = world.spawn_with(
        Spawn::new()
            .with_body(door)
            .with(components.door, Door::default()),
    )?;

    match link_trigger(world, components, events, door_id, trigger) {
        Ok(trigger_id) => Ok((door_id, trigger_id)),
        Err(error) => {
            world.despawn(door_id).ok();
            Err(error)
        }
    }
}

fn link_trigger(
    world: &mut World,
    components: &GameComponents,
    events: &GameEvents,
    door: EntityId,
    trigger: Body,
) -> SimResult<EntityId> {
    world.bus().register_event_receiver(door, events.enter_trigger)?;
    world.bus().register_event_receiver(door, events.leave_trigger)?;
    world.spawn_with(
        Spawn::new()
            .with_body(trigger)
            .with(components.trigger_volume, TriggerVolume { owner: door }),
    )
}
