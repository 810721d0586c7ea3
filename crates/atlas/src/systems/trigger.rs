//! Trigger volumes: static regions that notice moveable entities crossing
//! their boundary.

use std::collections::{BTreeMap, BTreeSet};

use atlas_core::{EntityId, SimResult};
use atlas_world::Mobility;

use super::slot;
use crate::components::{GameComponents, TriggerVolume};
use crate::events::{GameEvents, TriggerCrossing};
use crate::system::{PhaseContext, System, SystemAccess};

type Occupancy = BTreeMap<EntityId, BTreeSet<EntityId>>;

/// Compares each trigger's moveable occupants with the previous frame and
/// tells the trigger's owner who entered and who left.
///
/// The owner is a weak reference: a dead owner is skipped, and an owner
/// that did not subscribe to a crossing type does not receive it.
pub struct TriggerSystem {
    components: GameComponents,
    events: GameEvents,
    occupants: Occupancy,
}

impl TriggerSystem {
    /// Creates the system.
    #[must_use]
    pub const fn new(components: GameComponents, events: GameEvents) -> Self {
        Self {
            components,
            events,
            occupants: BTreeMap::new(),
        }
    }

    /// Moveable entities inside `trigger` as of the last logic phase.
    pub fn occupants_of(&self, trigger: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.occupants.get(&trigger).into_iter().flatten().copied()
    }

    fn current_occupancy(&self, ctx: &PhaseContext<'_>) -> Occupancy {
        let mut current: Occupancy = ctx
            .registry
            .with_component(self.components.trigger_volume)
            .map(|id| (id, BTreeSet::new()))
            .collect();

        let broad_phase = ctx.broad_phase.read();
        for &(a, b) in ctx.overlaps {
            for (trigger, other) in [(a, b), (b, a)] {
                if let Some(inside) = current.get_mut(&trigger) {
                    if matches!(broad_phase.mobility(other), Ok(Mobility::Moveable)) {
                        inside.insert(other);
                    }
                }
            }
        }
        current
    }
}

impl System for TriggerSystem {
    fn name(&self) -> &str {
        "trigger"
    }

    fn access(&self) -> SystemAccess {
        SystemAccess::new()
            .read(self.components.trigger_volume)
            .spatial_read()
    }

    fn update_logic(&mut self, ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        let current = self.current_occupancy(ctx);

        let mut crossings = Vec::new();
        for (&trigger, now) in &current {
            let before = self.occupants.get(&trigger);
            for &subject in now {
                if !before.is_some_and(|b| b.contains(&subject)) {
                    crossings.push((self.events.enter_trigger, trigger, subject));
                }
            }
            for &subject in before.into_iter().flatten() {
                if !now.contains(&subject) {
                    crossings.push((self.events.leave_trigger, trigger, subject));
                }
            }
        }

        {
            let volumes = ctx.registry.read::<TriggerVolume>(self.components.trigger_volume)?;
            for (event_type, trigger, subject) in crossings {
                let Some(owner) = volumes.get(slot(trigger)).map(|v| v.owner) else {
                    continue;
                };
                if !ctx.registry.is_alive(owner) {
                    tracing::trace!(%trigger, %owner, "trigger owner is gone");
                    continue;
                }
                if !ctx.bus.is_subscribed(owner, event_type) {
                    continue;
                }
                let event = self
                    .events
                    .write_crossing(ctx.bus, event_type, TriggerCrossing { trigger, subject })?;
                ctx.bus.send_event(owner, event)?;
            }
        }

        self.occupants = current;
        Ok(())
    }
}
