//! # Gameplay Events
//!
//! The property and event-type schema of the sample systems, registered once
//! into a `SchemaBuilder` before the world is created.
//!
//! ## Wire layout
//!
//! ```text
//! impact:                   source(entity) x(float) y(float) z(float) explosion(int)
//! on_enter_trigger_volume:  trigger(entity) subject(entity)
//! on_leave_trigger_volume:  trigger(entity) subject(entity)
//! ```
//!
//! Readers replay properties in exactly this order.

use atlas_core::{EntityId, EventBus, EventId, EventType, PropertyId, SchemaBuilder, SimResult};
use atlas_shared::Vec3;

/// Property and event-type ids of the gameplay schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameEvents {
    /// Entity that caused the event.
    pub source: PropertyId,
    /// Trigger volume that was crossed.
    pub trigger: PropertyId,
    /// Entity that crossed it.
    pub subject: PropertyId,
    /// Position, X.
    pub x: PropertyId,
    /// Position, Y.
    pub y: PropertyId,
    /// Position, Z.
    pub z: PropertyId,
    /// Explosion effect reference.
    pub explosion: PropertyId,
    /// A projectile hit something solid.
    pub impact: EventType,
    /// A moveable entity entered a trigger volume.
    pub enter_trigger: EventType,
    /// A moveable entity left a trigger volume.
    pub leave_trigger: EventType,
}

/// Decoded `impact` event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impact {
    /// The projectile.
    pub source: EntityId,
    /// Where it hit.
    pub position: Vec3,
    /// Explosion effect reference.
    pub explosion: i64,
}

/// Decoded trigger crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerCrossing {
    /// The trigger volume.
    pub trigger: EntityId,
    /// The entity that crossed it.
    pub subject: EntityId,
}

impl GameEvents {
    /// Registers the gameplay properties and event types.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if a name is already bound to another value type.
    pub fn register(schema: &mut SchemaBuilder) -> SimResult<Self> {
        Ok(Self {
            source: schema.register_entity_id_property("source")?,
            trigger: schema.register_entity_id_property("trigger")?,
            subject: schema.register_entity_id_property("subject")?,
            x: schema.register_float_property("x")?,
            y: schema.register_float_property("y")?,
            z: schema.register_float_property("z")?,
            explosion: schema.register_int_property("explosion")?,
            impact: schema.register_event_type("impact")?,
            enter_trigger: schema.register_event_type("on_enter_trigger_volume")?,
            leave_trigger: schema.register_event_type("on_leave_trigger_volume")?,
        })
    }

    /// Writes and seals an `impact` event.
    ///
    /// # Errors
    ///
    /// Whatever the bus reports for a schema mismatch.
    pub fn write_impact(&self, bus: &EventBus, impact: &Impact) -> SimResult<EventId> {
        let mut writer = bus.begin_event_writing(self.impact)?;
        writer.write_entity_id(self.source, impact.source)?;
        writer.write_float(self.x, impact.position.x)?;
        writer.write_float(self.y, impact.position.y)?;
        writer.write_float(self.z, impact.position.z)?;
        writer.write_int(self.explosion, impact.explosion)?;
        Ok(writer.end_event_writing())
    }

    /// Reads an `impact` event; the event is gone afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound` if the event was already read, `TypeMismatch` or
    /// `OutOfRange` if it is not an impact.
    pub fn read_impact(&self, bus: &EventBus, event: EventId) -> SimResult<Impact> {
        let mut reader = bus.begin_event_reading(event)?;
        let impact = Impact {
            source: reader.read_entity_id()?,
            position: Vec3::new(reader.read_float()?, reader.read_float()?, reader.read_float()?),
            explosion: reader.read_int()?,
        };
        reader.end_event_reading();
        Ok(impact)
    }

    /// Writes and seals a trigger crossing of type `event_type`.
    ///
    /// # Errors
    ///
    /// Whatever the bus reports for a schema mismatch.
    pub fn write_crossing(
        &self,
        bus: &EventBus,
        event_type: EventType,
        crossing: TriggerCrossing,
    ) -> SimResult<EventId> {
        let mut writer = bus.begin_event_writing(event_type)?;
        writer.write_entity_id(self.trigger, crossing.trigger)?;
        writer.write_entity_id(self.subject, crossing.subject)?;
        Ok(writer.end_event_writing())
    }

    /// Reads a trigger crossing; the event is gone afterwards.
    ///
    /// # Errors
    ///
    /// As `read_impact`.
    pub fn read_crossing(&self, bus: &EventBus, event: EventId) -> SimResult<TriggerCrossing> {
        let mut reader = bus.begin_event_reading(event)?;
        let crossing = TriggerCrossing {
            trigger: reader.read_entity_id()?,
            subject: reader.read_entity_id()?,
        };
        reader.end_event_reading();
        Ok(crossing)
    }
}
