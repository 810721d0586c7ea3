//! # ATLAS Core
//!
//! The two leaf components every simulation system talks to:
//!
//! - **Entity Registry** (`ecs`): generational entity ids, one column per
//!   registered component type, 64 boolean flags per entity.
//! - **Event Bus** (`event`): properties registered once into a frozen
//!   schema, events written once and read once, delivered per receiver in
//!   send order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atlas_core::{Registry, SchemaBuilder, EventBus};
//!
//! let mut registry = Registry::new(10_000);
//! let health = registry.register_component_type::<f32>("health")?;
//! let e = registry.create_entity()?;
//! registry.add_component(e, health, 100.0_f32)?;
//!
//! let mut schema = SchemaBuilder::new();
//! let damage = schema.register_float_property("damage")?;
//! let hit = schema.register_event_type("hit")?;
//! let bus = EventBus::new(schema.build());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ecs;
pub mod error;
pub mod event;

pub use ecs::{
    Component, ComponentRead, ComponentStorage, ComponentTypeId, ComponentWrite, EntityId,
    EntitySlot, EntitySnapshot, FlagId, Registry, SchemaTable,
};
pub use error::{Bound, Missing, SimError, SimResult};
pub use event::{
    Delivery, EventBus, EventId, EventReader, EventSchema, EventType, EventWriter, PropertyId,
    PropertyInfo, SchemaBuilder, Value, ValueType,
};
