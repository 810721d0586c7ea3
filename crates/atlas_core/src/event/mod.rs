//! # Event Bus
//!
//! Systems never call each other. Cross-system effects travel as events:
//! ordered `(PropertyId, Value)` lists written once, read once.

mod bus;
mod schema;
mod value;

pub use bus::{Delivery, EventBus, EventId, EventReader, EventWriter};
pub use schema::{EventSchema, EventType, PropertyId, PropertyInfo, SchemaBuilder, ValueType};
pub use value::Value;
