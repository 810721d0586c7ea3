//! # Event Schema
//!
//! Property and event-type names are registered once, before the
//! simulation starts, through a `SchemaBuilder`. `build()` freezes the
//! result into an `Arc<EventSchema>` handed to every system at init.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Missing, SimError, SimResult};

/// Id of a registered event property. Ids start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub(crate) u16);

impl PropertyId {
    /// Raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Id of a registered event category. Ids start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventType(pub(crate) u16);

impl EventType {
    /// Raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Value type carried by a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `EntityId` (weak reference).
    EntityId,
    /// `f32`.
    Float,
    /// `i64`.
    Int,
}

impl ValueType {
    /// Name used in `TypeMismatch` errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EntityId => "entity id",
            Self::Float => "float",
            Self::Int => "int",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registered property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Registered name.
    pub name: String,
    /// Fixed value type.
    pub value_type: ValueType,
}

/// Collects property and event-type registrations.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    properties: Vec<PropertyInfo>,
    property_names: HashMap<String, PropertyId>,
    event_types: Vec<String>,
    event_type_names: HashMap<String, EventType>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register_property(&mut self, name: &str, value_type: ValueType) -> SimResult<PropertyId> {
        if let Some(&id) = self.property_names.get(name) {
            let existing = self.properties[usize::from(id.0) - 1].value_type;
            if existing == value_type {
                return Ok(id);
            }
            return Err(SimError::AlreadyRegistered(format!(
                "property '{name}' is {existing}, not {value_type}"
            )));
        }

        let raw = u16::try_from(self.properties.len() + 1).map_err(|_| SimError::CapacityExceeded {
            what: "event properties",
            capacity: usize::from(u16::MAX),
        })?;
        let id = PropertyId(raw);
        self.properties.push(PropertyInfo {
            name: name.to_owned(),
            value_type,
        });
        self.property_names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Registers a property carrying an `EntityId`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `name` exists with another value type.
    pub fn register_entity_id_property(&mut self, name: &str) -> SimResult<PropertyId> {
        self.register_property(name, ValueType::EntityId)
    }

    /// Registers a property carrying an `f32`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `name` exists with another value type.
    pub fn register_float_property(&mut self, name: &str) -> SimResult<PropertyId> {
        self.register_property(name, ValueType::Float)
    }

    /// Registers a property carrying an `i64`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `name` exists with another value type.
    pub fn register_int_property(&mut self, name: &str) -> SimResult<PropertyId> {
        self.register_property(name, ValueType::Int)
    }

    /// Registers an event category; registering a name again returns its id.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` past `u16::MAX` categories.
    pub fn register_event_type(&mut self, name: &str) -> SimResult<EventType> {
        if let Some(&id) = self.event_type_names.get(name) {
            return Ok(id);
        }
        let raw = u16::try_from(self.event_types.len() + 1).map_err(|_| SimError::CapacityExceeded {
            what: "event types",
            capacity: usize::from(u16::MAX),
        })?;
        let id = EventType(raw);
        self.event_types.push(name.to_owned());
        self.event_type_names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Freezes the schema.
    #[must_use]
    pub fn build(self) -> Arc<EventSchema> {
        Arc::new(EventSchema {
            properties: self.properties,
            property_names: self.property_names,
            event_types: self.event_types,
            event_type_names: self.event_type_names,
        })
    }
}

/// Frozen property and event-type registry.
#[derive(Debug)]
pub struct EventSchema {
    properties: Vec<PropertyInfo>,
    property_names: HashMap<String, PropertyId>,
    event_types: Vec<String>,
    event_type_names: HashMap<String, EventType>,
}

impl EventSchema {
    /// Looks up a property.
    ///
    /// # Errors
    ///
    /// `NotFound` for an id this schema never issued.
    pub fn property(&self, id: PropertyId) -> SimResult<&PropertyInfo> {
        usize::from(id.0)
            .checked_sub(1)
            .and_then(|i| self.properties.get(i))
            .ok_or(SimError::NotFound(Missing::Property(id)))
    }

    /// Looks up a property id by name.
    #[must_use]
    pub fn property_id(&self, name: &str) -> Option<PropertyId> {
        self.property_names.get(name).copied()
    }

    /// Looks up an event type id by name.
    #[must_use]
    pub fn event_type(&self, name: &str) -> Option<EventType> {
        self.event_type_names.get(name).copied()
    }

    /// Name of an event type.
    #[must_use]
    pub fn event_type_name(&self, ty: EventType) -> Option<&str> {
        usize::from(ty.0)
            .checked_sub(1)
            .and_then(|i| self.event_types.get(i))
            .map(String::as_str)
    }

    /// Fails `NotFound` for an event type this schema never issued.
    pub(crate) fn check_event_type(&self, ty: EventType) -> SimResult<()> {
        self.event_type_name(ty)
            .map(|_| ())
            .ok_or(SimError::NotFound(Missing::EventType(ty)))
    }

    /// Number of registered properties.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_property_is_one() {
        let mut builder = SchemaBuilder::new();
        let damage = builder.register_float_property("damage").unwrap();
        assert_eq!(damage.raw(), 1);

        let schema = builder.build();
        assert_eq!(schema.property(damage).unwrap().value_type, ValueType::Float);
        assert_eq!(schema.property_id("damage"), Some(damage));
    }

    #[test]
    fn test_reregister_same_type_returns_id() {
        let mut builder = SchemaBuilder::new();
        let a = builder.register_int_property("count").unwrap();
        assert_eq!(builder.register_int_property("count").unwrap(), a);
        assert!(matches!(
            builder.register_float_property("count"),
            Err(SimError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let schema = SchemaBuilder::new().build();
        assert_eq!(
            schema.property(PropertyId(3)),
            Err(SimError::NotFound(Missing::Property(PropertyId(3))))
        );
        assert!(schema.check_event_type(EventType(1)).is_err());
        assert!(schema.property(PropertyId(0)).is_err());
    }
}
