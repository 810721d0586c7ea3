//! # Simulation Error Types
//!
//! All errors that can cross a system boundary.
//!
//! Structural errors (`NotFound`, `DuplicateComponent`, `TypeMismatch`) mean
//! the calling system has a logic bug; the failing call leaves every store
//! untouched. `IoFailure` is recoverable and only ever reported by cell
//! streaming. `CapacityExceeded` goes back to the caller, who decides
//! whether to grow or refuse.

use std::fmt;

use thiserror::Error;

use crate::ecs::{ComponentTypeId, EntityId, FlagId};
use crate::event::{EventId, EventType, PropertyId};

/// What a `NotFound` error was looking for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    /// Unknown, destroyed, or stale entity.
    Entity(EntityId),
    /// Entity is alive but lacks this component.
    Component {
        /// The entity that was queried.
        entity: EntityId,
        /// The component type it does not have.
        component: ComponentTypeId,
    },
    /// No component type registered under this id or name.
    ComponentType(String),
    /// Entity is alive but the flag is not set.
    Flag {
        /// The entity that was queried.
        entity: EntityId,
        /// The flag that is not set.
        flag: FlagId,
    },
    /// No flag registered under this name.
    FlagName(String),
    /// Property id not in the schema.
    Property(PropertyId),
    /// Event type id not in the schema.
    EventType(EventType),
    /// Event already read, already sent, or never sealed.
    Event(EventId),
    /// Entity is not subscribed to the event's type.
    Receiver(EntityId),
    /// Cell not tracked by the active grid.
    Cell([i32; 3]),
    /// Resource template id not loaded.
    Resource(u32),
    /// Entity has no broad-phase proxy.
    Proxy(EntityId),
    /// No system registered under this name.
    System(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "entity {id}"),
            Self::Component { entity, component } => {
                write!(f, "component {component} on entity {entity}")
            }
            Self::ComponentType(name) => write!(f, "component type '{name}'"),
            Self::Flag { entity, flag } => write!(f, "flag {flag} on entity {entity}"),
            Self::FlagName(name) => write!(f, "flag '{name}'"),
            Self::Property(id) => write!(f, "property {id}"),
            Self::EventType(ty) => write!(f, "event type {ty}"),
            Self::Event(id) => write!(f, "event {id}"),
            Self::Receiver(id) => write!(f, "event receiver {id}"),
            Self::Cell([x, y, z]) => write!(f, "cell ({x}, {y}, {z})"),
            Self::Resource(id) => write!(f, "resource {id}"),
            Self::Proxy(id) => write!(f, "broad-phase proxy for entity {id}"),
            Self::System(name) => write!(f, "system '{name}'"),
        }
    }
}

/// Which limit an `OutOfRange` error crossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// Read past the last entry of an event.
    EventEnd(EventId),
    /// Cell lies outside the active window.
    Window([i32; 3]),
    /// Cell lies outside the world lattice.
    World([i32; 3]),
    /// Cell is in the window but its record has not loaded yet.
    NotLoaded([i32; 3]),
    /// Position has a NaN or infinite coordinate.
    NonFinite,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventEnd(id) => write!(f, "event {id} has no entries left"),
            Self::Window([x, y, z]) => write!(f, "cell ({x}, {y}, {z}) is outside the active window"),
            Self::World([x, y, z]) => write!(f, "cell ({x}, {y}, {z}) is outside the world lattice"),
            Self::NotLoaded([x, y, z]) => write!(f, "cell ({x}, {y}, {z}) is not loaded yet"),
            Self::NonFinite => write!(f, "position is not finite"),
        }
    }
}

/// Errors that can occur anywhere in the simulation substrate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Unknown or destroyed entity, component, flag, event, or cell.
    #[error("not found: {0}")]
    NotFound(Missing),

    /// The entity already carries a component of this type.
    #[error("entity {entity} already has component {component}")]
    DuplicateComponent {
        /// The entity.
        entity: EntityId,
        /// The component type that is already present.
        component: ComponentTypeId,
    },

    /// A value was written or read as the wrong type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type actually registered or stored.
        found: &'static str,
    },

    /// An event read past its end, or a position outside the simulated region.
    #[error("out of range: {0}")]
    OutOfRange(Bound),

    /// Cell load or save failed.
    #[error("cell I/O failed: {0}")]
    IoFailure(String),

    /// A fixed-size pool is full.
    #[error("capacity exceeded: {what} (capacity {capacity})")]
    CapacityExceeded {
        /// What ran out (entities, component types, flags).
        what: &'static str,
        /// The configured limit.
        capacity: usize,
    },

    /// A name or handle is already registered with different semantics.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Attempted to move a static broad-phase proxy.
    #[error("entity {0} is static and cannot move")]
    Immovable(EntityId),

    /// Configuration or resource file is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimError {
    /// Shorthand for `SimError::NotFound(Missing::Entity(id))`.
    #[must_use]
    pub const fn entity(id: EntityId) -> Self {
        Self::NotFound(Missing::Entity(id))
    }

    /// Returns true if the error is recoverable by retrying on a later frame.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::IoFailure(_))
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::IoFailure(err.to_string())
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_missing_thing() {
        let err = SimError::entity(EntityId::new(3, 1));
        assert_eq!(err.to_string(), "not found: entity 3v1");

        let err = SimError::OutOfRange(Bound::Window([1, -2, 3]));
        assert_eq!(
            err.to_string(),
            "out of range: cell (1, -2, 3) is outside the active window"
        );
    }

    #[test]
    fn test_io_errors_are_recoverable() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: SimError = io.into();
        assert!(err.is_recoverable());
        assert!(!SimError::entity(EntityId::NULL).is_recoverable());
    }
}
