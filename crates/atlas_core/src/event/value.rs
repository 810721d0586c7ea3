//! Typed property values.

use crate::ecs::EntityId;

use super::schema::ValueType;

/// One typed entry of an event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// Weak reference to an entity.
    EntityId(EntityId),
    /// Single-precision float.
    Float(f32),
    /// Signed integer.
    Int(i64),
}

impl Value {
    /// The value's type tag.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::EntityId(_) => ValueType::EntityId,
            Self::Float(_) => ValueType::Float,
            Self::Int(_) => ValueType::Int,
        }
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::EntityId(id)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
