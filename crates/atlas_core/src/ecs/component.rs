//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be `Pod` so a cell can be evicted by copying their bytes.

use std::any::TypeId;
use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Copy`: No heap allocations, bitwise copyable
/// - `Pod`: Plain old data, snapshotted as raw bytes on eviction
/// - `Send + Sync`: Columns are shared across phase worker threads
///
/// Every such type is a component; the registry assigns ids by name.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// let health = registry.register_component_type::<Health>("health")?;
/// ```
pub trait Component: Copy + Pod + Zeroable + Send + Sync + 'static {}

impl<T> Component for T where T: Copy + Pod + Zeroable + Send + Sync + 'static {}

/// Small integer assigned to a component type at registration.
///
/// Stable for the process lifetime only. Cell records persist the name
/// table alongside these ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(pub(crate) u8);

impl ComponentTypeId {
    /// Raw id (also the bit in the entity's component mask).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Small integer assigned to a flag at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlagId(pub(crate) u8);

impl FlagId {
    /// Raw id (also the bit in the entity's flag mask).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flag#{}", self.0)
    }
}

/// Registration record for one component type.
#[derive(Clone, Debug)]
pub(crate) struct ComponentInfo {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) size: usize,
}

impl ComponentInfo {
    pub(crate) fn of<C: Component>(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            size: std::mem::size_of::<C>(),
        }
    }

    pub(crate) fn is<C: Component>(&self) -> bool {
        self.type_id == TypeId::of::<C>()
    }
}
