//! # Entity Management
//!
//! An entity is nothing but a slot in the registry plus the generation that
//! slot had when the entity was created. Freed slots are reused with the
//! generation bumped, so old ids stop resolving.
//!
//! An `EntityId` doubles as a weak reference: holding one never keeps the
//! entity alive, and every dereference goes through the registry's
//! generation check.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Handle to an entity: `generation << 32 | slot`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Packs a slot and a generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Slot in the registry.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation of the slot when this id was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds an ID from `to_bits` output.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Never issued by a registry.
    pub const NULL: Self = Self(u64::MAX);

    /// Returns true for [`EntityId::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

/// One slot of the registry's slot table.
///
/// Tracks liveness, the current generation, and which components and
/// flags are attached via bitmasks.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntitySlot {
    /// Current generation of this slot.
    pub(crate) generation: u32,
    /// Set between create and destroy.
    pub(crate) alive: bool,
    /// Bit `n` set when component type `n` is attached.
    pub(crate) component_mask: u64,
    /// Bitmask of set flags (up to 64 flags).
    pub(crate) flag_mask: u64,
}

impl EntitySlot {
    /// Generation of the slot's current or last occupant.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the slot holds a live entity.
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Checks if this entity has a specific component.
    ///
    /// # Arguments
    ///
    /// * `bit` - The component type bit (0-63)
    #[inline]
    #[must_use]
    pub const fn has_component_bit(&self, bit: u8) -> bool {
        (self.component_mask & (1 << bit)) != 0
    }

    /// Checks if this entity has a specific flag set.
    #[inline]
    #[must_use]
    pub const fn has_flag_bit(&self, bit: u8) -> bool {
        (self.flag_mask & (1 << bit)) != 0
    }

    /// Raw component bitmask.
    #[inline]
    #[must_use]
    pub const fn component_mask(&self) -> u64 {
        self.component_mask
    }

    /// Raw flag bitmask.
    #[inline]
    #[must_use]
    pub const fn flag_mask(&self) -> u64 {
        self.flag_mask
    }

    /// Iterates the set bits of a mask, lowest first.
    pub(crate) fn bits(mask: u64) -> impl Iterator<Item = u8> {
        (0..64u8).filter(move |bit| mask & (1 << bit) != 0)
    }
}
