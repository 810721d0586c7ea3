//! Detached copies of entities, used when a cell is evicted to storage.

use super::component::ComponentTypeId;

/// Every component and flag of one entity, as raw bytes keyed by the ids
/// of the process that took the snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntitySnapshot {
    /// Raw ids of the set flags.
    pub flags: Vec<u8>,
    /// `(component id, bytes)` pairs in id order.
    pub components: Vec<(u8, Vec<u8>)>,
}

impl EntitySnapshot {
    /// Returns the bytes of one component, if present.
    #[must_use]
    pub fn component(&self, ty: ComponentTypeId) -> Option<&[u8]> {
        self.components
            .iter()
            .find(|(id, _)| *id == ty.raw())
            .map(|(_, bytes)| bytes.as_slice())
    }
}

/// Id-to-name table written next to persisted snapshots.
///
/// Ids are only stable for one process; names survive restarts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaTable {
    /// `(component id, name)` pairs.
    pub components: Vec<(u8, String)>,
    /// `(flag id, name)` pairs.
    pub flags: Vec<(u8, String)>,
}

impl SchemaTable {
    /// Name of a persisted component id.
    #[must_use]
    pub fn component_name(&self, id: u8) -> Option<&str> {
        self.components
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, name)| name.as_str())
    }

    /// Name of a persisted flag id.
    #[must_use]
    pub fn flag_name(&self, id: u8) -> Option<&str> {
        self.flags
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, name)| name.as_str())
    }
}
