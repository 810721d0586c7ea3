//! # Component Storage
//!
//! One column per component type, indexed by entity slot.
//!
//! The storage uses a sparse-by-slot strategy:
//! - Slots grow with the registry's slot table, never shrink
//! - Access is O(1) via entity index
//! - Iteration walks occupied slots in index order

use std::any::Any;

use super::component::Component;
use crate::error::{SimError, SimResult};

/// Storage for a single component type.
///
/// # Type Parameters
///
/// * `C` - The component type to store
///
/// # Example
///
/// ```rust,ignore
/// let mut storage: ComponentStorage<Health> = ComponentStorage::new();
/// storage.insert(0, Health::default());
/// ```
pub struct ComponentStorage<C: Component> {
    /// One entry per entity slot.
    data: Vec<Option<C>>,
    /// Number of occupied entries.
    len: usize,
}

impl<C: Component> ComponentStorage<C> {
    /// Creates an empty column.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
        }
    }

    /// Number of entities carrying this component.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entity carries this component.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Gets a component by entity index.
    ///
    /// # Returns
    ///
    /// Reference to the component, or None if the slot holds none.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&C> {
        self.data.get(index).and_then(Option::as_ref)
    }

    /// Gets a mutable component by entity index.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut C> {
        self.data.get_mut(index).and_then(Option::as_mut)
    }

    /// Checks if the slot holds a component.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Stores a component at the specified index, growing the column if needed.
    ///
    /// # Returns
    ///
    /// The previous value in that slot, if any.
    pub fn insert(&mut self, index: usize, component: C) -> Option<C> {
        if index >= self.data.len() {
            self.data.resize(index + 1, None);
        }
        let previous = self.data[index].replace(component);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Clears a slot.
    ///
    /// # Returns
    ///
    /// The removed value, or None if the slot was empty.
    pub fn remove(&mut self, index: usize) -> Option<C> {
        let removed = self.data.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Iterates over occupied slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &C)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|c| (index, c)))
    }

    /// Iterates mutably over occupied slots with their indices.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut C)> {
        self.data
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|c| (index, c)))
    }
}

impl<C: Component> Default for ComponentStorage<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a column, used by the registry for structural work
/// that does not know the component type (destroy, snapshot, restore).
pub(crate) trait ErasedStorage: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove(&mut self, index: usize) -> bool;
    fn bytes_of(&self, index: usize) -> Option<Vec<u8>>;
    fn insert_bytes(&mut self, index: usize, bytes: &[u8]) -> SimResult<()>;
}

impl<C: Component> ErasedStorage for ComponentStorage<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, index: usize) -> bool {
        ComponentStorage::remove(self, index).is_some()
    }

    fn bytes_of(&self, index: usize) -> Option<Vec<u8>> {
        self.get(index).map(|c| bytemuck::bytes_of(c).to_vec())
    }

    fn insert_bytes(&mut self, index: usize, bytes: &[u8]) -> SimResult<()> {
        let value = bytemuck::try_pod_read_unaligned::<C>(bytes).map_err(|e| {
            SimError::IoFailure(format!(
                "component {} expects {} bytes, record has {}: {e}",
                std::any::type_name::<C>(),
                std::mem::size_of::<C>(),
                bytes.len()
            ))
        })?;
        self.insert(index, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_grows_on_insert() {
        let mut storage: ComponentStorage<[f32; 3]> = ComponentStorage::new();
        assert!(storage.get(50).is_none());

        assert!(storage.insert(50, [1.0, 2.0, 3.0]).is_none());
        assert_eq!(storage.get(50), Some(&[1.0, 2.0, 3.0]));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_storage_remove_counts() {
        let mut storage: ComponentStorage<u32> = ComponentStorage::new();
        storage.insert(1, 10);
        storage.insert(3, 30);
        assert_eq!(storage.remove(1), Some(10));
        assert_eq!(storage.remove(1), None);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.iter().collect::<Vec<_>>(), vec![(3, &30)]);
    }

    #[test]
    fn test_erased_bytes_roundtrip() {
        let mut storage: ComponentStorage<u64> = ComponentStorage::new();
        storage.insert(2, 0xDEAD_BEEF);
        let bytes = ErasedStorage::bytes_of(&storage, 2).unwrap();

        let mut other: ComponentStorage<u64> = ComponentStorage::new();
        other.insert_bytes(7, &bytes).unwrap();
        assert_eq!(other.get(7), Some(&0xDEAD_BEEF));
    }

    #[test]
    fn test_erased_rejects_wrong_size() {
        let mut storage: ComponentStorage<u64> = ComponentStorage::new();
        let err = storage.insert_bytes(0, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SimError::IoFailure(_)));
        assert!(storage.is_empty());
    }
}
