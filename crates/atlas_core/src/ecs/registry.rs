//! # Entity Registry
//!
//! The central container for entity identity, component columns and flags.
//!
//! Structural operations (`create_entity`, `destroy_entity`, `add_component`,
//! `remove_component`, flags) take `&mut self` and are only reachable at
//! phase boundaries. Inside a phase, systems share `&Registry` and go
//! through per-column `RwLock`s: the declared write set of a system decides
//! which columns it locks for writing.

use std::collections::HashMap;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use super::component::{Component, ComponentInfo, ComponentTypeId, FlagId};
use super::entity::{EntityId, EntitySlot};
use super::snapshot::{EntitySnapshot, SchemaTable};
use super::storage::{ComponentStorage, ErasedStorage};
use crate::error::{Missing, SimError, SimResult};

/// Maximum number of component types (one bit each in the entity mask).
pub const MAX_COMPONENT_TYPES: usize = 64;

/// Maximum number of flags (one bit each in the entity mask).
pub const MAX_FLAGS: usize = 64;

/// Shared read access to one component column.
pub type ComponentRead<'a, C> = MappedRwLockReadGuard<'a, ComponentStorage<C>>;

/// Exclusive write access to one component column.
pub type ComponentWrite<'a, C> = MappedRwLockWriteGuard<'a, ComponentStorage<C>>;

/// One registered component type and its column.
struct Column {
    info: ComponentInfo,
    storage: RwLock<Box<dyn ErasedStorage>>,
}

/// The Entity Registry - owns identity, components and flags.
///
/// # Capacity
///
/// The slot table grows on demand up to `capacity`. Once every slot is
/// live, `create_entity` fails with `CapacityExceeded` so the caller can
/// refuse the spawn.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::new(1_000);
/// let pos = registry.register_component_type::<Vec3>("position")?;
///
/// let e = registry.create_entity()?;
/// registry.add_component(e, pos, Vec3::ZERO)?;
/// ```
pub struct Registry {
    /// Slot table, indexed by `EntityId::index`.
    slots: Vec<EntitySlot>,
    /// Free list of slot indices for reuse.
    free: Vec<u32>,
    /// Number of currently alive entities.
    alive: usize,
    /// Maximum number of slots.
    capacity: usize,
    /// Component columns, indexed by `ComponentTypeId`.
    columns: Vec<Column>,
    /// Component name to id.
    component_names: HashMap<String, ComponentTypeId>,
    /// Flag names, indexed by `FlagId`.
    flags: Vec<String>,
    /// Flag name to id.
    flag_names: HashMap<String, FlagId>,
}

impl Registry {
    /// Creates an empty registry that can hold up to `capacity` live entities.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            alive: 0,
            capacity,
            columns: Vec::new(),
            component_names: HashMap::new(),
            flags: Vec::new(),
            flag_names: HashMap::new(),
        }
    }

    /// Returns the maximum number of live entities.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates a new entity.
    ///
    /// Reuses a freed slot when one exists (its generation is bumped, so
    /// handles to the previous occupant go stale); otherwise grows the slot
    /// table.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if every slot up to `capacity` is alive.
    pub fn create_entity(&mut self) -> SimResult<EntityId> {
        let index = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            index
        } else {
            if self.slots.len() >= self.capacity {
                return Err(SimError::CapacityExceeded {
                    what: "entities",
                    capacity: self.capacity,
                });
            }
            self.slots.push(EntitySlot::default());
            (self.slots.len() - 1) as u32
        };

        let slot = &mut self.slots[index as usize];
        slot.alive = true;
        slot.component_mask = 0;
        slot.flag_mask = 0;
        self.alive += 1;

        Ok(EntityId::new(index, slot.generation))
    }

    /// Destroys an entity and drops all of its components.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is unknown, stale, or already destroyed; nothing
    /// is modified in that case.
    pub fn destroy_entity(&mut self, id: EntityId) -> SimResult<()> {
        let index = self.live_index(id)?;
        let mask = self.slots[index].component_mask;

        for bit in EntitySlot::bits(mask) {
            self.columns[bit as usize].storage.get_mut().remove(index);
        }

        let slot = &mut self.slots[index];
        slot.alive = false;
        slot.component_mask = 0;
        slot.flag_mask = 0;
        self.alive -= 1;
        self.free.push(id.index());

        Ok(())
    }

    /// Checks if an entity is alive (generation matches the slot's).
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.live_index(id).is_ok()
    }

    /// Dereferences a (possibly stale) handle.
    ///
    /// # Errors
    ///
    /// `NotFound` if the generation no longer matches.
    pub fn resolve(&self, id: EntityId) -> SimResult<&EntitySlot> {
        let index = self.live_index(id)?;
        Ok(&self.slots[index])
    }

    /// Iterates over all alive entities in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| EntityId::new(index as u32, slot.generation))
    }

    fn live_index(&self, id: EntityId) -> SimResult<usize> {
        if id.is_null() {
            return Err(SimError::entity(id));
        }
        let index = id.index() as usize;
        match self.slots.get(index) {
            Some(slot) if slot.alive && slot.generation == id.generation() => Ok(index),
            _ => Err(SimError::entity(id)),
        }
    }

    // =========================================================================
    // Component types
    // =========================================================================

    /// Registers a component type under `name`.
    ///
    /// Registering the same name again with the same Rust type returns the
    /// existing id.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if `name` is already bound to a different type
    /// - `CapacityExceeded` past 64 component types
    pub fn register_component_type<C: Component>(&mut self, name: &str) -> SimResult<ComponentTypeId> {
        if let Some(&existing) = self.component_names.get(name) {
            let info = &self.columns[existing.0 as usize].info;
            if info.is::<C>() {
                return Ok(existing);
            }
            return Err(SimError::TypeMismatch {
                expected: std::any::type_name::<C>(),
                found: info.type_name,
            });
        }

        if self.columns.len() >= MAX_COMPONENT_TYPES {
            return Err(SimError::CapacityExceeded {
                what: "component types",
                capacity: MAX_COMPONENT_TYPES,
            });
        }

        let id = ComponentTypeId(self.columns.len() as u8);
        self.columns.push(Column {
            info: ComponentInfo::of::<C>(name),
            storage: RwLock::new(Box::new(ComponentStorage::<C>::new())),
        });
        self.component_names.insert(name.to_owned(), id);
        tracing::debug!(component = name, id = id.0, "registered component type");
        Ok(id)
    }

    /// Looks up a component type by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if no type was registered under `name`.
    pub fn component_type(&self, name: &str) -> SimResult<ComponentTypeId> {
        self.component_names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::NotFound(Missing::ComponentType(name.to_owned())))
    }

    /// Returns the registered name of a component type.
    #[must_use]
    pub fn component_name(&self, ty: ComponentTypeId) -> Option<&str> {
        self.columns.get(ty.0 as usize).map(|c| c.info.name.as_str())
    }

    /// Byte size of a component type's values.
    #[must_use]
    pub fn component_size(&self, ty: ComponentTypeId) -> Option<usize> {
        self.columns.get(ty.0 as usize).map(|c| c.info.size)
    }

    fn column(&self, ty: ComponentTypeId) -> SimResult<&Column> {
        self.columns
            .get(ty.0 as usize)
            .ok_or_else(|| SimError::NotFound(Missing::ComponentType(ty.to_string())))
    }

    fn typed_column<C: Component>(&self, ty: ComponentTypeId) -> SimResult<&Column> {
        let column = self.column(ty)?;
        if !column.info.is::<C>() {
            return Err(SimError::TypeMismatch {
                expected: std::any::type_name::<C>(),
                found: column.info.type_name,
            });
        }
        Ok(column)
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attaches a component to an entity.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity is not alive or the type is unknown
    /// - `TypeMismatch` if `C` is not the registered type
    /// - `DuplicateComponent` if the entity already has one; the existing
    ///   value is left untouched
    pub fn add_component<C: Component>(
        &mut self,
        id: EntityId,
        ty: ComponentTypeId,
        value: C,
    ) -> SimResult<()> {
        let index = self.live_index(id)?;
        self.typed_column::<C>(ty)?;
        if self.slots[index].has_component_bit(ty.0) {
            return Err(SimError::DuplicateComponent {
                entity: id,
                component: ty,
            });
        }

        let storage = self.columns[ty.0 as usize].storage.get_mut();
        if let Some(column) = storage.as_any_mut().downcast_mut::<ComponentStorage<C>>() {
            column.insert(index, value);
        }
        self.slots[index].component_mask |= 1 << ty.0;
        Ok(())
    }

    /// Detaches a component from an entity.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not alive or lacks the component.
    /// Removing twice is an error.
    pub fn remove_component(&mut self, id: EntityId, ty: ComponentTypeId) -> SimResult<()> {
        let index = self.live_index(id)?;
        self.column(ty)?;
        if !self.slots[index].has_component_bit(ty.0) {
            return Err(SimError::NotFound(Missing::Component {
                entity: id,
                component: ty,
            }));
        }

        self.columns[ty.0 as usize].storage.get_mut().remove(index);
        self.slots[index].component_mask &= !(1 << ty.0);
        Ok(())
    }

    /// Checks if an alive entity has a component.
    #[must_use]
    pub fn has_component(&self, id: EntityId, ty: ComponentTypeId) -> bool {
        self.live_index(id)
            .map(|index| self.slots[index].has_component_bit(ty.0))
            .unwrap_or(false)
    }

    /// Reads a copy of a component value.
    ///
    /// # Errors
    ///
    /// `NotFound` / `TypeMismatch` as for `add_component`.
    pub fn get<C: Component>(&self, id: EntityId, ty: ComponentTypeId) -> SimResult<C> {
        let index = self.live_index(id)?;
        let column = self.read::<C>(ty)?;
        column.get(index).copied().ok_or(SimError::NotFound(Missing::Component {
            entity: id,
            component: ty,
        }))
    }

    /// Overwrites an existing component value.
    ///
    /// Not structural: the component must already be attached.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity lacks the component.
    pub fn set<C: Component>(&self, id: EntityId, ty: ComponentTypeId, value: C) -> SimResult<()> {
        let index = self.live_index(id)?;
        let mut column = self.write::<C>(ty)?;
        let slot = column.get_mut(index).ok_or(SimError::NotFound(Missing::Component {
            entity: id,
            component: ty,
        }))?;
        *slot = value;
        Ok(())
    }

    /// Locks a column for shared reading.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown type, `TypeMismatch` if `C` is wrong.
    pub fn read<C: Component>(&self, ty: ComponentTypeId) -> SimResult<ComponentRead<'_, C>> {
        let column = self.typed_column::<C>(ty)?;
        let guard = column.storage.read();
        RwLockReadGuard::try_map(guard, |s| (**s).as_any().downcast_ref::<ComponentStorage<C>>())
            .map_err(|_| SimError::TypeMismatch {
                expected: std::any::type_name::<C>(),
                found: column.info.type_name,
            })
    }

    /// Locks a column for exclusive writing.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown type, `TypeMismatch` if `C` is wrong.
    pub fn write<C: Component>(&self, ty: ComponentTypeId) -> SimResult<ComponentWrite<'_, C>> {
        let column = self.typed_column::<C>(ty)?;
        let guard = column.storage.write();
        RwLockWriteGuard::try_map(guard, |s| {
            (**s).as_any_mut().downcast_mut::<ComponentStorage<C>>()
        })
        .map_err(|_| SimError::TypeMismatch {
            expected: std::any::type_name::<C>(),
            found: column.info.type_name,
        })
    }

    /// Iterates alive entities that carry a component, in slot order.
    pub fn with_component(&self, ty: ComponentTypeId) -> impl Iterator<Item = EntityId> + '_ {
        self.iter_alive()
            .filter(move |&id| self.slots[id.index() as usize].has_component_bit(ty.0))
    }

    // =========================================================================
    // Flags
    // =========================================================================

    /// Registers a flag under `name`; registering again returns the same id.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` past 64 flags.
    pub fn register_flag(&mut self, name: &str) -> SimResult<FlagId> {
        if let Some(&existing) = self.flag_names.get(name) {
            return Ok(existing);
        }
        if self.flags.len() >= MAX_FLAGS {
            return Err(SimError::CapacityExceeded {
                what: "flags",
                capacity: MAX_FLAGS,
            });
        }
        let id = FlagId(self.flags.len() as u8);
        self.flags.push(name.to_owned());
        self.flag_names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Looks up a flag by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if no flag was registered under `name`.
    pub fn flag(&self, name: &str) -> SimResult<FlagId> {
        self.flag_names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::NotFound(Missing::FlagName(name.to_owned())))
    }

    fn check_flag(&self, flag: FlagId) -> SimResult<()> {
        if (flag.0 as usize) < self.flags.len() {
            Ok(())
        } else {
            Err(SimError::NotFound(Missing::FlagName(flag.to_string())))
        }
    }

    /// Sets a flag on an entity. Setting an already-set flag is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not alive or the flag is unregistered.
    pub fn add_flag(&mut self, id: EntityId, flag: FlagId) -> SimResult<()> {
        let index = self.live_index(id)?;
        self.check_flag(flag)?;
        self.slots[index].flag_mask |= 1 << flag.0;
        Ok(())
    }

    /// Clears a flag on an entity.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not alive or the flag is not set.
    pub fn remove_flag(&mut self, id: EntityId, flag: FlagId) -> SimResult<()> {
        let index = self.live_index(id)?;
        self.check_flag(flag)?;
        if !self.slots[index].has_flag_bit(flag.0) {
            return Err(SimError::NotFound(Missing::Flag { entity: id, flag }));
        }
        self.slots[index].flag_mask &= !(1 << flag.0);
        Ok(())
    }

    /// Checks if an alive entity has a flag set.
    #[must_use]
    pub fn has_flag(&self, id: EntityId, flag: FlagId) -> bool {
        self.live_index(id)
            .map(|index| self.slots[index].has_flag_bit(flag.0))
            .unwrap_or(false)
    }

    // =========================================================================
    // Snapshots (cell eviction / reload)
    // =========================================================================

    /// Name table for every registered component type and flag.
    #[must_use]
    pub fn schema_table(&self) -> SchemaTable {
        SchemaTable {
            components: self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (i as u8, c.info.name.clone()))
                .collect(),
            flags: self
                .flags
                .iter()
                .enumerate()
                .map(|(i, name)| (i as u8, name.clone()))
                .collect(),
        }
    }

    /// Copies every component of an entity into a snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not alive.
    pub fn snapshot_entity(&self, id: EntityId) -> SimResult<EntitySnapshot> {
        let index = self.live_index(id)?;
        let slot = &self.slots[index];

        let mut components = Vec::new();
        for bit in EntitySlot::bits(slot.component_mask) {
            if let Some(bytes) = self.columns[bit as usize].storage.read().bytes_of(index) {
                components.push((bit, bytes));
            }
        }

        Ok(EntitySnapshot {
            flags: EntitySlot::bits(slot.flag_mask).collect(),
            components,
        })
    }

    /// Recreates an entity from a snapshot written under `table`.
    ///
    /// Persisted ids are translated through their names, so a snapshot
    /// survives component types being registered in a different order.
    /// All names and sizes are validated before the entity is created.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a persisted name is not registered in this process
    /// - `IoFailure` if a component's byte size does not match
    /// - `CapacityExceeded` if the registry is full
    pub fn restore_entity(&mut self, snapshot: &EntitySnapshot, table: &SchemaTable) -> SimResult<EntityId> {
        let mut components = Vec::with_capacity(snapshot.components.len());
        for (persisted, bytes) in &snapshot.components {
            let name = table.component_name(*persisted).ok_or_else(|| {
                SimError::IoFailure(format!("component id {persisted} missing from name table"))
            })?;
            let ty = self.component_type(name)?;
            let size = self.columns[ty.0 as usize].info.size;
            if size != bytes.len() {
                return Err(SimError::IoFailure(format!(
                    "component '{name}' expects {size} bytes, record has {}",
                    bytes.len()
                )));
            }
            components.push((ty, bytes.as_slice()));
        }

        let mut flag_mask = 0u64;
        for persisted in &snapshot.flags {
            let name = table.flag_name(*persisted).ok_or_else(|| {
                SimError::IoFailure(format!("flag id {persisted} missing from name table"))
            })?;
            flag_mask |= 1 << self.flag(name)?.0;
        }

        let id = self.create_entity()?;
        let index = id.index() as usize;
        for (ty, bytes) in components {
            self.columns[ty.0 as usize].storage.get_mut().insert_bytes(index, bytes)?;
            self.slots[index].component_mask |= 1 << ty.0;
        }
        self.slots[index].flag_mask = flag_mask;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health {
        current: f32,
        max: f32,
    }

    fn setup() -> (Registry, ComponentTypeId) {
        let mut registry = Registry::new(100);
        let health = registry.register_component_type::<Health>("health").unwrap();
        (registry, health)
    }

    #[test]
    fn test_create_destroy_reuses_slot() {
        let (mut registry, _) = setup();

        let id1 = registry.create_entity().unwrap();
        let id2 = registry.create_entity().unwrap();
        assert_eq!(registry.alive_count(), 2);

        registry.destroy_entity(id1).unwrap();
        assert!(!registry.is_alive(id1));
        assert!(registry.is_alive(id2));

        let id3 = registry.create_entity().unwrap();
        assert_eq!(id3.index(), id1.index());
        assert_ne!(id3.generation(), id1.generation());
        assert!(!registry.is_alive(id1));
    }

    #[test]
    fn test_destroy_twice_is_not_found() {
        let (mut registry, _) = setup();
        let id = registry.create_entity().unwrap();
        registry.destroy_entity(id).unwrap();
        assert_eq!(registry.destroy_entity(id), Err(SimError::entity(id)));
        assert_eq!(registry.alive_count(), 0);
    }

    #[test]
    fn test_component_ops_after_destroy_fail() {
        let (mut registry, health) = setup();
        let id = registry.create_entity().unwrap();
        registry.add_component(id, health, Health::default()).unwrap();
        registry.destroy_entity(id).unwrap();

        assert_eq!(
            registry.add_component(id, health, Health::default()),
            Err(SimError::entity(id))
        );
        assert_eq!(registry.remove_component(id, health), Err(SimError::entity(id)));
    }

    #[test]
    fn test_duplicate_component_keeps_original() {
        let (mut registry, health) = setup();
        let id = registry.create_entity().unwrap();
        let original = Health { current: 50.0, max: 100.0 };
        registry.add_component(id, health, original).unwrap();

        let err = registry
            .add_component(id, health, Health { current: 1.0, max: 1.0 })
            .unwrap_err();
        assert_eq!(
            err,
            SimError::DuplicateComponent {
                entity: id,
                component: health
            }
        );
        assert_eq!(registry.get::<Health>(id, health).unwrap(), original);
    }

    #[test]
    fn test_remove_component_twice_is_error() {
        let (mut registry, health) = setup();
        let id = registry.create_entity().unwrap();
        registry.add_component(id, health, Health::default()).unwrap();

        registry.remove_component(id, health).unwrap();
        assert!(!registry.has_component(id, health));
        assert!(matches!(
            registry.remove_component(id, health),
            Err(SimError::NotFound(Missing::Component { .. }))
        ));
    }

    #[test]
    fn test_wrong_type_is_mismatch() {
        let (mut registry, health) = setup();
        let id = registry.create_entity().unwrap();
        let err = registry.add_component(id, health, 3.0_f32).unwrap_err();
        assert!(matches!(err, SimError::TypeMismatch { .. }));
        assert!(!registry.has_component(id, health));

        assert!(matches!(
            registry.register_component_type::<f32>("health"),
            Err(SimError::TypeMismatch { .. })
        ));
        assert_eq!(registry.register_component_type::<Health>("health"), Ok(health));
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut registry = Registry::new(2);
        registry.create_entity().unwrap();
        registry.create_entity().unwrap();
        assert_eq!(
            registry.create_entity(),
            Err(SimError::CapacityExceeded {
                what: "entities",
                capacity: 2
            })
        );
    }

    #[test]
    fn test_flags() {
        let (mut registry, _) = setup();
        let burning = registry.register_flag("burning").unwrap();
        let id = registry.create_entity().unwrap();

        registry.add_flag(id, burning).unwrap();
        assert!(registry.has_flag(id, burning));
        registry.remove_flag(id, burning).unwrap();
        assert!(matches!(
            registry.remove_flag(id, burning),
            Err(SimError::NotFound(Missing::Flag { .. }))
        ));
    }

    #[test]
    fn test_column_guards() {
        let (mut registry, health) = setup();
        let a = registry.create_entity().unwrap();
        let b = registry.create_entity().unwrap();
        registry.add_component(a, health, Health { current: 1.0, max: 2.0 }).unwrap();
        registry.add_component(b, health, Health { current: 3.0, max: 4.0 }).unwrap();

        {
            let mut column = registry.write::<Health>(health).unwrap();
            for (_, h) in column.iter_mut() {
                h.current = h.max;
            }
        }

        let column = registry.read::<Health>(health).unwrap();
        assert_eq!(column.get(a.index() as usize).unwrap().current, 2.0);
        assert_eq!(column.get(b.index() as usize).unwrap().current, 4.0);
    }

    #[test]
    fn test_snapshot_restore_through_names() {
        let (mut registry, health) = setup();
        let frozen = registry.register_flag("frozen").unwrap();
        let id = registry.create_entity().unwrap();
        registry.add_component(id, health, Health { current: 7.0, max: 9.0 }).unwrap();
        registry.add_flag(id, frozen).unwrap();

        let snapshot = registry.snapshot_entity(id).unwrap();
        let table = registry.schema_table();

        // A fresh process registering types in a different order.
        let mut other = Registry::new(10);
        other.register_component_type::<u32>("ammo").unwrap();
        let other_health = other.register_component_type::<Health>("health").unwrap();
        other.register_flag("unused").unwrap();
        let other_frozen = other.register_flag("frozen").unwrap();

        let restored = other.restore_entity(&snapshot, &table).unwrap();
        assert_eq!(
            other.get::<Health>(restored, other_health).unwrap(),
            Health { current: 7.0, max: 9.0 }
        );
        assert!(other.has_flag(restored, other_frozen));
    }

    #[test]
    fn test_restore_unknown_name_creates_nothing() {
        let (mut registry, health) = setup();
        let id = registry.create_entity().unwrap();
        registry.add_component(id, health, Health::default()).unwrap();
        let snapshot = registry.snapshot_entity(id).unwrap();
        let table = registry.schema_table();

        let mut other = Registry::new(10);
        assert!(matches!(
            other.restore_entity(&snapshot, &table),
            Err(SimError::NotFound(Missing::ComponentType(_)))
        ));
        assert_eq!(other.alive_count(), 0);
    }
}
