//! # Entity Registry
//!
//! Generational entity ids, named component columns and flags.
//!
//! ## Design Principles
//!
//! 1. **Pod components**: every component is `bytemuck::Pod`, so eviction is a byte copy
//! 2. **Generational ids**: a destroyed entity's id never resolves again
//! 3. **Column locks**: one `RwLock` per component type, so disjoint systems run in parallel

mod component;
mod entity;
mod registry;
mod snapshot;
mod storage;

pub use component::{Component, ComponentTypeId, FlagId};
pub use entity::{EntityId, EntitySlot};
pub use registry::{ComponentRead, ComponentWrite, Registry, MAX_COMPONENT_TYPES, MAX_FLAGS};
pub use snapshot::{EntitySnapshot, SchemaTable};
pub use storage::ComponentStorage;
