//! # System Contract
//!
//! Every gameplay or engine system (render, sound, physics, perception,
//! missiles...) implements [`System`]. The scheduler calls the three phase
//! hooks generically and knows nothing else about the system.
//!
//! ## What a system may touch inside a phase
//!
//! | Resource            | Access                                        |
//! |---------------------|-----------------------------------------------|
//! | Component columns   | read/write locks, as declared in `access()`   |
//! | Broad phase, grid   | read/write locks; writes only in dynamics     |
//! | Event bus           | write, send, read delivered events            |
//! | Structure           | queued on `ctx.commands`, applied at boundary |

use std::fmt;

use atlas_core::{ComponentTypeId, Delivery, EntityId, EventBus, Registry, SimResult};
use atlas_world::{ActiveGrid, BroadPhase};
use parking_lot::RwLock;

use crate::commands::CommandQueue;
use crate::resources::ResourceTable;

/// One of the three barrier-separated stages of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Spawning and setup.
    Create,
    /// Motion and broad-phase updates.
    Dynamics,
    /// Overlap reactions and event handling.
    Logic,
}

impl Phase {
    /// All phases in frame order.
    pub const ALL: [Self; 3] = [Self::Create, Self::Dynamics, Self::Logic];

    /// Lower-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Dynamics => "dynamics",
            Self::Logic => "logic",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Spatial structures a system declares it uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpatialAccess {
    /// Neither broad phase nor grid.
    #[default]
    None,
    /// Queries only.
    Read,
    /// Moves proxies or entity cells.
    Write,
}

/// Declared data access of a system.
///
/// The scheduler runs two systems concurrently only if their declarations
/// do not conflict. Declarations are trusted, not checked: a system that
/// locks an undeclared column may contend or deadlock with a neighbour.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemAccess {
    reads: Vec<ComponentTypeId>,
    writes: Vec<ComponentTypeId>,
    spatial: SpatialAccess,
}

impl SystemAccess {
    /// No access.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a read of a component column.
    #[must_use]
    pub fn read(mut self, ty: ComponentTypeId) -> Self {
        if !self.reads.contains(&ty) {
            self.reads.push(ty);
        }
        self
    }

    /// Declares a write of a component column.
    #[must_use]
    pub fn write(mut self, ty: ComponentTypeId) -> Self {
        if !self.writes.contains(&ty) {
            self.writes.push(ty);
        }
        self
    }

    /// Declares broad-phase and grid queries.
    #[must_use]
    pub fn spatial_read(mut self) -> Self {
        self.spatial = self.spatial.max(SpatialAccess::Read);
        self
    }

    /// Declares broad-phase and grid updates.
    #[must_use]
    pub fn spatial_write(mut self) -> Self {
        self.spatial = SpatialAccess::Write;
        self
    }

    /// Columns read.
    #[must_use]
    pub fn reads(&self) -> &[ComponentTypeId] {
        &self.reads
    }

    /// Columns written.
    #[must_use]
    pub fn writes(&self) -> &[ComponentTypeId] {
        &self.writes
    }

    /// Spatial access level.
    #[must_use]
    pub const fn spatial(&self) -> SpatialAccess {
        self.spatial
    }

    /// Returns true if the two systems must not run at the same time.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        let touches = |access: &Self, ty: &ComponentTypeId| {
            access.reads.contains(ty) || access.writes.contains(ty)
        };
        let spatial = self.spatial.max(other.spatial) == SpatialAccess::Write
            && self.spatial.min(other.spatial) != SpatialAccess::None;
        spatial
            || self.writes.iter().any(|ty| touches(other, ty))
            || other.writes.iter().any(|ty| touches(self, ty))
    }
}

/// The shared, thread-safe part of the world visible inside a phase.
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    /// Current frame number.
    pub frame: u64,
    /// Entity registry. Structure is frozen for the phase.
    pub registry: &'a Registry,
    /// Event bus.
    pub bus: &'a EventBus,
    /// Broad phase.
    pub broad_phase: &'a RwLock<BroadPhase>,
    /// Active grid.
    pub grid: &'a RwLock<ActiveGrid>,
    /// Immutable templates.
    pub resources: &'a ResourceTable,
    /// Overlapping pairs from the last dynamics boundary, sorted.
    pub overlaps: &'a [(EntityId, EntityId)],
}

/// Everything one system sees during one phase call.
pub struct PhaseContext<'a> {
    /// Current frame number.
    pub frame: u64,
    /// Entity registry. Structure is frozen for the phase.
    pub registry: &'a Registry,
    /// Event bus.
    pub bus: &'a EventBus,
    /// Broad phase.
    pub broad_phase: &'a RwLock<BroadPhase>,
    /// Active grid.
    pub grid: &'a RwLock<ActiveGrid>,
    /// Immutable templates.
    pub resources: &'a ResourceTable,
    /// Overlapping pairs from the last dynamics boundary, sorted.
    pub overlaps: &'a [(EntityId, EntityId)],
    /// Events delivered by this frame's bus update (logic phase only).
    pub deliveries: &'a [Delivery],
    /// This system's structural change queue.
    pub commands: &'a CommandQueue,
}

impl<'a> PhaseContext<'a> {
    /// Builds the context of one system.
    #[must_use]
    pub fn new(view: WorldView<'a>, deliveries: &'a [Delivery], commands: &'a CommandQueue) -> Self {
        Self {
            frame: view.frame,
            registry: view.registry,
            bus: view.bus,
            broad_phase: view.broad_phase,
            grid: view.grid,
            resources: view.resources,
            overlaps: view.overlaps,
            deliveries,
            commands,
        }
    }

    /// Deliveries addressed to `receiver`, in FIFO order.
    pub fn deliveries_for(&self, receiver: EntityId) -> impl Iterator<Item = &Delivery> + '_ {
        self.deliveries.iter().filter(move |d| d.receiver == receiver)
    }

    /// Entities overlapping `id`, in pair order.
    pub fn overlaps_of(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.overlaps.iter().filter_map(move |&(a, b)| {
            if a == id {
                Some(b)
            } else if b == id {
                Some(a)
            } else {
                None
            }
        })
    }
}

/// The three-phase contract every system implements.
///
/// All hooks default to doing nothing. A hook that fails is reported by the
/// scheduler and, under `FailurePolicy::Halt`, retried on the next
/// `run_frame` call; it must therefore leave the world consistent when it
/// returns an error.
pub trait System: Send {
    /// Unique name, used in reports and logs.
    fn name(&self) -> &str;

    /// Component columns and spatial structures this system touches.
    fn access(&self) -> SystemAccess {
        SystemAccess::new()
    }

    /// Create phase.
    ///
    /// # Errors
    ///
    /// Any error the system's work produced.
    fn update_create(&mut self, _ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        Ok(())
    }

    /// Dynamics phase.
    ///
    /// # Errors
    ///
    /// Any error the system's work produced.
    fn update_dynamics(&mut self, _ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        Ok(())
    }

    /// Logic phase.
    ///
    /// # Errors
    ///
    /// Any error the system's work produced.
    fn update_logic(&mut self, _ctx: &PhaseContext<'_>, _dt: f32) -> SimResult<()> {
        Ok(())
    }

    /// Dispatches to the hook of `phase`.
    ///
    /// # Errors
    ///
    /// Whatever the hook returns.
    fn run_phase(&mut self, phase: Phase, ctx: &PhaseContext<'_>, dt: f32) -> SimResult<()> {
        match phase {
            Phase::Create => self.update_create(ctx, dt),
            Phase::Dynamics => self.update_dynamics(ctx, dt),
            Phase::Logic => self.update_logic(ctx, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ComponentTypeId, ComponentTypeId) {
        let mut registry = Registry::new(1);
        (
            registry.register_component_type::<f32>("a").unwrap(),
            registry.register_component_type::<u32>("b").unwrap(),
        )
    }

    #[test]
    fn test_readers_share() {
        let (a, _) = ids();
        let x = SystemAccess::new().read(a).spatial_read();
        let y = SystemAccess::new().read(a).spatial_read();
        assert!(!x.conflicts_with(&y));
    }

    #[test]
    fn test_writer_excludes_reader() {
        let (a, b) = ids();
        let writer = SystemAccess::new().write(a);
        let reader = SystemAccess::new().read(a);
        let other = SystemAccess::new().write(b);
        assert!(writer.conflicts_with(&reader));
        assert!(reader.conflicts_with(&writer));
        assert!(!writer.conflicts_with(&other));
    }

    #[test]
    fn test_spatial_writers_are_exclusive() {
        let mover = SystemAccess::new().spatial_write();
        let query = SystemAccess::new().spatial_read();
        let none = SystemAccess::new();
        assert!(mover.conflicts_with(&mover.clone()));
        assert!(mover.conflicts_with(&query));
        assert!(!mover.conflicts_with(&none));
        assert!(!query.conflicts_with(&query.clone()));
    }
}
