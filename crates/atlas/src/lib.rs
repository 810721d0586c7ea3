//! # ATLAS
//!
//! The simulation layer on top of the registry, the event bus and the
//! spatial world.
//!
//! ## Frame pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ CREATE      systems spawn (queued)            ── barrier ── │
//! │ DYNAMICS    systems move bodies               ── barrier ── │
//! │             commands, cell streaming, resort, bus update    │
//! │ LOGIC       systems react to overlaps/events  ── barrier ── │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use atlas::{GameComponents, GameEvents, ResourceTable, Scheduler, SimulationConfig, World};
//! use atlas_core::SchemaBuilder;
//!
//! let mut schema = SchemaBuilder::new();
//! let events = GameEvents::register(&mut schema)?;
//!
//! let config = SimulationConfig::default();
//! let mut world = World::new(config.clone(), schema.build(), Arc::new(ResourceTable::new()))?;
//! let components = GameComponents::register(world.registry_mut())?;
//!
//! let mut scheduler = Scheduler::from_config(&config);
//! scheduler.add_system(atlas::systems::BulletSystem::new(components, events))?;
//! let report = scheduler.run_frame(&mut world, 1.0 / 60.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod commands;
pub mod components;
pub mod config;
pub mod events;
pub mod physics;
pub mod resources;
pub mod scheduler;
pub mod system;
pub mod systems;
pub mod world;

pub use commands::{Command, CommandQueue, Spawn};
pub use components::{Bullet, Door, GameComponents, Launcher, Missile, Transform, TriggerVolume};
pub use config::{FailurePolicy, SimulationConfig};
pub use events::{GameEvents, Impact, TriggerCrossing};
pub use resources::{BulletResource, MissileResource, ResourceTable};
pub use scheduler::{FramePhase, FrameReport, PhaseTimings, Scheduler, SystemFailure};
pub use system::{Phase, PhaseContext, SpatialAccess, System, SystemAccess, WorldView};
pub use world::{StreamingStats, World};
