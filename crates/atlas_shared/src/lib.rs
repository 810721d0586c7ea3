//! # ATLAS Shared
//!
//! Common types used by every layer of the simulation substrate.
//!
//! ## CRITICAL RULE
//!
//! This crate holds values, not state. Nothing in here knows about
//! entities, cells, or frames.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    CELL_SIZE, DEFAULT_WINDOW_SIZE, GRAVITY, TICK_RATE, WORLD_CELLS_X, WORLD_CELLS_Y, WORLD_CELLS_Z,
};
pub use math::{Aabb, Axis, Vec3};
