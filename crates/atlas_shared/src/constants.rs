//! # World Constants
//!
//! Defaults for the world lattice and the simulation clock.
//! Runtime values live in `SimulationConfig`; these are only its defaults.

// =============================================================================
// WORLD LATTICE
// =============================================================================

/// Edge length of one cell in world units (cells are cubes).
pub const CELL_SIZE: f32 = 64.0;

/// World lattice size in cells along X.
pub const WORLD_CELLS_X: u32 = 1024;

/// World lattice size in cells along Y (vertical).
pub const WORLD_CELLS_Y: u32 = 64;

/// World lattice size in cells along Z.
pub const WORLD_CELLS_Z: u32 = 1024;

/// Edge length of the active window in cells. Must be odd.
pub const DEFAULT_WINDOW_SIZE: u32 = 17;

// =============================================================================
// SIMULATION
// =============================================================================

/// Tick rate (frames per second).
pub const TICK_RATE: u32 = 60;

/// Gravity acceleration along -Y in world units per second squared.
pub const GRAVITY: f32 = 9.81;
