//! # ATLAS World
//!
//! The spatial layer of the simulation.
//!
//! - **Active Grid** (`grid`): only a window of cells around the focus point
//!   is simulated; memory is O(window³) whatever the world size.
//! - **Broad Phase** (`broad_phase`): sweep-and-prune overlap detection for
//!   static and moveable boxes.
//! - **Cell Records** (`persistence`): what an evicted cell becomes.
//! - **Streaming** (`store`, `streaming`): moving records to and from storage
//!   without stalling the frame.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atlas_world::{ActiveGrid, BroadPhase, GridConfig, Mobility};
//!
//! let mut grid = ActiveGrid::new(GridConfig::default())?;
//! for (cell, op) in grid.set_focus(player_position)? {
//!     // Evicts first, then loads.
//! }
//!
//! let mut broad_phase = BroadPhase::new();
//! broad_phase.insert(wall, wall_box, Mobility::Static)?;
//! broad_phase.insert(bullet, bullet_box, Mobility::Moveable)?;
//! let pairs = broad_phase.compute_overlaps();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod body;
pub mod broad_phase;
pub mod cell;
pub mod grid;
pub mod persistence;
pub mod store;
pub mod streaming;

pub use body::Body;
pub use broad_phase::{BroadPhase, Mobility};
pub use cell::{CellCoord, WorldLattice};
pub use grid::{ActiveGrid, CellOp, CellState, EvictedCell, GridConfig};
pub use persistence::{CellRecord, EntityRecord, RECORD_MAGIC, RECORD_VERSION};
pub use store::{CellStore, DirCellStore, MemoryCellStore};
pub use streaming::{CellStreamer, StreamResult};
