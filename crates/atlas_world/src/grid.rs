//! # Active Grid
//!
//! An odd-sized cubic window of cells kept live around a focus point.
//!
//! ## Layout
//!
//! Window cells live in a ring buffer of `window³` slots addressed by
//! `coord mod window` on each axis. Any `window` consecutive coordinates
//! along an axis hit distinct residues, so two cells of the same window
//! never share a slot, and sliding the window only rewrites the slots of
//! the cells that left.
//!
//! ## Cell lifecycle
//!
//! ```text
//!            set_focus (Load)          mark_loaded
//! Unloaded ──────────────────> PendingLoad ─────────> Active
//!    ▲                                                  │
//!    │      complete_evict                set_focus     │
//!    └──────────────────── PendingEvict <───(Evict)─────┘
//! ```
//!
//! A cell leaving the window frees its slot immediately and waits in the
//! eviction table until the caller has serialized it. If it re-enters the
//! window before that, the eviction is cancelled and the cell takes its old
//! state back, entities included.

use std::collections::{BTreeMap, HashMap};

use atlas_core::{Bound, EntityId, Missing, SimError, SimResult};
use atlas_shared::{Vec3, CELL_SIZE, DEFAULT_WINDOW_SIZE};

use crate::cell::{CellCoord, WorldLattice};

/// State of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    /// Not in memory.
    Unloaded,
    /// In the window, waiting for its record.
    PendingLoad,
    /// In the window and simulated.
    Active,
    /// Left the window, waiting to be serialized.
    PendingEvict,
}

/// Work the caller must do for one cell after a focus move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellOp {
    /// Serialize, then unload.
    Evict,
    /// Load the cell's record (if any) and activate it.
    Load,
}

/// Grid parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    /// Cell edge length in world units.
    pub cell_size: f32,
    /// Window edge length in cells. Must be odd.
    pub window_size: u32,
    /// World lattice size.
    pub lattice: WorldLattice,
}

impl GridConfig {
    /// Checks the window against the lattice.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an even or zero window, a window wider than the
    /// lattice, or a non-positive cell size.
    pub fn validate(&self) -> SimResult<()> {
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(SimError::InvalidConfig(format!(
                "window size must be odd, got {}",
                self.window_size
            )));
        }
        let smallest = self.lattice.x.min(self.lattice.y).min(self.lattice.z);
        if self.window_size > smallest {
            return Err(SimError::InvalidConfig(format!(
                "window size {} exceeds lattice dimension {smallest}",
                self.window_size
            )));
        }
        if self.cell_size.is_nan() || self.cell_size <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "cell size must be positive, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }

    /// Window radius in cells.
    #[must_use]
    pub const fn radius(&self) -> i32 {
        (self.window_size / 2) as i32
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: CELL_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            lattice: WorldLattice::default(),
        }
    }
}

/// A cell handed back by `complete_evict`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedCell {
    /// The cell.
    pub coord: CellCoord,
    /// Entities that were in it, in insertion order.
    pub entities: Vec<EntityId>,
    /// False if the cell left the window before its load completed. Its
    /// stored record is then still the authoritative one.
    pub was_loaded: bool,
}

#[derive(Debug)]
struct Evicting {
    entities: Vec<EntityId>,
    state: CellState,
}

#[derive(Debug)]
struct Slot {
    coord: CellCoord,
    state: CellState,
    entities: Vec<EntityId>,
    failed_loads: u32,
}

/// The sliding window of loaded cells.
pub struct ActiveGrid {
    config: GridConfig,
    /// Ring buffer of `window³` slots.
    slots: Vec<Option<Slot>>,
    /// Window centre after the last `set_focus`.
    focus: Option<CellCoord>,
    /// Cells that left the window and are not serialized yet.
    evicting: BTreeMap<CellCoord, Evicting>,
    /// Owning cell per tracked entity.
    entity_cells: HashMap<EntityId, CellCoord>,
}

impl ActiveGrid {
    /// Creates an empty grid with no focus.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the config does not validate.
    pub fn new(config: GridConfig) -> SimResult<Self> {
        config.validate()?;
        let n = config.window_size as usize;
        let mut slots = Vec::with_capacity(n * n * n);
        slots.resize_with(n * n * n, || None);
        Ok(Self {
            config,
            slots,
            focus: None,
            evicting: BTreeMap::new(),
            entity_cells: HashMap::new(),
        })
    }

    /// Grid parameters.
    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Window centre, if a focus was set.
    #[must_use]
    pub const fn focus(&self) -> Option<CellCoord> {
        self.focus
    }

    /// Cell containing a world position.
    ///
    /// # Errors
    ///
    /// `OutOfRange` for a non-finite position.
    pub fn cell_at(&self, position: Vec3) -> SimResult<CellCoord> {
        CellCoord::from_position(position, self.config.cell_size)
    }

    /// Checks that an entity may live in `coord`, a loaded cell of the
    /// window.
    ///
    /// # Errors
    ///
    /// `OutOfRange` naming the first bound `coord` crosses.
    pub fn check_placement(&self, coord: CellCoord) -> SimResult<()> {
        if !self.config.lattice.contains(coord) {
            return Err(SimError::OutOfRange(Bound::World(coord.to_array())));
        }
        if !self.window_contains(coord) {
            return Err(SimError::OutOfRange(Bound::Window(coord.to_array())));
        }
        if self.cell_state(coord) != CellState::Active {
            return Err(SimError::OutOfRange(Bound::NotLoaded(coord.to_array())));
        }
        Ok(())
    }

    fn slot_index(&self, coord: CellCoord) -> usize {
        let n = self.config.window_size as i32;
        let x = coord.x.rem_euclid(n) as usize;
        let y = coord.y.rem_euclid(n) as usize;
        let z = coord.z.rem_euclid(n) as usize;
        let n = n as usize;
        (x * n + y) * n + z
    }

    fn slot(&self, coord: CellCoord) -> Option<&Slot> {
        self.slots[self.slot_index(coord)]
            .as_ref()
            .filter(|slot| slot.coord == coord)
    }

    fn slot_mut(&mut self, coord: CellCoord) -> Option<&mut Slot> {
        let index = self.slot_index(coord);
        self.slots[index].as_mut().filter(|slot| slot.coord == coord)
    }

    /// Returns true if `coord` lies inside the current window.
    #[must_use]
    pub fn window_contains(&self, coord: CellCoord) -> bool {
        self.focus.is_some_and(|focus| {
            focus.chebyshev(coord) <= self.config.radius() as u32 && self.config.lattice.contains(coord)
        })
    }

    /// Every coordinate of the window around `center`, clipped to the lattice.
    fn window_cells(&self, center: CellCoord) -> Vec<CellCoord> {
        let r = self.config.radius();
        let (min, max) = (self.config.lattice.min(), self.config.lattice.max());
        let mut cells = Vec::new();
        for x in (center.x - r).max(min.x)..=(center.x + r).min(max.x) {
            for y in (center.y - r).max(min.y)..=(center.y + r).min(max.y) {
                for z in (center.z - r).max(min.z)..=(center.z + r).min(max.z) {
                    cells.push(CellCoord::new(x, y, z));
                }
            }
        }
        cells
    }

    /// Recentres the window on `position`.
    ///
    /// Returns the cells that left (`Evict`) and entered (`Load`) the window
    /// since the previous call: all evictions first, then all loads, each
    /// group in coordinate order. Calling again with a position in the same
    /// cell returns nothing.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `position` lies outside the world lattice; the grid is
    /// left unchanged.
    pub fn set_focus(&mut self, position: Vec3) -> SimResult<Vec<(CellCoord, CellOp)>> {
        let center = self.cell_at(position)?;
        if !self.config.lattice.contains(center) {
            return Err(SimError::OutOfRange(Bound::World(center.to_array())));
        }
        if self.focus == Some(center) {
            return Ok(Vec::new());
        }

        let old_focus = self.focus.replace(center);
        let mut transitions = Vec::new();

        // Evictions: every occupied slot whose cell fell out of the window.
        if old_focus.is_some() {
            let mut leaving: Vec<CellCoord> = self
                .slots
                .iter()
                .flatten()
                .map(|slot| slot.coord)
                .filter(|&coord| !self.window_contains(coord))
                .collect();
            leaving.sort_unstable();
            for coord in leaving {
                let index = self.slot_index(coord);
                if let Some(slot) = self.slots[index].take() {
                    self.evicting.insert(
                        coord,
                        Evicting {
                            entities: slot.entities,
                            state: slot.state,
                        },
                    );
                    transitions.push((coord, CellOp::Evict));
                }
            }
        }

        // Loads: window cells without a slot, in coordinate order.
        for coord in self.window_cells(center) {
            if self.slot(coord).is_some() {
                continue;
            }
            let index = self.slot_index(coord);
            if let Some(evicting) = self.evicting.remove(&coord) {
                tracing::debug!(cell = %coord, "eviction cancelled, cell re-entered window");
                if evicting.state == CellState::PendingLoad {
                    transitions.push((coord, CellOp::Load));
                }
                self.slots[index] = Some(Slot {
                    coord,
                    state: evicting.state,
                    entities: evicting.entities,
                    failed_loads: 0,
                });
            } else {
                self.slots[index] = Some(Slot {
                    coord,
                    state: CellState::PendingLoad,
                    entities: Vec::new(),
                    failed_loads: 0,
                });
                transitions.push((coord, CellOp::Load));
            }
        }

        tracing::debug!(
            focus = %center,
            evict = transitions.iter().filter(|(_, op)| *op == CellOp::Evict).count(),
            load = transitions.iter().filter(|(_, op)| *op == CellOp::Load).count(),
            "focus moved"
        );
        Ok(transitions)
    }

    /// State of a cell.
    #[must_use]
    pub fn cell_state(&self, coord: CellCoord) -> CellState {
        if let Some(slot) = self.slot(coord) {
            slot.state
        } else if self.evicting.contains_key(&coord) {
            CellState::PendingEvict
        } else {
            CellState::Unloaded
        }
    }

    /// Marks a pending cell as loaded and simulated.
    ///
    /// # Errors
    ///
    /// `NotFound` if the cell is not in the window.
    pub fn mark_loaded(&mut self, coord: CellCoord) -> SimResult<()> {
        let slot = self
            .slot_mut(coord)
            .ok_or(SimError::NotFound(Missing::Cell(coord.to_array())))?;
        slot.state = CellState::Active;
        slot.failed_loads = 0;
        Ok(())
    }

    /// Records a failed load; the cell stays pending.
    ///
    /// Returns the number of consecutive failures.
    ///
    /// # Errors
    ///
    /// `NotFound` if the cell is not in the window.
    pub fn mark_load_failed(&mut self, coord: CellCoord) -> SimResult<u32> {
        let slot = self
            .slot_mut(coord)
            .ok_or(SimError::NotFound(Missing::Cell(coord.to_array())))?;
        slot.failed_loads += 1;
        Ok(slot.failed_loads)
    }

    /// Finishes an eviction and hands back the cell's entities, which the
    /// grid no longer tracks.
    ///
    /// # Errors
    ///
    /// `NotFound` if the cell is not pending eviction.
    pub fn complete_evict(&mut self, coord: CellCoord) -> SimResult<EvictedCell> {
        let evicting = self
            .evicting
            .remove(&coord)
            .ok_or(SimError::NotFound(Missing::Cell(coord.to_array())))?;
        for id in &evicting.entities {
            self.entity_cells.remove(id);
        }
        Ok(EvictedCell {
            coord,
            entities: evicting.entities,
            was_loaded: evicting.state == CellState::Active,
        })
    }

    /// Cells in the window (pending or active), in coordinate order.
    #[must_use]
    pub fn loaded_cells(&self) -> Vec<CellCoord> {
        let mut cells: Vec<_> = self.slots.iter().flatten().map(|slot| slot.coord).collect();
        cells.sort_unstable();
        cells
    }

    /// Cells still waiting for their record.
    #[must_use]
    pub fn pending_loads(&self) -> Vec<CellCoord> {
        let mut cells: Vec<_> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.state == CellState::PendingLoad)
            .map(|slot| slot.coord)
            .collect();
        cells.sort_unstable();
        cells
    }

    /// Cells waiting to be serialized.
    #[must_use]
    pub fn pending_evictions(&self) -> Vec<CellCoord> {
        self.evicting.keys().copied().collect()
    }

    // =========================================================================
    // Entity membership
    // =========================================================================

    /// Moves an entity to the cell containing `position`.
    ///
    /// Returns `true` if its cell changed. Calling again with a position in
    /// the same cell is a no-op.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the cell is outside the window or the lattice, not
    /// loaded yet, or the position is not finite. The entity keeps its
    /// previous cell; clamping or despawning is up to the caller.
    pub fn update_entity_cell(&mut self, id: EntityId, position: Vec3) -> SimResult<bool> {
        let coord = self.cell_at(position)?;
        let previous = self.entity_cells.get(&id).copied();
        if previous == Some(coord) {
            return Ok(false);
        }
        self.check_placement(coord)?;

        if let Some(old) = previous {
            self.unlink(id, old);
        }
        if let Some(slot) = self.slot_mut(coord) {
            slot.entities.push(id);
        }
        self.entity_cells.insert(id, coord);
        Ok(true)
    }

    /// Stops tracking an entity.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity is not in any cell.
    pub fn remove_entity(&mut self, id: EntityId) -> SimResult<CellCoord> {
        let coord = self.entity_cells.remove(&id).ok_or(SimError::entity(id))?;
        self.unlink(id, coord);
        Ok(coord)
    }

    fn unlink(&mut self, id: EntityId, coord: CellCoord) {
        let list = match self.slot_mut(coord) {
            Some(slot) => Some(&mut slot.entities),
            None => self.evicting.get_mut(&coord).map(|e| &mut e.entities),
        };
        if let Some(list) = list {
            list.retain(|&e| e != id);
        }
    }

    /// Cell that owns an entity.
    #[must_use]
    pub fn cell_of(&self, id: EntityId) -> Option<CellCoord> {
        self.entity_cells.get(&id).copied()
    }

    /// Entities in a window cell, in insertion order.
    #[must_use]
    pub fn cell_entities(&self, coord: CellCoord) -> &[EntityId] {
        self.slot(coord)
            .map(|slot| slot.entities.as_slice())
            .or_else(|| self.evicting.get(&coord).map(|e| e.entities.as_slice()))
            .unwrap_or(&[])
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entity_cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> ActiveGrid {
        ActiveGrid::new(GridConfig {
            cell_size: 10.0,
            window_size: 3,
            lattice: WorldLattice::new(64, 64, 64),
        })
        .unwrap()
    }

    fn load_all(grid: &mut ActiveGrid) {
        for coord in grid.pending_loads() {
            grid.mark_loaded(coord).unwrap();
        }
    }

    #[test]
    fn test_first_focus_loads_window() {
        let mut grid = small_grid();
        let transitions = grid.set_focus(Vec3::new(5.0, 5.0, 5.0)).unwrap();
        assert_eq!(transitions.len(), 27);
        assert!(transitions.iter().all(|(_, op)| *op == CellOp::Load));
        assert_eq!(grid.cell_state(CellCoord::new(1, 1, 1)), CellState::PendingLoad);
        assert_eq!(grid.cell_state(CellCoord::new(2, 0, 0)), CellState::Unloaded);
    }

    #[test]
    fn test_move_evicts_then_loads() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        let transitions = grid.set_focus(Vec3::new(10.0, 0.0, 0.0)).unwrap();

        assert_eq!(transitions.len(), 18);
        let first_load = transitions.iter().position(|(_, op)| *op == CellOp::Load).unwrap();
        assert_eq!(first_load, 9);
        assert!(transitions[..9].iter().all(|(c, op)| *op == CellOp::Evict && c.x == -1));
        assert!(transitions[9..].iter().all(|(c, _)| c.x == 2));
        assert_eq!(grid.cell_state(CellCoord::new(-1, 0, 0)), CellState::PendingEvict);
    }

    #[test]
    fn test_same_cell_focus_is_noop() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        assert!(grid.set_focus(Vec3::new(9.0, 9.0, 9.0)).unwrap().is_empty());
    }

    #[test]
    fn test_window_clipped_to_lattice() {
        let mut grid = ActiveGrid::new(GridConfig {
            cell_size: 10.0,
            window_size: 3,
            lattice: WorldLattice::new(4, 4, 4),
        })
        .unwrap();
        // Centre on the lattice's max corner (1, 1, 1): only 2x2x2 cells exist.
        let transitions = grid.set_focus(Vec3::new(15.0, 15.0, 15.0)).unwrap();
        assert_eq!(transitions.len(), 8);
        assert!(matches!(
            grid.set_focus(Vec3::new(25.0, 0.0, 0.0)),
            Err(SimError::OutOfRange(Bound::World(_)))
        ));
    }

    #[test]
    fn test_entity_membership() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        load_all(&mut grid);
        let id = EntityId::new(0, 0);

        assert!(grid.update_entity_cell(id, Vec3::new(1.0, 1.0, 1.0)).unwrap());
        assert!(!grid.update_entity_cell(id, Vec3::new(2.0, 2.0, 2.0)).unwrap());
        assert!(grid.update_entity_cell(id, Vec3::new(-5.0, 1.0, 1.0)).unwrap());
        assert_eq!(grid.cell_of(id), Some(CellCoord::new(-1, 0, 0)));
        assert!(grid.cell_entities(CellCoord::new(0, 0, 0)).is_empty());

        assert_eq!(
            grid.update_entity_cell(id, Vec3::new(25.0, 0.0, 0.0)),
            Err(SimError::OutOfRange(Bound::Window([2, 0, 0])))
        );
        assert_eq!(grid.cell_of(id), Some(CellCoord::new(-1, 0, 0)));
    }

    #[test]
    fn test_pending_cell_takes_no_entities() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        grid.mark_loaded(CellCoord::new(0, 0, 0)).unwrap();
        let id = EntityId::new(0, 0);

        grid.update_entity_cell(id, Vec3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(
            grid.update_entity_cell(id, Vec3::new(15.0, 1.0, 1.0)),
            Err(SimError::OutOfRange(Bound::NotLoaded([1, 0, 0])))
        );
        assert_eq!(grid.cell_of(id), Some(CellCoord::new(0, 0, 0)));
        assert!(grid.cell_entities(CellCoord::new(1, 0, 0)).is_empty());

        assert_eq!(
            grid.update_entity_cell(id, Vec3::new(f32::NAN, 0.0, 0.0)),
            Err(SimError::OutOfRange(Bound::NonFinite))
        );
        assert!(grid.set_focus(Vec3::new(0.0, f32::INFINITY, 0.0)).is_err());
        assert_eq!(grid.focus(), Some(CellCoord::new(0, 0, 0)));
    }

    #[test]
    fn test_evicted_cell_hands_back_entities() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        load_all(&mut grid);
        let id = EntityId::new(0, 0);
        grid.update_entity_cell(id, Vec3::new(-5.0, 0.0, 0.0)).unwrap();

        grid.set_focus(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let evicted = grid.complete_evict(CellCoord::new(-1, 0, 0)).unwrap();
        assert_eq!(evicted.entities, vec![id]);
        assert!(evicted.was_loaded);
        assert_eq!(grid.cell_of(id), None);
        assert_eq!(grid.cell_state(CellCoord::new(-1, 0, 0)), CellState::Unloaded);
    }

    #[test]
    fn test_reentering_cell_cancels_eviction() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        load_all(&mut grid);
        let id = EntityId::new(0, 0);
        grid.update_entity_cell(id, Vec3::new(-5.0, 0.0, 0.0)).unwrap();

        grid.set_focus(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let back = grid.set_focus(Vec3::ZERO).unwrap();
        assert!(!back.contains(&(CellCoord::new(-1, 0, 0), CellOp::Load)));
        assert_eq!(grid.cell_state(CellCoord::new(-1, 0, 0)), CellState::Active);
        assert_eq!(grid.cell_entities(CellCoord::new(-1, 0, 0)), &[id]);
        assert!(back.contains(&(CellCoord::new(2, 0, 0), CellOp::Evict)));
    }

    #[test]
    fn test_unloaded_cell_reenters_as_pending() {
        let mut grid = small_grid();
        grid.set_focus(Vec3::ZERO).unwrap();
        grid.set_focus(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        let back = grid.set_focus(Vec3::ZERO).unwrap();
        assert!(back.contains(&(CellCoord::new(-1, 0, 0), CellOp::Load)));
        assert_eq!(grid.cell_state(CellCoord::new(-1, 0, 0)), CellState::PendingLoad);
    }

    #[test]
    fn test_even_window_rejected() {
        let config = GridConfig {
            window_size: 4,
            ..GridConfig::default()
        };
        assert!(matches!(ActiveGrid::new(config), Err(SimError::InvalidConfig(_))));
    }
}
