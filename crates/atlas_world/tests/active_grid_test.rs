//! # Active Grid Integration Test
//!
//! Walks the focus around the world and checks that the loaded set always
//! equals the window of the latest focus.

use std::collections::BTreeSet;

use atlas_core::EntityId;
use atlas_shared::Vec3;
use atlas_world::{ActiveGrid, CellCoord, CellOp, CellState, GridConfig, WorldLattice};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn grid() -> ActiveGrid {
    ActiveGrid::new(GridConfig {
        cell_size: 64.0,
        window_size: 5,
        lattice: WorldLattice::new(32, 16, 32),
    })
    .unwrap()
}

fn expected_window(grid: &ActiveGrid, focus: CellCoord) -> BTreeSet<CellCoord> {
    let lattice = grid.config().lattice;
    let r = grid.config().radius();
    let mut cells = BTreeSet::new();
    for x in focus.x - r..=focus.x + r {
        for y in focus.y - r..=focus.y + r {
            for z in focus.z - r..=focus.z + r {
                let c = CellCoord::new(x, y, z);
                if lattice.contains(c) {
                    cells.insert(c);
                }
            }
        }
    }
    cells
}

#[test]
fn test_loaded_set_tracks_focus() {
    let mut grid = grid();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut loaded: BTreeSet<CellCoord> = BTreeSet::new();

    for step in 0..200 {
        // Mostly short hops, sometimes a teleport.
        let span = if step % 25 == 0 { 900.0 } else { 150.0 };
        let focus_pos = Vec3::new(
            rng.gen_range(-span..span),
            rng.gen_range(-400.0..400.0),
            rng.gen_range(-span..span),
        );
        let transitions = grid.set_focus(focus_pos).unwrap();

        // Evicts strictly before loads.
        let first_load = transitions
            .iter()
            .position(|(_, op)| *op == CellOp::Load)
            .unwrap_or(transitions.len());
        assert!(transitions[first_load..].iter().all(|(_, op)| *op == CellOp::Load));

        for (coord, op) in transitions {
            match op {
                CellOp::Evict => {
                    assert!(loaded.remove(&coord), "evicted a cell that was not loaded");
                    grid.complete_evict(coord).unwrap();
                }
                CellOp::Load => {
                    assert!(loaded.insert(coord), "loaded a cell twice");
                    grid.mark_loaded(coord).unwrap();
                }
            }
        }

        let focus = grid.focus().unwrap();
        let expected = expected_window(&grid, focus);
        let actual: BTreeSet<_> = grid.loaded_cells().into_iter().collect();
        assert_eq!(actual, expected, "step {step}");
        assert_eq!(loaded, expected, "step {step}");
        assert!(grid.pending_evictions().is_empty());
        assert!(actual
            .iter()
            .all(|&c| grid.cell_state(c) == CellState::Active));
    }
}

#[test]
fn test_update_entity_cell_is_idempotent() {
    let mut grid = grid();
    grid.set_focus(Vec3::ZERO).unwrap();
    for coord in grid.pending_loads() {
        grid.mark_loaded(coord).unwrap();
    }
    let id = EntityId::new(3, 1);
    let position = Vec3::new(100.0, 10.0, -30.0);

    assert!(grid.update_entity_cell(id, position).unwrap());
    let cell = grid.cell_of(id).unwrap();
    let members = grid.cell_entities(cell).to_vec();

    assert!(!grid.update_entity_cell(id, position).unwrap());
    assert_eq!(grid.cell_of(id), Some(cell));
    assert_eq!(grid.cell_entities(cell), members.as_slice());
    assert_eq!(grid.entity_count(), 1);
}

#[test]
fn test_entities_follow_evictions() {
    let mut grid = grid();
    grid.set_focus(Vec3::ZERO).unwrap();
    for coord in grid.pending_loads() {
        grid.mark_loaded(coord).unwrap();
    }

    let near = EntityId::new(0, 0);
    let far = EntityId::new(1, 0);
    grid.update_entity_cell(near, Vec3::new(10.0, 10.0, 10.0)).unwrap();
    grid.update_entity_cell(far, Vec3::new(-100.0, 10.0, 10.0)).unwrap();

    // Moving one cell east drops the x = -2 column.
    let transitions = grid.set_focus(Vec3::new(64.0, 0.0, 0.0)).unwrap();
    let far_cell = CellCoord::new(-2, 0, 0);
    assert!(transitions.contains(&(far_cell, CellOp::Evict)));

    let evicted = grid.complete_evict(far_cell).unwrap();
    assert_eq!(evicted.entities, vec![far]);
    assert_eq!(grid.cell_of(far), None);
    assert_eq!(grid.cell_of(near), Some(CellCoord::new(0, 0, 0)));
}
