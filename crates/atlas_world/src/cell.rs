//! # Cells
//!
//! The world is a fixed lattice of cubic cells. A `CellCoord` addresses one
//! cell; positions map to cells by flooring `position / cell_size`.
//!
//! The lattice is centred on the origin: along an axis with `n` cells the
//! valid coordinates are `-(n / 2) .. n - n / 2`.

use std::fmt;

use atlas_core::{Bound, SimError, SimResult};
use atlas_shared::{Aabb, Vec3, WORLD_CELLS_X, WORLD_CELLS_Y, WORLD_CELLS_Z};

/// Cell coordinate (in cells, not world units).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellCoord {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate (vertical).
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell containing a world position.
    ///
    /// Finite positions beyond the `i32` range saturate, which puts them
    /// outside any lattice.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if a coordinate is NaN or infinite.
    #[inline]
    pub fn from_position(position: Vec3, cell_size: f32) -> SimResult<Self> {
        if !(position.x.is_finite() && position.y.is_finite() && position.z.is_finite()) {
            return Err(SimError::OutOfRange(Bound::NonFinite));
        }
        Ok(Self {
            x: (position.x / cell_size).floor() as i32,
            y: (position.y / cell_size).floor() as i32,
            z: (position.z / cell_size).floor() as i32,
        })
    }

    /// Converts to array.
    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array.
    #[inline]
    #[must_use]
    pub const fn from_array(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Chebyshev distance in cells.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        dx.max(dy).max(dz)
    }

    /// World-space box covered by this cell.
    #[must_use]
    pub fn bounds(self, cell_size: f32) -> Aabb {
        let min = Vec3::new(
            self.x as f32 * cell_size,
            self.y as f32 * cell_size,
            self.z as f32 * cell_size,
        );
        Aabb::new(min, min + Vec3::splat(cell_size))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Size of the world lattice in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldLattice {
    /// Cells along X.
    pub x: u32,
    /// Cells along Y.
    pub y: u32,
    /// Cells along Z.
    pub z: u32,
}

impl WorldLattice {
    /// Creates a lattice of the given size.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    fn axis_range(n: u32) -> (i32, i32) {
        let n = n as i32;
        (-(n / 2), n - n / 2 - 1)
    }

    /// Smallest valid coordinate.
    #[must_use]
    pub fn min(&self) -> CellCoord {
        CellCoord::new(
            Self::axis_range(self.x).0,
            Self::axis_range(self.y).0,
            Self::axis_range(self.z).0,
        )
    }

    /// Largest valid coordinate.
    #[must_use]
    pub fn max(&self) -> CellCoord {
        CellCoord::new(
            Self::axis_range(self.x).1,
            Self::axis_range(self.y).1,
            Self::axis_range(self.z).1,
        )
    }

    /// Returns true if `coord` lies inside the lattice.
    #[must_use]
    pub fn contains(&self, coord: CellCoord) -> bool {
        let (min, max) = (self.min(), self.max());
        (min.x..=max.x).contains(&coord.x)
            && (min.y..=max.y).contains(&coord.y)
            && (min.z..=max.z).contains(&coord.z)
    }
}

impl Default for WorldLattice {
    fn default() -> Self {
        Self::new(WORLD_CELLS_X, WORLD_CELLS_Y, WORLD_CELLS_Z)
    }
}
