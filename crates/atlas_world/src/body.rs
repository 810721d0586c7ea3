//! Spatial presence of an entity: where it is, how big, whether it moves.

use atlas_shared::{Aabb, Vec3};

use crate::broad_phase::Mobility;

/// Position, extents and mobility of an entity in the broad phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    /// Centre of the box.
    pub position: Vec3,
    /// Half the box size on each axis.
    pub half_extents: Vec3,
    /// Static bodies never move.
    pub mobility: Mobility,
}

impl Body {
    /// A static body.
    #[must_use]
    pub const fn fixed(position: Vec3, half_extents: Vec3) -> Self {
        Self {
            position,
            half_extents,
            mobility: Mobility::Static,
        }
    }

    /// A moveable body.
    #[must_use]
    pub const fn moving(position: Vec3, half_extents: Vec3) -> Self {
        Self {
            position,
            half_extents,
            mobility: Mobility::Moveable,
        }
    }

    /// Box covered by the body.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.position, self.half_extents)
    }

    /// Body matching a box.
    #[must_use]
    pub fn from_aabb(aabb: &Aabb, mobility: Mobility) -> Self {
        Self {
            position: aabb.center(),
            half_extents: aabb.half_extents(),
            mobility,
        }
    }
}
