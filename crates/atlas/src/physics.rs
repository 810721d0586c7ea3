//! # Projectile Motion
//!
//! Integration order (this is the contract the tests pin down):
//!
//! ```text
//! a  = g - (friction / mass) * v
//! v += a * dt
//! p += v * dt          (semi-implicit Euler)
//! direction = normalize(v)   unless |v| = 0
//! ```
//!
//! Bullets ignore gravity and drag: `p += direction * speed * dt`.

use atlas_shared::{Aabb, Vec3, GRAVITY};

use crate::components::Transform;

/// Gravity vector.
pub const GRAVITY_VECTOR: Vec3 = Vec3::new(0.0, -GRAVITY, 0.0);

/// Advances a ballistic body under gravity and linear drag.
pub fn integrate_ballistic(transform: &mut Transform, mass: f32, friction: f32, dt: f32) {
    let drag = transform.velocity * (friction / mass);
    transform.acceleration = GRAVITY_VECTOR - drag;
    transform.velocity += transform.acceleration * dt;
    transform.position += transform.velocity * dt;
    if transform.velocity.length_squared() > 0.0 {
        transform.direction = transform.velocity.normalize_or_zero();
    }
}

/// Advances a body in a straight line along its heading.
///
/// Returns the distance covered.
pub fn advance_straight(transform: &mut Transform, speed: f32, dt: f32) -> f32 {
    transform.velocity = transform.direction * speed;
    transform.acceleration = Vec3::ZERO;
    transform.position += transform.velocity * dt;
    speed * dt
}

/// Box swept by a cube of half size `half_extent` moving from `start` to `end`.
#[must_use]
pub fn swept_box(start: Vec3, end: Vec3, half_extent: f32) -> Aabb {
    let half = Vec3::splat(half_extent);
    Aabb::from_center(start, half).union(&Aabb::from_center(end, half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ballistic_step_order() {
        let mut t = Transform::moving(Vec3::ZERO, Vec3::X, 10.0);
        integrate_ballistic(&mut t, 2.0, 1.0, 1.0);

        // a = (0, -g, 0) - 0.5 * (10, 0, 0)
        assert_eq!(t.acceleration, Vec3::new(-5.0, -GRAVITY, 0.0));
        // Velocity first, then position from the new velocity.
        assert_eq!(t.velocity, Vec3::new(5.0, -GRAVITY, 0.0));
        assert_eq!(t.position, Vec3::new(5.0, -GRAVITY, 0.0));
        assert!((t.direction.length() - 1.0).abs() < 1e-6);
        assert!(t.direction.y < 0.0);
    }

    #[test]
    fn test_direction_kept_at_rest() {
        let mut t = Transform::at(Vec3::ZERO);
        t.direction = Vec3::X;
        // A zero step leaves the body at rest.
        integrate_ballistic(&mut t, 1.0, 0.0, 0.0);
        assert_eq!(t.direction, Vec3::X);
    }

    #[test]
    fn test_straight_line() {
        let mut t = Transform::moving(Vec3::ZERO, Vec3::X, 10.0);
        let covered = advance_straight(&mut t, 10.0, 1.0);
        assert_eq!(covered, 10.0);
        assert_eq!(t.position, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_swept_box_spans_both_ends() {
        let swept = swept_box(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), 0.0);
        assert_eq!(swept.min, Vec3::ZERO);
        assert_eq!(swept.max, Vec3::new(10.0, 0.0, 0.0));
    }
}
