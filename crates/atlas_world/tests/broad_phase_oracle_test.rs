//! Sweep-and-prune must agree with the all-pairs test, whatever the input.

use atlas_core::EntityId;
use atlas_shared::{Aabb, Vec3};
use atlas_world::{BroadPhase, Mobility};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_box(rng: &mut ChaCha8Rng, spread: f32) -> Aabb {
    let center = Vec3::new(
        rng.gen_range(-spread..spread),
        rng.gen_range(-spread..spread),
        rng.gen_range(-spread..spread),
    );
    let half = Vec3::new(
        rng.gen_range(0.0..4.0),
        rng.gen_range(0.0..4.0),
        rng.gen_range(0.0..4.0),
    );
    Aabb::from_center(center, half)
}

fn populate(rng: &mut ChaCha8Rng, count: u32, spread: f32) -> BroadPhase {
    let mut bp = BroadPhase::new();
    for i in 0..count {
        let mobility = if rng.gen_bool(0.3) {
            Mobility::Static
        } else {
            Mobility::Moveable
        };
        bp.insert(EntityId::new(i, 0), random_box(rng, spread), mobility)
            .unwrap();
    }
    bp
}

#[test]
fn test_matches_brute_force_on_random_sets() {
    for seed in 0..20 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let count = rng.gen_range(1..300);
        let bp = populate(&mut rng, count, 40.0);

        assert!(bp.is_sorted());
        assert_eq!(
            bp.compute_overlaps(),
            bp.brute_force_overlaps(),
            "seed {seed}, {count} boxes"
        );
    }
}

#[test]
fn test_matches_brute_force_after_moves() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xA71A5);
    let mut bp = populate(&mut rng, 200, 30.0);

    for frame in 0..30 {
        for i in 0..200 {
            let id = EntityId::new(i, 0);
            if bp.mobility(id).unwrap() == Mobility::Moveable {
                let delta = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                let moved = bp.bounds(id).unwrap().translate(delta);
                bp.set_bounds(id, moved).unwrap();
            }
        }
        bp.resort();

        assert!(bp.is_sorted(), "frame {frame}");
        assert_eq!(bp.compute_overlaps(), bp.brute_force_overlaps(), "frame {frame}");
    }
}

#[test]
fn test_degenerate_boxes() {
    // Points and shared coordinates stress the tie handling.
    let mut bp = BroadPhase::new();
    for i in 0..10 {
        let p = Vec3::new((i % 3) as f32, 0.0, 0.0);
        bp.insert(EntityId::new(i, 0), Aabb::new(p, p), Mobility::Moveable)
            .unwrap();
    }
    assert_eq!(bp.compute_overlaps(), bp.brute_force_overlaps());
    assert_eq!(bp.compute_overlaps().len(), 4 * 3 / 2 + 3 * 2 / 2 + 3 * 2 / 2);
}

#[test]
fn test_bullet_swept_extent() {
    // A point bullet at the origin moving +X at speed 10 for dt = 1.
    let mut bp = BroadPhase::new();
    let bullet = EntityId::new(0, 0);
    let wall_hit = EntityId::new(1, 0);
    let wall_miss = EntityId::new(2, 0);

    let start = Aabb::new(Vec3::ZERO, Vec3::ZERO);
    let end = start.translate(Vec3::new(10.0, 0.0, 0.0));
    bp.insert(bullet, start, Mobility::Moveable).unwrap();
    bp.insert(
        wall_hit,
        Aabb::from_center(Vec3::new(5.0, 0.0, 0.0), Vec3::new(0.5, 2.0, 2.0)),
        Mobility::Static,
    )
    .unwrap();
    bp.insert(
        wall_miss,
        Aabb::from_center(Vec3::new(15.0, 0.0, 0.0), Vec3::new(0.5, 2.0, 2.0)),
        Mobility::Static,
    )
    .unwrap();

    // End-of-frame box alone tunnels through the wall.
    bp.set_bounds(bullet, end).unwrap();
    bp.resort();
    assert!(bp.compute_overlaps().is_empty());

    bp.set_swept(bullet, start, end).unwrap();
    bp.resort();
    let swept = bp.bounds(bullet).unwrap();
    assert_eq!((swept.min.x, swept.max.x), (0.0, 10.0));
    assert_eq!(bp.compute_overlaps(), vec![(bullet, wall_hit)]);
}
