//! # Broad Phase Benchmark
//!
//! Per-frame cost of the sweep-and-prune pipeline: resort after small
//! moves, then overlap computation.
//!
//! Run with: `cargo bench --package atlas_world`

// Benchmarks don't need docs
#![allow(missing_docs)]

use atlas_core::EntityId;
use atlas_shared::{Aabb, Vec3};
use atlas_world::{BroadPhase, Mobility};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn populated(count: u32) -> BroadPhase {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut bp = BroadPhase::new();
    for i in 0..count {
        let center = Vec3::new(
            rng.gen_range(-500.0..500.0),
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-500.0..500.0),
        );
        let mobility = if i % 4 == 0 {
            Mobility::Static
        } else {
            Mobility::Moveable
        };
        bp.insert(
            EntityId::new(i, 0),
            Aabb::from_center(center, Vec3::splat(1.0)),
            mobility,
        )
        .ok();
    }
    bp
}

/// Benchmark: small moves, resort, overlaps.
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase_frame");

    for count in [1_000u32, 5_000, 20_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut bp = populated(count);
            let mut step = 0.05_f32;
            b.iter(|| {
                for i in (0..count).filter(|i| i % 4 != 0) {
                    let id = EntityId::new(i, 0);
                    if let Ok(aabb) = bp.bounds(id) {
                        bp.set_bounds(id, aabb.translate(Vec3::new(step, 0.0, 0.0))).ok();
                    }
                }
                step = -step;
                black_box(bp.resort());
                black_box(bp.compute_overlaps().len())
            });
        });
    }

    group.finish();
}

/// Benchmark: all-pairs reference, for comparison.
fn bench_brute_force(c: &mut Criterion) {
    let bp = populated(2_000);
    c.bench_function("brute_force_2000", |b| {
        b.iter(|| black_box(bp.brute_force_overlaps().len()));
    });
}

criterion_group!(benches, bench_frame, bench_brute_force);
criterion_main!(benches);
