//! Performance benchmarks for point-declutter
//!
//! Run with: cargo bench
//!
//! Covers the two costs that matter for interaction: building the partition for
//! a fresh dataset, and re-selecting when the zoom level (exclusion radius)
//! changes.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use point_declutter::{Config, PointStore, Quadtree, Scatter};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Uniform random positions in the unit square
fn uniform_positions(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n * 2).map(|_| rng.random::<f64>()).collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    for &n in &[100_000usize, 1_000_000] {
        let raw = uniform_positions(n, 1);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &raw, |b, raw| {
            b.iter(|| {
                let store = PointStore::build(raw).unwrap();
                Quadtree::build(&store, 32, 20)
            });
        });
    }

    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    group.sample_size(10);

    let n = 1_000_000usize;
    let raw = uniform_positions(n, 2);
    let store = PointStore::build(&raw).unwrap();
    let tree = Quadtree::build(&store, 32, 20);
    group.throughput(Throughput::Elements(n as u64));

    // Fresh selections at radii spanning zoomed-in to zoomed-out. Seeding with
    // an empty previous selection bypasses the per-radius cache.
    for radius in [0.001, 0.01, 0.1] {
        group.bench_with_input(
            BenchmarkId::new("fresh", radius),
            &radius,
            |b, &radius| {
                b.iter(|| tree.select_with_previous(radius, &[]));
            },
        );
    }

    // Re-rendering at an unchanged zoom level hits the selection cache.
    group.bench_function("cached", |b| {
        b.iter(|| tree.select(0.01));
    });

    group.finish();
}

fn bench_interactive_zoom(c: &mut Criterion) {
    let mut group = c.benchmark_group("interactive_zoom");
    group.sample_size(10);

    let n = 1_000_000usize;
    let mut scatter = Scatter::new(Config::default());
    scatter.set_positions(&uniform_positions(n, 3)).unwrap();
    scatter.autorange().unwrap();
    scatter.set_surface_size(1920.0, 1080.0);

    // Every iteration changes the scale slightly, as a zoom gesture would, so
    // each visible() call resolves a fresh radius.
    group.throughput(Throughput::Elements(n as u64));
    group.bench_function("visible_1m", |b| {
        let mut zoom = 1.0f64;
        b.iter(|| {
            zoom *= 1.001;
            scatter.set_scale(zoom, zoom);
            scatter.visible().unwrap()
        });
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_build, bench_select, bench_interactive_zoom);
criterion_main!(benches);
