//! Criterion micro-benchmarks for the pool allocator.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use lumen_bench::request_sizes;
use lumen_core::ElementKind;
use lumen_pool::{PoolAllocator, PoolConfig};

/// Allocate and release one size repeatedly; every request after the
/// first is a stash hit.
fn bench_stash_hit(c: &mut Criterion) {
    let pool = PoolAllocator::new(PoolConfig::default()).unwrap();
    c.bench_function("pool_stash_hit_4k", |b| {
        b.iter(|| black_box(pool.allocate(4096, 64).unwrap()));
    });
}

/// Hold a window of 32 buffers over a skewed size mix.
fn bench_mixed_churn(c: &mut Criterion) {
    let sizes = request_sizes(42, 4096, 1 << 20);
    let pool = PoolAllocator::new(PoolConfig::default()).unwrap();
    c.bench_function("pool_mixed_churn_4096", |b| {
        b.iter(|| {
            let mut held = Vec::with_capacity(32);
            for &size in &sizes {
                if held.len() == 32 {
                    held.remove(0);
                }
                held.push(pool.allocate(size, 64).unwrap());
            }
            black_box(held.len())
        });
    });
}

fn bench_rect_and_line(c: &mut Criterion) {
    let pool = PoolAllocator::new(PoolConfig::default()).unwrap();
    c.bench_function("pool_rect_1920x1080_f32", |b| {
        b.iter(|| black_box(pool.rect_buffer(1920, 1080, ElementKind::F32).unwrap()));
    });
    c.bench_function("pool_scanline_1920", |b| {
        b.iter(|| black_box(pool.scanline_buffer(1920).unwrap()));
    });
}

criterion_group!(benches, bench_stash_hit, bench_mixed_churn, bench_rect_and_line);
criterion_main!(benches);
