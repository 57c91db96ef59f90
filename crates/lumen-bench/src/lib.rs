//! Benchmark workloads for Lumen.
//!
//! Everything here is deterministic for a given seed:
//!
//! - [`request_sizes`]: allocator request sizes mixing rows and tiles
//! - [`noise_plane`]: a materialized plane of uniform noise
//! - [`filter_chain`]: a fused horizontal chain ending in one output

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lumen_core::Rect;
use lumen_plane::{Plane, PlaneData, PlaneError};
use lumen_pool::PoolAllocator;
use lumen_scan::{ScanError, Source, Subgroup};
use lumen_test_utils::fixtures::{GradientX, Scale};

/// `n` byte counts in `[1, max]`, skewed toward small requests: three in
/// four fall in the bottom sixteenth of the range.
pub fn request_sizes(seed: u64, n: usize, max: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let small = (max / 16).max(1);
    (0..n)
        .map(|_| {
            let r = rng.next_u64() as usize;
            if r % 4 == 0 {
                1 + (r >> 2) % max
            } else {
                1 + (r >> 2) % small
            }
        })
        .collect()
}

/// A plane over `rect` with values uniform in `[0, 1)`.
pub fn noise_plane(pool: &PoolAllocator, rect: Rect, seed: u64) -> Result<Plane, PlaneError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = PlaneData::from_fn(pool, rect, |_, _| {
        (rng.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    })?;
    Ok(Plane::from_data(data))
}

/// `src` → gradient → `depth` in-place scales, output at the end.
pub fn filter_chain(src: Plane, depth: usize) -> Result<Subgroup, ScanError> {
    let mut b = Subgroup::builder();
    let mut last = b.add_kernel(Box::new(GradientX), vec![Source::Plane(src)]);
    for _ in 0..depth {
        last = b.add_kernel(Box::new(Scale { factor: 0.5 }), vec![Source::Member(last)]);
    }
    b.mark_output(last)?;
    b.build()
}
