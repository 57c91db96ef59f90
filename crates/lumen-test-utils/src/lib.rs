//! Test utilities for Lumen development.
//!
//! Provides [`MockGraph`], an in-memory operator graph implementing
//! [`Evaluator`](lumen_plane::Evaluator) with per-operator pull counters,
//! reference row kernels in [`fixtures`], and [`init_tracing`] for tests
//! that want log output.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod graph;

use lumen_core::Rect;
use lumen_plane::{Plane, PlaneData};
use lumen_pool::PoolAllocator;
use tracing_subscriber::EnvFilter;

pub use fixtures::reference_graph;
pub use graph::{MockGraph, MockGraphBuilder};

/// Install a fmt subscriber writing through the test harness. Honors
/// `RUST_LOG`; defaults to `info`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

/// A materialized plane with `f(x, y)` at every pixel.
pub fn plane_from_fn(pool: &PoolAllocator, rect: Rect, f: impl FnMut(i32, i32) -> f32) -> Plane {
    Plane::from_data(PlaneData::from_fn(pool, rect, f).expect("plane allocation"))
}

/// Every row of `plane`, copied out.
pub fn rows_of(plane: &Plane) -> Vec<Vec<f32>> {
    let rect = plane.rect();
    (rect.y1()..=rect.y2())
        .map(|y| plane.line(y).expect("plane row").to_vec())
        .collect()
}
