//! Lumen: the execution substrate beneath an image-processing library.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Lumen sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use lumen::prelude::*;
//!
//! /// `out = 2 * in`.
//! struct Double;
//! impl RowKernel for Double {
//!     fn name(&self) -> &str { "double" }
//!     fn allows_in_place(&self) -> bool { true }
//!     fn run(&self, args: &RowArgs<'_>, out: &mut [f32]) -> Result<(), KernelError> {
//!         for i in 0..args.width {
//!             out[i] = 2.0 * args.sample(0, i, out);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let runtime = Runtime::with_workers(2).unwrap();
//! let rect = Rect::with_size(64, 4).unwrap();
//! let src = Plane::filled(runtime.pool(), rect, 1.5).unwrap();
//!
//! let mut chain = Subgroup::builder();
//! let doubled = chain.add_kernel(Box::new(Double), vec![Source::Plane(src)]);
//! chain.mark_output(doubled).unwrap();
//! let chain = chain.build().unwrap();
//!
//! let out = dispatch_scan_processing(&runtime, &chain, rect).unwrap();
//! assert!(out[0].rows().all(|row| row.iter().all(|&v| v == 3.0)));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `lumen-core` | `Rect`, element kinds, alignment |
//! | [`pool`] | `lumen-pool` | Pool allocator and `PoolBuffer` |
//! | [`threads`] | `lumen-threads` | Worker pool and range dispatch |
//! | [`plane`] | `lumen-plane` | Lazy planes, accumulation buffers, vector fields |
//! | [`scan`] | `lumen-scan` | Scanlines, fused subgroups, dispatch, `Runtime` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Shared vocabulary (`lumen-core`).
pub use lumen_core as types;

/// Pool allocator (`lumen-pool`).
///
/// [`pool::PoolAllocator`] lends [`pool::PoolBuffer`]s and takes them back
/// into its stash when they drop.
pub use lumen_pool as pool;

/// Worker pool (`lumen-threads`).
pub use lumen_threads as threads;

/// Lazily computed 2-D data (`lumen-plane`).
///
/// [`plane::Plane`], [`plane::AccumBuffer`] and [`plane::VectorField`]
/// record a graph node and materialize through an
/// [`plane::Evaluator`] on first access.
pub use lumen_plane as plane;

/// Scanline engine (`lumen-scan`).
pub use lumen_scan as scan;

/// Common imports for typical Lumen usage.
///
/// ```rust
/// use lumen::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use lumen_core::{ElementKind, Rect};

    // Allocation
    pub use lumen_pool::{PoolAllocator, PoolBuffer, PoolConfig, PoolReport};

    // Threads
    pub use lumen_threads::{ThreadPool, ThreadPoolConfig};

    // Data
    pub use lumen_plane::{
        AccumBuffer, AccumData, Evaluator, Node, Plane, PlaneData, Strategy, Value, VectorField,
    };

    // Scanline engine
    pub use lumen_scan::{
        dispatch_rows, dispatch_scan_processing, KernelError, RowArgs, RowKernel, Runtime,
        RuntimeConfig, Scanline, Shape, Source, Subgroup,
    };

    // Errors
    pub use lumen_core::CoreError;
    pub use lumen_plane::{EvalError, PlaneError};
    pub use lumen_pool::PoolError;
    pub use lumen_scan::ScanError;
    pub use lumen_threads::ThreadError;
}
