//! Scanline engine for Lumen.
//!
//! A [`Subgroup`] is a fused chain of row-wise operators. Rather than
//! materializing a full plane per operator, [`dispatch_scan_processing`]
//! runs the whole chain one row at a time: each row's intermediate
//! results live in [`Scanline`]s handed out by a per-range
//! [`ScanlineGroup`], which reuses an input's storage in place when the
//! kernel allows it and nobody else still reads it, and otherwise recycles
//! a small set of scratch rows. Only the chain's declared outputs are
//! written to full planes.
//!
//! [`dispatch_rows`] is the simpler one-pass strategy: one closure per
//! output row, no fusion.
//!
//! # Architecture
//!
//! ```text
//! Runtime (PoolAllocator + ThreadPool)
//! └── dispatch_scan_processing(subgroup, dims)
//!     └── ThreadPool::dispatch over rows
//!         └── per range: ScanlineGroup
//!             └── per row, per member:
//!                 refresh plane rows → find_or_checkout → RowKernel::run
//!                 → publish to consumers → recycle
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod error;
pub mod group;
pub mod kernel;
pub mod rows;
pub mod runtime;
pub mod scanline;
pub mod subgroup;

pub use dispatch::dispatch_scan_processing;
pub use error::{KernelError, ScanError};
pub use group::{Checkout, ScanlineGroup, SharedLine};
pub use kernel::{PlaneRows, RowArgs, RowKernel, RowValue, Shape};
pub use rows::dispatch_rows;
pub use runtime::{Runtime, RuntimeConfig};
pub use scanline::Scanline;
pub use subgroup::{Member, Source, Subgroup, SubgroupBuilder};
