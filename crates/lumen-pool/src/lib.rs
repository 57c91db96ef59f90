//! Pool allocator for Lumen row and plane buffers.
//!
//! Buffers are acquired from the OS with SIMD alignment, lent out through
//! an owning [`PoolBuffer`] handle, and returned to a size-bucketed stash
//! when the handle drops. Stashed entries are reused by later requests of
//! a similar size and evicted when they go unused for too long or when the
//! stash outgrows its byte budget. This crate is the only one in the
//! workspace besides `lumen-threads` that contains `unsafe` code, confined
//! to `raw.rs`.
//!
//! # Architecture
//!
//! ```text
//! PoolAllocator (cheap clone, Arc<Shared>)
//! └── Mutex<State>
//!     ├── PoolConfig (stash cap, skippiness, alignment)
//!     └── Pool × 3 (generic bytes, scanline rows, rectangles)
//!         ├── in-flight: IndexMap<addr, InFlight>
//!         └── stash: Vec<StashEntry> (oldest first)
//! ```
//!
//! The mutex is held for bookkeeping only. Fresh OS allocations and
//! frees of evicted blocks happen after the lock is released.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod buffer;
pub mod config;
pub mod error;
mod raw;
pub mod report;
mod stash;

pub use allocator::PoolAllocator;
pub use buffer::{Element, PoolBuffer};
pub use config::PoolConfig;
pub use error::PoolError;
pub use report::{PoolKind, PoolReport, PoolStats};
