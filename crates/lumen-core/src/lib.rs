//! Core types for the Lumen scanline engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the allocator, the thread pool, the lazy data
//! entities and the scanline dispatcher: inclusive pixel rectangles,
//! element kinds with their SIMD lane counts, and the core error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod kind;
pub mod rect;

pub use error::CoreError;
pub use kind::{round_stride, ElementKind, SIMD_ALIGN};
pub use rect::Rect;
