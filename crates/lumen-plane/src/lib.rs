//! Lazily computed 2-D data for Lumen.
//!
//! A [`Plane`] (single precision), [`AccumBuffer`] (double precision) or
//! [`VectorField`] (paired planes) is cheap to create: it records a graph
//! [`Node`] and nothing else. The first accessor that needs raw data
//! pulls the node's value from its [`Evaluator`], checks the returned
//! shape and stride, and caches the pool-backed buffer. Clones of a
//! materialized entity share that buffer.
//!
//! The operator graph itself lives outside this crate; [`Evaluator`] is
//! the whole interface to it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod data;
pub mod error;
pub mod field;
pub mod graph;
pub mod lazy;

pub use data::{AccumData, GridData, GridElement, PlaneData};
pub use error::{EvalError, PlaneError};
pub use field::{VectorField, TO_ABSOLUTE_OP, TO_RELATIVE_OP};
pub use graph::{Evaluator, Node, Strategy, Value};
pub use lazy::{AccumBuffer, LazyElement, LazyGrid, Plane};
