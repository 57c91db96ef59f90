//! Fixed worker pool for Lumen.
//!
//! A [`ThreadPool`] owns a set of parked worker threads ("bees").
//! [`ThreadPool::dispatch`] splits a numeric range into chunks, hands
//! chunks to idle bees and runs the last chunk (plus any chunk no bee was
//! free for) on the calling thread. The call is a barrier: it returns
//! only after every chunk has finished.
//!
//! Idle bees are tracked by index in a lock-free stack, so
//! bee slots are never freed while the pool is alive and a stale index
//! can never dangle.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
mod idle;
mod job;
pub mod pool;

pub use config::ThreadPoolConfig;
pub use error::ThreadError;
pub use pool::ThreadPool;
