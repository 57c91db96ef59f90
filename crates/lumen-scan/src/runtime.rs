//! The explicit execution context: one allocator plus one thread pool.

use std::sync::Arc;

use lumen_pool::{PoolAllocator, PoolConfig};
use lumen_threads::{ThreadPool, ThreadPoolConfig};

use crate::error::ScanError;

/// Configuration for a [`Runtime`].
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Allocator settings.
    pub pool: PoolConfig,
    /// Worker pool settings.
    pub threads: ThreadPoolConfig,
}

impl RuntimeConfig {
    /// Check both halves.
    pub fn validate(&self) -> Result<(), ScanError> {
        self.pool.validate()?;
        self.threads.validate()?;
        Ok(())
    }
}

/// Allocator and thread pool shared by evaluators and dispatch calls.
///
/// Construct one per process (or per test) and pass clones to whatever
/// needs them. Cloning shares both halves.
#[derive(Clone)]
pub struct Runtime {
    pool: PoolAllocator,
    threads: Arc<ThreadPool>,
}

impl Runtime {
    /// Build the allocator and spawn the worker pool.
    pub fn new(config: RuntimeConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            pool: PoolAllocator::new(config.pool)?,
            threads: Arc::new(ThreadPool::new(config.threads)?),
        })
    }

    /// A runtime with default allocator settings and `workers` bees.
    pub fn with_workers(workers: usize) -> Result<Self, ScanError> {
        Self::new(RuntimeConfig {
            threads: ThreadPoolConfig::with_workers(workers),
            ..RuntimeConfig::default()
        })
    }

    /// Combine existing halves.
    pub fn from_parts(pool: PoolAllocator, threads: Arc<ThreadPool>) -> Self {
        Self { pool, threads }
    }

    /// The allocator.
    pub fn pool(&self) -> &PoolAllocator {
        &self.pool
    }

    /// The worker pool.
    pub fn threads(&self) -> &ThreadPool {
        &self.threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_allocator_and_pool() {
        let rt = Runtime::with_workers(2).unwrap();
        let copy = rt.clone();
        assert_eq!(copy.threads().worker_count(), 2);
        drop(rt.pool().allocate(128, 64).unwrap());
        assert_eq!(copy.pool().report().total_stashed_bytes(), 128);
    }

    #[test]
    fn invalid_pool_config_is_rejected() {
        let config = RuntimeConfig {
            pool: PoolConfig {
                alignment: 3,
                ..PoolConfig::default()
            },
            ..RuntimeConfig::default()
        };
        assert!(matches!(Runtime::new(config), Err(ScanError::Pool(_))));
    }
}
