//! Thread pool configuration.

use crate::error::ThreadError;

/// Configuration for a [`ThreadPool`](crate::ThreadPool).
#[derive(Clone, Debug)]
pub struct ThreadPoolConfig {
    /// Number of worker threads, not counting the dispatching thread.
    ///
    /// `None` resolves to `available_parallelism() - 1`. Both explicit and
    /// resolved values are clamped to `[0, MAX_WORKERS]`. With zero
    /// workers every chunk runs inline on the caller.
    pub worker_count: Option<usize>,

    /// Prefix for worker thread names; bee `i` is named `"{prefix}-{i}"`.
    pub thread_name: String,
}

impl ThreadPoolConfig {
    /// Upper bound on worker threads.
    pub const MAX_WORKERS: usize = 63;

    /// Default worker thread name prefix.
    pub const DEFAULT_THREAD_NAME: &'static str = "lumen-bee";

    /// Create a config with an auto-sized pool.
    pub fn new() -> Self {
        Self {
            worker_count: None,
            thread_name: Self::DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Create a config with exactly `n` workers (clamped).
    pub fn with_workers(n: usize) -> Self {
        Self {
            worker_count: Some(n),
            ..Self::new()
        }
    }

    /// The worker count after resolving `None` and clamping.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.min(Self::MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(1)
                .min(Self::MAX_WORKERS),
        }
    }

    /// Check that the thread name can be handed to the OS.
    pub fn validate(&self) -> Result<(), ThreadError> {
        if self.thread_name.is_empty() {
            return Err(ThreadError::InvalidConfig {
                reason: "thread_name must not be empty".into(),
            });
        }
        if self.thread_name.contains('\0') {
            return Err(ThreadError::InvalidConfig {
                reason: "thread_name must not contain NUL bytes".into(),
            });
        }
        Ok(())
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_count_is_clamped() {
        assert_eq!(ThreadPoolConfig::with_workers(0).resolved_worker_count(), 0);
        assert_eq!(ThreadPoolConfig::with_workers(5).resolved_worker_count(), 5);
        assert_eq!(
            ThreadPoolConfig::with_workers(500).resolved_worker_count(),
            ThreadPoolConfig::MAX_WORKERS
        );
    }

    #[test]
    fn auto_count_leaves_room_for_caller() {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let n = ThreadPoolConfig::new().resolved_worker_count();
        assert!(n < cpus.max(1));
        assert!(n <= ThreadPoolConfig::MAX_WORKERS);
    }

    #[test]
    fn validate_rejects_bad_names() {
        assert!(ThreadPoolConfig::new().validate().is_ok());
        let empty = ThreadPoolConfig {
            thread_name: String::new(),
            ..ThreadPoolConfig::new()
        };
        assert!(matches!(empty.validate(), Err(ThreadError::InvalidConfig { .. })));
        let nul = ThreadPoolConfig {
            thread_name: "bee\0".into(),
            ..ThreadPoolConfig::new()
        };
        assert!(nul.validate().is_err());
    }
}
