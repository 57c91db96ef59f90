//! Thread pool error types.

use std::error::Error;
use std::fmt;

/// Errors from building a [`ThreadPool`](crate::ThreadPool) or
/// dispatching work on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadError {
    /// `dispatch` was called with `count == 0`.
    EmptyRange {
        /// Start of the rejected range.
        start: usize,
    },
    /// `start + count` does not fit in `usize`.
    RangeOverflow {
        /// Start of the rejected range.
        start: usize,
        /// Length of the rejected range.
        count: usize,
    },
    /// A range function panicked on a worker thread. The dispatch still
    /// waited for every other chunk before reporting this.
    WorkerPanicked {
        /// Index of the first worker observed to panic.
        worker: usize,
    },
    /// The OS refused to spawn a worker thread.
    SpawnFailed {
        /// The underlying I/O error, rendered.
        reason: String,
    },
    /// A [`ThreadPoolConfig`](crate::ThreadPoolConfig) failed validation.
    InvalidConfig {
        /// Which invariant was violated.
        reason: String,
    },
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRange { start } => write!(f, "empty dispatch range starting at {start}"),
            Self::RangeOverflow { start, count } => {
                write!(f, "dispatch range {start} + {count} overflows")
            }
            Self::WorkerPanicked { worker } => {
                write!(f, "range function panicked on worker {worker}")
            }
            Self::SpawnFailed { reason } => write!(f, "failed to spawn worker thread: {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid thread pool config: {reason}"),
        }
    }
}

impl Error for ThreadError {}
