//! Allocator error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while acquiring pool memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The OS allocator returned null. Fatal; callers do not retry.
    AllocationFailed {
        /// Rounded size of the failed request in bytes.
        bytes: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// Size and alignment do not form a valid layout (overflow, or an
    /// alignment that is not a power of two).
    InvalidLayout {
        /// Requested size in bytes.
        bytes: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// A [`PoolConfig`](crate::PoolConfig) failed validation.
    InvalidConfig {
        /// Which invariant was violated.
        reason: String,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { bytes, align } => {
                write!(f, "allocation of {bytes} bytes (align {align}) failed")
            }
            Self::InvalidLayout { bytes, align } => {
                write!(f, "invalid layout: {bytes} bytes with align {align}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid pool config: {reason}"),
        }
    }
}

impl Error for PoolError {}
