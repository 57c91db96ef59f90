//! Scanline engine error types.

use std::error::Error;
use std::fmt;

use lumen_core::Rect;
use lumen_plane::PlaneError;
use lumen_pool::PoolError;
use lumen_threads::ThreadError;

/// A failure reported by a row kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelError {
    /// Why the kernel failed.
    pub reason: String,
}

impl KernelError {
    /// Create an error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl Error for KernelError {}

/// Errors from building or running a fused row dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanError {
    /// The fused chain is malformed (forward reference, unbound kernel,
    /// missing output, ...).
    Subgroup {
        /// What is wrong with it.
        reason: String,
    },
    /// An input does not cover the dispatch rectangle.
    Bounds {
        /// Member whose input is short.
        member: String,
        /// The dispatch rectangle.
        dims: Rect,
        /// Bounds of the offending input.
        available: Rect,
    },
    /// A row kernel failed.
    Kernel {
        /// Name of the failing member.
        member: String,
        /// The kernel's reason.
        reason: String,
    },
    /// Scanline or output allocation failed.
    Pool(PoolError),
    /// The thread pool rejected the dispatch or a worker panicked.
    Thread(ThreadError),
    /// An input failed to materialize.
    Plane(PlaneError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subgroup { reason } => write!(f, "invalid subgroup: {reason}"),
            Self::Bounds {
                member,
                dims,
                available,
            } => write!(f, "input of '{member}' covers {available}, dispatch needs {dims}"),
            Self::Kernel { member, reason } => write!(f, "kernel '{member}' failed: {reason}"),
            Self::Pool(e) => write!(f, "allocation failed: {e}"),
            Self::Thread(e) => write!(f, "dispatch failed: {e}"),
            Self::Plane(e) => write!(f, "input failed: {e}"),
        }
    }
}

impl Error for ScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Pool(e) => Some(e),
            Self::Thread(e) => Some(e),
            Self::Plane(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PoolError> for ScanError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<ThreadError> for ScanError {
    fn from(e: ThreadError) -> Self {
        Self::Thread(e)
    }
}

impl From<PlaneError> for ScanError {
    fn from(e: PlaneError) -> Self {
        Self::Plane(e)
    }
}
