//! The owning buffer handle returned by every allocator call.

use std::fmt;
use std::sync::Arc;

use crate::allocator::Shared;
use crate::raw::RawBlock;
use crate::report::PoolKind;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Plain-old-data element types a [`PoolBuffer`] can be viewed as.
///
/// Sealed: every bit pattern must be a valid value and the alignment must
/// not exceed the allocator's minimum alignment.
pub trait Element: sealed::Sealed + Copy + Send + Sync + 'static {}

impl Element for u8 {}
impl Element for f32 {}
impl Element for f64 {}

/// A buffer lent by a [`PoolAllocator`](crate::PoolAllocator).
///
/// Dropping the handle returns the memory to the pool it came from, on
/// every exit path (early return, `?`, unwinding). Contents of a reused
/// buffer are unspecified; fresh OS allocations start zeroed.
pub struct PoolBuffer {
    /// Always `Some` until `drop` hands the block back.
    block: Option<RawBlock>,
    kind: PoolKind,
    /// Element size for rect buffers, 0 otherwise.
    class: usize,
    pool: Arc<Shared>,
}

impl PoolBuffer {
    pub(crate) fn new(block: RawBlock, kind: PoolKind, class: usize, pool: Arc<Shared>) -> Self {
        Self {
            block: Some(block),
            kind,
            class,
            pool,
        }
    }

    fn block(&self) -> &RawBlock {
        self.block.as_ref().expect("block present until drop")
    }

    fn block_mut(&mut self) -> &mut RawBlock {
        self.block.as_mut().expect("block present until drop")
    }

    /// Usable size in bytes (at least the requested size).
    pub fn len_bytes(&self) -> usize {
        self.block().size()
    }

    /// Alignment of the first byte.
    pub fn align(&self) -> usize {
        self.block().align()
    }

    /// Which pool this buffer returns to.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Start address, for identity comparisons and hashing.
    pub fn as_ptr(&self) -> *const u8 {
        self.block().as_ptr()
    }

    /// View the whole buffer as elements of `T`.
    pub fn as_slice<T: Element>(&self) -> &[T] {
        self.block().as_slice()
    }

    /// View the whole buffer as mutable elements of `T`.
    pub fn as_mut_slice<T: Element>(&mut self) -> &mut [T] {
        self.block_mut().as_mut_slice()
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.pool.release(self.kind, self.class, block);
        }
    }
}

impl fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("kind", &self.kind)
            .field("ptr", &self.as_ptr())
            .field("len_bytes", &self.len_bytes())
            .finish()
    }
}
