//! Aligned OS allocations.
//!
//! The only module in this crate that uses `unsafe`. Each block is one
//! `std::alloc` allocation that [`RawBlock`] owns outright and frees on
//! drop. Every `unsafe` block carries a `// SAFETY:` comment.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;
use std::slice;

use crate::buffer::Element;
use crate::error::PoolError;

/// One zero-initialised, aligned allocation obtained from the OS.
pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: a RawBlock is the unique owner of its allocation and exposes it
// only through `&self` / `&mut self` borrows, so moving or sharing the
// handle across threads cannot create unsynchronised aliasing.
unsafe impl Send for RawBlock {}
// SAFETY: see above; shared access only yields shared slices.
unsafe impl Sync for RawBlock {}

impl RawBlock {
    /// Allocate at least `bytes` bytes aligned to `align`.
    ///
    /// The size is rounded up to a multiple of `align` (and never zero).
    pub(crate) fn allocate(bytes: usize, align: usize) -> Result<Self, PoolError> {
        let size = rounded_size(bytes, align).ok_or(PoolError::InvalidLayout { bytes, align })?;
        let layout =
            Layout::from_size_align(size, align).map_err(|_| PoolError::InvalidLayout { bytes, align })?;
        // SAFETY: `layout` has a non-zero size because `rounded_size`
        // never returns zero.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(PoolError::AllocationFailed { bytes: size, align })?;
        Ok(Self { ptr, layout })
    }

    /// Usable size in bytes.
    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }

    /// Alignment the block was allocated with.
    pub(crate) fn align(&self) -> usize {
        self.layout.align()
    }

    /// Address used as the in-flight bookkeeping key.
    pub(crate) fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// View the whole block as a slice of `T`.
    pub(crate) fn as_slice<T: Element>(&self) -> &[T] {
        debug_assert!(self.align() >= mem::align_of::<T>());
        // SAFETY: the pointer is valid for `size()` bytes and aligned to at
        // least `PoolConfig::MIN_ALIGNMENT` (16), which covers every
        // `Element` type (u8, f32, f64). The memory was zeroed at
        // allocation and only ever written through `Element` slices, so
        // every byte is initialised and every bit pattern is a valid
        // `Element`. `&self` rules out a concurrent `&mut` view.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast::<T>(), self.size() / mem::size_of::<T>()) }
    }

    /// View the whole block as a mutable slice of `T`.
    pub(crate) fn as_mut_slice<T: Element>(&mut self) -> &mut [T] {
        debug_assert!(self.align() >= mem::align_of::<T>());
        // SAFETY: as for `as_slice`; `&mut self` guarantees exclusivity.
        unsafe {
            slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<T>(), self.size() / mem::size_of::<T>())
        }
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with exactly this
        // layout and has not been freed; RawBlock is its sole owner.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Round `bytes` up to a non-zero multiple of `align`.
/// `bytes` rounded up to a non-zero multiple of `align`.
pub(crate) fn rounded_size(bytes: usize, align: usize) -> Option<usize> {
    if align == 0 {
        return None;
    }
    bytes.max(1).checked_next_multiple_of(align)
}
