//! Copy-on-write row buffers.

use std::fmt;

use lumen_pool::{PoolAllocator, PoolBuffer, PoolError};

enum LineData<'a> {
    /// Zero-copy view of memory owned elsewhere.
    Borrowed(&'a [f32]),
    /// Private buffer leased from the line pool.
    Owned(PoolBuffer),
}

/// One row of `f32` values starting at column `offset`.
///
/// A scanline either borrows its values (a row of a plane, say) or owns a
/// pool buffer. Reading never copies. [`get_mut`](Self::get_mut) on a
/// borrowed scanline first copies the values into a private buffer, so
/// writing through a scanline can never change the memory it was built
/// from.
///
/// Equality is identity: two scanlines are equal when they view the same
/// memory with the same offset and width.
pub struct Scanline<'a> {
    offset: i32,
    width: usize,
    stride: usize,
    data: LineData<'a>,
}

impl<'a> Scanline<'a> {
    /// Borrow `values` as a scanline starting at column `offset`.
    pub fn borrowed(offset: i32, values: &'a [f32]) -> Self {
        Self {
            offset,
            width: values.len(),
            stride: values.len(),
            data: LineData::Borrowed(values),
        }
    }

    /// A fresh owned scanline of `width` values. Contents are unspecified.
    pub fn owned(pool: &PoolAllocator, offset: i32, width: usize) -> Result<Self, PoolError> {
        let (buffer, stride) = pool.scanline_buffer(width)?;
        Ok(Self {
            offset,
            width,
            stride,
            data: LineData::Owned(buffer),
        })
    }

    /// An owned copy of this scanline's values.
    pub fn dup(&self, pool: &PoolAllocator) -> Result<Scanline<'static>, PoolError> {
        let mut copy = Scanline::owned(pool, self.offset, self.width)?;
        copy.owned_values_mut().copy_from_slice(self.get());
        Ok(copy)
    }

    /// First column.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Number of values.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Capacity of the backing row in values (`>= width`).
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whether this scanline owns its buffer.
    pub fn is_owned(&self) -> bool {
        matches!(self.data, LineData::Owned(_))
    }

    /// Read the values.
    pub fn get(&self) -> &[f32] {
        match &self.data {
            LineData::Borrowed(values) => values,
            LineData::Owned(buffer) => &buffer.as_slice::<f32>()[..self.width],
        }
    }

    /// Mutable access, copying borrowed values into a private buffer
    /// first.
    pub fn get_mut(&mut self, pool: &PoolAllocator) -> Result<&mut [f32], PoolError> {
        if let LineData::Borrowed(values) = self.data {
            let (mut buffer, stride) = pool.scanline_buffer(self.width)?;
            buffer.as_mut_slice::<f32>()[..self.width].copy_from_slice(values);
            self.stride = stride;
            self.data = LineData::Owned(buffer);
        }
        Ok(self.owned_values_mut())
    }

    fn owned_values_mut(&mut self) -> &mut [f32] {
        match &mut self.data {
            LineData::Owned(buffer) => &mut buffer.as_mut_slice::<f32>()[..self.width],
            LineData::Borrowed(_) => &mut [],
        }
    }

    /// Move this scanline to a different starting column.
    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }
}

impl PartialEq for Scanline<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
            && self.width == other.width
            && std::ptr::eq(self.get().as_ptr(), other.get().as_ptr())
    }
}

impl fmt::Debug for Scanline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanline")
            .field("offset", &self.offset)
            .field("width", &self.width)
            .field("stride", &self.stride)
            .field("owned", &self.is_owned())
            .field("ptr", &self.get().as_ptr())
            .finish()
    }
}
