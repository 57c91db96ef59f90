//! Materialized 2-D storage backed by the pool allocator.

use std::fmt;
use std::marker::PhantomData;

use lumen_core::{ElementKind, Rect};
use lumen_pool::{Element, PoolAllocator, PoolBuffer};

use crate::error::PlaneError;

/// Element types a [`GridData`] can hold.
pub trait GridElement: Element + PartialEq + fmt::Debug {
    /// Matching allocator element kind.
    const KIND: ElementKind;
    /// Short name used in hashes and error messages.
    const NAME: &'static str;
    /// Bit pattern used for content hashing.
    fn to_bits64(self) -> u64;
}

impl GridElement for f32 {
    const KIND: ElementKind = ElementKind::F32;
    const NAME: &'static str = "plane";

    fn to_bits64(self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl GridElement for f64 {
    const KIND: ElementKind = ElementKind::F64;
    const NAME: &'static str = "accum buffer";

    fn to_bits64(self) -> u64 {
        self.to_bits()
    }
}

/// A materialized rectangle of `T` with a padded row stride.
///
/// Row `y` (absolute, inside `rect`) starts at element
/// `(y - rect.y1()) * stride` of the buffer.
pub struct GridData<T> {
    rect: Rect,
    stride: usize,
    buffer: PoolBuffer,
    _elem: PhantomData<T>,
}

/// Single-precision plane storage.
pub type PlaneData = GridData<f32>;

/// Double-precision accumulation storage.
pub type AccumData = GridData<f64>;

impl<T: GridElement> GridData<T> {
    /// Allocate storage for `rect` from the rect pool.
    ///
    /// Contents are unspecified (a reused stash entry keeps old values).
    pub fn allocate(pool: &PoolAllocator, rect: Rect) -> Result<Self, PlaneError> {
        let (buffer, stride) = pool.rect_buffer(rect.width(), rect.height(), T::KIND)?;
        Ok(Self {
            rect,
            stride,
            buffer,
            _elem: PhantomData,
        })
    }

    /// Allocate storage for `rect` with every element set to `value`.
    pub fn filled(pool: &PoolAllocator, rect: Rect, value: T) -> Result<Self, PlaneError> {
        let mut data = Self::allocate(pool, rect)?;
        data.fill(value);
        Ok(data)
    }

    /// Allocate storage and fill each element from `f(x, y)`.
    pub fn from_fn(
        pool: &PoolAllocator,
        rect: Rect,
        mut f: impl FnMut(i32, i32) -> T,
    ) -> Result<Self, PlaneError> {
        let mut data = Self::allocate(pool, rect)?;
        let (x1, y1) = (rect.x1(), rect.y1());
        for (dy, row) in data.rows_mut().enumerate() {
            for (dx, v) in row.iter_mut().enumerate() {
                *v = f(x1 + dx as i32, y1 + dy as i32);
            }
        }
        Ok(data)
    }

    /// Wrap an existing buffer. Fails if the stride is shorter than a row
    /// or the buffer cannot hold `height` rows.
    pub fn from_parts(rect: Rect, stride: usize, buffer: PoolBuffer) -> Result<Self, PlaneError> {
        if stride < rect.width() {
            return Err(PlaneError::StrideTooSmall {
                stride,
                width: rect.width(),
            });
        }
        let needed = stride * rect.height();
        let have = buffer.as_slice::<T>().len();
        if have < needed {
            return Err(PlaneError::StrideTooSmall {
                stride: have / rect.height(),
                width: rect.width(),
            });
        }
        Ok(Self {
            rect,
            stride,
            buffer,
            _elem: PhantomData,
        })
    }

    /// Bounds of the stored rectangle.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Columns per row.
    pub fn width(&self) -> usize {
        self.rect.width()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.rect.height()
    }

    /// Elements between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Address of the first element.
    pub fn as_ptr(&self) -> *const T {
        self.buffer.as_ptr().cast()
    }

    fn offset(&self, y: i32) -> Option<usize> {
        self.rect
            .contains_row(y)
            .then(|| (y - self.rect.y1()) as usize * self.stride)
    }

    /// Row `y` (absolute), `width()` elements long.
    pub fn row(&self, y: i32) -> Option<&[T]> {
        let start = self.offset(y)?;
        Some(&self.buffer.as_slice::<T>()[start..start + self.width()])
    }

    /// Row `y` clamped into the stored bounds, for edge-extending reads.
    pub fn row_clamped(&self, y: i32) -> &[T] {
        let y = y.clamp(self.rect.y1(), self.rect.y2());
        let start = (y - self.rect.y1()) as usize * self.stride;
        &self.buffer.as_slice::<T>()[start..start + self.width()]
    }

    /// Mutable row `y` (absolute).
    pub fn row_mut(&mut self, y: i32) -> Option<&mut [T]> {
        let start = self.offset(y)?;
        let width = self.width();
        Some(&mut self.buffer.as_mut_slice::<T>()[start..start + width])
    }

    /// Every row in order, each trimmed to `width()`.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        let width = self.width();
        self.buffer
            .as_slice::<T>()
            .chunks(self.stride)
            .take(self.height())
            .map(move |row| &row[..width])
    }

    /// Every row in order, mutable and trimmed to `width()`.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        let (width, height, stride) = (self.width(), self.height(), self.stride);
        self.buffer
            .as_mut_slice::<T>()
            .chunks_mut(stride)
            .take(height)
            .map(move |row| &mut row[..width])
    }

    /// Set every in-bounds element to `value`.
    pub fn fill(&mut self, value: T) {
        for row in self.rows_mut() {
            row.fill(value);
        }
    }

    /// Fold every in-bounds element into a hash of the contents. Padding
    /// is ignored.
    pub fn content_hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for row in self.rows() {
            for v in row {
                state.write_u64(v.to_bits64());
            }
        }
    }
}

impl<T: GridElement> fmt::Debug for GridData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridData")
            .field("kind", &T::KIND)
            .field("rect", &self.rect)
            .field("stride", &self.stride)
            .field("ptr", &self.as_ptr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_pool::PoolConfig;

    fn pool() -> PoolAllocator {
        PoolAllocator::new(PoolConfig::default()).unwrap()
    }

    #[test]
    fn rows_are_addressed_by_absolute_y() {
        let rect = Rect::new(3, 10, 7, 12).unwrap();
        let data = PlaneData::from_fn(&pool(), rect, |x, y| (y * 100 + x) as f32).unwrap();
        assert_eq!(data.row(10).unwrap(), &[1003.0, 1004.0, 1005.0, 1006.0, 1007.0]);
        assert_eq!(data.row(12).unwrap()[0], 1203.0);
        assert!(data.row(9).is_none());
        assert!(data.row(13).is_none());
    }

    #[test]
    fn stride_is_padded_to_lanes() {
        let data = AccumData::allocate(&pool(), Rect::with_size(10, 2).unwrap()).unwrap();
        assert_eq!(data.stride(), 16);
        let data = PlaneData::allocate(&pool(), Rect::with_size(10, 2).unwrap()).unwrap();
        assert_eq!(data.stride(), 16);
    }

    #[test]
    fn row_clamped_extends_edges() {
        let rect = Rect::with_size(2, 3).unwrap();
        let data = PlaneData::from_fn(&pool(), rect, |_, y| y as f32).unwrap();
        assert_eq!(data.row_clamped(-5), &[0.0, 0.0]);
        assert_eq!(data.row_clamped(99), &[2.0, 2.0]);
    }

    #[test]
    fn from_parts_rejects_short_stride() {
        let p = pool();
        let (buf, _) = p.rect_buffer(4, 4, ElementKind::F32).unwrap();
        let err = PlaneData::from_parts(Rect::with_size(8, 4).unwrap(), 4, buf).unwrap_err();
        assert!(matches!(err, PlaneError::StrideTooSmall { stride: 4, width: 8 }));
    }

    #[test]
    fn content_hash_ignores_padding() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::Hasher;

        let p = pool();
        let rect = Rect::with_size(3, 2).unwrap();
        let a = PlaneData::filled(&p, rect, 1.5).unwrap();
        let mut b = PlaneData::allocate(&p, rect).unwrap();
        b.buffer.as_mut_slice::<f32>().fill(9.0);
        b.fill(1.5);
        let (mut ha, mut hb) = (DefaultHasher::new(), DefaultHasher::new());
        a.content_hash(&mut ha);
        b.content_hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rows_cover_rect_with_padded_stride(
                x1 in -50i32..50,
                y1 in -50i32..50,
                w in 1usize..80,
                h in 1usize..20,
            ) {
                let rect = Rect::new(x1, y1, x1 + w as i32 - 1, y1 + h as i32 - 1).unwrap();
                let data = PlaneData::from_fn(&pool(), rect, |x, y| (x * 1000 + y) as f32).unwrap();
                prop_assert!(data.stride() >= w);
                prop_assert_eq!(data.stride() % ElementKind::F32.lanes(), 0);
                prop_assert_eq!(data.rows().count(), h);
                for y in rect.y1()..=rect.y2() {
                    let row = data.row(y).unwrap();
                    prop_assert_eq!(row.len(), w);
                    prop_assert_eq!(row[w - 1], (rect.x2() * 1000 + y) as f32);
                }
            }
        }
    }
}
