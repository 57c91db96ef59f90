//! Inclusive pixel rectangles.

use std::fmt;

use crate::error::CoreError;

/// An inclusive integer rectangle `(x1, y1)..=(x2, y2)`.
///
/// A valid rect always spans at least one pixel on each axis; the
/// constructor rejects inverted corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl Rect {
    /// Create a rect from inclusive corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, CoreError> {
        if x2 < x1 || y2 < y1 {
            return Err(CoreError::InvertedRect { x1, y1, x2, y2 });
        }
        let width = extent(x1, x2);
        let height = extent(y1, y2);
        if width > MAX_EXTENT || height > MAX_EXTENT {
            return Err(CoreError::RectTooLarge { width, height });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// A `width` × `height` rect anchored at the origin.
    pub fn with_size(width: usize, height: usize) -> Result<Self, CoreError> {
        let too_large = || CoreError::RectTooLarge {
            width: width as u64,
            height: height as u64,
        };
        let w = i32::try_from(width).map_err(|_| too_large())?;
        let h = i32::try_from(height).map_err(|_| too_large())?;
        Self::new(0, 0, w - 1, h - 1)
    }

    /// Left column.
    pub fn x1(&self) -> i32 {
        self.x1
    }

    /// Top row.
    pub fn y1(&self) -> i32 {
        self.y1
    }

    /// Right column (inclusive).
    pub fn x2(&self) -> i32 {
        self.x2
    }

    /// Bottom row (inclusive).
    pub fn y2(&self) -> i32 {
        self.y2
    }

    /// Number of columns. Always in `1..=i32::MAX`.
    pub fn width(&self) -> usize {
        extent(self.x1, self.x2) as usize
    }

    /// Number of rows. Always in `1..=i32::MAX`.
    pub fn height(&self) -> usize {
        extent(self.y1, self.y2) as usize
    }

    /// Whether `other` lies entirely inside this rect.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    /// Whether row `y` lies inside this rect.
    pub fn contains_row(&self, y: i32) -> bool {
        y >= self.y1 && y <= self.y2
    }
}

/// Largest width or height a rect may span.
const MAX_EXTENT: u64 = i32::MAX as u64;

/// Pixel count of the inclusive span `lo..=hi`, with `lo <= hi`.
fn extent(lo: i32, hi: i32) -> u64 {
    u64::from(hi.abs_diff(lo)) + 1
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})..=({},{}) [{}x{}]",
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            self.width(),
            self.height()
        )
    }
}
