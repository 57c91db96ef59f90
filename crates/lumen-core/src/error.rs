//! Error types shared by every Lumen crate.

use std::error::Error;
use std::fmt;

/// Contract violations on core geometry and ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreError {
    /// A rectangle whose max corner lies before its min corner.
    InvertedRect {
        /// Requested x1.
        x1: i32,
        /// Requested y1.
        y1: i32,
        /// Requested x2.
        x2: i32,
        /// Requested y2.
        y2: i32,
    },
    /// A rectangle spanning more than `i32::MAX` pixels on an axis.
    RectTooLarge {
        /// Requested width in pixels.
        width: u64,
        /// Requested height in pixels.
        height: u64,
    },
    /// A half-open range with no elements.
    EmptyRange {
        /// Start of the range.
        start: usize,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvertedRect { x1, y1, x2, y2 } => {
                write!(f, "inverted rect: ({x1},{y1})..=({x2},{y2})")
            }
            Self::RectTooLarge { width, height } => {
                write!(f, "rect too large: {width}x{height} exceeds i32::MAX on an axis")
            }
            Self::EmptyRange { start } => write!(f, "empty range starting at {start}"),
        }
    }
}

impl Error for CoreError {}
