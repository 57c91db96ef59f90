//! Element kinds and row-stride rounding.

use std::fmt;

/// Byte alignment of every row buffer: 16 `f32` lanes or 8 `f64` lanes.
pub const SIMD_ALIGN: usize = 64;

/// Numeric element stored in a 2-D buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Single precision, used by planes and scanlines.
    F32,
    /// Double precision, used by accumulation buffers.
    F64,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Number of elements that fit in one [`SIMD_ALIGN`] block.
    pub const fn lanes(self) -> usize {
        SIMD_ALIGN / self.size()
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

/// Round `width` elements up to a whole number of SIMD blocks.
///
/// A zero width still yields one block so every row has backing storage.
pub fn round_stride(width: usize, kind: ElementKind) -> usize {
    let lanes = kind.lanes();
    width.max(1).div_ceil(lanes) * lanes
}
