//! Allocator configuration parameters.

use lumen_core::SIMD_ALIGN;

use crate::error::PoolError;

/// Configuration for the pool allocator.
///
/// `stash_cap_bytes` and `skippiness` can be changed later through
/// [`PoolAllocator::set_stash_size`](crate::PoolAllocator::set_stash_size)
/// and [`PoolAllocator::set_skippiness`](crate::PoolAllocator::set_skippiness).
/// `alignment` is fixed at construction.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Upper bound on bytes retained in the stash across all three pools.
    ///
    /// Default: 256 MiB.
    pub stash_cap_bytes: usize,

    /// How many size mismatches a stashed entry survives before eviction.
    ///
    /// Every stash scan that passes over an entry without taking it bumps
    /// the entry's skip count; once it exceeds this value the entry is
    /// freed. Default: 16.
    pub skippiness: u32,

    /// Byte alignment of scanline and rectangle buffers.
    ///
    /// Must be a power of two and at least [`PoolConfig::MIN_ALIGNMENT`].
    /// Default: [`SIMD_ALIGN`] (16 `f32` or 8 `f64` lanes).
    pub alignment: usize,
}

impl PoolConfig {
    /// Default stash budget: 256 MiB.
    pub const DEFAULT_STASH_CAP_BYTES: usize = 256 * 1024 * 1024;

    /// Default eviction patience.
    pub const DEFAULT_SKIPPINESS: u32 = 16;

    /// Smallest alignment handed out by any pool, including generic
    /// byte buffers requested with a weaker alignment.
    pub const MIN_ALIGNMENT: usize = 16;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            stash_cap_bytes: Self::DEFAULT_STASH_CAP_BYTES,
            skippiness: Self::DEFAULT_SKIPPINESS,
            alignment: SIMD_ALIGN,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !self.alignment.is_power_of_two() || self.alignment < Self::MIN_ALIGNMENT {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "alignment {} must be a power of two >= {}",
                    self.alignment,
                    Self::MIN_ALIGNMENT
                ),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
