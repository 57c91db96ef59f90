//! Per-pool diagnostics.

use std::fmt;

/// The three independent pools an allocator maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Untyped byte buffers from [`PoolAllocator::allocate`](crate::PoolAllocator::allocate).
    Generic,
    /// Single-row `f32` buffers for scanlines.
    Line,
    /// Rectangular buffers, shared by `f32` and `f64` element kinds.
    Rect,
}

impl PoolKind {
    /// All pools in report order.
    pub const ALL: [PoolKind; 3] = [PoolKind::Generic, PoolKind::Line, PoolKind::Rect];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Generic => 0,
            Self::Line => 1,
            Self::Rect => 2,
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::Line => write!(f, "line"),
            Self::Rect => write!(f, "rect"),
        }
    }
}

/// Counters for one pool.
///
/// Byte counts are current values; `hits`, `misses` and `evictions` are
/// cumulative since the allocator was created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes currently lent out.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub max_live_bytes: usize,
    /// Buffers currently lent out.
    pub live_count: usize,
    /// Bytes retained in the stash.
    pub stashed_bytes: usize,
    /// Entries retained in the stash.
    pub stashed_count: usize,
    /// Requests served from the stash.
    pub hits: u64,
    /// Requests that went to the OS.
    pub misses: u64,
    /// Stashed entries freed by skippiness or cap pressure.
    pub evictions: u64,
}

/// Snapshot of every pool, taken under the allocator lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolReport {
    /// One entry per [`PoolKind`], in [`PoolKind::ALL`] order.
    pub pools: [PoolStats; 3],
    /// Stash budget at the time of the report.
    pub stash_cap_bytes: usize,
}

impl PoolReport {
    /// Stats for one pool.
    pub fn get(&self, kind: PoolKind) -> &PoolStats {
        &self.pools[kind.index()]
    }

    /// Bytes stashed across all pools.
    pub fn total_stashed_bytes(&self) -> usize {
        self.pools.iter().map(|p| p.stashed_bytes).sum()
    }

    /// Bytes lent out across all pools.
    pub fn total_live_bytes(&self) -> usize {
        self.pools.iter().map(|p| p.live_bytes).sum()
    }
}

impl fmt::Display for PoolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<8} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8}",
            "pool", "live", "max_live", "stashed", "hits", "misses", "evicted"
        )?;
        for kind in PoolKind::ALL {
            let s = self.get(kind);
            writeln!(
                f,
                "{:<8} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8}",
                kind, s.live_bytes, s.max_live_bytes, s.stashed_bytes, s.hits, s.misses, s.evictions
            )?;
        }
        write!(
            f,
            "stash {} / {} bytes",
            self.total_stashed_bytes(),
            self.stash_cap_bytes
        )
    }
}
