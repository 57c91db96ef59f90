//! The pool allocator: request routing, stash reuse and the byte budget.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumen_core::{round_stride, ElementKind};

use crate::buffer::PoolBuffer;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::raw::{rounded_size, RawBlock};
use crate::report::{PoolKind, PoolReport};
use crate::stash::Pool;

/// Mutable allocator state, guarded by one mutex.
struct State {
    config: PoolConfig,
    pools: [Pool; 3],
    /// Next stash insertion sequence number.
    seq: u64,
}

impl State {
    fn pool(&mut self, kind: PoolKind) -> &mut Pool {
        &mut self.pools[kind.index()]
    }

    fn total_stashed(&self) -> usize {
        self.pools.iter().map(Pool::stashed_bytes).sum()
    }

    /// Evict until `incoming` more bytes fit under the cap.
    fn make_room(&mut self, incoming: usize, freed: &mut Vec<RawBlock>) {
        while self.total_stashed() + incoming > self.config.stash_cap_bytes {
            let victim = self
                .pools
                .iter()
                .enumerate()
                .filter_map(|(p, pool)| pool.eviction_candidate().map(|c| (c, p)))
                .max_by(|(a, _), (b, _)| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
            let Some(((_, _, index), p)) = victim else {
                break;
            };
            freed.push(self.pools[p].evict_at(index));
        }
    }
}

/// State shared between the allocator handle and every lent buffer.
pub(crate) struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Bookkeeping stays consistent across a panic elsewhere; keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a block from a dropped [`PoolBuffer`].
    pub(crate) fn release(&self, kind: PoolKind, class: usize, block: RawBlock) {
        let mut freed = Vec::new();
        {
            let mut state = self.lock();
            let addr = block.addr();
            if state.pool(kind).retire(addr).is_none() {
                tracing::error!(
                    pool = %kind,
                    addr = format_args!("{addr:#x}"),
                    bytes = block.size(),
                    "released block is not in flight; freeing instead of stashing"
                );
                freed.push(block);
            } else if block.size() > state.config.stash_cap_bytes {
                state.pool(kind).count_eviction();
                freed.push(block);
            } else {
                state.make_room(block.size(), &mut freed);
                let seq = state.seq;
                state.seq += 1;
                state.pool(kind).stash(block, class, seq);
            }
        }
        // `freed` drops here, outside the lock.
    }
}

/// A thread-safe pool allocator.
///
/// Cloning is cheap and yields another handle to the same pools. Buffers
/// keep the pools alive until they are dropped.
///
/// # Example
///
/// ```
/// use lumen_pool::{PoolAllocator, PoolConfig};
///
/// let pool = PoolAllocator::new(PoolConfig::default()).unwrap();
/// let first = pool.allocate(1000, 64).unwrap();
/// let addr = first.as_ptr();
/// drop(first);
///
/// // A request in the same size bucket reuses the stashed block.
/// let second = pool.allocate(900, 64).unwrap();
/// assert_eq!(second.as_ptr(), addr);
/// ```
#[derive(Clone)]
pub struct PoolAllocator {
    shared: Arc<Shared>,
}

impl PoolAllocator {
    /// Create an allocator with empty pools.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    config,
                    pools: Default::default(),
                    seq: 0,
                }),
            }),
        })
    }

    /// Acquire an untyped buffer of at least `bytes` bytes.
    ///
    /// `align` is raised to [`PoolConfig::MIN_ALIGNMENT`] if smaller.
    pub fn allocate(&self, bytes: usize, align: usize) -> Result<PoolBuffer, PoolError> {
        self.acquire(PoolKind::Generic, bytes, align.max(PoolConfig::MIN_ALIGNMENT), 0)
    }

    /// Acquire a row buffer for `width` `f32` elements.
    ///
    /// Returns the buffer and its stride in elements (`width` rounded up
    /// to the SIMD lane count).
    pub fn scanline_buffer(&self, width: usize) -> Result<(PoolBuffer, usize), PoolError> {
        let kind = ElementKind::F32;
        let stride = round_stride(width, kind);
        let align = self.alignment();
        let buffer = self.acquire(PoolKind::Line, stride * kind.size(), align, 0)?;
        Ok((buffer, stride))
    }

    /// Acquire a `width` × `height` buffer of `kind` elements.
    ///
    /// Returns the buffer and its row stride in elements.
    pub fn rect_buffer(
        &self,
        width: usize,
        height: usize,
        kind: ElementKind,
    ) -> Result<(PoolBuffer, usize), PoolError> {
        let stride = round_stride(width, kind);
        let bytes = stride
            .checked_mul(height.max(1))
            .and_then(|n| n.checked_mul(kind.size()))
            .ok_or(PoolError::InvalidLayout {
                bytes: usize::MAX,
                align: self.alignment(),
            })?;
        let buffer = self.acquire(PoolKind::Rect, bytes, self.alignment(), kind.size())?;
        Ok((buffer, stride))
    }

    fn acquire(
        &self,
        kind: PoolKind,
        bytes: usize,
        align: usize,
        class: usize,
    ) -> Result<PoolBuffer, PoolError> {
        // Stashed blocks carry their rounded size, so match on that.
        let wanted = rounded_size(bytes, align).ok_or(PoolError::InvalidLayout { bytes, align })?;
        let mut evicted = Vec::new();
        let reused = {
            let mut state = self.shared.lock();
            let skippiness = state.config.skippiness;
            let pool = state.pool(kind);
            let block = pool.take(wanted, class, align, skippiness, &mut evicted);
            if let Some(block) = &block {
                pool.lend(block);
            }
            block
        };
        drop(evicted);

        let block = match reused {
            Some(block) => block,
            None => {
                tracing::debug!(pool = %kind, bytes, align, "stash miss, allocating from the OS");
                let block = RawBlock::allocate(bytes, align)?;
                self.shared.lock().pool(kind).lend(&block);
                block
            }
        };
        Ok(PoolBuffer::new(block, kind, class, Arc::clone(&self.shared)))
    }

    /// Evict stashed entries until the stash fits its budget.
    ///
    /// Returns the number of bytes freed.
    pub fn reduce(&self) -> usize {
        let mut freed = Vec::new();
        self.shared.lock().make_room(0, &mut freed);
        freed.iter().map(RawBlock::size).sum()
    }

    /// Change the stash budget and evict down to it.
    pub fn set_stash_size(&self, bytes: usize) {
        let mut freed = Vec::new();
        {
            let mut state = self.shared.lock();
            state.config.stash_cap_bytes = bytes;
            state.make_room(0, &mut freed);
        }
        if !freed.is_empty() {
            tracing::debug!(cap = bytes, evicted = freed.len(), "stash shrunk");
        }
    }

    /// Change how many mismatches a stashed entry survives.
    pub fn set_skippiness(&self, skippiness: u32) {
        self.shared.lock().config.skippiness = skippiness;
    }

    /// Free every stashed entry. Lent buffers are unaffected.
    pub fn clear_stash(&self) {
        let freed: Vec<RawBlock> = {
            let mut state = self.shared.lock();
            state
                .pools
                .iter_mut()
                .flat_map(|pool| pool.drain_stash().collect::<Vec<_>>())
                .collect()
        };
        drop(freed);
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> PoolConfig {
        self.shared.lock().config.clone()
    }

    fn alignment(&self) -> usize {
        self.shared.lock().config.alignment
    }

    /// Snapshot of every pool's counters.
    pub fn report(&self) -> PoolReport {
        let state = self.shared.lock();
        PoolReport {
            pools: [
                state.pools[0].stats(),
                state.pools[1].stats(),
                state.pools[2].stats(),
            ],
            stash_cap_bytes: state.config.stash_cap_bytes,
        }
    }

    /// Emit the current report through `tracing` at info level.
    pub fn log_report(&self) {
        let report = self.report();
        for kind in PoolKind::ALL {
            let s = report.get(kind);
            tracing::info!(
                pool = %kind,
                live_bytes = s.live_bytes,
                max_live_bytes = s.max_live_bytes,
                stashed_bytes = s.stashed_bytes,
                hits = s.hits,
                misses = s.misses,
                evictions = s.evictions,
                "pool report"
            );
        }
    }
}

// Compile-time assertion: allocator handles and buffers cross threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<PoolAllocator>();
    assert::<PoolBuffer>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PoolAllocator {
        PoolAllocator::new(PoolConfig::default()).unwrap()
    }

    #[test]
    fn allocate_is_aligned_and_large_enough() {
        let pool = allocator();
        let buf = pool.allocate(1000, 64).unwrap();
        assert!(buf.len_bytes() >= 1000);
        assert_eq!(buf.as_ptr() as usize % 64, 0);
        assert_eq!(buf.kind(), PoolKind::Generic);
    }

    #[test]
    fn released_buffer_is_reused_without_os_allocation() {
        let pool = allocator();
        let addr = pool.allocate(4096, 64).unwrap().as_ptr();
        let again = pool.allocate(3000, 64).unwrap();
        assert_eq!(again.as_ptr(), addr);
        let stats = pool.report().get(PoolKind::Generic).clone();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn small_requests_reuse_their_own_block() {
        let pool = allocator();
        for bytes in [1, 10, 30, 100, 1000] {
            let addr = pool.allocate(bytes, 64).unwrap().as_ptr();
            let again = pool.allocate(bytes, 64).unwrap();
            assert_eq!(again.as_ptr(), addr, "{bytes} bytes");
        }
        // 1, 10 and 30 all round to the same 64-byte block.
        let stats = pool.report().get(PoolKind::Generic).clone();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 7);
    }

    #[test]
    fn request_outside_bucket_allocates_fresh() {
        let pool = allocator();
        let small = pool.allocate(64, 64).unwrap();
        let addr = small.as_ptr();
        drop(small);
        // 64-byte entry is below the 4096 request.
        let big = pool.allocate(4096, 64).unwrap();
        assert_ne!(big.as_ptr(), addr);
        assert_eq!(pool.report().get(PoolKind::Generic).misses, 2);
    }

    #[test]
    fn scanline_stride_is_lane_multiple() {
        let pool = allocator();
        let (buf, stride) = pool.scanline_buffer(70).unwrap();
        assert_eq!(stride, 80);
        assert!(buf.as_slice::<f32>().len() >= 70);
        assert_eq!(buf.kind(), PoolKind::Line);
    }

    #[test]
    fn rect_buffers_are_disambiguated_by_element_size() {
        let pool = allocator();
        // 16 f32 × 2 rows = 128 bytes; 8 f64 × 2 rows = 128 bytes.
        let (f, _) = pool.rect_buffer(16, 2, ElementKind::F32).unwrap();
        let addr = f.as_ptr();
        drop(f);
        let (d, stride) = pool.rect_buffer(8, 2, ElementKind::F64).unwrap();
        assert_eq!(stride, 8);
        assert_ne!(d.as_ptr(), addr);
        drop(d);
        let (f2, _) = pool.rect_buffer(16, 2, ElementKind::F32).unwrap();
        assert_eq!(f2.as_ptr(), addr);
    }

    #[test]
    fn live_and_max_live_bytes_tracked() {
        let pool = allocator();
        let a = pool.allocate(128, 64).unwrap();
        let b = pool.allocate(256, 64).unwrap();
        let report = pool.report();
        assert_eq!(report.get(PoolKind::Generic).live_bytes, 384);
        assert_eq!(report.get(PoolKind::Generic).live_count, 2);
        drop(a);
        drop(b);
        let report = pool.report();
        assert_eq!(report.get(PoolKind::Generic).live_bytes, 0);
        assert_eq!(report.get(PoolKind::Generic).max_live_bytes, 384);
        assert_eq!(report.get(PoolKind::Generic).stashed_bytes, 384);
    }

    #[test]
    fn stash_respects_cap_on_release() {
        let pool = PoolAllocator::new(PoolConfig {
            stash_cap_bytes: 1024,
            ..PoolConfig::default()
        })
        .unwrap();
        let bufs: Vec<_> = (0..4).map(|_| pool.allocate(512, 64).unwrap()).collect();
        drop(bufs);
        let report = pool.report();
        assert!(report.total_stashed_bytes() <= 1024);
        assert_eq!(report.get(PoolKind::Generic).evictions, 2);
    }

    #[test]
    fn oversized_release_is_freed_directly() {
        let pool = PoolAllocator::new(PoolConfig {
            stash_cap_bytes: 100,
            ..PoolConfig::default()
        })
        .unwrap();
        drop(pool.allocate(4096, 64).unwrap());
        let report = pool.report();
        assert_eq!(report.total_stashed_bytes(), 0);
        assert_eq!(report.get(PoolKind::Generic).evictions, 1);
    }

    #[test]
    fn set_stash_size_reduces_immediately() {
        let pool = allocator();
        let bufs: Vec<_> = (0..8).map(|_| pool.allocate(1024, 64).unwrap()).collect();
        drop(bufs);
        assert_eq!(pool.report().total_stashed_bytes(), 8 * 1024);
        pool.set_stash_size(3 * 1024);
        assert!(pool.report().total_stashed_bytes() <= 3 * 1024);
        assert_eq!(pool.config().stash_cap_bytes, 3 * 1024);
    }

    #[test]
    fn skippiness_evicts_stale_entry() {
        let pool = allocator();
        pool.set_skippiness(2);
        drop(pool.allocate(1 << 16, 64).unwrap());
        // Small requests pass over the big entry three times.
        let smalls: Vec<_> = (0..3).map(|_| pool.allocate(64, 64).unwrap()).collect();
        assert_eq!(pool.report().get(PoolKind::Generic).evictions, 1);
        assert_eq!(pool.report().get(PoolKind::Generic).stashed_count, 0);
        drop(smalls);
        let _again = pool.allocate(1 << 16, 64).unwrap();
        let stats = pool.report().get(PoolKind::Generic).clone();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 5);
    }

    #[test]
    fn clear_stash_frees_everything() {
        let pool = allocator();
        drop(pool.scanline_buffer(100).unwrap());
        drop(pool.rect_buffer(10, 10, ElementKind::F64).unwrap());
        assert!(pool.report().total_stashed_bytes() > 0);
        pool.clear_stash();
        assert_eq!(pool.report().total_stashed_bytes(), 0);
    }

    #[test]
    fn unknown_release_is_ignored() {
        let pool = allocator();
        let stray = RawBlock::allocate(64, 64).unwrap();
        pool.shared.release(PoolKind::Rect, 4, stray);
        let report = pool.report();
        assert_eq!(report.total_stashed_bytes(), 0);
        assert_eq!(report.get(PoolKind::Rect).live_bytes, 0);
    }

    #[test]
    fn reduce_reports_freed_bytes() {
        let pool = allocator();
        drop(pool.allocate(2048, 64).unwrap());
        {
            let mut state = pool.shared.lock();
            state.config.stash_cap_bytes = 0;
        }
        assert_eq!(pool.reduce(), 2048);
        assert_eq!(pool.report().total_stashed_bytes(), 0);
    }

    #[test]
    fn buffers_outlive_allocator_handle() {
        let pool = allocator();
        let mut buf = pool.allocate(64, 16).unwrap();
        drop(pool);
        buf.as_mut_slice::<f32>()[0] = 1.0;
        assert_eq!(buf.as_slice::<f32>()[0], 1.0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_allocation_is_aligned_and_sized(
                sizes in proptest::collection::vec(0usize..50_000, 1..40),
            ) {
                let pool = allocator();
                let mut held = Vec::new();
                for (i, &s) in sizes.iter().enumerate() {
                    let buf = pool.allocate(s, 64).unwrap();
                    prop_assert!(buf.len_bytes() >= s);
                    prop_assert_eq!(buf.as_ptr() as usize % 64, 0);
                    if i % 3 == 0 {
                        held.push(buf);
                    }
                }
            }

            #[test]
            fn stash_bounded_after_reduce(
                sizes in proptest::collection::vec(1usize..20_000, 1..60),
                cap in 0usize..100_000,
            ) {
                let pool = allocator();
                let bufs: Vec<_> = sizes.iter().map(|&s| pool.allocate(s, 64).unwrap()).collect();
                drop(bufs);
                pool.set_stash_size(cap);
                pool.reduce();
                prop_assert!(pool.report().total_stashed_bytes() <= cap);
            }
        }
    }
}
