//! In-flight and stash bookkeeping for a single pool.

use indexmap::IndexMap;

use crate::raw::RawBlock;
use crate::report::PoolStats;

/// A returned block retained for reuse.
pub(crate) struct StashEntry {
    pub(crate) block: RawBlock,
    /// Element size for rect entries, 0 otherwise.
    pub(crate) class: usize,
    /// Scans that passed over this entry without taking it.
    pub(crate) skips: u32,
    /// Allocator-wide insertion counter; lower is older.
    pub(crate) seq: u64,
}

/// Bookkeeping for a lent block. The block itself lives in its `PoolBuffer`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InFlight {
    pub(crate) bytes: usize,
}

/// One of the allocator's three pools.
///
/// An address is in at most one of `in_flight` or `stash` at a time.
#[derive(Default)]
pub(crate) struct Pool {
    in_flight: IndexMap<usize, InFlight>,
    /// Oldest entries first.
    stash: Vec<StashEntry>,
    live_bytes: usize,
    max_live_bytes: usize,
    stashed_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Pool {
    /// Take a stashed block of `[bytes, 2 * bytes]` bytes matching `class`
    /// and at least `align` alignment.
    ///
    /// Entries passed over have their skip count bumped; entries whose
    /// count exceeds `skippiness` are moved into `evicted` so the caller
    /// can free them after releasing the lock.
    pub(crate) fn take(
        &mut self,
        bytes: usize,
        class: usize,
        align: usize,
        skippiness: u32,
        evicted: &mut Vec<RawBlock>,
    ) -> Option<RawBlock> {
        let upper = bytes.saturating_mul(2);
        let mut i = 0;
        while i < self.stash.len() {
            let entry = &mut self.stash[i];
            let size = entry.block.size();
            if entry.class == class && size >= bytes && size <= upper && entry.block.align() >= align {
                let entry = self.stash.remove(i);
                self.stashed_bytes -= size;
                self.hits += 1;
                return Some(entry.block);
            }
            entry.skips += 1;
            if entry.skips > skippiness {
                let entry = self.stash.remove(i);
                self.stashed_bytes -= size;
                self.evictions += 1;
                tracing::debug!(bytes = size, skips = entry.skips, "stash entry evicted by skippiness");
                evicted.push(entry.block);
                continue;
            }
            i += 1;
        }
        self.misses += 1;
        None
    }

    /// Record a block as lent.
    pub(crate) fn lend(&mut self, block: &RawBlock) {
        let bytes = block.size();
        self.in_flight.insert(block.addr(), InFlight { bytes });
        self.live_bytes += bytes;
        self.max_live_bytes = self.max_live_bytes.max(self.live_bytes);
    }

    /// Remove a block from the in-flight table. `None` if it was never lent
    /// by this pool.
    pub(crate) fn retire(&mut self, addr: usize) -> Option<InFlight> {
        let entry = self.in_flight.swap_remove(&addr)?;
        self.live_bytes -= entry.bytes;
        Some(entry)
    }

    /// Put a retired block into the stash with a fresh skip count.
    pub(crate) fn stash(&mut self, block: RawBlock, class: usize, seq: u64) {
        self.stashed_bytes += block.size();
        self.stash.push(StashEntry {
            block,
            class,
            skips: 0,
            seq,
        });
    }

    /// The most evictable entry: highest skip count, then oldest.
    ///
    /// Returns `(skips, seq, index)` so callers can compare across pools.
    pub(crate) fn eviction_candidate(&self) -> Option<(u32, u64, usize)> {
        self.stash
            .iter()
            .enumerate()
            .map(|(i, e)| (e.skips, e.seq, i))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
    }

    /// Remove the stash entry at `index` and count it as evicted.
    pub(crate) fn evict_at(&mut self, index: usize) -> RawBlock {
        let entry = self.stash.remove(index);
        self.stashed_bytes -= entry.block.size();
        self.evictions += 1;
        entry.block
    }

    /// Count a block freed without ever entering the stash.
    pub(crate) fn count_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Drain every stash entry.
    pub(crate) fn drain_stash(&mut self) -> impl Iterator<Item = RawBlock> + '_ {
        self.stashed_bytes = 0;
        self.stash.drain(..).map(|e| e.block)
    }

    pub(crate) fn stashed_bytes(&self) -> usize {
        self.stashed_bytes
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            live_bytes: self.live_bytes,
            max_live_bytes: self.max_live_bytes,
            live_count: self.in_flight.len(),
            stashed_bytes: self.stashed_bytes,
            stashed_count: self.stash.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
