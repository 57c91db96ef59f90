//! Lock-free stack of idle bee indices.
//!
//! Bees are pushed one at a time with a compare-and-swap on the head
//! index. Dispatchers withdraw the whole stack with a single swap and walk
//! the chain privately. There is no single-element pop, so the classic
//! ABA hazard of a Treiber stack cannot arise: a withdrawn chain is owned
//! by exactly one dispatcher, and indices are never invalidated.

use std::sync::atomic::{AtomicU32, Ordering};

/// End-of-chain marker.
const NIL: u32 = u32::MAX;

pub(crate) struct IdleStack {
    head: AtomicU32,
    /// `next[i]` links bee `i` to the bee below it while `i` is idle.
    next: Box<[AtomicU32]>,
}

impl IdleStack {
    /// An empty stack able to hold indices `0..capacity`.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity < NIL as usize);
        Self {
            head: AtomicU32::new(NIL),
            next: (0..capacity).map(|_| AtomicU32::new(NIL)).collect(),
        }
    }

    /// Publish bee `index` as idle.
    pub(crate) fn push(&self, index: usize) {
        let idx = index as u32;
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            self.next[index].store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, idx, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Withdraw every idle bee at once.
    ///
    /// Bees not consumed from the batch are pushed back when it drops.
    pub(crate) fn take_all(&self) -> IdleBatch<'_> {
        IdleBatch {
            stack: self,
            cursor: self.head.swap(NIL, Ordering::Acquire),
        }
    }
}

/// A privately owned chain of idle bees.
pub(crate) struct IdleBatch<'a> {
    stack: &'a IdleStack,
    cursor: u32,
}

impl Iterator for IdleBatch<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NIL {
            return None;
        }
        let index = self.cursor as usize;
        self.cursor = self.stack.next[index].load(Ordering::Relaxed);
        Some(index)
    }
}

impl Drop for IdleBatch<'_> {
    fn drop(&mut self) {
        while let Some(index) = self.next() {
            self.stack.push(index);
        }
    }
}
