//! Per-range destination selection and scratch reuse.

use std::rc::Rc;

use lumen_pool::{PoolAllocator, PoolError};

use crate::scanline::Scanline;

/// A published row shared between its consumers.
pub type SharedLine<'r> = Rc<Scanline<'r>>;

/// Where a member writes its row.
#[derive(Debug)]
pub enum Checkout<'r> {
    /// Into the storage of input slot `input`, which nobody else holds.
    /// If the member also feeds an output slot, `output` carries that row
    /// so the result can be copied there.
    InPlace {
        /// Source slot whose storage is reused.
        input: usize,
        /// The reused scanline.
        line: Scanline<'r>,
        /// The member's output row, if it has one.
        output: Option<&'r mut [f32]>,
    },
    /// Directly into the member's output row.
    Output(&'r mut [f32]),
    /// Into a scratch scanline.
    Scratch(Scanline<'r>),
}

/// Scratch scanlines for one dispatch range.
///
/// Built once per range and reused for every row in it. The free list
/// only ever holds owned scanlines that no binding references, so it
/// grows to the chain's peak number of live rows and then stays put.
pub struct ScanlineGroup<'r> {
    pool: PoolAllocator,
    x1: i32,
    width: usize,
    scratch: Vec<Scanline<'r>>,
    allocated: usize,
}

impl<'r> ScanlineGroup<'r> {
    /// A group handing out `width`-wide scanlines starting at `x1`.
    pub fn new(pool: PoolAllocator, x1: i32, width: usize) -> Self {
        Self {
            pool,
            x1,
            width,
            scratch: Vec::new(),
            allocated: 0,
        }
    }

    /// Pick a destination, in order:
    ///
    /// 1. if `allow_in_place`, an owned input no one else references;
    /// 2. the member's output row, if it has one;
    /// 3. a free scratch scanline;
    /// 4. a newly allocated scratch scanline.
    pub fn find_or_checkout(
        &mut self,
        inputs: &mut [Option<SharedLine<'r>>],
        allow_in_place: bool,
        output: Option<&'r mut [f32]>,
    ) -> Result<Checkout<'r>, PoolError> {
        if allow_in_place {
            for (input, slot) in inputs.iter_mut().enumerate() {
                let unique = slot
                    .as_ref()
                    .is_some_and(|rc| rc.is_owned() && Rc::strong_count(rc) == 1 && Rc::weak_count(rc) == 0);
                if !unique {
                    continue;
                }
                if let Some(rc) = slot.take() {
                    match Rc::try_unwrap(rc) {
                        Ok(line) => return Ok(Checkout::InPlace { input, line, output }),
                        Err(rc) => *slot = Some(rc),
                    }
                }
            }
        }
        if let Some(row) = output {
            return Ok(Checkout::Output(row));
        }
        if let Some(mut line) = self.scratch.pop() {
            line.set_offset(self.x1);
            return Ok(Checkout::Scratch(line));
        }
        self.allocated += 1;
        Ok(Checkout::Scratch(Scanline::owned(&self.pool, self.x1, self.width)?))
    }

    /// Drop one reference to a published row; if it was the last and the
    /// row is owned, keep it for reuse.
    pub fn recycle(&mut self, line: SharedLine<'r>) {
        if let Ok(line) = Rc::try_unwrap(line) {
            self.give_back(line);
        }
    }

    /// Return an unpublished scanline.
    pub fn give_back(&mut self, line: Scanline<'r>) {
        if line.is_owned() && line.width() == self.width {
            self.scratch.push(line);
        }
    }

    /// The allocator scanlines come from.
    pub fn pool(&self) -> &PoolAllocator {
        &self.pool
    }

    /// First column of every scanline.
    pub fn x1(&self) -> i32 {
        self.x1
    }

    /// Width of every scanline.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Scanlines allocated by this group so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Scanlines currently free.
    pub fn free(&self) -> usize {
        self.scratch.len()
    }
}
