//! Lifetime-erased range function handed to a bee.

#![allow(unsafe_code)]

/// The callable every chunk runs: `(worker, start, end)`.
pub(crate) type RangeFn<'a> = dyn Fn(usize, usize, usize) + Sync + 'a;

/// One chunk of a dispatch.
pub(crate) struct Job {
    f: &'static RangeFn<'static>,
    worker: usize,
    start: usize,
    end: usize,
}

impl Job {
    /// Package a chunk for a bee.
    ///
    /// # Safety
    ///
    /// The caller must keep `f` alive, and must not return or finish
    /// unwinding, until the bee this job is sent to has run it and
    /// published its finished flag.
    pub(crate) unsafe fn new<'a>(f: &'a RangeFn<'a>, worker: usize, start: usize, end: usize) -> Self {
        // SAFETY: only the lifetime is changed; the fat pointer layout is
        // identical. The caller guarantees the referent outlives every use.
        let f = unsafe { std::mem::transmute::<&'a RangeFn<'a>, &'static RangeFn<'static>>(f) };
        Self {
            f,
            worker,
            start,
            end,
        }
    }

    /// Run the chunk, consuming the borrow of the range function.
    pub(crate) fn run(self) {
        (self.f)(self.worker, self.start, self.end);
    }
}
