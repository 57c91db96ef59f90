//! The worker pool and range dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};
use smallvec::SmallVec;

use crate::config::ThreadPoolConfig;
use crate::error::ThreadError;
use crate::idle::{IdleBatch, IdleStack};
use crate::job::{Job, RangeFn};

/// Busy-wait iterations before the completion poll starts yielding.
const SPIN_LIMIT: u32 = 64;

enum Signal {
    Run(Job),
    Stop,
}

/// Per-bee completion state, padded to its own cache line pair.
#[repr(align(128))]
struct BeeSlot {
    finished: AtomicBool,
    panicked: AtomicBool,
}

/// State shared by the pool handle and every bee thread.
struct Hive {
    slots: Box<[BeeSlot]>,
    idle: IdleStack,
    stop: AtomicBool,
}

/// A fixed set of worker threads plus the calling thread.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use lumen_threads::{ThreadPool, ThreadPoolConfig};
///
/// let pool = ThreadPool::new(ThreadPoolConfig::with_workers(3)).unwrap();
/// let sum = AtomicUsize::new(0);
/// pool.dispatch(
///     |_worker, start, end| {
///         sum.fetch_add((start..end).sum(), Ordering::Relaxed);
///     },
///     0,
///     100,
/// )
/// .unwrap();
/// assert_eq!(sum.into_inner(), 4950);
/// ```
pub struct ThreadPool {
    hive: Arc<Hive>,
    senders: Vec<Sender<Signal>>,
    handles: Vec<JoinHandle<()>>,
    config: ThreadPoolConfig,
}

// Compile-time assertion: one pool is shared by every dispatching thread.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ThreadPool>();
};

impl ThreadPool {
    /// Spawn the configured number of bees, all parked and idle.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadError> {
        config.validate()?;
        let workers = config.resolved_worker_count();
        let hive = Arc::new(Hive {
            slots: (0..workers)
                .map(|_| BeeSlot {
                    finished: AtomicBool::new(true),
                    panicked: AtomicBool::new(false),
                })
                .collect(),
            idle: IdleStack::new(workers),
            stop: AtomicBool::new(false),
        });

        // Bees spawned before a failure are joined by this pool's Drop.
        let mut pool = Self {
            hive,
            senders: Vec::with_capacity(workers),
            handles: Vec::with_capacity(workers),
            config,
        };
        for index in 0..workers {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let hive = Arc::clone(&pool.hive);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", pool.config.thread_name))
                .spawn(move || bee_loop(&hive, index, &rx))
                .map_err(|e| ThreadError::SpawnFailed {
                    reason: e.to_string(),
                })?;
            pool.senders.push(tx);
            pool.handles.push(handle);
        }
        for index in (0..workers).rev() {
            pool.hive.idle.push(index);
        }
        tracing::debug!(workers, name = %pool.config.thread_name, "thread pool started");
        Ok(pool)
    }

    /// A pool with no worker threads: every chunk runs on the caller.
    pub fn inline() -> Self {
        Self {
            hive: Arc::new(Hive {
                slots: Box::new([]),
                idle: IdleStack::new(0),
                stop: AtomicBool::new(false),
            }),
            senders: Vec::new(),
            handles: Vec::new(),
            config: ThreadPoolConfig::with_workers(0),
        }
    }

    /// Number of worker threads, excluding the caller.
    ///
    /// Range functions see worker indices in `0..=worker_count()`; the
    /// caller's inline chunks use `worker_count()`.
    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// The configuration this pool was built from.
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Run `f(worker, sub_start, sub_end)` over disjoint sub-ranges whose
    /// union is `[start, start + count)`, blocking until all have run.
    ///
    /// The range is cut into chunks of `ceil(count / (workers + 1))`.
    /// Every chunk but the last goes to an idle bee if one is available
    /// and runs inline otherwise; the last chunk always runs inline. `f`
    /// must tolerate concurrent calls on disjoint ranges.
    ///
    /// A panic in an inline chunk propagates to the caller, but only
    /// after every chunk issued to a bee has finished. A panic on a bee
    /// is reported as [`ThreadError::WorkerPanicked`].
    pub fn dispatch<F>(&self, f: F, start: usize, count: usize) -> Result<(), ThreadError>
    where
        F: Fn(usize, usize, usize) + Sync,
    {
        if count == 0 {
            return Err(ThreadError::EmptyRange { start });
        }
        let end = start
            .checked_add(count)
            .ok_or(ThreadError::RangeOverflow { start, count })?;
        let caller = self.worker_count();
        let chunk = count.div_ceil(caller + 1);
        let f: &RangeFn<'_> = &f;

        let mut in_progress = InProgress::new(&self.hive);
        let mut idle = None;
        let mut sub_start = start;
        while sub_start < end {
            let sub_end = sub_start + chunk.min(end - sub_start);
            if sub_end < end {
                if let Some(bee) = self.next_idle(&mut idle) {
                    self.hive.slots[bee].finished.store(false, Ordering::Relaxed);
                    // SAFETY: `in_progress` waits for this bee when it drops,
                    // which happens before `f` goes out of scope on every
                    // exit path, unwinding included.
                    #[allow(unsafe_code)]
                    let job = unsafe { Job::new(f, bee, sub_start, sub_end) };
                    match self.senders[bee].send(Signal::Run(job)) {
                        Ok(()) => in_progress.bees.push(bee),
                        Err(SendError(_)) => {
                            // The bee thread is gone; its slot stays out of
                            // the idle stack for good.
                            tracing::error!(worker = bee, "bee channel closed; running chunk inline");
                            f(caller, sub_start, sub_end);
                        }
                    }
                    sub_start = sub_end;
                    continue;
                }
            }
            f(caller, sub_start, sub_end);
            sub_start = sub_end;
        }
        drop(idle);

        in_progress.wait();
        match in_progress.panicked.take() {
            Some(worker) => Err(ThreadError::WorkerPanicked { worker }),
            None => Ok(()),
        }
    }

    /// Pop the next idle bee, withdrawing a fresh batch when the current
    /// one is exhausted.
    fn next_idle<'h>(&'h self, batch: &mut Option<IdleBatch<'h>>) -> Option<usize> {
        if let Some(bee) = batch.as_mut().and_then(Iterator::next) {
            return Some(bee);
        }
        let mut fresh = self.hive.idle.take_all();
        let bee = fresh.next();
        *batch = Some(fresh);
        bee
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.hive.stop.store(true, Ordering::Release);
        for tx in &self.senders {
            let _ = tx.send(Signal::Stop);
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("bee thread exited by panic");
            }
        }
        if !self.senders.is_empty() {
            tracing::debug!(workers = self.senders.len(), "thread pool shut down");
        }
    }
}

/// Bees issued by one dispatch that have not yet been seen finished.
///
/// Waiting happens in `Drop` as well, so the borrowed range function
/// outlives every bee using it even when the inline chunk unwinds.
struct InProgress<'h> {
    hive: &'h Hive,
    bees: SmallVec<[usize; 16]>,
    panicked: Option<usize>,
}

impl<'h> InProgress<'h> {
    fn new(hive: &'h Hive) -> Self {
        Self {
            hive,
            bees: SmallVec::new(),
            panicked: None,
        }
    }

    /// Poll until every issued bee has finished, returning each to the
    /// idle stack as it completes.
    fn wait(&mut self) {
        let hive = self.hive;
        let panicked = &mut self.panicked;
        let mut spins = 0;
        while !self.bees.is_empty() {
            self.bees.retain(|bee| {
                let slot = &hive.slots[*bee];
                if !slot.finished.load(Ordering::Acquire) {
                    return true;
                }
                if slot.panicked.swap(false, Ordering::Relaxed) {
                    panicked.get_or_insert(*bee);
                }
                hive.idle.push(*bee);
                false
            });
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.wait();
    }
}

fn bee_loop(hive: &Hive, index: usize, rx: &Receiver<Signal>) {
    while !hive.stop.load(Ordering::Acquire) {
        let job = match rx.recv() {
            Ok(Signal::Run(job)) => job,
            Ok(Signal::Stop) | Err(_) => break,
        };
        let slot = &hive.slots[index];
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
            tracing::error!(
                worker = index,
                panic = panic_message(payload.as_ref()),
                "range function panicked on worker"
            );
            slot.panicked.store(true, Ordering::Relaxed);
        }
        slot.finished.store(true, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}
