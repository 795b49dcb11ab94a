//! Cost-aware batcher: a state machine for scheduling `N` totally-ordered
//! tasks with a per-task cost function, used by the exchange protocol's
//! retrieve/send loops (spec §4.G.3).
//!
//! The batcher accumulates tasks into a batch until cumulative cost first
//! reaches `1.0` (a unit-less target workload), then hands the `[start,
//! start+size)` range to the caller. The caller reports one of:
//! - `Success`: advance past the batch.
//! - `GrowAndReExecute`: the batch lacked a neighbor it needed (e.g. a
//!   commit whose parent isn't in the window yet); widen by one task and
//!   retry. Fails with `CouldNotGrow` if the batch already spans every
//!   remaining task.
//! - a definitive failure, which aborts the whole run.
//!
//! Invariant: monotone progress. Either `completed_count` grows (a batch
//! succeeded) or the batch size grows (a grow was requested) — the loop in
//! [`Batcher::run`] can never spin without making one of the two larger.

use std::fmt;

/// What the caller's batch executor decided after attempting a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch was applied successfully; advance past it.
    Success,
    /// The batch could not be applied as-is; widen the window by one task
    /// and retry from the same start.
    GrowAndReExecute,
}

/// The batcher's explicit state, mirroring spec §4.G.3's `{idle, running,
/// grown}` state machine. Exposed mainly for introspection/testing; the
/// [`Batcher::run`] driver moves through these states internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    /// No batch is in flight.
    Idle,
    /// A batch of the given size is being attempted for the first time.
    Running(usize),
    /// A batch of the given size is being retried after a grow.
    Grown(usize),
}

/// Error from driving a batcher to completion. `Failure` carries whatever
/// definitive error the caller's executor raised.
#[derive(Debug)]
pub enum BatcherError<E> {
    /// The window could not grow past the entire remaining range.
    CouldNotGrow,
    /// The executor reported a definitive failure.
    Failure(E),
}

impl<E: fmt::Display> fmt::Display for BatcherError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatcherError::CouldNotGrow => write!(f, "batch could not grow past the remaining window"),
            BatcherError::Failure(e) => write!(f, "batch failed: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BatcherError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatcherError::Failure(e) => Some(e),
            BatcherError::CouldNotGrow => None,
        }
    }
}

impl From<BatcherError<dagstore_core::Error>> for dagstore_core::Error {
    fn from(e: BatcherError<dagstore_core::Error>) -> Self {
        match e {
            BatcherError::CouldNotGrow => dagstore_core::Error::CouldNotGrow,
            BatcherError::Failure(e) => e,
        }
    }
}

/// A cost-aware batch scheduler over `total` totally-ordered tasks.
pub struct Batcher<C> {
    total: usize,
    cost_fn: C,
    state: BatcherState,
    start: usize,
    completed_count: usize,
}

impl<C: Fn(usize) -> f64> Batcher<C> {
    /// Create a batcher over tasks `0..total`, where `cost_fn(i)` is the
    /// cost of task `i` (spec: cost is in `[0, ∞)`).
    pub fn new(total: usize, cost_fn: C) -> Self {
        Batcher {
            total,
            cost_fn,
            state: BatcherState::Idle,
            start: 0,
            completed_count: 0,
        }
    }

    /// Current explicit state.
    pub fn state(&self) -> BatcherState {
        self.state
    }

    /// How many batches have completed successfully so far.
    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    /// Accumulate tasks from `start` until cumulative cost reaches `1.0`
    /// or the remaining tasks are exhausted. Always returns at least 1 if
    /// any tasks remain, so a single infinite-cost task still makes
    /// progress.
    fn accumulate(&self, start: usize) -> usize {
        let mut acc = 0.0f64;
        let mut n = 0usize;
        while start + n < self.total {
            acc += (self.cost_fn)(start + n);
            n += 1;
            if acc >= 1.0 {
                break;
            }
        }
        n.max(1)
    }

    /// Drive the batcher to completion. `execute(start, len)` is handed
    /// each `[start, start+len)` range and must return a [`BatchOutcome`]
    /// or a definitive error `E`.
    ///
    /// Returns the number of successful batches on completion.
    pub fn run<E>(
        &mut self,
        mut execute: impl FnMut(usize, usize) -> Result<BatchOutcome, E>,
    ) -> Result<usize, BatcherError<E>> {
        if self.total == 0 {
            return Ok(0);
        }
        self.start = 0;
        let mut size = self.accumulate(self.start);
        self.state = BatcherState::Running(size);

        while self.start < self.total {
            match execute(self.start, size) {
                Ok(BatchOutcome::Success) => {
                    self.start += size;
                    self.completed_count += 1;
                    if self.start >= self.total {
                        break;
                    }
                    size = self.accumulate(self.start);
                    self.state = BatcherState::Running(size);
                }
                Ok(BatchOutcome::GrowAndReExecute) => {
                    let remaining = self.total - self.start;
                    if size >= remaining {
                        self.state = BatcherState::Idle;
                        return Err(BatcherError::CouldNotGrow);
                    }
                    size = (size + 1).min(remaining);
                    self.state = BatcherState::Grown(size);
                }
                Err(e) => {
                    self.state = BatcherState::Idle;
                    return Err(BatcherError::Failure(e));
                }
            }
        }
        self.state = BatcherState::Idle;
        Ok(self.completed_count)
    }
}
