//! FIFO of pending jobs with single-flight dispatch.
//!
//! Producers append from any thread. A single dispatcher worker pops jobs
//! one at a time; the queue tracks whether that worker is alive so an
//! `enqueue` knows when it must start one. Both decisions are made under the
//! same lock, so a wakeup is never lost and two workers never overlap.

use crate::recognizer::cancel::CancellationFlag;
use crate::recognizer::request::RecognitionRequest;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<RecognitionRequest>,
    /// A dispatcher worker is running (it owns the active job, if any).
    dispatching: bool,
    /// Bumped by every stop; submissions taken before it are stale.
    generation: u64,
}

/// Outcome of [`RequestQueue::enqueue_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The dispatcher was idle; the caller must start it.
    StartDispatcher,
    /// A dispatcher is already running and will reach this job.
    Queued,
    /// A stop happened after the job was submitted; it was discarded.
    Stale,
}

/// Unbounded FIFO plus the dispatcher's busy bit.
#[derive(Debug)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
    cancel: CancellationFlag,
}

impl RequestQueue {
    /// Create a queue that clears `cancel` whenever a job is started and
    /// raises it on [`cancel_all`](Self::cancel_all).
    pub fn new(cancel: CancellationFlag) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a job. Returns `true` if the dispatcher was idle and must be
    /// started by the caller.
    pub fn enqueue(&self, request: RecognitionRequest) -> bool {
        let mut state = self.lock();
        state.pending.push_back(request);
        Self::claim_dispatch(&mut state)
    }

    /// Append a job submitted during `generation`, unless a stop has
    /// happened since.
    pub fn enqueue_in(&self, generation: u64, request: RecognitionRequest) -> Enqueued {
        let mut state = self.lock();
        if state.generation != generation {
            return Enqueued::Stale;
        }
        state.pending.push_back(request);
        if Self::claim_dispatch(&mut state) {
            Enqueued::StartDispatcher
        } else {
            Enqueued::Queued
        }
    }

    fn claim_dispatch(state: &mut QueueState) -> bool {
        if state.dispatching {
            false
        } else {
            state.dispatching = true;
            true
        }
    }

    /// Pop the head as the new active job and clear the cancellation flag.
    ///
    /// Returns `None` when the queue is empty; the dispatcher is then marked
    /// idle and must exit.
    pub fn dequeue_active(&self) -> Option<RecognitionRequest> {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(request) => {
                self.cancel.clear();
                Some(request)
            }
            None => {
                state.dispatching = false;
                None
            }
        }
    }

    /// Give up a dispatch claimed by `enqueue` when no worker could be started.
    pub fn release_dispatch(&self) {
        self.lock().dispatching = false;
    }

    /// Drop every pending job without touching the active one.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    /// Drop every pending job, raise the cancellation flag for the active
    /// one and invalidate submissions still being admitted.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.generation = state.generation.wrapping_add(1);
        self.cancel.raise();
        dropped
    }

    /// Current stop generation.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// True while a dispatcher worker owns the queue.
    pub fn is_dispatching(&self) -> bool {
        self.lock().dispatching
    }
}
