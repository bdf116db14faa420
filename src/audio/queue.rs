//! Bounded handoff queue from the realtime callback to a worker thread
//!
//! One producer (the JACK process thread) and one consumer (the endpoint's
//! worker). When a push would exceed the configured depth the oldest items
//! are evicted, so the most recent audio always wins. Storage is reserved up
//! front; a push never reallocates.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of a consumer wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// At least one item is queued
    Ready,
    /// The timeout elapsed with nothing queued
    TimedOut,
    /// The queue was closed; the consumer should exit
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Drop-oldest SPSC queue with a cancellable wait
pub struct HandoffQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    max_depth: usize,
    dropped: AtomicU64,
}

impl<T> HandoffQueue<T> {
    /// Create a queue holding at most `max_depth` items (minimum 1)
    pub fn new(max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        Self {
            state: Mutex::new(QueueState {
                // one extra slot for the item pushed before eviction
                items: VecDeque::with_capacity(max_depth + 1),
                closed: false,
            }),
            ready: Condvar::new(),
            max_depth,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push from the realtime thread, dropping evicted items.
    /// Returns how many items were evicted.
    pub fn push(&self, item: T) -> usize {
        self.push_with(item, drop)
    }

    /// Push from the realtime thread, handing each evicted item to `release`
    /// before the next one is evicted.
    pub fn push_with(&self, item: T, mut release: impl FnMut(T)) -> usize {
        let mut evicted = 0;
        {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                release(item);
                return 0;
            }

            state.items.push_back(item);
            while state.items.len() > self.max_depth {
                if let Some(oldest) = state.items.pop_front() {
                    release(oldest);
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(target: "handoff", "!");
        }

        self.ready.notify_one();
        evicted
    }

    /// Block until data is queued or the queue is closed
    pub fn wait_for_data(&self) -> Wait {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.closed {
            self.ready.wait(&mut state);
        }
        if state.closed {
            Wait::Closed
        } else {
            Wait::Ready
        }
    }

    /// Like [`wait_for_data`](Self::wait_for_data) but gives up after `timeout`
    pub fn wait_for_data_timeout(&self, timeout: Duration) -> Wait {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.closed {
            // a spurious wake-up just looks like a timeout to the caller
            let _ = self.ready.wait_for(&mut state, timeout);
        }
        if state.closed {
            Wait::Closed
        } else if state.items.is_empty() {
            Wait::TimedOut
        } else {
            Wait::Ready
        }
    }

    /// Non-blocking pop of the oldest item
    pub fn pop_if_any(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Close the queue, discard anything still queued, and wake the consumer.
    /// Later pushes are released immediately.
    pub fn close(&self) {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        self.ready.notify_all();
        drop(discarded);
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Items evicted by the overflow policy since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
