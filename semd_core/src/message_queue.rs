//! Bounded message queue drained by long-polling editors.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of entries kept before the oldest is dropped.
pub const MAX_QUEUED_MESSAGES: usize = 250;

/// Result of a bounded wait.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// Everything that was pending, oldest first.
    Items(Vec<T>),
    /// Nothing arrived before the deadline.
    TimedOut,
    /// The producer is gone; no more items will arrive.
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer ring buffer with a condition-variable wait.
pub struct MessageQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    capacity: usize,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new(MAX_QUEUED_MESSAGES)
    }
}

impl<T> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry, dropping the oldest when full.
    ///
    /// Returns false if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.items.len() == self.capacity {
            state.items.pop_front();
            log::debug!("Message queue full, dropped oldest entry");
        }
        state.items.push_back(item);
        self.ready.notify_all();
        true
    }

    /// Takes everything currently queued without waiting.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Waits up to `timeout` for entries.
    ///
    /// Pending entries are returned even if the queue was closed after they
    /// were pushed.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if !state.items.is_empty() {
                return WaitOutcome::Items(state.items.drain(..).collect());
            }
            if state.closed {
                return WaitOutcome::Closed;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                if state.items.is_empty() && !state.closed {
                    return WaitOutcome::TimedOut;
                }
            }
        }
    }

    /// Wakes all waiters; later pushes are refused.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Accepts pushes again and discards stale entries.
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.items.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
