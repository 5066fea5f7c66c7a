//! Correlation of outgoing requests with their responses.
//!
//! Every entry is removed by exactly one party: the reader resolving it,
//! the connection cancelling it, or the waiter giving up at its deadline.
//! Whoever removes the entry owns the outcome; late arrivals find nothing
//! and are dropped.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use semd_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outstanding requests of one connection.
pub struct RequestTable {
    pending: Mutex<HashMap<i64, Sender<Result<Value>>>>,
    next_id: AtomicI64,
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTable {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Allocates a fresh correlation id.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers `id` and returns the handle the caller waits on.
    pub fn register(self: &Arc<Self>, id: i64) -> PendingRequest {
        let (tx, rx) = bounded(1);
        let previous = self.pending.lock().insert(id, tx);
        if previous.is_some() {
            log::warn!("Request id {} registered twice", id);
        }
        PendingRequest {
            id,
            rx,
            table: Arc::clone(self),
        }
    }

    /// Delivers a result. Unknown ids are ignored.
    pub fn resolve(&self, id: i64, result: Value) -> bool {
        self.complete(id, Ok(result))
    }

    /// Delivers an error. Unknown ids are ignored.
    pub fn fail(&self, id: i64, error: Error) -> bool {
        self.complete(id, Err(error))
    }

    /// Fails every outstanding request with `error`.
    pub fn cancel_all(&self, error: Error) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            log::debug!("Cancelling {} pending requests: {}", drained.len(), error);
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Number of requests still waiting for an answer.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }

    fn complete(&self, id: i64, result: Result<Value>) -> bool {
        let Some(tx) = self.pending.lock().remove(&id) else {
            log::debug!("Dropping response for unknown request id {}", id);
            return false;
        };
        // The receiver may already be gone if the caller dropped its handle.
        let _ = tx.send(result);
        true
    }

    fn forget(&self, id: i64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }
}

/// Handle to one outstanding request.
pub struct PendingRequest {
    id: i64,
    rx: Receiver<Result<Value>>,
    table: Arc<RequestTable>,
}

impl PendingRequest {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Blocks until the request completes or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<Value> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if self.table.forget(self.id) {
                    log::debug!("Request {} timed out", self.id);
                    return Err(Error::Timeout);
                }
                // Someone removed the entry right at the deadline and is
                // about to send; their outcome wins.
                self.rx.recv().unwrap_or(Err(Error::ConnectionLost))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionLost),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}
