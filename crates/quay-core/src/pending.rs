use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use quay_codec::Value;
use tokio::sync::oneshot;

use crate::CallError;

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Vec<Value>, CallError>;

/// In-flight call table for one connection.
///
/// Indices are handed out monotonically and never reused for the life of
/// the connection; correlation is by index alone, so responses may arrive
/// in any order. A response for an index that was never registered (or
/// already reaped by a deadline) is stale and dropped by the caller.
pub struct PendingTable {
    next_index: AtomicI64,
    waiting: Mutex<HashMap<i64, oneshot::Sender<CallOutcome>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_index: AtomicI64::new(0),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Next call index, starting at 1.
    pub fn next_index(&self) -> i64 {
        self.next_index.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registers a waiter for `index` and returns the receiving half.
    pub fn register(&self, index: i64) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(index, tx);
        rx
    }

    /// Delivers an outcome. Returns false when no waiter exists, which is
    /// how stale or duplicate responses are detected.
    pub fn complete(&self, index: i64, outcome: CallOutcome) -> bool {
        match self.waiting.lock().remove(&index) {
            // The receiver may have given up (deadline raced the reply);
            // that still counts as delivered.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drops the waiter for `index` without an outcome, so a late reply
    /// reads as stale.
    pub fn reap(&self, index: i64) {
        self.waiting.lock().remove(&index);
    }

    /// Fails every in-flight call; used when the connection dies.
    pub fn fail_all(&self, make_err: impl Fn() -> CallError) {
        let drained: Vec<_> = {
            let mut waiting = self.waiting.lock();
            waiting.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(make_err()));
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
