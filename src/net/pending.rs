//! Client-side registry of in-flight requests, keyed by sequence number and
//! ordered by dispatch time for timeout sweeps.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::error::ClientError;

/// Default request-level timeout: no response within this long is a [`ClientError::RequestTimeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single in-flight request awaiting a response.
///
/// The sequence number doubles as the dispatch-order key: because the Sender
/// is the sole assigner of both sequence numbers and timestamps, and always
/// inserts immediately after assigning both, ordering by sequence number is
/// equivalent to ordering by dispatch time within one connection.
pub struct PendingRequest {
    pub seq: u64,
    pub dispatched_at: Instant,
    completion: oneshot::Sender<Result<Vec<u8>, ClientError>>,
}

impl PendingRequest {
    pub fn new(seq: u64, completion: oneshot::Sender<Result<Vec<u8>, ClientError>>) -> Self {
        Self {
            seq,
            dispatched_at: Instant::now(),
            completion,
        }
    }

    /// Deliver the single outcome for this request. Silently dropped if the
    /// receiving half has already gone away (e.g. the caller stopped waiting).
    pub fn complete(self, outcome: Result<Vec<u8>, ClientError>) {
        let _ = self.completion.send(outcome);
    }
}

/// Registry of requests dispatched but not yet answered.
///
/// A single [`BTreeMap`] keyed by sequence number is both the lookup index and
/// the dispatch-time-ordered view: because sequence numbers are assigned in
/// insertion order (see [`PendingRequest`]), iterating the map in key order is
/// the same as iterating by dispatch time. This keeps the "two views always
/// consistent" invariant trivial — there is only one view.
pub struct PendingTable {
    inner: Mutex<BTreeMap<u64, PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a newly dispatched request.
    pub fn insert(&self, request: PendingRequest) {
        let mut table = self.inner.lock().unwrap();
        table.insert(request.seq, request);
    }

    /// Remove and return the request for `seq`, if still pending.
    pub fn remove(&self, seq: u64) -> Option<PendingRequest> {
        let mut table = self.inner.lock().unwrap();
        table.remove(&seq)
    }

    /// Pop every request whose dispatch time is at least `timeout` old, oldest first.
    ///
    /// Stops at the first request still within the timeout window — correctness
    /// relies on the map being ordered by dispatch time (see struct docs).
    /// The mutex is released before the caller completes the expired requests,
    /// so this never holds the lock across a completion callback.
    pub fn sweep(&self, timeout: Duration) -> Vec<PendingRequest> {
        let cutoff = Instant::now() - timeout;
        let mut expired = Vec::new();
        let mut table = self.inner.lock().unwrap();
        while let Some((&seq, request)) = table.iter().next() {
            if request.dispatched_at > cutoff {
                break;
            }
            expired.push(table.remove(&seq).unwrap());
        }
        drop(table);
        expired
    }

    /// Remove and return every pending request, in dispatch order.
    pub fn drain(&self) -> Vec<PendingRequest> {
        let mut table = self.inner.lock().unwrap();
        std::mem::take(&mut *table).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
