use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lspwire_frame::RequestId;
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Final outcome delivered to a waiting caller.
pub(crate) type Completion = std::result::Result<Value, SessionError>;

/// When a request stops waiting, and the timeout it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deadline {
    pub(crate) at: Instant,
    pub(crate) timeout: Duration,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    pub(crate) fn has_passed(&self, now: Instant) -> bool {
        now >= self.at
    }
}

/// One outstanding request awaiting its response.
pub(crate) struct PendingEntry {
    method: String,
    deadline: Option<Deadline>,
    tx: SyncSender<Completion>,
}

impl PendingEntry {
    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Deliver the outcome. Consuming the entry makes a second resolution
    /// impossible.
    pub(crate) fn complete(self, outcome: Completion) {
        // The waiter may have given up already; nothing to do then.
        let _ = self.tx.try_send(outcome);
    }
}

struct Inner {
    next_id: i64,
    entries: HashMap<RequestId, PendingEntry>,
    // Min-heap of (deadline, numeric id). Entries removed by other paths
    // stay here until their deadline comes up and are skipped then.
    deadlines: BinaryHeap<Reverse<(Instant, i64)>>,
    closed: bool,
}

impl Inner {
    fn take_expired(&mut self, now: Instant) -> Vec<(RequestId, PendingEntry)> {
        let mut expired = Vec::new();
        while let Some(Reverse((at, _))) = self.deadlines.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, number))) = self.deadlines.pop() else {
                break;
            };
            let id = RequestId::Number(number);
            if let Some(entry) = self.entries.remove(&id) {
                expired.push((id, entry));
            }
        }
        expired
    }
}

/// Id counter and outstanding requests, guarded by one lock.
pub(crate) struct PendingTable {
    inner: Mutex<Inner>,
    // Signalled when a deadline is added or the table closes.
    wake: Condvar,
    max: usize,
}

impl PendingTable {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                entries: HashMap::new(),
                deadlines: BinaryHeap::new(),
                closed: false,
            }),
            wake: Condvar::new(),
            max,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Allocate the next id and insert its entry atomically.
    pub(crate) fn register(
        &self,
        method: &str,
        deadline: Option<Deadline>,
    ) -> Result<(RequestId, Receiver<Completion>)> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(SessionError::SessionClosed);
        }
        let pending_len = inner.entries.len();
        if pending_len >= self.max {
            tracing::warn!(
                pending_len,
                max_pending = self.max,
                "too many pending requests; refusing new request"
            );
            return Err(SessionError::TooManyPending { max: self.max });
        }

        let number = inner.next_id;
        inner.next_id += 1;
        let id = RequestId::Number(number);

        let (tx, rx) = sync_channel(1);
        inner.entries.insert(
            id.clone(),
            PendingEntry {
                method: method.to_string(),
                deadline,
                tx,
            },
        );
        if let Some(deadline) = deadline {
            inner.deadlines.push(Reverse((deadline.at, number)));
            self.wake.notify_all();
        }
        Ok((id, rx))
    }

    /// Remove an entry. At most one caller ever gets it back.
    pub(crate) fn remove(&self, id: &RequestId) -> Option<PendingEntry> {
        self.lock().entries.remove(id)
    }

    /// Refuse further registrations and hand back every outstanding entry.
    pub(crate) fn close(&self) -> Vec<(RequestId, PendingEntry)> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.deadlines.clear();
        self.wake.notify_all();
        inner.entries.drain().collect()
    }

    /// Remove every entry whose deadline is at or before `now`.
    #[cfg(test)]
    pub(crate) fn expire_due(&self, now: Instant) -> Vec<(RequestId, PendingEntry)> {
        self.lock().take_expired(now)
    }

    /// Block until at least one entry is overdue and hand the overdue
    /// entries back, already removed. Returns `None` once the table closes.
    pub(crate) fn wait_expired(&self) -> Option<Vec<(RequestId, PendingEntry)>> {
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return None;
            }
            let now = Instant::now();
            let expired = inner.take_expired(now);
            if !expired.is_empty() {
                return Some(expired);
            }
            let next = inner.deadlines.peek().map(|Reverse((at, _))| *at);
            inner = match next {
                Some(at) => {
                    self.wake
                        .wait_timeout(inner, at.saturating_duration_since(now))
                        .unwrap_or_else(|poison| poison.into_inner())
                        .0
                }
                None => self
                    .wake
                    .wait(inner)
                    .unwrap_or_else(|poison| poison.into_inner()),
            };
        }
    }

    pub(crate) fn ids(&self) -> Vec<RequestId> {
        self.lock().entries.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
