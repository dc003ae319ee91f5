//! Pending-command table shared by connection handlers and the drain step
//!
//! Every entry is removed by exactly one of: the drain step (via
//! `take_all`) or the connection's timeout path (via `remove`). Both go
//! through the same mutex, so at most one of them ever holds the entry
//! and its `CompletionHandle`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;

use crate::types::{CommandId, Response};

/// One-shot delivery of a single `Response` to the waiting connection
///
/// `resolve` consumes the handle, so a second delivery cannot be written.
#[derive(Debug)]
pub struct CompletionHandle {
    sender: oneshot::Sender<Response>,
}

impl CompletionHandle {
    pub fn channel() -> (CompletionHandle, oneshot::Receiver<Response>) {
        let (sender, receiver) = oneshot::channel();
        (CompletionHandle { sender }, receiver)
    }

    /// Deliver the response. Returns false if the waiter has already gone.
    pub fn resolve(self, response: Response) -> bool {
        self.sender.send(response).is_ok()
    }
}

/// Raw payload waiting for the host tick, plus its completion handle
#[derive(Debug)]
pub struct PendingEntry {
    pub payload: String,
    pub handle: CompletionHandle,
    pub queued_at: Instant,
}

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<CommandId, PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CommandId, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a payload under a fresh id
    pub fn insert(&self, payload: String) -> (CommandId, oneshot::Receiver<Response>) {
        let (handle, receiver) = CompletionHandle::channel();
        let entry = PendingEntry {
            payload,
            handle,
            queued_at: Instant::now(),
        };

        let mut entries = self.lock();
        let mut id = CommandId::new();
        while entries.contains_key(&id) {
            id = CommandId::new();
        }
        entries.insert(id, entry);
        (id, receiver)
    }

    /// Remove a single entry; `None` if the drain step already took it
    pub fn remove(&self, id: &CommandId) -> Option<PendingEntry> {
        self.lock().remove(id)
    }

    /// Atomically snapshot and clear the table
    pub fn take_all(&self) -> Vec<(CommandId, PendingEntry)> {
        let mut entries = self.lock();
        std::mem::take(&mut *entries).into_iter().collect()
    }

    pub fn contains(&self, id: &CommandId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry without resolving it; waiters observe a closed channel
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}
