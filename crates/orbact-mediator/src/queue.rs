//! Deferred requests.
//!
//! One FIFO holds every request that could not be served immediately,
//! whichever server it targets: replay re-evaluates each entry's own target
//! on every pass, so partitioning per server would buy nothing. Entries are
//! replayed in arrival order and destroyed when served or failed.

use std::collections::VecDeque;
use std::sync::Mutex;

use orbact_common::{Identity, ObjRef, Payload, RequestId};

/// One unit of deferred work. A closed set of two shapes.
#[derive(Debug, Clone)]
pub enum QueueEntry {
    /// An invocation waiting for its target server.
    Invocation {
        id: RequestId,
        target: ObjRef,
        payload: Payload,
        identity: Option<Identity>,
        reply_expected: bool,
    },
    /// A locate broadcast waiting for every candidate server.
    Broadcast {
        id: RequestId,
        interface_id: String,
        tag: Vec<u8>,
    },
}

impl QueueEntry {
    pub fn request_id(&self) -> RequestId {
        match self {
            QueueEntry::Invocation { id, .. } | QueueEntry::Broadcast { id, .. } => *id,
        }
    }
}

/// Unbounded FIFO of deferred requests. Backpressure is the embedding
/// broker's concern.
#[derive(Default)]
pub struct RequestQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: QueueEntry) {
        self.entries.lock().expect("queue lock poisoned").push_back(entry);
    }

    /// Remove and return everything queued, preserving arrival order.
    pub fn drain(&self) -> Vec<QueueEntry> {
        self.entries
            .lock()
            .expect("queue lock poisoned")
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
