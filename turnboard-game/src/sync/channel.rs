//! Remote document channel: subscribe to whole snapshots, push partial patches.

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::state::{GameState, StatePatch};

/// Receiver half of a document subscription.
pub type SnapshotStream = broadcast::Receiver<GameState>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("push to session {session_id} failed: {reason}")]
    PushFailed { session_id: String, reason: String },
    #[error("channel closed")]
    Closed,
}

#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Subscribe to every future snapshot of the session document.
    async fn subscribe(&self, session_id: &str) -> Result<SnapshotStream, ChannelError>;

    /// Merge `patch` into the document and return the stamp it was given.
    ///
    /// Stamps are strictly increasing per document: `max(now_ms, previous + 1)`.
    async fn push(
        &self,
        session_id: &str,
        patch: StatePatch,
        now_ms: i64,
    ) -> Result<i64, ChannelError>;
}

#[derive(Debug)]
struct Document {
    state: GameState,
    sender: broadcast::Sender<GameState>,
}

impl Document {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            state: GameState::default(),
            sender,
        }
    }
}

/// Process-local document store with broadcast fan-out.
#[derive(Debug)]
pub struct InMemoryChannel {
    documents: Mutex<HashMap<String, Document>>,
    capacity: usize,
    failures_remaining: AtomicUsize,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl InMemoryChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            failures_remaining: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` pushes without touching the document.
    pub fn fail_next_pushes(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Current document contents.
    #[must_use]
    pub fn document(&self, session_id: &str) -> Option<GameState> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents.get(session_id).map(|doc| doc.state.clone())
    }

    /// Deliver an arbitrary snapshot to subscribers without merging it.
    ///
    /// Models late or reordered deliveries from the real store.
    pub fn deliver_raw(&self, session_id: &str, snapshot: GameState) {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;
        let doc = documents
            .entry(session_id.to_string())
            .or_insert_with(|| Document::new(capacity));
        let _ = doc.sender.send(snapshot);
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteChannel for InMemoryChannel {
    async fn subscribe(&self, session_id: &str) -> Result<SnapshotStream, ChannelError> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;
        let doc = documents
            .entry(session_id.to_string())
            .or_insert_with(|| Document::new(capacity));
        Ok(doc.sender.subscribe())
    }

    async fn push(
        &self,
        session_id: &str,
        patch: StatePatch,
        now_ms: i64,
    ) -> Result<i64, ChannelError> {
        if self.take_failure() {
            return Err(ChannelError::PushFailed {
                session_id: session_id.to_string(),
                reason: "injected failure".into(),
            });
        }
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;
        let doc = documents
            .entry(session_id.to_string())
            .or_insert_with(|| Document::new(capacity));
        doc.state.apply_patch(&patch);
        doc.state.last_updated = now_ms.max(doc.state.last_updated + 1);
        let stamp = doc.state.last_updated;
        // No subscribers is not an error for a document store.
        let receivers = doc.sender.send(doc.state.clone()).unwrap_or(0);
        debug!("pushed to {session_id} at {stamp} ({receivers} subscribers)");
        Ok(stamp)
    }
}
