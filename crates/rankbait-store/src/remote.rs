//! Contract of the remote multi-writer document store.
//!
//! Every call is fallible and asynchronous. Implementations are injected as
//! `Arc<dyn DocumentStore>` so the engine can run against a hosted backend,
//! the in-process [`MemoryStore`](crate::memory::MemoryStore), or a fake.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::document::{Document, Patch, Query, Snapshot};
use crate::error::Result;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or fully replace the document `collection/id`.
    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Apply a partial update. Fails with `DocumentNotFound` when the
    /// document does not exist.
    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> Result<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Open a live query. The current result set is delivered first, then a
    /// full snapshot after every change to a matching document.
    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription>;
}

/// A live query held open against a store.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// releases it on the store side; no snapshot is delivered afterwards.
pub struct Subscription {
    id: u64,
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        id: u64,
        snapshots: mpsc::UnboundedReceiver<Snapshot>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            snapshots,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next snapshot. `None` once the store side has closed.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    /// Release the subscription now instead of waiting for drop.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        self.snapshots.close();
        if let Some(release) = self.release.take() {
            release();
            tracing::debug!(subscription = self.id, "Subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        self.get_mut().snapshots.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.release.is_none())
            .finish()
    }
}
