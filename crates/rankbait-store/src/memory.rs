//! In-process document store.
//!
//! Behaves like the hosted backend from the engine's point of view: every
//! call is async, writes fan out full snapshots to live subscriptions, and
//! faults can be injected (offline mode, failing writes, latency) to
//! exercise the rollback paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::document::{Document, Patch, Query, Snapshot};
use crate::error::{Result, StoreError};
use crate::remote::{DocumentStore, Subscription};

type Collections = HashMap<String, BTreeMap<String, Value>>;

struct Subscriber {
    collection: String,
    query: Query,
    tx: mpsc::UnboundedSender<Snapshot>,
}

struct Inner {
    collections: RwLock<Collections>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscription: AtomicU64,
    offline: AtomicBool,
    failing_writes: AtomicUsize,
    latency_ms: AtomicU64,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                failing_writes: AtomicUsize::new(0),
                latency_ms: AtomicU64::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Reject every call until [`MemoryStore::go_online`].
    pub fn go_offline(&self) {
        self.inner.offline.store(true, Ordering::SeqCst);
        info!("Memory store offline");
    }

    pub fn go_online(&self) {
        self.inner.offline.store(false, Ordering::SeqCst);
        info!("Memory store online");
    }

    /// Make the next `count` writes fail while reads keep working.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn enter(&self) -> Result<()> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    async fn enter_write(&self) -> Result<()> {
        self.enter().await?;
        let failed = self
            .inner
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Push a fresh snapshot to every subscriber of `collection`.
    ///
    /// Called with the collections lock held so snapshots reach each
    /// subscriber in write order.
    fn notify(&self, collections: &Collections, collection: &str) {
        let Ok(mut subs) = self.inner.subscribers.lock() else {
            warn!("Subscriber registry poisoned");
            return;
        };
        let empty = BTreeMap::new();
        let docs = collections.get(collection).unwrap_or(&empty);

        subs.retain(|id, sub| {
            if sub.collection != collection {
                return true;
            }
            let snapshot = Snapshot {
                documents: sub.query.apply(docs),
            };
            if sub.tx.send(snapshot).is_err() {
                debug!(subscription = id, "Dropping closed subscriber");
                return false;
            }
            true
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.enter_write().await?;
        let mut collections = self.inner.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        debug!(collection, id, "Document set");
        self.notify(&collections, collection);
        Ok(())
    }

    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> Result<()> {
        self.enter_write().await?;
        let mut collections = self.inner.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        patch.apply_to(doc);
        debug!(collection, id, fields = patch.updates.len(), "Document updated");
        self.notify(&collections, collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.enter_write().await?;
        let mut collections = self.inner.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            debug!(collection, id, "Document deleted");
            self.notify(&collections, collection);
        }
        Ok(())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.enter().await?;
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.enter().await?;
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| query.apply(docs))
            .unwrap_or_default())
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription> {
        self.enter().await?;
        let collections = self.inner.collections.read().await;

        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let initial = Snapshot {
            documents: collections
                .get(collection)
                .map(|docs| query.apply(docs))
                .unwrap_or_default(),
        };
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(initial);

        self.inner
            .subscribers
            .lock()
            .map_err(|_| StoreError::Unavailable("subscriber registry poisoned".to_string()))?
            .insert(
                id,
                Subscriber {
                    collection: collection.to_string(),
                    query,
                    tx,
                },
            );
        debug!(collection, subscription = id, "Subscription opened");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, rx, move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut subs) = inner.subscribers.lock() {
                    subs.remove(&id);
                }
            }
        }))
    }
}
