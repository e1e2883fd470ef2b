//! Common Test Utilities
//!
//! Shared fixtures: engines over a shared in-memory store, and a
//! failure-injecting store wrapper for partial-batch scenarios.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use classchat::config::Settings;
use classchat::domain::{Participant, ParticipantRole};
use classchat::infrastructure::store::{
    Document, DocumentStore, DocumentStream, FieldOp, InMemoryStore, Query, StoreError,
    StoreTransaction, WriteOp,
};
use classchat::infrastructure::StaticIdentity;
use classchat::ChatEngine;

/// Build an engine for one user over a shared store.
pub fn engine_for<S: DocumentStore>(
    store: &Arc<S>,
    user_id: &str,
    display_name: &str,
    role: ParticipantRole,
) -> ChatEngine<S> {
    engine_with_settings(store, user_id, display_name, role, Settings::default())
}

pub fn engine_with_settings<S: DocumentStore>(
    store: &Arc<S>,
    user_id: &str,
    display_name: &str,
    role: ParticipantRole,
    settings: Settings,
) -> ChatEngine<S> {
    let identity = Arc::new(StaticIdentity::new(user_id, display_name, role));
    ChatEngine::new(Arc::clone(store), identity, settings)
}

pub fn shared_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

pub fn participant(id: &str, name: &str, role: ParticipantRole) -> Participant {
    Participant { id: id.into(), display_name: name.into(), role }
}

/// Store wrapper that fails selected `batch_write` invocations (0-based
/// call index), delegating everything else to an inner in-memory store.
pub struct FlakyStore {
    inner: InMemoryStore,
    batch_calls: AtomicUsize,
    failing_batches: Mutex<HashSet<usize>>,
}

impl FlakyStore {
    pub fn failing_batches(max_batch_size: usize, failing: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: InMemoryStore::with_max_batch_size(max_batch_size),
            batch_calls: AtomicUsize::new(0),
            failing_batches: Mutex::new(failing.into_iter().collect()),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        self.inner.set(collection, id, doc).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: Vec<FieldOp>,
    ) -> Result<(), StoreError> {
        self.inner.update(collection, id, ops).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, query: Query) -> Result<Vec<(String, Document)>, StoreError> {
        self.inner.query(query).await
    }

    async fn stream(&self, query: Query) -> DocumentStream {
        self.inner.stream(query).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_batches.lock().remove(&call) {
            return Err(StoreError::Unavailable("injected batch failure".into()));
        }
        self.inner.batch_write(ops).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.begin().await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}
