//! In-Memory Document Store
//!
//! Reference [`DocumentStore`] implementation used by tests and local
//! development. Collections live behind a `parking_lot` RwLock; a broadcast
//! channel carries per-collection change notifications that drive the live
//! query streams. Transactions are serialized through an owned async mutex
//! guard, so contending find-or-create upserts commit one at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use super::document::{timestamp_value, Document};
use super::{
    Condition, DocumentStore, DocumentStream, FieldOp, Query, StoreError, StoreTransaction,
    WriteOp,
};

/// Default atomic batch limit, matching common managed-store limits.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// In-memory document store with live query streams.
#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<String>,
    txn_gate: Arc<tokio::sync::Mutex<()>>,
    max_batch: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    /// Create a store with a custom atomic batch limit. Tests use small
    /// limits to exercise chunked bulk operations.
    pub fn with_max_batch_size(max_batch: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: Arc::new(RwLock::new(Collections::new())),
            changes,
            txn_gate: Arc::new(tokio::sync::Mutex::new(())),
            max_batch: max_batch.max(1),
        }
    }

    fn run_query(&self, query: &Query) -> Vec<(String, Document)> {
        let data = self.data.read();
        let mut rows: Vec<(String, Document)> = data
            .get(&query.collection)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|(_, doc)| query.conditions.iter().all(|c| matches_condition(doc, c)))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        drop(data);

        if let Some(order) = &query.order_by {
            let null = Value::Null;
            // Stable sort keeps the id order of the BTreeMap as tiebreak.
            rows.sort_by(|(_, a), (_, b)| {
                let av = field_value(a, &order.field).unwrap_or(&null);
                let bv = field_value(b, &order.field).unwrap_or(&null);
                let ord = cmp_values(av, bv);
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }

    fn apply_writes(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut data = self.data.write();

        // All-or-nothing: reject the whole batch if any update target is
        // missing, before mutating anything.
        for op in &ops {
            if let WriteOp::Update { collection, id, .. } = op {
                if !data.get(collection).is_some_and(|c| c.contains_key(id)) {
                    return Err(StoreError::NotFound(format!("{}/{}", collection, id)));
                }
            }
        }

        let mut touched = BTreeSet::new();
        for op in ops {
            touched.insert(op.collection().to_string());
            apply_write(&mut data, op);
        }
        drop(data);

        for collection in touched {
            // Send errors just mean nobody is subscribed.
            let _ = self.changes.send(collection);
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.data.read().get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        self.apply_writes(vec![WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        }])
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: Vec<FieldOp>,
    ) -> Result<(), StoreError> {
        self.apply_writes(vec![WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            ops,
        }])
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.apply_writes(vec![WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])
    }

    async fn query(&self, query: Query) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.run_query(&query))
    }

    async fn stream(&self, query: Query) -> DocumentStream {
        // Subscribe before the initial snapshot so no change is missed
        // between snapshot and first poll.
        let rx = self.changes.subscribe();
        let initial = self.run_query(&query);

        let state = StreamState {
            store: self.clone(),
            query,
            rx,
            pending: Some(initial),
            last: None,
        };

        Box::pin(futures::stream::unfold(state, |mut st| async move {
            if let Some(snapshot) = st.pending.take() {
                st.last = Some(snapshot.clone());
                return Some((snapshot, st));
            }
            loop {
                match st.rx.recv().await {
                    Ok(changed) if changed == st.query.collection => {
                        let snapshot = st.store.run_query(&st.query);
                        if st.last.as_ref() != Some(&snapshot) {
                            st.last = Some(snapshot.clone());
                            return Some((snapshot, st));
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed notifications; resnapshot unconditionally.
                        let snapshot = st.store.run_query(&st.query);
                        if st.last.as_ref() != Some(&snapshot) {
                            st.last = Some(snapshot.clone());
                            return Some((snapshot, st));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.len() > self.max_batch {
            return Err(StoreError::BatchTooLarge { len: ops.len(), max: self.max_batch });
        }
        self.apply_writes(ops)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.txn_gate.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            _guard: guard,
            writes: Vec::new(),
        }))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

struct StreamState {
    store: InMemoryStore,
    query: Query,
    rx: broadcast::Receiver<String>,
    pending: Option<Vec<(String, Document)>>,
    last: Option<Vec<(String, Document)>>,
}

/// Transaction over the in-memory store. Holds the transaction gate for its
/// whole lifetime, so transactions commit strictly one at a time.
pub struct MemoryTransaction {
    store: InMemoryStore,
    _guard: tokio::sync::OwnedMutexGuard<()>,
    writes: Vec<WriteOp>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let mut current = self
            .store
            .data
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned();

        // Read-your-writes: overlay buffered operations for this document.
        for op in &self.writes {
            if op.collection() != collection || op.doc_id() != id {
                continue;
            }
            match op {
                WriteOp::Set { doc, .. } => current = Some(doc.clone()),
                WriteOp::Update { ops, .. } => {
                    if let Some(doc) = current.as_mut() {
                        for field_op in ops {
                            apply_field_op(doc, field_op);
                        }
                    }
                }
                WriteOp::Delete { .. } => current = None,
            }
        }
        Ok(current)
    }

    fn set(&mut self, collection: &str, id: &str, doc: Document) {
        self.writes.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        });
    }

    fn update(&mut self, collection: &str, id: &str, ops: Vec<FieldOp>) {
        self.writes.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            ops,
        });
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.writes.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.apply_writes(self.writes)
        // Gate guard drops here, admitting the next transaction.
    }
}

fn apply_write(data: &mut Collections, op: WriteOp) {
    match op {
        WriteOp::Set { collection, id, doc } => {
            data.entry(collection).or_default().insert(id, doc);
        }
        WriteOp::Update { collection, id, ops } => {
            if let Some(doc) = data.get_mut(&collection).and_then(|c| c.get_mut(&id)) {
                for field_op in &ops {
                    apply_field_op(doc, field_op);
                }
            }
        }
        WriteOp::Delete { collection, id } => {
            if let Some(collection) = data.get_mut(&collection) {
                collection.remove(&id);
            }
        }
    }
}

fn apply_field_op(doc: &mut Document, op: &FieldOp) {
    match op {
        FieldOp::Set { path, value } => {
            let (parent, key) = resolve_create(doc, path);
            parent.insert(key, value.clone());
        }
        FieldOp::Delete { path } => {
            if let Some((parent, key)) = resolve(doc, path) {
                parent.remove(&key);
            }
        }
        FieldOp::Increment { path, by } => {
            let (parent, key) = resolve_create(doc, path);
            let current = parent.get(&key).and_then(Value::as_i64).unwrap_or(0);
            parent.insert(key, Value::from(current + by));
        }
        FieldOp::ArrayUnion { path, values } => {
            let (parent, key) = resolve_create(doc, path);
            if !matches!(parent.get(&key), Some(Value::Array(_))) {
                parent.insert(key.clone(), Value::Array(Vec::new()));
            }
            if let Some(Value::Array(array)) = parent.get_mut(&key) {
                for value in values {
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
            }
        }
        FieldOp::ArrayRemove { path, values } => {
            if let Some((parent, key)) = resolve(doc, path) {
                if let Some(Value::Array(array)) = parent.get_mut(&key) {
                    array.retain(|v| !values.contains(v));
                }
            }
        }
        FieldOp::ServerTimestamp { path } => {
            let (parent, key) = resolve_create(doc, path);
            parent.insert(key, timestamp_value(Utc::now()));
        }
    }
}

/// Walk a dotted path to the parent map of its final segment, creating
/// intermediate maps as needed. Non-object intermediates are replaced.
fn resolve_create<'a>(doc: &'a mut Document, path: &str) -> (&'a mut Document, String) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or_default().to_string();

    let mut current = doc;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        if !slot.is_object() {
            *slot = Value::Object(Document::new());
        }
        current = slot.as_object_mut().expect("slot was just made an object");
    }
    (current, last)
}

/// Walk a dotted path without creating intermediates.
fn resolve<'a>(doc: &'a mut Document, path: &str) -> Option<(&'a mut Document, String)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop()?.to_string();

    let mut current = doc;
    for segment in segments {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    Some((current, last))
}

fn field_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn matches_condition(doc: &Document, condition: &Condition) -> bool {
    match condition {
        Condition::Eq { field, value } => field_value(doc, field) == Some(value),
        Condition::Ne { field, value } => field_value(doc, field) != Some(value),
        Condition::ArrayContains { field, value } => field_value(doc, field)
            .and_then(Value::as_array)
            .is_some_and(|array| array.contains(value)),
    }
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
