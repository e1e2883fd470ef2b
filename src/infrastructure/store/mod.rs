//! Document Store Abstraction
//!
//! Narrow interface over a key/value document database with per-query
//! real-time subscriptions, conditional queries, atomic batched writes and
//! transactions. Services receive a store implementation by constructor
//! injection, so tests substitute [`memory::InMemoryStore`] for a managed
//! backend.

pub mod document;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

pub use document::{decode, encode, timestamp_value, Document};
pub use memory::InMemoryStore;

/// Live query results: a fresh snapshot of `(document id, document)` pairs
/// delivered whenever the underlying collection changes.
pub type DocumentStream = BoxStream<'static, Vec<(String, Document)>>;

/// Store-level error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Batch of {len} operations exceeds the atomic limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),
}

/// Field-level partial write primitives.
///
/// Paths are dot-separated for nested map keys (e.g. `unreadCounts.u42`).
/// Partial writes are preferred over whole-document overwrites so that
/// concurrent mutators of disjoint fields never lose each other's updates.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Set the field to a value, creating intermediate maps as needed
    Set { path: String, value: Value },
    /// Remove the field (map key) if present
    Delete { path: String },
    /// Atomically add `by` to an integer field, treating absent as 0
    Increment { path: String, by: i64 },
    /// Add values to an array field, skipping ones already present
    ArrayUnion { path: String, values: Vec<Value> },
    /// Remove all occurrences of the values from an array field
    ArrayRemove { path: String, values: Vec<Value> },
    /// Set the field to the store-assigned current time
    ServerTimestamp { path: String },
}

impl FieldOp {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set { path: path.into(), value: value.into() }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    pub fn increment(path: impl Into<String>, by: i64) -> Self {
        Self::Increment { path: path.into(), by }
    }

    pub fn array_union(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::ArrayUnion { path: path.into(), values }
    }

    pub fn array_remove(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::ArrayRemove { path: path.into(), values }
    }

    pub fn server_timestamp(path: impl Into<String>) -> Self {
        Self::ServerTimestamp { path: path.into() }
    }
}

/// Query filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { field: field.into(), value: value.into() }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne { field: field.into(), value: value.into() }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayContains { field: field.into(), value: value.into() }
    }
}

/// Sort directive for a query
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// A conditional query against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            conditions: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy { field: field.into(), descending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One operation inside an atomic batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set { collection: String, id: String, doc: Document },
    Update { collection: String, id: String, ops: Vec<FieldOp> },
    Delete { collection: String, id: String },
}

impl WriteOp {
    /// Target document id of this operation.
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Target collection of this operation.
    pub fn collection(&self) -> &str {
        match self {
            Self::Set { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

/// Split a bulk write into chunks bounded by the store's atomic batch
/// limit. Each chunk is applied independently by the caller; partial
/// success across chunks is possible and must be surfaced.
pub fn chunk_writes(ops: Vec<WriteOp>, max_batch_size: usize) -> Vec<Vec<WriteOp>> {
    let max = max_batch_size.max(1);
    let mut chunks = Vec::with_capacity(ops.len().div_ceil(max));
    let mut current = Vec::with_capacity(max.min(ops.len()));

    for op in ops {
        current.push(op);
        if current.len() == max {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Document store interface consumed by the services.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a single document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document.
    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Apply field-level partial writes to an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, ops: Vec<FieldOp>)
        -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Run a conditional query, returning `(id, document)` pairs.
    async fn query(&self, query: Query) -> Result<Vec<(String, Document)>, StoreError>;

    /// Open a live subscription to a query. The stream yields the current
    /// result set immediately, then a fresh snapshot on every change to the
    /// target collection, until the subscriber drops it.
    async fn stream(&self, query: Query) -> DocumentStream;

    /// Apply a set of writes atomically.
    ///
    /// Fails with [`StoreError::BatchTooLarge`] when the batch exceeds
    /// [`max_batch_size`](DocumentStore::max_batch_size); callers split
    /// larger bulk operations with [`chunk_writes`].
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Begin a read-then-write transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Maximum number of operations accepted by one atomic batch.
    fn max_batch_size(&self) -> usize;
}

/// A buffered transaction: reads observe prior buffered writes, and the
/// whole write set is applied atomically on commit.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a document through the transaction (read-your-writes).
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Buffer a document overwrite.
    fn set(&mut self, collection: &str, id: &str, doc: Document);

    /// Buffer field-level partial writes.
    fn update(&mut self, collection: &str, id: &str, ops: Vec<FieldOp>);

    /// Buffer a document deletion.
    fn delete(&mut self, collection: &str, id: &str);

    /// Atomically apply the buffered writes.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
