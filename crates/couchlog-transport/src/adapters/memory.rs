//! In-memory document store
//!
//! Behaves like a single CouchDB database closely enough for the transport:
//! store-assigned ids, a monotonically increasing update sequence, the
//! `byTimestamp` view and a live change feed. Call counters, latency and
//! failure injection make it the test double for every service.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::document::TIMESTAMP_KEY;
use crate::domain::{
    Change, ConnectionSettings, DatabaseInfo, FeedOptions, NativeRangeQuery, StreamOffset,
    DEFAULT_LEVEL, LOG_RESOURCE,
};
use crate::error::StoreError;
use crate::ports::{ChangeFeed, DocumentReceipt, DocumentStore, DocumentStoreFactory};

const FEED_CAPACITY: usize = 1024;
const DESIGN_PREFIX: &str = "_design/";

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Insert,
    Get,
    Info,
    Create,
    View,
    Follow,
}

/// How often each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub inserts: usize,
    /// Inserts whose id starts with `_design/`
    pub design_inserts: usize,
    pub gets: usize,
    pub infos: usize,
    pub creates: usize,
    pub views: usize,
    pub follows: usize,
}

impl StoreCallCounts {
    pub fn total(&self) -> usize {
        self.inserts + self.gets + self.infos + self.creates + self.views + self.follows
    }
}

#[derive(Default)]
struct CallCounters {
    inserts: AtomicUsize,
    design_inserts: AtomicUsize,
    gets: AtomicUsize,
    infos: AtomicUsize,
    creates: AtomicUsize,
    views: AtomicUsize,
    follows: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    exists: bool,
    docs: BTreeMap<String, Value>,
    history: Vec<Change>,
    seq: i64,
    next_id: u64,
    failing: HashSet<StoreOperation>,
    unreachable: bool,
    latency: Option<Duration>,
}

type FeedItem = Result<Change, String>;

/// A single in-memory database.
pub struct InMemoryDocumentStore {
    name: String,
    state: Mutex<MemoryState>,
    feed: broadcast::Sender<FeedItem>,
    calls: CallCounters,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// An existing, empty database named `winston`.
    pub fn new() -> Self {
        Self::named(crate::domain::config::DEFAULT_DB)
    }

    pub fn named(name: impl Into<String>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState {
                exists: true,
                ..MemoryState::default()
            }),
            feed,
            calls: CallCounters::default(),
        }
    }

    /// A store whose database has not been created yet.
    pub fn without_database() -> Self {
        let store = Self::new();
        store.state.lock().exists = false;
        store
    }

    pub fn database_exists(&self) -> bool {
        self.state.lock().exists
    }

    /// Make `operation` fail with HTTP 500 until [`heal`](Self::heal).
    pub fn fail(&self, operation: StoreOperation) {
        self.state.lock().failing.insert(operation);
    }

    pub fn heal(&self, operation: StoreOperation) {
        self.state.lock().failing.remove(&operation);
    }

    /// Make every operation fail as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Break every open change feed with `message`.
    pub fn inject_feed_error(&self, message: impl Into<String>) {
        let _ = self.feed.send(Err(message.into()));
    }

    pub fn calls(&self) -> StoreCallCounts {
        StoreCallCounts {
            inserts: self.calls.inserts.load(Ordering::SeqCst),
            design_inserts: self.calls.design_inserts.load(Ordering::SeqCst),
            gets: self.calls.gets.load(Ordering::SeqCst),
            infos: self.calls.infos.load(Ordering::SeqCst),
            creates: self.calls.creates.load(Ordering::SeqCst),
            views: self.calls.views.load(Ordering::SeqCst),
            follows: self.calls.follows.load(Ordering::SeqCst),
        }
    }

    /// Stored documents, design documents excluded, in id order.
    pub fn documents(&self) -> Vec<Value> {
        self.state
            .lock()
            .docs
            .iter()
            .filter(|(id, _)| !id.starts_with(DESIGN_PREFIX))
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.state.lock().docs.get(id).cloned()
    }

    /// Write a document directly, bypassing counters and failure injection.
    pub fn seed(&self, document: Value) -> String {
        let mut state = self.state.lock();
        state.exists = true;
        self.store_document(&mut state, document)
    }

    /// Delete a document, emitting a deletion on the change feed.
    pub fn delete(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(previous) = state.docs.remove(id) else {
            return false;
        };
        state.seq += 1;
        let generation = revision_generation(&previous) + 1;
        let change = Change {
            seq: StreamOffset::Number(state.seq),
            id: id.to_string(),
            deleted: true,
            doc: Some(json!({
                "_id": id,
                "_rev": format!("{generation}-{:032x}", state.seq),
                "_deleted": true,
            })),
        };
        state.history.push(change.clone());
        let _ = self.feed.send(Ok(change));
        true
    }

    async fn enter(&self, operation: StoreOperation) -> Result<(), StoreError> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock();
        if state.unreachable {
            return Err(StoreError::Connection {
                url: format!("memory://{}", self.name),
                message: "connection refused".to_string(),
            });
        }
        if state.failing.contains(&operation) {
            return Err(StoreError::Http {
                status: 500,
                error: "internal_server_error".to_string(),
                reason: format!("injected {operation:?} failure"),
            });
        }
        Ok(())
    }

    fn store_document(&self, state: &mut MemoryState, mut document: Value) -> String {
        let id = match document.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                format!("{:032x}", state.next_id)
            }
        };
        state.seq += 1;
        let rev = format!("1-{:032x}", state.seq);
        if let Some(fields) = document.as_object_mut() {
            fields.insert("_id".to_string(), Value::String(id.clone()));
            fields.insert("_rev".to_string(), Value::String(rev));
        }

        let change = Change {
            seq: StreamOffset::Number(state.seq),
            id: id.clone(),
            deleted: false,
            doc: Some(document.clone()),
        };
        state.docs.insert(id.clone(), document);
        state.history.push(change.clone());
        let _ = self.feed.send(Ok(change));
        id
    }
}

fn revision_generation(document: &Value) -> u64 {
    document
        .get("_rev")
        .and_then(Value::as_str)
        .and_then(|rev| rev.split('-').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

fn missing_database() -> StoreError {
    StoreError::Http {
        status: 404,
        error: "not_found".to_string(),
        reason: "Database does not exist.".to_string(),
    }
}

fn offset_value(offset: &StreamOffset) -> i64 {
    offset.as_number().unwrap_or(0)
}

fn shape(mut change: Change, include_docs: bool) -> Change {
    if !include_docs {
        change.doc = None;
    }
    change
}

/// Index key the `byTimestamp` map function would emit for `doc`.
fn view_key(doc: &Value) -> Option<&str> {
    if doc.get("resource").and_then(Value::as_str) != Some(LOG_RESOURCE) {
        return None;
    }
    doc.get("params")?.get(TIMESTAMP_KEY)?.as_str()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn database(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: Value) -> Result<DocumentReceipt, StoreError> {
        self.calls.inserts.fetch_add(1, Ordering::SeqCst);
        let is_design = document
            .get("_id")
            .and_then(Value::as_str)
            .is_some_and(|id| id.starts_with(DESIGN_PREFIX));
        if is_design {
            self.calls.design_inserts.fetch_add(1, Ordering::SeqCst);
        }
        self.enter(StoreOperation::Insert).await?;

        let mut state = self.state.lock();
        if !state.exists {
            return Err(missing_database());
        }
        if let Some(id) = document.get("_id").and_then(Value::as_str) {
            if state.docs.contains_key(id) {
                return Err(StoreError::Http {
                    status: 409,
                    error: "conflict".to_string(),
                    reason: "Document update conflict.".to_string(),
                });
            }
        }
        let id = self.store_document(&mut state, document);
        let rev = state
            .docs
            .get(&id)
            .and_then(|doc| doc.get("_rev"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(DocumentReceipt { id, rev })
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        self.enter(StoreOperation::Get).await?;
        Ok(self.state.lock().docs.get(id).cloned())
    }

    async fn info(&self) -> Result<Option<DatabaseInfo>, StoreError> {
        self.calls.infos.fetch_add(1, Ordering::SeqCst);
        self.enter(StoreOperation::Info).await?;

        let state = self.state.lock();
        if !state.exists {
            return Ok(None);
        }
        Ok(Some(DatabaseInfo {
            db_name: self.name.clone(),
            doc_count: state.docs.len() as u64,
            update_seq: StreamOffset::Number(state.seq),
        }))
    }

    async fn create(&self) -> Result<(), StoreError> {
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        self.enter(StoreOperation::Create).await?;
        self.state.lock().exists = true;
        Ok(())
    }

    async fn view(
        &self,
        design: &str,
        view: &str,
        query: &NativeRangeQuery,
    ) -> Result<Vec<Value>, StoreError> {
        self.calls.views.fetch_add(1, Ordering::SeqCst);
        self.enter(StoreOperation::View).await?;

        let state = self.state.lock();
        if !state.exists {
            return Err(missing_database());
        }
        let has_view = state
            .docs
            .get(&format!("{DESIGN_PREFIX}{design}"))
            .and_then(|doc| doc.get("views"))
            .and_then(|views| views.get(view))
            .is_some();
        if !has_view {
            return Err(StoreError::Http {
                status: 404,
                error: "not_found".to_string(),
                reason: "missing_named_view".to_string(),
            });
        }

        // Equal keys collate by document id, as in CouchDB.
        let mut rows: Vec<(&str, &String, &Value)> = state
            .docs
            .iter()
            .filter_map(|(id, doc)| view_key(doc).map(|key| (key, id, doc)))
            .filter(|(key, _, _)| query.contains_key(key))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));
        if query.descending {
            rows.reverse();
        }

        Ok(rows
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, _, doc)| doc.clone())
            .collect())
    }

    async fn follow(&self, options: FeedOptions) -> Result<ChangeFeed, StoreError> {
        self.calls.follows.fetch_add(1, Ordering::SeqCst);
        self.enter(StoreOperation::Follow).await?;

        // Snapshot and subscribe under one lock so no change falls in between.
        let state = self.state.lock();
        if !state.exists {
            return Err(missing_database());
        }
        let since = offset_value(&options.since);
        let include_docs = options.include_docs;
        let backlog: Vec<Result<Change, StoreError>> = state
            .history
            .iter()
            .filter(|change| offset_value(&change.seq) > since)
            .map(|change| Ok(shape(change.clone(), include_docs)))
            .collect();
        let live = BroadcastStream::new(self.feed.subscribe());
        drop(state);

        let live = live.filter_map(move |item| async move {
            match item {
                Ok(Ok(change)) if offset_value(&change.seq) > since => {
                    Some(Ok(shape(change, include_docs)))
                }
                Ok(Ok(_)) => None,
                Ok(Err(message)) => Some(Err(StoreError::Feed(message))),
                Err(lagged) => Some(Err(StoreError::Feed(lagged.to_string()))),
            }
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}

/// Hands out one shared [`InMemoryDocumentStore`].
pub struct MemoryStoreFactory {
    store: Arc<InMemoryDocumentStore>,
    connects: AtomicUsize,
}

impl MemoryStoreFactory {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            store,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> Arc<InMemoryDocumentStore> {
        self.store.clone()
    }

    /// How many clients were built.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl DocumentStoreFactory for MemoryStoreFactory {
    fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn DocumentStore>, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}

/// A log document as the write path would produce it, for seeding.
pub fn log_document(timestamp: &str, message: &str) -> Value {
    json!({
        "resource": LOG_RESOURCE,
        "params": { "timestamp": timestamp, "message": message, "level": DEFAULT_LEVEL },
    })
}
