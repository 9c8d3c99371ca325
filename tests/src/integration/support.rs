//! Shared fixtures for the integration flows.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use couchlog_transport::domain::{
    Clock, ConnectionSettings, DatabaseInfo, FeedOptions, NativeRangeQuery,
};
use couchlog_transport::ports::{ChangeFeed, DocumentReceipt};
use couchlog_transport::{
    CouchDbTransport, DocumentStore, DocumentStoreFactory, InMemoryDocumentStore,
    MemoryStoreFactory, StoreError, TransportConfig,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// A facade over a fresh in-memory store.
pub fn memory_transport(config: TransportConfig) -> (CouchDbTransport, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    (transport_over(store.clone(), config), store)
}

/// A facade over `store`.
pub fn transport_over(store: Arc<InMemoryDocumentStore>, config: TransportConfig) -> CouchDbTransport {
    let factory = Arc::new(MemoryStoreFactory::new(store));
    CouchDbTransport::with_factory(&config, factory).expect("valid test config")
}

/// Fixed instant used by the query flows.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap()
}

/// A clock that never moves.
pub struct FrozenClock(pub DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A facade whose clock is frozen at `instant`.
pub fn frozen_transport(
    store: Arc<InMemoryDocumentStore>,
    instant: DateTime<Utc>,
) -> CouchDbTransport {
    CouchDbTransport::from_parts(
        ConnectionSettings::default(),
        Arc::new(MemoryStoreFactory::new(store)),
        Arc::new(FrozenClock(instant)),
    )
}

/// Wraps a store and records every view query it receives.
pub struct RecordingStore {
    inner: Arc<InMemoryDocumentStore>,
    views: Mutex<Vec<NativeRangeQuery>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            views: Mutex::new(Vec::new()),
        }
    }

    pub fn views(&self) -> Vec<NativeRangeQuery> {
        self.views.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    fn database(&self) -> &str {
        self.inner.database()
    }

    async fn insert(&self, document: Value) -> Result<DocumentReceipt, StoreError> {
        self.inner.insert(document).await
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(id).await
    }

    async fn info(&self) -> Result<Option<DatabaseInfo>, StoreError> {
        self.inner.info().await
    }

    async fn create(&self) -> Result<(), StoreError> {
        self.inner.create().await
    }

    async fn view(
        &self,
        design: &str,
        view: &str,
        query: &NativeRangeQuery,
    ) -> Result<Vec<Value>, StoreError> {
        self.views.lock().push(query.clone());
        self.inner.view(design, view, query).await
    }

    async fn follow(&self, options: FeedOptions) -> Result<ChangeFeed, StoreError> {
        self.inner.follow(options).await
    }
}

/// Hands out one shared [`RecordingStore`].
pub struct RecordingFactory(pub Arc<RecordingStore>);

impl DocumentStoreFactory for RecordingFactory {
    fn connect(&self, _: &ConnectionSettings) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Ok(self.0.clone())
    }
}
