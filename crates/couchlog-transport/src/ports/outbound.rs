//! Outbound Ports (Driven Ports)
//!
//! The document store the transport persists to, queries and tails.
//!
//! Production: `CouchDbClient` (adapters/couchdb.rs)
//! Testing: `InMemoryDocumentStore` (adapters/memory.rs)

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::domain::{Change, ConnectionSettings, DatabaseInfo, FeedOptions, NativeRangeQuery};
use crate::error::StoreError;

/// Identity of a freshly written document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReceipt {
    pub id: String,
    #[serde(default)]
    pub rev: String,
}

/// Continuous change feed. Dropping it closes the underlying connection.
pub type ChangeFeed = BoxStream<'static, Result<Change, StoreError>>;

/// Document database bound to a single database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database this client talks to.
    fn database(&self) -> &str;

    /// Insert a new document; the store assigns the id.
    async fn insert(&self, document: Value) -> Result<DocumentReceipt, StoreError>;

    /// Fetch a document by id. A missing document is `Ok(None)`.
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Database info. A missing database is `Ok(None)`.
    async fn info(&self) -> Result<Option<DatabaseInfo>, StoreError>;

    /// Create the database. Succeeds if it already exists.
    async fn create(&self) -> Result<(), StoreError>;

    /// Run a view query and return the row values in view order.
    async fn view(
        &self,
        design: &str,
        view: &str,
        query: &NativeRangeQuery,
    ) -> Result<Vec<Value>, StoreError>;

    /// Open a continuous change feed.
    async fn follow(&self, options: FeedOptions) -> Result<ChangeFeed, StoreError>;
}

/// Builds a store client from resolved connection settings.
pub trait DocumentStoreFactory: Send + Sync {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn DocumentStore>, StoreError>;
}
