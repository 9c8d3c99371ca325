//! # Couchlog Transport
//!
//! A log transport that persists structured log events as CouchDB
//! documents, queries them by time range and tails them live.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `LogEvent` / `PersistedLogDocument` / `LogRecord`: the write and read shapes
//!   - `Metadata`: structured metadata that may hold shared or cyclic nodes
//!   - `QueryRequest` / `QueryOptions` / `NativeRangeQuery`: query vocabulary
//!   - `StreamOffset` / `FeedOptions` / `Change`: change-feed vocabulary
//!   - `TransportConfig` / `ConnectionSettings`: configuration and its resolution
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `LogTransport`: Driving port (what a logging front-end calls)
//!   - `DocumentStore`: Driven port (the database)
//!
//! - **Service Layer** (`service/`): The request paths
//!   - `IndexProvisioner`: once-only database and view provisioning
//!   - `LogWriter`: stamp, decycle, persist, report
//!   - `query`: asc/desc range translation and field projection
//!   - `LogStream`: change feed to cancelable live stream
//!
//! - **Adapters Layer** (`adapters/`): `CouchDbClient` (HTTP) and
//!   `InMemoryDocumentStore`
//!
//! - **Facade** (`transport`): `CouchDbTransport`, composing the above behind
//!   lazy client construction
//!
//! ## Guarantees
//!
//! - `params.timestamp` is the clock reading at write time; equal keys collate by id
//! - Metadata cycles never reach the serializer
//! - Index provisioning is attempted at most once per transport instance
//! - No `Log` event is delivered by a stream after `destroy()`
//!
//! ## Usage Example
//!
//! ```ignore
//! use couchlog_transport::{register_transport, QueryRequest, StreamOptions, TransportConfig,
//!     TransportRegistry};
//! use serde_json::json;
//!
//! let mut registry = TransportRegistry::new();
//! register_transport(&mut registry);
//!
//! let config = TransportConfig::new().with_host("couch.internal").with_db("app-logs");
//! let transport = registry.build("couchdb", &config)?;
//!
//! transport.log_event(LogEvent::new("info", "user signed in").with_metadata(json!({ "user": 7 }))).await?;
//! let recent = transport.query(QueryRequest::new().rows(20)).await?;
//!
//! let mut tail = transport.stream(StreamOptions::from_tip());
//! while let Some(event) = tail.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod service;
pub mod transport;

// Re-exports for convenience
pub use adapters::{
    CouchDbClient, CouchDbStoreFactory, InMemoryDocumentStore, MemoryStoreFactory, StoreOperation,
};
pub use domain::{
    Auth, ConnectionSettings, LogEvent, LogRecord, Metadata, Order, ProvisioningPolicy,
    QueryRequest, SharedMetadata, StreamOffset, StreamOptions, TransportConfig,
};
pub use error::{ProvisioningStep, StoreError, TransportError};
pub use events::{EventSubscription, TransportEvent, TransportEventBus};
pub use metrics::{MetricsSnapshot, TransportMetrics};
pub use ports::{DocumentStore, DocumentStoreFactory, LogTransport};
pub use registry::{register_transport, TransportFactory, TransportRegistry, COUCHDB_TRANSPORT};
pub use service::{LogStream, ProvisioningState, StreamEvent};
pub use transport::CouchDbTransport;
