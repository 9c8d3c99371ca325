//! Adapters Layer
//!
//! Implementations of the driven ports:
//! - `CouchDbClient` - CouchDB over HTTP
//! - `InMemoryDocumentStore` - single in-process database for tests and demos

pub mod couchdb;
pub mod memory;

pub use couchdb::{ChangeLineDecoder, CouchDbClient, CouchDbStoreFactory};
pub use memory::{InMemoryDocumentStore, MemoryStoreFactory, StoreCallCounts, StoreOperation};
