//! Domain Layer - log documents, queries, offsets and configuration
//!
//! RULES:
//! - No I/O operations
//! - No async code

pub mod clock;
pub mod config;
pub mod document;
pub mod feed;
pub mod index;
pub mod metadata;
pub mod query;

pub use clock::{format_timestamp, Clock, SystemClock};
pub use config::{Auth, ConnectionSettings, ProvisioningPolicy, TransportConfig};
pub use document::{LogEvent, LogRecord, PersistedLogDocument, DEFAULT_LEVEL, LOG_RESOURCE};
pub use feed::{Change, DatabaseInfo, FeedOptions, FeedStyle, StreamOffset, StreamOptions};
pub use index::{IndexDefinition, ViewDefinition, DESIGN_DOC_ID, DESIGN_NAME, VIEW_NAME};
pub use metadata::{Metadata, SharedMetadata};
pub use query::{NativeRangeQuery, Order, QueryOptions, QueryRequest};
