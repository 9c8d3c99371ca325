//! Inbound Ports (Driving Ports)
//!
//! The uniform surface a logging front-end drives, whatever the backing store.

use async_trait::async_trait;

use crate::domain::{LogEvent, LogRecord, QueryRequest, StreamOptions};
use crate::error::TransportError;
use crate::events::EventSubscription;
use crate::service::LogStream;

/// A pluggable log transport.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Transport name as configured (`couchdb` by default).
    fn name(&self) -> &str;

    /// Persist one log event. `Ok(true)` means the event was accepted.
    async fn log_event(&self, event: LogEvent) -> Result<bool, TransportError>;

    /// Fetch previously written logs.
    async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, TransportError>;

    /// Tail logs written from now on (or from `options.start`).
    fn stream(&self, options: StreamOptions) -> LogStream;

    /// Side channel carrying `Logged` and `Error` events.
    fn subscribe(&self) -> EventSubscription;
}
