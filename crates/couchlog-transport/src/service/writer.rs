//! Write path: stamp, canonicalize, persist, report

use std::sync::Arc;
use tracing::{debug, error};

use crate::domain::{format_timestamp, Clock, LogEvent, PersistedLogDocument};
use crate::error::TransportError;
use crate::events::{TransportEvent, TransportEventBus};
use crate::metrics::TransportMetrics;
use crate::ports::DocumentStore;

/// Persists log events and reports each outcome exactly once.
pub struct LogWriter {
    clock: Arc<dyn Clock>,
    events: Arc<TransportEventBus>,
    metrics: Arc<TransportMetrics>,
}

impl LogWriter {
    pub fn new(
        clock: Arc<dyn Clock>,
        events: Arc<TransportEventBus>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            clock,
            events,
            metrics,
        }
    }

    /// The document `event` would be persisted as, stamped now.
    pub fn prepare(&self, event: &LogEvent) -> PersistedLogDocument {
        PersistedLogDocument::from_event(event, format_timestamp(&self.clock.now()))
    }

    /// Persist `event`.
    ///
    /// A failure is published as `TransportEvent::Error` and returned. On
    /// success `TransportEvent::Logged` is published from a spawned task, so
    /// subscribers see it only after the caller has resumed.
    pub async fn write(
        &self,
        store: &dyn DocumentStore,
        event: LogEvent,
    ) -> Result<bool, TransportError> {
        let document = self.prepare(&event);
        match self.persist(store, &document).await {
            Ok(id) => {
                debug!(id = %id, level = event.effective_level(), "Log persisted");
                self.metrics.record_write();
                self.announce(TransportEvent::Logged {
                    level: event.effective_level().to_string(),
                    message: event.message,
                });
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, db = store.database(), "Failed to persist log");
                self.metrics.record_write_failure();
                self.events.publish(TransportEvent::Error(Arc::new(e.clone())));
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        store: &dyn DocumentStore,
        document: &PersistedLogDocument,
    ) -> Result<String, TransportError> {
        let body = document.to_value()?;
        let receipt = store.insert(body).await?;
        Ok(receipt.id)
    }

    fn announce(&self, event: TransportEvent) {
        let events = self.events.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    events.publish(event);
                });
            }
            Err(_) => {
                events.publish(event);
            }
        }
    }
}
