//! `CouchDbTransport`: the facade a logging front-end talks to
//!
//! The store client is built on first use from the resolved connection
//! settings; building it also starts index provisioning in the background.
//! Writes, queries and streams then share that client.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::CouchDbStoreFactory;
use crate::domain::{
    Clock, ConnectionSettings, LogEvent, LogRecord, Metadata, QueryRequest, StreamOptions,
    SystemClock, TransportConfig,
};
use crate::error::TransportError;
use crate::events::{EventSubscription, TransportEventBus};
use crate::metrics::TransportMetrics;
use crate::ports::{DocumentStore, DocumentStoreFactory, LogTransport};
use crate::service::provisioner::spawn_ensure;
use crate::service::{query, IndexProvisioner, LogStream, LogWriter, ProvisioningState};

/// Log transport backed by one CouchDB database.
pub struct CouchDbTransport {
    settings: ConnectionSettings,
    factory: Arc<dyn DocumentStoreFactory>,
    client: Mutex<Option<Arc<dyn DocumentStore>>>,
    provisioner: Arc<IndexProvisioner>,
    writer: LogWriter,
    clock: Arc<dyn Clock>,
    events: Arc<TransportEventBus>,
    metrics: Arc<TransportMetrics>,
}

impl CouchDbTransport {
    /// Transport talking to CouchDB over HTTP.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::with_factory(config, Arc::new(CouchDbStoreFactory))
    }

    /// Transport whose store client comes from `factory`.
    pub fn with_factory(
        config: &TransportConfig,
        factory: Arc<dyn DocumentStoreFactory>,
    ) -> Result<Self, TransportError> {
        Ok(Self::from_parts(config.resolve()?, factory, Arc::new(SystemClock)))
    }

    pub fn from_parts(
        settings: ConnectionSettings,
        factory: Arc<dyn DocumentStoreFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = Arc::new(TransportEventBus::new());
        let metrics = Arc::new(TransportMetrics::new());
        let writer = LogWriter::new(clock.clone(), events.clone(), metrics.clone());
        debug!(url = %settings.url, db = %settings.db, "Transport configured");

        Self {
            provisioner: Arc::new(IndexProvisioner::new(settings.provisioning)),
            settings,
            factory,
            client: Mutex::new(None),
            writer,
            clock,
            events,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    pub fn provisioning_state(&self) -> ProvisioningState {
        self.provisioner.state()
    }

    /// Whether the store client has been built yet.
    pub fn is_connected(&self) -> bool {
        self.client.lock().is_some()
    }

    /// The store client, built on first call.
    fn client(&self) -> Result<Arc<dyn DocumentStore>, TransportError> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = self.factory.connect(&self.settings)?;
        info!(url = %self.settings.url, db = %self.settings.db, "Store client created");
        *slot = Some(client.clone());
        drop(slot);

        spawn_ensure(self.provisioner.clone(), client.clone());
        Ok(client)
    }

    /// Persist a log call. `metadata` may be `Metadata::Null` for none.
    pub async fn log(
        &self,
        level: impl Into<String>,
        message: impl Into<String>,
        metadata: impl Into<Metadata>,
    ) -> Result<bool, TransportError> {
        self.log_event(LogEvent::new(level, message).with_metadata(metadata))
            .await
    }

    pub async fn log_event(&self, event: LogEvent) -> Result<bool, TransportError> {
        if self.settings.silent {
            self.metrics.record_silent_drop();
            return Ok(true);
        }
        let client = self.client()?;
        self.writer.write(client.as_ref(), event).await
    }

    /// Fetch logs in a time window, newest first unless `order` says otherwise.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, TransportError> {
        let options = request.normalize(self.clock.now())?;
        let client = self.client()?;
        if self.provisioner.needs_ensure() {
            self.provisioner.ensure(client.as_ref()).await?;
        }
        self.metrics.record_query();
        query::execute(client.as_ref(), &options).await
    }

    /// Tail logs. Errors opening the feed arrive as the stream's only event.
    pub fn stream(&self, options: StreamOptions) -> LogStream {
        match self.client() {
            Ok(client) => LogStream::open(client, options, self.metrics.clone()),
            Err(e) => LogStream::failed(e),
        }
    }

    /// Provision the database and view now instead of in the background.
    pub async fn ensure_index(&self) -> Result<(), TransportError> {
        let client = self.client()?;
        self.provisioner.ensure(client.as_ref()).await
    }
}

#[async_trait]
impl LogTransport for CouchDbTransport {
    fn name(&self) -> &str {
        CouchDbTransport::name(self)
    }

    async fn log_event(&self, event: LogEvent) -> Result<bool, TransportError> {
        CouchDbTransport::log_event(self, event).await
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, TransportError> {
        CouchDbTransport::query(self, request).await
    }

    fn stream(&self, options: StreamOptions) -> LogStream {
        CouchDbTransport::stream(self, options)
    }

    fn subscribe(&self) -> EventSubscription {
        CouchDbTransport::subscribe(self)
    }
}
