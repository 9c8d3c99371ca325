//! Explicit transport registry
//!
//! Front-ends look transports up by type name. Nothing is registered
//! implicitly: call [`register_transport`] on the registry you own.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::domain::TransportConfig;
use crate::error::TransportError;
use crate::ports::LogTransport;
use crate::transport::CouchDbTransport;

/// Type name the CouchDB transport registers under.
pub const COUCHDB_TRANSPORT: &str = "couchdb";

/// Builds a transport instance from its configuration.
pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &TransportConfig) -> Result<Arc<dyn LogTransport>, TransportError>;
}

impl<F> TransportFactory for F
where
    F: Fn(&TransportConfig) -> Result<Arc<dyn LogTransport>, TransportError> + Send + Sync,
{
    fn build(&self, config: &TransportConfig) -> Result<Arc<dyn LogTransport>, TransportError> {
        self(config)
    }
}

/// Transport factories by type name.
#[derive(Default, Clone)]
pub struct TransportRegistry {
    factories: BTreeMap<String, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, returning the one it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl TransportFactory + 'static,
    ) -> Option<Arc<dyn TransportFactory>> {
        let name = name.into();
        debug!(transport = %name, "Transport registered");
        self.factories.insert(name, Arc::new(factory))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TransportFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build a transport of type `name`.
    pub fn build(
        &self,
        name: &str,
        config: &TransportConfig,
    ) -> Result<Arc<dyn LogTransport>, TransportError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TransportError::UnknownTransport(name.to_string()))?;
        factory.build(config)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn build_couchdb(config: &TransportConfig) -> Result<Arc<dyn LogTransport>, TransportError> {
    Ok(Arc::new(CouchDbTransport::new(config)?))
}

/// Register the CouchDB transport under `couchdb`.
pub fn register_transport(registry: &mut TransportRegistry) {
    registry.register(COUCHDB_TRANSPORT, build_couchdb);
}
