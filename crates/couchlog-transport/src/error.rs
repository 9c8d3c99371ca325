//! Error types for the CouchDB log transport

use thiserror::Error;

/// Errors raised by a [`DocumentStore`](crate::ports::DocumentStore) adapter
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unreachable at {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Store returned HTTP {status}: {error} ({reason})")]
    Http {
        status: u16,
        error: String,
        reason: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Change feed failed: {0}")]
    Feed(String),
}

impl StoreError {
    /// Whether the error means the store could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Step of index provisioning that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    /// Fetching database info
    CheckDatabase,
    /// Creating the database
    CreateDatabase,
    /// Writing the design document
    SaveIndex,
    /// Another caller's attempt failed (await policy only)
    Observed,
}

impl std::fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            Self::CheckDatabase => "check database",
            Self::CreateDatabase => "create database",
            Self::SaveIndex => "save index",
            Self::Observed => "concurrent attempt",
        };
        f.write_str(step)
    }
}

/// Errors surfaced by the transport to its callers
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(StoreError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Index provisioning failed at {step}: {message}")]
    Provisioning {
        step: ProvisioningStep,
        message: String,
    },

    #[error("Stream feed error: {0}")]
    Feed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),
}

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { .. } => Self::Connection(err),
            StoreError::Feed(message) => Self::Feed(message),
            other => Self::Store(other),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl TransportError {
    pub(crate) fn provisioning(step: ProvisioningStep, source: impl std::fmt::Display) -> Self {
        Self::Provisioning {
            step,
            message: source.to_string(),
        }
    }
}
