//! Log events, persisted log documents and query results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::metadata::Metadata;

/// Tag stored in the `resource` field of every log document.
pub const LOG_RESOURCE: &str = "log";

/// Level used when the caller passes none.
pub const DEFAULT_LEVEL: &str = "info";

/// Key holding metadata that is not an object.
pub const META_KEY: &str = "meta";

/// Keys the transport always writes into `params`.
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const MESSAGE_KEY: &str = "message";
pub const LEVEL_KEY: &str = "level";

/// A log call from the front-end.
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub level: String,
    pub message: String,
    pub metadata: Option<Metadata>,
}

impl LogEvent {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Metadata>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// The level to persist: `info` when none was given.
    pub fn effective_level(&self) -> &str {
        if self.level.is_empty() {
            DEFAULT_LEVEL
        } else {
            &self.level
        }
    }
}

/// Document body written to the store for one log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedLogDocument {
    pub resource: String,
    pub params: Map<String, Value>,
}

impl PersistedLogDocument {
    /// Build the document for `event`, stamped with `timestamp`.
    ///
    /// Metadata is decycled first. Object members become `params` keys; any
    /// other non-null value is kept under `meta`. The transport-owned keys
    /// are written last and win over metadata keys of the same name.
    pub fn from_event(event: &LogEvent, timestamp: String) -> Self {
        let mut params = match event.metadata.as_ref().map(Metadata::decycle) {
            Some(Value::Object(members)) => members,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                let mut params = Map::new();
                params.insert(META_KEY.to_string(), other);
                params
            }
        };

        params.insert(TIMESTAMP_KEY.to_string(), Value::String(timestamp));
        params.insert(
            MESSAGE_KEY.to_string(),
            Value::String(event.message.clone()),
        );
        params.insert(
            LEVEL_KEY.to_string(),
            Value::String(event.effective_level().to_string()),
        );

        Self {
            resource: LOG_RESOURCE.to_string(),
            params,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// The `params` payload of a persisted log, as returned by queries and streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Extract the `params` object of a stored document.
    pub fn from_document(document: &Value) -> Option<Self> {
        document
            .get("params")
            .and_then(Value::as_object)
            .map(|params| Self(params.clone()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn message(&self) -> Option<&str> {
        self.get(MESSAGE_KEY).and_then(Value::as_str)
    }

    pub fn level(&self) -> Option<&str> {
        self.get(LEVEL_KEY).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(TIMESTAMP_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new record holding only the keys present in `fields`.
    pub fn project(&self, fields: &BTreeSet<String>) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| fields.contains(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
