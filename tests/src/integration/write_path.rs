//! # Write Path Flows
//!
//! Log calls through the facade down to persisted documents:
//!
//! 1. **Decycling**: self-referencing metadata is stored as an acyclic document
//! 2. **Silence**: a silent transport acknowledges without any store call
//! 3. **Stamping**: writes carry the clock's reading and stay visible to default queries
//! 4. **Failure reporting**: a rejected write reaches the caller and the event bus once

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::DateTime;
    use couchlog_transport::{
        InMemoryDocumentStore, LogEvent, Metadata, QueryRequest, StoreOperation, TransportConfig,
        TransportError, TransportEvent,
    };
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use crate::integration::support::{at, frozen_transport, memory_transport};

    fn params(document: &Value) -> &serde_json::Map<String, Value> {
        document["params"].as_object().expect("log document has params")
    }

    // =============================================================================
    // PERSISTED SHAPE
    // =============================================================================

    /// Self-referencing metadata becomes a `$ref` and survives a JSON round trip
    #[tokio::test]
    async fn test_cyclic_metadata_is_persisted_acyclic() {
        let (transport, store) = memory_transport(TransportConfig::new());
        let root = Metadata::object().into_shared();
        root.insert("request", Metadata::from("GET /"));
        root.insert("metadata", Metadata::Shared(root.clone()));

        assert!(transport
            .log("info", "cyclic", Metadata::Shared(root.clone()))
            .await
            .unwrap());
        root.clear();

        let documents = store.documents();
        assert_eq!(documents.len(), 1);
        let stored = &documents[0];
        assert_eq!(stored["resource"], "log");

        let params = params(stored);
        assert_eq!(params["message"], "cyclic");
        assert_eq!(params["level"], "info");
        assert_eq!(params["request"], "GET /");
        assert_eq!(params["metadata"], json!({ "$ref": "$" }));

        let text = serde_json::to_string(stored).unwrap();
        let decoded: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(&decoded, stored);
    }

    /// Hello-world round trip: write one log, read it back
    #[tokio::test]
    async fn test_write_then_query_single_record() {
        let (transport, _) = memory_transport(TransportConfig::new());

        transport.log("info", "hello world", json!({})).await.unwrap();
        let records = transport.query(QueryRequest::new().rows(1)).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message(), Some("hello world"));
        assert_eq!(records[0].level(), Some("info"));
        assert!(records[0].timestamp().is_some());
    }

    /// A missing level falls back to `info`
    #[tokio::test]
    async fn test_empty_level_defaults_to_info() {
        let (transport, store) = memory_transport(TransportConfig::new());
        transport.log_event(LogEvent::new("", "no level")).await.unwrap();

        assert_eq!(params(&store.documents()[0])["level"], "info");
    }

    // =============================================================================
    // SILENT MODE
    // =============================================================================

    /// A silent transport never builds a client or touches the store
    #[tokio::test]
    async fn test_silent_write_skips_the_store() {
        let (transport, store) = memory_transport(TransportConfig::new().with_silent(true));
        let mut events = transport.subscribe();

        for i in 0..3 {
            assert!(transport.log("error", format!("dropped {i}"), json!({ "i": i })).await.unwrap());
        }

        assert_eq!(store.calls().total(), 0);
        assert!(!transport.is_connected());
        assert_eq!(transport.metrics().snapshot().silent_drops, 3);
        assert!(matches!(events.try_recv(), Ok(None)));
    }

    // =============================================================================
    // TIMESTAMPS
    // =============================================================================

    /// A burst under a frozen clock is stamped with that instant and stays queryable
    #[tokio::test]
    async fn test_burst_is_stamped_now_and_visible() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let transport = frozen_transport(store.clone(), at(9, 0));
        transport.ensure_index().await.unwrap();

        for i in 0..200 {
            transport.log("info", format!("m{i}"), Metadata::Null).await.unwrap();
        }

        let stamps: Vec<i64> = store
            .documents()
            .iter()
            .map(|doc| {
                DateTime::parse_from_rfc3339(params(doc)["timestamp"].as_str().unwrap())
                    .unwrap()
                    .timestamp_millis()
            })
            .collect();
        assert_eq!(stamps.len(), 200);
        assert!(stamps.iter().all(|&stamp| stamp == at(9, 0).timestamp_millis()));

        let records = transport.query(QueryRequest::new().rows(1000)).await.unwrap();
        assert_eq!(records.len(), 200);
    }

    // =============================================================================
    // FAILURE REPORTING
    // =============================================================================

    /// A rejected insert is returned and published exactly once, with no `Logged`
    #[tokio::test]
    async fn test_failed_write_publishes_one_error() {
        let (transport, store) = memory_transport(TransportConfig::new());
        transport.ensure_index().await.unwrap();
        store.fail(StoreOperation::Insert);
        let mut events = transport.subscribe();

        let err = transport.log("warn", "lost", Metadata::Null).await.unwrap_err();
        assert!(matches!(err, TransportError::Store(_)));

        let event = timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("timeout waiting for event")
            .expect("bus open");
        match event {
            TransportEvent::Error(published) => assert_eq!(published.to_string(), err.to_string()),
            other => panic!("expected an error event, got {other:?}"),
        }

        // Nothing else follows: no Logged, no second Error.
        assert!(timeout(Duration::from_millis(100), events.recv()).await.is_err());
        assert_eq!(transport.metrics().snapshot().write_failures, 1);
    }

    /// A successful write publishes `Logged` and no error
    #[tokio::test]
    async fn test_successful_write_publishes_logged() {
        let (transport, _) = memory_transport(TransportConfig::new());
        let mut events = transport.subscribe();

        transport.log("debug", "fine", Metadata::Null).await.unwrap();

        let event = timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("timeout waiting for event")
            .expect("bus open");
        match event {
            TransportEvent::Logged { level, message } => {
                assert_eq!(level, "debug");
                assert_eq!(message, "fine");
            }
            other => panic!("expected Logged, got {other:?}"),
        }
    }
}
