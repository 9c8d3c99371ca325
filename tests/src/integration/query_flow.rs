//! # Query Flows
//!
//! Abstract query options through the facade to the native view query the
//! store receives, and back out as projected records.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use couchlog_transport::adapters::memory::log_document;
    use couchlog_transport::domain::{format_timestamp, IndexDefinition};
    use couchlog_transport::{
        CouchDbTransport, InMemoryDocumentStore, LogRecord, Metadata, Order, QueryRequest,
        TransportConfig,
    };
    use serde_json::json;

    use crate::integration::support::{at, transport_over, RecordingFactory, RecordingStore};

    /// A recording facade over a store holding one log per quarter hour from 08:00 to 11:45.
    fn seeded() -> (CouchDbTransport, Arc<RecordingStore>) {
        let inner = Arc::new(InMemoryDocumentStore::new());
        inner.seed(IndexDefinition::logs().to_document().unwrap());
        for hour in 8..12 {
            for minute in [0, 15, 30, 45] {
                let stamp = format_timestamp(&at(hour, minute));
                inner.seed(log_document(&stamp, &format!("{hour:02}:{minute:02}")));
            }
        }
        let recording = Arc::new(RecordingStore::new(inner));
        let factory = Arc::new(RecordingFactory(recording.clone()));
        let transport = CouchDbTransport::with_factory(&TransportConfig::new(), factory).unwrap();
        (transport, recording)
    }

    fn messages(records: &[LogRecord]) -> Vec<&str> {
        records.iter().filter_map(LogRecord::message).collect()
    }

    // =============================================================================
    // RANGE TRANSLATION
    // =============================================================================

    /// Descending queries swap the bounds into `startkey = until`, `endkey = from`
    #[tokio::test]
    async fn test_desc_query_inverts_keys() {
        let (transport, recording) = seeded();

        let records = transport
            .query(
                QueryRequest::new()
                    .order(Order::Desc)
                    .from(at(9, 0))
                    .until(at(10, 0))
                    .rows(100),
            )
            .await
            .unwrap();

        let issued = recording.views().pop().expect("one view query");
        assert!(issued.descending);
        assert_eq!(issued.endkey.as_deref(), Some("2024-03-10T09:00:00.000Z"));
        assert_eq!(issued.startkey.as_deref(), Some("2024-03-10T10:00:00.000Z"));
        assert_eq!(messages(&records), ["10:00", "09:45", "09:30", "09:15", "09:00"]);
    }

    /// Ascending queries keep the bounds in place
    #[tokio::test]
    async fn test_asc_query_keeps_keys() {
        let (transport, recording) = seeded();

        let records = transport
            .query(
                QueryRequest::new()
                    .order(Order::Asc)
                    .from(at(9, 0))
                    .until(at(10, 0))
                    .rows(100),
            )
            .await
            .unwrap();

        let issued = recording.views().pop().expect("one view query");
        assert!(!issued.descending);
        assert_eq!(issued.startkey.as_deref(), Some("2024-03-10T09:00:00.000Z"));
        assert_eq!(issued.endkey.as_deref(), Some("2024-03-10T10:00:00.000Z"));
        assert_eq!(messages(&records), ["09:00", "09:15", "09:30", "09:45", "10:00"]);
    }

    /// `start` and `rows` page through the window
    #[tokio::test]
    async fn test_paging() {
        let (transport, recording) = seeded();
        let page = |start| {
            QueryRequest::new()
                .order(Order::Asc)
                .from(at(8, 0))
                .until(at(12, 0))
                .start(start)
                .rows(3)
        };

        let first = transport.query(page(0)).await.unwrap();
        let second = transport.query(page(3)).await.unwrap();

        assert_eq!(messages(&first), ["08:00", "08:15", "08:30"]);
        assert_eq!(messages(&second), ["08:45", "09:00", "09:15"]);

        let issued = recording.views();
        assert_eq!(issued[0].skip, None);
        assert_eq!(issued[1].skip, Some(3));
        assert!(issued.iter().all(|query| query.limit == Some(3)));
    }

    /// An inverted window matches nothing
    #[tokio::test]
    async fn test_inverted_window_is_empty() {
        let (transport, recording) = seeded();

        let records = transport
            .query(QueryRequest::new().order(Order::Asc).from(at(11, 0)).until(at(9, 0)))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(recording.views().len(), 1);
    }

    /// An unbounded request sends no key on either side
    #[tokio::test]
    async fn test_unbounded_query_has_no_keys() {
        let (transport, recording) = seeded();

        let records = transport
            .query(QueryRequest::new().unbounded().order(Order::Asc).rows(100))
            .await
            .unwrap();

        assert_eq!(records.len(), 16);
        let issued = recording.views();
        assert_eq!(issued[0].startkey, None);
        assert_eq!(issued[0].endkey, None);
    }

    // =============================================================================
    // VISIBILITY
    // =============================================================================

    /// Logs written back to back are all returned under default options
    #[tokio::test]
    async fn test_tight_write_loop_is_fully_visible() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let transport = transport_over(store, TransportConfig::new());
        transport.ensure_index().await.unwrap();

        for i in 0..500 {
            transport.log("info", format!("m{i}"), Metadata::Null).await.unwrap();
        }

        let records = transport.query(QueryRequest::new().rows(1000)).await.unwrap();
        assert_eq!(records.len(), 500);
        assert_eq!(records[0].message(), Some("m499"));
        assert_eq!(records[499].message(), Some("m0"));
    }

    // =============================================================================
    // PROJECTION
    // =============================================================================

    /// `fields: ["timestamp"]` leaves exactly that key
    #[tokio::test]
    async fn test_fields_projection() {
        let (transport, _) = seeded();

        let records = transport
            .query(
                QueryRequest::new()
                    .from(at(8, 0))
                    .until(at(8, 30))
                    .fields(["timestamp"]),
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.keys().collect::<Vec<_>>(), ["timestamp"]);
        }
        assert_eq!(records[0].get("timestamp"), Some(&json!("2024-03-10T08:30:00.000Z")));
    }

    /// Requests decode from loosely typed JSON the way front-ends send them
    #[tokio::test]
    async fn test_request_from_json_options() {
        let (transport, recording) = seeded();
        let request: QueryRequest = serde_json::from_value(json!({
            "limit": 2,
            "order": "asc",
            "from": at(10, 0).timestamp_millis(),
            "until": "2024-03-10T11:00:00Z",
            "fields": ["message"],
        }))
        .unwrap();

        let records = transport.query(request).await.unwrap();

        assert_eq!(messages(&records), ["10:00", "10:15"]);
        assert_eq!(recording.views()[0].limit, Some(2));
    }
}
