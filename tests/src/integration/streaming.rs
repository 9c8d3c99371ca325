//! # Streaming Flows
//!
//! Live tails through the facade: tip start, explicit resume offsets and
//! cancellation.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use couchlog_transport::{
        CouchDbTransport, InMemoryDocumentStore, LogRecord, LogStream, Metadata, StreamEvent,
        StreamOffset, StreamOptions, TransportConfig,
    };
    use futures::StreamExt;
    use tokio::time::timeout;

    use crate::integration::support::memory_transport;

    const QUIET: Duration = Duration::from_millis(100);
    const PATIENCE: Duration = Duration::from_secs(2);

    async fn next_log(stream: &mut LogStream) -> LogRecord {
        match timeout(PATIENCE, stream.recv()).await {
            Ok(Some(StreamEvent::Log(record))) => record,
            other => panic!("expected a log event, got {other:?}"),
        }
    }

    /// Wait until the stream's feed is connected.
    async fn connected(store: &InMemoryDocumentStore, follows: usize) {
        timeout(PATIENCE, async {
            while store.calls().follows < follows {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("feed connected");
    }

    async fn provisioned() -> (CouchDbTransport, Arc<InMemoryDocumentStore>) {
        let (transport, store) = memory_transport(TransportConfig::new());
        transport.ensure_index().await.unwrap();
        (transport, store)
    }

    // =============================================================================
    // START OFFSETS
    // =============================================================================

    /// `start: -1` sees nothing old and exactly one event per new write
    #[tokio::test]
    async fn test_tip_stream_sees_only_new_writes() {
        let (transport, store) = provisioned().await;
        transport.log("info", "before", Metadata::Null).await.unwrap();

        let mut stream = transport.stream(StreamOptions::since(-1i64));
        connected(&store, 1).await;
        assert!(timeout(QUIET, stream.recv()).await.is_err());

        transport.log("warn", "after", Metadata::Null).await.unwrap();
        let record = next_log(&mut stream).await;
        assert_eq!(record.message(), Some("after"));
        assert_eq!(record.level(), Some("warn"));

        assert!(timeout(QUIET, stream.recv()).await.is_err());
        assert_eq!(transport.metrics().snapshot().stream_events, 1);
    }

    /// A stopped tail resumes from its offset without gaps or repeats
    #[tokio::test]
    async fn test_resume_from_offset() {
        let (transport, store) = provisioned().await;

        let mut first = transport.stream(StreamOptions::from_tip());
        connected(&store, 1).await;
        transport.log("info", "one", Metadata::Null).await.unwrap();
        assert_eq!(next_log(&mut first).await.message(), Some("one"));
        let offset = first.offset().expect("offset after a change");
        first.destroy();

        transport.log("info", "two", Metadata::Null).await.unwrap();
        transport.log("info", "three", Metadata::Null).await.unwrap();

        let mut resumed = transport.stream(StreamOptions::since(offset));
        assert_eq!(next_log(&mut resumed).await.message(), Some("two"));
        assert_eq!(next_log(&mut resumed).await.message(), Some("three"));
        assert!(timeout(QUIET, resumed.recv()).await.is_err());
    }

    /// Starting at zero replays history, skipping the design document
    #[tokio::test]
    async fn test_zero_replays_logs_only() {
        let (transport, _) = provisioned().await;
        transport.log("info", "old", Metadata::Null).await.unwrap();

        let mut stream = transport.stream(StreamOptions::since(StreamOffset::ZERO));

        assert_eq!(next_log(&mut stream).await.message(), Some("old"));
        assert!(timeout(QUIET, stream.recv()).await.is_err());
    }

    // =============================================================================
    // CANCELLATION
    // =============================================================================

    /// `destroy` twice is fine and nothing is delivered afterwards
    #[tokio::test]
    async fn test_destroy_stops_delivery() {
        let (transport, store) = provisioned().await;
        let mut stream = transport.stream(StreamOptions::from_tip());
        connected(&store, 1).await;

        transport.log("info", "buffered", Metadata::Null).await.unwrap();
        tokio::time::sleep(QUIET).await;
        stream.destroy();
        stream.destroy();
        transport.log("info", "late", Metadata::Null).await.unwrap();

        assert!(!stream.is_live());
        assert!(stream.recv().await.is_none());
        assert!(stream.next().await.is_none());
    }

    /// Dropping a stream releases its feed subscription
    #[tokio::test]
    async fn test_drop_releases_feed() {
        let (transport, store) = provisioned().await;
        let stream = transport.stream(StreamOptions::from_tip());
        connected(&store, 1).await;
        drop(stream);

        // A second tail still works after the first is gone.
        let mut again = transport.stream(StreamOptions::from_tip());
        connected(&store, 2).await;
        transport.log("info", "fresh", Metadata::Null).await.unwrap();
        assert_eq!(next_log(&mut again).await.message(), Some("fresh"));
        assert_eq!(transport.metrics().snapshot().streams_opened, 2);
    }

    // =============================================================================
    // FAILURE
    // =============================================================================

    /// A broken feed yields one error and then ends
    #[tokio::test]
    async fn test_feed_error_ends_stream() {
        let (transport, store) = provisioned().await;
        let mut stream = transport.stream(StreamOptions::from_tip());
        connected(&store, 1).await;

        store.inject_feed_error("socket hang up");

        let event = timeout(PATIENCE, stream.recv()).await.expect("error event");
        assert!(matches!(event, Some(StreamEvent::Error(_))));
        let end = timeout(PATIENCE, stream.recv()).await.expect("stream end");
        assert!(end.is_none());
    }

    /// An unreachable store surfaces as the stream's only event
    #[tokio::test]
    async fn test_unreachable_store_reports_error() {
        let (transport, store) = memory_transport(TransportConfig::new());
        store.set_unreachable(true);

        let events: Vec<StreamEvent> = timeout(
            PATIENCE,
            transport.stream(StreamOptions::from_tip()).collect::<Vec<_>>(),
        )
        .await
        .expect("stream ends");

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error(_)));
    }
}
