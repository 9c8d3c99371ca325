//! # Provisioning Flows
//!
//! The database and the `_design/Logs` view are created lazily and at most
//! once per transport, however many callers race for it.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use couchlog_transport::domain::{IndexDefinition, ProvisioningPolicy, DESIGN_DOC_ID, VIEW_NAME};
    use couchlog_transport::service::IndexProvisioner;
    use couchlog_transport::{
        DocumentStore, InMemoryDocumentStore, Metadata, ProvisioningState, QueryRequest,
        StoreOperation, TransportConfig, TransportError,
    };
    use futures::future::join_all;
    use serde_json::Value;

    use crate::integration::support::transport_over;

    fn slow_empty_store() -> Arc<InMemoryDocumentStore> {
        let store = Arc::new(InMemoryDocumentStore::without_database());
        store.set_latency(Some(Duration::from_millis(5)));
        store
    }

    // =============================================================================
    // ONCE-ONLY
    // =============================================================================

    /// Concurrent `ensure` calls create the database and the view once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_provisions_once() {
        let store = slow_empty_store();
        let provisioner = Arc::new(IndexProvisioner::new(ProvisioningPolicy::Optimistic));

        let callers = (0..16).map(|_| {
            let provisioner = provisioner.clone();
            let store = store.clone();
            tokio::spawn(async move { provisioner.ensure(store.as_ref()).await })
        });
        for result in join_all(callers).await {
            result.unwrap().unwrap();
        }
        // Optimistic losers return at once; let the winner finish.
        while provisioner.state() == ProvisioningState::InProgress {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let calls = store.calls();
        assert_eq!(provisioner.state(), ProvisioningState::Done);
        assert_eq!(calls.creates, 1);
        assert_eq!(calls.design_inserts, 1);
        assert!(store.database_exists());
    }

    /// Concurrent first queries through the facade provision once and all succeed
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_queries_share_one_attempt() {
        let store = slow_empty_store();
        let config = TransportConfig::new().with_provisioning(ProvisioningPolicy::AwaitCompletion);
        let transport = Arc::new(transport_over(store.clone(), config));

        let queries = (0..8).map(|_| {
            let transport = transport.clone();
            tokio::spawn(async move { transport.query(QueryRequest::new()).await })
        });
        for result in join_all(queries).await {
            assert!(result.unwrap().unwrap().is_empty());
        }

        let calls = store.calls();
        assert_eq!(calls.creates, 1);
        assert_eq!(calls.design_inserts, 1);
        assert_eq!(transport.provisioning_state(), ProvisioningState::Done);
    }

    /// The stored design document carries the `byTimestamp` view
    #[tokio::test]
    async fn test_design_document_shape() {
        let store = Arc::new(InMemoryDocumentStore::without_database());
        let transport = transport_over(store.clone(), TransportConfig::new());

        transport.ensure_index().await.unwrap();

        let design = store.document(DESIGN_DOC_ID).expect("design document stored");
        let map = design["views"][VIEW_NAME]["map"].as_str().unwrap();
        assert!(map.contains("doc.params.timestamp"));
        assert_eq!(
            design["views"],
            IndexDefinition::logs().to_document().unwrap()["views"]
        );
    }

    /// An existing database and view are left alone
    #[tokio::test]
    async fn test_existing_index_is_not_rewritten() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.seed(IndexDefinition::logs().to_document().unwrap());
        let transport = transport_over(store.clone(), TransportConfig::new());

        transport.ensure_index().await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.creates, 0);
        assert_eq!(calls.design_inserts, 0);
        assert_eq!(calls.gets, 1);
    }

    // =============================================================================
    // FAILURE
    // =============================================================================

    /// A failed attempt sticks: later queries report it and nothing retries
    #[tokio::test]
    async fn test_failed_provisioning_is_not_retried() {
        let store = Arc::new(InMemoryDocumentStore::without_database());
        store.fail(StoreOperation::Create);
        let config = TransportConfig::new().with_provisioning(ProvisioningPolicy::AwaitCompletion);
        let transport = transport_over(store.clone(), config);

        let first = transport.query(QueryRequest::new()).await.unwrap_err();
        assert!(matches!(first, TransportError::Provisioning { .. }));
        assert_eq!(transport.provisioning_state(), ProvisioningState::Failed);

        store.heal(StoreOperation::Create);
        let second = transport.query(QueryRequest::new()).await.unwrap_err();
        assert!(matches!(second, TransportError::Provisioning { .. }));
        assert_eq!(store.calls().creates, 1);
    }

    /// Writes do not wait for provisioning; the first one lands once the database exists
    #[tokio::test]
    async fn test_write_after_provisioning_lands() {
        let store = Arc::new(InMemoryDocumentStore::without_database());
        let transport = transport_over(store.clone(), TransportConfig::new());

        transport.ensure_index().await.unwrap();
        transport.log("info", "after", Metadata::Null).await.unwrap();

        let stored: Vec<Value> = store.documents();
        assert_eq!(stored.len(), 1);
        assert!(store.get(DESIGN_DOC_ID).await.unwrap().is_some());
    }
}
