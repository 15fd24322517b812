//! Write Coordinator
//!
//! Applies mutations on the master and clears the read cache afterwards.

use std::sync::Arc;

use super::BlogPage;
use crate::cache::CacheLayer;
use crate::endpoint::EndpointRegistry;
use crate::error::Result;

/// Routes writes to the master and invalidates cached reads
pub struct WriteCoordinator {
    registry: Arc<EndpointRegistry>,
    cache: Arc<CacheLayer<BlogPage>>,
}

impl WriteCoordinator {
    pub fn new(registry: Arc<EndpointRegistry>, cache: Arc<CacheLayer<BlogPage>>) -> Self {
        Self { registry, cache }
    }

    /// Insert a record, returning its id
    pub async fn create(&self, payload: serde_json::Value) -> Result<i64> {
        let master = self.registry.acquire_write();
        let id = master.insert_blog(&payload).await?;

        // Page windows shift on every insert, so per-key invalidation is not enough
        self.cache.invalidate_all();
        tracing::info!("Created blog {} on {}", id, master.name());
        Ok(id)
    }

    /// Delete a record; deleting a missing id succeeds
    pub async fn delete(&self, id: i64) -> Result<u64> {
        let master = self.registry.acquire_write();
        let removed = master.delete_blog(id).await?;

        self.cache.invalidate_all();
        if removed == 0 {
            tracing::debug!("Delete of blog {} matched no rows", id);
        } else {
            tracing::info!("Deleted blog {} on {}", id, master.name());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, MemoryEndpoint, Operation};
    use serde_json::json;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryEndpoint>, Arc<MemoryEndpoint>, Arc<CacheLayer<BlogPage>>, WriteCoordinator) {
        let master = Arc::new(MemoryEndpoint::new("master", "blogdb"));
        let replica = Arc::new(MemoryEndpoint::replica_of(&master, "replica-1"));
        master.ensure_schema().await.unwrap();
        replica.ensure_schema().await.unwrap();

        let registry = Arc::new(
            EndpointRegistry::new(master.clone(), vec![replica.clone() as Arc<dyn Endpoint>]).unwrap(),
        );
        let cache = Arc::new(CacheLayer::new(Duration::from_secs(10)));
        let writer = WriteCoordinator::new(registry, Arc::clone(&cache));
        (master, replica, cache, writer)
    }

    fn page() -> BlogPage {
        BlogPage {
            source: "replica-1".to_string(),
            page: 1,
            limit: 5,
            size: 0,
            blogs: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_invalidates() {
        let (master, _, cache, writer) = setup().await;
        cache.set("blogs:page=1:limit=5", page());
        cache.set("blogs:page=2:limit=5", page());

        let id = writer.create(json!({"title": "A"})).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(master.record_count(), 1);
        assert!(cache.get("blogs:page=1:limit=5").is_none());
        assert!(cache.get("blogs:page=2:limit=5").is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let (_, _, cache, writer) = setup().await;
        cache.set("blogs:page=1:limit=5", page());

        assert_eq!(writer.delete(42).await.unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_existing() {
        let (master, _, _, writer) = setup().await;
        let id = writer.create(json!({"title": "A"})).await.unwrap();

        assert_eq!(writer.delete(id).await.unwrap(), 1);
        assert_eq!(master.record_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let (master, _, cache, writer) = setup().await;
        cache.set("blogs:page=1:limit=5", page());
        master.fail(Operation::Insert);

        assert!(writer.create(json!({"title": "A"})).await.is_err());
        assert!(cache.get("blogs:page=1:limit=5").is_some());
    }

    #[tokio::test]
    async fn test_writes_never_touch_replicas() {
        let (_, replica, _, writer) = setup().await;
        replica.fail(Operation::Insert);
        replica.fail(Operation::Delete);

        writer.create(json!({"title": "A"})).await.unwrap();
        writer.delete(1).await.unwrap();
    }
}
