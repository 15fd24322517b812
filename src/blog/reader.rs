//! Read Path
//!
//! Cache first, then the next replica in round-robin order.

use std::sync::Arc;

use super::{BlogPage, PageRequest, CACHE_SOURCE};
use crate::cache::CacheLayer;
use crate::endpoint::EndpointRegistry;
use crate::error::Result;
use crate::lb::ReadRouter;

/// Serves paginated reads from the cache or a replica
pub struct BlogReader {
    registry: Arc<EndpointRegistry>,
    router: Arc<ReadRouter>,
    cache: Arc<CacheLayer<BlogPage>>,
}

impl BlogReader {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        router: Arc<ReadRouter>,
        cache: Arc<CacheLayer<BlogPage>>,
    ) -> Self {
        Self {
            registry,
            router,
            cache,
        }
    }

    /// Fetch one page of records, newest first
    pub async fn list(&self, request: PageRequest) -> Result<BlogPage> {
        request.validate()?;
        let key = request.cache_key();

        if let Some(mut page) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {}", key);
            page.source = CACHE_SOURCE.to_string();
            return Ok(page);
        }

        let generation = self.cache.generation();
        let replica = self.registry.acquire_read(self.router.next())?;
        let blogs = replica.fetch_blogs(request.limit, request.offset()).await?;
        tracing::debug!("Read {} from {} ({} records)", key, replica.name(), blogs.len());

        let page = BlogPage {
            source: replica.name().to_string(),
            page: request.page,
            limit: request.limit,
            size: blogs.len(),
            blogs,
        };
        self.cache.set_if_current(key, page.clone(), generation);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::blog::BlogRecord;
    use crate::endpoint::{
        Endpoint, LogPosition, MemoryEndpoint, Operation, ReplicaStatus, ReplicationCredential,
        ReplicationSource,
    };
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        master: Arc<MemoryEndpoint>,
        replicas: Vec<Arc<MemoryEndpoint>>,
        clock: Arc<ManualClock>,
        reader: BlogReader,
    }

    async fn fixture(replica_count: usize) -> Fixture {
        let master = Arc::new(MemoryEndpoint::new("master", "blogdb"));
        master.ensure_schema().await.unwrap();

        let mut replicas = Vec::new();
        for i in 1..=replica_count {
            let replica = Arc::new(MemoryEndpoint::replica_of(&master, format!("replica-{}", i)));
            replica.ensure_schema().await.unwrap();
            replicas.push(replica);
        }

        let registry = Arc::new(
            EndpointRegistry::new(
                master.clone(),
                replicas.iter().map(|r| r.clone() as Arc<dyn Endpoint>).collect(),
            )
            .unwrap(),
        );
        let router = Arc::new(ReadRouter::new(replica_count).unwrap());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(CacheLayer::with_clock(Duration::from_secs(10), clock.clone()));

        Fixture {
            master,
            replicas,
            clock,
            reader: BlogReader::new(registry, router, cache),
        }
    }

    #[tokio::test]
    async fn test_pagination_newest_first() {
        let f = fixture(1).await;
        for i in 1..=10 {
            f.master.insert_blog(&json!({"n": i})).await.unwrap();
        }

        let page = f.reader.list(PageRequest::new(2, 3).unwrap()).await.unwrap();
        let ids: Vec<i64> = page.blogs.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![7, 6, 5]);
        assert_eq!(page.size, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.limit, 3);
    }

    #[tokio::test]
    async fn test_second_read_hits_cache() {
        let f = fixture(2).await;
        f.master.insert_blog(&json!({"title": "A"})).await.unwrap();

        let first = f.reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(first.source, "replica-1");

        let second = f.reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(second.source, CACHE_SOURCE);
        assert_eq!(second.blogs, first.blogs);
    }

    #[tokio::test]
    async fn test_expired_entry_goes_to_next_replica() {
        let f = fixture(2).await;

        let first = f.reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(first.source, "replica-1");

        f.clock.advance(Duration::from_secs(10));
        let second = f.reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(second.source, "replica-2");
    }

    #[tokio::test]
    async fn test_distinct_keys_rotate_replicas() {
        let f = fixture(3).await;
        let mut sources = Vec::new();
        for page in 1..=6 {
            let result = f.reader.list(PageRequest::new(page, 5).unwrap()).await.unwrap();
            sources.push(result.source);
        }
        assert_eq!(
            sources,
            vec!["replica-1", "replica-2", "replica-3", "replica-1", "replica-2", "replica-3"]
        );
    }

    #[tokio::test]
    async fn test_down_replica_fails_on_its_turn() {
        let f = fixture(2).await;
        f.replicas[1].fail(Operation::Fetch);

        assert!(f.reader.list(PageRequest::new(1, 5).unwrap()).await.is_ok());
        assert!(f.reader.list(PageRequest::new(2, 5).unwrap()).await.is_err());
        // Back to the healthy one
        assert!(f.reader.list(PageRequest::new(3, 5).unwrap()).await.is_ok());
    }

    /// Replica whose reads overlap a write that clears the cache
    struct RacingReplica {
        inner: Arc<MemoryEndpoint>,
        cache: Arc<CacheLayer<BlogPage>>,
    }

    #[async_trait::async_trait]
    impl Endpoint for RacingReplica {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn ensure_replication_user(&self, c: &ReplicationCredential) -> Result<()> {
            self.inner.ensure_replication_user(c).await
        }
        async fn ensure_schema(&self) -> Result<()> {
            self.inner.ensure_schema().await
        }
        async fn log_position(&self) -> Result<LogPosition> {
            self.inner.log_position().await
        }
        async fn follow(&self, source: &ReplicationSource) -> Result<()> {
            self.inner.follow(source).await
        }
        async fn replica_status(&self) -> Result<Option<ReplicaStatus>> {
            self.inner.replica_status().await
        }
        async fn insert_blog(&self, data: &serde_json::Value) -> Result<i64> {
            self.inner.insert_blog(data).await
        }
        async fn delete_blog(&self, id: i64) -> Result<u64> {
            self.inner.delete_blog(id).await
        }
        async fn fetch_blogs(&self, limit: u32, offset: u64) -> Result<Vec<BlogRecord>> {
            let rows = self.inner.fetch_blogs(limit, offset).await;
            self.cache.invalidate_all();
            rows
        }
    }

    #[tokio::test]
    async fn test_page_read_during_write_is_not_cached() {
        let master = Arc::new(MemoryEndpoint::new("master", "blogdb"));
        master.ensure_schema().await.unwrap();
        let replica = Arc::new(MemoryEndpoint::replica_of(&master, "replica-1"));
        replica.ensure_schema().await.unwrap();

        let cache = Arc::new(CacheLayer::new(Duration::from_secs(10)));
        let racing: Arc<dyn Endpoint> = Arc::new(RacingReplica {
            inner: replica,
            cache: cache.clone(),
        });
        let registry = Arc::new(EndpointRegistry::new(master.clone(), vec![racing]).unwrap());
        let reader = BlogReader::new(registry, Arc::new(ReadRouter::new(1).unwrap()), cache.clone());

        let page = reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(page.source, "replica-1");
        assert!(cache.is_empty());

        let again = reader.list(PageRequest::default()).await.unwrap();
        assert_eq!(again.source, "replica-1");
    }

    #[tokio::test]
    async fn test_invalid_page_rejected() {
        let f = fixture(1).await;
        let err = f
            .reader
            .list(PageRequest { page: 0, limit: 5 })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidRequest(_)));
    }
}
