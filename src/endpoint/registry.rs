//! Endpoint Registry
//!
//! Owns the master and the ordered replica list for the process lifetime.

use std::sync::Arc;

use futures::future::join_all;

use super::{Endpoint, MariaDbEndpoint};
use crate::config::Config;
use crate::error::{Error, Result};

/// Connection handles for one writable endpoint and N read endpoints
pub struct EndpointRegistry {
    master: Arc<dyn Endpoint>,
    replicas: Vec<Arc<dyn Endpoint>>,
}

impl EndpointRegistry {
    /// Build a registry from already-constructed endpoints
    pub fn new(master: Arc<dyn Endpoint>, replicas: Vec<Arc<dyn Endpoint>>) -> Result<Self> {
        if replicas.is_empty() {
            return Err(Error::Config("at least one replica endpoint is required".into()));
        }
        Ok(Self { master, replicas })
    }

    /// Build MariaDB endpoints from configuration without connecting
    pub fn from_config(config: &Config) -> Result<Self> {
        let master: Arc<dyn Endpoint> = Arc::new(MariaDbEndpoint::new(&config.master));
        let replicas = config
            .replicas
            .iter()
            .map(|r| Arc::new(MariaDbEndpoint::new(r)) as Arc<dyn Endpoint>)
            .collect();

        Self::new(master, replicas)
    }

    /// The writable endpoint
    pub fn acquire_write(&self) -> Arc<dyn Endpoint> {
        Arc::clone(&self.master)
    }

    /// The read endpoint at `index` in round-robin order
    pub fn acquire_read(&self, index: usize) -> Result<Arc<dyn Endpoint>> {
        self.replicas
            .get(index)
            .cloned()
            .ok_or_else(|| Error::EndpointNotFound(format!("replica index {}", index)))
    }

    /// All read endpoints in configured order
    pub fn replicas(&self) -> &[Arc<dyn Endpoint>] {
        &self.replicas
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Close every endpoint's connections
    pub async fn close_all(&self) {
        join_all(
            std::iter::once(&self.master)
                .chain(self.replicas.iter())
                .map(|endpoint| endpoint.close()),
        )
        .await;
    }
}
