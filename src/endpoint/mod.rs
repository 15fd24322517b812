//! Database Endpoint Module
//!
//! A database endpoint is one MariaDB server, either the writable master or a
//! read replica. Everything the core needs from a server is expressed through
//! the [`Endpoint`] trait so routing, caching and bootstrap logic can run
//! against real servers or the in-memory double alike.

mod mariadb;
mod memory;
mod registry;
pub mod sql;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::blog::BlogRecord;
use crate::error::Result;

pub use mariadb::MariaDbEndpoint;
pub use memory::{MemoryEndpoint, Operation};
pub use registry::EndpointRegistry;

/// Shared account replicas use to authenticate to the master's log stream
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ReplicationCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationCredential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Coordinates into the master's binary log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPosition {
    pub file: String,
    pub position: u64,
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// Everything a replica needs to start streaming from the master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSource {
    pub host: String,
    pub port: u16,
    pub credential: ReplicationCredential,
    pub position: LogPosition,
}

/// Replication thread status as reported by a replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub master_host: String,
    pub io_running: bool,
    pub sql_running: bool,
    pub seconds_behind: Option<u64>,
    pub last_error: Option<String>,
}

/// Operations the core performs against a database server
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Identity of this endpoint, reported as the `source` of reads
    fn name(&self) -> &str;

    /// Check the server answers at all
    async fn ping(&self) -> Result<()>;

    /// Create the replication account if absent and grant it log-stream access
    async fn ensure_replication_user(&self, credential: &ReplicationCredential) -> Result<()>;

    /// Create the database and the blog table if absent
    async fn ensure_schema(&self) -> Result<()>;

    /// Current binary log coordinates
    async fn log_position(&self) -> Result<LogPosition>;

    /// Point this server at a master and (re)start its replication stream
    async fn follow(&self, source: &ReplicationSource) -> Result<()>;

    /// Replication status, `None` when the server is not a replica
    async fn replica_status(&self) -> Result<Option<ReplicaStatus>>;

    /// Insert a record, returning its id
    async fn insert_blog(&self, data: &serde_json::Value) -> Result<i64>;

    /// Delete a record by id, returning the number of rows removed
    async fn delete_blog(&self, id: i64) -> Result<u64>;

    /// Fetch records newest first
    async fn fetch_blogs(&self, limit: u32, offset: u64) -> Result<Vec<BlogRecord>>;

    /// Release held connections
    async fn close(&self) {}
}
