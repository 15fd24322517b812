//! ReadSplit - Read/Write Splitting Data Access Layer
//!
//! Splits traffic between one writable MariaDB master and a pool of
//! read-only replicas.
//!
//! # Architecture
//!
//! At startup the replication bootstrapper provisions a replication account
//! on the master, creates the schema everywhere and points every replica at
//! the master's current binary log position. After that:
//!
//! - writes go to the master and clear the read cache
//! - reads are answered from a short-lived cache, or from the next replica
//!   in round-robin order on a miss
//!
//! Replication itself is asynchronous and best-effort; a read that follows a
//! write may not observe it yet.

pub mod config;
pub mod error;
pub mod endpoint;
pub mod replication;
pub mod lb;
pub mod cache;
pub mod blog;
pub mod api;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::blog::{BlogPage, BlogReader, BlogRecord, PageRequest, WriteCoordinator};
    pub use crate::cache::CacheLayer;
    pub use crate::config::Config;
    pub use crate::endpoint::{Endpoint, EndpointRegistry};
    pub use crate::error::{Error, Result};
    pub use crate::lb::ReadRouter;
    pub use crate::replication::{BootstrapReport, ReplicationBootstrapper};
}
