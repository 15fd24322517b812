//! In-memory Endpoint
//!
//! A process-local stand-in for a MariaDB server. It models the state the
//! bootstrap sequence creates (accounts, databases, the blog table, the
//! replication source) and stores records in memory. Replicas built with
//! [`MemoryEndpoint::replica_of`] share the master's record storage, which
//! behaves like replication with zero lag.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::{Endpoint, LogPosition, ReplicaStatus, ReplicationCredential, ReplicationSource};
use crate::blog::BlogRecord;
use crate::error::{Error, Result};

const BINLOG_FILE: &str = "mysql-bin.000001";
const BINLOG_START: u64 = 328;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReplicationUser,
    Schema,
    LogPosition,
    Follow,
    ReplicaStatus,
    Insert,
    Delete,
    Fetch,
}

#[derive(Default)]
struct Records {
    next_id: i64,
    rows: BTreeMap<i64, BlogRecord>,
    writes: u64,
}

#[derive(Default)]
struct ServerState {
    /// username -> (password, has replication grant)
    users: BTreeMap<String, (String, bool)>,
    databases: BTreeSet<String>,
    table_created: bool,
    source: Option<ReplicationSource>,
}

/// In-memory endpoint
pub struct MemoryEndpoint {
    name: String,
    database: String,
    records: Arc<RwLock<Records>>,
    state: RwLock<ServerState>,
    failing: Mutex<HashSet<Operation>>,
    /// Remaining pings that will fail before the server answers
    down_for: AtomicU32,
    pings: AtomicU32,
}

impl MemoryEndpoint {
    /// Create a standalone server with its own storage
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self::with_records(name.into(), database.into(), Arc::new(RwLock::new(Records::default())))
    }

    /// Create a server that observes `master`'s records
    pub fn replica_of(master: &MemoryEndpoint, name: impl Into<String>) -> Self {
        Self::with_records(name.into(), master.database.clone(), Arc::clone(&master.records))
    }

    fn with_records(name: String, database: String, records: Arc<RwLock<Records>>) -> Self {
        Self {
            name,
            database,
            records,
            state: RwLock::new(ServerState::default()),
            failing: Mutex::new(HashSet::new()),
            down_for: AtomicU32::new(0),
            pings: AtomicU32::new(0),
        }
    }

    /// Make an operation fail until [`recover`](Self::recover) is called
    pub fn fail(&self, op: Operation) {
        self.failing.lock().insert(op);
    }

    /// Undo [`fail`](Self::fail)
    pub fn recover(&self, op: Operation) {
        self.failing.lock().remove(&op);
    }

    /// Refuse the next `attempts` pings
    pub fn unreachable_for(&self, attempts: u32) {
        self.down_for.store(attempts, Ordering::SeqCst);
    }

    /// Number of pings received
    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Whether `username` exists with the replication grant
    pub fn has_replication_user(&self, username: &str) -> bool {
        self.state
            .read()
            .users
            .get(username)
            .map(|(_, granted)| *granted)
            .unwrap_or(false)
    }

    /// Number of accounts on this server
    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    /// Whether the database and blog table exist
    pub fn has_schema(&self) -> bool {
        let state = self.state.read();
        state.table_created && state.databases.contains(&self.database)
    }

    /// Replication source this server follows, if any
    pub fn source(&self) -> Option<ReplicationSource> {
        self.state.read().source.clone()
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.records.read().rows.len()
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.failing.lock().contains(&op) {
            return Err(Error::QueryExecution(format!(
                "[{}] injected failure for {:?}",
                self.name, op
            )));
        }
        Ok(())
    }

    fn require_table(&self) -> Result<()> {
        if !self.has_schema() {
            return Err(Error::QueryExecution(format!(
                "[{}] Table '{}.blogs' doesn't exist",
                self.name, self.database
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .down_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if refused {
            return Err(Error::ConnectionFailed {
                address: self.name.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn ensure_replication_user(&self, credential: &ReplicationCredential) -> Result<()> {
        self.check(Operation::ReplicationUser)?;
        let mut state = self.state.write();
        // CREATE USER IF NOT EXISTS keeps an existing account's password
        state
            .users
            .entry(credential.username.clone())
            .or_insert_with(|| (credential.password.clone(), false))
            .1 = true;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.check(Operation::Schema)?;
        let mut state = self.state.write();
        state.databases.insert(self.database.clone());
        state.table_created = true;
        Ok(())
    }

    async fn log_position(&self) -> Result<LogPosition> {
        self.check(Operation::LogPosition)?;
        let writes = self.records.read().writes;
        Ok(LogPosition {
            file: BINLOG_FILE.to_string(),
            position: BINLOG_START + writes * 100,
        })
    }

    async fn follow(&self, source: &ReplicationSource) -> Result<()> {
        self.check(Operation::Follow)?;
        self.state.write().source = Some(source.clone());
        Ok(())
    }

    async fn replica_status(&self) -> Result<Option<ReplicaStatus>> {
        self.check(Operation::ReplicaStatus)?;
        Ok(self.state.read().source.as_ref().map(|source| ReplicaStatus {
            master_host: source.host.clone(),
            io_running: true,
            sql_running: true,
            seconds_behind: Some(0),
            last_error: None,
        }))
    }

    async fn insert_blog(&self, data: &serde_json::Value) -> Result<i64> {
        self.check(Operation::Insert)?;
        self.require_table()?;

        let mut records = self.records.write();
        records.next_id += 1;
        records.writes += 1;
        let id = records.next_id;
        records.rows.insert(
            id,
            BlogRecord {
                id,
                data: data.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn delete_blog(&self, id: i64) -> Result<u64> {
        self.check(Operation::Delete)?;
        self.require_table()?;

        let mut records = self.records.write();
        records.writes += 1;
        Ok(records.rows.remove(&id).map(|_| 1).unwrap_or(0))
    }

    async fn fetch_blogs(&self, limit: u32, offset: u64) -> Result<Vec<BlogRecord>> {
        self.check(Operation::Fetch)?;
        self.require_table()?;

        let records = self.records.read();
        Ok(records
            .rows
            .values()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
