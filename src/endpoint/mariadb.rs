//! MariaDB Endpoint
//!
//! Executes the core's operations against a MariaDB (or MySQL) server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySqlPool, Row};

use super::sql;
use super::{Endpoint, LogPosition, ReplicaStatus, ReplicationCredential, ReplicationSource};
use crate::blog::BlogRecord;
use crate::config::EndpointConfig;
use crate::error::{Error, Result};

/// MariaDB endpoint backed by sqlx connection pools
pub struct MariaDbEndpoint {
    /// Identity reported to clients
    name: String,
    /// Database name from configuration
    database: String,
    /// Server-level connection pool (no database selected, for DDL and admin statements)
    server_pool: MySqlPool,
    /// Database-level connection pool for record operations
    pool: MySqlPool,
}

impl MariaDbEndpoint {
    /// Create an endpoint; connections are only opened on first use
    pub fn new(config: &EndpointConfig) -> Self {
        let server_options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);
        let db_options = server_options.clone().database(&config.database);

        let server_pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(server_options);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(db_options);

        Self {
            name: config.name(),
            database: config.database.clone(),
            server_pool,
            pool,
        }
    }

    /// Execute a statement that does not depend on the selected database
    async fn execute_server(&self, stmt: &str) -> Result<u64> {
        tracing::debug!("[{}] Executing: {}", self.name, sql::preview(&sql::redact(stmt)));

        let result = sqlx::query(stmt)
            .execute(&self.server_pool)
            .await
            .map_err(|e| self.classify(stmt, e))?;

        Ok(result.rows_affected())
    }

    /// Execute a statement against the configured database
    async fn execute(&self, stmt: &str) -> Result<u64> {
        tracing::debug!("[{}] Executing: {}", self.name, sql::preview(&sql::redact(stmt)));

        let result = sqlx::query(stmt)
            .execute(&self.pool)
            .await
            .map_err(|e| self.classify(stmt, e))?;

        Ok(result.rows_affected())
    }

    /// Keep connectivity failures as driver errors, wrap statement failures with context
    fn classify(&self, stmt: &str, e: sqlx::Error) -> Error {
        match e {
            sqlx::Error::Database(db) => Error::QueryExecution(format!(
                "[{}] '{}...': {}",
                self.name,
                sql::statement_context(stmt),
                db
            )),
            other => Error::Database(other),
        }
    }
}

fn yes(row: &sqlx::mysql::MySqlRow, column: &str) -> bool {
    row.try_get::<String, _>(column)
        .map(|v| v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false)
}

#[async_trait]
impl Endpoint for MariaDbEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.server_pool)
            .await?;

        if result.0 != 1 {
            return Err(Error::Internal(format!("[{}] unexpected ping reply", self.name)));
        }
        Ok(())
    }

    async fn ensure_replication_user(&self, credential: &ReplicationCredential) -> Result<()> {
        self.execute_server(&sql::create_replication_user(credential)).await?;
        self.execute_server(&sql::grant_replication(credential)).await?;
        self.execute_server(sql::FLUSH_PRIVILEGES).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.execute_server(&sql::create_database(&self.database)).await?;
        self.execute(&sql::create_blog_table()).await?;
        Ok(())
    }

    async fn log_position(&self) -> Result<LogPosition> {
        let row = sqlx::query(sql::SHOW_MASTER_STATUS)
            .fetch_optional(&self.server_pool)
            .await?
            .ok_or_else(|| {
                Error::Replication(format!("[{}] binary logging is not enabled", self.name))
            })?;

        let file: String = row.try_get("File")?;
        let position: u64 = row.try_get("Position")?;

        Ok(LogPosition { file, position })
    }

    async fn follow(&self, source: &ReplicationSource) -> Result<()> {
        self.execute_server(sql::STOP_SLAVE).await?;
        self.execute_server(&sql::change_master(source)).await?;
        self.execute_server(sql::START_SLAVE).await?;
        Ok(())
    }

    async fn replica_status(&self) -> Result<Option<ReplicaStatus>> {
        let row = sqlx::query(sql::SHOW_SLAVE_STATUS)
            .fetch_optional(&self.server_pool)
            .await?;

        Ok(row.map(|row| ReplicaStatus {
            master_host: row.try_get("Master_Host").unwrap_or_default(),
            io_running: yes(&row, "Slave_IO_Running"),
            sql_running: yes(&row, "Slave_SQL_Running"),
            seconds_behind: row
                .try_get::<Option<u64>, _>("Seconds_Behind_Master")
                .ok()
                .flatten(),
            last_error: row
                .try_get::<String, _>("Last_Error")
                .ok()
                .filter(|e| !e.is_empty()),
        }))
    }

    async fn insert_blog(&self, data: &serde_json::Value) -> Result<i64> {
        let body = serde_json::to_string(data)?;
        let result = sqlx::query(sql::INSERT_BLOG)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| self.classify(sql::INSERT_BLOG, e))?;

        Ok(result.last_insert_id() as i64)
    }

    async fn delete_blog(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(sql::DELETE_BLOG)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| self.classify(sql::DELETE_BLOG, e))?;

        Ok(result.rows_affected())
    }

    async fn fetch_blogs(&self, limit: u32, offset: u64) -> Result<Vec<BlogRecord>> {
        let rows = sqlx::query(sql::SELECT_BLOGS)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.classify(sql::SELECT_BLOGS, e))?;

        rows.iter()
            .map(|row| -> Result<BlogRecord> {
                let id: i64 = row.try_get("id")?;
                let data: String = row.try_get("data")?;
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                Ok(BlogRecord {
                    id,
                    data: serde_json::from_str(&data)?,
                    created_at,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        self.server_pool.close().await;
        tracing::debug!("[{}] Connection pools closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EndpointConfig {
        EndpointConfig {
            name: None,
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "root".to_string(),
            password: String::new(),
            database: "blogdb".to_string(),
            pool_size: 2,
            connect_timeout_secs: 1,
            advertise_host: None,
        }
    }

    #[tokio::test]
    async fn test_lazy_construction() {
        // No server listens on port 1; construction must still succeed
        let endpoint = MariaDbEndpoint::new(&config());
        assert_eq!(endpoint.name(), "127.0.0.1:1");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("Operation CREATE USER failed")]
    struct ServerError;

    impl sqlx::error::DatabaseError for ServerError {
        fn message(&self) -> &str {
            "Operation CREATE USER failed"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[tokio::test]
    async fn test_failed_statement_context_is_safe() {
        let endpoint = MariaDbEndpoint::new(&config());

        let multibyte = sql::create_replication_user(&ReplicationCredential {
            username: "ü".repeat(12),
            password: "x".to_string(),
        });
        let err = endpoint.classify(&multibyte, sqlx::Error::Database(Box::new(ServerError)));
        assert!(matches!(err, Error::QueryExecution(_)));

        let short = sql::create_replication_user(&ReplicationCredential {
            username: "r".to_string(),
            password: "replpass".to_string(),
        });
        let err = endpoint.classify(&short, sqlx::Error::Database(Box::new(ServerError)));
        let message = err.to_string();
        assert!(message.contains("IDENTIFIED BY '*"), "{}", message);
        assert!(!message.contains("'re"), "{}", message);
    }

    #[tokio::test]
    async fn test_closed_endpoint_refuses_work() {
        let endpoint = MariaDbEndpoint::new(&config());
        endpoint.close().await;

        let err = endpoint.ping().await.unwrap_err();
        assert!(matches!(err, Error::Database(sqlx::Error::PoolClosed)), "{}", err);
    }

    #[tokio::test]
    async fn test_unreachable_ping_is_connectivity_error() {
        let endpoint = MariaDbEndpoint::new(&config());
        let err = endpoint.ping().await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {}", err);
    }
}
