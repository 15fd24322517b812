//! ReadSplit Configuration
//!
//! One writable master, an ordered list of read replicas, and the knobs for
//! replication bootstrap, the read cache and logging.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main ReadSplit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// The single writable endpoint
    pub master: EndpointConfig,

    /// Read-only endpoints, in round-robin order
    #[serde(default)]
    pub replicas: Vec<EndpointConfig>,

    /// Replication bootstrap configuration
    pub replication: ReplicationConfig,

    /// Read cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Connection descriptor for one database endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndpointConfig {
    /// Identity reported to clients (defaults to host:port)
    #[serde(default)]
    pub name: Option<String>,

    /// MariaDB host
    pub host: String,

    /// MariaDB port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name
    pub database: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Host replicas should dial to reach this endpoint (master only)
    #[serde(default)]
    pub advertise_host: Option<String>,
}

/// Replication bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Account replicas use to authenticate to the master
    pub user: String,

    /// Password for the replication account
    #[serde(default)]
    pub password: String,

    /// How many times to try reaching the master before moving on
    #[serde(default = "default_wait_attempts")]
    pub wait_attempts: u32,

    /// Delay between master connection attempts in milliseconds
    #[serde(default = "default_wait_delay_ms")]
    pub wait_delay_ms: u64,
}

/// Read cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached read responses in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_wait_attempts() -> u32 {
    20
}

fn default_wait_delay_ms() -> u64 {
    3000
}

fn default_ttl_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EndpointConfig {
    /// Identity of this endpoint
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }

    /// Host that replicas use to reach this endpoint
    pub fn advertise_host(&self) -> &str {
        self.advertise_host.as_deref().unwrap_or(&self.host)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self, section: &str) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(crate::Error::Config(format!("{}.host cannot be empty", section)));
        }
        if self.user.is_empty() {
            return Err(crate::Error::Config(format!("{}.user cannot be empty", section)));
        }
        if self.database.is_empty() {
            return Err(crate::Error::Config(format!("{}.database cannot be empty", section)));
        }
        if self.pool_size == 0 {
            return Err(crate::Error::Config(format!("{}.pool_size must be at least 1", section)));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.master.validate("master")?;

        if self.replicas.is_empty() {
            return Err(crate::Error::Config(
                "at least one [[replicas]] entry is required".into(),
            ));
        }
        for (i, replica) in self.replicas.iter().enumerate() {
            replica.validate(&format!("replicas[{}]", i))?;
        }

        let mut names = HashSet::new();
        for name in std::iter::once(self.master.name()).chain(self.replicas.iter().map(|r| r.name())) {
            if !names.insert(name.clone()) {
                return Err(crate::Error::Config(format!("duplicate endpoint name: {}", name)));
            }
        }

        if self.replication.user.is_empty() {
            return Err(crate::Error::Config("replication.user cannot be empty".into()));
        }

        if self.cache.ttl_secs == 0 {
            return Err(crate::Error::Config("cache.ttl_secs must be greater than 0".into()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::Error::Config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Get master wait delay as Duration
    pub fn wait_delay(&self) -> Duration {
        Duration::from_millis(self.replication.wait_delay_ms)
    }

    /// Sample configuration written by `readsplit init`
    pub fn sample() -> &'static str {
        SAMPLE_CONFIG
    }
}

const SAMPLE_CONFIG: &str = r#"[server]
bind_address = "0.0.0.0:3000"
cors_enabled = false

[master]
name = "master"
host = "mysql-master"
port = 3306
user = "root"
password = "rootpass"
database = "blogdb"

[[replicas]]
name = "replica-1"
host = "mysql-replica1"
user = "root"
password = "rootpass"
database = "blogdb"

[[replicas]]
name = "replica-2"
host = "mysql-replica2"
user = "root"
password = "rootpass"
database = "blogdb"

[replication]
user = "replicator"
password = "replpass"
wait_attempts = 20
wait_delay_ms = 3000

[cache]
ttl_secs = 10

[logging]
level = "info"
format = "pretty"
"#;
