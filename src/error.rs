//! ReadSplit Error Types

use thiserror::Error;

/// Result type alias for ReadSplit operations
pub type Result<T> = std::result::Result<T, Error>;

/// ReadSplit error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    // Replication errors
    #[error("Replication error: {0}")]
    Replication(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Payload errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means the endpoint could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::ConnectionFailed { .. } | Error::Network(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }

    /// Short machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::Database(_) | Error::QueryExecution(_) => "DATABASE",
            Error::EndpointNotFound(_) => "ENDPOINT_NOT_FOUND",
            Error::Replication(_) => "REPLICATION",
            Error::Network(_) | Error::ConnectionFailed { .. } => "UNAVAILABLE",
            Error::InvalidRequest(_) => "BAD_REQUEST",
            Error::Serialization(_) => "PAYLOAD",
            Error::Io(_) | Error::Internal(_) => "INTERNAL",
        }
    }
}
