//! HTTP API Server
//!
//! Blog endpoints plus health and replica status.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::blog::{BlogPage, BlogReader, PageRequest, WriteCoordinator, DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::cache::CacheLayer;
use crate::config::ServerConfig;
use crate::endpoint::EndpointRegistry;
use crate::error::{Error, Result};
use crate::lb::{ReadRouter, ReadRouterStats};

/// Shared application state
pub struct AppState {
    pub registry: Arc<EndpointRegistry>,
    pub cache: Arc<CacheLayer<BlogPage>>,
    pub router: Arc<ReadRouter>,
    pub reader: BlogReader,
    pub writer: WriteCoordinator,
}

impl AppState {
    /// Wire the read and write paths over one registry and cache
    pub fn new(registry: Arc<EndpointRegistry>, cache: Arc<CacheLayer<BlogPage>>) -> Result<Self> {
        let router = Arc::new(ReadRouter::new(registry.replica_count())?);
        let reader = BlogReader::new(Arc::clone(&registry), Arc::clone(&router), Arc::clone(&cache));
        let writer = WriteCoordinator::new(Arc::clone(&registry), Arc::clone(&cache));

        Ok(Self {
            registry,
            cache,
            router,
            reader,
            writer,
        })
    }
}

/// HTTP API server
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/blog", post(handle_create))
            .route("/blog/:id", delete(handle_delete))
            .route("/blogs", get(handle_list))
            .route("/health", get(handle_health))
            .route("/replicas", get(handle_replicas))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server and run until `shutdown` resolves
    pub async fn start(&self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Query string of `GET /blogs`
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Write acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub replicas: usize,
    pub cache_entries: usize,
    pub routing: ReadRouterStats,
}

/// Replication state of one replica
#[derive(Debug, Serialize)]
pub struct ReplicaHealth {
    pub name: String,
    pub reachable: bool,
    pub replicating: bool,
    pub io_running: bool,
    pub sql_running: bool,
    pub seconds_behind: Option<u64>,
    pub last_error: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error wrapper that hides internal detail from clients
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: msg,
                    code: "BAD_REQUEST".to_string(),
                }),
            )
                .into_response(),
            e => {
                tracing::error!(
                    code = e.code(),
                    connectivity = e.is_connectivity(),
                    "Request failed: {}",
                    e
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                        code: "INTERNAL_ERROR".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

// ============ Handlers ============

async fn handle_create(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    state.writer.create(payload).await?;
    Ok(Json(MessageResponse {
        message: "created".to_string(),
    }))
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    state.writer.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "deleted".to_string(),
    }))
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> std::result::Result<Json<BlogPage>, ApiError> {
    let request = PageRequest::new(
        query.page.unwrap_or(DEFAULT_PAGE),
        query.limit.unwrap_or(DEFAULT_LIMIT),
    )?;
    Ok(Json(state.reader.list(request).await?))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        replicas: state.registry.replica_count(),
        cache_entries: state.cache.len(),
        routing: state.router.stats(),
    })
}

async fn handle_replicas(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let statuses = join_all(state.registry.replicas().iter().map(|replica| async move {
        let name = replica.name().to_string();
        match replica.replica_status().await {
            Ok(Some(status)) => ReplicaHealth {
                name,
                reachable: true,
                replicating: status.io_running && status.sql_running,
                io_running: status.io_running,
                sql_running: status.sql_running,
                seconds_behind: status.seconds_behind,
                last_error: status.last_error,
            },
            Ok(None) => ReplicaHealth {
                name,
                reachable: true,
                replicating: false,
                io_running: false,
                sql_running: false,
                seconds_behind: None,
                last_error: None,
            },
            Err(e) => {
                tracing::warn!("Replica {} status check failed: {}", name, e);
                ReplicaHealth {
                    name,
                    reachable: false,
                    replicating: false,
                    io_running: false,
                    sql_running: false,
                    seconds_behind: None,
                    last_error: None,
                }
            }
        }
    }))
    .await;

    Json(statuses)
}
