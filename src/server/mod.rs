//! HTTP ingress for the edge store.
//!
//! Every POST endpoint takes a JSON body, hands the decoded request to the
//! engine on the blocking pool, and renders the outcome as JSON. Decode and
//! validation failures are 400s with the offending field paths, storage
//! failures are 500s.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router, ServiceExt,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    normalize_path::{NormalizePath, NormalizePathLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::engine::{normalize_edges, EdgeStore};
use crate::error::{EdgeError, Violation};
use crate::model::Edge;

/// Runtime options used to boot the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
        }
    }
}

impl ServerOptions {
    /// Convenience accessor for `(host, port)` tuples.
    pub fn socket_parts(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

/// Errors that can occur while running the HTTP server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Binding the listener or serving connections failed.
    #[error("edge store server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves the HTTP API until `shutdown` resolves.
pub async fn serve<S>(store: EdgeStore, options: ServerOptions, shutdown: S) -> Result<(), ServeError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (host, port) = options.socket_parts();
    let addr = SocketAddr::from((host, port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        db_path = %store.options().path.display(),
        "edge store listening"
    );

    let app = build_app(store);
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// The router wrapped so that trailing slashes on request paths are ignored.
pub fn build_app(store: EdgeStore) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_router(store))
}

/// Routes for the health probe and the `/v1` API.
pub fn build_router(store: EdgeStore) -> Router {
    Router::new()
        .route("/_ah/health", get(health_handler))
        .route("/v1/edges/init", post(init_handler))
        .route("/v1/edges/save", post(save_handler))
        .route("/v1/edges/delete", post(delete_handler))
        .route("/v1/query", post(query_handler))
        .with_state(store)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn init_handler(
    State(store): State<EdgeStore>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InitResponse>, AppError> {
    let request: InitRequest = decode_json(&headers, &body)?;
    let name = request
        .name
        .or_else(|| request.edge.and_then(|edge| edge.name))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AppError::Edge(EdgeError::invalid(
                "Name is required to initialize the edge",
                "name",
            ))
        })?;
    let created = store.blocking(move |store| store.ensure_type(&name)).await?;
    Ok(Json(InitResponse {
        success: true,
        message: format!("{created} - edge has been created successfully"),
    }))
}

async fn save_handler(
    State(store): State<EdgeStore>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, AppError> {
    let edges = decode_edges(&headers, &body)?;
    let report = store.blocking(move |store| store.save_many(&edges)).await?;
    tracing::debug!(groups = report.groups, rows = report.rows, "http save applied");
    Ok(Json(SuccessResponse { success: true }))
}

async fn delete_handler(
    State(store): State<EdgeStore>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, AppError> {
    let edges = decode_edges(&headers, &body)?;
    let report = store.blocking(move |store| store.delete_many(&edges)).await?;
    tracing::debug!(groups = report.groups, rows = report.rows, "http delete applied");
    Ok(Json(SuccessResponse { success: true }))
}

async fn query_handler(
    State(store): State<EdgeStore>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QueryResponse>, AppError> {
    let request: QueryRequest = decode_json(&headers, &body)?;
    let query = request.query.unwrap_or_default();
    let edges = store.blocking(move |store| store.run_query(&query)).await?;
    Ok(Json(QueryResponse {
        success: true,
        edges,
    }))
}

fn decode_json<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, AppError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(AppError::UnsupportedMediaType);
    }
    Ok(serde_json::from_slice(body).map_err(EdgeError::from)?)
}

fn decode_edges(headers: &HeaderMap, body: &[u8]) -> Result<Vec<Edge>, AppError> {
    let request: EdgesRequest = decode_json(headers, body)?;
    let mut edges = request.edges.unwrap_or_default();
    normalize_edges(&mut edges, OffsetDateTime::now_utc());
    Ok(edges)
}

#[derive(Debug, Deserialize)]
struct InitRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    edge: Option<InitEdge>,
}

#[derive(Debug, Deserialize)]
struct InitEdge {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgesRequest {
    #[serde(default)]
    edges: Option<Vec<Edge>>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct InitResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    success: bool,
    edges: Vec<Edge>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Edge(#[from] EdgeError),
    #[error("request body must be sent as application/json")]
    UnsupportedMediaType,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Edge(EdgeError::Decode(_) | EdgeError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Edge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(err = %self, "request failed");
        }
        let (message, fields) = match self {
            AppError::Edge(EdgeError::Validation(Violation { message, fields })) => {
                (message, Some(fields))
            }
            other => (other.to_string(), None),
        };
        let body = Json(ErrorPayload {
            code: status.as_u16(),
            message,
            fields,
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    code: u16,
    message: String,
    fields: Option<Vec<String>>,
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Installs the global `tracing` subscriber once, logging to stderr.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn install_tracing_subscriber(default_filter: &str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
