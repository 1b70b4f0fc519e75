//! HTTP surface of a cache node.
//!
//! The peer router serves other nodes:
//! - GET {base_path}{group}/{key} -> raw value bytes
//! - GET /health
//! - GET /metrics
//!
//! The API router is the client-facing front end:
//! - GET /api?key=<key>

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::ByteView;
use crate::error::CacheError;
use crate::group::{Group, GroupRegistry};
use crate::metrics::GroupStats;
use crate::peers::http::REQUEST_ID_HEADER;

const OCTET_STREAM: &str = "application/octet-stream";

/// Application state shared across peer handlers.
pub struct AppState {
    pub registry: Arc<GroupRegistry>,
    /// Path prefix of peer requests; starts and ends with `/`.
    pub base_path: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<GroupRegistry>, base_path: impl Into<String>) -> Self {
        Self {
            registry,
            base_path: base_path.into(),
            start_time: Instant::now(),
        }
    }
}

/// Build the router other peers talk to.
pub fn build_router(state: Arc<AppState>) -> Router {
    let peer_route = format!("{}{{group}}/{{key}}", state.base_path);
    Router::new()
        .route(&peer_route, get(serve_peer))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the client-facing router for a single group.
pub fn build_api_router(group: Arc<Group>) -> Router {
    Router::new()
        .route("/api", get(api_get))
        .layer(TraceLayer::new_for_http())
        .with_state(group)
}

// ─── Response Types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub groups: BTreeMap<String, GroupStats>,
}

#[derive(Debug, Deserialize)]
pub struct ApiQuery {
    #[serde(default)]
    pub key: String,
}

/// HTTP status for a failed lookup.
pub fn status_for(err: &CacheError) -> StatusCode {
    match err {
        CacheError::InvalidKey => StatusCode::BAD_REQUEST,
        CacheError::GroupNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &CacheError) -> Response {
    (status_for(err), err.to_string()).into_response()
}

fn value_response(value: ByteView) -> Response {
    ([(CONTENT_TYPE, OCTET_STREAM)], value.to_bytes()).into_response()
}

// ─── Handlers ──────────────────────────────────────────────────────────────

async fn serve_peer(
    State(state): State<Arc<AppState>>,
    Path((group_name, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(%request_id, group = %group_name, key = %key, "Serving peer request");

    let group = match state.registry.require_group(&group_name) {
        Ok(group) => group,
        Err(e) => return error_response(&e),
    };

    match group.get(&key).await {
        Ok(value) => value_response(value),
        Err(e) => {
            warn!(%request_id, group = %group_name, key = %key, error = %e, "Peer request failed");
            error_response(&e)
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let groups = state
        .registry
        .group_names()
        .into_iter()
        .filter_map(|name| {
            let stats = state.registry.get_group(&name)?.stats();
            Some((name, stats))
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        groups,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.metrics().encode() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fallback(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    if uri.path().starts_with(&state.base_path) {
        let msg = format!("expected {}<group>/<key>, got {}", state.base_path, uri.path());
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

async fn api_get(State(group): State<Arc<Group>>, Query(query): Query<ApiQuery>) -> Response {
    match group.get(&query.key).await {
        Ok(value) => value_response(value),
        Err(e) => error_response(&e),
    }
}
