//! Critique HTTP API
//!
//! Axum-based HTTP server for scanning pages, running analyses and voting on
//! recommendations.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, Value)`. The inner functions are
//! directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health  health check with DB status
//! - GET  /version  server version info
//! - POST /scan  capture and store a screenshot
//! - POST /analyze  fresh analysis, or upvote/downvote
//! - GET  /analysis/:id  re-derived payload for an analysis
//! - GET  /screenshots/*  stored screenshots

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use critique_core::{CritiqueConfig, CritiqueError};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::router::{handle_analyze, AnalyzeRequest};
use crate::subsystems::analyze::load_payload;
use crate::subsystems::{scan, Services};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: PgPool,
    pub config: CritiqueConfig,
    pub services: Services,
}

impl HttpState {
    pub fn new(pool: PgPool, config: CritiqueConfig) -> Self {
        let services = Services::from_config(pool.clone(), &config);
        Self {
            pool,
            config,
            services,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let screenshots = ServeDir::new(&state.config.storage.root_dir);
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/scan", post(scan_handler))
        .route("/analyze", post(analyze_handler))
        .route("/analysis/:id", get(analysis_handler))
        .nest_service("/screenshots", screenshots)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: PgPool,
    config: CritiqueConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState::new(pool, config));

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Critique HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ScanRequest {
    pub url: Option<String>,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn error_status(err: &CritiqueError) -> StatusCode {
    match err {
        CritiqueError::BadRequest(_) => StatusCode::BAD_REQUEST,
        CritiqueError::NotFound(_) => StatusCode::NOT_FOUND,
        CritiqueError::Upstream(_) => StatusCode::BAD_GATEWAY,
        CritiqueError::Configuration(_)
        | CritiqueError::Validation(_)
        | CritiqueError::Database(_)
        | CritiqueError::Migration(_)
        | CritiqueError::Config(_)
        | CritiqueError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{ error }` body with the mapped status.
pub fn error_response(err: &CritiqueError) -> (StatusCode, Value) {
    let status = error_status(err);
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "Request rejected");
    }
    (status, json!({ "error": err.to_string() }))
}

fn to_body<T: serde::Serialize>(result: Result<T, CritiqueError>) -> (StatusCode, Value) {
    match result.and_then(|v| {
        serde_json::to_value(v).map_err(|e| CritiqueError::Validation(e.to_string()))
    }) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: queries DB and returns (status_code, json_body).
pub async fn health_inner(state: &HttpState) -> (StatusCode, Value) {
    let pg_ver = match critique_core::db::health_check(&state.pool).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "postgresql": pg_ver,
            "model": state.services.gateway.as_ref().map(|g| g.name().to_string()),
            "screenshots": state.services.screenshots.is_some(),
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "critique",
    })
}

pub async fn scan_inner(services: &Services, req: ScanRequest) -> (StatusCode, Value) {
    let url = match req.url {
        Some(u) if !u.trim().is_empty() => u,
        _ => return error_response(&CritiqueError::BadRequest("url field is required".into())),
    };
    to_body(scan::run_scan(services, &url).await)
}

pub async fn analyze_inner(services: &Services, body: Value) -> (StatusCode, Value) {
    let request = match AnalyzeRequest::from_value(body) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    to_body(handle_analyze(request, services).await)
}

pub async fn analysis_inner(services: &Services, id: &str) -> (StatusCode, Value) {
    let analysis_id = match Uuid::parse_str(id) {
        Ok(id) => id,
        Err(_) => {
            return error_response(&CritiqueError::BadRequest(format!("invalid analysis id '{}'", id)))
        }
    };

    match services.store.get_analysis(analysis_id).await {
        Ok(Some(analysis)) => {
            let mut body = match load_payload(&services.store, analysis_id).await {
                Ok(p) => match serde_json::to_value(p) {
                    Ok(v) => v,
                    Err(e) => return error_response(&CritiqueError::Validation(e.to_string())),
                },
                Err(e) => return error_response(&e),
            };
            if let Some(obj) = body.as_object_mut() {
                obj.insert("status".into(), json!(analysis.status.as_str()));
                obj.insert("url".into(), json!(analysis.url));
                obj.insert("error".into(), json!(analysis.error));
                obj.insert("created_at".into(), json!(analysis.created_at));
            }
            (StatusCode::OK, body)
        }
        Ok(None) => error_response(&CritiqueError::NotFound(format!("analysis {}", analysis_id))),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn scan_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ScanRequest>,
) -> impl IntoResponse {
    let (status, body) = scan_inner(&state.services, req).await;
    (status, Json(body))
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let (status, body) = analyze_inner(&state.services, body).await;
    (status, Json(body))
}

pub async fn analysis_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = analysis_inner(&state.services, &id).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
