use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::error::ApiError;
use super::status::{collect, CertStatus};
use crate::certs::CertificateService;
use crate::errors::Error;

/// Shared state of the per-instance HTTP surface.
#[derive(Clone)]
pub struct ApiState {
    pub certificates: CertificateService,
    pub metrics: PrometheusHandle,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/rotate/all", post(rotate_all_handler))
        .route("/api/rotate/{name}", post(rotate_one_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, router: Router, shutdown: CancellationToken) -> crate::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::internal(format!("Failed to bind HTTP server on {}: {}", addr, e)))?;

    info!(address = %addr, "Starting HTTP server");
    serve_listener(listener, router, shutdown).await
}

pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::internal(format!("HTTP server error: {}", e)))?;

    info!("HTTP server shutdown completed");
    Ok(())
}

async fn status_handler(State(state): State<ApiState>) -> Json<Vec<CertStatus>> {
    Json(collect(state.certificates.view().snapshot().iter(), Utc::now()))
}

async fn rotate_all_handler(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    info!("API request to rotate all certificates");
    state.certificates.force_rotate_all().await.map_err(|e| {
        error!(error = %e, "Failed to rotate certificates");
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(json!({ "status": "ok", "message": "All certificates rotated" })))
}

async fn rotate_one_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    info!(certificate = %name, "API request to rotate certificate");
    state.certificates.force_rotate(&name).await.map_err(|e| {
        error!(certificate = %name, error = %e, "Failed to rotate certificate");
        ApiError::from(e)
    })?;

    Ok(Json(json!({ "status": "ok", "message": "Certificate rotated", "name": name })))
}

async fn metrics_handler(State(state): State<ApiState>) -> String {
    state.metrics.render()
}
