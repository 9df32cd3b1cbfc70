use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::error;

use super::{FleetAggregator, PeerStatus};
use crate::api::ApiError;

#[derive(Clone)]
pub struct AggregatorState {
    pub aggregator: Arc<FleetAggregator>,
}

pub fn build_router(state: AggregatorState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/rotate/{node}", post(rotate_all_handler))
        .route("/api/rotate/{node}/{cert}", post(rotate_one_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status_handler(
    State(state): State<AggregatorState>,
) -> Result<Json<Vec<PeerStatus>>, ApiError> {
    let statuses = state.aggregator.poll_all().await.map_err(|e| {
        error!(error = %e, "Failed to fetch statuses");
        ApiError::from(e)
    })?;
    Ok(Json(statuses))
}

async fn rotate_all_handler(
    State(state): State<AggregatorState>,
    Path(node): Path<String>,
) -> Result<Response, ApiError> {
    relay(&state, &node, None).await
}

async fn rotate_one_handler(
    State(state): State<AggregatorState>,
    Path((node, cert)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    relay(&state, &node, Some(&cert)).await
}

async fn relay(state: &AggregatorState, node: &str, cert: Option<&str>) -> Result<Response, ApiError> {
    let proxied = state.aggregator.proxy_rotate(node, cert).await.map_err(|e| {
        error!(node = %node, error = %e, "Rotate proxy failed");
        ApiError::from(e)
    })?;

    let status = StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, [(header::CONTENT_TYPE, "application/json")], proxied.body).into_response())
}
