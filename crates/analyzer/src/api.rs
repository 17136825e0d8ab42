//! HTTP surface for liveness, readiness and Prometheus exposition
//!
//! `/healthz` answers 200 while the analyzer is at least degraded and 503
//! once any component is down. `/readyz` follows the registry's readiness
//! rule: bootstrap finished and the index store answering. `/metrics` serves
//! the process-global Prometheus registry.

use analyzer_lib::{health::HealthRegistry, observability::AnalyzerMetrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// State shared by all API handlers
#[derive(Clone)]
pub struct AppState {
    pub health: HealthRegistry,
    pub metrics: AnalyzerMetrics,
}

impl AppState {
    pub fn new(health: HealthRegistry, metrics: AnalyzerMetrics) -> Self {
        Self { health, metrics }
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.health().await;
    let code = if report.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.health.readiness().await;
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(readiness)).into_response()
}

async fn metrics() -> Response {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Build the analyzer's API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind and serve the API until the task is aborted
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
