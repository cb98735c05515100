//! HTTP API: health, metrics, cluster status and maintenance scheduling

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    DeploymentTracker, DriftReconciler, MaintenanceOrchestrator, MaintenanceRequest,
    MonitorError, MonitoringConfig,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub config: Arc<MonitoringConfig>,
    pub reconciler: Arc<DriftReconciler>,
    pub tracker: Arc<DeploymentTracker>,
    pub maintenance: Arc<MaintenanceOrchestrator>,
}

/// Core errors rendered as `{"error": ...}`
pub struct ApiError(MonitorError);

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MonitorError::UnknownCluster { .. } => StatusCode::NOT_FOUND,
            MonitorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn now() -> impl IntoResponse {
    Json(Utc::now())
}

async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    project: Option<String>,
    cluster: Option<String>,
}

async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    let (Some(project), Some(cluster)) = (query.project, query.cluster) else {
        return Err(MonitorError::invalid_request("project and cluster are required").into());
    };

    let status = state.reconciler.status(&project, &cluster).await?;
    Ok(Json(status).into_response())
}

async fn deployments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.all().await)
}

async fn schedule_maintenance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<MaintenanceRequest>, ApiError> {
    let scheduled = state.maintenance.schedule(request).await?;
    Ok(Json(scheduled.maintenance_request))
}

async fn list_maintenance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.maintenance.states().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/now", get(now))
        .route("/config", get(config))
        .route("/status", get(status))
        .route("/deployments", get(deployments))
        .route(
            "/maintenance",
            get(list_maintenance).post(schedule_maintenance),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
