//! HTTP API: ingestion, queries, cost report, health checks and Prometheus
//! metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scheduler_lib::{
    health::ComponentStatus,
    orchestrator::{ActionStats, InFlightAction},
    timeseries::UtilizationStats,
    ActionOutcome, CostReportEntry, HealthRegistry, Resource, ResourceReport, Sample,
    SchedulerError, SchedulerLoop,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SchedulerLoop>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(scheduler: Arc<SchedulerLoop>) -> Self {
        Self {
            health_registry: scheduler.health().clone(),
            scheduler,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::InvalidSample { .. } | SchedulerError::InvalidPolicy(_) => {
            StatusCode::BAD_REQUEST
        }
        SchedulerError::UnknownResource(_) => StatusCode::NOT_FOUND,
        SchedulerError::ActionRejected { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
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

/// Readiness check response - returns 200 if ready, 503 if not ready
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
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectedSample {
    pub resource_id: String,
    pub timestamp: i64,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: Vec<RejectedSample>,
}

/// Ingest a batch of samples; 200 when all were stored, 422 otherwise
async fn ingest_samples(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<Sample>>,
) -> impl IntoResponse {
    let mut response = IngestResponse {
        accepted: 0,
        rejected: Vec::new(),
    };

    for sample in samples {
        let resource_id = sample.resource_id.clone();
        let timestamp = sample.timestamp;
        match state.scheduler.ingest(sample) {
            Ok(()) => response.accepted += 1,
            Err(e) => {
                debug!(resource_id = %resource_id, timestamp = timestamp, error = %e, "Sample rejected");
                response.rejected.push(RejectedSample {
                    resource_id,
                    timestamp,
                    error: e.to_string(),
                });
            }
        }
    }

    let status = if response.rejected.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(response))
}

async fn list_resources(State(state): State<Arc<AppState>>) -> Json<Vec<Resource>> {
    Json(state.scheduler.registry().list())
}

/// Register or replace a tracked resource
async fn register_resource(
    State(state): State<Arc<AppState>>,
    Json(resource): Json<Resource>,
) -> impl IntoResponse {
    let resource_id = resource.id.clone();
    let added = state.scheduler.register(resource.clone());
    info!(resource_id = %resource_id, added = added, "Resource registered");

    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(resource))
}

/// Stop tracking a resource
async fn deregister_resource(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
) -> ApiResult<Resource> {
    let resource = state
        .scheduler
        .deregister(&resource_id)
        .map_err(|e| api_error(status_for(&e), e.to_string()))?;
    info!(resource_id = %resource_id, "Resource deregistered");
    Ok(Json(resource))
}

/// Latest pipeline report of every resource
async fn list_reports(State(state): State<Arc<AppState>>) -> Json<Vec<ResourceReport>> {
    Json(state.scheduler.reports())
}

/// Everything known about one resource
#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceDetail {
    pub resource: Resource,
    pub report: Option<ResourceReport>,
    pub in_flight: Option<InFlightAction>,
    pub history: Vec<ActionOutcome>,
}

async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
) -> ApiResult<ResourceDetail> {
    let scheduler = &state.scheduler;
    let resource = scheduler.registry().get(&resource_id).ok_or_else(|| {
        let err = SchedulerError::UnknownResource(resource_id.clone());
        api_error(status_for(&err), err.to_string())
    })?;

    let orchestrator = scheduler.orchestrator();
    Ok(Json(ResourceDetail {
        report: scheduler.latest(&resource_id),
        in_flight: orchestrator
            .in_flight()
            .into_iter()
            .find(|slot| slot.action.resource_id == resource_id),
        history: orchestrator.history(&resource_id),
        resource,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

/// Reporting periods accepted by the stats endpoint
pub fn parse_period(period: &str) -> Option<Duration> {
    let hours = match period {
        "1h" => 1,
        "24h" => 24,
        "7d" => 7 * 24,
        "30d" => 30 * 24,
        _ => return None,
    };
    Some(Duration::from_secs(hours * 3600))
}

async fn resource_stats(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<UtilizationStats> {
    let period = query.period.as_deref().unwrap_or("24h");
    let duration = parse_period(period).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("unsupported period {}, expected one of 1h, 24h, 7d, 30d", period),
        )
    })?;

    if !state.scheduler.registry().contains(&resource_id) {
        let err = SchedulerError::UnknownResource(resource_id);
        return Err(api_error(status_for(&err), err.to_string()));
    }

    state
        .scheduler
        .store()
        .stats(&resource_id, duration)
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("no samples for {} in the last {}", resource_id, period),
            )
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CostReport {
    pub total_monthly_cost: f64,
    pub total_projected_savings: f64,
    pub resources: Vec<CostReportEntry>,
}

async fn costs(State(state): State<Arc<AppState>>) -> Json<CostReport> {
    let resources = state.scheduler.cost_report();
    Json(CostReport {
        total_monthly_cost: resources.iter().map(|r| r.monthly_cost).sum(),
        total_projected_savings: resources.iter().map(|r| r.projected_savings).sum(),
        resources,
    })
}

async fn action_stats(State(state): State<Arc<AppState>>) -> Json<ActionStats> {
    Json(state.scheduler.orchestrator().stats())
}

async fn in_flight_actions(State(state): State<Arc<AppState>>) -> Json<Vec<InFlightAction>> {
    Json(state.scheduler.orchestrator().in_flight())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/samples", post(ingest_samples))
        .route(
            "/api/v1/resources",
            get(list_resources).post(register_resource),
        )
        .route(
            "/api/v1/resources/:id",
            get(get_resource).delete(deregister_resource),
        )
        .route("/api/v1/resources/:id/stats", get(resource_stats))
        .route("/api/v1/reports", get(list_reports))
        .route("/api/v1/costs", get(costs))
        .route("/api/v1/actions/stats", get(action_stats))
        .route("/api/v1/actions/in-flight", get(in_flight_actions))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_period("7d"), Some(Duration::from_secs(7 * 86400)));
        assert_eq!(parse_period("30d"), Some(Duration::from_secs(30 * 86400)));
        assert_eq!(parse_period("2w"), None);
    }
}
