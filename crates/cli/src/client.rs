//! API client for the cloud scheduler service

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Non-success response from the scheduler API
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        // Error bodies are `{"error": "..."}`; fall back to the raw text
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Self { status, message }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// API client for the scheduler service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        // Ingestion answers 422 with a per-sample breakdown
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return response.json().await.context("Failed to parse response");
        }

        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await.into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Fetch a probe endpoint; 503 still carries a body worth showing
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            return Err(ApiError::from_response(response).await.into());
        }

        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub instance_class: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub instance_id: String,
    pub kind: String,
    pub spec: ResourceSpec,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub hourly_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub resource_id: String,
    pub generated_at: i64,
    pub horizon_secs: u64,
    pub points: Vec<ForecastPoint>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub resource_id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_spec: Option<ResourceSpec>,
    pub monthly_cost_delta: f64,
    pub confidence: f64,
    pub reason: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub resource_id: String,
    pub kind: String,
    pub status: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub resource_id: String,
    pub tick: u64,
    pub evaluated_at: i64,
    pub forecast: Option<Forecast>,
    pub action: Option<Action>,
    pub outcome: Option<ActionOutcome>,
    pub error: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightAction {
    pub action: Action,
    pub state: String,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDetail {
    pub resource: Resource,
    pub report: Option<ResourceReport>,
    pub in_flight: Option<InFlightAction>,
    pub history: Vec<ActionOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationStats {
    pub resource_id: String,
    pub period_secs: u64,
    pub sample_count: usize,
    pub cpu: MetricSummary,
    pub memory: MetricSummary,
    pub disk: MetricSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReportEntry {
    pub resource_id: String,
    pub monthly_cost: f64,
    pub projected_savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub total_monthly_cost: f64,
    pub total_projected_savings: f64,
    pub resources: Vec<CostReportEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub success_rate: f64,
    pub by_kind: BTreeMap<String, KindStats>,
}

/// A utilization sample as accepted by the ingestion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub resource_id: String,
    pub timestamp: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    #[serde(default)]
    pub net_in_bytes: u64,
    #[serde(default)]
    pub net_out_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedSample {
    pub resource_id: String,
    pub timestamp: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: Vec<RejectedSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_parses_resources() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/resources")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([{
                    "id": "r1",
                    "instance_id": "i-r1",
                    "kind": "compute",
                    "spec": {
                        "instance_class": "ecs.c6.large",
                        "cpu_cores": 2,
                        "memory_gb": 4.0,
                        "storage_gb": 40.0,
                        "attachments": []
                    },
                    "status": "running",
                    "hourly_cost": 0.32
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let resources: Vec<Resource> = client.get("api/v1/resources").await.unwrap();

        mock.assert_async().await;
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].spec.instance_class, "ecs.c6.large");
        assert!(resources[0].region.is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/resources/ghost")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"unknown resource: ghost"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<ResourceDetail>("api/v1/resources/ghost")
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
        assert_eq!(api_err.message, "unknown resource: ghost");
    }

    #[tokio::test]
    async fn test_post_returns_partial_ingest_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/samples")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "accepted": 1,
                    "rejected": [{"resource_id": "ghost", "timestamp": 10, "error": "unknown resource: ghost"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let body: Vec<Sample> = Vec::new();
        let result: IngestResponse = client.post("api/v1/samples", &body).await.unwrap();

        assert_eq!(result.accepted, 1);
        assert_eq!(result.rejected[0].resource_id, "ghost");
    }

    #[tokio::test]
    async fn test_probe_keeps_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ready":false,"reason":"not ready"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, readiness): (StatusCode, ReadinessResponse) =
            client.probe("readyz").await.unwrap();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!readiness.ready);
    }
}
