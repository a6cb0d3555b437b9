//! Cloud provider binding over a JSON HTTP API
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /instances` → `{"instance_id": ...}`
//! - `POST /instances/{id}/resize`
//! - `DELETE /instances/{id}`
//! - `POST /instances/{id}/migrate`
//! - `GET /pricing` → `[PricingEntry]`
//!
//! Mutating requests carry an `Idempotency-Key` header.

use super::provider::{CloudProvider, ProviderResult};
use crate::error::ProviderError;
use crate::models::{PricingEntry, ResourceSpec};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    spec: &'a ResourceSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    instance_id: String,
}

#[derive(Debug, Serialize)]
struct MigrateRequest<'a> {
    target_instance_id: &'a str,
}

pub struct HttpProvider {
    client: Client,
    base_url: Url,
}

impl HttpProvider {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(endpoint).context("Invalid provider endpoint")?;
        // Request paths are appended after the endpoint's own path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment
    fn url(&self, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::Fatal(format!("provider endpoint {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ProviderResult<Response> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ProviderResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Fatal(format!("malformed provider response: {}", e)))
    }
}

/// Map a transport failure; every failure before a response is retryable
fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("request timed out: {}", err))
    } else {
        ProviderError::Transient(format!("request failed: {}", err))
    }
}

/// 408, 429 and 5xx are transient; any other error status is fatal
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("provider returned {}: {}", status, body);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ProviderError::Transient(message)
    } else {
        ProviderError::Fatal(message)
    }
}

#[async_trait]
impl CloudProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create(
        &self,
        spec: &ResourceSpec,
        region: Option<&str>,
        idempotency_key: &str,
    ) -> ProviderResult<String> {
        let request = self
            .client
            .post(self.url(&["instances"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&CreateRequest { spec, region });
        let created: CreateResponse = self.send_json(request).await?;
        debug!(instance_id = %created.instance_id, "Provider created instance");
        Ok(created.instance_id)
    }

    async fn resize(
        &self,
        instance_id: &str,
        spec: &ResourceSpec,
        idempotency_key: &str,
    ) -> ProviderResult<()> {
        let request = self
            .client
            .post(self.url(&["instances", instance_id, "resize"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(spec);
        self.send(request).await.map(|_| ())
    }

    async fn terminate(&self, instance_id: &str, idempotency_key: &str) -> ProviderResult<()> {
        let request = self
            .client
            .delete(self.url(&["instances", instance_id])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key);
        self.send(request).await.map(|_| ())
    }

    async fn migrate(
        &self,
        from_instance_id: &str,
        to_instance_id: &str,
        idempotency_key: &str,
    ) -> ProviderResult<()> {
        let request = self
            .client
            .post(self.url(&["instances", from_instance_id, "migrate"])?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&MigrateRequest {
                target_instance_id: to_instance_id,
            });
        self.send(request).await.map(|_| ())
    }

    async fn get_pricing(&self) -> ProviderResult<Vec<PricingEntry>> {
        let request = self.client.get(self.url(&["pricing"])?);
        self.send_json(request).await
    }
}
