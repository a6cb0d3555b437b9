//! Scheduler daemon configuration
//!
//! Loaded from an optional TOML file (`SCHEDULER_CONFIG`, default
//! `cloud-scheduler.toml`) overlaid by `SCHEDULER__*` environment variables,
//! e.g. `SCHEDULER__LOOP__TICK_INTERVAL_SECS=30`.

use anyhow::{bail, Context, Result};
use scheduler_lib::{
    orchestrator::{CloudProvider, HttpProvider, SimulatedProvider},
    timeseries::{DEFAULT_MAX_SAMPLES, DEFAULT_RETENTION},
    ForecastConfig, LoopConfig, OrchestratorConfig, Policy, PricingTable, Resource, RetryPolicy,
    SchedulerSettings, StoreConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "cloud-scheduler.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port for the HTTP API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default, rename = "loop")]
    pub scheduler_loop: LoopSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub forecast: ForecastSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub provider: ProviderSection,

    /// JSON pricing table replacing the built-in one
    #[serde(default)]
    pub pricing_path: Option<PathBuf>,

    /// Resources tracked from startup
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    pub tick_interval_secs: u64,
    pub tick_deadline_secs: Option<u64>,
    pub max_workers: usize,
    pub forecast_window_secs: u64,
    pub forecast_horizon_secs: u64,
    pub pricing_refresh_ticks: u64,
    pub stale_after_secs: Option<u64>,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            tick_deadline_secs: None,
            max_workers: 8,
            forecast_window_secs: 3600,
            forecast_horizon_secs: 900,
            pricing_refresh_ticks: 60,
            stale_after_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub max_samples: usize,
    pub retention_secs: u64,
    pub persistence_path: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            retention_secs: DEFAULT_RETENTION.as_secs(),
            persistence_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastSection {
    pub min_samples: usize,
    pub backtest_points: usize,
    pub smoothing_alpha: f64,
    pub smoothing_beta: f64,
    pub rolling_window: usize,
    pub ridge_lambda: f64,
    pub disagreement_scale: f64,
    pub time_buckets: usize,
}

impl Default for ForecastSection {
    fn default() -> Self {
        Self {
            min_samples: 12,
            backtest_points: 6,
            smoothing_alpha: 0.5,
            smoothing_beta: 0.3,
            rolling_window: 6,
            ridge_lambda: 0.01,
            disagreement_scale: 25.0,
            time_buckets: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub forecast_low_threshold: f64,
    pub target_utilization: f64,
    pub disk_high_threshold: f64,
    pub sustain_secs: u64,
    pub debounce_secs: u64,
    pub cooldown_scale_secs: u64,
    pub cooldown_migrate_secs: u64,
    pub cooldown_storage_secs: u64,
    pub min_confidence: f64,
    pub min_benefit: f64,
    pub threshold_only_confidence: f64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            high_threshold: 80.0,
            low_threshold: 30.0,
            forecast_low_threshold: 40.0,
            target_utilization: 55.0,
            disk_high_threshold: 85.0,
            sustain_secs: 300,
            debounce_secs: 120,
            cooldown_scale_secs: 300,
            cooldown_migrate_secs: 1800,
            cooldown_storage_secs: 900,
            min_confidence: 0.5,
            min_benefit: 1.0,
            threshold_only_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub max_concurrent_calls: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
            max_concurrent_calls: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Simulated,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    /// Base URL of the provider API (required for `http`)
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Simulated,
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "cloud-scheduler".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl ServiceConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("SCHEDULER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SCHEDULER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let service: ServiceConfig = config
            .try_deserialize()
            .context("Invalid scheduler configuration")?;
        service.validate()?;
        Ok(service)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler_loop.tick_interval_secs == 0 {
            bail!("loop.tick_interval_secs must be greater than zero");
        }
        if self.provider.kind == ProviderKind::Http && self.provider.endpoint.is_none() {
            bail!("provider.endpoint is required for the http provider");
        }
        self.policy().validate()?;
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        let section = &self.scheduler_loop;
        LoopConfig {
            tick_interval: Duration::from_secs(section.tick_interval_secs),
            tick_deadline: section.tick_deadline_secs.map(Duration::from_secs),
            max_workers: section.max_workers,
            forecast_window: Duration::from_secs(section.forecast_window_secs),
            forecast_horizon: Duration::from_secs(section.forecast_horizon_secs),
            pricing_refresh_ticks: section.pricing_refresh_ticks,
            stale_after: section.stale_after_secs.map(Duration::from_secs),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_samples: self.store.max_samples,
            retention: Duration::from_secs(self.store.retention_secs),
            persistence_path: self.store.persistence_path.clone(),
        }
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        let section = &self.forecast;
        ForecastConfig {
            min_samples: section.min_samples,
            backtest_points: section.backtest_points,
            smoothing_alpha: section.smoothing_alpha,
            smoothing_beta: section.smoothing_beta,
            rolling_window: section.rolling_window,
            ridge_lambda: section.ridge_lambda,
            disagreement_scale: section.disagreement_scale,
            time_buckets: section.time_buckets,
            ..ForecastConfig::default()
        }
    }

    pub fn policy(&self) -> Policy {
        let section = &self.policy;
        Policy {
            high_threshold: section.high_threshold,
            low_threshold: section.low_threshold,
            forecast_low_threshold: section.forecast_low_threshold,
            target_utilization: section.target_utilization,
            disk_high_threshold: section.disk_high_threshold,
            sustain: Duration::from_secs(section.sustain_secs),
            debounce: Duration::from_secs(section.debounce_secs),
            cooldown_scale: Duration::from_secs(section.cooldown_scale_secs),
            cooldown_migrate: Duration::from_secs(section.cooldown_migrate_secs),
            cooldown_storage: Duration::from_secs(section.cooldown_storage_secs),
            min_confidence: section.min_confidence,
            min_benefit: section.min_benefit,
            threshold_only_confidence: section.threshold_only_confidence,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        OrchestratorConfig {
            retry: RetryPolicy {
                max_retries: section.max_retries,
                backoff_base: Duration::from_millis(section.backoff_base_ms),
                backoff_cap: Duration::from_millis(section.backoff_cap_ms),
            },
            max_concurrent_calls: section.max_concurrent_calls,
            ..OrchestratorConfig::default()
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            loop_config: self.loop_config(),
            forecast: self.forecast_config(),
            policy: self.policy(),
            orchestrator: self.orchestrator_config(),
        }
    }

    /// Pricing table from `pricing_path`, or the built-in table
    pub fn pricing_table(&self) -> Result<PricingTable> {
        match &self.pricing_path {
            Some(path) => PricingTable::load(path),
            None => Ok(PricingTable::builtin()),
        }
    }

    pub fn build_provider(&self) -> Result<Arc<dyn CloudProvider>> {
        match self.provider.kind {
            ProviderKind::Simulated => {
                let provider = SimulatedProvider::new();
                for resource in &self.resources {
                    provider.add_instance(resource.instance_id.clone(), resource.spec.clone());
                }
                Ok(Arc::new(provider))
            }
            ProviderKind::Http => {
                let endpoint = self
                    .provider
                    .endpoint
                    .as_deref()
                    .context("provider.endpoint is required for the http provider")?;
                let provider = HttpProvider::new(
                    endpoint,
                    Duration::from_secs(self.provider.request_timeout_secs),
                )?;
                Ok(Arc::new(provider))
            }
        }
    }
}
