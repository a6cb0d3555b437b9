//! Core library for the cloud resource scheduler
//!
//! This crate provides the core functionality for:
//! - Per-resource utilization time series
//! - Ensemble demand forecasting
//! - Threshold, forecast and cost driven scaling decisions
//! - Idempotent action execution against a cloud provider
//! - Health checks and observability

pub mod cost;
pub mod decision;
pub mod error;
pub mod forecaster;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod timeseries;

pub use cost::PricingTable;
pub use decision::{DecisionEngine, Policy, ResourceState};
pub use error::{ProviderError, SchedulerError, SchedulerResult};
pub use forecaster::{ForecastConfig, Forecaster};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SchedulerMetrics, StructuredLogger};
pub use orchestrator::{CloudProvider, Orchestrator, OrchestratorConfig, RetryPolicy};
pub use registry::ResourceRegistry;
pub use scheduler::{LoopConfig, ResourceReport, SchedulerLoop, SchedulerSettings, TickSummary};
pub use timeseries::{StoreConfig, TimeSeriesStore};
