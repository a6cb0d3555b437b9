//! Core data models for the cloud scheduler

use serde::{Deserialize, Serialize};

/// Category of a tracked cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Compute,
    Memory,
    Storage,
}

/// Lifecycle status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Running,
    Stopped,
    Degraded,
}

/// Kind of component attached to a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Storage,
    Cache,
}

/// Storage volume or cache attached to an instance and billed with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Pricing class, billed per GB-hour
    pub class: String,
    pub size_gb: f64,
}

/// Capacity specification of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Pricing class of the compute part (e.g. "ecs.c6.large")
    pub instance_class: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ResourceSpec {
    /// Total attached storage across storage attachments
    pub fn attached_storage_gb(&self) -> f64 {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Storage)
            .map(|a| a.size_gb)
            .sum()
    }
}

/// A cloud resource tracked by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Provider-assigned identity at discovery; stable key for samples and actions
    pub id: String,
    /// Provider instance currently backing the resource (changes on migration)
    pub instance_id: String,
    pub kind: ResourceKind,
    pub spec: ResourceSpec,
    pub status: ResourceStatus,
    #[serde(default)]
    pub region: Option<String>,
    /// Hourly cost of the current spec
    #[serde(default)]
    pub hourly_cost: f64,
}

/// One utilization observation for a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub resource_id: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    #[serde(default)]
    pub net_in_bytes: u64,
    #[serde(default)]
    pub net_out_bytes: u64,
}

/// Predicted utilization at one future instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
}

/// Demand forecast for a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub resource_id: String,
    /// Timestamp of the newest sample the forecast was built from
    pub generated_at: i64,
    pub horizon_secs: u64,
    pub points: Vec<ForecastPoint>,
    pub confidence: f64,
    /// Ensemble weight given to the trend/seasonality estimator
    pub sequence_weight: f64,
    /// Ensemble weight given to the regression estimator
    pub regression_weight: f64,
}

impl Forecast {
    /// Highest predicted cpu utilization across the horizon
    pub fn peak_cpu(&self) -> f64 {
        self.points.iter().map(|p| p.cpu_pct).fold(0.0, f64::max)
    }

    /// Highest predicted memory utilization across the horizon
    pub fn peak_mem(&self) -> f64 {
        self.points.iter().map(|p| p.mem_pct).fold(0.0, f64::max)
    }
}

/// What an action does to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ScaleUp,
    ScaleDown,
    Migrate,
    OptimizeStorage,
    NoOp,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ScaleUp => "scale_up",
            ActionKind::ScaleDown => "scale_down",
            ActionKind::Migrate => "migrate",
            ActionKind::OptimizeStorage => "optimize_storage",
            ActionKind::NoOp => "no_op",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision for one resource, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub resource_id: String,
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_spec: Option<ResourceSpec>,
    /// Signed change in monthly cost if the action is applied
    pub monthly_cost_delta: f64,
    pub confidence: f64,
    /// Human-readable justification
    pub reason: String,
    pub created_at: i64,
}

impl Action {
    /// Create a no-op action recording why nothing was done
    pub fn no_op(resource_id: impl Into<String>, reason: impl Into<String>, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            kind: ActionKind::NoOp,
            target_spec: None,
            monthly_cost_delta: 0.0,
            confidence: 0.0,
            reason: reason.into(),
            created_at: now,
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.kind == ActionKind::NoOp
    }
}

/// Result state of an action submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Retrying,
}

impl OutcomeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutcomeStatus::Succeeded | OutcomeStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Retrying => "retrying",
        }
    }
}

/// Outcome of submitting an action to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub resource_id: String,
    pub kind: ActionKind,
    pub status: OutcomeStatus,
    /// Provider call attempts made so far, across all steps
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

/// Hourly price of one pricing class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub class: String,
    pub hourly_rate: f64,
    /// Capacity of an instance class; absent for per-GB classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
}

/// Cost report row for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReportEntry {
    pub resource_id: String,
    pub monthly_cost: f64,
    /// Savings if the latest pending recommendation were applied (0 when none)
    pub projected_savings: f64,
}
