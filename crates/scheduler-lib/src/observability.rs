//! Observability infrastructure for the scheduler
//!
//! Provides:
//! - Prometheus metrics (tick, forecast and provider latency, ingestion,
//!   decisions, action outcomes)
//! - Structured JSON logging of scheduler events with tracing

use crate::models::{Action, ActionOutcome, Forecast, OutcomeStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for in-process latencies (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for provider calls and whole ticks (in seconds)
const SLOW_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct SchedulerMetricsInner {
    tick_duration_seconds: Histogram,
    forecast_latency_seconds: Histogram,
    provider_call_latency_seconds: Histogram,
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    forecasts_generated: IntCounter,
    insufficient_history: IntCounter,
    actions_emitted: IntCounterVec,
    action_outcomes: IntCounterVec,
    provider_retries: IntCounter,
    actions_in_flight: IntGauge,
    resources_tracked: IntGauge,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_seconds: register_histogram!(
                "cloud_scheduler_tick_duration_seconds",
                "Time spent running one scheduler tick",
                SLOW_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            forecast_latency_seconds: register_histogram!(
                "cloud_scheduler_forecast_latency_seconds",
                "Time spent computing one resource forecast",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register forecast_latency_seconds"),

            provider_call_latency_seconds: register_histogram!(
                "cloud_scheduler_provider_call_latency_seconds",
                "Latency of individual cloud provider calls",
                SLOW_BUCKETS.to_vec()
            )
            .expect("Failed to register provider_call_latency_seconds"),

            samples_ingested: register_int_counter!(
                "cloud_scheduler_samples_ingested_total",
                "Utilization samples accepted by the store"
            )
            .expect("Failed to register samples_ingested"),

            samples_rejected: register_int_counter!(
                "cloud_scheduler_samples_rejected_total",
                "Utilization samples rejected as invalid or out of order"
            )
            .expect("Failed to register samples_rejected"),

            forecasts_generated: register_int_counter!(
                "cloud_scheduler_forecasts_generated_total",
                "Forecasts produced by the forecaster"
            )
            .expect("Failed to register forecasts_generated"),

            insufficient_history: register_int_counter!(
                "cloud_scheduler_insufficient_history_total",
                "Forecasts skipped because the window was too short"
            )
            .expect("Failed to register insufficient_history"),

            actions_emitted: register_int_counter_vec!(
                "cloud_scheduler_actions_emitted_total",
                "Actions emitted by the decision engine",
                &["kind"]
            )
            .expect("Failed to register actions_emitted"),

            action_outcomes: register_int_counter_vec!(
                "cloud_scheduler_action_outcomes_total",
                "Resolved action outcomes",
                &["kind", "status"]
            )
            .expect("Failed to register action_outcomes"),

            provider_retries: register_int_counter!(
                "cloud_scheduler_provider_retries_total",
                "Provider calls retried after a transient error"
            )
            .expect("Failed to register provider_retries"),

            actions_in_flight: register_int_gauge!(
                "cloud_scheduler_actions_in_flight",
                "Actions submitted but not yet resolved"
            )
            .expect("Failed to register actions_in_flight"),

            resources_tracked: register_int_gauge!(
                "cloud_scheduler_resources_tracked",
                "Resources known to the scheduler"
            )
            .expect("Failed to register resources_tracked"),
        }
    }
}

/// Scheduler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        GLOBAL_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    pub fn observe_tick_duration(&self, duration_secs: f64) {
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn observe_forecast_latency(&self, duration_secs: f64) {
        self.inner().forecast_latency_seconds.observe(duration_secs);
    }

    pub fn observe_provider_call(&self, duration_secs: f64) {
        self.inner().provider_call_latency_seconds.observe(duration_secs);
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn inc_samples_rejected(&self) {
        self.inner().samples_rejected.inc();
    }

    pub fn inc_forecasts_generated(&self) {
        self.inner().forecasts_generated.inc();
    }

    pub fn inc_insufficient_history(&self) {
        self.inner().insufficient_history.inc();
    }

    pub fn inc_action_emitted(&self, kind: &str) {
        self.inner().actions_emitted.with_label_values(&[kind]).inc();
    }

    pub fn inc_action_outcome(&self, kind: &str, status: OutcomeStatus) {
        self.inner()
            .action_outcomes
            .with_label_values(&[kind, status.as_str()])
            .inc();
    }

    pub fn inc_provider_retries(&self, retries: u64) {
        self.inner().provider_retries.inc_by(retries);
    }

    pub fn set_actions_in_flight(&self, count: i64) {
        self.inner().actions_in_flight.set(count);
    }

    pub fn set_resources_tracked(&self, count: i64) {
        self.inner().resources_tracked.set(count);
    }
}

/// Structured logger for scheduler events
///
/// Every event carries a stable `event` field so log pipelines can filter
/// on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, tick_interval_secs: u64, provider: &str) {
        info!(
            event = "scheduler_started",
            instance = %self.instance,
            version = %version,
            tick_interval_secs = tick_interval_secs,
            provider = %provider,
            "Cloud scheduler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scheduler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cloud scheduler shutting down"
        );
    }

    pub fn log_forecast(&self, forecast: &Forecast) {
        info!(
            event = "forecast_generated",
            instance = %self.instance,
            resource_id = %forecast.resource_id,
            points = forecast.points.len(),
            peak_cpu = forecast.peak_cpu(),
            peak_mem = forecast.peak_mem(),
            confidence = forecast.confidence,
            sequence_weight = forecast.sequence_weight,
            "Generated demand forecast"
        );
    }

    pub fn log_decision(&self, action: &Action) {
        info!(
            event = "decision_made",
            instance = %self.instance,
            resource_id = %action.resource_id,
            action_id = %action.id,
            kind = %action.kind,
            confidence = action.confidence,
            monthly_cost_delta = action.monthly_cost_delta,
            reason = %action.reason,
            "Decision engine emitted an action"
        );
    }

    pub fn log_submission(&self, action: &Action) {
        info!(
            event = "action_submitted",
            instance = %self.instance,
            resource_id = %action.resource_id,
            action_id = %action.id,
            kind = %action.kind,
            "Action submitted to provider"
        );
    }

    pub fn log_outcome(&self, outcome: &ActionOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => {
                info!(
                    event = "action_resolved",
                    instance = %self.instance,
                    resource_id = %outcome.resource_id,
                    action_id = %outcome.action_id,
                    kind = %outcome.kind,
                    status = outcome.status.as_str(),
                    attempts = outcome.attempts,
                    "Action succeeded"
                );
            }
            _ => {
                warn!(
                    event = "action_resolved",
                    instance = %self.instance,
                    resource_id = %outcome.resource_id,
                    action_id = %outcome.action_id,
                    kind = %outcome.kind,
                    status = outcome.status.as_str(),
                    attempts = outcome.attempts,
                    error = ?outcome.error,
                    "Action did not succeed"
                );
            }
        }
    }

    pub fn log_tick(&self, resources: usize, actions: usize, failures: usize, duration_secs: f64) {
        info!(
            event = "tick_completed",
            instance = %self.instance,
            resources = resources,
            actions = actions,
            failures = failures,
            duration_secs = duration_secs,
            "Scheduler tick completed"
        );
    }
}
