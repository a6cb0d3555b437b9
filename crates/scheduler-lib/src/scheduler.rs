//! Scheduler loop
//!
//! Each tick runs store → forecaster → decision engine → orchestrator for
//! every tracked resource on a bounded worker pool. A tick-level deadline
//! stops waiting on slow resources without cancelling their provider work.

use crate::cost::{self, PricingTable};
use crate::decision::{DecisionEngine, Policy};
use crate::error::{SchedulerError, SchedulerResult};
use crate::forecaster::{ForecastConfig, Forecaster};
use crate::health::{components, HealthRegistry};
use crate::models::{
    Action, ActionOutcome, CostReportEntry, Forecast, OutcomeStatus, Resource, Sample,
};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use crate::orchestrator::{CloudProvider, Orchestrator, OrchestratorConfig};
use crate::registry::ResourceRegistry;
use crate::timeseries::{secs, TimeSeriesStore};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_interval: Duration,
    /// How long a tick waits on any resource pipeline (default: tick interval)
    pub tick_deadline: Option<Duration>,
    /// Resources processed concurrently within a tick
    pub max_workers: usize,
    /// Sample history fed to the forecaster
    pub forecast_window: Duration,
    pub forecast_horizon: Duration,
    /// Refresh provider pricing every N ticks (0 disables)
    pub pricing_refresh_ticks: u64,
    /// A resource whose newest sample is older than this is not evaluated
    /// (default: the policy sustain window)
    pub stale_after: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            tick_deadline: None,
            max_workers: 8,
            forecast_window: Duration::from_secs(3600),
            forecast_horizon: Duration::from_secs(900),
            pricing_refresh_ticks: 60,
            stale_after: None,
        }
    }
}

impl LoopConfig {
    pub fn deadline(&self) -> Duration {
        self.tick_deadline.unwrap_or(self.tick_interval)
    }
}

/// Tunables for every component the loop drives
#[derive(Debug, Clone, Default)]
pub struct SchedulerSettings {
    pub loop_config: LoopConfig,
    pub forecast: ForecastConfig,
    pub policy: Policy,
    pub orchestrator: OrchestratorConfig,
}

/// Latest pipeline result for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub resource_id: String,
    pub tick: u64,
    pub evaluated_at: i64,
    pub forecast: Option<Forecast>,
    pub action: Option<Action>,
    /// Most recent outcome, kept across ticks until a newer one arrives
    pub outcome: Option<ActionOutcome>,
    /// Error that short-circuited the pipeline on the latest tick
    pub error: Option<String>,
    /// Decision state after the latest tick
    pub state: String,
}

/// Counters for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: u64,
    pub resources: usize,
    pub forecasts: usize,
    pub actions: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retrying: usize,
    pub errors: usize,
    pub duration_secs: f64,
}

pub struct SchedulerLoop {
    store: Arc<TimeSeriesStore>,
    registry: Arc<ResourceRegistry>,
    pricing: Arc<PricingTable>,
    forecaster: Forecaster,
    engine: DecisionEngine,
    orchestrator: Arc<Orchestrator>,
    health: HealthRegistry,
    policy: Policy,
    config: LoopConfig,
    reports: DashMap<String, ResourceReport>,
    /// Tick time at which the last action of each resource settled; older
    /// samples describe the previous spec
    settled: DashMap<String, i64>,
    outcomes: Mutex<mpsc::UnboundedReceiver<ActionOutcome>>,
    ticks: AtomicU64,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
}

impl SchedulerLoop {
    /// Wire the pipeline together; fails when the policy is inconsistent
    pub fn new(
        store: Arc<TimeSeriesStore>,
        registry: Arc<ResourceRegistry>,
        pricing: Arc<PricingTable>,
        provider: Arc<dyn CloudProvider>,
        health: HealthRegistry,
        settings: SchedulerSettings,
    ) -> SchedulerResult<Self> {
        settings.policy.validate()?;

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Orchestrator::new(
            provider,
            registry.clone(),
            pricing.clone(),
            settings.orchestrator,
            outcome_tx,
        ));
        let metrics = SchedulerMetrics::new();
        metrics.set_resources_tracked(registry.len() as i64);

        Ok(Self {
            store,
            engine: DecisionEngine::new(pricing.clone()),
            forecaster: Forecaster::new(settings.forecast),
            registry,
            pricing,
            orchestrator,
            health,
            policy: settings.policy,
            config: settings.loop_config,
            reports: DashMap::new(),
            settled: DashMap::new(),
            outcomes: Mutex::new(outcome_rx),
            ticks: AtomicU64::new(0),
            metrics,
            logger: StructuredLogger::new("scheduler"),
        })
    }

    pub fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn pricing(&self) -> &Arc<PricingTable> {
        &self.pricing
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn stale_after(&self) -> Duration {
        self.config.stale_after.unwrap_or(self.policy.sustain)
    }

    /// Start tracking a resource; returns true when it was not known before
    pub fn register(&self, resource: Resource) -> bool {
        let added = self.registry.register(resource);
        self.metrics.set_resources_tracked(self.registry.len() as i64);
        added
    }

    /// Stop tracking a resource and drop its samples, state and report
    pub fn deregister(&self, resource_id: &str) -> SchedulerResult<Resource> {
        let resource = self
            .registry
            .remove(resource_id)
            .ok_or_else(|| SchedulerError::UnknownResource(resource_id.to_string()))?;
        self.store.remove(resource_id);
        self.engine.forget(resource_id);
        self.reports.remove(resource_id);
        self.settled.remove(resource_id);
        self.metrics.set_resources_tracked(self.registry.len() as i64);
        Ok(resource)
    }

    /// Validate and store one utilization sample
    pub fn ingest(&self, sample: Sample) -> SchedulerResult<()> {
        if !self.registry.contains(&sample.resource_id) {
            self.metrics.inc_samples_rejected();
            return Err(SchedulerError::UnknownResource(sample.resource_id));
        }
        match self.store.append(sample) {
            Ok(()) => {
                self.metrics.inc_samples_ingested();
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_samples_rejected();
                Err(e)
            }
        }
    }

    pub fn latest(&self, resource_id: &str) -> Option<ResourceReport> {
        self.reports.get(resource_id).map(|r| r.value().clone())
    }

    /// Latest report of every resource, ordered by id
    pub fn reports(&self) -> Vec<ResourceReport> {
        let mut reports: Vec<ResourceReport> =
            self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        reports
    }

    /// Monthly cost of every tracked resource plus the savings of its latest
    /// recommendation
    pub fn cost_report(&self) -> Vec<CostReportEntry> {
        let recommendations: HashMap<String, Action> = self
            .reports
            .iter()
            .filter_map(|r| r.action.clone().map(|a| (r.resource_id.clone(), a)))
            .collect();
        cost::cost_report(&self.registry.list(), &recommendations, &self.pricing)
    }

    /// Run ticks until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            deadline_secs = self.config.deadline().as_secs(),
            max_workers = self.config.max_workers,
            provider = self.orchestrator.provider_name(),
            "Starting scheduler loop"
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.health.set_ready(true).await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick(chrono::Utc::now().timestamp()).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scheduler loop");
                    break;
                }
            }
        }

        if let Err(e) = self.store.flush() {
            warn!(error = %e, "Failed to flush samples on shutdown");
        }
    }

    /// Run one tick over every tracked resource at wall-clock time `now`
    pub async fn run_tick(self: &Arc<Self>, now: i64) -> TickSummary {
        let started = Instant::now();
        let deadline = started + self.config.deadline();
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        self.drain_outcomes(now).await;
        self.resume_stalled();

        if self.config.pricing_refresh_ticks > 0 && tick % self.config.pricing_refresh_ticks == 0 {
            if let Err(e) = self.orchestrator.refresh_pricing().await {
                warn!(error = %e, "Failed to refresh pricing, keeping current table");
            }
        }

        let resources = self.registry.list();
        let mut summary = TickSummary {
            tick,
            resources: resources.len(),
            ..Default::default()
        };

        let workers = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for resource in resources {
            let this = Arc::clone(self);
            let workers = Arc::clone(&workers);
            tasks.spawn(async move {
                let _permit = workers.acquire_owned().await.ok();
                this.process(resource, tick, now, deadline).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    summary.forecasts += usize::from(report.forecast.is_some());
                    if report.error.is_some() {
                        summary.errors += 1;
                    }
                    if let Some(action) = report.action.as_ref().filter(|a| !a.is_no_op()) {
                        summary.actions += 1;
                        match report.outcome.as_ref() {
                            Some(o) if o.action_id == action.id => match o.status {
                                OutcomeStatus::Succeeded => summary.succeeded += 1,
                                OutcomeStatus::Failed => summary.failed += 1,
                                OutcomeStatus::Retrying => summary.retrying += 1,
                            },
                            _ => {}
                        }
                    }
                    self.store_report(report);
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(error = %e, "Resource pipeline task panicked");
                }
            }
        }

        self.drain_outcomes(now).await;

        if let Err(e) = self.store.flush() {
            warn!(error = %e, "Failed to flush samples");
            self.health
                .set_degraded(components::STORE, format!("snapshot write failed: {}", e))
                .await;
        } else {
            self.health.set_healthy(components::STORE).await;
        }
        if summary.failed > 0 {
            self.health
                .set_degraded(
                    components::ORCHESTRATOR,
                    format!("{} action(s) failed in tick {}", summary.failed, tick),
                )
                .await;
        } else {
            self.health.set_healthy(components::ORCHESTRATOR).await;
        }
        if summary.errors > 0 {
            self.health
                .set_degraded(
                    components::SCHEDULER,
                    format!("{} resource pipeline(s) errored in tick {}", summary.errors, tick),
                )
                .await;
        } else {
            self.health.set_healthy(components::SCHEDULER).await;
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        self.metrics.observe_tick_duration(summary.duration_secs);
        self.metrics
            .set_actions_in_flight(self.orchestrator.in_flight_count() as i64);
        self.logger.log_tick(
            summary.resources,
            summary.actions,
            summary.failed,
            summary.duration_secs,
        );
        summary
    }

    /// Pipeline for one resource; never fails, errors land in the report
    async fn process(&self, resource: Resource, tick: u64, now: i64, deadline: Instant) -> ResourceReport {
        let mut report = ResourceReport {
            resource_id: resource.id.clone(),
            tick,
            evaluated_at: now,
            forecast: None,
            action: None,
            outcome: None,
            error: None,
            state: String::new(),
        };

        let mut window = self.store.window(&resource.id, self.config.forecast_window);
        if let Some(newest) = window.last() {
            let age = now.saturating_sub(newest.timestamp);
            if age > secs(self.stale_after()) {
                debug!(
                    resource_id = %resource.id,
                    newest = newest.timestamp,
                    age_secs = age,
                    "Samples are stale, skipping evaluation"
                );
                let reason = format!("stale samples: newest at {}", newest.timestamp);
                report.action = Some(Action::no_op(&resource.id, reason, now));
                report.state = self.engine.state(&resource.id).name().to_string();
                return report;
            }
        }
        if let Some(settled) = self.settled.get(&resource.id).map(|s| *s.value()) {
            window.retain(|s| s.timestamp > settled);
        }

        let started = std::time::Instant::now();
        match self
            .forecaster
            .predict(&resource.id, &window, self.config.forecast_horizon)
        {
            Ok(forecast) => {
                self.metrics
                    .observe_forecast_latency(started.elapsed().as_secs_f64());
                self.metrics.inc_forecasts_generated();
                self.logger.log_forecast(&forecast);
                report.forecast = Some(forecast);
            }
            Err(SchedulerError::InsufficientHistory {
                available, required, ..
            }) => {
                self.metrics.inc_insufficient_history();
                debug!(
                    resource_id = %resource.id,
                    available = available,
                    required = required,
                    "Not enough history to forecast, using thresholds only"
                );
            }
            Err(e) => {
                report.error = Some(e.to_string());
                report.action = Some(Action::no_op(&resource.id, e.to_string(), now));
                report.state = self.engine.state(&resource.id).name().to_string();
                return report;
            }
        }

        let action = match self.engine.decide(
            &resource,
            &window,
            report.forecast.as_ref(),
            &self.policy,
            now,
        ) {
            Ok(action) => action,
            Err(e) => {
                warn!(resource_id = %resource.id, error = %e, "Decision failed");
                report.error = Some(e.to_string());
                report.action = Some(Action::no_op(&resource.id, e.to_string(), now));
                report.state = self.engine.state(&resource.id).name().to_string();
                return report;
            }
        };

        if !action.is_no_op() {
            self.metrics.inc_action_emitted(action.kind.as_str());
            self.logger.log_decision(&action);
            self.logger.log_submission(&action);
            report.outcome = self.execute(&action, deadline).await;
            if report.outcome.is_none() {
                report.error = Some(format!("action {} was not accepted", action.id));
            }
        }

        report.action = Some(action);
        report.state = self.engine.state(&resource.id).name().to_string();
        report
    }

    /// Submit an action and wait for it until the tick deadline
    ///
    /// The submission runs detached, so a missed deadline leaves the provider
    /// work running; its outcome arrives on the outcome channel later.
    async fn execute(&self, action: &Action, deadline: Instant) -> Option<ActionOutcome> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let submitted = action.clone();
        let handle = tokio::spawn(async move { orchestrator.submit(submitted).await });

        match timeout_at(deadline, handle).await {
            Ok(Ok(Ok(outcome))) => Some(outcome),
            Ok(Ok(Err(e))) => {
                warn!(
                    resource_id = %action.resource_id,
                    action_id = %action.id,
                    error = %e,
                    "Action not accepted by orchestrator"
                );
                self.engine.release(&action.resource_id, &action.id);
                None
            }
            Ok(Err(e)) => {
                error!(action_id = %action.id, error = %e, "Submission task panicked");
                None
            }
            Err(_) => {
                self.orchestrator.mark_overdue(&action.resource_id);
                self.metrics
                    .inc_action_outcome(action.kind.as_str(), OutcomeStatus::Retrying);
                warn!(
                    resource_id = %action.resource_id,
                    action_id = %action.id,
                    "Tick deadline passed, action left running"
                );
                Some(ActionOutcome {
                    action_id: action.id.clone(),
                    resource_id: action.resource_id.clone(),
                    kind: action.kind,
                    status: OutcomeStatus::Retrying,
                    attempts: 0,
                    error: Some("tick deadline exceeded".to_string()),
                    resolved_at: None,
                })
            }
        }
    }

    /// Acknowledge terminal outcomes delivered since the last drain
    async fn drain_outcomes(&self, now: i64) {
        let mut outcomes = self.outcomes.lock().await;
        while let Ok(outcome) = outcomes.try_recv() {
            self.logger.log_outcome(&outcome);
            if self.engine.acknowledge(&outcome, &self.policy, now) {
                self.settled.insert(outcome.resource_id.clone(), now);
            }
            if let Some(mut report) = self.reports.get_mut(&outcome.resource_id) {
                report.state = self.engine.state(&outcome.resource_id).name().to_string();
                report.outcome = Some(outcome);
            }
        }
    }

    /// Re-drive actions whose driver was dropped
    fn resume_stalled(&self) {
        for resource_id in self.orchestrator.stalled() {
            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                orchestrator.resume(&resource_id).await;
            });
        }
    }

    fn store_report(&self, mut report: ResourceReport) {
        if report.outcome.is_none() {
            if let Some(previous) = self.reports.get(&report.resource_id) {
                report.outcome = previous.outcome.clone();
            }
        }
        self.reports.insert(report.resource_id.clone(), report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ResourceState;
    use crate::error::ProviderError;
    use crate::models::{ActionKind, ResourceKind, ResourceSpec, ResourceStatus};
    use crate::orchestrator::{Operation, SimulatedProvider};

    const T0: i64 = 1_700_000_000;

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            instance_id: format!("i-{}", id),
            kind: ResourceKind::Compute,
            spec: ResourceSpec {
                instance_class: "ecs.c6.large".to_string(),
                cpu_cores: 2,
                memory_gb: 4.0,
                storage_gb: 40.0,
                attachments: vec![],
            },
            status: ResourceStatus::Running,
            region: None,
            hourly_cost: 0.32,
        }
    }

    fn scheduler(
        provider: SimulatedProvider,
        settings: SchedulerSettings,
        ids: &[&str],
    ) -> (Arc<SchedulerLoop>, Arc<SimulatedProvider>) {
        let provider = Arc::new(provider);
        let registry = Arc::new(ResourceRegistry::new());
        for id in ids {
            let r = resource(id);
            provider.add_instance(r.instance_id.clone(), r.spec.clone());
            registry.register(r);
        }
        let scheduler = SchedulerLoop::new(
            Arc::new(TimeSeriesStore::default()),
            registry,
            Arc::new(PricingTable::builtin()),
            provider.clone(),
            HealthRegistry::new(),
            settings,
        )
        .unwrap();
        (Arc::new(scheduler), provider)
    }

    /// 30 samples ramping cpu from 40% to 90% over 15 minutes; returns the
    /// newest timestamp
    fn ingest_ramp(scheduler: &SchedulerLoop, resource_id: &str) -> i64 {
        for i in 0..30 {
            scheduler
                .ingest(Sample {
                    resource_id: resource_id.to_string(),
                    timestamp: T0 + i * 31,
                    cpu_pct: 40.0 + 50.0 * i as f64 / 29.0,
                    mem_pct: 50.0,
                    disk_pct: 40.0,
                    net_in_bytes: 0,
                    net_out_bytes: 0,
                })
                .unwrap();
        }
        T0 + 29 * 31
    }

    fn no_debounce() -> SchedulerSettings {
        SchedulerSettings {
            policy: Policy {
                debounce: Duration::ZERO,
                ..Policy::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ramp_scales_up_after_debounce() {
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), SchedulerSettings::default(), &["r1"]);
        let now = ingest_ramp(&scheduler, "r1");

        let first = scheduler.run_tick(now).await;
        assert_eq!(first.actions, 0);
        let report = scheduler.latest("r1").unwrap();
        let forecast = report.forecast.unwrap();
        assert!(forecast.confidence > 0.5, "confidence was {}", forecast.confidence);
        assert!(report.action.unwrap().is_no_op());
        assert_eq!(report.state, "watching");

        let second = scheduler.run_tick(now + 120).await;
        assert_eq!(second.actions, 1);
        assert_eq!(second.succeeded, 1);

        let report = scheduler.latest("r1").unwrap();
        let action = report.action.unwrap();
        assert_eq!(action.kind, ActionKind::ScaleUp);
        assert!(action.confidence > 0.5);
        let outcome = report.outcome.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(provider.call_count(Operation::Resize).await, 1);

        let r1 = scheduler.registry().get("r1").unwrap();
        assert_eq!(r1.spec.instance_class, "ecs.c6.xlarge");
        assert!(matches!(
            scheduler.engine().state("r1"),
            ResourceState::Cooldown { .. }
        ));
    }

    #[tokio::test]
    async fn test_silent_resource_scaled_once() {
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), SchedulerSettings::default(), &["r1"]);
        let now = ingest_ramp(&scheduler, "r1");

        for k in 0..40 {
            scheduler.run_tick(now + 60 * k).await;
        }

        assert_eq!(provider.call_count(Operation::Resize).await, 1);
        assert_eq!(
            scheduler.registry().get("r1").unwrap().spec.instance_class,
            "ecs.c6.xlarge"
        );
        let report = scheduler.latest("r1").unwrap();
        let action = report.action.unwrap();
        assert!(action.is_no_op());
        assert!(action.reason.starts_with("stale samples"), "reason: {}", action.reason);
    }

    #[tokio::test]
    async fn test_stale_samples_skip_evaluation() {
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), no_debounce(), &["r1"]);
        let newest = ingest_ramp(&scheduler, "r1");

        let summary = scheduler.run_tick(newest + 3600).await;
        assert_eq!(summary.forecasts, 0);
        assert_eq!(summary.actions, 0);
        assert_eq!(summary.errors, 0);

        let report = scheduler.latest("r1").unwrap();
        assert!(report.forecast.is_none());
        assert_eq!(
            report.action.unwrap().reason,
            format!("stale samples: newest at {}", newest)
        );
        assert_eq!(report.state, "stable");
        assert_eq!(provider.calls().await.len(), 0);
    }

    #[tokio::test]
    async fn test_only_samples_after_settled_action_count() {
        let settings = SchedulerSettings {
            loop_config: LoopConfig {
                stale_after: Some(Duration::from_secs(3600)),
                ..LoopConfig::default()
            },
            policy: Policy {
                debounce: Duration::ZERO,
                cooldown_scale: Duration::from_secs(60),
                ..Policy::default()
            },
            ..Default::default()
        };
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), settings, &["r1"]);
        let now = ingest_ramp(&scheduler, "r1");

        assert_eq!(scheduler.run_tick(now).await.actions, 1);

        // Cooldown is over but the ramp predates the resize
        for t in [now + 120, now + 240] {
            let summary = scheduler.run_tick(t).await;
            assert_eq!(summary.actions, 0);
        }
        let report = scheduler.latest("r1").unwrap();
        assert_eq!(report.action.unwrap().reason, "within thresholds");
        assert_eq!(report.state, "stable");
        assert_eq!(provider.call_count(Operation::Resize).await, 1);

        for t in [now + 300, now + 360, now + 420] {
            scheduler
                .ingest(Sample {
                    resource_id: "r1".to_string(),
                    timestamp: t,
                    cpu_pct: 95.0,
                    mem_pct: 50.0,
                    disk_pct: 40.0,
                    net_in_bytes: 0,
                    net_out_bytes: 0,
                })
                .unwrap();
        }
        let summary = scheduler.run_tick(now + 420).await;
        assert_eq!(summary.actions, 1);
        assert_eq!(provider.call_count(Operation::Resize).await, 2);
        assert_eq!(
            scheduler.registry().get("r1").unwrap().spec.instance_class,
            "ecs.c6.2xlarge"
        );
    }

    #[tokio::test]
    async fn test_deregister_drops_all_state() {
        let (scheduler, _) = scheduler(SimulatedProvider::new(), SchedulerSettings::default(), &["r1", "r2"]);
        let now = ingest_ramp(&scheduler, "r1");
        scheduler.run_tick(now).await;
        assert_eq!(scheduler.engine().state("r1").name(), "watching");

        let removed = scheduler.deregister("r1").unwrap();
        assert_eq!(removed.id, "r1");
        assert!(scheduler.latest("r1").is_none());
        assert!(scheduler.store().latest("r1").is_none());
        assert_eq!(scheduler.engine().state("r1").name(), "stable");
        assert_eq!(scheduler.reports().len(), 1);
        assert!(matches!(
            scheduler.deregister("r1"),
            Err(SchedulerError::UnknownResource(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submission_rejected_while_in_flight() {
        let (scheduler, _provider) = scheduler(
            SimulatedProvider::new().with_latency(Duration::from_millis(500)),
            SchedulerSettings::default(),
            &["r1"],
        );
        let orchestrator = scheduler.orchestrator();
        let action = |id: &str| Action {
            id: id.to_string(),
            resource_id: "r1".to_string(),
            kind: ActionKind::ScaleUp,
            target_spec: Some(ResourceSpec {
                instance_class: "ecs.c6.xlarge".to_string(),
                cpu_cores: 4,
                memory_gb: 8.0,
                storage_gb: 40.0,
                attachments: vec![],
            }),
            monthly_cost_delta: 230.4,
            confidence: 0.9,
            reason: "test".to_string(),
            created_at: T0,
        };

        let (first, second) = tokio::join!(
            orchestrator.submit(action("a-1")),
            orchestrator.submit(action("a-2"))
        );
        assert_eq!(first.unwrap().status, OutcomeStatus::Succeeded);
        match second {
            Err(SchedulerError::ActionRejected { in_flight, .. }) => assert_eq!(in_flight, "a-1"),
            other => panic!("expected ActionRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_resource_does_not_block_others() {
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), no_debounce(), &["good", "lost"]);
        // The provider no longer knows this instance, so its resize fails fatally
        scheduler
            .registry()
            .update("lost", |r| r.instance_id = "i-missing".to_string())
            .unwrap();
        let now = ingest_ramp(&scheduler, "good");
        ingest_ramp(&scheduler, "lost");

        let summary = scheduler.run_tick(now).await;
        assert_eq!(summary.resources, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let good = scheduler.latest("good").unwrap().outcome.unwrap();
        assert_eq!(good.status, OutcomeStatus::Succeeded);
        let lost = scheduler.latest("lost").unwrap().outcome.unwrap();
        assert_eq!(lost.status, OutcomeStatus::Failed);
        assert!(lost.error.unwrap().contains("not found"));

        assert_eq!(provider.call_count(Operation::Resize).await, 2);
        assert_eq!(
            scheduler.registry().get("lost").unwrap().spec.instance_class,
            "ecs.c6.large"
        );
        let health = scheduler.health().health().await;
        assert_eq!(
            health.components[components::ORCHESTRATOR].status,
            crate::health::ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_insufficient_history_falls_back_to_thresholds() {
        let (scheduler, provider) = scheduler(SimulatedProvider::new(), no_debounce(), &["r1"]);
        for i in 0..5 {
            scheduler
                .ingest(Sample {
                    resource_id: "r1".to_string(),
                    timestamp: T0 + i * 60,
                    cpu_pct: 50.0,
                    mem_pct: 50.0,
                    disk_pct: 20.0,
                    net_in_bytes: 0,
                    net_out_bytes: 0,
                })
                .unwrap();
        }

        let summary = scheduler.run_tick(T0 + 240).await;
        assert_eq!(summary.forecasts, 0);
        assert_eq!(summary.errors, 0);
        let report = scheduler.latest("r1").unwrap();
        assert!(report.forecast.is_none());
        assert!(report.action.unwrap().is_no_op());
        assert_eq!(provider.calls().await.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_action_retrying_and_keeps_slot() {
        let settings = SchedulerSettings {
            loop_config: LoopConfig {
                tick_deadline: Some(Duration::from_secs(1)),
                ..LoopConfig::default()
            },
            ..no_debounce()
        };
        let (scheduler, provider) = scheduler(
            SimulatedProvider::new().with_latency(Duration::from_secs(10)),
            settings,
            &["r1"],
        );
        let now = ingest_ramp(&scheduler, "r1");

        let summary = scheduler.run_tick(now).await;
        assert_eq!(summary.retrying, 1);
        let outcome = scheduler.latest("r1").unwrap().outcome.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Retrying);
        assert!(scheduler.orchestrator().is_in_flight("r1"));

        // The provider call finishes in the background
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!scheduler.orchestrator().is_in_flight("r1"));

        scheduler.run_tick(now + 60).await;
        let report = scheduler.latest("r1").unwrap();
        assert_eq!(report.outcome.unwrap().status, OutcomeStatus::Succeeded);
        assert!(report.action.unwrap().is_no_op());
        assert_eq!(report.state, "cooldown");
        assert_eq!(provider.call_count(Operation::Resize).await, 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_and_stale_samples() {
        let (scheduler, _) = scheduler(SimulatedProvider::new(), SchedulerSettings::default(), &["r1"]);
        let sample = |id: &str, ts: i64| Sample {
            resource_id: id.to_string(),
            timestamp: ts,
            cpu_pct: 10.0,
            mem_pct: 10.0,
            disk_pct: 10.0,
            net_in_bytes: 0,
            net_out_bytes: 0,
        };

        assert!(matches!(
            scheduler.ingest(sample("ghost", T0)),
            Err(SchedulerError::UnknownResource(_))
        ));
        scheduler.ingest(sample("r1", T0)).unwrap();
        assert!(matches!(
            scheduler.ingest(sample("r1", T0 - 1)),
            Err(SchedulerError::InvalidSample { .. })
        ));
    }

    #[tokio::test]
    async fn test_pricing_refreshed_on_schedule() {
        let provider = SimulatedProvider::new().with_pricing(vec![crate::models::PricingEntry {
            class: "ecs.c6.large".to_string(),
            hourly_rate: 0.25,
            cpu_cores: Some(2),
            memory_gb: Some(4.0),
        }]);
        let settings = SchedulerSettings {
            loop_config: LoopConfig {
                pricing_refresh_ticks: 2,
                ..LoopConfig::default()
            },
            ..Default::default()
        };
        let (scheduler, provider) = scheduler(provider, settings, &[]);

        scheduler.run_tick(T0).await;
        assert_eq!(provider.call_count(Operation::GetPricing).await, 0);
        scheduler.run_tick(T0 + 60).await;
        assert_eq!(provider.call_count(Operation::GetPricing).await, 1);
        assert_eq!(scheduler.pricing().rate("ecs.c6.large").unwrap(), 0.25);
    }

    #[tokio::test]
    async fn test_cost_report_includes_projected_savings() {
        let (scheduler, _) = scheduler(SimulatedProvider::new(), SchedulerSettings::default(), &["r1", "r2"]);
        scheduler.store_report(ResourceReport {
            resource_id: "r2".to_string(),
            tick: 1,
            evaluated_at: T0,
            forecast: None,
            action: Some(Action {
                id: "a-1".to_string(),
                resource_id: "r2".to_string(),
                kind: ActionKind::ScaleDown,
                target_spec: None,
                monthly_cost_delta: -115.2,
                confidence: 0.8,
                reason: "underused".to_string(),
                created_at: T0,
            }),
            outcome: None,
            error: None,
            state: "action_pending".to_string(),
        });

        let report = scheduler.cost_report();
        assert_eq!(report.len(), 2);
        assert!((report[0].monthly_cost - 230.4).abs() < 1e-9);
        assert_eq!(report[0].projected_savings, 0.0);
        assert!((report[1].projected_savings - 115.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_action_recorded_in_history() {
        let provider = SimulatedProvider::new();
        provider.fail_next(
            Operation::Resize,
            ProviderError::Fatal("quota exceeded".to_string()),
            1,
        );
        let (scheduler, _) = scheduler(provider, no_debounce(), &["r1"]);
        let now = ingest_ramp(&scheduler, "r1");

        let summary = scheduler.run_tick(now).await;
        assert_eq!(summary.failed, 1);
        let history = scheduler.orchestrator().history("r1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OutcomeStatus::Failed);
        // A failed action still starts the cooldown
        assert!(matches!(
            scheduler.engine().state("r1"),
            ResourceState::Cooldown { .. }
        ));
    }
}
