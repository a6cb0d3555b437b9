//! Action orchestrator
//!
//! Executes actions against a cloud provider:
//! - At most one in-flight action per resource
//! - Transient provider errors retried with bounded exponential backoff
//! - Capped concurrent provider calls (admission control)
//! - Registry updated only after the provider confirmed every step
//! - Terminal outcomes published on a channel for the scheduler loop

mod http;
mod memory;
mod provider;
mod retry;

pub use http::{HttpProvider, IDEMPOTENCY_HEADER};
pub use memory::{Operation, ProviderCall, SimulatedProvider};
pub use provider::{idempotency_key, CloudProvider, ProviderResult, Step};
pub use retry::RetryPolicy;

use crate::cost::PricingTable;
use crate::error::{ProviderError, SchedulerError, SchedulerResult};
use crate::models::{Action, ActionKind, ActionOutcome, OutcomeStatus, Resource, ResourceStatus};
use crate::observability::SchedulerMetrics;
use crate::registry::ResourceRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Resolved outcomes kept per resource
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Maximum concurrent provider calls across all resources
    pub max_concurrent_calls: usize,
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrent_calls: 4,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Progress of an in-flight action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Running,
    /// Still running past the tick deadline
    Overdue,
    /// Its driver was dropped before resolution; waiting to be resumed
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightAction {
    pub action: Action,
    pub state: SlotState,
    pub submitted_at: i64,
}

/// Per-kind outcome counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Aggregated action statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
    /// succeeded / resolved, 0 when nothing resolved yet
    pub success_rate: f64,
    pub by_kind: BTreeMap<String, KindStats>,
}

/// What a successful execution changed provider-side
enum Applied {
    Resized,
    Migrated { instance_id: String },
}

/// Marks the slot stalled if the driving future is dropped mid-flight
struct StallGuard<'a> {
    in_flight: &'a DashMap<String, InFlightAction>,
    resource_id: &'a str,
    armed: bool,
}

impl Drop for StallGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(mut slot) = self.in_flight.get_mut(self.resource_id) {
            slot.state = SlotState::Stalled;
            warn!(
                resource_id = %self.resource_id,
                action_id = %slot.action.id,
                "Action driver dropped before resolution, slot kept"
            );
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn CloudProvider>,
    registry: Arc<ResourceRegistry>,
    pricing: Arc<PricingTable>,
    config: OrchestratorConfig,
    permits: Semaphore,
    in_flight: DashMap<String, InFlightAction>,
    stats: DashMap<ActionKind, KindStats>,
    history: DashMap<String, VecDeque<ActionOutcome>>,
    outcomes: mpsc::UnboundedSender<ActionOutcome>,
    metrics: SchedulerMetrics,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        registry: Arc<ResourceRegistry>,
        pricing: Arc<PricingTable>,
        config: OrchestratorConfig,
        outcomes: mpsc::UnboundedSender<ActionOutcome>,
    ) -> Self {
        Self {
            provider,
            registry,
            pricing,
            permits: Semaphore::new(config.max_concurrent_calls.max(1)),
            config,
            in_flight: DashMap::new(),
            stats: DashMap::new(),
            history: DashMap::new(),
            outcomes,
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Execute an action and wait for its terminal outcome
    ///
    /// Fails fast with `ActionRejected` while another action for the same
    /// resource is in flight. A no-op resolves immediately without touching
    /// the provider.
    pub async fn submit(&self, action: Action) -> SchedulerResult<ActionOutcome> {
        if action.is_no_op() {
            return Ok(ActionOutcome {
                action_id: action.id,
                resource_id: action.resource_id,
                kind: ActionKind::NoOp,
                status: OutcomeStatus::Succeeded,
                attempts: 0,
                error: None,
                resolved_at: Some(chrono::Utc::now().timestamp()),
            });
        }

        let resource = self
            .registry
            .get(&action.resource_id)
            .ok_or_else(|| SchedulerError::UnknownResource(action.resource_id.clone()))?;

        match self.in_flight.entry(action.resource_id.clone()) {
            Entry::Occupied(existing) => {
                return Err(SchedulerError::ActionRejected {
                    resource_id: action.resource_id.clone(),
                    in_flight: existing.get().action.id.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlightAction {
                    action: action.clone(),
                    state: SlotState::Running,
                    submitted_at: chrono::Utc::now().timestamp(),
                });
            }
        }
        self.metrics.set_actions_in_flight(self.in_flight.len() as i64);

        info!(
            resource_id = %action.resource_id,
            action_id = %action.id,
            kind = %action.kind,
            provider = self.provider.name(),
            "Executing action"
        );
        Ok(self.drive(action, resource).await)
    }

    /// Re-drive a stalled action with its original idempotency keys
    pub async fn resume(&self, resource_id: &str) -> Option<ActionOutcome> {
        let action = {
            let mut slot = self.in_flight.get_mut(resource_id)?;
            if slot.state != SlotState::Stalled {
                return None;
            }
            slot.state = SlotState::Running;
            slot.action.clone()
        };

        info!(
            resource_id = %resource_id,
            action_id = %action.id,
            "Resuming stalled action"
        );
        match self.registry.get(resource_id) {
            Some(resource) => Some(self.drive(action, resource).await),
            None => {
                let err = ProviderError::Fatal(format!("resource {} no longer tracked", resource_id));
                Some(self.resolve(&action, Err(err), 0))
            }
        }
    }

    /// Resources whose action is waiting to be resumed
    pub fn stalled(&self) -> Vec<String> {
        self.in_flight
            .iter()
            .filter(|slot| slot.state == SlotState::Stalled)
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Flag a running action as past its tick deadline
    pub fn mark_overdue(&self, resource_id: &str) {
        if let Some(mut slot) = self.in_flight.get_mut(resource_id) {
            if slot.state == SlotState::Running {
                slot.state = SlotState::Overdue;
            }
        }
    }

    pub fn is_in_flight(&self, resource_id: &str) -> bool {
        self.in_flight.contains_key(resource_id)
    }

    pub fn in_flight(&self) -> Vec<InFlightAction> {
        let mut actions: Vec<InFlightAction> =
            self.in_flight.iter().map(|slot| slot.value().clone()).collect();
        actions.sort_by(|a, b| a.action.resource_id.cmp(&b.action.resource_id));
        actions
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolved outcomes for a resource, oldest first
    pub fn history(&self, resource_id: &str) -> Vec<ActionOutcome> {
        self.history
            .get(resource_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> ActionStats {
        let by_kind: BTreeMap<String, KindStats> = self
            .stats
            .iter()
            .map(|entry| (entry.key().as_str().to_string(), entry.value().clone()))
            .collect();
        let total = by_kind.values().map(|s| s.total).sum();
        let succeeded: u64 = by_kind.values().map(|s| s.succeeded).sum();
        let failed: u64 = by_kind.values().map(|s| s.failed).sum();
        let resolved = succeeded + failed;
        ActionStats {
            total,
            succeeded,
            failed,
            in_flight: self.in_flight.len(),
            success_rate: if resolved > 0 {
                succeeded as f64 / resolved as f64
            } else {
                0.0
            },
            by_kind,
        }
    }

    /// Fetch current prices from the provider into the shared table
    pub async fn refresh_pricing(&self) -> SchedulerResult<usize> {
        let provider = self.provider.as_ref();
        let (result, _) = self.call("get_pricing", move || provider.get_pricing()).await;
        let entries = result?;
        let count = entries.len();
        self.pricing.merge(entries);
        debug!(entries = count, "Pricing table refreshed");
        Ok(count)
    }

    async fn drive(&self, action: Action, resource: Resource) -> ActionOutcome {
        let mut guard = StallGuard {
            in_flight: &self.in_flight,
            resource_id: &action.resource_id,
            armed: true,
        };
        let (result, attempts) = self.execute(&action, &resource).await;
        guard.armed = false;
        drop(guard);
        self.resolve(&action, result, attempts)
    }

    /// Run the provider steps for an action, halting at the first failure
    async fn execute(&self, action: &Action, resource: &Resource) -> (ProviderResult<Applied>, u32) {
        let Some(target) = action.target_spec.as_ref() else {
            let err = ProviderError::Fatal(format!("{} action has no target spec", action.kind));
            return (Err(err), 0);
        };
        let provider = self.provider.as_ref();
        let current = resource.instance_id.as_str();

        match action.kind {
            ActionKind::ScaleUp | ActionKind::ScaleDown | ActionKind::OptimizeStorage => {
                let key = idempotency_key(&action.id, Step::Resize);
                let key = key.as_str();
                let (result, attempts) = self
                    .call(Step::Resize.as_str(), move || provider.resize(current, target, key))
                    .await;
                (result.map(|_| Applied::Resized), attempts)
            }
            ActionKind::Migrate => {
                let region = resource.region.as_deref();
                let create_key = idempotency_key(&action.id, Step::Create);
                let create_key = create_key.as_str();
                let (created, mut attempts) = self
                    .call(Step::Create.as_str(), move || {
                        provider.create(target, region, create_key)
                    })
                    .await;
                let new_instance = match created {
                    Ok(id) => id,
                    Err(e) => return (Err(e), attempts),
                };

                let migrate_key = idempotency_key(&action.id, Step::Migrate);
                let migrate_key = migrate_key.as_str();
                let to = new_instance.as_str();
                let (migrated, n) = self
                    .call(Step::Migrate.as_str(), move || {
                        provider.migrate(current, to, migrate_key)
                    })
                    .await;
                attempts += n;
                if let Err(e) = migrated {
                    self.rollback(action, &new_instance).await;
                    return (Err(e), attempts);
                }

                let terminate_key = idempotency_key(&action.id, Step::Terminate);
                let terminate_key = terminate_key.as_str();
                let (terminated, n) = self
                    .call(Step::Terminate.as_str(), move || {
                        provider.terminate(current, terminate_key)
                    })
                    .await;
                attempts += n;
                match terminated {
                    Ok(()) => (
                        Ok(Applied::Migrated {
                            instance_id: new_instance,
                        }),
                        attempts,
                    ),
                    Err(e) => {
                        let err = match e {
                            ProviderError::Transient(msg) | ProviderError::Fatal(msg) => {
                                ProviderError::Fatal(format!(
                                    "old instance {} not terminated after migrating to {}: {}",
                                    current, new_instance, msg
                                ))
                            }
                        };
                        (Err(err), attempts)
                    }
                }
            }
            ActionKind::NoOp => (Ok(Applied::Resized), 0),
        }
    }

    /// Best-effort removal of an instance created by a failed migration
    async fn rollback(&self, action: &Action, instance_id: &str) {
        let key = idempotency_key(&action.id, Step::Rollback);
        if let Err(e) = self.provider.terminate(instance_id, &key).await {
            warn!(
                resource_id = %action.resource_id,
                action_id = %action.id,
                instance_id = %instance_id,
                error = %e,
                "Failed to clean up instance after aborted migration"
            );
        }
    }

    /// One provider operation under admission control and retry
    async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> (ProviderResult<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let permits = &self.permits;
        let metrics = &self.metrics;
        let (result, attempts) = self
            .config
            .retry
            .run(operation, |_| {
                let request = op();
                async move {
                    let _permit = permits.acquire().await.map_err(|_| {
                        ProviderError::Transient("admission control closed".to_string())
                    })?;
                    let started = Instant::now();
                    let result = request.await;
                    metrics.observe_provider_call(started.elapsed().as_secs_f64());
                    result
                }
            })
            .await;
        if attempts > 1 {
            self.metrics.inc_provider_retries(u64::from(attempts - 1));
        }
        (result, attempts)
    }

    /// Record a terminal outcome and release the slot
    fn resolve(&self, action: &Action, result: ProviderResult<Applied>, attempts: u32) -> ActionOutcome {
        let (status, error) = match result {
            Ok(applied) => {
                self.apply(action, applied);
                (OutcomeStatus::Succeeded, None)
            }
            Err(e) => (OutcomeStatus::Failed, Some(e.to_string())),
        };

        let outcome = ActionOutcome {
            action_id: action.id.clone(),
            resource_id: action.resource_id.clone(),
            kind: action.kind,
            status,
            attempts,
            error,
            resolved_at: Some(chrono::Utc::now().timestamp()),
        };

        {
            let mut stats = self.stats.entry(action.kind).or_default();
            stats.total += 1;
            match status {
                OutcomeStatus::Succeeded => stats.succeeded += 1,
                _ => stats.failed += 1,
            }
        }
        {
            let mut history = self.history.entry(action.resource_id.clone()).or_default();
            history.push_back(outcome.clone());
            while history.len() > self.config.history_limit {
                history.pop_front();
            }
        }

        self.in_flight.remove(&action.resource_id);
        self.metrics.set_actions_in_flight(self.in_flight.len() as i64);
        self.metrics.inc_action_outcome(action.kind.as_str(), status);

        if self.outcomes.send(outcome.clone()).is_err() {
            debug!(action_id = %action.id, "Outcome receiver dropped");
        }
        outcome
    }

    /// Write provider-confirmed changes into the registry
    fn apply(&self, action: &Action, applied: Applied) {
        let Some(target) = action.target_spec.clone() else {
            return;
        };
        let hourly_cost = self.pricing.hourly_cost(&target).ok();
        let result = self.registry.update(&action.resource_id, |resource| {
            if let Applied::Migrated { instance_id } = applied {
                resource.instance_id = instance_id;
                resource.status = ResourceStatus::Running;
            }
            if let Some(cost) = hourly_cost {
                resource.hourly_cost = cost;
            }
            resource.spec = target;
        });
        if let Err(e) = result {
            warn!(
                resource_id = %action.resource_id,
                action_id = %action.id,
                error = %e,
                "Action succeeded for a resource no longer tracked"
            );
        }
    }
}
