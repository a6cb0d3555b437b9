//! Decision engine
//!
//! Turns recent samples and a forecast into at most one action per resource,
//! gated by a per-resource state machine (debounce, pending, cooldown) and
//! by the confidence-weighted monthly benefit of the action.

mod policy;
mod state;

pub use policy::Policy;
pub use state::ResourceState;

use crate::cost::{self, PricingTable};
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{
    Action, ActionKind, ActionOutcome, AttachmentKind, Forecast, Resource, ResourceSpec,
    ResourceStatus, Sample,
};
use crate::timeseries::secs;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deviations closer than this are treated as equal
const DEVIATION_EPSILON: f64 = 1e-9;

/// Minimum samples inside the sustain window for a sustained condition
const MIN_SUSTAINED_SAMPLES: usize = 2;

/// Growth factor applied to storage by `optimize_storage`
const STORAGE_GROWTH: f64 = 1.5;

/// A condition that would justify an action
#[derive(Debug, Clone)]
struct Trigger {
    kind: ActionKind,
    reason: String,
    /// How far past its threshold the resource is, as a fraction of 100%
    pressure: f64,
}

enum Evaluation {
    Quiet,
    Ambiguous(String),
    Triggered(Trigger),
}

/// Per-resource decision engine
pub struct DecisionEngine {
    states: DashMap<String, ResourceState>,
    pricing: Arc<PricingTable>,
}

impl DecisionEngine {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self {
            states: DashMap::new(),
            pricing,
        }
    }

    pub fn pricing(&self) -> &Arc<PricingTable> {
        &self.pricing
    }

    /// Current state of a resource (Stable when never seen)
    pub fn state(&self, resource_id: &str) -> ResourceState {
        self.states
            .get(resource_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn forget(&self, resource_id: &str) {
        self.states.remove(resource_id);
    }

    /// Decide what to do with `resource` at `now`
    ///
    /// Returns a no-op action whenever nothing should be done, with the
    /// reason recorded. Fails only when the policy is invalid.
    pub fn decide(
        &self,
        resource: &Resource,
        recent: &[Sample],
        forecast: Option<&Forecast>,
        policy: &Policy,
        now: i64,
    ) -> SchedulerResult<Action> {
        policy.validate()?;

        let mut slot = self.states.entry(resource.id.clone()).or_default();
        let state = std::mem::take(slot.value_mut()).expire_cooldown(now);

        let blocked = match &state {
            ResourceState::ActionPending { action_id, kind, .. } => {
                Some(format!("{} action {} pending", kind, action_id))
            }
            ResourceState::Cooldown { until } => Some(format!("cooling down until {}", until)),
            _ => None,
        };
        if let Some(reason) = blocked {
            *slot = state;
            return Ok(Action::no_op(&resource.id, reason, now));
        }

        let trigger = match evaluate(resource, recent, forecast, policy) {
            Evaluation::Quiet => {
                *slot = state.observe(None, now);
                return Ok(Action::no_op(&resource.id, "within thresholds", now));
            }
            Evaluation::Ambiguous(reason) => {
                warn!(
                    event = "decision_ambiguous",
                    resource_id = %resource.id,
                    reason = %reason,
                    "Conflicting scale conditions with equal deviation"
                );
                *slot = state.observe(None, now);
                return Ok(Action::no_op(&resource.id, reason, now));
            }
            Evaluation::Triggered(trigger) => trigger,
        };

        let state = state.observe(Some(trigger.kind), now);
        if !state.debounce_elapsed(now, policy.debounce) {
            let reason = match &state {
                ResourceState::Watching { since, .. } => {
                    format!("watching {} since {}: {}", trigger.kind, since, trigger.reason)
                }
                _ => trigger.reason.clone(),
            };
            *slot = state;
            return Ok(Action::no_op(&resource.id, reason, now));
        }

        let action = match self.plan(resource, &trigger, recent, forecast, policy, now) {
            Ok(action) => action,
            Err(SchedulerError::UnknownPricingClass(class)) => {
                *slot = state;
                return Ok(Action::no_op(
                    &resource.id,
                    format!("unknown pricing class: {}", class),
                    now,
                ));
            }
            Err(e) => {
                *slot = state;
                return Err(e);
            }
        };

        if action.is_no_op() {
            *slot = state;
        } else {
            debug!(
                resource_id = %resource.id,
                action_id = %action.id,
                kind = %action.kind,
                "Condition debounced, action emitted"
            );
            *slot = ResourceState::ActionPending {
                action_id: action.id.clone(),
                kind: action.kind,
                since: now,
            };
        }
        Ok(action)
    }

    /// Move a pending resource into cooldown after a terminal outcome
    ///
    /// Returns false when the outcome is not terminal or does not match the
    /// pending action.
    pub fn acknowledge(&self, outcome: &ActionOutcome, policy: &Policy, now: i64) -> bool {
        if !outcome.status.is_terminal() {
            return false;
        }
        let Some(mut slot) = self.states.get_mut(&outcome.resource_id) else {
            return false;
        };
        let before = std::mem::take(slot.value_mut());
        let after = before
            .clone()
            .acknowledge(&outcome.action_id, now, policy.cooldown_for(outcome.kind));
        let changed = after != before;
        *slot = after;
        changed
    }

    /// Return a pending resource to Stable when its action was never accepted
    pub fn release(&self, resource_id: &str, action_id: &str) {
        if let Some(mut slot) = self.states.get_mut(resource_id) {
            if matches!(slot.value(), ResourceState::ActionPending { action_id: pending, .. } if pending == action_id)
            {
                *slot = ResourceState::Stable;
            }
        }
    }

    /// Build the concrete action for a debounced trigger
    fn plan(
        &self,
        resource: &Resource,
        trigger: &Trigger,
        recent: &[Sample],
        forecast: Option<&Forecast>,
        policy: &Policy,
        now: i64,
    ) -> SchedulerResult<Action> {
        let confidence = match (trigger.kind, forecast) {
            (ActionKind::Migrate, _) | (_, None) => policy.threshold_only_confidence,
            (_, Some(f)) => f.confidence,
        };

        let target = match trigger.kind {
            ActionKind::ScaleUp | ActionKind::ScaleDown => {
                let (peak_cpu, peak_mem) = peak_utilization(recent, forecast);
                match self.resize_target(
                    &resource.spec,
                    peak_cpu,
                    peak_mem,
                    policy.target_utilization,
                    trigger.kind == ActionKind::ScaleUp,
                )? {
                    Some(spec) => spec,
                    None => {
                        let reason = format!(
                            "{}: no {} instance class fits",
                            trigger.reason,
                            if trigger.kind == ActionKind::ScaleUp { "larger" } else { "cheaper" }
                        );
                        return Ok(Action::no_op(&resource.id, reason, now));
                    }
                }
            }
            ActionKind::Migrate => resource.spec.clone(),
            ActionKind::OptimizeStorage => grown_storage(&resource.spec),
            ActionKind::NoOp => return Ok(Action::no_op(&resource.id, trigger.reason.clone(), now)),
        };

        let current_monthly = cost::estimate(&resource.spec, &self.pricing)?;
        let monthly_cost_delta = cost::delta(&resource.spec, &target, &self.pricing)?;
        let benefit = match trigger.kind {
            ActionKind::ScaleDown => confidence * -monthly_cost_delta,
            _ => confidence * current_monthly * trigger.pressure,
        };

        if confidence < policy.min_confidence {
            return Ok(Action::no_op(
                &resource.id,
                format!(
                    "{}: confidence {:.2} below minimum {:.2}",
                    trigger.reason, confidence, policy.min_confidence
                ),
                now,
            ));
        }
        if benefit < policy.min_benefit {
            return Ok(Action::no_op(
                &resource.id,
                format!(
                    "{}: benefit {:.2}/month below minimum {:.2}",
                    trigger.reason, benefit, policy.min_benefit
                ),
                now,
            ));
        }

        Ok(Action {
            id: uuid::Uuid::new_v4().to_string(),
            resource_id: resource.id.clone(),
            kind: trigger.kind,
            target_spec: Some(target),
            monthly_cost_delta,
            confidence,
            reason: trigger.reason.clone(),
            created_at: now,
        })
    }

    /// Cheapest instance class sized for `target` utilization
    ///
    /// Scale-ups only consider classes pricier than the current one and
    /// scale-downs only cheaper ones.
    fn resize_target(
        &self,
        spec: &ResourceSpec,
        peak_cpu: f64,
        peak_mem: f64,
        target: f64,
        grow: bool,
    ) -> SchedulerResult<Option<ResourceSpec>> {
        let current_rate = self.pricing.rate(&spec.instance_class)?;
        let desired_cores = ((spec.cpu_cores as f64 * peak_cpu / target).ceil() as u32).max(1);
        let desired_mem = spec.memory_gb * peak_mem / target;

        let chosen = self.pricing.instance_classes().into_iter().find(|entry| {
            let fits = entry.cpu_cores.unwrap_or(0) >= desired_cores
                && entry.memory_gb.unwrap_or(0.0) >= desired_mem;
            let direction = if grow {
                entry.hourly_rate > current_rate
            } else {
                entry.hourly_rate < current_rate
            };
            fits && direction
        });

        Ok(chosen.map(|entry| ResourceSpec {
            instance_class: entry.class,
            cpu_cores: entry.cpu_cores.unwrap_or(spec.cpu_cores),
            memory_gb: entry.memory_gb.unwrap_or(spec.memory_gb),
            ..spec.clone()
        }))
    }
}

/// Find the condition, if any, that applies to the resource right now
fn evaluate(
    resource: &Resource,
    recent: &[Sample],
    forecast: Option<&Forecast>,
    policy: &Policy,
) -> Evaluation {
    if resource.status == ResourceStatus::Degraded {
        return Evaluation::Triggered(Trigger {
            kind: ActionKind::Migrate,
            reason: "resource degraded".to_string(),
            pressure: 1.0,
        });
    }

    let latest = recent.last();
    let metrics: [(&str, fn(&Sample) -> f64, Option<f64>); 2] = [
        ("cpu", cpu_of, forecast.map(|f| f.peak_cpu())),
        ("memory", mem_of, forecast.map(|f| f.peak_mem())),
    ];

    // (deviation from target, reason, pressure)
    let mut up: Option<(f64, String, f64)> = None;
    let mut down: Option<(f64, String)> = None;
    for (name, value, forecast_peak) in metrics {
        let current = latest.map(value);
        let sustained_high = sustained(recent, policy.sustain, |s| value(s) > policy.high_threshold);
        let forecast_high = forecast_peak.is_some_and(|p| p > policy.high_threshold);
        if sustained_high || forecast_high {
            let peak = current.unwrap_or(0.0).max(forecast_peak.unwrap_or(0.0));
            let deviation = peak - policy.target_utilization;
            let reason = match forecast_peak {
                Some(p) => format!(
                    "{} at {:.1}% (forecast peak {:.1}%) above {:.0}%",
                    name,
                    current.unwrap_or(0.0),
                    p,
                    policy.high_threshold
                ),
                None => format!(
                    "{} at {:.1}% above {:.0}%",
                    name,
                    current.unwrap_or(0.0),
                    policy.high_threshold
                ),
            };
            let pressure = ((peak - policy.high_threshold) / 100.0).max(0.0);
            if up.as_ref().map_or(true, |(d, _, _)| deviation > *d) {
                up = Some((deviation, reason, pressure));
            }
        }

        let sustained_low = sustained(recent, policy.sustain, |s| value(s) < policy.low_threshold);
        let forecast_low = forecast_peak.map_or(true, |p| p < policy.forecast_low_threshold);
        if sustained_low && forecast_low {
            let current = current.unwrap_or(0.0);
            let deviation = policy.target_utilization - current;
            let reason = format!(
                "{} at {:.1}% below {:.0}%",
                name, current, policy.low_threshold
            );
            if down.as_ref().map_or(true, |(d, _)| deviation > *d) {
                down = Some((deviation, reason));
            }
        }
    }

    let scale = match (up, down) {
        (Some((up_dev, up_reason, pressure)), Some((down_dev, down_reason))) => {
            if (up_dev - down_dev).abs() < DEVIATION_EPSILON {
                return Evaluation::Ambiguous(format!(
                    "ambiguous: {} and {} deviate equally from target",
                    up_reason, down_reason
                ));
            } else if up_dev > down_dev {
                Some(Trigger {
                    kind: ActionKind::ScaleUp,
                    reason: up_reason,
                    pressure,
                })
            } else {
                Some(Trigger {
                    kind: ActionKind::ScaleDown,
                    reason: down_reason,
                    pressure: 0.0,
                })
            }
        }
        (Some((_, reason, pressure)), None) => Some(Trigger {
            kind: ActionKind::ScaleUp,
            reason,
            pressure,
        }),
        (None, Some((_, reason))) => Some(Trigger {
            kind: ActionKind::ScaleDown,
            reason,
            pressure: 0.0,
        }),
        (None, None) => None,
    };
    if let Some(trigger) = scale {
        return Evaluation::Triggered(trigger);
    }

    if sustained(recent, policy.sustain, |s| s.disk_pct > policy.disk_high_threshold) {
        let disk = latest.map(|s| s.disk_pct).unwrap_or(0.0);
        return Evaluation::Triggered(Trigger {
            kind: ActionKind::OptimizeStorage,
            reason: format!(
                "disk at {:.1}% above {:.0}%",
                disk, policy.disk_high_threshold
            ),
            pressure: ((disk - policy.disk_high_threshold) / 100.0).max(0.0),
        });
    }

    Evaluation::Quiet
}

fn cpu_of(sample: &Sample) -> f64 {
    sample.cpu_pct
}

fn mem_of(sample: &Sample) -> f64 {
    sample.mem_pct
}

/// True when every sample within `sustain` of the newest one satisfies `pred`
fn sustained(recent: &[Sample], sustain: Duration, pred: impl Fn(&Sample) -> bool) -> bool {
    let Some(newest) = recent.last() else {
        return false;
    };
    let cutoff = newest.timestamp.saturating_sub(secs(sustain));
    let window: Vec<&Sample> = recent.iter().filter(|s| s.timestamp >= cutoff).collect();
    window.len() >= MIN_SUSTAINED_SAMPLES && window.into_iter().all(pred)
}

/// Highest of the latest observation and the forecast peak, per metric
fn peak_utilization(recent: &[Sample], forecast: Option<&Forecast>) -> (f64, f64) {
    let (cpu, mem) = recent
        .last()
        .map(|s| (s.cpu_pct, s.mem_pct))
        .unwrap_or((0.0, 0.0));
    match forecast {
        Some(f) => (cpu.max(f.peak_cpu()), mem.max(f.peak_mem())),
        None => (cpu, mem),
    }
}

fn grown_storage(spec: &ResourceSpec) -> ResourceSpec {
    let mut grown = spec.clone();
    grown.storage_gb *= STORAGE_GROWTH;
    for attachment in grown
        .attachments
        .iter_mut()
        .filter(|a| a.kind == AttachmentKind::Storage)
    {
        attachment.size_gb *= STORAGE_GROWTH;
    }
    grown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, ForecastPoint, OutcomeStatus, ResourceKind};

    const T0: i64 = 1_700_000_000;

    fn resource(class: &str, cores: u32, memory_gb: f64) -> Resource {
        Resource {
            id: "r1".to_string(),
            instance_id: "i-1".to_string(),
            kind: ResourceKind::Compute,
            spec: ResourceSpec {
                instance_class: class.to_string(),
                cpu_cores: cores,
                memory_gb,
                storage_gb: 100.0,
                attachments: vec![Attachment {
                    kind: AttachmentKind::Storage,
                    class: "disk.standard".to_string(),
                    size_gb: 100.0,
                }],
            },
            status: ResourceStatus::Running,
            region: None,
            hourly_cost: 0.0,
        }
    }

    fn samples(count: usize, cpu: f64, mem: f64, disk: f64) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample {
                resource_id: "r1".to_string(),
                timestamp: T0 + i as i64 * 60,
                cpu_pct: cpu,
                mem_pct: mem,
                disk_pct: disk,
                net_in_bytes: 0,
                net_out_bytes: 0,
            })
            .collect()
    }

    fn forecast(peak_cpu: f64, confidence: f64) -> Forecast {
        Forecast {
            resource_id: "r1".to_string(),
            generated_at: T0,
            horizon_secs: 900,
            points: vec![ForecastPoint {
                timestamp: T0 + 60,
                cpu_pct: peak_cpu,
                mem_pct: 50.0,
            }],
            confidence,
            sequence_weight: 0.5,
            regression_weight: 0.5,
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(Arc::new(PricingTable::builtin()))
    }

    fn outcome(action: &Action, status: OutcomeStatus) -> ActionOutcome {
        ActionOutcome {
            action_id: action.id.clone(),
            resource_id: action.resource_id.clone(),
            kind: action.kind,
            status,
            attempts: 1,
            error: None,
            resolved_at: Some(T0),
        }
    }

    #[test]
    fn test_sustained_high_cpu_scales_up_after_debounce() {
        let engine = engine();
        let policy = Policy::default();
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let now = recent[9].timestamp;

        let first = engine.decide(&r, &recent, None, &policy, now).unwrap();
        assert!(first.is_no_op());
        assert_eq!(engine.state("r1").name(), "watching");

        let early = engine.decide(&r, &recent, None, &policy, now + 119).unwrap();
        assert!(early.is_no_op(), "emitted before debounce: {:?}", early);

        let action = engine.decide(&r, &recent, None, &policy, now + 120).unwrap();
        assert_eq!(action.kind, ActionKind::ScaleUp);
        let target = action.target_spec.as_ref().unwrap();
        assert_eq!(target.instance_class, "ecs.c6.xlarge");
        assert_eq!(target.cpu_cores, 4);
        assert!((action.monthly_cost_delta - 230.4).abs() < 1e-6);
        assert_eq!(action.confidence, policy.threshold_only_confidence);

        // Exactly one action while pending
        let again = engine.decide(&r, &recent, None, &policy, now + 180).unwrap();
        assert!(again.is_no_op());
        assert!(again.reason.contains("pending"));
    }

    #[test]
    fn test_low_confidence_forecast_yields_no_op() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let f = forecast(97.0, 0.3);

        let action = engine
            .decide(&r, &recent, Some(&f), &policy, recent[9].timestamp)
            .unwrap();
        assert!(action.is_no_op());
        assert!(action.reason.contains("confidence"), "reason: {}", action.reason);
        assert_eq!(engine.state("r1").name(), "watching");
    }

    #[test]
    fn test_forecast_alone_triggers_scale_up() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 60.0, 50.0, 20.0);
        let f = forecast(92.0, 0.9);

        let action = engine
            .decide(&r, &recent, Some(&f), &policy, recent[9].timestamp)
            .unwrap();
        assert_eq!(action.kind, ActionKind::ScaleUp);
        assert_eq!(action.confidence, 0.9);
    }

    #[test]
    fn test_sustained_low_scales_down_unless_forecast_rises() {
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.xlarge", 4, 8.0);
        let recent = samples(10, 10.0, 10.0, 20.0);
        let now = recent[9].timestamp;

        let engine = engine();
        let action = engine.decide(&r, &recent, None, &policy, now).unwrap();
        assert_eq!(action.kind, ActionKind::ScaleDown);
        assert_eq!(action.target_spec.as_ref().unwrap().instance_class, "ecs.c6.large");
        assert!((action.monthly_cost_delta + 230.4).abs() < 1e-6);

        let engine = self::engine();
        let rising = forecast(50.0, 0.9);
        let action = engine.decide(&r, &recent, Some(&rising), &policy, now).unwrap();
        assert!(action.is_no_op());
        assert_eq!(engine.state("r1"), ResourceState::Stable);
    }

    #[test]
    fn test_tie_break_prefers_larger_deviation() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::from_secs(3600),
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        // cpu 95 deviates 40 above target, memory 10 deviates 45 below
        let recent = samples(10, 95.0, 10.0, 20.0);
        engine.decide(&r, &recent, None, &policy, recent[9].timestamp).unwrap();
        match engine.state("r1") {
            ResourceState::Watching { trigger, .. } => assert_eq!(trigger, ActionKind::ScaleDown),
            other => panic!("expected watching, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_deviation_is_ambiguous() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        // cpu 90 and memory 20 both deviate 35 from the 55% target
        let recent = samples(10, 90.0, 20.0, 20.0);
        let action = engine.decide(&r, &recent, None, &policy, recent[9].timestamp).unwrap();
        assert!(action.is_no_op());
        assert!(action.reason.starts_with("ambiguous"));
        assert_eq!(engine.state("r1"), ResourceState::Stable);
    }

    #[test]
    fn test_cooldown_after_acknowledgment() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let now = recent[9].timestamp;

        let action = engine.decide(&r, &recent, None, &policy, now).unwrap();
        assert_eq!(action.kind, ActionKind::ScaleUp);

        // Non-terminal outcomes do not move the state
        assert!(!engine.acknowledge(&outcome(&action, OutcomeStatus::Retrying), &policy, now + 10));
        assert!(engine.acknowledge(&outcome(&action, OutcomeStatus::Failed), &policy, now + 10));
        assert_eq!(engine.state("r1"), ResourceState::Cooldown { until: now + 310 });

        let quiet = engine.decide(&r, &recent, None, &policy, now + 309).unwrap();
        assert!(quiet.reason.starts_with("cooling down"));

        let next = engine.decide(&r, &recent, None, &policy, now + 310).unwrap();
        assert_eq!(next.kind, ActionKind::ScaleUp);
        assert_ne!(next.id, action.id);
    }

    #[test]
    fn test_release_returns_to_stable() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let action = engine.decide(&r, &recent, None, &policy, recent[9].timestamp).unwrap();

        engine.release("r1", "some-other-action");
        assert_eq!(engine.state("r1").name(), "action_pending");
        engine.release("r1", &action.id);
        assert_eq!(engine.state("r1"), ResourceState::Stable);
    }

    #[test]
    fn test_invalid_policy_fails() {
        let engine = engine();
        let policy = Policy {
            high_threshold: 20.0,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let result = engine.decide(&r, &samples(10, 95.0, 50.0, 20.0), None, &policy, T0);
        assert!(matches!(result, Err(SchedulerError::InvalidPolicy(_))));
    }

    #[test]
    fn test_unknown_pricing_class_forces_no_op() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("m5.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let action = engine.decide(&r, &recent, None, &policy, recent[9].timestamp).unwrap();
        assert!(action.is_no_op());
        assert!(action.reason.contains("unknown pricing class"), "reason: {}", action.reason);
    }

    #[test]
    fn test_degraded_resource_migrates_after_debounce() {
        let engine = engine();
        let policy = Policy::default();
        let mut r = resource("ecs.c6.large", 2, 4.0);
        r.status = ResourceStatus::Degraded;
        let recent = samples(10, 50.0, 50.0, 20.0);
        let now = recent[9].timestamp;

        assert!(engine.decide(&r, &recent, None, &policy, now).unwrap().is_no_op());
        let action = engine.decide(&r, &recent, None, &policy, now + 120).unwrap();
        assert_eq!(action.kind, ActionKind::Migrate);
        assert_eq!(action.target_spec.as_ref(), Some(&r.spec));
        assert_eq!(action.monthly_cost_delta, 0.0);
    }

    #[test]
    fn test_high_disk_grows_storage() {
        let engine = engine();
        let policy = Policy {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 50.0, 50.0, 95.0);
        let action = engine.decide(&r, &recent, None, &policy, recent[9].timestamp).unwrap();

        assert_eq!(action.kind, ActionKind::OptimizeStorage);
        let target = action.target_spec.unwrap();
        assert_eq!(target.storage_gb, 150.0);
        assert_eq!(target.attachments[0].size_gb, 150.0);
        assert!(action.monthly_cost_delta > 0.0);
    }

    #[test]
    fn test_extreme_durations_saturate() {
        let engine = engine();
        let policy = Policy {
            sustain: Duration::MAX,
            debounce: Duration::ZERO,
            cooldown_scale: Duration::MAX,
            ..Default::default()
        };
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 95.0, 50.0, 20.0);
        let now = recent[9].timestamp;

        let action = engine.decide(&r, &recent, None, &policy, now).unwrap();
        assert_eq!(action.kind, ActionKind::ScaleUp);
        assert!(engine.acknowledge(&outcome(&action, OutcomeStatus::Succeeded), &policy, now));
        assert_eq!(engine.state("r1"), ResourceState::Cooldown { until: i64::MAX });
    }

    #[test]
    fn test_quiet_resource_stays_stable() {
        let engine = engine();
        let r = resource("ecs.c6.large", 2, 4.0);
        let recent = samples(10, 50.0, 50.0, 20.0);
        let action = engine
            .decide(&r, &recent, None, &Policy::default(), recent[9].timestamp)
            .unwrap();
        assert!(action.is_no_op());
        assert_eq!(engine.state("r1"), ResourceState::Stable);
    }
}
