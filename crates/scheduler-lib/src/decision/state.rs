//! Per-resource decision state machine
//!
//! `Stable → Watching → ActionPending → Cooldown → Stable`. Every transition
//! is guarded by a timestamp supplied by the caller.

use crate::models::ActionKind;
use crate::timeseries::secs;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceState {
    /// No condition observed
    #[default]
    Stable,
    /// A condition for `trigger` has held since `since`
    Watching { since: i64, trigger: ActionKind },
    /// An action was emitted and awaits its outcome
    ActionPending {
        action_id: String,
        kind: ActionKind,
        since: i64,
    },
    /// Quiet period after an acknowledged action
    Cooldown { until: i64 },
}

impl ResourceState {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceState::Stable => "stable",
            ResourceState::Watching { .. } => "watching",
            ResourceState::ActionPending { .. } => "action_pending",
            ResourceState::Cooldown { .. } => "cooldown",
        }
    }

    /// Cooldown → Stable once `until` has passed
    pub fn expire_cooldown(self, now: i64) -> Self {
        match self {
            ResourceState::Cooldown { until } if now >= until => ResourceState::Stable,
            other => other,
        }
    }

    /// Stable/Watching given the trigger observed at `now`
    ///
    /// A new or changed trigger restarts the debounce clock; no trigger
    /// returns to Stable. Pending and cooldown states are left untouched.
    pub fn observe(self, trigger: Option<ActionKind>, now: i64) -> Self {
        match (self, trigger) {
            (ResourceState::Stable, Some(trigger)) => ResourceState::Watching { since: now, trigger },
            (ResourceState::Watching { since, trigger }, Some(observed)) if observed == trigger => {
                ResourceState::Watching { since, trigger }
            }
            (ResourceState::Watching { .. }, Some(observed)) => ResourceState::Watching {
                since: now,
                trigger: observed,
            },
            (ResourceState::Watching { .. }, None) => ResourceState::Stable,
            (state, _) => state,
        }
    }

    /// True once a watched condition has persisted for `debounce`
    pub fn debounce_elapsed(&self, now: i64, debounce: Duration) -> bool {
        match self {
            ResourceState::Watching { since, .. } => now.saturating_sub(*since) >= secs(debounce),
            _ => false,
        }
    }

    /// ActionPending → Cooldown when the acknowledged action matches
    pub fn acknowledge(self, action_id: &str, now: i64, cooldown: Duration) -> Self {
        match self {
            ResourceState::ActionPending { action_id: pending, .. } if pending == action_id => {
                ResourceState::Cooldown {
                    until: now.saturating_add(secs(cooldown)),
                }
            }
            other => other,
        }
    }
}
