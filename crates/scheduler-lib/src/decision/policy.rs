//! Scheduling policy thresholds

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::ActionKind;
use std::time::Duration;

/// Thresholds and timings that drive the decision engine
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Utilization (%) above which a resource is overloaded
    pub high_threshold: f64,
    /// Utilization (%) below which a resource is underused
    pub low_threshold: f64,
    /// Forecast peak (%) that must not be exceeded before scaling down
    pub forecast_low_threshold: f64,
    /// Utilization (%) a resized resource is sized for
    pub target_utilization: f64,
    /// Disk utilization (%) that triggers storage optimisation
    pub disk_high_threshold: f64,
    /// How far back every sample must agree for a condition to be sustained
    pub sustain: Duration,
    /// How long a condition must persist before an action is emitted
    pub debounce: Duration,
    pub cooldown_scale: Duration,
    pub cooldown_migrate: Duration,
    pub cooldown_storage: Duration,
    /// Minimum confidence for any action
    pub min_confidence: f64,
    /// Minimum confidence-weighted monthly benefit for any action
    pub min_benefit: f64,
    /// Confidence assumed when acting on observed samples alone
    pub threshold_only_confidence: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            high_threshold: 80.0,
            low_threshold: 30.0,
            forecast_low_threshold: 40.0,
            target_utilization: 55.0,
            disk_high_threshold: 85.0,
            sustain: Duration::from_secs(300),
            debounce: Duration::from_secs(120),
            cooldown_scale: Duration::from_secs(300),
            cooldown_migrate: Duration::from_secs(1800),
            cooldown_storage: Duration::from_secs(900),
            min_confidence: 0.5,
            min_benefit: 1.0,
            threshold_only_confidence: 0.7,
        }
    }
}

impl Policy {
    /// Reject thresholds that cannot describe a consistent policy
    pub fn validate(&self) -> SchedulerResult<()> {
        let pct = [
            ("high_threshold", self.high_threshold),
            ("low_threshold", self.low_threshold),
            ("forecast_low_threshold", self.forecast_low_threshold),
            ("target_utilization", self.target_utilization),
            ("disk_high_threshold", self.disk_high_threshold),
        ];
        for (name, value) in pct {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(SchedulerError::InvalidPolicy(format!(
                    "{} must be within [0, 100], got {}",
                    name, value
                )));
            }
        }

        if self.low_threshold >= self.high_threshold {
            return Err(SchedulerError::InvalidPolicy(format!(
                "low_threshold ({}) must be below high_threshold ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.forecast_low_threshold < self.low_threshold
            || self.forecast_low_threshold >= self.high_threshold
        {
            return Err(SchedulerError::InvalidPolicy(format!(
                "forecast_low_threshold ({}) must be within [low_threshold, high_threshold)",
                self.forecast_low_threshold
            )));
        }
        if self.target_utilization <= self.low_threshold
            || self.target_utilization >= self.high_threshold
        {
            return Err(SchedulerError::InvalidPolicy(format!(
                "target_utilization ({}) must lie strictly between the low and high thresholds",
                self.target_utilization
            )));
        }

        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("threshold_only_confidence", self.threshold_only_confidence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SchedulerError::InvalidPolicy(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !self.min_benefit.is_finite() || self.min_benefit < 0.0 {
            return Err(SchedulerError::InvalidPolicy(format!(
                "min_benefit must be non-negative, got {}",
                self.min_benefit
            )));
        }
        Ok(())
    }

    /// Cooldown that follows an acknowledged action of `kind`
    pub fn cooldown_for(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::ScaleUp | ActionKind::ScaleDown => self.cooldown_scale,
            ActionKind::Migrate => self.cooldown_migrate,
            ActionKind::OptimizeStorage => self.cooldown_storage,
            ActionKind::NoOp => Duration::ZERO,
        }
    }
}
