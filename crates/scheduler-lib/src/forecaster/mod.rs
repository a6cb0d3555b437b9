//! Demand forecasting engine
//!
//! Blends a trend/seasonality estimator with a feature regression estimator.
//! Each estimator is backtested on the tail of the window; the one with the
//! lower error gets the larger weight, and the disagreement between the two
//! sets the confidence.

mod features;
mod regression;
mod sequence;

pub use features::{
    linear_regression_slope, median_step, rate_of_change, rolling_mean, time_bucket,
    FeatureExtractor, FeatureRow,
};
pub use regression::FeatureRegressionEstimator;
pub use sequence::TrendSeasonalEstimator;

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{Forecast, ForecastPoint, Sample};
use std::time::Duration;
use tracing::debug;

/// Minimum number of samples required before forecasting
pub const MIN_SAMPLES: usize = 12;

/// Lower and upper bounds for reported confidence
pub const CONFIDENCE_FLOOR: f64 = 0.05;
pub const CONFIDENCE_CEILING: f64 = 0.99;

/// Trait for univariate forecast estimators
pub trait Estimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Forecast `steps` values spaced `step_secs` apart after the last observation
    fn forecast(&self, timestamps: &[i64], values: &[f64], step_secs: i64, steps: usize) -> Vec<f64>;
}

/// Configuration for the forecaster
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Minimum samples in the window; fewer yields `InsufficientHistory`
    pub min_samples: usize,
    /// Trailing samples held out to backtest each estimator
    pub backtest_points: usize,
    pub smoothing_alpha: f64,
    pub smoothing_beta: f64,
    /// Rolling window (samples) for regression features
    pub rolling_window: usize,
    pub ridge_lambda: f64,
    /// Mean disagreement (percentage points) that maps to zero confidence
    pub disagreement_scale: f64,
    /// Number of time-of-day buckets
    pub time_buckets: usize,
    /// Upper bound on forecast points per horizon
    pub max_steps: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            backtest_points: 6,
            smoothing_alpha: 0.5,
            smoothing_beta: 0.3,
            rolling_window: 6,
            ridge_lambda: 0.01,
            disagreement_scale: 25.0,
            time_buckets: 24,
            max_steps: 288,
        }
    }
}

/// Ensemble forecaster
pub struct Forecaster {
    config: ForecastConfig,
    sequence: Box<dyn Estimator>,
    regression: Box<dyn Estimator>,
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl Forecaster {
    /// Create a forecaster with the default estimators
    pub fn new(config: ForecastConfig) -> Self {
        let sequence = TrendSeasonalEstimator::new(
            config.smoothing_alpha,
            config.smoothing_beta,
            config.time_buckets,
        );
        let regression = FeatureRegressionEstimator::new(
            config.rolling_window,
            config.time_buckets,
            config.ridge_lambda,
        );
        Self::with_estimators(config, Box::new(sequence), Box::new(regression))
    }

    /// Create a forecaster with substitute estimators
    pub fn with_estimators(
        config: ForecastConfig,
        sequence: Box<dyn Estimator>,
        regression: Box<dyn Estimator>,
    ) -> Self {
        Self {
            config,
            sequence,
            regression,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast cpu and memory utilization over `horizon`
    ///
    /// `window` must be ordered oldest first. The result depends only on the
    /// samples and the horizon.
    pub fn predict(
        &self,
        resource_id: &str,
        window: &[Sample],
        horizon: Duration,
    ) -> SchedulerResult<Forecast> {
        if window.len() < self.config.min_samples.max(2) {
            return Err(SchedulerError::InsufficientHistory {
                resource_id: resource_id.to_string(),
                available: window.len(),
                required: self.config.min_samples.max(2),
            });
        }

        let timestamps: Vec<i64> = window.iter().map(|s| s.timestamp).collect();
        let cpu: Vec<f64> = window.iter().map(|s| s.cpu_pct).collect();
        let mem: Vec<f64> = window.iter().map(|s| s.mem_pct).collect();

        let step_secs = median_step(&timestamps);
        let steps = ((horizon.as_secs() as i64 + step_secs - 1) / step_secs)
            .clamp(1, self.config.max_steps.max(1) as i64) as usize;

        let seq_error = self.backtest(self.sequence.as_ref(), &timestamps, &cpu, step_secs)
            + self.backtest(self.sequence.as_ref(), &timestamps, &mem, step_secs);
        let reg_error = self.backtest(self.regression.as_ref(), &timestamps, &cpu, step_secs)
            + self.backtest(self.regression.as_ref(), &timestamps, &mem, step_secs);
        let (sequence_weight, regression_weight) = ensemble_weights(seq_error, reg_error);

        let seq_cpu = clamp_pct(self.sequence.forecast(&timestamps, &cpu, step_secs, steps));
        let seq_mem = clamp_pct(self.sequence.forecast(&timestamps, &mem, step_secs, steps));
        let reg_cpu = clamp_pct(self.regression.forecast(&timestamps, &cpu, step_secs, steps));
        let reg_mem = clamp_pct(self.regression.forecast(&timestamps, &mem, step_secs, steps));

        let last_ts = timestamps[timestamps.len() - 1];
        let points: Vec<ForecastPoint> = (0..steps)
            .map(|i| ForecastPoint {
                timestamp: last_ts + step_secs * (i as i64 + 1),
                cpu_pct: sequence_weight * seq_cpu[i] + regression_weight * reg_cpu[i],
                mem_pct: sequence_weight * seq_mem[i] + regression_weight * reg_mem[i],
            })
            .collect();

        let disagreement = mean_abs_diff(&seq_cpu, &reg_cpu) / 2.0
            + mean_abs_diff(&seq_mem, &reg_mem) / 2.0;
        let confidence = confidence_from_disagreement(disagreement, self.config.disagreement_scale);

        debug!(
            resource_id = %resource_id,
            samples = window.len(),
            steps = steps,
            sequence = self.sequence.name(),
            regression = self.regression.name(),
            sequence_weight = sequence_weight,
            disagreement = disagreement,
            confidence = confidence,
            "Forecast computed"
        );

        Ok(Forecast {
            resource_id: resource_id.to_string(),
            generated_at: last_ts,
            horizon_secs: horizon.as_secs(),
            points,
            confidence,
            sequence_weight,
            regression_weight,
        })
    }

    /// Mean absolute error of one estimator on the held-out tail
    fn backtest(&self, estimator: &dyn Estimator, timestamps: &[i64], values: &[f64], step_secs: i64) -> f64 {
        let n = values.len();
        let holdout = self.config.backtest_points.min(n / 3);
        if holdout == 0 {
            return 0.0;
        }
        let split = n - holdout;
        let predicted = clamp_pct(estimator.forecast(
            &timestamps[..split],
            &values[..split],
            step_secs,
            holdout,
        ));
        mean_abs_diff(&predicted, &values[split..])
    }
}

/// Inverse-error weights, favouring the estimator with the lower error
pub fn ensemble_weights(sequence_error: f64, regression_error: f64) -> (f64, f64) {
    let total = sequence_error + regression_error;
    if !total.is_finite() || total < 1e-9 {
        return (0.5, 0.5);
    }
    let sequence_weight = regression_error / total;
    (sequence_weight, 1.0 - sequence_weight)
}

/// 1 − normalized disagreement, clamped to the confidence bounds
pub fn confidence_from_disagreement(disagreement: f64, scale: f64) -> f64 {
    let normalized = if scale > 0.0 { disagreement / scale } else { 1.0 };
    (1.0 - normalized).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

fn clamp_pct(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(|v| v.clamp(0.0, 100.0)).collect()
}

fn mean_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / n as f64
}
