//! Trend/seasonality estimator
//!
//! Double exponential smoothing (Holt) over the window, so recent samples
//! carry exponentially more weight, plus an additive time-of-day profile
//! once the window covers at least a full day.

use super::features::{time_bucket, SECS_PER_DAY};
use super::Estimator;

/// Holt linear-trend smoother with optional daily seasonality
#[derive(Debug, Clone)]
pub struct TrendSeasonalEstimator {
    /// Level smoothing factor in (0, 1]
    alpha: f64,
    /// Trend smoothing factor in (0, 1]
    beta: f64,
    time_buckets: usize,
}

impl TrendSeasonalEstimator {
    pub fn new(alpha: f64, beta: f64, time_buckets: usize) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 1.0),
            beta: beta.clamp(0.01, 1.0),
            time_buckets: time_buckets.max(1),
        }
    }

    /// Average residual per time-of-day bucket, zero when the window spans
    /// less than a day
    fn seasonal_profile(&self, timestamps: &[i64], values: &[f64]) -> Vec<f64> {
        let mut profile = vec![0.0; self.time_buckets];
        let span = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        };
        if span < SECS_PER_DAY {
            return profile;
        }

        let overall = values.iter().sum::<f64>() / values.len() as f64;
        let mut sums = vec![0.0; self.time_buckets];
        let mut counts = vec![0usize; self.time_buckets];
        for (&ts, &v) in timestamps.iter().zip(values) {
            let b = time_bucket(ts, self.time_buckets);
            sums[b] += v - overall;
            counts[b] += 1;
        }
        for b in 0..self.time_buckets {
            if counts[b] > 0 {
                profile[b] = sums[b] / counts[b] as f64;
            }
        }
        profile
    }
}

impl Estimator for TrendSeasonalEstimator {
    fn name(&self) -> &'static str {
        "trend_seasonal"
    }

    fn forecast(&self, timestamps: &[i64], values: &[f64], step_secs: i64, steps: usize) -> Vec<f64> {
        if values.is_empty() {
            return vec![0.0; steps];
        }
        let (Some(&last_ts), Some(&last_value)) = (timestamps.last(), values.last()) else {
            return vec![0.0; steps];
        };
        if values.len() == 1 {
            return vec![last_value; steps];
        }

        let profile = self.seasonal_profile(timestamps, values);
        let deseasonalized: Vec<f64> = timestamps
            .iter()
            .zip(values)
            .map(|(&ts, &v)| v - profile[time_bucket(ts, self.time_buckets)])
            .collect();

        let mut level = deseasonalized[0];
        let mut trend = deseasonalized[1] - deseasonalized[0];
        for &v in &deseasonalized[1..] {
            let previous_level = level;
            level = self.alpha * v + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - previous_level) + (1.0 - self.beta) * trend;
        }

        (1..=steps)
            .map(|h| {
                let ts = last_ts + step_secs * h as i64;
                level + trend * h as f64 + profile[time_bucket(ts, self.time_buckets)]
            })
            .collect()
    }
}
