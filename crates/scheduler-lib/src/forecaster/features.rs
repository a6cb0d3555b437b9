//! Feature engineering for the forecast estimators
//!
//! Turns a raw utilization series into rolling means, rates of change and
//! time-of-day buckets.

use chrono::{DateTime, Timelike};

/// Seconds in one day, used for time-of-day bucketing
pub const SECS_PER_DAY: i64 = 86_400;

/// Engineered features for one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub rolling_mean: f64,
    pub rate_of_change: f64,
    /// Time-of-day bucket projected onto the unit circle
    pub bucket_sin: f64,
    pub bucket_cos: f64,
}

impl FeatureRow {
    /// Design-matrix row with a leading intercept term
    pub fn to_design(&self) -> [f64; 5] {
        [
            1.0,
            self.rolling_mean,
            self.rate_of_change,
            self.bucket_sin,
            self.bucket_cos,
        ]
    }
}

/// Extracts regression features from a timestamped series
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    rolling_window: usize,
    time_buckets: usize,
}

impl FeatureExtractor {
    pub fn new(rolling_window: usize, time_buckets: usize) -> Self {
        Self {
            rolling_window: rolling_window.max(1),
            time_buckets: time_buckets.max(1),
        }
    }

    /// One feature row per observation
    pub fn extract(&self, timestamps: &[i64], values: &[f64]) -> Vec<FeatureRow> {
        let means = rolling_mean(values, self.rolling_window);
        let rates = rate_of_change(values, self.rolling_window);
        timestamps
            .iter()
            .zip(means.iter().zip(rates.iter()))
            .map(|(&ts, (&mean, &rate))| {
                let bucket = time_bucket(ts, self.time_buckets);
                let angle = 2.0 * std::f64::consts::PI * bucket as f64 / self.time_buckets as f64;
                FeatureRow {
                    rolling_mean: mean,
                    rate_of_change: rate,
                    bucket_sin: angle.sin(),
                    bucket_cos: angle.cos(),
                }
            })
            .collect()
    }

    pub fn time_buckets(&self) -> usize {
        self.time_buckets
    }
}

/// Trailing mean over at most `window` values ending at each index
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            mean(&values[start..=i])
        })
        .collect()
}

/// Trailing per-step slope over at most `window` values ending at each index
pub fn rate_of_change(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(2);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            linear_regression_slope(&values[start..=i])
        })
        .collect()
}

/// Time-of-day bucket (UTC) in `0..buckets`
pub fn time_bucket(timestamp: i64, buckets: usize) -> usize {
    let buckets = buckets.max(1);
    let secs_of_day = match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.num_seconds_from_midnight() as i64,
        None => timestamp.rem_euclid(SECS_PER_DAY),
    };
    ((secs_of_day * buckets as i64) / SECS_PER_DAY) as usize % buckets
}

/// Typical spacing between consecutive timestamps (median), at least 1s
pub fn median_step(timestamps: &[i64]) -> i64 {
    if timestamps.len() < 2 {
        return 60;
    }
    let mut steps: Vec<i64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    steps.sort_unstable();
    steps[steps.len() / 2].max(1)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate linear regression slope for trend detection
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
