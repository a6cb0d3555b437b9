//! Regression estimator over engineered features
//!
//! Fits a ridge-regularized linear model predicting the next value from the
//! rolling mean, rate of change and time-of-day bucket of the current one,
//! then rolls the model forward one step at a time.

use super::features::{FeatureExtractor, FeatureRow};
use super::Estimator;

const NUM_COEFFICIENTS: usize = 5;

/// Minimum training rows before the model is fitted
const MIN_TRAINING_ROWS: usize = 3;

/// Ridge regression over [intercept, rolling mean, rate of change, sin, cos]
#[derive(Debug, Clone)]
pub struct FeatureRegressionEstimator {
    extractor: FeatureExtractor,
    ridge_lambda: f64,
}

impl FeatureRegressionEstimator {
    pub fn new(rolling_window: usize, time_buckets: usize, ridge_lambda: f64) -> Self {
        Self {
            extractor: FeatureExtractor::new(rolling_window, time_buckets),
            ridge_lambda: ridge_lambda.max(0.0),
        }
    }

    /// Fit coefficients on (features at t) -> (value at t + 1)
    fn fit(&self, rows: &[FeatureRow], values: &[f64]) -> Option<[f64; NUM_COEFFICIENTS]> {
        let n = rows.len().min(values.len());
        if n < MIN_TRAINING_ROWS + 1 {
            return None;
        }

        let mut xtx = [[0.0; NUM_COEFFICIENTS]; NUM_COEFFICIENTS];
        let mut xty = [0.0; NUM_COEFFICIENTS];
        for i in 0..n - 1 {
            let x = rows[i].to_design();
            let y = values[i + 1];
            for r in 0..NUM_COEFFICIENTS {
                xty[r] += x[r] * y;
                for c in 0..NUM_COEFFICIENTS {
                    xtx[r][c] += x[r] * x[c];
                }
            }
        }
        // Intercept is not penalized; a tiny jitter keeps it solvable
        xtx[0][0] += 1e-9;
        for (d, row) in xtx.iter_mut().enumerate().skip(1) {
            row[d] += self.ridge_lambda.max(1e-9);
        }

        solve(xtx, xty)
    }
}

impl Estimator for FeatureRegressionEstimator {
    fn name(&self) -> &'static str {
        "feature_regression"
    }

    fn forecast(&self, timestamps: &[i64], values: &[f64], step_secs: i64, steps: usize) -> Vec<f64> {
        let Some(&last_value) = values.last() else {
            return vec![0.0; steps];
        };

        let rows = self.extractor.extract(timestamps, values);
        let Some(coefficients) = self.fit(&rows, values) else {
            return vec![last_value; steps];
        };

        let mut ts_ext = timestamps.to_vec();
        let mut values_ext = values.to_vec();
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let rows = self.extractor.extract(&ts_ext, &values_ext);
            let Some(current) = rows.last() else {
                break;
            };
            let x = current.to_design();
            let next: f64 = x.iter().zip(coefficients.iter()).map(|(a, b)| a * b).sum();
            let next = if next.is_finite() { next } else { last_value };

            out.push(next);
            let last_ts = ts_ext.last().copied().unwrap_or(0);
            ts_ext.push(last_ts + step_secs);
            values_ext.push(next);
        }
        out
    }
}

/// Solve a dense linear system with partial pivoting
fn solve(
    mut a: [[f64; NUM_COEFFICIENTS]; NUM_COEFFICIENTS],
    mut b: [f64; NUM_COEFFICIENTS],
) -> Option<[f64; NUM_COEFFICIENTS]> {
    for col in 0..NUM_COEFFICIENTS {
        let pivot = (col..NUM_COEFFICIENTS).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..NUM_COEFFICIENTS {
            let factor = a[row][col] / a[col][col];
            for k in col..NUM_COEFFICIENTS {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; NUM_COEFFICIENTS];
    for row in (0..NUM_COEFFICIENTS).rev() {
        let tail: f64 = (row + 1..NUM_COEFFICIENTS).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
