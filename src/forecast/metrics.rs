//! Forecast Metrics
//!
//! Pointwise error metrics over `(actual, predicted)` pairs. The built-in
//! metrics cover MAE, MSE, RMSE, MAPE and sMAPE; any closure can be plugged in
//! through [`FnMetric`].

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Forecast metric calculation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("Empty data provided")]
    EmptyData,

    #[error("Metric {metric} undefined: {reason}")]
    Undefined { metric: String, reason: String },
}

/// An error metric over `(actual, predicted)` pairs
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, pairs: &[(f64, f64)]) -> Result<f64, MetricError>;
}

/// Built-in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    /// Mean Absolute Error
    Mae,
    /// Mean Squared Error
    Mse,
    /// Root Mean Square Error
    Rmse,
    /// Mean Absolute Percentage Error (%), zero actuals skipped
    Mape,
    /// Symmetric MAPE (%), in [0, 200]
    Smape,
}

impl MetricKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Mae => "mae",
            Self::Mse => "mse",
            Self::Rmse => "rmse",
            Self::Mape => "mape",
            Self::Smape => "smape",
        }
    }
}

impl Metric for MetricKind {
    fn name(&self) -> &str {
        self.label()
    }

    fn compute(&self, pairs: &[(f64, f64)]) -> Result<f64, MetricError> {
        if pairs.is_empty() {
            return Err(MetricError::EmptyData);
        }
        let n = pairs.len() as f64;

        let value = match self {
            Self::Mae => pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n,
            Self::Mse => pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n,
            Self::Rmse => (pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n).sqrt(),
            Self::Mape => {
                // Percentage error (avoid division by zero)
                let pct: Vec<f64> = pairs
                    .iter()
                    .filter(|(a, _)| a.abs() > 1e-6)
                    .map(|(a, p)| ((a - p).abs() / a.abs()) * 100.0)
                    .collect();
                if pct.is_empty() {
                    return Err(MetricError::Undefined {
                        metric: self.label().into(),
                        reason: "every actual value is zero".into(),
                    });
                }
                pct.iter().sum::<f64>() / pct.len() as f64
            }
            Self::Smape => {
                pairs
                    .iter()
                    .map(|(a, p)| {
                        let denom = a.abs() + p.abs();
                        if denom < 1e-12 {
                            0.0
                        } else {
                            200.0 * (a - p).abs() / denom
                        }
                    })
                    .sum::<f64>()
                    / n
            }
        };
        Ok(value)
    }
}

/// A metric backed by an arbitrary function
pub struct FnMetric<F> {
    name: String,
    f: F,
}

impl<F> FnMetric<F>
where
    F: Fn(&[(f64, f64)]) -> Result<f64, MetricError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Metric for FnMetric<F>
where
    F: Fn(&[(f64, f64)]) -> Result<f64, MetricError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, pairs: &[(f64, f64)]) -> Result<f64, MetricError> {
        if pairs.is_empty() {
            return Err(MetricError::EmptyData);
        }
        (self.f)(pairs)
    }
}
