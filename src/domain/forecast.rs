use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::SeriesId;

/// Lower/upper bounds of a prediction interval at one confidence level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    /// Confidence level in percent (e.g. 90.0)
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Forecast for one series at one future timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub series_id: SeriesId,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<PredictionInterval>,
}

/// A series a model could not forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFailure {
    pub series_id: SeriesId,
    pub reason: String,
}

/// Everything one model produced for one request.
///
/// Points for series the model failed on are absent; the failure is listed
/// in `failures` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub model: String,
    pub points: Vec<ForecastPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SeriesFailure>,
}

impl ForecastResult {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            points: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn push_failure(&mut self, series_id: impl Into<SeriesId>, reason: impl Into<String>) {
        self.failures.push(SeriesFailure {
            series_id: series_id.into(),
            reason: reason.into(),
        });
    }

    /// Distinct series that have at least one forecast point
    pub fn forecast_series(&self) -> BTreeSet<&str> {
        self.points.iter().map(|p| p.series_id.as_str()).collect()
    }

    pub fn points_for<'a>(&'a self, series_id: &'a str) -> impl Iterator<Item = &'a ForecastPoint> + 'a {
        self.points.iter().filter(move |p| p.series_id == series_id)
    }
}
