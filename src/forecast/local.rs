//! In-process statistical baselines
//!
//! Fits every configured model on every series of the input panel in one
//! batch. Series are independent, so the batch is spread across a rayon pool
//! on a blocking thread. Only point forecasts are produced: exogenous columns
//! and interval levels are ignored.

use async_trait::async_trait;
use itertools::Itertools;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::models::{BaselineModel, LocalModelConfig};
use super::provider::{ForecastProvider, ForecastRequest};
use crate::domain::{ForecastPoint, ForecastResult, Frequency, Observation, Panel, SeriesId};
use crate::error::ProviderError;

/// A baseline model and the identifier it reports under
#[derive(Debug)]
pub struct NamedModel {
    pub alias: String,
    pub model: Box<dyn BaselineModel>,
}

pub struct LocalStatsProvider {
    models: Arc<Vec<NamedModel>>,
    parallel: bool,
}

impl LocalStatsProvider {
    pub fn new(models: Vec<NamedModel>, parallel: bool) -> Result<Self, ProviderError> {
        if models.is_empty() {
            return Err(ProviderError::Model("no local models configured".into()));
        }
        if let Some(dup) = models.iter().map(|m| m.alias.as_str()).duplicates().next() {
            return Err(ProviderError::Model(format!("duplicate model alias '{dup}'")));
        }
        Ok(Self {
            models: Arc::new(models),
            parallel,
        })
    }

    pub fn from_configs(configs: &[LocalModelConfig], parallel: bool) -> Result<Self, ProviderError> {
        let models = configs
            .iter()
            .map(|cfg| {
                let model = cfg
                    .build()
                    .map_err(|e| ProviderError::Model(format!("{}: {e}", cfg.alias())))?;
                Ok(NamedModel {
                    alias: cfg.alias().to_string(),
                    model,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;
        Self::new(models, parallel)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.alias.as_str())
    }
}

#[async_trait]
impl ForecastProvider for LocalStatsProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn predict(&self, request: &ForecastRequest) -> Result<Vec<ForecastResult>, ProviderError> {
        if request.input.has_exogenous() || request.future_exogenous.is_some() {
            debug!("local baselines ignore exogenous features");
        }
        if !request.levels.is_empty() {
            debug!(levels = ?request.levels, "local baselines produce point forecasts only");
        }

        let models = Arc::clone(&self.models);
        let input = Arc::clone(&request.input);
        let horizon = request.horizon;
        let frequency = request.frequency;
        let parallel = self.parallel;

        let results = tokio::task::spawn_blocking(move || {
            fit_all(&models, &input, horizon, frequency, parallel)
        })
        .await
        .map_err(|e| ProviderError::Join(e.to_string()))?;

        for result in &results {
            info!(
                model = %result.model,
                points = result.points.len(),
                failed_series = result.failures.len(),
                "local model forecast complete"
            );
        }
        Ok(results)
    }
}

type SeriesForecasts = Vec<Result<Vec<ForecastPoint>, String>>;

fn fit_all(
    models: &[NamedModel],
    input: &Panel,
    horizon: usize,
    frequency: Frequency,
    parallel: bool,
) -> Vec<ForecastResult> {
    let series: Vec<(&SeriesId, &[Observation])> = input.iter_series().collect();

    let per_series: Vec<(&SeriesId, SeriesForecasts)> = if parallel {
        series
            .par_iter()
            .map(|(id, points)| (*id, forecast_series(models, id, points, horizon, frequency)))
            .collect()
    } else {
        series
            .iter()
            .map(|(id, points)| (*id, forecast_series(models, id, points, horizon, frequency)))
            .collect()
    };

    let mut results: Vec<ForecastResult> = models
        .iter()
        .map(|m| ForecastResult::new(m.alias.clone()))
        .collect();
    for (id, outcomes) in per_series {
        for (result, outcome) in results.iter_mut().zip(outcomes) {
            match outcome {
                Ok(points) => result.points.extend(points),
                Err(reason) => {
                    warn!(model = %result.model, series_id = %id, %reason, "local model failed on series");
                    result.push_failure(id.clone(), reason);
                }
            }
        }
    }
    results
}

/// Forecast one series with every model, one outcome per model in order.
fn forecast_series(
    models: &[NamedModel],
    series_id: &SeriesId,
    points: &[Observation],
    horizon: usize,
    frequency: Frequency,
) -> SeriesForecasts {
    let history: Vec<f64> = points.iter().map(|p| p.value).collect();
    let future = points
        .last()
        .and_then(|last| frequency.future_timestamps(last.timestamp, horizon));

    models
        .iter()
        .map(|m| {
            let future = future
                .as_ref()
                .ok_or_else(|| "cannot derive future timestamps".to_string())?;
            let values = m.model.forecast(&history, horizon).map_err(|e| e.to_string())?;
            Ok(future
                .iter()
                .zip(values)
                .map(|(ts, value)| ForecastPoint {
                    series_id: series_id.clone(),
                    timestamp: *ts,
                    value,
                    intervals: Vec::new(),
                })
                .collect())
        })
        .collect()
}
