//! End-to-end benchmark run
//!
//! Each stage hands an immutable value to the next: the raw panel is checked
//! against the transform domain, split, the input is transformed, every
//! provider forecasts it, forecasts are inverted back to the raw scale and
//! scored against the untouched holdout.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{ExogenousFrame, ForecastResult, Frequency, Panel};
use crate::evaluation::{summarize, Aggregation, Evaluation, Evaluator, Summary};
use crate::error::{PipelineError, Result};
use crate::forecast::{
    ForecastEngine, ForecastProvider, ForecastRequest, LocalStatsProvider, Metric, RemoteForecastProvider,
};
use crate::split::{rolling_windows, SeriesSplit};
use crate::transform::{check_panel, forward_panel, inverse_forecast, Transform};

/// A provider call that failed as a whole in one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub window: usize,
    pub provider: String,
    pub error: String,
}

/// Raw-scale forecasts produced for one evaluation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowForecasts {
    pub window: usize,
    pub results: Vec<ForecastResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub summary: Summary,
    pub evaluation: Evaluation,
    pub provider_failures: Vec<ProviderFailure>,
    pub forecasts: Vec<WindowForecasts>,
}

pub struct BenchmarkPipeline {
    transform: Arc<dyn Transform>,
    engine: ForecastEngine,
    evaluator: Evaluator,
    horizon: usize,
    levels: Vec<f64>,
    frequency: Frequency,
    windows: usize,
    step: usize,
    use_exogenous: bool,
    aggregation: Aggregation,
}

impl BenchmarkPipeline {
    pub fn new(
        transform: Arc<dyn Transform>,
        engine: ForecastEngine,
        evaluator: Evaluator,
        horizon: usize,
        frequency: Frequency,
    ) -> Self {
        Self {
            transform,
            engine,
            evaluator,
            horizon,
            levels: Vec::new(),
            frequency,
            windows: 1,
            step: horizon,
            use_exogenous: true,
            aggregation: Aggregation::Mean,
        }
    }

    pub fn with_levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_windows(mut self, windows: usize, step: usize) -> Self {
        self.windows = windows;
        self.step = step;
        self
    }

    pub fn with_exogenous(mut self, use_exogenous: bool) -> Self {
        self.use_exogenous = use_exogenous;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Build transform, providers and metrics from configuration.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.remote.enabled && cfg.local.enabled {
            if let Some(model) = cfg.local.models.iter().find(|m| m.alias() == cfg.remote.model_id) {
                return Err(PipelineError::Config(format!(
                    "remote model id '{}' collides with local model alias '{}'",
                    cfg.remote.model_id,
                    model.alias()
                )));
            }
        }

        let mut providers: Vec<Box<dyn ForecastProvider>> = Vec::new();
        if cfg.remote.enabled {
            providers.push(Box::new(RemoteForecastProvider::new(&cfg.remote)?));
        }
        if cfg.local.enabled {
            providers.push(Box::new(LocalStatsProvider::from_configs(
                &cfg.local.models,
                cfg.local.parallel,
            )?));
        }
        let engine = ForecastEngine::new(providers);
        if engine.is_empty() {
            return Err(PipelineError::Config("no forecast providers enabled".into()));
        }

        let metrics: Vec<Arc<dyn Metric>> = cfg
            .pipeline
            .metrics
            .iter()
            .map(|m| Arc::new(*m) as Arc<dyn Metric>)
            .collect();

        let pipeline = &cfg.pipeline;
        Ok(Self::new(
            Arc::from(pipeline.transform.build()),
            engine,
            Evaluator::new(metrics),
            pipeline.horizon,
            pipeline.frequency,
        )
        .with_levels(pipeline.levels.clone())
        .with_windows(pipeline.windows, pipeline.step)
        .with_exogenous(pipeline.use_exogenous)
        .with_aggregation(pipeline.aggregation))
    }

    pub async fn run(&self, panel: &Panel) -> Result<BenchmarkReport> {
        if panel.is_empty() {
            return Err(PipelineError::Schema("panel has no records".into()));
        }
        check_panel(self.transform.as_ref(), panel)?;
        let splits = rolling_windows(panel, self.horizon, self.windows, self.step)?;
        info!(
            series = panel.n_series(),
            rows = panel.len(),
            horizon = self.horizon,
            windows = splits.len(),
            transform = self.transform.name(),
            providers = ?self.engine.provider_names().collect::<Vec<_>>(),
            "benchmark started"
        );

        let mut evaluation = Evaluation::default();
        let mut provider_failures = Vec::new();
        let mut forecasts = Vec::with_capacity(splits.len());
        for split in &splits {
            let (results, failures) = self.forecast_window(split).await?;
            let window_eval = self.evaluator.evaluate_window(split.window, &split.holdout, &results);
            info!(
                window = split.window,
                models = results.len(),
                records = window_eval.records.len(),
                gaps = window_eval.gaps.len(),
                "window evaluated"
            );
            evaluation.extend(window_eval);
            provider_failures.extend(failures);
            forecasts.push(WindowForecasts {
                window: split.window,
                results,
            });
        }

        let summary = summarize(&evaluation.records, self.aggregation);
        info!(entries = summary.entries.len(), gaps = evaluation.gaps.len(), "benchmark finished");
        Ok(BenchmarkReport {
            summary,
            evaluation,
            provider_failures,
            forecasts,
        })
    }

    async fn forecast_window(&self, split: &SeriesSplit) -> Result<(Vec<ForecastResult>, Vec<ProviderFailure>)> {
        let mut input = forward_panel(self.transform.as_ref(), &split.input)?;
        if !self.use_exogenous && input.has_exogenous() {
            input = input.without_exogenous();
        }
        let future_exogenous = input
            .has_exogenous()
            .then(|| Arc::new(split.holdout.exogenous_frame()))
            .filter(|frame: &Arc<ExogenousFrame>| !frame.is_empty());

        let request = ForecastRequest {
            input: Arc::new(input),
            horizon: self.horizon,
            levels: self.levels.clone(),
            frequency: self.frequency,
            future_exogenous,
        };

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in self.engine.run(&request).await? {
            match outcome.result {
                Ok(batch) => results.extend(
                    batch
                        .into_iter()
                        .map(|r| inverse_forecast(self.transform.as_ref(), r)),
                ),
                Err(e) => {
                    warn!(window = split.window, provider = %outcome.provider, error = %e, "provider excluded from window");
                    failures.push(ProviderFailure {
                        window: split.window,
                        provider: outcome.provider,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok((results, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForecastPoint, Record};
    use crate::error::ProviderError;
    use crate::forecast::{HistoricAverage, MetricKind, NamedModel};
    use crate::transform::{Identity, OffsetLog};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::days(i)
    }

    fn panel(series: &[(&str, Vec<f64>)]) -> Panel {
        let records: Vec<Record> = series
            .iter()
            .flat_map(|(id, values)| {
                values.iter().enumerate().map(move |(i, v)| Record {
                    series_id: id.to_string(),
                    timestamp: day(i as i64),
                    value: *v,
                    exogenous: vec![],
                })
            })
            .collect();
        Panel::from_records(vec![], records).unwrap()
    }

    fn local() -> Box<dyn ForecastProvider> {
        Box::new(
            LocalStatsProvider::new(
                vec![NamedModel {
                    alias: "HistoricAverage".into(),
                    model: Box::new(HistoricAverage),
                }],
                false,
            )
            .unwrap(),
        )
    }

    fn mae() -> Evaluator {
        Evaluator::new(vec![Arc::new(MetricKind::Mae) as Arc<dyn Metric>])
    }

    struct Failing;

    #[async_trait]
    impl ForecastProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn predict(&self, _request: &ForecastRequest) -> std::result::Result<Vec<ForecastResult>, ProviderError> {
            Err(ProviderError::Http("connection refused".into()))
        }
    }

    /// Forecasts the horizon after the holdout so no point joins.
    struct OffByOne;

    #[async_trait]
    impl ForecastProvider for OffByOne {
        fn name(&self) -> &str {
            "offbyone"
        }

        async fn predict(&self, request: &ForecastRequest) -> std::result::Result<Vec<ForecastResult>, ProviderError> {
            let mut result = ForecastResult::new("OffByOne");
            for (id, obs) in request.input.iter_series() {
                let last = obs[obs.len() - 1].timestamp;
                let horizon = request.horizon as i64;
                for h in 1..=horizon {
                    result.points.push(ForecastPoint {
                        series_id: id.clone(),
                        timestamp: last + chrono::Duration::days(h + horizon),
                        value: 0.0,
                        intervals: vec![],
                    });
                }
            }
            Ok(vec![result])
        }
    }

    #[tokio::test]
    async fn test_constant_forecast_error_on_raw_scale() {
        // input mean is 2 for both series
        let p = panel(&[("a", vec![1.0, 3.0, 5.0, 7.0]), ("b", vec![2.0, 2.0, 4.0, 0.0])]);
        let pipeline = BenchmarkPipeline::new(Arc::new(Identity), ForecastEngine::new(vec![local()]), mae(), 2, Frequency::Day);

        let report = pipeline.run(&p).await.unwrap();
        // a: |5-2| + |7-2| = 8 / 2 = 4; b: |4-2| + |0-2| = 4 / 2 = 2
        let entry = report.summary.get("mae", "HistoricAverage").unwrap();
        assert_eq!(entry.value, 3.0);
        assert_eq!(entry.record_count, 2);
        assert!(report.evaluation.gaps.is_empty());
    }

    #[tokio::test]
    async fn test_log_transform_inverted_before_scoring() {
        let p = panel(&[("a", vec![9.0, 9.0, 9.0, 4.0])]);
        let pipeline = BenchmarkPipeline::new(
            Arc::new(OffsetLog::default()),
            ForecastEngine::new(vec![local()]),
            mae(),
            1,
            Frequency::Day,
        );

        let report = pipeline.run(&p).await.unwrap();
        let point = &report.forecasts[0].results[0].points[0];
        assert!((point.value - 9.0).abs() < 1e-9);
        assert!((report.summary.get("mae", "HistoricAverage").unwrap().value - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_negative_values_fail_log_transform() {
        let p = panel(&[("a", vec![1.0, -3.0, 1.0])]);
        let pipeline = BenchmarkPipeline::new(
            Arc::new(OffsetLog::default()),
            ForecastEngine::new(vec![local()]),
            mae(),
            1,
            Frequency::Day,
        );
        assert!(matches!(pipeline.run(&p).await, Err(PipelineError::DomainViolation { .. })));
    }

    #[tokio::test]
    async fn test_failed_provider_reported_others_scored() {
        let p = panel(&[("a", vec![1.0, 1.0, 1.0])]);
        let engine = ForecastEngine::new(vec![Box::new(Failing), local()]);
        let pipeline = BenchmarkPipeline::new(Arc::new(Identity), engine, mae(), 1, Frequency::Day);

        let report = pipeline.run(&p).await.unwrap();
        assert_eq!(report.provider_failures.len(), 1);
        assert_eq!(report.provider_failures[0].provider, "failing");
        assert_eq!(report.summary.get("mae", "HistoricAverage").unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_fatal() {
        let p = panel(&[("a", vec![1.0, 1.0, 1.0])]);
        let pipeline =
            BenchmarkPipeline::new(Arc::new(Identity), ForecastEngine::new(vec![Box::new(Failing)]), mae(), 1, Frequency::Day);
        assert!(matches!(pipeline.run(&p).await, Err(PipelineError::AllProvidersFailed(1))));
    }

    #[tokio::test]
    async fn test_misaligned_forecasts_become_gaps() {
        let p = panel(&[("a", vec![1.0, 2.0, 3.0, 4.0])]);
        let engine = ForecastEngine::new(vec![Box::new(OffByOne), local()]);
        let pipeline = BenchmarkPipeline::new(Arc::new(Identity), engine, mae(), 2, Frequency::Day);

        let report = pipeline.run(&p).await.unwrap();
        assert!(report.summary.get("mae", "OffByOne").is_none());
        assert!(report.summary.get("mae", "HistoricAverage").is_some());
        assert_eq!(report.evaluation.gap_count(crate::evaluation::GapKind::MissingForecast), 2);
        assert_eq!(report.evaluation.gap_count(crate::evaluation::GapKind::UnmatchedForecast), 2);
    }

    #[tokio::test]
    async fn test_rolling_windows_scored_separately() {
        let p = panel(&[("a", vec![0.0, 0.0, 0.0, 6.0, 6.0, 6.0])]);
        let pipeline = BenchmarkPipeline::new(Arc::new(Identity), ForecastEngine::new(vec![local()]), mae(), 1, Frequency::Day)
            .with_windows(3, 1);

        let report = pipeline.run(&p).await.unwrap();
        assert_eq!(report.forecasts.len(), 3);
        let by_window: Vec<f64> = (0..3)
            .map(|w| report.evaluation.records.iter().find(|r| r.window == w).unwrap().value)
            .collect();
        // cuts after 3, 4 and 5 points: means 0, 1.5, 2.4
        assert_eq!(by_window[0], 6.0);
        assert_eq!(by_window[1], 4.5);
        assert!((by_window[2] - 3.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_panel_rejected() {
        let pipeline = BenchmarkPipeline::new(Arc::new(Identity), ForecastEngine::new(vec![local()]), mae(), 1, Frequency::Day);
        assert!(matches!(pipeline.run(&Panel::default()).await, Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_from_config_without_providers_fails() {
        let mut cfg = Config::default();
        cfg.remote.enabled = false;
        cfg.local.enabled = false;
        assert!(matches!(BenchmarkPipeline::from_config(&cfg), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_from_config_rejects_remote_id_shared_with_local_alias() {
        let mut cfg = Config::default();
        cfg.remote.model_id = "HistoricAverage".into();
        match BenchmarkPipeline::from_config(&cfg) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("HistoricAverage")),
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("colliding model ids accepted"),
        }
    }
}
