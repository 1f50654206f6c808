//! Forecast evaluation against held-out ground truth
//!
//! Forecasts are joined to the holdout on `(series_id, timestamp)`. Rows that
//! do not join are never silently dropped: each one becomes a
//! [`CoverageGap`], is logged, and is left out of the metric.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum_macros::Display;
use tracing::{debug, warn};

use crate::domain::{ForecastResult, Panel, SeriesId};
use crate::forecast::metrics::{Metric, MetricError};

/// Metric value of one model on one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub window: usize,
    pub metric: String,
    pub model: String,
    pub series_id: SeriesId,
    pub value: f64,
    /// Number of joined (actual, predicted) pairs
    pub n_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GapKind {
    /// A forecast row with no holdout row at the same key
    UnmatchedForecast,
    /// A holdout row the model did not forecast
    MissingForecast,
}

/// A row excluded from metrics because it did not join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub window: usize,
    pub kind: GapKind,
    pub model: String,
    pub series_id: SeriesId,
    pub timestamp: NaiveDateTime,
}

/// Records and coverage gaps of one or more evaluation windows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub records: Vec<EvaluationRecord>,
    pub gaps: Vec<CoverageGap>,
}

impl Evaluation {
    pub fn gap_count(&self, kind: GapKind) -> usize {
        self.gaps.iter().filter(|g| g.kind == kind).count()
    }

    pub fn extend(&mut self, other: Evaluation) {
        self.records.extend(other.records);
        self.gaps.extend(other.gaps);
    }
}

/// Computes a set of metrics for every (model, series) pair.
#[derive(Clone)]
pub struct Evaluator {
    metrics: Vec<Arc<dyn Metric>>,
}

impl Evaluator {
    pub fn new(metrics: Vec<Arc<dyn Metric>>) -> Self {
        Self { metrics }
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name())
    }

    pub fn evaluate(&self, holdout: &Panel, forecasts: &[ForecastResult]) -> Evaluation {
        self.evaluate_window(0, holdout, forecasts)
    }

    pub fn evaluate_window(&self, window: usize, holdout: &Panel, forecasts: &[ForecastResult]) -> Evaluation {
        let actuals: BTreeMap<&str, BTreeMap<NaiveDateTime, f64>> = holdout
            .iter_series()
            .map(|(id, points)| {
                (id.as_str(), points.iter().map(|p| (p.timestamp, p.value)).collect())
            })
            .collect();

        let mut evaluation = Evaluation::default();
        for forecast in forecasts {
            let model_eval = self.evaluate_model(window, &actuals, forecast);
            let unmatched = model_eval.gap_count(GapKind::UnmatchedForecast);
            let missing = model_eval.gap_count(GapKind::MissingForecast);
            if unmatched + missing > 0 {
                warn!(
                    window,
                    model = %forecast.model,
                    unmatched_forecasts = unmatched,
                    missing_forecasts = missing,
                    "coverage gaps excluded from metrics"
                );
            }
            evaluation.extend(model_eval);
        }
        evaluation
    }

    fn evaluate_model(
        &self,
        window: usize,
        actuals: &BTreeMap<&str, BTreeMap<NaiveDateTime, f64>>,
        forecast: &ForecastResult,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let gap = |kind, series_id: &str, timestamp| CoverageGap {
            window,
            kind,
            model: forecast.model.clone(),
            series_id: series_id.to_string(),
            timestamp,
        };

        let mut predicted: BTreeMap<&str, BTreeMap<NaiveDateTime, f64>> = BTreeMap::new();
        for point in &forecast.points {
            let by_ts = predicted.entry(point.series_id.as_str()).or_default();
            if by_ts.insert(point.timestamp, point.value).is_some() {
                debug!(model = %forecast.model, series_id = %point.series_id, timestamp = %point.timestamp, "duplicate forecast row");
                evaluation.gaps.push(gap(GapKind::UnmatchedForecast, point.series_id.as_str(), point.timestamp));
            }
        }

        let series: BTreeSet<&str> = actuals.keys().chain(predicted.keys()).copied().collect();
        let empty = BTreeMap::new();
        for series_id in series {
            let actual = actuals.get(series_id).unwrap_or(&empty);
            let pred = predicted.get(series_id).unwrap_or(&empty);

            let mut pairs = Vec::with_capacity(actual.len());
            for (ts, a) in actual {
                match pred.get(ts) {
                    Some(p) => pairs.push((*a, *p)),
                    None => evaluation.gaps.push(gap(GapKind::MissingForecast, series_id, *ts)),
                }
            }
            for ts in pred.keys().filter(|ts| !actual.contains_key(ts)) {
                evaluation.gaps.push(gap(GapKind::UnmatchedForecast, series_id, *ts));
            }

            if pairs.is_empty() {
                continue;
            }
            for metric in &self.metrics {
                match metric.compute(&pairs) {
                    Ok(value) => evaluation.records.push(EvaluationRecord {
                        window,
                        metric: metric.name().to_string(),
                        model: forecast.model.clone(),
                        series_id: series_id.to_string(),
                        value,
                        n_points: pairs.len(),
                    }),
                    Err(MetricError::EmptyData) => {}
                    Err(e) => warn!(
                        model = %forecast.model,
                        series_id,
                        metric = metric.name(),
                        error = %e,
                        "metric undefined for series"
                    ),
                }
            }
        }
        evaluation
    }
}

/// Evaluate `forecasts` against `holdout` with a single metric.
pub fn evaluate(holdout: &Panel, forecasts: &[ForecastResult], metric: Arc<dyn Metric>) -> Evaluation {
    Evaluator::new(vec![metric]).evaluate(holdout, forecasts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForecastPoint, Record};
    use crate::forecast::metrics::{FnMetric, MetricKind};
    use chrono::NaiveDate;

    fn t(i: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, i).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn holdout(rows: &[(&str, u32, f64)]) -> Panel {
        Panel::from_records(
            vec![],
            rows.iter()
                .map(|(id, day, y)| Record {
                    series_id: id.to_string(),
                    timestamp: t(*day),
                    value: *y,
                    exogenous: vec![],
                })
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn forecast(model: &str, rows: &[(&str, u32, f64)]) -> ForecastResult {
        let mut result = ForecastResult::new(model);
        result.points = rows
            .iter()
            .map(|(id, day, yhat)| ForecastPoint {
                series_id: id.to_string(),
                timestamp: t(*day),
                value: *yhat,
                intervals: vec![],
            })
            .collect();
        result
    }

    #[test]
    fn test_single_point_absolute_error() {
        let eval = evaluate(
            &holdout(&[("1", 1, 10.0)]),
            &[forecast("m", &[("1", 1, 8.0)])],
            Arc::new(MetricKind::Mae),
        );
        assert_eq!(eval.records.len(), 1);
        let r = &eval.records[0];
        assert_eq!((r.model.as_str(), r.series_id.as_str(), r.value), ("m", "1", 2.0));
        assert!(eval.gaps.is_empty());
    }

    #[test]
    fn test_unmatched_forecast_row_is_gap_not_error() {
        let eval = evaluate(
            &holdout(&[("1", 1, 10.0)]),
            &[forecast("m", &[("1", 1, 8.0), ("1", 2, 50.0)])],
            Arc::new(MetricKind::Mae),
        );
        assert_eq!(eval.records[0].value, 2.0);
        assert_eq!(eval.records[0].n_points, 1);
        assert_eq!(eval.gap_count(GapKind::UnmatchedForecast), 1);
        assert_eq!(eval.gaps[0].timestamp, t(2));
    }

    #[test]
    fn test_missing_forecast_rows_are_gaps() {
        let eval = evaluate(
            &holdout(&[("1", 1, 10.0), ("1", 2, 12.0), ("2", 1, 5.0)]),
            &[forecast("m", &[("1", 1, 8.0)])],
            Arc::new(MetricKind::Mae),
        );
        assert_eq!(eval.records.len(), 1);
        assert_eq!(eval.gap_count(GapKind::MissingForecast), 2);
        assert!(eval.gaps.iter().any(|g| g.series_id == "2"));
    }

    #[test]
    fn test_forecast_for_unknown_series_is_gap() {
        let eval = evaluate(
            &holdout(&[("1", 1, 10.0)]),
            &[forecast("m", &[("1", 1, 10.0), ("9", 1, 3.0)])],
            Arc::new(MetricKind::Mae),
        );
        assert_eq!(eval.records.len(), 1);
        assert_eq!(eval.gap_count(GapKind::UnmatchedForecast), 1);
        assert_eq!(eval.gaps[0].series_id, "9");
    }

    #[test]
    fn test_multiple_metrics_and_models() {
        let metrics: Vec<Arc<dyn Metric>> = vec![Arc::new(MetricKind::Mae), Arc::new(MetricKind::Rmse)];
        let evaluator = Evaluator::new(metrics);
        let eval = evaluator.evaluate_window(
            3,
            &holdout(&[("a", 1, 1.0), ("a", 2, 3.0)]),
            &[forecast("x", &[("a", 1, 2.0), ("a", 2, 2.0)]), forecast("y", &[("a", 1, 1.0), ("a", 2, 3.0)])],
        );
        assert_eq!(eval.records.len(), 4);
        assert!(eval.records.iter().all(|r| r.window == 3));
        let x_rmse = eval.records.iter().find(|r| r.model == "x" && r.metric == "rmse").unwrap();
        assert_eq!(x_rmse.value, 1.0);
    }

    #[test]
    fn test_pluggable_metric_and_undefined_values() {
        let bias: Arc<dyn Metric> = Arc::new(FnMetric::new("bias", |pairs: &[(f64, f64)]| {
            Ok(pairs.iter().map(|(a, p)| p - a).sum::<f64>() / pairs.len() as f64)
        }));
        let evaluator = Evaluator::new(vec![bias, Arc::new(MetricKind::Mape)]);
        let eval = evaluator.evaluate(&holdout(&[("z", 1, 0.0)]), &[forecast("m", &[("z", 1, 2.0)])]);

        // mape is undefined on an all-zero series, bias is not
        assert_eq!(eval.records.len(), 1);
        assert_eq!(eval.records[0].metric, "bias");
        assert_eq!(eval.records[0].value, 2.0);
    }
}
