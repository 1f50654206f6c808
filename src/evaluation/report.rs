//! Per-model summary of evaluation records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::{Display, EnumString};
use tracing::warn;

use super::evaluator::EvaluationRecord;

/// How per-series values are reduced to one number per (metric, model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
}

impl Aggregation {
    fn apply(&self, values: &mut [f64]) -> f64 {
        match self {
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
        }
    }
}

/// Aggregate of one metric for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub metric: String,
    pub model: String,
    pub value: f64,
    /// Number of (series, window) records that contributed
    pub record_count: usize,
}

/// Aggregates keyed by (metric, model), sorted by metric then model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub aggregation: Aggregation,
    pub entries: Vec<SummaryEntry>,
}

/// Reduce evaluation records to one value per (metric, model).
///
/// A model with no record for some series (because it failed there or the
/// metric was undefined) is aggregated over the series it does have; the
/// missing ones are not counted as zero.
pub fn summarize(records: &[EvaluationRecord], aggregation: Aggregation) -> Summary {
    let mut grouped: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for record in records {
        if !record.value.is_finite() {
            warn!(
                window = record.window,
                metric = %record.metric,
                model = %record.model,
                series_id = %record.series_id,
                value = record.value,
                "non-finite metric value left out of summary"
            );
            continue;
        }
        grouped
            .entry((record.metric.as_str(), record.model.as_str()))
            .or_default()
            .push(record.value);
    }

    let entries = grouped
        .into_iter()
        .map(|((metric, model), mut values)| SummaryEntry {
            metric: metric.to_string(),
            model: model.to_string(),
            value: aggregation.apply(&mut values),
            record_count: values.len(),
        })
        .collect();

    Summary {
        aggregation,
        entries,
    }
}

impl Summary {
    pub fn get(&self, metric: &str, model: &str) -> Option<&SummaryEntry> {
        self.entries
            .iter()
            .find(|e| e.metric == metric && e.model == model)
    }

    /// Entries as a `(metric, model) -> value` map
    pub fn to_map(&self) -> BTreeMap<(String, String), f64> {
        self.entries
            .iter()
            .map(|e| ((e.metric.clone(), e.model.clone()), e.value))
            .collect()
    }

    /// Model with the lowest aggregate for `metric`
    pub fn best_model(&self, metric: &str) -> Option<&SummaryEntry> {
        self.entries
            .iter()
            .filter(|e| e.metric == metric)
            .min_by(|a, b| a.value.total_cmp(&b.value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model_width = self
            .entries
            .iter()
            .map(|e| e.model.len())
            .max()
            .unwrap_or(5)
            .max(5);
        writeln!(
            f,
            "{:<8} {:<model_width$} {:>14} {:>8}",
            "metric",
            "model",
            self.aggregation,
            "records"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "{:<8} {:<model_width$} {:>14.4} {:>8}",
                e.metric, e.model, e.value, e.record_count
            )?;
        }
        Ok(())
    }
}
