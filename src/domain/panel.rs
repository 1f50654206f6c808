//! Panel of time series
//!
//! A panel is the flat `(series_id, timestamp, value, exogenous...)` table that
//! every stage of the benchmark consumes. It is stored grouped by series and is
//! immutable once built: transformations and splits return new panels.

use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SeriesId;
use crate::error::{PipelineError, ProviderError, Result};

/// One flat row of a panel, as read from a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub series_id: SeriesId,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    /// Values for the panel's exogenous columns, in column order
    pub exogenous: Vec<f64>,
}

/// One point of a single series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub exogenous: Vec<f64>,
}

/// A collection of series sharing one exogenous column set.
///
/// Invariants:
/// - within a series timestamps are unique and strictly increasing
/// - every observation carries exactly `exogenous_columns.len()` exogenous values
/// - target and exogenous values are finite
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Panel {
    exogenous_columns: Vec<String>,
    series: BTreeMap<SeriesId, Vec<Observation>>,
}

impl Panel {
    /// Build a panel from flat records, sorting each series chronologically.
    pub fn from_records<I>(exogenous_columns: Vec<String>, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        if let Some(dup) = exogenous_columns.iter().duplicates().next() {
            return Err(PipelineError::Schema(format!(
                "duplicate exogenous column '{dup}'"
            )));
        }

        let mut series: BTreeMap<SeriesId, Vec<Observation>> = BTreeMap::new();
        for record in records {
            if record.exogenous.len() != exogenous_columns.len() {
                return Err(PipelineError::Schema(format!(
                    "series {} at {}: expected {} exogenous values, got {}",
                    record.series_id,
                    record.timestamp,
                    exogenous_columns.len(),
                    record.exogenous.len()
                )));
            }
            if !record.value.is_finite() || record.exogenous.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::Schema(format!(
                    "series {} at {}: non-finite value",
                    record.series_id, record.timestamp
                )));
            }
            series.entry(record.series_id).or_default().push(Observation {
                timestamp: record.timestamp,
                value: record.value,
                exogenous: record.exogenous,
            });
        }

        for (id, points) in series.iter_mut() {
            points.sort_by_key(|p| p.timestamp);
            if let Some(dup) = points.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
                return Err(PipelineError::Schema(format!(
                    "series {id} has duplicate timestamp {}",
                    dup[0].timestamp
                )));
            }
        }

        Ok(Self {
            exogenous_columns,
            series,
        })
    }

    /// Assemble a panel from series that already satisfy the invariants.
    pub(crate) fn from_series(
        exogenous_columns: Vec<String>,
        series: BTreeMap<SeriesId, Vec<Observation>>,
    ) -> Self {
        Self {
            exogenous_columns,
            series,
        }
    }

    pub fn exogenous_columns(&self) -> &[String] {
        &self.exogenous_columns
    }

    pub fn has_exogenous(&self) -> bool {
        !self.exogenous_columns.is_empty()
    }

    /// Number of series
    pub fn n_series(&self) -> usize {
        self.series.len()
    }

    /// Total number of observations across all series
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series_ids(&self) -> impl Iterator<Item = &SeriesId> {
        self.series.keys()
    }

    pub fn series(&self, series_id: &str) -> Option<&[Observation]> {
        self.series.get(series_id).map(Vec::as_slice)
    }

    /// Iterate series in id order
    pub fn iter_series(&self) -> impl Iterator<Item = (&SeriesId, &[Observation])> {
        self.series.iter().map(|(id, points)| (id, points.as_slice()))
    }

    /// Iterate every observation in (series_id, timestamp) order
    pub fn records(&self) -> impl Iterator<Item = (&SeriesId, &Observation)> {
        self.series
            .iter()
            .flat_map(|(id, points)| points.iter().map(move |p| (id, p)))
    }

    /// Target values of one series in chronological order
    pub fn values(&self, series_id: &str) -> Option<Vec<f64>> {
        self.series(series_id)
            .map(|points| points.iter().map(|p| p.value).collect())
    }

    /// Last timestamp of one series
    pub fn last_timestamp(&self, series_id: &str) -> Option<NaiveDateTime> {
        self.series(series_id)
            .and_then(|points| points.last())
            .map(|p| p.timestamp)
    }

    /// Return a new panel with every target value replaced by `f`.
    ///
    /// Timestamps and exogenous values are untouched.
    pub fn map_values<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&SeriesId, &Observation) -> Result<f64>,
    {
        let mut series = BTreeMap::new();
        for (id, points) in &self.series {
            let mapped = points
                .iter()
                .map(|p| {
                    Ok(Observation {
                        timestamp: p.timestamp,
                        value: f(id, p)?,
                        exogenous: p.exogenous.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            series.insert(id.clone(), mapped);
        }
        Ok(Self::from_series(self.exogenous_columns.clone(), series))
    }

    /// The same targets with every exogenous column removed.
    pub fn without_exogenous(&self) -> Self {
        let series = self
            .series
            .iter()
            .map(|(id, points)| {
                let stripped = points
                    .iter()
                    .map(|p| Observation {
                        timestamp: p.timestamp,
                        value: p.value,
                        exogenous: Vec::new(),
                    })
                    .collect();
                (id.clone(), stripped)
            })
            .collect();
        Self::from_series(Vec::new(), series)
    }

    /// Exogenous values of this panel keyed by (series_id, timestamp).
    pub fn exogenous_frame(&self) -> ExogenousFrame {
        let rows = self
            .series
            .iter()
            .map(|(id, points)| {
                let by_ts = points
                    .iter()
                    .map(|p| (p.timestamp, p.exogenous.clone()))
                    .collect();
                (id.clone(), by_ts)
            })
            .collect();
        ExogenousFrame {
            columns: self.exogenous_columns.clone(),
            rows,
        }
    }
}

// ============================================================================
// Future Exogenous Values
// ============================================================================

/// Exogenous values for future timestamps, keyed explicitly by series and
/// timestamp so they can never be matched to the wrong row by position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExogenousFrame {
    columns: Vec<String>,
    rows: BTreeMap<SeriesId, BTreeMap<NaiveDateTime, Vec<f64>>>,
}

impl ExogenousFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Insert the values for one (series, timestamp) key.
    pub fn insert(
        &mut self,
        series_id: impl Into<SeriesId>,
        timestamp: NaiveDateTime,
        values: Vec<f64>,
    ) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(PipelineError::Schema(format!(
                "exogenous row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows
            .entry(series_id.into())
            .or_default()
            .insert(timestamp, values);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, series_id: &str, timestamp: NaiveDateTime) -> Option<&[f64]> {
        self.rows
            .get(series_id)
            .and_then(|by_ts| by_ts.get(&timestamp))
            .map(Vec::as_slice)
    }

    /// Number of keyed rows
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// For each of `wanted` columns, the index of the same-named column in
    /// this frame. Fails if the column sets differ.
    pub fn column_mapping(&self, wanted: &[String]) -> std::result::Result<Vec<usize>, ProviderError> {
        if wanted.len() != self.columns.len() {
            return Err(ProviderError::MisalignedExogenous(format!(
                "history has columns {:?}, future values have {:?}",
                wanted, self.columns
            )));
        }
        wanted
            .iter()
            .map(|name| {
                self.columns.iter().position(|c| c == name).ok_or_else(|| {
                    ProviderError::MisalignedExogenous(format!(
                        "future values are missing column '{name}'"
                    ))
                })
            })
            .collect()
    }
}
