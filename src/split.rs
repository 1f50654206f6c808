//! Train/holdout partitioning of a panel
//!
//! The holdout of every series is its chronologically last `horizon` points;
//! the input is everything before. Rolling-origin windows repeat the split
//! with the cut moved back in fixed steps.

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{Observation, Panel, SeriesId};
use crate::error::{PipelineError, Result};

/// Input prefix and held-out suffix of every series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSplit {
    /// Window index, 0 for the oldest cut
    pub window: usize,
    pub input: Panel,
    pub holdout: Panel,
}

/// Hold out the last `horizon` points of every series.
///
/// Every series needs at least `horizon + 1` points; a shorter series fails
/// the whole split rather than being truncated.
pub fn split(panel: &Panel, horizon: usize) -> Result<SeriesSplit> {
    split_at_offset(panel, horizon, 0, 0)
}

/// `n_windows` rolling-origin splits, oldest first.
///
/// Window `k` (0-based, oldest first) holds out the `horizon` points ending
/// `step * (n_windows - 1 - k)` points before the end of each series.
pub fn rolling_windows(
    panel: &Panel,
    horizon: usize,
    n_windows: usize,
    step: usize,
) -> Result<Vec<SeriesSplit>> {
    if n_windows == 0 {
        return Err(PipelineError::Config("at least one evaluation window is required".into()));
    }
    if n_windows > 1 && step == 0 {
        return Err(PipelineError::Config("window step must be positive with several windows".into()));
    }
    (0..n_windows)
        .map(|window| {
            let offset = step.checked_mul(n_windows - 1 - window).ok_or_else(|| {
                PipelineError::Config(format!("{n_windows} windows of step {step} overflow the series index"))
            })?;
            split_at_offset(panel, horizon, offset, window)
        })
        .collect()
}

fn split_at_offset(panel: &Panel, horizon: usize, offset: usize, window: usize) -> Result<SeriesSplit> {
    if horizon == 0 {
        return Err(PipelineError::InvalidHorizon("horizon must be at least 1".into()));
    }
    let required = horizon
        .checked_add(offset)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| PipelineError::Config(format!("horizon {horizon} with offset {offset} overflows")))?;

    let mut input: BTreeMap<SeriesId, Vec<Observation>> = BTreeMap::new();
    let mut holdout: BTreeMap<SeriesId, Vec<Observation>> = BTreeMap::new();
    for (id, points) in panel.iter_series() {
        if points.len() < required {
            return Err(PipelineError::InsufficientHistory {
                series_id: id.clone(),
                len: points.len(),
                required,
            });
        }
        let end = points.len() - offset;
        let cut = end - horizon;
        input.insert(id.clone(), points[..cut].to_vec());
        holdout.insert(id.clone(), points[cut..end].to_vec());
    }

    debug!(
        window,
        horizon,
        offset,
        series = panel.n_series(),
        "split panel into input and holdout"
    );

    let columns = panel.exogenous_columns().to_vec();
    Ok(SeriesSplit {
        window,
        input: Panel::from_series(columns.clone(), input),
        holdout: Panel::from_series(columns, holdout),
    })
}
