//! Invertible target transforms
//!
//! The input panel is moved into transform space before any provider sees it,
//! and every value column a provider returns (point forecast and all interval
//! bounds) is moved back before it is compared to raw-scale ground truth.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::warn;

use crate::domain::{ForecastResult, Panel};
use crate::error::{PipelineError, Result};

/// An invertible numeric transform with `inverse(forward(v)) == v` on its domain.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `value` can be passed to [`Transform::forward`].
    fn in_domain(&self, value: f64) -> bool;

    /// Map a raw value into transform space. `None` outside the domain.
    fn forward(&self, value: f64) -> Option<f64>;

    /// Map a transformed value back. `None` if the result is not finite.
    fn inverse(&self, value: f64) -> Option<f64>;
}

/// `ln(v + offset)`, inverted by `exp(t) - offset`.
///
/// With the default offset of 1 this is `log1p`/`expm1`, defined for v >= 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetLog {
    offset: f64,
}

impl OffsetLog {
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }
}

impl Default for OffsetLog {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Transform for OffsetLog {
    fn name(&self) -> &str {
        "offset_log"
    }

    fn in_domain(&self, value: f64) -> bool {
        value.is_finite() && value + self.offset > 0.0
    }

    fn forward(&self, value: f64) -> Option<f64> {
        if !self.in_domain(value) {
            return None;
        }
        if self.offset == 1.0 {
            Some(value.ln_1p())
        } else {
            Some((value + self.offset).ln())
        }
    }

    fn inverse(&self, value: f64) -> Option<f64> {
        let raw = if self.offset == 1.0 {
            value.exp_m1()
        } else {
            value.exp() - self.offset
        };
        raw.is_finite().then_some(raw)
    }
}

/// Leaves values untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn in_domain(&self, value: f64) -> bool {
        value.is_finite()
    }

    fn forward(&self, value: f64) -> Option<f64> {
        value.is_finite().then_some(value)
    }

    fn inverse(&self, value: f64) -> Option<f64> {
        value.is_finite().then_some(value)
    }
}

/// Transform selection as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    #[default]
    Log1p,
    Identity,
}

impl TransformKind {
    pub fn build(&self) -> Box<dyn Transform> {
        match self {
            Self::Log1p => Box::new(OffsetLog::default()),
            Self::Identity => Box::new(Identity),
        }
    }
}

// ============================================================================
// Panel / forecast helpers
// ============================================================================

/// Fail on the first target value outside the transform's domain.
pub fn check_panel(transform: &dyn Transform, panel: &Panel) -> Result<()> {
    match panel.records().find(|(_, p)| !transform.in_domain(p.value)) {
        Some((id, p)) => Err(PipelineError::DomainViolation {
            transform: transform.name().to_string(),
            series_id: id.clone(),
            timestamp: p.timestamp,
            value: p.value,
        }),
        None => Ok(()),
    }
}

/// Apply `forward` to every target value of `panel`.
pub fn forward_panel(transform: &dyn Transform, panel: &Panel) -> Result<Panel> {
    panel.map_values(|id, p| {
        transform
            .forward(p.value)
            .ok_or_else(|| PipelineError::DomainViolation {
                transform: transform.name().to_string(),
                series_id: id.clone(),
                timestamp: p.timestamp,
                value: p.value,
            })
    })
}

/// Apply `inverse` to the point forecast and every interval bound.
///
/// A series with any value that cannot be inverted loses all of its points
/// and is recorded as a failure of that model; other series are unaffected.
pub fn inverse_forecast(transform: &dyn Transform, result: ForecastResult) -> ForecastResult {
    let ForecastResult {
        model,
        points,
        mut failures,
    } = result;

    let mut out = Vec::with_capacity(points.len());
    let mut broken: Vec<String> = Vec::new();
    for mut point in points {
        if broken.contains(&point.series_id) {
            continue;
        }
        let ok = match transform.inverse(point.value) {
            Some(v) => {
                point.value = v;
                point.intervals.iter_mut().all(|iv| {
                    match (transform.inverse(iv.lower), transform.inverse(iv.upper)) {
                        (Some(lo), Some(hi)) => {
                            iv.lower = lo;
                            iv.upper = hi;
                            true
                        }
                        _ => false,
                    }
                })
            }
            None => false,
        };
        if ok {
            out.push(point);
        } else {
            warn!(
                model = %model,
                series_id = %point.series_id,
                timestamp = %point.timestamp,
                transform = transform.name(),
                "forecast could not be inverse-transformed, dropping series"
            );
            broken.push(point.series_id);
        }
    }

    out.retain(|p| !broken.contains(&p.series_id));
    failures.extend(broken.into_iter().map(|series_id| crate::domain::SeriesFailure {
        series_id,
        reason: format!("{} inverse produced a non-finite value", transform.name()),
    }));

    ForecastResult {
        model,
        points: out,
        failures,
    }
}
