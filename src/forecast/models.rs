//! Statistical baseline models
//!
//! Textbook benchmarks the hosted model is compared against. Each model is
//! stateless: `forecast` fits on the given history and returns `horizon`
//! point forecasts, so one instance can be shared across series and threads.
//!
//! - **Naive**: repeat the last observation
//! - **Seasonal naive**: repeat the last full season
//! - **Historic average**: mean of the whole history
//! - **Window average**: mean of the last `window` observations
//! - **SES**: simple exponential smoothing, flat forecast at the final level
//! - **Holt**: level + trend exponential smoothing, linear forecast
//! - **Random walk with drift**: last value plus the average historical change

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Errors raised while fitting a baseline on one series
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Model produced a non-finite forecast")]
    NonFinite,
}

/// A local forecasting model
pub trait BaselineModel: Send + Sync + std::fmt::Debug {
    /// Fit on `history` (chronological) and forecast the next `horizon` points.
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError>;
}

fn require(history: &[f64], required: usize) -> Result<(), ModelError> {
    if history.len() < required {
        return Err(ModelError::InsufficientData {
            required,
            actual: history.len(),
        });
    }
    Ok(())
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), ModelError> {
    if !(0.0 < value && value <= 1.0) {
        return Err(ModelError::InvalidParameter {
            name: name.to_string(),
            reason: format!("must be in (0, 1], got {value}"),
        });
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Naive;

impl BaselineModel for Naive {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, 1)?;
        Ok(vec![history[history.len() - 1]; horizon])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeasonalNaive {
    season_length: usize,
}

impl SeasonalNaive {
    pub fn new(season_length: usize) -> Result<Self, ModelError> {
        if season_length == 0 {
            return Err(ModelError::InvalidParameter {
                name: "season_length".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self { season_length })
    }
}

impl BaselineModel for SeasonalNaive {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        let m = self.season_length;
        require(history, m)?;
        let last_season = &history[history.len() - m..];
        Ok((0..horizon).map(|h| last_season[h % m]).collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricAverage;

impl BaselineModel for HistoricAverage {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, 1)?;
        Ok(vec![mean(history); horizon])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowAverage {
    window: usize,
}

impl WindowAverage {
    pub fn new(window: usize) -> Result<Self, ModelError> {
        if window == 0 {
            return Err(ModelError::InvalidParameter {
                name: "window".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self { window })
    }
}

impl BaselineModel for WindowAverage {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, self.window)?;
        Ok(vec![mean(&history[history.len() - self.window..]); horizon])
    }
}

/// Simple exponential smoothing
///
/// `S_t = α * Y_t + (1 - α) * S_{t-1}`, initialised with the first observation.
#[derive(Debug, Clone, Copy)]
pub struct SimpleExponentialSmoothing {
    alpha: f64,
}

impl SimpleExponentialSmoothing {
    pub fn new(alpha: f64) -> Result<Self, ModelError> {
        check_unit_interval("alpha", alpha)?;
        Ok(Self { alpha })
    }
}

impl BaselineModel for SimpleExponentialSmoothing {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, 1)?;
        let level = history[1..]
            .iter()
            .fold(history[0], |level, &y| self.alpha * y + (1.0 - self.alpha) * level);
        Ok(vec![level; horizon])
    }
}

/// Holt's linear trend method
///
/// Level and trend are initialised from the first two observations.
#[derive(Debug, Clone, Copy)]
pub struct Holt {
    alpha: f64,
    beta: f64,
}

impl Holt {
    pub fn new(alpha: f64, beta: f64) -> Result<Self, ModelError> {
        check_unit_interval("alpha", alpha)?;
        check_unit_interval("beta", beta)?;
        Ok(Self { alpha, beta })
    }
}

impl BaselineModel for Holt {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, 2)?;
        let mut level = history[0];
        let mut trend = history[1] - history[0];
        for &y in &history[1..] {
            let prev_level = level;
            level = self.alpha * y + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
        }
        let out: Vec<f64> = (1..=horizon).map(|h| level + h as f64 * trend).collect();
        if out.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomWalkWithDrift;

impl BaselineModel for RandomWalkWithDrift {
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        require(history, 2)?;
        let n = history.len();
        let last = history[n - 1];
        let drift = (last - history[0]) / (n - 1) as f64;
        Ok((1..=horizon).map(|h| last + h as f64 * drift).collect())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Baseline family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelKind {
    Naive,
    SeasonalNaive,
    HistoricAverage,
    WindowAverage,
    Ses,
    Holt,
    RandomWalkWithDrift,
}

impl ModelKind {
    /// Model identifier used in reports when no alias is configured
    pub fn default_alias(&self) -> &'static str {
        match self {
            Self::Naive => "Naive",
            Self::SeasonalNaive => "SeasonalNaive",
            Self::HistoricAverage => "HistoricAverage",
            Self::WindowAverage => "WindowAverage",
            Self::Ses => "SES",
            Self::Holt => "Holt",
            Self::RandomWalkWithDrift => "RWD",
        }
    }
}

/// One configured baseline variant
///
/// ```toml
/// [[local.models]]
/// kind = "holt"
/// alias = "Holt(0.3,0.1)"
/// alpha = 0.3
/// beta = 0.1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModelConfig {
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
}

impl LocalModelConfig {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            alias: None,
            season_length: None,
            window: None,
            alpha: None,
            beta: None,
        }
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.kind.default_alias())
    }

    /// Instantiate the model, checking that its hyperparameters are present.
    pub fn build(&self) -> Result<Box<dyn BaselineModel>, ModelError> {
        fn required<T: Copy>(value: Option<T>, name: &str, kind: ModelKind) -> Result<T, ModelError> {
            value.ok_or_else(|| ModelError::InvalidParameter {
                name: name.to_string(),
                reason: format!("required by {kind}"),
            })
        }

        Ok(match self.kind {
            ModelKind::Naive => Box::new(Naive),
            ModelKind::SeasonalNaive => Box::new(SeasonalNaive::new(required(
                self.season_length,
                "season_length",
                self.kind,
            )?)?),
            ModelKind::HistoricAverage => Box::new(HistoricAverage),
            ModelKind::WindowAverage => {
                Box::new(WindowAverage::new(required(self.window, "window", self.kind)?)?)
            }
            ModelKind::Ses => Box::new(SimpleExponentialSmoothing::new(required(
                self.alpha, "alpha", self.kind,
            )?)?),
            ModelKind::Holt => Box::new(Holt::new(
                required(self.alpha, "alpha", self.kind)?,
                required(self.beta, "beta", self.kind)?,
            )?),
            ModelKind::RandomWalkWithDrift => Box::new(RandomWalkWithDrift),
        })
    }
}
