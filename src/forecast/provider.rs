use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{ExogenousFrame, ForecastResult, Frequency, Panel};
use crate::error::ProviderError;

/// Everything a provider needs to forecast one panel
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    /// History to forecast from, already in transform space
    pub input: Arc<Panel>,
    pub horizon: usize,
    /// Confidence levels in percent for prediction intervals
    pub levels: Vec<f64>,
    pub frequency: Frequency,
    /// Exogenous values for the forecast timestamps, keyed by (series, timestamp)
    pub future_exogenous: Option<Arc<ExogenousFrame>>,
}

/// A source of forecasts: a hosted API or in-process statistical models.
///
/// A provider may produce several models per call (one `ForecastResult`
/// each). Failures scoped to a single series belong in
/// `ForecastResult::failures`; an `Err` means the whole call failed.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, request: &ForecastRequest) -> Result<Vec<ForecastResult>, ProviderError>;
}
