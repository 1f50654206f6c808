use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::SeriesId;

/// Errors surfaced by the benchmark pipeline.
///
/// Only structural problems (schema, configuration, every provider failing)
/// abort a run. Failures scoped to one series or one model are carried inside
/// forecast results and coverage reports instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Value {value} outside transform domain ({transform}) for series {series_id} at {timestamp}")]
    DomainViolation {
        transform: String,
        series_id: SeriesId,
        timestamp: NaiveDateTime,
        value: f64,
    },

    #[error("Insufficient history for series {series_id}: {len} points, need at least {required}")]
    InsufficientHistory {
        series_id: SeriesId,
        len: usize,
        required: usize,
    },

    #[error("Invalid horizon: {0}")]
    InvalidHorizon(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("All {0} forecast providers failed")]
    AllProvidersFailed(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// Errors raised by a forecast provider for a whole request.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Remote API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Future exogenous data misaligned: {0}")]
    MisalignedExogenous(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Provider task failed: {0}")]
    Join(String),
}

impl From<reqwest_middleware::Error> for ProviderError {
    fn from(err: reqwest_middleware::Error) -> Self {
        ProviderError::Http(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
