use futures::future::join_all;
use itertools::Itertools;
use tracing::{error, info};

use super::provider::{ForecastProvider, ForecastRequest};
use crate::domain::ForecastResult;
use crate::error::{PipelineError, ProviderError, Result};

/// What one provider returned for a request
#[derive(Debug)]
pub struct ProviderOutcome {
    pub provider: String,
    pub result: std::result::Result<Vec<ForecastResult>, ProviderError>,
}

/// Runs every registered provider against the same request.
pub struct ForecastEngine {
    providers: Vec<Box<dyn ForecastProvider>>,
}

impl ForecastEngine {
    pub fn new(providers: Vec<Box<dyn ForecastProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run all providers concurrently.
    ///
    /// A failing provider is reported in its outcome and does not affect the
    /// others; the call only fails when every provider failed.
    pub async fn run(&self, request: &ForecastRequest) -> Result<Vec<ProviderOutcome>> {
        if self.providers.is_empty() {
            return Err(PipelineError::Config("no forecast providers enabled".into()));
        }

        let outcomes: Vec<ProviderOutcome> = join_all(self.providers.iter().map(|p| async move {
            ProviderOutcome {
                provider: p.name().to_string(),
                result: p.predict(request).await,
            }
        }))
        .await;

        for outcome in &outcomes {
            match &outcome.result {
                Ok(results) => info!(
                    provider = %outcome.provider,
                    models = results.len(),
                    "provider finished"
                ),
                Err(e) => error!(provider = %outcome.provider, error = %e, "provider failed"),
            }
        }

        if outcomes.iter().all(|o| o.result.is_err()) {
            return Err(PipelineError::AllProvidersFailed(outcomes.len()));
        }

        // reports are keyed by model id, two providers must never share one
        if let Some(dup) = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flatten()
            .map(|r| r.model.as_str())
            .duplicates()
            .next()
        {
            return Err(PipelineError::Config(format!(
                "model id '{dup}' produced by more than one provider"
            )));
        }
        Ok(outcomes)
    }
}
