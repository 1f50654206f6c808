//! Hosted forecasting API client
//!
//! Sends the whole input panel in one JSON request and maps the response back
//! into a [`ForecastResult`]. Transient failures (connection errors, timeouts,
//! 5xx, 429) are retried with exponential backoff a bounded number of times;
//! once retries are exhausted the call fails for this provider.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tracing::{debug, info, warn};

use super::provider::{ForecastProvider, ForecastRequest};
use crate::config::RemoteConfig;
use crate::domain::{ForecastPoint, ForecastResult, Frequency, PredictionInterval};
use crate::error::ProviderError;

/// Loss the remote model minimises while fine-tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FinetuneLoss {
    #[default]
    Default,
    Mae,
    Mse,
    Rmse,
    Mape,
    Smape,
}

#[derive(Clone)]
pub struct RemoteForecastProvider {
    endpoint: String,
    client: ClientWithMiddleware,
    model_id: String,
    model: String,
    finetune_steps: u32,
    finetune_loss: FinetuneLoss,
    clean_ex_first: bool,
}

impl RemoteForecastProvider {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forecast-bench/0.1"));
        if let Some(key) = cfg.api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| ProviderError::Http("API key is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .default_headers(headers)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                Duration::from_millis(cfg.retry_min_backoff_ms),
                Duration::from_millis(cfg.retry_max_backoff_ms.max(cfg.retry_min_backoff_ms)),
            )
            .build_with_max_retries(cfg.max_retries);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            endpoint: format!("{}/forecast", cfg.base_url.trim_end_matches('/')),
            client,
            model_id: cfg.model_id.clone(),
            model: cfg.model.clone(),
            finetune_steps: cfg.finetune_steps,
            finetune_loss: cfg.finetune_loss,
            clean_ex_first: cfg.clean_ex_first,
        })
    }

    /// Build the request body, resolving future exogenous values by key.
    fn build_request(&self, request: &ForecastRequest) -> Result<ApiRequest, ProviderError> {
        let input = &request.input;
        let columns = input.exogenous_columns();

        let y = input
            .records()
            .map(|(id, p)| ApiHistoryRow {
                unique_id: id.clone(),
                ds: p.timestamp,
                y: p.value,
                exogenous: columns.iter().cloned().zip(p.exogenous.iter().copied()).collect(),
            })
            .collect();

        let x = match &request.future_exogenous {
            None if input.has_exogenous() => {
                return Err(ProviderError::MisalignedExogenous(format!(
                    "history has exogenous columns {columns:?} but no future values were supplied"
                )));
            }
            None => None,
            Some(frame) => {
                let mapping = frame.column_mapping(columns)?;
                if mapping.is_empty() {
                    None
                } else {
                    let mut rows = Vec::new();
                    for id in input.series_ids() {
                        let future = input
                            .last_timestamp(id)
                            .and_then(|last| request.frequency.future_timestamps(last, request.horizon))
                            .ok_or_else(|| {
                                ProviderError::MisalignedExogenous(format!(
                                    "cannot derive future timestamps for series {id}"
                                ))
                            })?;
                        for ds in future {
                            let values = frame.get(id, ds).ok_or_else(|| {
                                ProviderError::MisalignedExogenous(format!(
                                    "no future exogenous values for series {id} at {ds}"
                                ))
                            })?;
                            rows.push(ApiExogenousRow {
                                unique_id: id.clone(),
                                ds,
                                exogenous: columns
                                    .iter()
                                    .cloned()
                                    .zip(mapping.iter().map(|&i| values[i]))
                                    .collect(),
                            });
                        }
                    }
                    Some(rows)
                }
            }
        };

        let finetuning = self.finetune_steps > 0;
        Ok(ApiRequest {
            model: self.model.clone(),
            freq: request.frequency,
            fh: request.horizon,
            level: request.levels.clone(),
            finetune_steps: finetuning.then_some(self.finetune_steps),
            finetune_loss: finetuning.then_some(self.finetune_loss),
            clean_ex_first: self.clean_ex_first,
            y,
            x,
        })
    }

    fn parse_response(&self, request: &ForecastRequest, response: ApiResponse) -> ForecastResult {
        let requested: BTreeSet<&str> = request.input.series_ids().map(String::as_str).collect();
        let mut result = ForecastResult::new(self.model_id.clone());
        let mut unknown = 0usize;

        for row in response.data {
            if !requested.contains(row.unique_id.as_str()) {
                unknown += 1;
                continue;
            }
            result.points.push(ForecastPoint {
                series_id: row.unique_id,
                timestamp: row.ds,
                value: row.value,
                intervals: row
                    .intervals
                    .into_iter()
                    .map(|iv| PredictionInterval {
                        level: iv.level,
                        lower: iv.lo,
                        upper: iv.hi,
                    })
                    .collect(),
            });
        }
        if unknown > 0 {
            warn!(model = %self.model_id, rows = unknown, "dropping response rows for series that were not requested");
        }

        let answered: BTreeSet<String> = result.forecast_series().into_iter().map(str::to_string).collect();
        for id in requested {
            if !answered.contains(id) {
                warn!(model = %self.model_id, series_id = id, "series missing from remote response");
                result.push_failure(id, "missing from remote response");
            }
        }
        result
    }
}

#[async_trait]
impl ForecastProvider for RemoteForecastProvider {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn predict(&self, request: &ForecastRequest) -> Result<Vec<ForecastResult>, ProviderError> {
        let body = self.build_request(request)?;
        debug!(
            endpoint = %self.endpoint,
            model = %body.model,
            rows = body.y.len(),
            future_rows = body.x.as_ref().map_or(0, Vec::len),
            horizon = body.fh,
            finetune_steps = ?body.finetune_steps,
            "sending forecast request"
        );

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                warn!(model = %self.model_id, %status, "remote API rejected credentials");
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ApiResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let result = self.parse_response(request, parsed);
        info!(
            model = %self.model_id,
            points = result.points.len(),
            failed_series = result.failures.len(),
            "remote forecast complete"
        );
        Ok(vec![result])
    }
}

// Wire format

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    freq: Frequency,
    fh: usize,
    level: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finetune_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finetune_loss: Option<FinetuneLoss>,
    clean_ex_first: bool,
    y: Vec<ApiHistoryRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<Vec<ApiExogenousRow>>,
}

#[derive(Debug, Serialize)]
struct ApiHistoryRow {
    unique_id: String,
    ds: NaiveDateTime,
    y: f64,
    #[serde(flatten)]
    exogenous: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct ApiExogenousRow {
    unique_id: String,
    ds: NaiveDateTime,
    #[serde(flatten)]
    exogenous: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiForecastRow>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastRow {
    unique_id: String,
    ds: NaiveDateTime,
    value: f64,
    #[serde(default)]
    intervals: Vec<ApiInterval>,
}

#[derive(Debug, Deserialize)]
struct ApiInterval {
    level: f64,
    lo: f64,
    hi: f64,
}
