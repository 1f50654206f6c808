use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};
use validator::Validate;

use crate::domain::Frequency;
use crate::evaluation::Aggregation;
use crate::forecast::{FinetuneLoss, LocalModelConfig, MetricKind, ModelKind};
use crate::transform::TransformKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[validate(nested)]
    pub data: DataConfig,
    #[validate(nested)]
    pub remote: RemoteConfig,
    #[validate(nested)]
    pub local: LocalConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(range(min = 1))]
    pub horizon: usize,
    /// Prediction interval levels in percent
    pub levels: Vec<f64>,
    pub frequency: Frequency,
    pub transform: TransformKind,
    #[validate(length(min = 1))]
    pub metrics: Vec<MetricKind>,
    pub aggregation: Aggregation,
    /// Rolling-origin evaluation windows; 1 evaluates the last horizon only
    #[validate(range(min = 1))]
    pub windows: usize,
    /// Points between consecutive window cuts
    pub step: usize,
    pub use_exogenous: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon: 28,
            levels: vec![80.0, 90.0],
            frequency: Frequency::Day,
            transform: TransformKind::Log1p,
            metrics: vec![MetricKind::Mae],
            aggregation: Aggregation::Mean,
            windows: 1,
            step: 28,
            use_exogenous: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    pub path: PathBuf,
    #[validate(length(min = 1))]
    pub id_column: String,
    #[validate(length(min = 1))]
    pub time_column: String,
    #[validate(length(min = 1))]
    pub target_column: String,
    /// Exogenous columns to read; `None` takes every remaining column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exogenous_columns: Option<Vec<String>>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/panel.csv"),
            id_column: "unique_id".into(),
            time_column: "ds".into(),
            target_column: "y".into(),
            exogenous_columns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RemoteConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Identifier the remote forecasts are reported under
    #[validate(length(min = 1))]
    pub model_id: String,
    /// Remote model name forwarded in the request
    pub model: String,
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_min_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// Fine-tuning iterations; 0 disables fine-tuning
    pub finetune_steps: u32,
    pub finetune_loss: FinetuneLoss,
    pub clean_ex_first: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.example.invalid/v1".into(),
            api_key: None,
            model_id: "TimeGPT".into(),
            model: "timegpt-1".into(),
            timeout_seconds: 60,
            max_retries: 3,
            retry_min_backoff_ms: 500,
            retry_max_backoff_ms: 10_000,
            finetune_steps: 0,
            finetune_loss: FinetuneLoss::Default,
            clean_ex_first: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LocalConfig {
    pub enabled: bool,
    pub parallel: bool,
    pub models: Vec<LocalModelConfig>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        let mut seasonal = LocalModelConfig::new(ModelKind::SeasonalNaive);
        seasonal.season_length = Some(7);
        let mut holt = LocalModelConfig::new(ModelKind::Holt);
        holt.alpha = Some(0.3);
        holt.beta = Some(0.1);
        Self {
            enabled: true,
            parallel: true,
            models: vec![
                LocalModelConfig::new(ModelKind::Naive),
                seasonal,
                LocalModelConfig::new(ModelKind::HistoricAverage),
                holt,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

impl Config {
    /// Defaults, then the TOML file, then `FCB__SECTION__KEY` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FCB__").split("__"))
    }

    /// Load configuration. An explicitly given file must exist; the default
    /// file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("configuration file {} not found", path.display());
            }
        }
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("failed to read configuration")?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Field validation plus the checks that span several fields.
    pub fn check(&self) -> Result<()> {
        self.validate().context("invalid configuration")?;

        if let Some(level) = self
            .pipeline
            .levels
            .iter()
            .find(|l| !(l.is_finite() && **l > 0.0 && **l < 100.0))
        {
            anyhow::bail!("confidence level {level} must be strictly between 0 and 100");
        }
        if self.pipeline.windows > 1 && self.pipeline.step == 0 {
            anyhow::bail!("pipeline.step must be positive when pipeline.windows > 1");
        }
        if !self.remote.enabled && !self.local.enabled {
            anyhow::bail!("at least one of remote or local providers must be enabled");
        }
        if self.remote.enabled && !self.remote.base_url.starts_with("http") {
            anyhow::bail!("remote.base_url must be an http(s) URL, got {}", self.remote.base_url);
        }
        if self.remote.retry_min_backoff_ms > self.remote.retry_max_backoff_ms {
            anyhow::bail!("remote.retry_min_backoff_ms exceeds remote.retry_max_backoff_ms");
        }
        if self.local.enabled {
            if self.local.models.is_empty() {
                anyhow::bail!("local provider enabled without any models");
            }
            for model in &self.local.models {
                model
                    .build()
                    .with_context(|| format!("invalid local model {}", model.alias()))?;
            }
            if self.remote.enabled {
                if let Some(model) = self.local.models.iter().find(|m| m.alias() == self.remote.model_id) {
                    anyhow::bail!(
                        "remote.model_id '{}' collides with local model alias '{}'",
                        self.remote.model_id,
                        model.alias()
                    );
                }
            }
        }
        Ok(())
    }
}
