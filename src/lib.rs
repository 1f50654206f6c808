pub mod config;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod forecast;
pub mod io;
pub mod pipeline;
pub mod split;
pub mod telemetry;
pub mod transform;

pub use error::{PipelineError, ProviderError, Result};
pub use pipeline::{BenchmarkPipeline, BenchmarkReport};
