pub mod engine;
pub mod local;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod remote;

pub use engine::*;
pub use local::*;
pub use metrics::*;
pub use models::*;
pub use provider::*;
pub use remote::*;
