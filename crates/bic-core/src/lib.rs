pub mod composite;
pub mod config;
pub mod diagnostics;
pub mod discontinuity;
pub mod error;
pub mod loader;
pub mod onset;
pub mod outputs;
pub mod pipeline;
pub mod series;
pub mod station_log;

pub use error::{PipelineError, Result};
