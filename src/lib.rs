//! Reservation MLOps - training pipeline for hotel booking cancellations
//!
//! Three stages share an artifact directory and hand data to each other
//! through CSV files described by JSON manifests:
//!
//! - [`ingestion`] - fetch the raw CSV from an object store and split it
//! - [`preprocessing`] - encode, de-skew, rebalance and select features
//! - [`training`] - randomized search over a boosted tree classifier,
//!   evaluation, persistence and experiment tracking
//!
//! [`pipeline::TrainingPipeline`] runs them in order.

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod utils;

pub mod ingestion;
pub mod optimizer;
pub mod preprocessing;
pub mod synthetic;
pub mod tracking;
pub mod training;

pub mod cli;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use logging::LoggingContext;
pub use pipeline::{PipelineReport, TrainingPipeline};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
