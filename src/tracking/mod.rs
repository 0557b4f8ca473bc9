//! Experiment tracking backed by a local run directory

pub mod storage;
pub mod tracker;

pub use storage::{LocalStorage, StorageBackend};
pub use tracker::{ExperimentTracker, Run, RunStatus};
