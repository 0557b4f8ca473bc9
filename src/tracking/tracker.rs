//! Experiment tracker
//!
//! Records one run per training invocation: parameters, metrics, copied
//! artifacts and a final status.

use super::storage::{LocalStorage, StorageBackend};
use crate::config::TrackingConfig;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// A single tracked run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Artifact paths relative to the run's artifact root
    pub artifacts: Vec<String>,
    pub status: RunStatus,
}

impl Run {
    pub fn new(experiment: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            run_name: run_name.into(),
            experiment: experiment.into(),
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Experiment tracker holding at most one active run
pub struct ExperimentTracker {
    experiment: String,
    storage: Box<dyn StorageBackend>,
    current_run: RwLock<Option<Run>>,
}

impl ExperimentTracker {
    /// Tracker backed by a local directory
    pub fn new(config: &TrackingConfig) -> Self {
        Self::with_storage(&config.experiment_name, Box::new(LocalStorage::new(&config.dir)))
    }

    pub fn with_storage(experiment: impl Into<String>, storage: Box<dyn StorageBackend>) -> Self {
        Self {
            experiment: experiment.into(),
            storage,
            current_run: RwLock::new(None),
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Start a new run and return its id; an unfinished run is ended as failed
    pub fn start_run(&self, run_name: impl Into<String>) -> Result<String> {
        if self.active_run_id().is_some() {
            warn!("Starting a new run while another is active");
            self.end_run(RunStatus::Failed)?;
        }
        let run = Run::new(&self.experiment, run_name);
        let run_id = run.run_id.clone();
        let mut current = self.current_run.write().map_err(|_| poisoned())?;
        self.storage.save_run(&run)?;
        *current = Some(run);
        drop(current);
        info!(run_id = %run_id, experiment = %self.experiment, "Started tracking run");
        Ok(run_id)
    }

    pub fn active_run_id(&self) -> Option<String> {
        self.current_run
            .read()
            .ok()
            .and_then(|r| r.as_ref().map(|run| run.run_id.clone()))
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> Result<T>) -> Result<T> {
        let mut guard = self
            .current_run
            .write()
            .map_err(|_| poisoned())?;
        match guard.as_mut() {
            Some(run) if run.run_id == run_id => f(run),
            _ => Err(PipelineError::training(format!("run {run_id} is not active"))),
        }
    }

    pub fn log_param(&self, run_id: &str, key: impl Into<String>, value: impl ToString) -> Result<()> {
        self.with_run(run_id, |run| {
            run.params.insert(key.into(), value.to_string());
            Ok(())
        })
    }

    pub fn log_params<K, V>(&self, run_id: &str, params: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: ToString,
    {
        self.with_run(run_id, |run| {
            run.params
                .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
            Ok(())
        })
    }

    pub fn log_metric(&self, run_id: &str, name: impl Into<String>, value: f64) -> Result<()> {
        self.with_run(run_id, |run| {
            run.metrics.insert(name.into(), value);
            Ok(())
        })
    }

    pub fn log_metrics(&self, run_id: &str, metrics: &BTreeMap<String, f64>) -> Result<()> {
        self.with_run(run_id, |run| {
            run.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
            Ok(())
        })
    }

    /// Copy a file into the run, optionally under a sub-directory
    pub fn log_artifact(&self, run_id: &str, path: &Path, artifact_path: Option<&str>) -> Result<()> {
        if !path.is_file() {
            return Err(PipelineError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact not found"),
            ));
        }
        self.with_run(run_id, |run| {
            let relative = self.storage.store_artifact(run, path, artifact_path)?;
            info!(run_id = %run.run_id, artifact = %relative, "Logged artifact");
            run.artifacts.push(relative);
            Ok(())
        })
    }

    /// Close the active run and persist its final record
    pub fn end_run(&self, status: RunStatus) -> Result<Run> {
        let mut run = self
            .current_run
            .write()
            .map_err(|_| poisoned())?
            .take()
            .ok_or_else(|| PipelineError::training("no active run to end"))?;
        run.end_time = Some(Utc::now());
        run.status = status;
        let path = self.storage.save_run(&run)?;
        info!(
            run_id = %run.run_id,
            status = ?status,
            duration_secs = run.duration_secs(),
            record = %path.display(),
            "Ended tracking run"
        );
        Ok(run)
    }

    /// Every persisted run of this experiment, oldest first
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        self.storage.load_runs(&self.experiment)
    }
}

fn poisoned() -> PipelineError {
    PipelineError::training("tracker state poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tracker(dir: &Path) -> ExperimentTracker {
        ExperimentTracker::new(&TrackingConfig {
            dir: dir.to_path_buf(),
            experiment_name: "hotel_reservation".into(),
        })
    }

    #[test]
    fn test_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());

        let run_id = tracker.start_run("training").unwrap();
        assert!(Uuid::parse_str(&run_id).is_ok());
        tracker.log_param(&run_id, "boosting_type", "dart").unwrap();
        tracker.log_params(&run_id, [("num_leaves", 31)]).unwrap();
        tracker
            .log_metrics(&run_id, &BTreeMap::from([("accuracy".to_string(), 0.9)]))
            .unwrap();

        let run = tracker.end_run(RunStatus::Finished).unwrap();
        assert_eq!(run.params["num_leaves"], "31");
        assert_eq!(run.metrics["accuracy"], 0.9);
        assert!(tracker.active_run_id().is_none());

        let runs = tracker.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Finished);
    }

    #[test]
    fn test_logging_to_inactive_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        assert!(tracker.log_metric("nope", "accuracy", 1.0).is_err());
        assert!(tracker.end_run(RunStatus::Finished).is_err());
    }

    #[test]
    fn test_log_artifact_records_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.bin");
        std::fs::write(&file, [1u8, 2, 3]).unwrap();

        let tracker = tracker(&dir.path().join("mlruns"));
        let run_id = tracker.start_run("training").unwrap();
        tracker.log_artifact(&run_id, &file, None).unwrap();
        let missing = PathBuf::from("/definitely/not/here.csv");
        assert!(tracker.log_artifact(&run_id, &missing, Some("datasets")).is_err());

        let run = tracker.end_run(RunStatus::Failed).unwrap();
        assert_eq!(run.artifacts, vec!["model.bin".to_string()]);
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_start_run_reports_poisoned_state() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _guard = tracker.current_run.write().unwrap();
                panic!("writer died holding the lock");
            });
            assert!(handle.join().is_err());
        });

        let err = tracker.start_run("training").unwrap_err();
        assert!(err.to_string().contains("poisoned"), "{err}");
        assert!(tracker.list_runs().unwrap().is_empty());
    }
}
