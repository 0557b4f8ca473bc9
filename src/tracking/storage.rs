//! Storage backend for experiment tracking
//!
//! Runs live under `<base_dir>/<experiment>/<run_id>/`: a `run.json` record
//! plus an `artifacts/` tree.

use super::tracker::Run;
use crate::error::{PipelineError, Result};
use crate::utils::ensure_dir;
use std::fs;
use std::path::{Path, PathBuf};

pub const RUN_FILE: &str = "run.json";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Storage backend trait
pub trait StorageBackend: Send + Sync {
    /// Persist the run record, replacing any earlier version
    fn save_run(&self, run: &Run) -> Result<PathBuf>;

    /// Load every persisted run of an experiment, oldest first
    fn load_runs(&self, experiment: &str) -> Result<Vec<Run>>;

    /// Copy `source` into the run's artifact tree under `artifact_path`
    fn store_artifact(&self, run: &Run, source: &Path, artifact_path: Option<&str>) -> Result<String>;
}

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_dir(&self, experiment: &str, run_id: &str) -> PathBuf {
        self.base_dir.join(experiment).join(run_id)
    }
}

impl StorageBackend for LocalStorage {
    fn save_run(&self, run: &Run) -> Result<PathBuf> {
        let dir = self.run_dir(&run.experiment, &run.run_id);
        ensure_dir(&dir)?;
        let path = dir.join(RUN_FILE);
        let json = serde_json::to_string_pretty(run)?;
        fs::write(&path, json).map_err(|e| PipelineError::io(&path, e))?;
        Ok(path)
    }

    fn load_runs(&self, experiment: &str) -> Result<Vec<Run>> {
        let dir = self.base_dir.join(experiment);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PipelineError::io(&dir, e))? {
            let entry = entry.map_err(|e| PipelineError::io(&dir, e))?;
            let path = entry.path().join(RUN_FILE);
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
            runs.push(serde_json::from_str::<Run>(&text)?);
        }
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }

    fn store_artifact(&self, run: &Run, source: &Path, artifact_path: Option<&str>) -> Result<String> {
        let file_name = source
            .file_name()
            .ok_or_else(|| PipelineError::data("artifact", format!("{} has no file name", source.display())))?
            .to_string_lossy()
            .into_owned();
        let relative = match artifact_path {
            Some(prefix) => format!("{}/{file_name}", prefix.trim_matches('/')),
            None => file_name,
        };

        let dest = self
            .run_dir(&run.experiment, &run.run_id)
            .join(ARTIFACTS_DIR)
            .join(&relative);
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(source, &dest).map_err(|e| PipelineError::io(source, e))?;
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::tracker::RunStatus;

    #[test]
    fn test_save_and_load_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut run = Run::new("exp", "training");
        run.params.insert("num_leaves".into(), "31".into());
        run.status = RunStatus::Finished;
        let path = storage.save_run(&run).unwrap();
        assert!(path.ends_with(RUN_FILE));

        let loaded = storage.load_runs("exp").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].run_id, run.run_id);
        assert_eq!(loaded[0].params["num_leaves"], "31");
        assert_eq!(loaded[0].status, RunStatus::Finished);
    }

    #[test]
    fn test_unknown_experiment_has_no_runs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.load_runs("missing").unwrap().is_empty());
    }

    #[test]
    fn test_store_artifact_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("train.csv");
        fs::write(&source, "a,b\n1,2\n").unwrap();

        let storage = LocalStorage::new(dir.path().join("mlruns"));
        let run = Run::new("exp", "training");
        let relative = storage.store_artifact(&run, &source, Some("datasets/")).unwrap();
        assert_eq!(relative, "datasets/train.csv");

        let copied = storage
            .run_dir("exp", &run.run_id)
            .join(ARTIFACTS_DIR)
            .join("datasets/train.csv");
        assert_eq!(fs::read_to_string(copied).unwrap(), "a,b\n1,2\n");
    }
}
