//! Training stage: randomized search, refit, evaluation and persistence

use super::lightgbm::{BoostedTreeClassifier, BoostedTreeConfig, BoostingType};
use super::models::{EvaluationMetrics, Model};
use crate::config::{ModelTrainingConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::logging::LoggingContext;
use crate::manifest::StageManifest;
use crate::optimizer::{require, RandomizedSearch, SearchSpace, TrialParams};
use crate::tracking::{ExperimentTracker, RunStatus};
use crate::utils::data_loader::{column_names, load_csv, numeric_column, to_matrix};
use crate::utils::{ensure_dir, ArtifactLayout, Timer};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const STAGE_NAME: &str = "training";

/// Everything needed to reuse a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Full model configuration, rendered as strings
    pub params: BTreeMap<String, String>,
    pub feature_names: Vec<String>,
    pub label_column: String,
    pub model: BoostedTreeClassifier,
    pub metrics: EvaluationMetrics,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Write with bincode through a temporary file so readers never see a
    /// partial model
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let bytes = bincode::serialize(self)
            .map_err(|e| PipelineError::training(format!("cannot serialize model: {e}")))?;
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes).map_err(|e| PipelineError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        bincode::deserialize(&bytes)
            .map_err(|e| PipelineError::data(path.display().to_string(), e.to_string()))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(PipelineError::data(
                "model input",
                format!("expected {} features, got {}", self.feature_names.len(), x.ncols()),
            ));
        }
        self.model.predict(x)
    }
}

/// What the training stage produced
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub best_params: BTreeMap<String, String>,
    /// Full configuration of the refitted model
    pub model_params: BTreeMap<String, String>,
    pub cv_score: f64,
    pub metrics: EvaluationMetrics,
    pub model_file: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_names: Vec<String>,
    pub search_duration_secs: f64,
}

/// Build an unfitted classifier from one sampled configuration
pub fn classifier_from_params(
    params: &TrialParams,
    training: &ModelTrainingConfig,
) -> Result<BoostedTreeClassifier> {
    let int = |name: &str| -> Result<usize> {
        let value = require(params, name)?;
        value
            .as_int()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| PipelineError::training(format!("{name} must be a non-negative integer, got {value}")))
    };
    let learning_rate = require(params, "learning_rate")?
        .as_float()
        .ok_or_else(|| PipelineError::training("learning_rate must be numeric"))?;
    let boosting_type: BoostingType = require(params, "boosting_type")?
        .as_string()
        .ok_or_else(|| PipelineError::training("boosting_type must be a string"))?
        .parse()?;

    Ok(BoostedTreeClassifier::new(BoostedTreeConfig {
        boosting_type,
        n_estimators: int("n_estimators")?,
        learning_rate,
        num_leaves: int("num_leaves")?,
        max_depth: Some(int("max_depth")?),
        min_child_samples: training.min_child_samples,
        random_state: training.random_state,
        ..BoostedTreeConfig::default()
    }))
}

/// Split a processed frame into its feature matrix and integral label vector
pub fn split_features(df: &DataFrame, label: &str) -> Result<(Array2<f64>, Array1<i64>, Vec<String>)> {
    let features: Vec<String> = column_names(df).into_iter().filter(|c| c != label).collect();
    if features.is_empty() {
        return Err(PipelineError::data("training frame", "no feature columns"));
    }
    let x = to_matrix(df, &features)?;
    let y = numeric_column(df, label)?
        .into_iter()
        .map(|v| {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(v as i64)
            } else {
                Err(PipelineError::data(format!("column '{label}'"), format!("non-integral label {v}")))
            }
        })
        .collect::<Result<Array1<i64>>>()?;
    Ok((x, y, features))
}

/// Runs the search over the processed partitions and persists the winner
pub struct ModelTrainer {
    config: ModelTrainingConfig,
    label_column: String,
    layout: ArtifactLayout,
    tracker: ExperimentTracker,
}

impl ModelTrainer {
    pub fn new(config: &PipelineConfig, layout: ArtifactLayout) -> Self {
        Self {
            config: config.model_training.clone(),
            label_column: config.data_processing.label_column.clone(),
            layout,
            tracker: ExperimentTracker::new(&config.tracking),
        }
    }

    /// Record runs with a different tracker
    pub fn with_tracker(mut self, tracker: ExperimentTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &ExperimentTracker {
        &self.tracker
    }

    pub fn run(&self, ctx: &LoggingContext) -> Result<TrainingReport> {
        let _stage = ctx.stage(STAGE_NAME);
        info!("Starting model training pipeline");

        let run_id = self.tracker.start_run(STAGE_NAME)?;
        match self.train(&run_id) {
            Ok(report) => {
                if let Err(e) = self.tracker.end_run(RunStatus::Finished) {
                    error!(kind = e.kind(), error = %e, "Could not close the tracking run");
                    self.discard_model(&report.model_file);
                    return Err(e);
                }
                info!(run_id = %run_id, "Model training successfully completed");
                Ok(report)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Model training failed");
                if let Err(end_err) = self.tracker.end_run(RunStatus::Failed) {
                    warn!(error = %end_err, "Could not close the failed tracking run");
                }
                Err(e)
            }
        }
    }

    fn discard_model(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Could not remove model of a failed run");
        }
    }

    fn load_partitions(&self) -> Result<(DataFrame, DataFrame)> {
        let manifest = StageManifest::read(&self.layout.processed_dir())?;
        let train = load_csv(&self.layout.processed_train_file())?;
        manifest.verify("train", &train)?;
        let test = load_csv(&self.layout.processed_test_file())?;
        manifest.verify("test", &test)?;

        if column_names(&train) != column_names(&test) {
            return Err(PipelineError::data(
                "processed partitions",
                "train and test columns differ in name or order",
            ));
        }
        info!(train_rows = train.height(), test_rows = test.height(), "Loaded processed data");
        Ok((train, test))
    }

    fn train(&self, run_id: &str) -> Result<TrainingReport> {
        let (train, test) = self.load_partitions()?;
        for path in [self.layout.processed_train_file(), self.layout.processed_test_file()] {
            self.tracker.log_artifact(run_id, &path, Some("datasets"))?;
        }

        let (x_train, y_train, feature_names) = split_features(&train, &self.label_column)?;
        let (x_test, y_test, _) = split_features(&test, &self.label_column)?;

        let search = RandomizedSearch::new(SearchSpace::from_distributions(&self.config.param_distributions)?)
            .with_n_iter(self.config.n_iter)
            .with_cv(self.config.cv)
            .with_scoring(&self.config.scoring)
            .with_random_state(self.config.random_state)
            .with_n_jobs(self.config.n_jobs);
        let timer = Timer::start();
        let study = search.run(&x_train, &y_train, |p| classifier_from_params(p, &self.config))?;
        let search_duration_secs = timer.elapsed_secs();

        let best = study
            .best_trial()
            .ok_or_else(|| PipelineError::training("search returned no best candidate"))?;
        let best_params: BTreeMap<String, String> =
            best.params.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        let cv_score = best.value.unwrap_or_default();
        info!(params = ?best_params, cv_score, "Best parameters found");

        let mut model = classifier_from_params(&best.params, &self.config)?;
        model.fit(&x_train, &y_train)?;
        info!(trees = model.n_trees(), leaves = model.total_leaves(), "Refitted best model");

        let predictions = Model::predict(&model, &x_test)?;
        let metrics = EvaluationMetrics::compute(&y_test, &predictions)?;
        info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1_score = metrics.f1_score,
            "Model evaluation"
        );

        let model_params = model.config.to_params();
        self.tracker.log_params(run_id, model_params.iter().map(|(k, v)| (k.clone(), v.clone())))?;
        self.tracker.log_metrics(run_id, &metrics.to_map())?;
        self.tracker.log_metric(run_id, "cv_score", cv_score)?;

        // The model file is the last thing written; it is removed again if
        // the tracker cannot take it
        let model_file = self.layout.model_file();
        ModelArtifact {
            params: model_params.clone(),
            feature_names: feature_names.clone(),
            label_column: self.label_column.clone(),
            model,
            metrics,
            trained_at: Utc::now(),
        }
        .save(&model_file)?;
        info!(path = %model_file.display(), "Model saved");

        if let Err(e) = self.tracker.log_artifact(run_id, &model_file, None) {
            self.discard_model(&model_file);
            return Err(e);
        }

        Ok(TrainingReport {
            run_id: run_id.to_string(),
            best_params,
            model_params,
            cv_score,
            metrics,
            model_file,
            train_rows: train.height(),
            test_rows: test.height(),
            feature_names,
            search_duration_secs,
        })
    }
}
