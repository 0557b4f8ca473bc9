//! Pipeline configuration
//!
//! The configuration is a YAML document with two required sections,
//! `data_ingestion` and `data_processing`, and optional sections that fall
//! back to the defaults below:
//!
//! ```yaml
//! data_ingestion:
//!   bucket_name: my-bucket
//!   bucket_file_name: Hotel_Reservations.csv
//!   train_ratio: 0.8
//! data_processing:
//!   categorical_columns: [type_of_meal_plan, room_type_reserved]
//!   numerical_columns: [lead_time, avg_price_per_room]
//!   skewness_threshold: 5
//!   no_of_features: 10
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default path of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_ingestion: IngestionConfig,
    pub data_processing: ProcessingConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub model_training: ModelTrainingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `data_ingestion` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    pub train_ratio: f64,
    #[serde(default = "default_seed")]
    pub random_state: u64,
}

/// `data_processing` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub categorical_columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    pub skewness_threshold: f64,
    pub no_of_features: usize,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_seed")]
    pub random_state: u64,
    /// Neighbours considered when synthesising minority samples
    #[serde(default = "default_smote_k")]
    pub smote_k_neighbors: usize,
    /// Trees in the forest used to rank features
    #[serde(default = "default_selector_estimators")]
    pub selector_estimators: usize,
}

/// Where the raw dataset is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    /// Google Cloud Storage over its JSON API
    #[default]
    Gcs,
    /// A local directory, one sub-directory per bucket
    Local,
}

/// `object_store` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub kind: ObjectStoreKind,
    pub endpoint: String,
    pub root: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            kind: ObjectStoreKind::Gcs,
            endpoint: "https://storage.googleapis.com".to_string(),
            root: None,
            timeout_secs: 300,
        }
    }
}

/// Half-open integer range `[low, high)`, sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntRange {
    pub low: i64,
    pub high: i64,
}

/// Half-open float range `[low, high)`, sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub low: f64,
    pub high: f64,
}

/// Distributions the randomized search draws from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamDistributions {
    pub n_estimators: IntRange,
    pub max_depth: IntRange,
    pub learning_rate: FloatRange,
    pub num_leaves: IntRange,
    pub boosting_type: Vec<String>,
}

impl Default for ParamDistributions {
    fn default() -> Self {
        Self {
            n_estimators: IntRange { low: 50, high: 150 },
            max_depth: IntRange { low: 5, high: 50 },
            learning_rate: FloatRange { low: 0.01, high: 0.11 },
            num_leaves: IntRange { low: 16, high: 64 },
            boosting_type: vec!["gbdt".to_string(), "dart".to_string()],
        }
    }
}

/// `model_training` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTrainingConfig {
    pub n_iter: usize,
    pub cv: usize,
    pub random_state: u64,
    pub scoring: String,
    /// Worker threads for the search; `None` uses every core
    pub n_jobs: Option<usize>,
    pub min_child_samples: usize,
    pub param_distributions: ParamDistributions,
}

impl Default for ModelTrainingConfig {
    fn default() -> Self {
        Self {
            n_iter: 5,
            cv: 5,
            random_state: 42,
            scoring: "accuracy".to_string(),
            n_jobs: None,
            min_child_samples: 20,
            param_distributions: ParamDistributions::default(),
        }
    }
}

/// `paths` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub artifacts_dir: PathBuf,
    pub model_file_name: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            model_file_name: "lgbm_model.bin".to_string(),
        }
    }
}

/// `tracking` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub dir: PathBuf,
    pub experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("mlruns"),
            experiment_name: "hotel_reservation".to_string(),
        }
    }
}

/// `logging` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub level: String,
    pub to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            level: "info".to_string(),
            to_file: true,
        }
    }
}

fn default_seed() -> u64 {
    42
}

fn default_id_column() -> String {
    "Booking_ID".to_string()
}

fn default_label_column() -> String {
    "booking_status".to_string()
}

fn default_smote_k() -> usize {
    5
}

fn default_selector_estimators() -> usize {
    100
}

impl PipelineConfig {
    /// Read and validate a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            ));
        }
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config = Self::from_yaml_str(&text)?;
        info!(path = %path.display(), "Successfully read the YAML config");
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(text).map_err(|e| {
            let message = e.to_string();
            PipelineError::config(locate_key(&message), message)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> Result<()> {
        let ing = &self.data_ingestion;
        if ing.bucket_name.trim().is_empty() {
            return Err(PipelineError::config("data_ingestion.bucket_name", "must not be empty"));
        }
        if ing.bucket_file_name.trim().is_empty() {
            return Err(PipelineError::config(
                "data_ingestion.bucket_file_name",
                "must not be empty",
            ));
        }
        if !(ing.train_ratio > 0.0 && ing.train_ratio < 1.0) {
            return Err(PipelineError::config(
                "data_ingestion.train_ratio",
                format!("must be in (0, 1), got {}", ing.train_ratio),
            ));
        }

        let proc = &self.data_processing;
        if proc.no_of_features == 0 {
            return Err(PipelineError::config("data_processing.no_of_features", "must be at least 1"));
        }
        if !proc.skewness_threshold.is_finite() {
            return Err(PipelineError::config(
                "data_processing.skewness_threshold",
                "must be a finite number",
            ));
        }
        if proc.label_column.is_empty() {
            return Err(PipelineError::config("data_processing.label_column", "must not be empty"));
        }
        if proc.smote_k_neighbors == 0 {
            return Err(PipelineError::config("data_processing.smote_k_neighbors", "must be at least 1"));
        }
        if proc.selector_estimators == 0 {
            return Err(PipelineError::config(
                "data_processing.selector_estimators",
                "must be at least 1",
            ));
        }

        if self.object_store.kind == ObjectStoreKind::Local && self.object_store.root.is_none() {
            return Err(PipelineError::config(
                "object_store.root",
                "required when object_store.kind is local",
            ));
        }

        self.model_training.validate()
    }
}

impl ModelTrainingConfig {
    fn validate(&self) -> Result<()> {
        if self.n_iter == 0 {
            return Err(PipelineError::config("model_training.n_iter", "must be at least 1"));
        }
        if self.cv < 2 {
            return Err(PipelineError::config("model_training.cv", "must be at least 2"));
        }
        if !matches!(self.scoring.as_str(), "accuracy" | "precision" | "recall" | "f1" | "f1_score") {
            return Err(PipelineError::config(
                "model_training.scoring",
                format!("unknown scoring '{}'", self.scoring),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(PipelineError::config("model_training.n_jobs", "must be at least 1"));
        }

        let dist = &self.param_distributions;
        for (key, range, min) in [
            ("n_estimators", dist.n_estimators, 1),
            ("max_depth", dist.max_depth, 1),
            ("num_leaves", dist.num_leaves, 2),
        ] {
            if range.low < min || range.high <= range.low {
                return Err(PipelineError::config(
                    format!("model_training.param_distributions.{key}"),
                    format!("expected {min} <= low < high, got [{}, {})", range.low, range.high),
                ));
            }
        }
        let lr = dist.learning_rate;
        if !(lr.low > 0.0 && lr.high > lr.low) {
            return Err(PipelineError::config(
                "model_training.param_distributions.learning_rate",
                format!("expected 0 < low < high, got [{}, {})", lr.low, lr.high),
            ));
        }
        if dist.boosting_type.is_empty() {
            return Err(PipelineError::config(
                "model_training.param_distributions.boosting_type",
                "must list at least one boosting type",
            ));
        }
        for name in &dist.boosting_type {
            if name != "gbdt" && name != "dart" {
                return Err(PipelineError::config(
                    "model_training.param_distributions.boosting_type",
                    format!("unknown boosting type '{name}'"),
                ));
            }
        }
        Ok(())
    }
}

/// Best-effort dotted key for a serde_yaml error message such as
/// "data_processing: missing field `no_of_features` at line 3 column 3"
fn locate_key(message: &str) -> String {
    let field = message
        .split("missing field `")
        .nth(1)
        .and_then(|rest| rest.split('`').next());
    let prefix = message
        .split_once(": ")
        .map(|(p, _)| p)
        .filter(|p| !p.contains(' '));
    match (prefix, field) {
        (Some(p), Some(f)) => format!("{p}.{f}"),
        (None, Some(f)) => f.to_string(),
        (Some(p), None) => p.to_string(),
        (None, None) => "<root>".to_string(),
    }
}
