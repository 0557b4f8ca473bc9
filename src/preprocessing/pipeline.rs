//! Preprocessing stage: clean, encode, de-skew, rebalance and select features

use super::encoder::LabelEncoder;
use super::feature_selection::ImportanceSelector;
use super::transforms::SkewCorrector;
use crate::config::{PipelineConfig, ProcessingConfig};
use crate::error::{PipelineError, Result};
use crate::logging::LoggingContext;
use crate::manifest::StageManifest;
use crate::synthetic::{class_counts, Sampler, SMOTE};
use crate::utils::data_loader::{
    column_names, drop_duplicate_rows, frame_from_matrix, is_text_column, load_csv,
    numeric_column, require_columns, save_csv, to_matrix,
};
use crate::utils::{ensure_dir, ArtifactLayout};
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

pub const STAGE_NAME: &str = "preprocessing";

/// What the preprocessing stage produced
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingReport {
    pub duplicates_dropped: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub skewed_columns: Vec<String>,
    /// Synthetic rows added per class
    pub synthetic: Vec<(i64, usize)>,
    pub selected_features: Vec<String>,
    pub manifest_file: PathBuf,
}

/// Turns the raw train/test partitions into model-ready ones
pub struct DataPreprocessor {
    config: ProcessingConfig,
    layout: ArtifactLayout,
}

impl DataPreprocessor {
    pub fn new(config: &PipelineConfig, layout: ArtifactLayout) -> Self {
        Self {
            config: config.data_processing.clone(),
            layout,
        }
    }

    /// Drop the identifier column and duplicate rows
    fn clean(&self, df: &DataFrame, name: &str) -> Result<DataFrame> {
        let df = if column_names(df).contains(&self.config.id_column) {
            df.drop(&self.config.id_column)?
        } else {
            df.clone()
        };
        let deduped = drop_duplicate_rows(&df)?;
        let dropped = df.height() - deduped.height();
        if dropped > 0 {
            info!(partition = name, dropped, "Dropped duplicate rows");
        }
        if deduped.height() == 0 {
            return Err(PipelineError::data(format!("{name} partition"), "no rows to process"));
        }
        Ok(deduped)
    }

    fn label_values(&self, df: &DataFrame) -> Result<Vec<i64>> {
        let label = &self.config.label_column;
        numeric_column(df, label)?
            .into_iter()
            .map(|v| {
                if v.is_finite() && v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(PipelineError::data(
                        format!("column '{label}'"),
                        format!("label {v} is not an integer class"),
                    ))
                }
            })
            .collect()
    }

    pub fn process(&self, ctx: &LoggingContext) -> Result<PreprocessingReport> {
        let _stage = ctx.stage(STAGE_NAME);
        info!("Starting data preprocessing");
        let label = self.config.label_column.clone();

        let raw_manifest = StageManifest::read(&self.layout.raw_dir())?;
        let train_raw = load_csv(&self.layout.train_file())?;
        raw_manifest.verify("train", &train_raw)?;
        let test_raw = load_csv(&self.layout.test_file())?;
        raw_manifest.verify("test", &test_raw)?;

        let train = self.clean(&train_raw, "train")?;
        let test = self.clean(&test_raw, "test")?;
        let duplicates_dropped =
            (train_raw.height() - train.height()) + (test_raw.height() - test.height());

        let mut required = self.config.categorical_columns.clone();
        required.extend(self.config.numerical_columns.iter().cloned());
        required.push(label.clone());
        require_columns(&train, &required, "train partition")?;
        require_columns(&test, &required, "test partition")?;

        // Categorical encoding; a text label is encoded the same way
        let mut encode_columns = self.config.categorical_columns.clone();
        if !encode_columns.contains(&label) && is_text_column(&train, &label)? {
            encode_columns.push(label.clone());
        }
        let mut encoder = LabelEncoder::new();
        encoder.fit(&train, &encode_columns)?;
        let train = encoder.transform(&train)?;
        let test = encoder.transform(&test)?;

        // Skew correction, decided on train only
        let numerical: Vec<String> = self
            .config
            .numerical_columns
            .iter()
            .filter(|c| **c != label)
            .cloned()
            .collect();
        let mut corrector = SkewCorrector::new(self.config.skewness_threshold);
        corrector.fit(&train, &numerical)?;
        let train = corrector.transform(&train)?;
        let test = corrector.transform(&test)?;
        let skewed_columns = corrector.skewed_columns().to_vec();

        // Rebalance the train partition
        let features: Vec<String> = column_names(&train).into_iter().filter(|c| *c != label).collect();
        if features.is_empty() {
            return Err(PipelineError::data("train partition", "no feature columns besides the label"));
        }
        let x = to_matrix(&train, &features)?;
        let y = Array1::from_vec(self.label_values(&train)?);
        info!(before = ?class_counts(&y), "Class distribution before SMOTE");

        let mut smote = SMOTE::new()
            .with_k_neighbors(self.config.smote_k_neighbors)
            .with_seed(self.config.random_state);
        let balanced = smote.fit_resample(&x, &y)?;
        info!(after = ?class_counts(&balanced.y), "Data balanced successfully");

        // Feature selection on the balanced frame
        let y_float = balanced.y.mapv(|v| v as f64);
        let mut selector = ImportanceSelector::new(self.config.no_of_features)
            .with_n_estimators(self.config.selector_estimators)
            .with_random_state(self.config.random_state);
        selector.fit(&balanced.x, &y_float, &features)?;
        if self.config.no_of_features > features.len() {
            warn!(
                requested = self.config.no_of_features,
                available = features.len(),
                "Fewer features than requested; keeping all"
            );
        }
        // Most important first; this order is the processed column order
        let selected = selector.selected_features();
        info!(selected = ?selected, "Top features selected");

        let train_frame = frame_from_matrix(&features, &balanced.x, &label, &balanced.y.to_vec())?;
        let mut processed_train = train_frame.select(with_label(&selected, &label))?;

        let test_x = to_matrix(&test, &selected)?;
        let test_y = self.label_values(&test)?;
        let mut processed_test = frame_from_matrix(&selected, &test_x, &label, &test_y)?;

        ensure_dir(&self.layout.processed_dir())?;
        save_csv(&mut processed_train, &self.layout.processed_train_file())?;
        save_csv(&mut processed_test, &self.layout.processed_test_file())?;

        let manifest_file = StageManifest::new(STAGE_NAME)
            .with_partition("train", &self.layout.processed_train_file(), &processed_train)
            .with_partition("test", &self.layout.processed_test_file(), &processed_test)
            .write(&self.layout.processed_dir())?;

        info!("Data processing completed");
        Ok(PreprocessingReport {
            duplicates_dropped,
            train_rows: processed_train.height(),
            test_rows: processed_test.height(),
            skewed_columns,
            synthetic: balanced.n_synthetic,
            selected_features: selected,
            manifest_file,
        })
    }
}

fn with_label(features: &[String], label: &str) -> Vec<String> {
    let mut columns = features.to_vec();
    columns.push(label.to_string());
    columns
}
