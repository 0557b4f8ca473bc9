//! Data ingestion: fetch the raw dataset and split it into train/test partitions

pub mod object_store;

pub use object_store::{GcsObjectStore, LocalObjectStore, ObjectStore};

use crate::config::{IngestionConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::logging::LoggingContext;
use crate::manifest::StageManifest;
use crate::utils::data_loader::{load_csv, save_csv, take_rows};
use crate::utils::{ensure_dir, ArtifactLayout};
use polars::prelude::DataFrame;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

pub const STAGE_NAME: &str = "ingestion";

/// What the ingestion stage produced
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub raw_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub manifest_file: PathBuf,
}

/// Downloads the raw CSV and writes the train/test split
pub struct DataIngestion {
    config: IngestionConfig,
    layout: ArtifactLayout,
    store: Box<dyn ObjectStore>,
}

impl DataIngestion {
    pub fn new(config: &PipelineConfig, layout: ArtifactLayout) -> Result<Self> {
        let store = object_store::from_config(&config.object_store)?;
        Ok(Self::with_store(config.data_ingestion.clone(), layout, store))
    }

    pub fn with_store(
        config: IngestionConfig,
        layout: ArtifactLayout,
        store: Box<dyn ObjectStore>,
    ) -> Self {
        Self { config, layout, store }
    }

    /// Fetch `bucket_file_name` into `raw/raw.csv`
    pub fn download(&self) -> Result<PathBuf> {
        ensure_dir(&self.layout.raw_dir())?;
        let dest = self.layout.raw_file();
        info!(
            store = self.store.name(),
            bucket = %self.config.bucket_name,
            object = %self.config.bucket_file_name,
            "Downloading raw dataset"
        );
        self.store
            .fetch(&self.config.bucket_name, &self.config.bucket_file_name, &dest)?;
        Ok(dest)
    }

    /// Split the raw CSV into train/test partitions and write both
    pub fn split_data(&self) -> Result<(DataFrame, DataFrame)> {
        let raw = load_csv(&self.layout.raw_file())?;
        let (mut train, mut test) =
            split_frame(&raw, self.config.train_ratio, self.config.random_state)?;

        save_csv(&mut train, &self.layout.train_file())?;
        save_csv(&mut test, &self.layout.test_file())?;
        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            "Data split into train and test"
        );
        Ok((train, test))
    }

    pub fn run(&self, ctx: &LoggingContext) -> Result<IngestionReport> {
        let _stage = ctx.stage(STAGE_NAME);
        info!("Starting data ingestion");

        self.download()?;
        let (train, test) = self.split_data()?;

        let manifest_file = StageManifest::new(STAGE_NAME)
            .with_partition("train", &self.layout.train_file(), &train)
            .with_partition("test", &self.layout.test_file(), &test)
            .write(&self.layout.raw_dir())?;

        info!("Data ingestion completed");
        Ok(IngestionReport {
            raw_rows: train.height() + test.height(),
            train_rows: train.height(),
            test_rows: test.height(),
            train_file: self.layout.train_file(),
            test_file: self.layout.test_file(),
            manifest_file,
        })
    }
}

/// Shuffle rows with a seeded RNG and split them so that the test side gets
/// `ceil((1 - train_ratio) * n)` rows
pub fn split_frame(df: &DataFrame, train_ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let n = df.height();
    if n < 2 {
        return Err(PipelineError::data(
            "raw dataset",
            format!("need at least 2 rows to split, found {n}"),
        ));
    }
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(PipelineError::config(
            "data_ingestion.train_ratio",
            format!("must be in (0, 1), got {train_ratio}"),
        ));
    }

    let n_test = split_test_size(n, train_ratio);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    Ok((take_rows(df, train_idx)?, take_rows(df, test_idx)?))
}

/// Rows sent to the test side, clamped so both sides are non-empty
fn split_test_size(n: usize, train_ratio: f64) -> usize {
    // Subtract a small epsilon so 0.2 * 1000 does not round up to 201
    let raw = ((1.0 - train_ratio) * n as f64 - 1e-9).ceil() as usize;
    raw.clamp(1, n - 1)
}
