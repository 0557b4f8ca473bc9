//! Stage manifests: the typed handoff between pipeline stages.
//!
//! Each stage writes `manifest.json` next to its output files describing every
//! partition it produced. The next stage reads the manifest and checks the
//! frames it loads against it before doing any work.

use crate::error::{PipelineError, Result};
use crate::utils::data_loader::column_names;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Name and polars dtype of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: String,
}

/// One output file of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub name: String,
    pub file: String,
    pub rows: usize,
    pub columns: Vec<ColumnSchema>,
}

impl PartitionSummary {
    pub fn describe(name: &str, file: &Path, df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| ColumnSchema {
                name: c.name().to_string(),
                dtype: c.dtype().to_string(),
            })
            .collect();
        Self {
            name: name.to_string(),
            file: file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            rows: df.height(),
            columns,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Everything a stage produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest {
    pub stage: String,
    pub created_at: DateTime<Utc>,
    pub partitions: Vec<PartitionSummary>,
}

impl StageManifest {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            created_at: Utc::now(),
            partitions: Vec::new(),
        }
    }

    pub fn with_partition(mut self, name: &str, file: &Path, df: &DataFrame) -> Self {
        self.partitions.push(PartitionSummary::describe(name, file, df));
        self
    }

    /// Write `manifest.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| PipelineError::io(&path, e))?;
        info!(stage = %self.stage, path = %path.display(), "Manifest written");
        Ok(path)
    }

    /// Read the manifest a previous stage left in `dir`
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(PipelineError::data(
                "manifest",
                format!(
                    "{} not found; run the previous stage first",
                    path.display()
                ),
            ));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::data(path.display().to_string(), e.to_string()))
    }

    pub fn partition(&self, name: &str) -> Result<&PartitionSummary> {
        self.partitions.iter().find(|p| p.name == name).ok_or_else(|| {
            PipelineError::data(
                "manifest",
                format!("stage '{}' recorded no partition '{name}'", self.stage),
            )
        })
    }

    /// Check a loaded frame against the recorded row count and column order.
    /// Dtype drift after a CSV round trip is only reported.
    pub fn verify(&self, name: &str, df: &DataFrame) -> Result<()> {
        let expected = self.partition(name)?;
        let context = format!("{} partition '{name}'", self.stage);

        if df.height() != expected.rows {
            return Err(PipelineError::data(
                context,
                format!("expected {} rows, found {}", expected.rows, df.height()),
            ));
        }

        let found = column_names(df);
        let wanted = expected.column_names();
        if found != wanted {
            return Err(PipelineError::data(
                context,
                format!("expected columns {wanted:?}, found {found:?}"),
            ));
        }

        for (schema, column) in expected.columns.iter().zip(df.get_columns()) {
            let dtype = column.dtype().to_string();
            if dtype != schema.dtype {
                warn!(column = %schema.name, recorded = %schema.dtype, loaded = %dtype, "Column dtype changed");
            }
        }
        Ok(())
    }
}
