//! End-to-end driver: ingestion, preprocessing, training

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::{DataIngestion, IngestionReport};
use crate::logging::LoggingContext;
use crate::preprocessing::{DataPreprocessor, PreprocessingReport};
use crate::training::{ModelTrainer, TrainingReport};
use crate::utils::{ArtifactLayout, Timer};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

/// Reports of the three stages of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub ingestion: IngestionReport,
    pub preprocessing: PreprocessingReport,
    pub training: TrainingReport,
    pub duration_secs: f64,
}

/// Runs the stages in order against one artifact layout
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    layout: ArtifactLayout,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let layout = ArtifactLayout::from_config(&config.paths);
        Self { config, layout }
    }

    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(PipelineConfig::from_yaml_file(path)?))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn ingest(&self, ctx: &LoggingContext) -> Result<IngestionReport> {
        DataIngestion::new(&self.config, self.layout.clone())?.run(ctx)
    }

    pub fn preprocess(&self, ctx: &LoggingContext) -> Result<PreprocessingReport> {
        DataPreprocessor::new(&self.config, self.layout.clone()).process(ctx)
    }

    pub fn train(&self, ctx: &LoggingContext) -> Result<TrainingReport> {
        ModelTrainer::new(&self.config, self.layout.clone()).run(ctx)
    }

    /// Execute every stage; the first failure aborts the run
    pub fn run(&self, ctx: &LoggingContext) -> Result<PipelineReport> {
        let timer = Timer::start();
        info!(run_id = %ctx.run_id(), artifacts = %self.layout.root().display(), "Pipeline started");

        let outcome = (|| {
            let ingestion = self.ingest(ctx)?;
            let preprocessing = self.preprocess(ctx)?;
            let training = self.train(ctx)?;
            Ok::<_, crate::error::PipelineError>((ingestion, preprocessing, training))
        })();

        match outcome {
            Ok((ingestion, preprocessing, training)) => {
                let duration_secs = timer.elapsed_secs();
                info!(duration_secs, accuracy = training.metrics.accuracy, "Pipeline finished");
                Ok(PipelineReport {
                    run_id: ctx.run_id(),
                    ingestion,
                    preprocessing,
                    training,
                    duration_secs,
                })
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Pipeline aborted");
                Err(e)
            }
        }
    }
}
