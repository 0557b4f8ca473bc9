//! Integration test: training stage over processed partitions

mod common;

use common::{hotel_frame, seed_object_store};
use ndarray::array;
use reservation_mlops::error::PipelineError;
use reservation_mlops::tracking::RunStatus;
use reservation_mlops::training::engine::split_features;
use reservation_mlops::training::{EvaluationMetrics, ModelArtifact, ModelTrainer};
use reservation_mlops::utils::data_loader::load_csv;
use reservation_mlops::utils::ArtifactLayout;
use reservation_mlops::{LoggingContext, TrainingPipeline};

#[test]
fn test_trained_model_reproduces_reported_metrics() {
    let dir = tempfile::tempdir().unwrap();
    seed_object_store(dir.path(), &mut hotel_frame(1000, 21));
    let pipeline = TrainingPipeline::new(common::config(dir.path()));
    let ctx = LoggingContext::disabled();
    pipeline.ingest(&ctx).unwrap();
    pipeline.preprocess(&ctx).unwrap();

    let report = pipeline.train(&ctx).unwrap();
    for value in report.metrics.to_map().values() {
        assert!((0.0..=1.0).contains(value), "{value}");
    }

    let artifact = ModelArtifact::load(&pipeline.layout().model_file()).unwrap();
    assert_eq!(artifact.feature_names, report.feature_names);
    assert_eq!(artifact.params, report.model_params);
    for (name, value) in &report.best_params {
        assert_eq!(&artifact.params[name], value);
    }
    assert!(artifact.params.contains_key("reg_lambda"));

    let test = load_csv(&pipeline.layout().processed_test_file()).unwrap();
    let (x, y, _) = split_features(&test, "booking_status").unwrap();
    let predictions = artifact.predict(&x).unwrap();
    let metrics = EvaluationMetrics::compute(&y, &predictions).unwrap();
    assert_eq!(metrics, report.metrics);
}

#[test]
fn test_training_without_processed_data_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let layout = ArtifactLayout::from_config(&config.paths);
    let trainer = ModelTrainer::new(&config, layout.clone());

    let err = trainer.run(&LoggingContext::disabled()).unwrap_err();
    assert!(matches!(err, PipelineError::DataValidation { .. }));
    assert!(!layout.model_file().exists());

    let runs = trainer.tracker().list_runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[test]
fn test_perfect_accuracy_implies_perfect_scores() {
    let y = array![1i64, 0, 0, 1, 1, 0];
    let m = EvaluationMetrics::compute(&y, &y).unwrap();
    assert_eq!(m.accuracy, 1.0);
    assert_eq!((m.precision, m.recall, m.f1_score), (1.0, 1.0, 1.0));
}
