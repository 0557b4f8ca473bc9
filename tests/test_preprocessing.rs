//! Integration test: preprocessing stage over ingested partitions

mod common;

use common::{hotel_frame, label_counts, seed_object_store};
use polars::prelude::*;
use reservation_mlops::error::PipelineError;
use reservation_mlops::ingestion::DataIngestion;
use reservation_mlops::manifest::StageManifest;
use reservation_mlops::preprocessing::{DataPreprocessor, LabelEncoder};
use reservation_mlops::utils::data_loader::{column_names, drop_duplicate_rows, load_csv, save_csv};
use reservation_mlops::utils::{ensure_dir, ArtifactLayout};
use reservation_mlops::{LoggingContext, PipelineConfig};
use std::path::Path;

fn ingest(root: &Path, config: &PipelineConfig) -> ArtifactLayout {
    seed_object_store(root, &mut hotel_frame(1000, 11));
    let layout = ArtifactLayout::from_config(&config.paths);
    DataIngestion::new(config, layout.clone())
        .unwrap()
        .run(&LoggingContext::disabled())
        .unwrap();
    layout
}

#[test]
fn test_processed_partitions_share_columns() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let layout = ingest(dir.path(), &config);

    let report = DataPreprocessor::new(&config, layout.clone())
        .process(&LoggingContext::disabled())
        .unwrap();

    let train = load_csv(&layout.processed_train_file()).unwrap();
    let test = load_csv(&layout.processed_test_file()).unwrap();
    let columns = column_names(&train);
    assert_eq!(columns, column_names(&test));
    assert_eq!(columns.last().map(String::as_str), Some("booking_status"));
    assert_eq!(columns.len(), report.selected_features.len() + 1);
    assert!(!columns.contains(&"Booking_ID".to_string()));
    assert!(report.skewed_columns.contains(&"no_of_previous_cancellations".to_string()));

    let manifest = StageManifest::read(&layout.processed_dir()).unwrap();
    manifest.verify("train", &train).unwrap();
    manifest.verify("test", &test).unwrap();
}

#[test]
fn test_smote_balances_train_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let layout = ingest(dir.path(), &config);
    let raw_test = load_csv(&layout.test_file()).unwrap();

    let report = DataPreprocessor::new(&config, layout.clone())
        .process(&LoggingContext::disabled())
        .unwrap();

    let train_counts = label_counts(&load_csv(&layout.processed_train_file()).unwrap(), "booking_status");
    assert_eq!(train_counts.len(), 2);
    assert_eq!(train_counts[0].1, train_counts[1].1);
    assert!(report.synthetic.iter().any(|&(_, n)| n > 0));

    // Canceled sorts before Not_Canceled, so it is encoded as 0
    let test_counts = label_counts(&load_csv(&layout.processed_test_file()).unwrap(), "booking_status");
    let canceled = raw_test
        .column("booking_status")
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_no_null_iter()
        .filter(|s| *s == "Canceled")
        .count();
    assert_eq!(report.test_rows, raw_test.height());
    assert_eq!(test_counts[0], (0, canceled));
}

#[test]
fn test_top_k_selection() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_yaml_str(&common::config_yaml(dir.path(), Some(4))).unwrap();
    let layout = ingest(dir.path(), &config);

    let report = DataPreprocessor::new(&config, layout.clone())
        .process(&LoggingContext::disabled())
        .unwrap();
    assert_eq!(report.selected_features.len(), 4);

    let test = load_csv(&layout.processed_test_file()).unwrap();
    let mut expected = report.selected_features.clone();
    expected.push("booking_status".to_string());
    assert_eq!(column_names(&test), expected);
}

#[test]
fn test_cleaning_is_idempotent_on_clean_input() {
    let df = df!(
        "room" => ["Room_Type 1", "Room_Type 2", "Room_Type 1"],
        "lead_time" => [10i64, 20, 30]
    )
    .unwrap();
    let columns = vec!["room".to_string()];

    let once = LabelEncoder::new()
        .fit_transform(&drop_duplicate_rows(&df).unwrap(), &columns)
        .unwrap();
    let twice = LabelEncoder::new()
        .fit_transform(&drop_duplicate_rows(&once).unwrap(), &columns)
        .unwrap();
    assert!(once.equals(&twice));
}

fn write_raw(layout: &ArtifactLayout, mut train: DataFrame, mut test: DataFrame) {
    ensure_dir(&layout.raw_dir()).unwrap();
    save_csv(&mut train, &layout.train_file()).unwrap();
    save_csv(&mut test, &layout.test_file()).unwrap();
    StageManifest::new("ingestion")
        .with_partition("train", &layout.train_file(), &train)
        .with_partition("test", &layout.test_file(), &test)
        .write(&layout.raw_dir())
        .unwrap();
}

#[test]
fn test_unseen_test_category_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let layout = ArtifactLayout::from_config(&config.paths);

    let train = hotel_frame(200, 3);
    let mut test = hotel_frame(20, 4);
    let meals: Vec<&str> = vec!["Meal Plan 9"; test.height()];
    test.with_column(Series::new("type_of_meal_plan".into(), meals)).unwrap();
    write_raw(&layout, train, test);

    let err = DataPreprocessor::new(&config, layout.clone())
        .process(&LoggingContext::disabled())
        .unwrap_err();
    assert!(matches!(err, PipelineError::DataValidation { .. }), "{err:?}");
    assert!(!layout.processed_train_file().exists());
}

#[test]
fn test_missing_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let layout = ArtifactLayout::from_config(&config.paths);

    let train = hotel_frame(100, 5).drop("lead_time").unwrap();
    let test = hotel_frame(20, 6).drop("lead_time").unwrap();
    write_raw(&layout, train, test);

    let err = DataPreprocessor::new(&config, layout)
        .process(&LoggingContext::disabled())
        .unwrap_err();
    match err {
        PipelineError::DataValidation { reason, .. } => assert!(reason.contains("lead_time")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_raw_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path());
    let err = DataPreprocessor::new(&config, ArtifactLayout::from_config(&config.paths))
        .process(&LoggingContext::disabled())
        .unwrap_err();
    assert!(matches!(err, PipelineError::DataValidation { .. }));
}
