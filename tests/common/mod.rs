//! Shared fixtures: a synthetic hotel-reservation dataset and configs that
//! point every artifact at a scratch directory

#![allow(dead_code)]

use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reservation_mlops::config::PipelineConfig;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const BUCKET: &str = "hotel-bucket";
pub const OBJECT: &str = "Hotel_Reservations.csv";

pub const CATEGORICAL: [&str; 5] = [
    "type_of_meal_plan",
    "room_type_reserved",
    "market_segment_type",
    "arrival_year",
    "required_car_parking_space",
];

pub const NUMERICAL: [&str; 5] = [
    "lead_time",
    "avg_price_per_room",
    "no_of_special_requests",
    "no_of_week_nights",
    "no_of_previous_cancellations",
];

/// `n` bookings: Booking_ID, 5 categorical, 5 numerical and a label that is
/// `Not_Canceled` for ~80% of rows
pub fn hotel_frame(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let meals = ["Meal Plan 1", "Meal Plan 2", "Not Selected"];
    let rooms = ["Room_Type 1", "Room_Type 2", "Room_Type 4"];
    let segments = ["Online", "Offline", "Corporate"];

    let mut ids = Vec::with_capacity(n);
    let mut meal = Vec::with_capacity(n);
    let mut room = Vec::with_capacity(n);
    let mut segment = Vec::with_capacity(n);
    let mut year = Vec::with_capacity(n);
    let mut parking = Vec::with_capacity(n);
    let mut lead_time = Vec::with_capacity(n);
    let mut price = Vec::with_capacity(n);
    let mut requests = Vec::with_capacity(n);
    let mut week_nights = Vec::with_capacity(n);
    let mut previous = Vec::with_capacity(n);
    let mut status = Vec::with_capacity(n);

    for i in 0..n {
        let canceled = rng.gen_bool(0.2);
        ids.push(format!("INN{:05}", i + 1));
        meal.push(meals[rng.gen_range(0..meals.len())]);
        room.push(rooms[rng.gen_range(0..rooms.len())]);
        segment.push(if canceled && rng.gen_bool(0.6) { "Online" } else { segments[rng.gen_range(0..segments.len())] });
        year.push(if rng.gen_bool(0.8) { 2018i64 } else { 2017 });
        parking.push(i64::from(!canceled && rng.gen_bool(0.1)));

        let base_lead = if canceled { 120.0 } else { 30.0 };
        lead_time.push((base_lead * -(1.0 - rng.gen::<f64>()).ln()).round() as i64);
        price.push(((70.0 + rng.gen::<f64>() * 80.0) * 100.0).round() / 100.0);
        requests.push(if canceled { 0 } else { rng.gen_range(0..3i64) });
        week_nights.push(rng.gen_range(0..6i64));
        previous.push(if rng.gen_bool(0.03) { rng.gen_range(1..12i64) } else { 0 });
        status.push(if canceled { "Canceled" } else { "Not_Canceled" });
    }

    df!(
        "Booking_ID" => ids,
        "type_of_meal_plan" => meal,
        "room_type_reserved" => room,
        "market_segment_type" => segment,
        "arrival_year" => year,
        "required_car_parking_space" => parking,
        "lead_time" => lead_time,
        "avg_price_per_room" => price,
        "no_of_special_requests" => requests,
        "no_of_week_nights" => week_nights,
        "no_of_previous_cancellations" => previous,
        "booking_status" => status
    )
    .unwrap()
}

/// Write the dataset where the local object store expects it
pub fn seed_object_store(root: &Path, df: &mut DataFrame) -> PathBuf {
    let dir = root.join("store").join(BUCKET);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(OBJECT);
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).include_header(true).finish(df).unwrap();
    path
}

fn yaml_list(items: &[&str]) -> String {
    format!("[{}]", items.join(", "))
}

/// Config YAML with small search settings and every path under `root`
pub fn config_yaml(root: &Path, no_of_features: Option<usize>) -> String {
    let features = no_of_features
        .map(|k| format!("  no_of_features: {k}\n"))
        .unwrap_or_default();
    format!(
        r#"data_ingestion:
  bucket_name: {BUCKET}
  bucket_file_name: {OBJECT}
  train_ratio: 0.8
data_processing:
  categorical_columns: {categorical}
  numerical_columns: {numerical}
  skewness_threshold: 3
{features}  selector_estimators: 10
object_store:
  kind: local
  root: {store}
model_training:
  n_iter: 2
  cv: 3
  min_child_samples: 10
  param_distributions:
    n_estimators: {{low: 10, high: 20}}
    max_depth: {{low: 3, high: 6}}
    num_leaves: {{low: 4, high: 16}}
paths:
  artifacts_dir: {artifacts}
tracking:
  dir: {mlruns}
logging:
  dir: {logs}
  to_file: true
"#,
        categorical = yaml_list(&CATEGORICAL),
        numerical = yaml_list(&NUMERICAL),
        store = root.join("store").display(),
        artifacts = root.join("artifacts").display(),
        mlruns = root.join("mlruns").display(),
        logs = root.join("logs").display(),
    )
}

pub fn write_config(root: &Path, no_of_features: Option<usize>) -> PathBuf {
    let path = root.join("config.yaml");
    std::fs::write(&path, config_yaml(root, no_of_features)).unwrap();
    path
}

pub fn config(root: &Path) -> PipelineConfig {
    PipelineConfig::from_yaml_str(&config_yaml(root, Some(10))).unwrap()
}

/// Label counts of a CSV column, as `(value, count)` sorted by value
pub fn label_counts(df: &DataFrame, column: &str) -> Vec<(i64, usize)> {
    let values = df
        .column(column)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Int64)
        .unwrap();
    let mut counts = std::collections::BTreeMap::new();
    for v in values.i64().unwrap().into_no_null_iter() {
        *counts.entry(v).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}
