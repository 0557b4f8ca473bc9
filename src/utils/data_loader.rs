//! CSV loading/saving and conversions between polars frames and ndarray matrices

use crate::error::{PipelineError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Load a CSV file with a header row; column types are inferred from every
/// row so a late fractional value still yields a float column
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "data file not found"),
        ));
    }
    info!(path = %path.display(), "Loading data");

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| PipelineError::data(path.display().to_string(), e.to_string()))?;

    info!(rows = df.height(), cols = df.width(), "Data loaded");
    Ok(df)
}

/// Write a frame as CSV with a header, creating parent directories
pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        super::paths::ensure_dir(parent)?;
    }
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| PipelineError::data(path.display().to_string(), e.to_string()))?;
    info!(path = %path.display(), rows = df.height(), "Data saved");
    Ok(())
}

/// Column names in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Fail with a validation error naming the first absent column
pub fn require_columns(df: &DataFrame, columns: &[String], context: &str) -> Result<()> {
    let present: HashSet<String> = column_names(df).into_iter().collect();
    for col in columns {
        if !present.contains(col) {
            return Err(PipelineError::data(context, format!("missing column '{col}'")));
        }
    }
    Ok(())
}

/// True when the column holds text rather than numbers
pub fn is_text_column(df: &DataFrame, name: &str) -> Result<bool> {
    let column = df.column(name)?;
    Ok(matches!(column.dtype(), DataType::String | DataType::Categorical(_, _)))
}

/// Extract a column as `f64`, failing on nulls or non-numeric values
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.as_materialized_series();
    let casted = series.cast(&DataType::Float64)?;
    let values = casted.f64()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                PipelineError::data(
                    format!("column '{name}'"),
                    format!("row {row} is missing or not numeric"),
                )
            })
        })
        .collect()
}

/// Extract a column as strings, failing on nulls
pub fn text_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.as_materialized_series();
    let casted = series.cast(&DataType::String)?;
    let values = casted.str()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string).ok_or_else(|| {
                PipelineError::data(format!("column '{name}'"), format!("row {row} is missing"))
            })
        })
        .collect()
}

/// Replace (or append) a float column in place
pub fn set_f64_column(df: &mut DataFrame, name: &str, values: Vec<f64>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Replace (or append) an integer column in place
pub fn set_i64_column(df: &mut DataFrame, name: &str, values: Vec<i64>) -> Result<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Select the given rows, in the given order
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Drop exact duplicate rows, keeping the first occurrence of each
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    let columns: Vec<Vec<Option<String>>> = df
        .get_columns()
        .iter()
        .map(|c| {
            let as_text = c.as_materialized_series().cast(&DataType::String)?;
            let values = as_text.str()?.into_iter().map(|v| v.map(str::to_string)).collect();
            Ok(values)
        })
        .collect::<Result<_>>()?;

    let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(df.height());
    let mut keep = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let key: Vec<Option<String>> = columns.iter().map(|c| c[row].clone()).collect();
        if seen.insert(key) {
            keep.push(row);
        }
    }

    if keep.len() == df.height() {
        return Ok(df.clone());
    }
    take_rows(df, &keep)
}

/// Stack the named columns into a row-major matrix
pub fn to_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let data: Vec<Vec<f64>> = columns
        .iter()
        .map(|c| numeric_column(df, c))
        .collect::<Result<_>>()?;
    Ok(Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| data[j][i]))
}

/// Build a frame from a feature matrix and an integer label column
pub fn frame_from_matrix(
    feature_names: &[String],
    x: &Array2<f64>,
    label_name: &str,
    y: &[i64],
) -> Result<DataFrame> {
    if x.ncols() != feature_names.len() || x.nrows() != y.len() {
        return Err(PipelineError::data(
            "frame_from_matrix",
            format!(
                "matrix is {}x{}, expected {} columns and {} rows",
                x.nrows(),
                x.ncols(),
                feature_names.len(),
                y.len()
            ),
        ));
    }

    let mut columns: Vec<Column> = feature_names
        .iter()
        .enumerate()
        .map(|(j, name)| Series::new(name.as_str().into(), x.column(j).to_vec()).into())
        .collect();
    columns.push(Series::new(label_name.into(), y.to_vec()).into());
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "id" => &["a", "b", "b", "c"],
            "x" => &[1.0, 2.0, 2.0, 3.0],
            "n" => &[10i64, 20, 20, 30]
        )
        .unwrap()
    }

    #[test]
    fn test_csv_roundtrip_preserves_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("frame.csv");
        let mut df = sample_df();
        save_csv(&mut df, &path).unwrap();

        let loaded = load_csv(&path).unwrap();
        assert_eq!(loaded.height(), 4);
        assert_eq!(column_names(&loaded), vec!["id", "x", "n"]);
    }

    #[test]
    fn test_late_fractional_value_loads_as_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut text = String::from("Booking_ID,avg_price_per_room\n");
        for i in 0..1500 {
            text.push_str(&format!("INN{i:05},{}\n", 65 + i % 40));
        }
        text.push_str("INN01500,106.68\n");
        std::fs::write(&path, text).unwrap();

        let loaded = load_csv(&path).unwrap();
        assert_eq!(loaded.height(), 1501);
        assert_eq!(loaded.column("avg_price_per_room").unwrap().dtype(), &DataType::Float64);
        let prices = numeric_column(&loaded, "avg_price_per_room").unwrap();
        assert_eq!(prices[1500], 106.68);
        assert_eq!(prices[0], 65.0);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_drop_duplicate_rows_keeps_first() {
        let deduped = drop_duplicate_rows(&sample_df()).unwrap();
        assert_eq!(deduped.height(), 3);
        assert_eq!(text_column(&deduped, "id").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_numeric_column_rejects_text() {
        let err = numeric_column(&sample_df(), "id").unwrap_err();
        assert!(matches!(err, PipelineError::DataValidation { .. }));
        assert_eq!(numeric_column(&sample_df(), "n").unwrap(), vec![10.0, 20.0, 20.0, 30.0]);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let df = sample_df();
        let cols = vec!["x".to_string(), "n".to_string()];
        let x = to_matrix(&df, &cols).unwrap();
        assert_eq!(x.dim(), (4, 2));
        assert_eq!(x[[3, 1]], 30.0);

        let rebuilt = frame_from_matrix(&cols, &x, "label", &[0, 1, 1, 0]).unwrap();
        assert_eq!(column_names(&rebuilt), vec!["x", "n", "label"]);
        assert_eq!(rebuilt.height(), 4);
    }

    #[test]
    fn test_require_columns() {
        let df = sample_df();
        assert!(require_columns(&df, &["x".to_string()], "test").is_ok());
        let err = require_columns(&df, &["missing".to_string()], "test").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
