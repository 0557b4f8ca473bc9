//! Label encoding for categorical columns

use crate::error::{PipelineError, Result};
use crate::utils::data_loader::{is_text_column, numeric_column, set_i64_column, text_column};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Sorted unique values of one column; a value's code is its position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Classes {
    Text(Vec<String>),
    Numeric(Vec<f64>),
}

impl Classes {
    fn len(&self) -> usize {
        match self {
            Classes::Text(v) => v.len(),
            Classes::Numeric(v) => v.len(),
        }
    }
}

/// Maps each category to an integer code in sorted order of the values
/// seen at fit time; numeric categories sort numerically
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: BTreeMap<String, Classes>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the categories of each column
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        for col in columns {
            let classes = if is_text_column(df, col)? {
                let mut values = text_column(df, col)?;
                values.sort();
                values.dedup();
                Classes::Text(values)
            } else {
                let mut values = numeric_column(df, col)?;
                if let Some(v) = values.iter().find(|v| v.is_nan()) {
                    return Err(PipelineError::data(format!("column '{col}'"), format!("cannot encode {v}")));
                }
                values.sort_by(f64::total_cmp);
                values.dedup();
                Classes::Numeric(values)
            };
            info!(column = %col, mapping = ?self.describe(&classes), "Label mapping");
            self.classes.insert(col.clone(), classes);
        }
        Ok(self)
    }

    /// Replace every fitted column with its integer codes
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for (col, classes) in &self.classes {
            let context = format!("column '{col}'");
            let codes: Vec<i64> = match classes {
                Classes::Text(known) => text_column(df, col)?
                    .iter()
                    .map(|v| {
                        known
                            .binary_search(v)
                            .map(|i| i as i64)
                            .map_err(|_| PipelineError::data(&context, format!("unseen category '{v}'")))
                    })
                    .collect::<Result<_>>()?,
                Classes::Numeric(known) => numeric_column(df, col)?
                    .iter()
                    .map(|v| {
                        known
                            .binary_search_by(|k| k.total_cmp(v))
                            .map(|i| i as i64)
                            .map_err(|_| PipelineError::data(&context, format!("unseen category {v}")))
                    })
                    .collect::<Result<_>>()?,
            };
            set_i64_column(&mut out, col, codes)?;
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Category → code for one fitted column
    pub fn mapping(&self, column: &str) -> Option<BTreeMap<String, i64>> {
        self.classes.get(column).map(|c| self.describe(c))
    }

    pub fn n_classes(&self, column: &str) -> Option<usize> {
        self.classes.get(column).map(Classes::len)
    }

    fn describe(&self, classes: &Classes) -> BTreeMap<String, i64> {
        match classes {
            Classes::Text(v) => v.iter().enumerate().map(|(i, s)| (s.clone(), i as i64)).collect(),
            Classes::Numeric(v) => v.iter().enumerate().map(|(i, x)| (x.to_string(), i as i64)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_codes_follow_sorted_order() {
        let df = df!(
            "meal" => ["Meal Plan 2", "Not Selected", "Meal Plan 1", "Meal Plan 2"],
            "status" => ["Not_Canceled", "Canceled", "Not_Canceled", "Canceled"]
        )
        .unwrap();
        let mut enc = LabelEncoder::new();
        let out = enc.fit_transform(&df, &cols(&["meal", "status"])).unwrap();

        let meal: Vec<i64> = out.column("meal").unwrap().as_materialized_series().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(meal, vec![1, 2, 0, 1]);
        assert_eq!(enc.mapping("status").unwrap()["Canceled"], 0);
        assert_eq!(enc.mapping("status").unwrap()["Not_Canceled"], 1);
    }

    #[test]
    fn test_numeric_categories_sort_numerically() {
        let df = df!("year" => [2018i64, 2017, 2018, 9]).unwrap();
        let mut enc = LabelEncoder::new();
        let out = enc.fit_transform(&df, &cols(&["year"])).unwrap();
        let codes: Vec<i64> = out.column("year").unwrap().as_materialized_series().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(codes, vec![2, 1, 2, 0]);
        assert_eq!(enc.n_classes("year"), Some(3));
    }

    #[test]
    fn test_unseen_category_is_rejected() {
        let train = df!("room" => ["Room_Type 1", "Room_Type 2"]).unwrap();
        let test = df!("room" => ["Room_Type 7"]).unwrap();
        let mut enc = LabelEncoder::new();
        enc.fit(&train, &cols(&["room"])).unwrap();
        let err = enc.transform(&test).unwrap_err();
        assert!(matches!(err, PipelineError::DataValidation { .. }));
    }

    #[test]
    fn test_encoding_is_idempotent_on_codes() {
        let df = df!("c" => [0i64, 1, 2, 1]).unwrap();
        let mut enc = LabelEncoder::new();
        let out = enc.fit_transform(&df, &cols(&["c"])).unwrap();
        assert!(out.equals(&df));
    }
}
