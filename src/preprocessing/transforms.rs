//! Skewness measurement and log correction of numerical columns

use crate::error::{PipelineError, Result};
use crate::utils::data_loader::{numeric_column, set_f64_column};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Bias-adjusted Fisher-Pearson sample skewness
/// `G1 = sqrt(n(n-1)) / (n-2) * m3 / m2^1.5`.
///
/// Undefined (NaN) below three values; a constant column has skewness 0.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let (mut m2, mut m3) = (0.0, 0.0);
    for &v in values {
        let d = v - mean;
        m2 += d * d;
        m3 += d * d * d;
    }
    m2 /= nf;
    m3 /= nf;
    if m2 <= (1e-14 * mean.abs().max(1.0)).powi(2) {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    (nf * (nf - 1.0)).sqrt() / (nf - 2.0) * g1
}

/// Chooses columns whose skewness exceeds a threshold and applies `ln(1 + x)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkewCorrector {
    threshold: f64,
    skewed: Vec<String>,
    is_fitted: bool,
}

impl SkewCorrector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            skewed: Vec::new(),
            is_fitted: false,
        }
    }

    /// Measure every candidate column; those strictly above the threshold are
    /// remembered in input order
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.skewed.clear();
        for col in columns {
            let skew = skewness(&numeric_column(df, col)?);
            if skew > self.threshold {
                info!(column = %col, skewness = skew, "Column is skewed");
                self.skewed.push(col.clone());
            }
        }
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(PipelineError::data("skew correction", "transform called before fit"));
        }
        let mut out = df.clone();
        for col in &self.skewed {
            let values = numeric_column(df, col)?;
            if let Some(v) = values.iter().find(|&&v| v <= -1.0) {
                return Err(PipelineError::data(
                    format!("column '{col}'"),
                    format!("log1p undefined for {v}"),
                ));
            }
            set_f64_column(&mut out, col, values.into_iter().map(f64::ln_1p).collect())?;
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Columns chosen at fit time
    pub fn skewed_columns(&self) -> &[String] {
        &self.skewed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_skewness_matches_pandas() {
        // pandas.Series([1, 2, 3, 10]).skew() == 1.7636...
        let s = skewness(&[1.0, 2.0, 3.0, 10.0]);
        assert!((s - 1.763_632_7).abs() < 1e-6, "{s}");
        assert!(skewness(&[1.0, 2.0, 3.0]).abs() < 1e-12);
    }

    #[test]
    fn test_skewness_edge_cases() {
        assert!(skewness(&[1.0, 2.0]).is_nan());
        assert_eq!(skewness(&[4.0; 10]), 0.0);
    }

    #[test]
    fn test_only_skewed_columns_are_logged() {
        let mut heavy = vec![0.0; 30];
        heavy.push(1000.0);
        let flat: Vec<f64> = (0..31).map(|i| i as f64).collect();
        let df = df!("lead_time" => heavy.clone(), "price" => flat.clone()).unwrap();

        let mut corrector = SkewCorrector::new(3.0);
        let out = corrector
            .fit_transform(&df, &["lead_time".to_string(), "price".to_string()])
            .unwrap();
        assert_eq!(corrector.skewed_columns(), ["lead_time".to_string()]);

        let lead = numeric_column(&out, "lead_time").unwrap();
        assert!((lead[30] - 1000f64.ln_1p()).abs() < 1e-12);
        assert_eq!(numeric_column(&out, "price").unwrap(), flat);
    }

    #[test]
    fn test_values_below_minus_one_rejected() {
        let mut values = vec![0.0; 30];
        values.push(1000.0);
        let train = df!("x" => values).unwrap();
        let test = df!("x" => [-2.0, 1.0]).unwrap();

        let mut corrector = SkewCorrector::new(1.0);
        corrector.fit(&train, &["x".to_string()]).unwrap();
        assert!(corrector.transform(&test).is_err());
    }
}
