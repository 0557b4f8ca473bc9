//! Model trait and evaluation metrics

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Classification metrics; precision, recall and F1 are support-weighted
/// averages over every label seen in either vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl EvaluationMetrics {
    /// Names accepted by [`EvaluationMetrics::score`]
    pub const SCORING: [&'static str; 4] = ["accuracy", "precision", "recall", "f1"];

    pub fn compute(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::training(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(PipelineError::training("cannot evaluate on zero samples"));
        }

        let n = y_true.len() as f64;
        let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();

        let labels: BTreeSet<i64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let mut counts: BTreeMap<i64, ConfusionCounts> =
            labels.iter().map(|&l| (l, ConfusionCounts::default())).collect();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t == p {
                counts.entry(t).or_default().tp += 1;
            } else {
                counts.entry(p).or_default().fp += 1;
                counts.entry(t).or_default().fn_ += 1;
            }
        }

        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
        for c in counts.values() {
            let support = (c.tp + c.fn_) as f64;
            if support == 0.0 {
                continue;
            }
            let p = ratio(c.tp, c.tp + c.fp);
            let r = ratio(c.tp, c.tp + c.fn_);
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
            precision += support * p;
            recall += support * r;
            f1 += support * f;
        }

        Ok(Self {
            accuracy: correct as f64 / n,
            precision: precision / n,
            recall: recall / n,
            f1_score: f1 / n,
        })
    }

    /// Look up a metric by scoring name
    pub fn score(&self, scoring: &str) -> Result<f64> {
        match scoring {
            "accuracy" => Ok(self.accuracy),
            "precision" => Ok(self.precision),
            "recall" => Ok(self.recall),
            "f1" | "f1_score" => Ok(self.f1_score),
            other => Err(PipelineError::config(
                "model_training.scoring",
                format!("unknown scoring '{other}', expected one of {:?}", Self::SCORING),
            )),
        }
    }

    /// Flat name → value map for the experiment tracker
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1_score".to_string(), self.f1_score),
        ])
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ConfusionCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// A classifier over integer labels
pub trait Model: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_weighted_metrics_match_hand_computation() {
        let y_true = array![1, 0, 1, 1, 0, 1, 0, 0];
        let y_pred = array![1, 0, 1, 0, 0, 1, 1, 0];

        let m = EvaluationMetrics::compute(&y_true, &y_pred).unwrap();
        // Each class: tp=3, fp=1, fn=1 → p = r = f1 = 0.75
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_predictions() {
        let y = array![0, 1, 1, 0, 1];
        let m = EvaluationMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
    }

    #[test]
    fn test_zero_division_counts_as_zero() {
        // Class 1 is never predicted: its precision is 0 rather than NaN
        let y_true = array![0, 0, 0, 1];
        let y_pred = array![0, 0, 0, 0];
        let m = EvaluationMetrics::compute(&y_true, &y_pred).unwrap();
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.5625).abs() < 1e-12);
        assert!(m.f1_score.is_finite());
    }

    #[test]
    fn test_score_lookup() {
        let y = array![0, 1];
        let m = EvaluationMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.score("accuracy").unwrap(), 1.0);
        assert!(m.score("roc_auc").is_err());
        assert_eq!(m.to_map().len(), 4);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(EvaluationMetrics::compute(&array![0, 1], &array![0]).is_err());
    }
}
