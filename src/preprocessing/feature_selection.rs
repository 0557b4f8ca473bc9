//! Feature selection by random-forest importance

use crate::error::{PipelineError, Result};
use crate::training::random_forest::{MaxFeatures, RandomForest};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Ranks features by the mean impurity decrease of a random-forest regressor
/// fitted on the label, and keeps the top `k`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceSelector {
    k: usize,
    n_estimators: usize,
    random_state: u64,
    feature_names: Vec<String>,
    scores: Vec<f64>,
    selected: Vec<usize>,
}

impl ImportanceSelector {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            n_estimators: 100,
            random_state: 42,
            feature_names: Vec::new(),
            scores: Vec::new(),
            selected: Vec::new(),
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, feature_names: &[String]) -> Result<&mut Self> {
        if feature_names.len() != x.ncols() {
            return Err(PipelineError::data(
                "feature selection",
                format!("{} names for {} columns", feature_names.len(), x.ncols()),
            ));
        }
        if self.k == 0 {
            return Err(PipelineError::config("data_processing.no_of_features", "must be at least 1"));
        }

        let mut forest = RandomForest::new_regressor(self.n_estimators)
            .with_max_features(MaxFeatures::All)
            .with_random_state(self.random_state);
        forest.fit(x, y)?;
        let importances = forest
            .feature_importances()
            .ok_or_else(|| PipelineError::training("forest produced no importances"))?;

        self.feature_names = feature_names.to_vec();
        self.scores = importances.to_vec();

        // Stable sort: equal importances keep column order
        let mut order: Vec<usize> = (0..x.ncols()).collect();
        order.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]));
        order.truncate(self.k.min(order.len()));
        self.selected = order;

        info!(
            ranking = ?self.ranking().iter().take(self.selected.len()).collect::<Vec<_>>(),
            "Feature importances"
        );
        Ok(self)
    }

    /// Selected column names, most important first
    pub fn selected_features(&self) -> Vec<String> {
        self.selected.iter().map(|&i| self.feature_names[i].clone()).collect()
    }

    /// Every feature with its importance, most important first
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.scores.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn test_informative_feature_ranked_first() {
        let x = Array2::from_shape_fn((80, 3), |(i, j)| match j {
            0 => ((i * 13) % 7) as f64,
            1 => i as f64,
            _ => ((i * 5) % 3) as f64,
        });
        let y = Array1::from_shape_fn(80, |i| if i >= 40 { 1.0 } else { 0.0 });

        let mut selector = ImportanceSelector::new(2).with_n_estimators(20);
        selector.fit(&x, &y, &names(3)).unwrap();
        let selected = selector.selected_features();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], "f1");
    }

    #[test]
    fn test_k_above_feature_count_keeps_all() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_shape_fn(20, |i| (i % 2) as f64);
        let mut selector = ImportanceSelector::new(10).with_n_estimators(5);
        selector.fit(&x, &y, &names(2)).unwrap();
        assert_eq!(selector.selected_features().len(), 2);
    }

    #[test]
    fn test_ties_keep_column_order() {
        // Constant features never split, so all importances are zero
        let x = Array2::from_elem((10, 3), 1.0);
        let y = Array1::from_shape_fn(10, |i| i as f64);
        let mut selector = ImportanceSelector::new(2).with_n_estimators(3);
        selector.fit(&x, &y, &names(3)).unwrap();
        assert_eq!(selector.selected_features(), vec!["f0".to_string(), "f1".to_string()]);
    }

    #[test]
    fn test_name_count_mismatch() {
        let x = Array2::zeros((4, 2));
        let y = Array1::zeros(4);
        assert!(ImportanceSelector::new(1).fit(&x, &y, &names(3)).is_err());
    }
}
