//! Regression tree (MSE criterion) with impurity-based feature importances
//!
//! Splits are found on per-feature presorted sample lists that are partitioned
//! stably at every node, so each level costs O(n · features) instead of
//! re-sorting at every node.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict(&self, sample: &ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                if sample[*feature_idx] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
    /// Seed for the per-split feature subset
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_regressor()
    }
}

/// Samples reaching a node, once per feature, each list sorted by that feature
struct NodeSamples {
    by_feature: Vec<Vec<usize>>,
}

impl NodeSamples {
    fn len(&self) -> usize {
        self.by_feature.first().map_or(0, Vec::len)
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl DecisionTree {
    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::training(format!(
                "x has {n_samples} rows but y has {} values",
                y.len()
            )));
        }
        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::training("cannot fit a tree on an empty matrix"));
        }

        self.n_features = n_features;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut importances = vec![0.0; n_features];
        let mut goes_left = vec![false; n_samples];

        let by_feature: Vec<Vec<usize>> = (0..n_features)
            .map(|f| {
                let mut idx: Vec<usize> = (0..n_samples).collect();
                idx.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
                idx
            })
            .collect();

        let root = self.build_tree(
            x,
            y,
            NodeSamples { by_feature },
            0,
            &mut importances,
            &mut goes_left,
            &mut rng,
        );
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        samples: NodeSamples,
        depth: usize,
        importances: &mut [f64],
        goes_left: &mut [bool],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n = samples.len();
        let members = &samples.by_feature[0];
        let sum: f64 = members.iter().map(|&i| y[i]).sum();
        let mean = sum / n as f64;

        let is_pure = members.iter().all(|&i| (y[i] - mean).abs() <= f64::EPSILON * mean.abs().max(1.0));
        let should_stop = n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || is_pure;
        if should_stop {
            return TreeNode::Leaf { value: mean, n_samples: n };
        }

        let best = match self.find_best_split(x, y, &samples, sum, rng) {
            Some(best) => best,
            None => return TreeNode::Leaf { value: mean, n_samples: n },
        };

        importances[best.feature] += best.score - sum * sum / n as f64;

        for &i in members {
            goes_left[i] = x[[i, best.feature]] <= best.threshold;
        }
        let (left, right): (Vec<Vec<usize>>, Vec<Vec<usize>>) = samples
            .by_feature
            .into_iter()
            .map(|list| list.into_iter().partition(|&i| goes_left[i]))
            .unzip();

        let left = self.build_tree(
            x,
            y,
            NodeSamples { by_feature: left },
            depth + 1,
            importances,
            goes_left,
            rng,
        );
        let right = self.build_tree(
            x,
            y,
            NodeSamples { by_feature: right },
            depth + 1,
            importances,
            goes_left,
            rng,
        );

        TreeNode::Split {
            feature_idx: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples: n,
        }
    }

    /// Maximise `sum_l² / n_l + sum_r² / n_r`, which is equivalent to
    /// minimising the weighted child variance
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        samples: &NodeSamples,
        total_sum: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n = samples.len();
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.max_features.filter(|&k| k < self.n_features) {
            features.shuffle(rng);
            features.truncate(k);
            features.sort_unstable();
        }

        let parent_score = total_sum * total_sum / n as f64;
        let mut best: Option<BestSplit> = None;

        for f in features {
            let sorted = &samples.by_feature[f];
            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                let i = sorted[pos];
                left_sum += y[i];
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let here = x[[i, f]];
                let next = x[[sorted[pos + 1], f]];
                if here >= next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if score > parent_score + 1e-12 && best.as_ref().map_or(true, |b| score > b.score) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature: f,
                        threshold,
                        score,
                    });
                }
            }
        }
        best
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| PipelineError::training("tree used before fit"))?;
        if x.ncols() != self.n_features {
            return Err(PipelineError::training(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| root.predict(&row)).collect())
    }

    /// Normalised impurity decrease per feature
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_fits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let preds = tree.predict(&x).unwrap();
        assert_eq!(preds, y);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_importances_favour_informative_feature() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [4.0, 7.0], [5.0, 7.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let imp = tree.feature_importances().unwrap();
        assert!((imp[0] - 1.0).abs() < 1e-12);
        assert_eq!(imp[1], 0.0);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(32, |i| (i * i) as f64);

        let mut tree = DecisionTree::new_regressor().with_max_depth(3);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn test_constant_target_yields_single_leaf() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![4.0, 4.0, 4.0];
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.feature_importances().unwrap().sum(), 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(DecisionTree::new_regressor().fit(&x, &y).is_err());
    }
}
