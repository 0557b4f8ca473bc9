//! SMOTE oversampling

use crate::error::{PipelineError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties on distance resolve by index so neighbour sets are deterministic
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Every class below the majority count receives synthetic rows placed on the
/// segment between a random class member and one of its `k` nearest
/// same-class neighbours. Original rows are returned unchanged, first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    k_neighbors: usize,
    seed: Option<u64>,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).powi(2)).sum()
    }

    /// k nearest neighbours of `rows[pos]` among `rows`, excluding `pos` itself.
    /// Returned as positions into `rows`.
    fn find_neighbors(x: &Array2<f64>, rows: &[usize], pos: usize, k: usize) -> Vec<usize> {
        let point = x.row(rows[pos]);
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (other, &row) in rows.iter().enumerate() {
            if other == pos {
                continue;
            }
            let candidate = DistIdx(Self::squared_distance(point, x.row(row)), other);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        let mut neighbors: Vec<DistIdx> = heap.into_vec();
        neighbors.sort();
        neighbors.into_iter().map(|DistIdx(_, i)| i).collect()
    }

    fn interpolate(point: ArrayView1<f64>, neighbor: ArrayView1<f64>, gap: f64) -> Vec<f64> {
        point
            .iter()
            .zip(neighbor.iter())
            .map(|(&p, &n)| p + gap * (n - p))
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(PipelineError::data(
                "SMOTE",
                format!("need at least 2 classes, found {}", counts.len()),
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        self.target_counts = Some(counts.keys().map(|&class| (class, max_count)).collect());
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or_else(|| PipelineError::data("SMOTE", "sampler used before fit"))?;
        if x.nrows() != y.len() {
            return Err(PipelineError::data(
                "SMOTE",
                format!("{} rows but {} labels", x.nrows(), y.len()),
            ));
        }

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = Vec::with_capacity(targets.len());

        for (&class, &target_count) in targets {
            let rows = match indices.get(&class) {
                Some(rows) => rows,
                None => {
                    n_synthetic.push((class, 0));
                    continue;
                }
            };
            let n_to_generate = target_count.saturating_sub(rows.len());
            if n_to_generate == 0 {
                n_synthetic.push((class, 0));
                continue;
            }

            let k = self.k_neighbors.min(rows.len().saturating_sub(1));
            // Neighbour lists are computed lazily, once per sampled member
            let mut neighbor_cache: Vec<Option<Vec<usize>>> = vec![None; rows.len()];

            for _ in 0..n_to_generate {
                let pos = rng.gen_range(0..rows.len());
                let point = x.row(rows[pos]);

                if k == 0 {
                    // A single-member class can only be duplicated
                    synthetic_x.push(point.to_vec());
                } else {
                    let neighbors = neighbor_cache[pos]
                        .get_or_insert_with(|| Self::find_neighbors(x, rows, pos, k));
                    let neighbor = neighbors[rng.gen_range(0..neighbors.len())];
                    let gap: f64 = rng.gen();
                    synthetic_x.push(Self::interpolate(point, x.row(rows[neighbor]), gap));
                }
                synthetic_y.push(class);
            }

            n_synthetic.push((class, n_to_generate));
        }

        let n_original = x.nrows();
        let n_total = n_original + synthetic_x.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[i - n_original][j]
            }
        });

        let mut all_y: Vec<i64> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // 20 majority rows around (0, 0), 5 minority rows around (10, 10)
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }
        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        (
            Array2::from_shape_vec((25, 2), data).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic, vec![(0, 0), (1, 15)]);
    }

    #[test]
    fn test_smote_preserves_original_rows() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_synthetic_rows_stay_inside_minority_hull() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in x.nrows()..result.x.nrows() {
            assert!(result.x[[i, 0]] >= 10.0 && result.x[[i, 0]] <= 12.0);
            assert!(result.x[[i, 1]] >= 10.0 && result.x[[i, 1]] <= 11.0);
        }
    }

    #[test]
    fn test_smote_is_deterministic_with_seed() {
        let (x, y) = create_imbalanced_data();
        let a = SMOTE::new().with_seed(42).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(42).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_duplicate_minority_rows_terminate() {
        let x = Array2::from_shape_vec((5, 1), vec![0.0, 1.0, 2.0, 5.0, 5.0]).unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 1, 1]);
        let result = SMOTE::new().with_seed(1).fit_resample(&x, &y).unwrap();
        assert_eq!(result.x.nrows(), 6);
        assert_eq!(result.x[[5, 0]], 5.0);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x = Array2::zeros((3, 1));
        let y = Array1::from_vec(vec![1, 1, 1]);
        assert!(SMOTE::new().fit(&x, &y).is_err());
    }
}
