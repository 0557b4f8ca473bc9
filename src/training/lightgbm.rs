//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Key properties:
//! - Features are bucketed into at most `max_bin` quantile bins once per fit
//!   and split candidates are found on per-leaf gradient histograms
//! - Leaf-wise (best-first) growth bounded by `num_leaves` and `max_depth`
//! - Binary log-loss with Newton leaf values and L2 regularisation
//! - `gbdt` (plain shrinkage) or `dart` (dropout of existing trees)

use super::models::Model;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::str::FromStr;

/// Boosting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostingType {
    Gbdt,
    Dart,
}

impl fmt::Display for BoostingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostingType::Gbdt => write!(f, "gbdt"),
            BoostingType::Dart => write!(f, "dart"),
        }
    }
}

impl FromStr for BoostingType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gbdt" => Ok(BoostingType::Gbdt),
            "dart" => Ok(BoostingType::Dart),
            other => Err(PipelineError::config(
                "boosting_type",
                format!("unknown boosting type '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreeConfig {
    pub boosting_type: BoostingType,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    /// `None` leaves depth unbounded
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub min_sum_hessian_in_leaf: f64,
    pub reg_lambda: f64,
    pub max_bin: usize,
    /// Probability of dropping each existing tree in a dart round
    pub drop_rate: f64,
    /// Probability of skipping dropout for a dart round
    pub skip_drop: f64,
    pub max_drop: usize,
    pub random_state: u64,
}

impl Default for BoostedTreeConfig {
    fn default() -> Self {
        Self {
            boosting_type: BoostingType::Gbdt,
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_sum_hessian_in_leaf: 1e-3,
            reg_lambda: 0.0,
            max_bin: 255,
            drop_rate: 0.1,
            skip_drop: 0.5,
            max_drop: 50,
            random_state: 42,
        }
    }
}

impl BoostedTreeConfig {
    /// Every setting rendered as text; an unbounded depth is written as `-1`
    pub fn to_params(&self) -> BTreeMap<String, String> {
        let max_depth = self.max_depth.map_or_else(|| "-1".to_string(), |d| d.to_string());
        [
            ("boosting_type", self.boosting_type.to_string()),
            ("n_estimators", self.n_estimators.to_string()),
            ("learning_rate", self.learning_rate.to_string()),
            ("num_leaves", self.num_leaves.to_string()),
            ("max_depth", max_depth),
            ("min_child_samples", self.min_child_samples.to_string()),
            ("min_sum_hessian_in_leaf", self.min_sum_hessian_in_leaf.to_string()),
            ("reg_lambda", self.reg_lambda.to_string()),
            ("max_bin", self.max_bin.to_string()),
            ("drop_rate", self.drop_rate.to_string()),
            ("skip_drop", self.skip_drop.to_string()),
            ("max_drop", self.max_drop.to_string()),
            ("random_state", self.random_state.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::training("n_estimators must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PipelineError::training(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.num_leaves < 2 {
            return Err(PipelineError::training("num_leaves must be at least 2"));
        }
        if self.max_bin < 2 {
            return Err(PipelineError::training("max_bin must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LGBNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<LGBNode>,
        right: Box<LGBNode>,
    },
}

impl LGBNode {
    fn predict(&self, sample: &ArrayView1<f64>) -> f64 {
        match self {
            LGBNode::Leaf { value } => *value,
            LGBNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            LGBNode::Leaf { .. } => 1,
            LGBNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

// ---- Feature binning ----

/// Per-feature bin upper edges; value `v` falls in the first bin whose edge is
/// `>= v`, and the last bin is open-ended
struct BinMapper {
    edges: Vec<Vec<f64>>,
}

impl BinMapper {
    fn fit(x: &Array2<f64>, max_bin: usize) -> Self {
        let edges = (0..x.ncols())
            .into_par_iter()
            .map(|f| {
                let mut values: Vec<f64> = x.column(f).to_vec();
                values.sort_by(f64::total_cmp);
                values.dedup();
                if values.len() <= max_bin {
                    values.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect()
                } else {
                    let mut cuts: Vec<f64> = (1..max_bin)
                        .map(|b| values[b * values.len() / max_bin])
                        .collect();
                    cuts.dedup();
                    cuts
                }
            })
            .collect();
        Self { edges }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    fn bin(&self, feature: usize, value: f64) -> u16 {
        self.edges[feature].partition_point(|&e| e < value) as u16
    }

    /// Column-major binned copy of `x`
    fn transform(&self, x: &Array2<f64>) -> Vec<Vec<u16>> {
        (0..x.ncols())
            .into_par_iter()
            .map(|f| x.column(f).iter().map(|&v| self.bin(f, v)).collect())
            .collect()
    }

    fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.edges[feature][bin]
    }
}

// ---- Tree building ----

fn leaf_value(g: f64, h: f64, lambda: f64) -> f64 {
    -g / (h + lambda)
}

fn leaf_score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

#[derive(Debug, Clone, Copy, Default)]
struct HistBin {
    g: f64,
    h: f64,
    count: usize,
}

struct SplitCandidate {
    feature: usize,
    /// Samples with bin `<= bin` go left
    bin: usize,
    gain: f64,
}

struct GrowContext<'a> {
    binned: &'a [Vec<u16>],
    mapper: &'a BinMapper,
    gradients: &'a [f64],
    hessians: &'a [f64],
    config: &'a BoostedTreeConfig,
}

impl GrowContext<'_> {
    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let cfg = self.config;
        if indices.len() < cfg.min_child_samples * 2 {
            return None;
        }
        let total_g: f64 = indices.iter().map(|&i| self.gradients[i]).sum();
        let total_h: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        let parent = leaf_score(total_g, total_h, cfg.reg_lambda);

        let per_feature: Vec<SplitCandidate> = (0..self.binned.len())
            .into_par_iter()
            .filter_map(|feature| {
                let column = &self.binned[feature];
                let mut hist = vec![HistBin::default(); self.mapper.n_bins(feature)];
                for &i in indices {
                    let b = &mut hist[column[i] as usize];
                    b.g += self.gradients[i];
                    b.h += self.hessians[i];
                    b.count += 1;
                }

                let mut best: Option<SplitCandidate> = None;
                let (mut left_g, mut left_h, mut left_n) = (0.0, 0.0, 0usize);
                for (bin, entry) in hist.iter().enumerate().take(hist.len() - 1) {
                    left_g += entry.g;
                    left_h += entry.h;
                    left_n += entry.count;
                    let right_n = indices.len() - left_n;
                    if left_n < cfg.min_child_samples || right_n < cfg.min_child_samples {
                        continue;
                    }
                    let right_h = total_h - left_h;
                    if left_h < cfg.min_sum_hessian_in_leaf || right_h < cfg.min_sum_hessian_in_leaf {
                        continue;
                    }
                    let gain = leaf_score(left_g, left_h, cfg.reg_lambda)
                        + leaf_score(total_g - left_g, right_h, cfg.reg_lambda)
                        - parent;
                    if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate { feature, bin, gain });
                    }
                }
                best
            })
            .collect();

        // Highest gain wins; on ties the lower feature index
        per_feature.into_iter().fold(None, |acc: Option<SplitCandidate>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
    }

    fn leaf(&self, indices: &[usize]) -> LGBNode {
        let g: f64 = indices.iter().map(|&i| self.gradients[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        LGBNode::Leaf {
            value: leaf_value(g, h, self.config.reg_lambda),
        }
    }

    /// Build one tree using the leaf-wise (best-first) strategy
    fn grow(&self, indices: Vec<usize>) -> LGBNode {
        struct PendingSplit {
            gain: f64,
            node_id: usize,
            split: SplitCandidate,
        }
        impl PartialEq for PendingSplit {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }
        impl Eq for PendingSplit {}
        impl PartialOrd for PendingSplit {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for PendingSplit {
            fn cmp(&self, other: &Self) -> Ordering {
                // Max-heap on gain; earlier nodes first on ties
                self.gain
                    .partial_cmp(&other.gain)
                    .unwrap_or(Ordering::Equal)
                    .then(other.node_id.cmp(&self.node_id))
            }
        }

        enum NodeSlot {
            Leaf(Vec<usize>),
            Split {
                feature: usize,
                threshold: f64,
                left: usize,
                right: usize,
            },
        }

        let max_depth = self.config.max_depth.unwrap_or(usize::MAX);
        let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();
        if max_depth > 0 {
            if let Some(split) = self.find_best_split(&indices) {
                heap.push(PendingSplit { gain: split.gain, node_id: 0, split });
            }
        }
        let mut nodes: Vec<NodeSlot> = vec![NodeSlot::Leaf(indices)];
        let mut depths: Vec<usize> = vec![0];
        let mut n_leaves = 1usize;

        while n_leaves < self.config.num_leaves {
            let Some(pending) = heap.pop() else { break };
            let node_id = pending.node_id;
            let split = pending.split;

            let members = match std::mem::replace(&mut nodes[node_id], NodeSlot::Leaf(Vec::new())) {
                NodeSlot::Leaf(members) => members,
                slot @ NodeSlot::Split { .. } => {
                    nodes[node_id] = slot;
                    continue;
                }
            };
            let column = &self.binned[split.feature];
            let (left, right): (Vec<usize>, Vec<usize>) = members
                .into_iter()
                .partition(|&i| column[i] as usize <= split.bin);

            let depth = depths[node_id] + 1;
            let left_id = nodes.len();
            let right_id = left_id + 1;
            nodes[node_id] = NodeSlot::Split {
                feature: split.feature,
                threshold: self.mapper.threshold(split.feature, split.bin),
                left: left_id,
                right: right_id,
            };
            n_leaves += 1;

            for (child_id, child) in [(left_id, &left), (right_id, &right)] {
                if depth < max_depth {
                    if let Some(s) = self.find_best_split(child) {
                        heap.push(PendingSplit { gain: s.gain, node_id: child_id, split: s });
                    }
                }
            }
            nodes.push(NodeSlot::Leaf(left));
            nodes.push(NodeSlot::Leaf(right));
            depths.push(depth);
            depths.push(depth);
        }

        fn to_node(ctx: &GrowContext<'_>, nodes: &[NodeSlot], idx: usize) -> LGBNode {
            match &nodes[idx] {
                NodeSlot::Leaf(indices) => ctx.leaf(indices),
                NodeSlot::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => LGBNode::Split {
                    feature: *feature,
                    threshold: *threshold,
                    left: Box::new(to_node(ctx, nodes, *left)),
                    right: Box::new(to_node(ctx, nodes, *right)),
                },
            }
        }
        to_node(self, &nodes, 0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ============ Boosted Tree Classifier ============

/// Binary gradient-boosted tree classifier over arbitrary two-valued labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreeClassifier {
    pub config: BoostedTreeConfig,
    trees: Vec<LGBNode>,
    tree_weights: Vec<f64>,
    base_prediction: f64,
    /// Original labels for encoded 0 and 1
    classes: Option<[i64; 2]>,
    n_features: usize,
}

impl BoostedTreeClassifier {
    pub fn new(config: BoostedTreeConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            tree_weights: Vec::new(),
            base_prediction: 0.0,
            classes: None,
            n_features: 0,
        }
    }

    pub fn classes(&self) -> Option<[i64; 2]> {
        self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn total_leaves(&self) -> usize {
        self.trees.iter().map(LGBNode::n_leaves).sum()
    }

    fn encode_labels(y: &Array1<i64>) -> Result<([i64; 2], Vec<f64>)> {
        let mut classes: Vec<i64> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() != 2 {
            return Err(PipelineError::training(format!(
                "binary classifier needs exactly 2 classes, found {}",
                classes.len()
            )));
        }
        let pair = [classes[0], classes[1]];
        let encoded = y.iter().map(|&v| if v == pair[1] { 1.0 } else { 0.0 }).collect();
        Ok((pair, encoded))
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::training("empty dataset"));
        }
        if n != y.len() {
            return Err(PipelineError::training(format!(
                "x has {n} rows but y has {} values",
                y.len()
            )));
        }

        let (classes, target) = Self::encode_labels(y)?;
        let mapper = BinMapper::fit(x, self.config.max_bin);
        let binned = mapper.transform(x);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let pos = target.iter().sum::<f64>();
        self.base_prediction = (pos / (n as f64 - pos)).ln();
        self.trees.clear();
        self.tree_weights.clear();

        let mut raw = vec![self.base_prediction; n];
        // Per-tree training-set outputs, kept only for dart
        let mut tree_outputs: Vec<Vec<f64>> = Vec::new();
        let all: Vec<usize> = (0..n).collect();

        for _ in 0..self.config.n_estimators {
            let dropped = match self.config.boosting_type {
                BoostingType::Gbdt => Vec::new(),
                BoostingType::Dart => self.select_dropped(&mut rng),
            };

            // Scores with the dropped trees removed
            let mut working = raw.clone();
            for &d in &dropped {
                for (w, out) in working.iter_mut().zip(&tree_outputs[d]) {
                    *w -= self.tree_weights[d] * out;
                }
            }

            let probs: Vec<f64> = working.iter().map(|&r| sigmoid(r)).collect();
            let gradients: Vec<f64> = probs.iter().zip(&target).map(|(&p, &t)| p - t).collect();
            let hessians: Vec<f64> = probs.iter().map(|&p| (p * (1.0 - p)).max(1e-16)).collect();

            let ctx = GrowContext {
                binned: &binned,
                mapper: &mapper,
                gradients: &gradients,
                hessians: &hessians,
                config: &self.config,
            };
            let tree = ctx.grow(all.clone());
            let outputs: Vec<f64> = x.rows().into_iter().map(|row| tree.predict(&row)).collect();

            let k = dropped.len() as f64;
            let weight = self.config.learning_rate / (1.0 + k);
            if !dropped.is_empty() {
                // Dropped trees shrink by k / (k + 1); the new tree joins at lr / (k + 1)
                let scale = k / (k + 1.0);
                for &d in &dropped {
                    let old = self.tree_weights[d];
                    self.tree_weights[d] = old * scale;
                    for (w, out) in working.iter_mut().zip(&tree_outputs[d]) {
                        *w += old * scale * out;
                    }
                }
                raw = working;
            }
            for (r, out) in raw.iter_mut().zip(&outputs) {
                *r += weight * out;
            }

            if self.config.boosting_type == BoostingType::Dart {
                tree_outputs.push(outputs);
            }
            self.trees.push(tree);
            self.tree_weights.push(weight);
        }

        self.classes = Some(classes);
        self.n_features = x.ncols();
        Ok(())
    }

    fn select_dropped(&self, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.trees.is_empty() || rng.gen::<f64>() < self.config.skip_drop {
            return Vec::new();
        }
        let mut dropped: Vec<usize> = (0..self.trees.len())
            .filter(|_| rng.gen::<f64>() < self.config.drop_rate)
            .collect();
        if dropped.len() > self.config.max_drop {
            dropped.shuffle(rng);
            dropped.truncate(self.config.max_drop);
            dropped.sort_unstable();
        }
        dropped
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<[i64; 2]> {
        let classes = self
            .classes
            .ok_or_else(|| PipelineError::training("classifier used before fit"))?;
        if x.ncols() != self.n_features {
            return Err(PipelineError::training(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(classes)
    }

    fn predict_raw(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.base_prediction
                    + self
                        .trees
                        .iter()
                        .zip(&self.tree_weights)
                        .map(|(t, w)| w * t.predict(&row))
                        .sum::<f64>()
            })
            .collect()
    }

    /// Predicted labels in the original label space
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let classes = self.check_input(x)?;
        Ok(self
            .predict_raw(x)
            .mapv(|r| if sigmoid(r) > 0.5 { classes[1] } else { classes[0] }))
    }

    /// Column 0 is the probability of the smaller label, column 1 of the larger
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let raw = self.predict_raw(x);
        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, &r) in raw.iter().enumerate() {
            let p = sigmoid(r);
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }
}

impl Model for BoostedTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        BoostedTreeClassifier::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        BoostedTreeClassifier::predict(self, x)
    }
}
