//! Randomized hyperparameter search with stratified cross-validation

use super::search_space::{SearchSpace, TrialParams};
use crate::error::{PipelineError, Result};
use crate::training::cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
use crate::training::models::{EvaluationMetrics, Model};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of evaluating one sampled configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    /// Mean fold score; `None` when the candidate failed
    pub value: Option<f64>,
    pub cv: Option<CVResults>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

/// Every trial of a search plus the index of the best one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
}

impl Study {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trial; the best is replaced only by a strictly greater value,
    /// so the earliest candidate wins ties
    pub fn add_trial(&mut self, trial: TrialResult) {
        let idx = self.trials.len();
        if let Some(value) = trial.value {
            let better = match self.best_value() {
                Some(best) => value > best,
                None => true,
            };
            if better {
                self.best_trial_idx = Some(idx);
            }
        }
        self.trials.push(trial);
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|i| &self.trials[i])
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn n_failed(&self) -> usize {
        self.trials.iter().filter(|t| t.value.is_none()).count()
    }
}

/// Samples `n_iter` configurations and scores each by k-fold cross-validation
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    space: SearchSpace,
    n_iter: usize,
    cv: usize,
    scoring: String,
    random_state: u64,
    n_jobs: Option<usize>,
}

impl RandomizedSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            n_iter: 10,
            cv: 5,
            scoring: "accuracy".to_string(),
            random_state: 42,
            n_jobs: None,
        }
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_cv(mut self, cv: usize) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.scoring = scoring.into();
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Draw the candidate configurations; identical for a given seed
    pub fn candidates(&self) -> Vec<TrialParams> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        (0..self.n_iter).map(|_| self.space.sample(&mut rng)).collect()
    }

    /// Run the search; `build` turns a sampled configuration into an unfitted model
    pub fn run<M, F>(&self, x: &Array2<f64>, y: &Array1<i64>, build: F) -> Result<Study>
    where
        M: Model,
        F: Fn(&TrialParams) -> Result<M> + Sync,
    {
        if self.n_iter == 0 {
            return Err(PipelineError::training("n_iter must be at least 1"));
        }
        if x.nrows() != y.len() {
            return Err(PipelineError::training(format!(
                "x has {} rows but y has {} values",
                x.nrows(),
                y.len()
            )));
        }
        // Unknown scoring names fail before any model is fitted
        EvaluationMetrics { accuracy: 0.0, precision: 0.0, recall: 0.0, f1_score: 0.0 }
            .score(&self.scoring)?;

        let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.cv,
            shuffle: true,
        })
        .with_random_state(self.random_state)
        .split(x.nrows(), Some(y))?;

        let candidates = self.candidates();
        info!(
            n_iter = self.n_iter,
            cv = self.cv,
            scoring = %self.scoring,
            fits = self.n_iter * self.cv,
            "Starting randomized search"
        );

        let start = Instant::now();
        let evaluate = || -> Vec<TrialResult> {
            candidates
                .par_iter()
                .enumerate()
                .map(|(trial_id, params)| self.evaluate(trial_id, params, x, y, &splits, &build))
                .collect()
        };
        let results = match self.n_jobs {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| PipelineError::training(format!("cannot build search thread pool: {e}")))?
                .install(evaluate),
            None => evaluate(),
        };

        let mut study = Study::new();
        for trial in results {
            match (&trial.value, &trial.error) {
                (Some(value), _) => info!(trial = trial.trial_id, score = value, "Candidate scored"),
                (None, Some(err)) => warn!(trial = trial.trial_id, error = %err, "Candidate failed"),
                (None, None) => {}
            }
            study.add_trial(trial);
        }
        study.total_duration_secs = start.elapsed().as_secs_f64();

        match study.best_trial() {
            Some(best) => {
                info!(
                    trial = best.trial_id,
                    score = best.value.unwrap_or_default(),
                    failed = study.n_failed(),
                    "Randomized search finished"
                );
                Ok(study)
            }
            None => Err(PipelineError::training(format!(
                "all {} candidates failed during cross-validation",
                study.trials.len()
            ))),
        }
    }

    fn evaluate<M, F>(
        &self,
        trial_id: usize,
        params: &TrialParams,
        x: &Array2<f64>,
        y: &Array1<i64>,
        splits: &[CVSplit],
        build: &F,
    ) -> TrialResult
    where
        M: Model,
        F: Fn(&TrialParams) -> Result<M> + Sync,
    {
        let start = Instant::now();
        let outcome = splits
            .iter()
            .map(|split| -> Result<f64> {
                let mut model = build(params)?;
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                model.fit(&x_train, &y_train)?;

                let x_val = x.select(Axis(0), &split.test_indices);
                let y_val = y.select(Axis(0), &split.test_indices);
                let pred = model.predict(&x_val)?;
                EvaluationMetrics::compute(&y_val, &pred)?.score(&self.scoring)
            })
            .collect::<Result<Vec<f64>>>()
            .map(CVResults::from_scores);

        let (value, cv, error) = match outcome {
            Ok(cv) => (Some(cv.mean_score), Some(cv), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        TrialResult {
            trial_id,
            params: params.clone(),
            value,
            cv,
            duration_secs: start.elapsed().as_secs_f64(),
            error,
        }
    }
}
