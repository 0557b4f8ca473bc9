//! Hyperparameter search
//!
//! Configurations are drawn uniformly from a [`SearchSpace`] and scored by
//! stratified k-fold cross-validation; the [`Study`] keeps every trial.

mod random_search;
mod search_space;

pub use random_search::{RandomizedSearch, Study, TrialResult};
pub use search_space::{require, Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
