//! Model training
//!
//! Tree learners, cross-validation, metrics and the training stage that
//! ties them to the randomized search.

pub mod cross_validation;
pub mod decision_tree;
pub mod engine;
pub mod lightgbm;
pub mod models;
pub mod random_forest;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::DecisionTree;
pub use engine::{classifier_from_params, ModelArtifact, ModelTrainer, TrainingReport};
pub use lightgbm::{BoostedTreeClassifier, BoostedTreeConfig, BoostingType};
pub use models::{EvaluationMetrics, Model};
pub use random_forest::{MaxFeatures, RandomForest};
