//! Search space definition for hyperparameters

use crate::config::ParamDistributions;
use crate::error::{PipelineError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Uniform float in `[low, high)`
    Float { low: f64, high: f64 },
    /// Uniform integer in `[low, high)`
    Int { low: i64, high: i64 },
    /// One of a fixed list of choices
    Categorical { choices: Vec<String> },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float { low, high },
        }
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, choices: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = match &self.param_type {
            ParameterType::Float { low, high } => low.is_finite() && high.is_finite() && low < high,
            ParameterType::Int { low, high } => low < high,
            ParameterType::Categorical { choices } => !choices.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(PipelineError::config(
                format!("param_distributions.{}", self.name),
                format!("empty distribution {:?}", self.param_type),
            ))
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high } => ParameterValue::Float(rng.gen_range(*low..*high)),
            ParameterType::Int { low, high } => ParameterValue::Int(rng.gen_range(*low..*high)),
            ParameterType::Categorical { choices } => {
                ParameterValue::String(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::String(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::String(v) => write!(f, "{v}"),
        }
    }
}

/// A sampled configuration, keyed by parameter name
pub type TrialParams = BTreeMap<String, ParameterValue>;

/// Look up a required parameter of a sampled configuration
pub fn require<'a>(params: &'a TrialParams, name: &str) -> Result<&'a ParameterValue> {
    params
        .get(name)
        .ok_or_else(|| PipelineError::training(format!("sampled parameters lack '{name}'")))
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    pub fn categorical<S: Into<String>>(self, name: impl Into<String>, choices: impl IntoIterator<Item = S>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    /// The boosted-tree space described by the `model_training` section
    pub fn from_distributions(dist: &ParamDistributions) -> Result<Self> {
        let space = Self::new()
            .int("n_estimators", dist.n_estimators.low, dist.n_estimators.high)
            .int("max_depth", dist.max_depth.low, dist.max_depth.high)
            .float("learning_rate", dist.learning_rate.low, dist.learning_rate.high)
            .int("num_leaves", dist.num_leaves.low, dist.num_leaves.high)
            .categorical("boosting_type", dist.boosting_type.iter().cloned());
        space.validate()?;
        Ok(space)
    }

    pub fn validate(&self) -> Result<()> {
        self.parameters.iter().try_for_each(Parameter::validate)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample one configuration; parameters are drawn in declaration order
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_search_space_builder() {
        let space = SearchSpace::new()
            .float("learning_rate", 0.001, 0.1)
            .int("n_estimators", 10, 1000)
            .categorical("boosting_type", ["gbdt", "dart"]);
        assert_eq!(space.len(), 3);
        assert_eq!(space.param_names(), vec!["learning_rate", "n_estimators", "boosting_type"]);
    }

    #[test]
    fn test_int_sampling_is_half_open() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::int("n", 5, 7);
        for _ in 0..200 {
            let v = param.sample(&mut rng).as_int().unwrap();
            assert!(v == 5 || v == 6, "{v} outside [5, 7)");
        }
    }

    #[test]
    fn test_default_distributions_sample_in_range() {
        let space = SearchSpace::from_distributions(&ParamDistributions::default()).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..50 {
            let params = space.sample(&mut rng);
            let lr = params["learning_rate"].as_float().unwrap();
            assert!((0.01..0.11).contains(&lr));
            let leaves = params["num_leaves"].as_int().unwrap();
            assert!((16..64).contains(&leaves));
            let boosting = params["boosting_type"].as_string().unwrap();
            assert!(boosting == "gbdt" || boosting == "dart");
        }
    }

    #[test]
    fn test_empty_range_rejected() {
        let space = SearchSpace::new().int("max_depth", 5, 5);
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ParameterValue::Int(3).to_string(), "3");
        assert_eq!(ParameterValue::String("dart".into()).to_string(), "dart");
        assert_eq!(ParameterValue::Float(0.05).to_string(), "0.05");
    }
}
