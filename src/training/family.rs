//! Supported model families and their search spaces

use super::random_forest::RandomForest;
use crate::error::{PipelineError, Result};
use crate::optimizer::{ParameterValue, SearchSpace, TrialParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seed fixed for every model the pipeline trains
pub const RANDOM_STATE: u64 = 42;

/// Closed set of classifier families the trainer can search over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
}

impl ModelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
        }
    }

    /// Prefix of per-trial run names
    pub fn run_prefix(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "RF",
        }
    }

    /// Hyperparameters searched for this family
    pub fn search_space(&self) -> SearchSpace {
        match self {
            ModelFamily::RandomForest => SearchSpace::new()
                .int("n_estimators", 50, 200)
                .categorical(
                    "max_depth",
                    vec![ParameterValue::Int(10), ParameterValue::Int(20), ParameterValue::None],
                )
                .int("min_samples_split", 2, 10),
        }
    }

    /// Unfitted model configured from sampled parameters
    pub fn build(&self, params: &TrialParams) -> Result<RandomForest> {
        match self {
            ModelFamily::RandomForest => {
                let n_estimators = positive_int(params, "n_estimators")?;
                let min_samples_split = positive_int(params, "min_samples_split")?;
                let max_depth = match params.get("max_depth") {
                    None | Some(ParameterValue::None) => None,
                    Some(_) => Some(positive_int(params, "max_depth")?),
                };

                Ok(RandomForest::new(n_estimators)
                    .with_max_depth(max_depth)
                    .with_min_samples_split(min_samples_split)
                    .with_random_state(RANDOM_STATE))
            }
        }
    }

    /// Parameters as logged to the tracker, fixed seed included
    pub fn logged_params(&self, params: &TrialParams) -> Vec<(String, String)> {
        params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .chain(std::iter::once((
                "random_state".to_string(),
                RANDOM_STATE.to_string(),
            )))
            .collect()
    }
}

fn positive_int(params: &TrialParams, name: &str) -> Result<usize> {
    let value = params
        .get(name)
        .ok_or_else(|| PipelineError::OptimizationError(format!("Missing parameter '{}'", name)))?;
    match value.as_int() {
        Some(v) if v > 0 => Ok(v as usize),
        _ => Err(PipelineError::OptimizationError(format!(
            "Parameter '{}' must be a positive integer, got {}",
            name, value
        ))),
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random_forest" => Ok(ModelFamily::RandomForest),
            _ => Err(PipelineError::UnsupportedModel(s.to_string())),
        }
    }
}
