//! Search space definition for hyperparameters

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Integer parameter, both bounds inclusive
    Int {
        low: i64,
        high: i64,
    },
    /// Categorical parameter
    Categorical {
        choices: Vec<ParameterValue>,
    },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical { choices },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Int { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            ParameterType::Categorical { choices } => {
                choices.choose(rng).cloned().unwrap_or(ParameterValue::None)
            }
        }
    }

    /// Distance between two values of this parameter, scaled to [0, 1]
    pub fn distance(&self, a: &ParameterValue, b: &ParameterValue) -> f64 {
        match (&self.param_type, a.as_float(), b.as_float()) {
            (ParameterType::Int { low, high }, Some(va), Some(vb)) if high > low => {
                ((va - vb) / (high - low) as f64).abs()
            }
            _ => {
                if a == b { 0.0 } else { 1.0 }
            }
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Int(i64),
    /// Absent value, e.g. an unbounded tree depth
    None,
}

impl ParameterValue {
    /// Numeric view used for distances
    pub fn as_float(&self) -> Option<f64> {
        self.as_int().map(|v| v as f64)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::None => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParameterValue::None)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::None => f.write_str("None"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<Option<i64>> for ParameterValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(ParameterValue::None, ParameterValue::Int)
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the search space
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add an integer parameter
    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    /// Add a categorical parameter
    pub fn categorical(self, name: impl Into<String>, choices: Vec<ParameterValue>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Alias for sampled configuration
pub type TrialParams = BTreeMap<String, ParameterValue>;
