//! Settings for one hyperparameter search

use super::SamplerType;
use serde::{Deserialize, Serialize};

/// Whether the objective is a score or a loss
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

/// How a [`super::HyperOpt`] search samples and ranks trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Trials evaluated before the study is returned
    pub n_trials: usize,

    pub direction: OptimizeDirection,

    /// Random search or TPE
    pub sampler: SamplerType,

    /// TPE samples uniformly until this many trials have completed
    pub n_startup_trials: usize,

    /// Sampler seed; `None` draws from entropy
    pub random_state: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 50,
            direction: OptimizeDirection::Maximize,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
        }
    }
}

impl OptimizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}
