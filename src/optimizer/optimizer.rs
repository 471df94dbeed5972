//! HyperOpt - sequential hyperparameter search

use super::{
    config::{OptimizationConfig, OptimizeDirection},
    samplers::{create_sampler, Sampler},
    search_space::{SearchSpace, TrialParams},
};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// A configuration handed to the objective
#[derive(Debug, Clone)]
pub struct Trial {
    /// Zero-based trial number
    pub number: usize,
    /// Sampled parameters
    pub params: TrialParams,
}

/// What an objective reports back for one trial
#[derive(Debug, Clone, Default)]
pub struct TrialOutput {
    /// Objective value
    pub value: f64,
    /// Additional metrics
    pub metrics: BTreeMap<String, f64>,
    /// Free-form annotations
    pub user_attrs: BTreeMap<String, String>,
}

impl TrialOutput {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = (String, f64)>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn with_user_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_attrs.insert(key.into(), value.into());
        self
    }
}

impl From<f64> for TrialOutput {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Trial number
    pub trial_id: usize,
    /// Parameters used
    pub params: TrialParams,
    /// Objective value
    pub value: f64,
    /// Trial duration in seconds
    pub duration_secs: f64,
    /// Additional metrics
    pub metrics: BTreeMap<String, f64>,
    /// Free-form annotations
    pub user_attrs: BTreeMap<String, String>,
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    /// All trial results
    pub trials: Vec<TrialResult>,
    /// Best trial index
    pub best_trial_idx: Option<usize>,
    /// Total duration
    pub total_duration_secs: f64,
    /// Optimization direction
    pub direction: OptimizeDirection,
}

impl Study {
    /// Create a new study
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx))
    }

    /// Get the best value
    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().map(|t| t.value)
    }

    /// Get the best parameters
    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    /// Add a trial result; the earliest trial wins ties
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();

        let is_better = !result.value.is_nan()
            && match self.best_value() {
                None => true,
                Some(best_val) => match self.direction {
                    OptimizeDirection::Minimize => result.value < best_val,
                    OptimizeDirection::Maximize => result.value > best_val,
                },
            };

        if is_better {
            self.best_trial_idx = Some(idx);
        }

        self.trials.push(result);
    }
}

/// Main hyperparameter optimizer
pub struct HyperOpt {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
}

impl HyperOpt {
    /// Create a new optimizer
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let sampler = create_sampler(
            config.sampler.clone(),
            config.random_state,
            config.n_startup_trials,
            config.direction,
        );
        let study = Study::new(config.direction);

        Self {
            config,
            search_space,
            sampler,
            study,
        }
    }

    /// Run `n_trials` sequential trials.
    ///
    /// An objective error aborts the search and is returned to the caller.
    pub fn optimize<F, O>(&mut self, mut objective: F) -> Result<&Study>
    where
        F: FnMut(Trial) -> Result<O>,
        O: Into<TrialOutput>,
    {
        if self.search_space.is_empty() {
            return Err(PipelineError::OptimizationError(
                "Search space has no parameters".to_string()
            ));
        }

        let start = Instant::now();
        let mut history: Vec<(TrialParams, f64)> = Vec::new();

        for trial_id in 0..self.config.n_trials {
            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &history);

            let output: TrialOutput = objective(Trial {
                number: trial_id,
                params: params.clone(),
            })?
            .into();

            history.push((params.clone(), output.value));

            let result = TrialResult {
                trial_id,
                params,
                value: output.value,
                duration_secs: trial_start.elapsed().as_secs_f64(),
                metrics: output.metrics,
                user_attrs: output.user_attrs,
            };

            self.study.add_trial(result);

            info!(
                trial = trial_id,
                value = output.value,
                best = self.study.best_value().unwrap_or(output.value),
                "Trial finished"
            );
        }

        self.study.total_duration_secs = start.elapsed().as_secs_f64();

        Ok(&self.study)
    }

    /// Get the study results
    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Take ownership of the study
    pub fn into_study(self) -> Study {
        self.study
    }
}
