//! Hyperparameter optimization module
//!
//! Sequential search over a [`SearchSpace`] with either random sampling or a
//! simplified Tree-structured Parzen Estimator. Each trial is scored by a
//! caller-supplied objective and recorded in a [`Study`].

mod config;
mod optimizer;
mod samplers;
mod search_space;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use optimizer::{HyperOpt, Study, Trial, TrialOutput, TrialResult};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
