//! water-scan - water potability classification pipeline
//!
//! Loads a CSV of water-quality measurements, imputes missing values,
//! rebalances the training split with SMOTE, searches random forest
//! hyperparameters, tracks every trial and registers the best model.
//!
//! # Modules
//!
//! - [`preprocessing`] - CSV loading, median imputation, stratified split
//! - [`synthetic`] - SMOTE oversampling
//! - [`training`] - Decision trees, random forest, metrics, the trainer
//! - [`optimizer`] - Random and TPE hyperparameter search
//! - [`tracking`] - Experiment tracking (MLflow REST or local directory)
//! - [`registry`] - Model versions and stage transitions
//! - [`pipeline`] - The end-to-end run
//! - [`cli`] - Command-line entry and summary output

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod preprocessing;
pub mod synthetic;

// Modelling
pub mod training;
pub mod optimizer;

// Tracking and registry
pub mod tracking;
pub mod registry;

// Orchestration
pub mod pipeline;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result};

    // Configuration
    pub use crate::config::{PipelineConfig, TrackingBackend};

    // Preprocessing
    pub use crate::preprocessing::{DataPipeline, DataPreprocessor, Dataset, TrainTestSplit};

    // Synthetic data
    pub use crate::synthetic::{Sampler, SMOTE};

    // Training
    pub use crate::training::{FinalModel, MetricBundle, ModelFamily, RandomForest, Trainer, TrainerFactory};

    // Optimization
    pub use crate::optimizer::{HyperOpt, OptimizationConfig, SearchSpace, Study};

    // Experiment tracking
    pub use crate::tracking::{ExperimentLogger, FileStore, LogOutcome, MlflowClient, TrackingStore};

    // Registry
    pub use crate::registry::{ModelRegistry, ModelVersionInfo, RegistryStore, Stage};

    // Pipeline
    pub use crate::pipeline::{connect, run_pipeline, PipelineReport};
}
