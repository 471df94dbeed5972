//! Pipeline configuration

use crate::error::{PipelineError, Result};
use crate::registry::Stage;
use crate::training::ModelFamily;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Overrides the MLflow server address
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
/// Switches tracking and registry to a local directory
pub const TRACKING_DIR_ENV: &str = "WATER_SCAN_TRACKING_DIR";

/// Where runs and registered models are stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackingBackend {
    Mlflow { uri: String },
    Local { dir: PathBuf },
}

/// Settings for one end-to-end run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input CSV
    pub data_path: PathBuf,
    /// Binary target column
    pub target: String,
    /// Fraction of rows held out for testing
    pub test_fraction: f64,
    /// Seed for splitting, balancing and sampling
    pub seed: u64,
    pub n_trials: usize,
    /// SMOTE neighbour count
    pub k_neighbors: usize,
    pub model_family: String,
    /// Registered model name
    pub model_name: String,
    pub model_description: String,
    pub stage: Stage,
    /// Base name; a timestamp is appended per run
    pub experiment_name: String,
    pub tracking_uri: String,
    /// When set, the file store under this directory replaces the server
    pub tracking_dir: Option<PathBuf>,
    /// Where artifacts are rendered before upload
    pub scratch_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/water_potability.csv"),
            target: "Potability".to_string(),
            test_fraction: 0.2,
            seed: 42,
            n_trials: 50,
            k_neighbors: 5,
            model_family: "random_forest".to_string(),
            model_name: "water_potability_rf".to_string(),
            model_description: "Water potability classification model using Random Forest"
                .to_string(),
            stage: Stage::Production,
            experiment_name: "water_potability_classification_test".to_string(),
            tracking_uri: "http://localhost:5001/".to_string(),
            tracking_dir: None,
            scratch_dir: std::env::temp_dir().join("water-scan"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with overrides from the process environment
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MLFLOW_TRACKING_URI` and `WATER_SCAN_TRACKING_DIR` through `lookup`
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(uri) = lookup(TRACKING_URI_ENV).filter(|v| !v.trim().is_empty()) {
            self.tracking_uri = uri;
        }
        if let Some(dir) = lookup(TRACKING_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.tracking_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    pub fn with_model_family(mut self, family: impl Into<String>) -> Self {
        self.model_family = family.into();
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    pub fn with_tracking_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tracking_dir = Some(dir.into());
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Chosen tracking backend; a tracking directory wins over the URI
    pub fn backend(&self) -> TrackingBackend {
        match &self.tracking_dir {
            Some(dir) => TrackingBackend::Local { dir: dir.clone() },
            None => TrackingBackend::Mlflow {
                uri: self.tracking_uri.clone(),
            },
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<ModelFamily> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.n_trials == 0 {
            return Err(PipelineError::ConfigError("n_trials must be at least 1".to_string()));
        }
        if self.target.is_empty() || self.model_name.is_empty() {
            return Err(PipelineError::ConfigError(
                "target and model_name must not be empty".to_string(),
            ));
        }
        self.model_family.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.target, "Potability");
        assert_eq!(config.n_trials, 50);
        assert_eq!(config.stage, Stage::Production);
        assert_eq!(
            config.backend(),
            TrackingBackend::Mlflow {
                uri: "http://localhost:5001/".to_string()
            }
        );
        assert_eq!(config.validate().unwrap(), ModelFamily::RandomForest);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (TRACKING_URI_ENV, "http://mlflow:5000"),
            (TRACKING_DIR_ENV, "/tmp/runs"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tracking_uri, "http://mlflow:5000");
        assert_eq!(
            config.backend(),
            TrackingBackend::Local {
                dir: PathBuf::from("/tmp/runs")
            }
        );
    }

    #[test]
    fn test_blank_env_ignored() {
        let config = PipelineConfig::default().with_env_overrides(|_| Some("  ".to_string()));
        assert!(config.tracking_dir.is_none());
        assert_eq!(config.tracking_uri, "http://localhost:5001/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PipelineConfig::new().with_test_fraction(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_n_trials(0).validate().is_err());
        assert!(matches!(
            PipelineConfig::new().with_model_family("naive_bayes").validate(),
            Err(PipelineError::UnsupportedModel(_))
        ));
    }
}
