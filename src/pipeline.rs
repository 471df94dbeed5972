//! End-to-end run: load, split, balance, search, finalize, register

use crate::config::{PipelineConfig, TrackingBackend};
use crate::error::{PipelineError, Result};
use crate::optimizer::{OptimizationConfig, TrialParams};
use crate::preprocessing::{DataPipeline, DataPreprocessor, MissingReport};
use crate::registry::{ModelRegistry, ModelVersionInfo};
use crate::tracking::{ExperimentLogger, FileStore, MlflowClient, TrackingStore, MODEL_ARTIFACT_PATH};
use crate::training::{MetricBundle, TrainerFactory};
use std::sync::Arc;
use tracing::info;

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub experiment_name: String,
    pub missing_before: MissingReport,
    pub missing_after: MissingReport,
    pub n_train_before_balance: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub n_trials: usize,
    /// Trials whose tracking failed
    pub failed_trial_logs: usize,
    pub best_params: TrialParams,
    pub best_search_accuracy: f64,
    pub final_accuracy: f64,
    pub final_metrics: MetricBundle,
    pub classification_report: String,
    /// Feature importances, most important first
    pub importances: Vec<(String, f64)>,
    pub model_uri: String,
    pub registered: ModelVersionInfo,
}

/// Open the configured backend as a tracking store and a registry client
pub fn connect(config: &PipelineConfig) -> Result<(Arc<dyn TrackingStore>, ModelRegistry)> {
    match config.backend() {
        TrackingBackend::Local { dir } => {
            info!(dir = %dir.display(), "Using local tracking store");
            let store = Arc::new(FileStore::open(&dir)?);
            let tracking: Arc<dyn TrackingStore> = store.clone();
            Ok((tracking, ModelRegistry::new(store)))
        }
        TrackingBackend::Mlflow { uri } => {
            info!(uri = %uri, "Using MLflow tracking server");
            let client = Arc::new(MlflowClient::new(uri)?);
            let tracking: Arc<dyn TrackingStore> = client.clone();
            Ok((tracking, ModelRegistry::new(client)))
        }
    }
}

/// Run the whole pipeline once.
///
/// Tracking failures during the search are tolerated. The final model must
/// be logged, since the registry points at its run.
pub fn run_pipeline(
    config: &PipelineConfig,
    tracking: Arc<dyn TrackingStore>,
    registry: &ModelRegistry,
) -> Result<PipelineReport> {
    let family = config.validate()?;

    let logger = ExperimentLogger::open_experiment(tracking, &config.experiment_name, &config.scratch_dir)?;

    let mut data_pipeline = DataPipeline::new(&config.data_path);
    let dataset = data_pipeline.load_and_clean()?;
    let missing_before = data_pipeline.missing_before().cloned().unwrap_or_default();
    let missing_after = data_pipeline.missing_after().cloned().unwrap_or_default();

    let preprocessor = DataPreprocessor::new(&dataset, config.target.as_str())
        .with_k_neighbors(config.k_neighbors);
    let split = preprocessor.split(config.test_fraction, config.seed)?;
    let n_train_before_balance = split.x_train.nrows();
    let balanced = preprocessor.balance(&split.x_train, &split.y_train, config.seed)?;
    let split = split.with_training(balanced.x, balanced.y)?;
    let (n_train, n_test) = (split.x_train.nrows(), split.x_test.nrows());

    let mut trainer = TrainerFactory::create(family, split)
        .with_optimization(OptimizationConfig::new().with_random_state(Some(config.seed)));

    let best_search_accuracy = trainer
        .run_search(config.n_trials, &logger)?
        .best_value()
        .unwrap_or(f64::NAN);
    let failed_trial_logs = trainer.log_outcomes().iter().filter(|o| !o.is_logged()).count();

    let final_model = trainer.finalize(&logger)?;
    let run_id = final_model
        .log_outcome
        .run_id()
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::TrackingError(
                "Final model run was not logged; nothing to register".to_string(),
            )
        })?;
    let model_uri = format!("runs:/{}/{}", run_id, MODEL_ARTIFACT_PATH);

    let registered = registry.publish(
        &model_uri,
        &config.model_name,
        &config.model_description,
        config.stage,
    )?;

    info!(
        model = %registered.name,
        version = registered.version,
        accuracy = final_model.accuracy,
        "Pipeline finished"
    );

    Ok(PipelineReport {
        experiment_name: logger.experiment_name().to_string(),
        missing_before,
        missing_after,
        n_train_before_balance,
        n_train,
        n_test,
        n_trials: config.n_trials,
        failed_trial_logs,
        best_params: final_model.params,
        best_search_accuracy,
        final_accuracy: final_model.accuracy,
        final_metrics: final_model.metrics,
        classification_report: final_model.report,
        importances: final_model.importances,
        model_uri,
        registered,
    })
}
