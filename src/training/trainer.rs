//! Hyperparameter search and final retraining for one model family

use super::family::ModelFamily;
use super::metrics::{classification_report, ConfusionMatrix, MetricBundle, POSITIVE_CLASS};
use super::random_forest::RandomForest;
use crate::error::{PipelineError, Result};
use crate::optimizer::{HyperOpt, OptimizationConfig, Study, TrialOutput, TrialParams};
use crate::preprocessing::TrainTestSplit;
use crate::tracking::{LogOutcome, ModelSignature, TrialLogger, TrialRecord};
use ndarray::Array1;
use std::fmt;
use tracing::info;

/// Lifecycle of a [`Trainer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    Searching,
    SearchComplete,
    Finalized,
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrainerState::Idle => "idle",
            TrainerState::Searching => "searching",
            TrainerState::SearchComplete => "search complete",
            TrainerState::Finalized => "finalized",
        })
    }
}

/// A fitted candidate scored on the test partition
struct Evaluation {
    model: RandomForest,
    y_pred: Array1<i64>,
    metrics: MetricBundle,
}

fn fit_and_score(family: ModelFamily, data: &TrainTestSplit, params: &TrialParams) -> Result<Evaluation> {
    let mut model = family.build(params)?;
    model.fit(&data.x_train, &data.y_train)?;

    let y_pred = model.predict(&data.x_test)?;
    let scores = model.positive_proba(&data.x_test, POSITIVE_CLASS)?;
    let metrics = MetricBundle::compute(&data.y_test, &y_pred, scores.as_ref())?;

    Ok(Evaluation {
        model,
        y_pred,
        metrics,
    })
}

/// Best configuration retrained and evaluated
#[derive(Debug, Clone)]
pub struct FinalModel {
    pub model: RandomForest,
    pub params: TrialParams,
    /// Test-set accuracy, logged as `final_accuracy`
    pub accuracy: f64,
    pub metrics: MetricBundle,
    pub signature: ModelSignature,
    pub confusion_matrix: ConfusionMatrix,
    pub report: String,
    /// Feature importances, most important first
    pub importances: Vec<(String, f64)>,
    pub log_outcome: LogOutcome,
}

/// Runs the search and the final fit for one [`ModelFamily`]
pub struct Trainer {
    family: ModelFamily,
    data: TrainTestSplit,
    config: OptimizationConfig,
    state: TrainerState,
    study: Option<Study>,
    log_outcomes: Vec<LogOutcome>,
}

impl Trainer {
    pub fn new(family: ModelFamily, data: TrainTestSplit) -> Self {
        Self {
            family,
            data,
            config: OptimizationConfig::default(),
            state: TrainerState::Idle,
            study: None,
            log_outcomes: Vec::new(),
        }
    }

    /// Sampler settings; the trial count comes from [`Trainer::run_search`]
    pub fn with_optimization(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn data(&self) -> &TrainTestSplit {
        &self.data
    }

    pub fn study(&self) -> Option<&Study> {
        self.study.as_ref()
    }

    /// Logging outcome of every completed trial, in trial order
    pub fn log_outcomes(&self) -> &[LogOutcome] {
        &self.log_outcomes
    }

    fn expect_state(&self, expected: TrainerState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Evaluate `n_trials` sampled configurations by test-set accuracy.
    ///
    /// Each trial is logged through `logger`; a logging failure is recorded
    /// and the search goes on. A fit error aborts the search and returns the
    /// trainer to idle.
    pub fn run_search(&mut self, n_trials: usize, logger: &dyn TrialLogger) -> Result<&Study> {
        self.expect_state(TrainerState::Idle, "run a search")?;
        if n_trials == 0 {
            return Err(PipelineError::ValidationError(
                "Search needs at least one trial".to_string(),
            ));
        }

        self.state = TrainerState::Searching;
        info!(family = %self.family, n_trials, "Starting hyperparameter search");

        let config = self.config.clone().with_n_trials(n_trials);
        let mut optimizer = HyperOpt::new(config, self.family.search_space());
        let family = self.family;
        let data = &self.data;
        let mut outcomes = Vec::with_capacity(n_trials);

        let result = optimizer.optimize(|trial| {
            let eval = fit_and_score(family, data, &trial.params)?;

            let record = TrialRecord {
                run_name: format!("{}_Optuna_Trial_{}", family.run_prefix(), trial.number),
                tags: vec![("optuna_trial_number".to_string(), trial.number.to_string())],
                params: family.logged_params(&trial.params),
                metrics: eval.metrics.entries("accuracy"),
                model: &eval.model,
                feature_names: &data.feature_names,
                x_train: &data.x_train,
                y_test: &data.y_test,
                y_pred: &eval.y_pred,
                trial_number: Some(trial.number),
            };
            let outcome = logger.log_trial(&record);
            let logged = if outcome.is_logged() { "logged" } else { "failed" };
            outcomes.push(outcome);

            Ok(TrialOutput::new(eval.metrics.accuracy)
                .with_metrics(eval.metrics.entries("accuracy"))
                .with_user_attr("tracking", logged))
        });

        if let Err(e) = result {
            self.state = TrainerState::Idle;
            return Err(e);
        }

        self.log_outcomes = outcomes;
        let study = optimizer.into_study();
        info!(
            best_value = study.best_value().unwrap_or(f64::NAN),
            failed_logs = self.log_outcomes.iter().filter(|o| !o.is_logged()).count(),
            "Search complete"
        );

        self.state = TrainerState::SearchComplete;
        Ok(self.study.insert(study))
    }

    /// Retrain the best configuration and log it as the final model
    pub fn finalize(&mut self, logger: &dyn TrialLogger) -> Result<FinalModel> {
        self.expect_state(TrainerState::SearchComplete, "finalize")?;

        let params = self
            .study
            .as_ref()
            .and_then(|s| s.best_params())
            .cloned()
            .ok_or_else(|| {
                PipelineError::OptimizationError("Search produced no scored trial".to_string())
            })?;

        let eval = fit_and_score(self.family, &self.data, &params)?;
        let confusion_matrix = ConfusionMatrix::from_labels(&self.data.y_test, &eval.y_pred);
        let report = classification_report(&confusion_matrix);

        let mut importances: Vec<(String, f64)> = match eval.model.feature_importances() {
            Some(values) => self
                .data
                .feature_names
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect(),
            None => return Err(PipelineError::ModelNotFitted),
        };
        importances.sort_by(|a, b| b.1.total_cmp(&a.1));

        let log_outcome = logger.log_trial(&TrialRecord {
            run_name: "BestModel_Final".to_string(),
            tags: vec![("model_version".to_string(), "final".to_string())],
            params: self.family.logged_params(&params),
            metrics: eval.metrics.entries("final_accuracy"),
            model: &eval.model,
            feature_names: &self.data.feature_names,
            x_train: &self.data.x_train,
            y_test: &self.data.y_test,
            y_pred: &eval.y_pred,
            trial_number: None,
        });

        info!(accuracy = eval.metrics.accuracy, logged = log_outcome.is_logged(), "Final model trained");
        self.state = TrainerState::Finalized;

        Ok(FinalModel {
            signature: ModelSignature::for_classifier(&self.data.feature_names),
            accuracy: eval.metrics.accuracy,
            metrics: eval.metrics,
            model: eval.model,
            params,
            confusion_matrix,
            report,
            importances,
            log_outcome,
        })
    }
}

impl fmt::Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("family", &self.family)
            .field("state", &self.state)
            .field("n_train", &self.data.x_train.nrows())
            .field("n_test", &self.data.x_test.nrows())
            .finish_non_exhaustive()
    }
}

/// Builds trainers by family
pub struct TrainerFactory;

impl TrainerFactory {
    pub fn create(family: ModelFamily, data: TrainTestSplit) -> Trainer {
        Trainer::new(family, data)
    }

    /// Parse `model_type` and build its trainer
    pub fn create_trainer(model_type: &str, data: TrainTestSplit) -> Result<Trainer> {
        Ok(Self::create(model_type.parse()?, data))
    }
}
