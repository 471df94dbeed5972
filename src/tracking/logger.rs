//! Best-effort experiment logging for trials and the final model

use super::artifacts::{confusion_matrix_svg, feature_importance_svg, ScratchFiles};
use super::run::RunGuard;
use super::signature::{write_model_dir, InputExample, ModelSignature, MODEL_ARTIFACT_PATH};
use super::store::TrackingStore;
use crate::error::{PipelineError, Result};
use crate::training::metrics::{classification_report, ConfusionMatrix};
use crate::training::RandomForest;
use ndarray::{Array1, Array2};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of logging one run
#[derive(Debug, Clone, PartialEq)]
pub enum LogOutcome {
    Logged { run_id: String },
    Failed { reason: String },
}

impl LogOutcome {
    pub fn is_logged(&self) -> bool {
        matches!(self, LogOutcome::Logged { .. })
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            LogOutcome::Logged { run_id } => Some(run_id),
            LogOutcome::Failed { .. } => None,
        }
    }
}

/// Everything recorded for one trial or for the final model
#[derive(Debug, Clone)]
pub struct TrialRecord<'a> {
    pub run_name: String,
    pub tags: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub metrics: Vec<(String, f64)>,
    pub model: &'a RandomForest,
    pub feature_names: &'a [String],
    /// Source of the input example row
    pub x_train: &'a Array2<f64>,
    pub y_test: &'a Array1<i64>,
    pub y_pred: &'a Array1<i64>,
    /// Appended to artifact file names as `_trial_<n>` when set
    pub trial_number: Option<usize>,
}

impl TrialRecord<'_> {
    fn file_suffix(&self) -> String {
        self.trial_number
            .map(|n| format!("_trial_{}", n))
            .unwrap_or_default()
    }
}

/// Sink for trial records. Failures are reported, never raised.
pub trait TrialLogger {
    fn log_trial(&self, record: &TrialRecord<'_>) -> LogOutcome;
}

/// Logs runs into one timestamped experiment of a tracking store
pub struct ExperimentLogger {
    store: Arc<dyn TrackingStore>,
    experiment_id: String,
    experiment_name: String,
    scratch_dir: PathBuf,
}

impl ExperimentLogger {
    /// Create or reuse the experiment `"<name> (dd/mm/YYYY - HH:MM:SS)"`
    pub fn open_experiment(
        store: Arc<dyn TrackingStore>,
        name: &str,
        scratch_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let experiment_name = format!(
            "{} ({})",
            name,
            chrono::Local::now().format("%d/%m/%Y - %H:%M:%S")
        );
        let experiment_id = store.get_or_create_experiment(&experiment_name)?;
        info!(experiment = %experiment_name, experiment_id = %experiment_id, "Experiment ready");

        Ok(Self {
            store,
            experiment_id,
            experiment_name,
            scratch_dir: scratch_dir.into(),
        })
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Log one run. Any early return drops the guard, which ends the run as failed.
    fn try_log(&self, record: &TrialRecord<'_>) -> Result<String> {
        let guard = RunGuard::start(self.store.as_ref(), &self.experiment_id, &record.run_name)?;

        for (key, value) in &record.tags {
            self.store.set_tag(guard.run_id(), key, value)?;
        }
        self.store
            .log_batch(guard.run_id(), &record.params, &record.metrics)?;

        let mut scratch = ScratchFiles::new(self.scratch_dir.join(guard.run_id()))?;

        let signature = ModelSignature::for_classifier(record.feature_names);
        let example = InputExample::first_row(record.feature_names, record.x_train);
        for path in write_model_dir(&mut scratch, record.model, &signature, &example)? {
            self.store
                .log_artifact(guard.info(), &path, Some(MODEL_ARTIFACT_PATH))?;
        }

        let suffix = record.file_suffix();
        let cm = ConfusionMatrix::from_labels(record.y_test, record.y_pred);
        let importances = record
            .model
            .feature_importances()
            .ok_or(PipelineError::ModelNotFitted)?;

        let plots = [
            (format!("classification_report{}.txt", suffix), classification_report(&cm)),
            (format!("confusion_matrix{}.svg", suffix), confusion_matrix_svg(&cm)),
            (
                format!("feature_importance{}.svg", suffix),
                feature_importance_svg(record.feature_names, &importances.to_vec()),
            ),
        ];
        for (name, contents) in &plots {
            let path = scratch.write(name, contents)?;
            self.store.log_artifact(guard.info(), &path, None)?;
        }

        guard.finish()
    }
}

impl TrialLogger for ExperimentLogger {
    fn log_trial(&self, record: &TrialRecord<'_>) -> LogOutcome {
        match self.try_log(record) {
            Ok(run_id) => {
                debug!(run = %record.run_name, run_id = %run_id, "Run logged");
                LogOutcome::Logged { run_id }
            }
            Err(e) => {
                warn!(
                    trial = ?record.trial_number,
                    run = %record.run_name,
                    error = %e,
                    "Tracking failed; continuing without this run"
                );
                LogOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for ExperimentLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentLogger")
            .field("experiment_id", &self.experiment_id)
            .field("experiment_name", &self.experiment_name)
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{FileStore, RunInfo, RunStatus};
    use ndarray::array;
    use std::path::Path;

    /// Store whose artifact uploads always fail
    struct NoArtifacts(FileStore);

    impl TrackingStore for NoArtifacts {
        fn get_or_create_experiment(&self, name: &str) -> Result<String> {
            self.0.get_or_create_experiment(name)
        }
        fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
            self.0.create_run(experiment_id, run_name)
        }
        fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
            self.0.set_tag(run_id, key, value)
        }
        fn log_batch(
            &self,
            run_id: &str,
            params: &[(String, String)],
            metrics: &[(String, f64)],
        ) -> Result<()> {
            self.0.log_batch(run_id, params, metrics)
        }
        fn log_artifact(&self, _run: &RunInfo, _local: &Path, _dir: Option<&str>) -> Result<()> {
            Err(PipelineError::TrackingError("artifact store offline".to_string()))
        }
        fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
            self.0.end_run(run_id, status)
        }
    }

    fn fitted() -> (RandomForest, Array2<f64>, Array1<i64>) {
        let x = array![[0.0, 0.1], [0.2, 0.0], [1.0, 0.9], [0.8, 1.1], [0.1, 0.2], [0.9, 1.0]];
        let y = array![0, 0, 1, 1, 0, 1];
        let mut model = RandomForest::new(5).with_random_state(3);
        model.fit(&x, &y).unwrap();
        (model, x, y)
    }

    fn record<'a>(
        model: &'a RandomForest,
        names: &'a [String],
        x: &'a Array2<f64>,
        y: &'a Array1<i64>,
        y_pred: &'a Array1<i64>,
    ) -> TrialRecord<'a> {
        TrialRecord {
            run_name: "RF_Optuna_Trial_0".to_string(),
            tags: vec![("optuna_trial_number".to_string(), "0".to_string())],
            params: vec![("n_estimators".to_string(), "5".to_string())],
            metrics: vec![("accuracy".to_string(), 1.0), ("roc_auc".to_string(), f64::NAN)],
            model,
            feature_names: names,
            x_train: x,
            y_test: y,
            y_pred,
            trial_number: Some(0),
        }
    }

    #[test]
    fn test_experiment_name_is_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("store")).unwrap());
        let logger =
            ExperimentLogger::open_experiment(store.clone(), "water", dir.path().join("scratch"))
                .unwrap();

        let name = logger.experiment_name();
        assert!(name.starts_with("water ("));
        assert!(name.ends_with(')'));
        // "dd/mm/YYYY - HH:MM:SS"
        assert_eq!(name.len(), "water (".len() + 21 + 1);
        assert_eq!(store.experiments()[0].name, name);
    }

    #[test]
    fn test_trial_logged_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("store")).unwrap());
        let scratch = dir.path().join("scratch");
        let logger = ExperimentLogger::open_experiment(store.clone(), "water", &scratch).unwrap();

        let (model, x, y) = fitted();
        let y_pred = model.predict(&x).unwrap();
        let names = vec!["ph".to_string(), "Hardness".to_string()];

        let outcome = logger.log_trial(&record(&model, &names, &x, &y, &y_pred));
        let run_id = outcome.run_id().unwrap().to_string();

        let run = store.run(&run_id).unwrap();
        assert_eq!(run.info.status, RunStatus::Finished);
        assert_eq!(run.tags["optuna_trial_number"], "0");
        assert_eq!(run.params["n_estimators"], "5");
        assert!(run.metric("roc_auc").unwrap().is_nan());
        for artifact in [
            "random_forest/model.json",
            "random_forest/signature.json",
            "random_forest/input_example.json",
            "classification_report_trial_0.txt",
            "confusion_matrix_trial_0.svg",
            "feature_importance_trial_0.svg",
        ] {
            assert!(run.artifacts.iter().any(|a| a == artifact), "missing {}", artifact);
        }

        // Scratch copies are gone after upload
        let leftover: Vec<_> = walk_files(&scratch);
        assert!(leftover.is_empty(), "left behind {:?}", leftover);
    }

    #[test]
    fn test_upload_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let inner = FileStore::open(dir.path().join("store")).unwrap();
        let store = Arc::new(NoArtifacts(inner));
        let scratch = dir.path().join("scratch");
        let logger = ExperimentLogger::open_experiment(store.clone(), "water", &scratch).unwrap();

        let (model, x, y) = fitted();
        let y_pred = model.predict(&x).unwrap();
        let names = vec!["ph".to_string(), "Hardness".to_string()];

        let outcome = logger.log_trial(&record(&model, &names, &x, &y, &y_pred));
        match outcome {
            LogOutcome::Failed { reason } => assert!(reason.contains("artifact store offline")),
            other => panic!("expected failure, got {:?}", other),
        }

        let runs = store.0.runs(logger.experiment_id());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].info.status, RunStatus::Failed);
        assert!(walk_files(&scratch).is_empty());
        let first_end = runs[0].info.end_time;
        assert!(first_end.is_some());

        // The next run opens normally and leaves the failed one as it was
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = logger.log_trial(&record(&model, &names, &x, &y, &y_pred));
        assert!(!second.is_logged());
        let runs = store.0.runs(logger.experiment_id());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].info.end_time, first_end);
        assert!(runs.iter().all(|r| r.info.status == RunStatus::Failed));
    }

    fn walk_files(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return out;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(walk_files(&path));
            } else {
                out.push(path);
            }
        }
        out
    }
}
