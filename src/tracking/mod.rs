//! Experiment tracking module
//!
//! Records parameters, metrics and artifacts of every trial and of the
//! final model. Two backends implement [`TrackingStore`]:
//! - [`MlflowClient`] talks to an MLflow tracking server over REST
//! - [`FileStore`] keeps everything under a local directory

mod artifacts;
mod file_store;
mod logger;
mod mlflow;
mod run;
mod signature;
mod store;

pub use artifacts::{confusion_matrix_svg, feature_importance_svg, ScratchFiles};
pub use file_store::{ExperimentRecord, FileStore, RegisteredModelRecord, RunRecord};
pub use logger::{ExperimentLogger, LogOutcome, TrialLogger, TrialRecord};
pub use mlflow::{ApiError, MlflowClient};
pub use run::RunGuard;
pub use signature::{InputExample, ModelSignature, MODEL_ARTIFACT_PATH};
pub use store::{RunInfo, RunStatus, TrackingStore};
