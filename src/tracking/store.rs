//! Tracking backend abstraction

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Lifecycle status of a tracking run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    /// Whether the run is still accepting submissions
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Scheduled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(RunStatus::Running),
            "SCHEDULED" => Ok(RunStatus::Scheduled),
            "FINISHED" => Ok(RunStatus::Finished),
            "FAILED" => Ok(RunStatus::Failed),
            "KILLED" => Ok(RunStatus::Killed),
            other => Err(PipelineError::TrackingError(format!("Unknown run status '{}'", other))),
        }
    }
}

/// Identity and location of a tracking run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    /// Root under which the run's artifacts are stored
    pub artifact_uri: String,
    pub status: RunStatus,
    /// Milliseconds since the Unix epoch
    pub start_time: i64,
    pub end_time: Option<i64>,
}

impl RunInfo {
    /// URI addressing an artifact path inside this run
    pub fn model_uri(&self, artifact_path: &str) -> String {
        format!("runs:/{}/{}", self.run_id, artifact_path)
    }
}

/// Backend that stores experiments, runs, parameters, metrics and artifacts
pub trait TrackingStore {
    /// Id of the experiment called `name`, creating it when absent
    fn get_or_create_experiment(&self, name: &str) -> Result<String>;

    /// Start a new run inside an experiment
    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo>;

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Record parameters and metrics in one call
    fn log_batch(
        &self,
        run_id: &str,
        params: &[(String, String)],
        metrics: &[(String, f64)],
    ) -> Result<()>;

    /// Upload one local file under `artifact_path` (or the run root)
    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<()>;

    /// Mark a run terminated with the given status
    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()>;
}

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip_names() {
        assert_eq!("finished".parse::<RunStatus>().unwrap(), RunStatus::Finished);
        assert_eq!(RunStatus::Failed.to_string(), "FAILED");
        assert!("paused".parse::<RunStatus>().is_err());
        assert!(RunStatus::Running.is_active());
        assert!(!RunStatus::Killed.is_active());
    }

    #[test]
    fn test_model_uri() {
        let run = RunInfo {
            run_id: "abc123".to_string(),
            experiment_id: "1".to_string(),
            run_name: "BestModel_Final".to_string(),
            artifact_uri: "mlflow-artifacts:/1/abc123/artifacts".to_string(),
            status: RunStatus::Running,
            start_time: 0,
            end_time: None,
        };
        assert_eq!(run.model_uri("random_forest"), "runs:/abc123/random_forest");
    }
}
