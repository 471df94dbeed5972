//! MLflow REST client
//!
//! Talks to an MLflow tracking server over its 2.0 REST API. Artifacts go
//! through the server's `mlflow-artifacts` proxy, so runs must be created on
//! a server started with artifact serving enabled (the default since 2.0).

use super::store::{now_millis, RunInfo, RunStatus, TrackingStore};
use crate::error::{PipelineError, Result};
use crate::registry::{ModelVersionInfo, RegistryStore, Stage};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

/// Error body returned by the MLflow server
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub error_code: String,
    pub message: String,
}

impl ApiError {
    /// Decode a non-success response body
    pub fn decode(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            status,
            error_code: field("error_code").unwrap_or_else(|| "UNKNOWN".to_string()),
            message: field("message").unwrap_or_else(|| body.trim().to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error_code == "RESOURCE_DOES_NOT_EXIST" || self.status == 404
    }

    pub fn is_already_exists(&self) -> bool {
        self.error_code == "RESOURCE_ALREADY_EXISTS"
    }

    fn describe(&self) -> String {
        format!("{} (HTTP {}): {}", self.error_code, self.status, self.message)
    }

    fn into_tracking(self) -> PipelineError {
        PipelineError::TrackingError(self.describe())
    }

    fn into_registry(self) -> PipelineError {
        PipelineError::RegistryError(self.describe())
    }
}

/// Outer error: transport failure. Inner error: the server rejected the call.
type ApiResult = Result<std::result::Result<Value, ApiError>>;

/// MLflow tracking and registry client
pub struct MlflowClient {
    base_url: String,
    client: Client,
}

impl MlflowClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PipelineError::ConfigError("Tracking URI is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("water-scan/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::TrackingError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, client })
    }

    /// Server base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> ApiResult {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Ok(Value::Null));
            }
            Ok(Ok(serde_json::from_str(&body)?))
        } else {
            Ok(Err(ApiError::decode(status.as_u16(), &body)))
        }
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> ApiResult {
        debug!(path, "GET");
        self.send(self.client.get(self.endpoint(path)).query(query))
    }

    fn post(&self, path: &str, body: &Value) -> ApiResult {
        debug!(path, "POST");
        self.send(self.client.post(self.endpoint(path)).json(body))
    }

    fn patch(&self, path: &str, body: &Value) -> ApiResult {
        debug!(path, "PATCH");
        self.send(self.client.patch(self.endpoint(path)).json(body))
    }

    fn tracking_call(&self, result: ApiResult) -> Result<Value> {
        result?.map_err(ApiError::into_tracking)
    }

    fn registry_call(&self, result: ApiResult) -> Result<Value> {
        result?.map_err(ApiError::into_registry)
    }
}

impl std::fmt::Debug for MlflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TrackingStore for MlflowClient {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        match self.get("experiments/get-by-name", &[("experiment_name", name)])? {
            Ok(body) => {
                return body
                    .pointer("/experiment/experiment_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| missing_field("experiment.experiment_id"));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into_tracking()),
        }

        let body = self.tracking_call(self.post("experiments/create", &json!({ "name": name })))?;
        body.get("experiment_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing_field("experiment_id"))
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
        let body = self.tracking_call(self.post(
            "runs/create",
            &json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": now_millis(),
                "tags": [{ "key": "mlflow.runName", "value": run_name }],
            }),
        ))?;

        let run = body.get("run").ok_or_else(|| missing_field("run"))?;
        parse_run_info(run)
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.tracking_call(self.post(
            "runs/set-tag",
            &json!({ "run_id": run_id, "key": key, "value": value }),
        ))?;
        Ok(())
    }

    fn log_batch(
        &self,
        run_id: &str,
        params: &[(String, String)],
        metrics: &[(String, f64)],
    ) -> Result<()> {
        let timestamp = now_millis();
        let params: Vec<Value> = params
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        let metrics: Vec<Value> = metrics
            .iter()
            .map(|(key, value)| metric_json(key, *value, timestamp, 0))
            .collect();

        self.tracking_call(self.post(
            "runs/log-batch",
            &json!({ "run_id": run_id, "params": params, "metrics": metrics }),
        ))?;
        Ok(())
    }

    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<()> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PipelineError::TrackingError(format!("Not a file: {}", local_path.display()))
            })?;
        let relative = artifact_relative_path(&run.artifact_uri, artifact_path, file_name)?;
        let url = format!("{}/api/2.0/mlflow-artifacts/artifacts/{}", self.base_url, relative);
        let bytes = std::fs::read(local_path)?;

        debug!(artifact = %relative, size = bytes.len(), "PUT artifact");
        self.tracking_call(self.send(self.client.put(url).body(bytes)))?;
        Ok(())
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.tracking_call(self.post(
            "runs/update",
            &json!({ "run_id": run_id, "status": status.as_str(), "end_time": now_millis() }),
        ))?;
        Ok(())
    }
}

impl RegistryStore for MlflowClient {
    fn registered_model_exists(&self, name: &str) -> Result<bool> {
        match self.get("registered-models/get", &[("name", name)])? {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into_registry()),
        }
    }

    fn create_registered_model(&self, name: &str) -> Result<()> {
        match self.post("registered-models/create", &json!({ "name": name }))? {
            Ok(_) => Ok(()),
            Err(err) if err.is_already_exists() => Ok(()),
            Err(err) => Err(err.into_registry()),
        }
    }

    fn update_registered_model(&self, name: &str, description: &str) -> Result<()> {
        self.registry_call(self.patch(
            "registered-models/update",
            &json!({ "name": name, "description": description }),
        ))?;
        Ok(())
    }

    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersionInfo> {
        let mut request = json!({ "name": name, "source": source });
        if let Some(run_id) = run_id {
            request["run_id"] = json!(run_id);
        }

        let body = self.registry_call(self.post("model-versions/create", &request))?;
        parse_model_version(body.get("model_version").ok_or_else(|| missing_field("model_version"))?)
    }

    fn update_model_version(&self, name: &str, version: u64, description: &str) -> Result<()> {
        self.registry_call(self.patch(
            "model-versions/update",
            &json!({ "name": name, "version": version.to_string(), "description": description }),
        ))?;
        Ok(())
    }

    fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersionInfo> {
        let body = self.registry_call(self.post(
            "model-versions/transition-stage",
            &json!({
                "name": name,
                "version": version.to_string(),
                "stage": stage.as_str(),
                "archive_existing_versions": archive_existing,
            }),
        ))?;
        parse_model_version(body.get("model_version").ok_or_else(|| missing_field("model_version"))?)
    }

    fn latest_versions(&self, name: &str, stages: &[Stage]) -> Result<Vec<ModelVersionInfo>> {
        let stages: Vec<&str> = stages.iter().map(Stage::as_str).collect();
        let body = self.registry_call(self.post(
            "registered-models/get-latest-versions",
            &json!({ "name": name, "stages": stages }),
        ))?;

        body.get("model_versions")
            .and_then(Value::as_array)
            .map(|versions| versions.iter().map(parse_model_version).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn missing_field(name: &str) -> PipelineError {
    PipelineError::TrackingError(format!("Response is missing '{}'", name))
}

/// Integers arrive either as JSON numbers or as strings (protobuf int64)
fn lenient_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

/// Metric entry for `runs/log-batch`; non-finite values use the protobuf
/// JSON spellings since JSON has no NaN literal
pub fn metric_json(key: &str, value: f64, timestamp: i64, step: i64) -> Value {
    let value = if value.is_nan() {
        json!("NaN")
    } else if value == f64::INFINITY {
        json!("Infinity")
    } else if value == f64::NEG_INFINITY {
        json!("-Infinity")
    } else {
        json!(value)
    };

    json!({ "key": key, "value": value, "timestamp": timestamp, "step": step })
}

/// Path of an artifact relative to the `mlflow-artifacts` proxy root
pub fn artifact_relative_path(
    artifact_uri: &str,
    artifact_path: Option<&str>,
    file_name: &str,
) -> Result<String> {
    let rest = artifact_uri.strip_prefix(ARTIFACT_SCHEME).ok_or_else(|| {
        PipelineError::TrackingError(format!(
            "Artifact URI '{}' is not served by the tracking server; start it with artifact serving enabled",
            artifact_uri
        ))
    })?;

    // Drop an optional //host:port authority
    let rest = match rest.strip_prefix("//") {
        Some(with_host) => with_host.find('/').map_or("", |idx| &with_host[idx..]),
        None => rest,
    };

    let mut parts: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(dir) = artifact_path {
        parts.extend(dir.split('/').filter(|s| !s.is_empty()));
    }
    parts.push(file_name);

    Ok(parts.join("/"))
}

/// Decode the `run` object of a runs API response
pub fn parse_run_info(run: &Value) -> Result<RunInfo> {
    let info = run.get("info").unwrap_or(run);
    let run_id = str_field(info, "run_id")
        .or_else(|| str_field(info, "run_uuid"))
        .ok_or_else(|| missing_field("run.info.run_id"))?;

    Ok(RunInfo {
        run_id: run_id.to_string(),
        experiment_id: str_field(info, "experiment_id").unwrap_or_default().to_string(),
        run_name: str_field(info, "run_name").unwrap_or_default().to_string(),
        artifact_uri: str_field(info, "artifact_uri").unwrap_or_default().to_string(),
        status: str_field(info, "status").unwrap_or("RUNNING").parse()?,
        start_time: lenient_i64(info.get("start_time")).unwrap_or_default(),
        end_time: lenient_i64(info.get("end_time")),
    })
}

/// Decode a `model_version` object
pub fn parse_model_version(value: &Value) -> Result<ModelVersionInfo> {
    let version = lenient_i64(value.get("version"))
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| missing_field("model_version.version"))?;

    Ok(ModelVersionInfo {
        name: str_field(value, "name").unwrap_or_default().to_string(),
        version,
        current_stage: str_field(value, "current_stage").unwrap_or("None").parse()?,
        source: str_field(value, "source").unwrap_or_default().to_string(),
        run_id: str_field(value, "run_id").filter(|s| !s.is_empty()).map(str::to_string),
        description: str_field(value, "description").filter(|s| !s.is_empty()).map(str::to_string),
        creation_timestamp: lenient_i64(value.get("creation_timestamp")).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_json_non_finite() {
        let nan = metric_json("roc_auc", f64::NAN, 10, 0);
        assert_eq!(nan["value"], json!("NaN"));
        assert_eq!(nan["key"], json!("roc_auc"));

        assert_eq!(metric_json("x", f64::INFINITY, 0, 0)["value"], json!("Infinity"));
        assert_eq!(metric_json("x", f64::NEG_INFINITY, 0, 0)["value"], json!("-Infinity"));
        assert_eq!(metric_json("accuracy", 0.5, 0, 0)["value"], json!(0.5));
    }

    #[test]
    fn test_artifact_relative_path() {
        let path = artifact_relative_path(
            "mlflow-artifacts:/3/abc/artifacts",
            Some("random_forest"),
            "model.json",
        )
        .unwrap();
        assert_eq!(path, "3/abc/artifacts/random_forest/model.json");

        let with_host = artifact_relative_path(
            "mlflow-artifacts://localhost:5001/3/abc/artifacts",
            None,
            "report.txt",
        )
        .unwrap();
        assert_eq!(with_host, "3/abc/artifacts/report.txt");

        assert!(matches!(
            artifact_relative_path("./mlruns/3/abc/artifacts", None, "report.txt"),
            Err(PipelineError::TrackingError(_))
        ));
    }

    #[test]
    fn test_parse_model_version() {
        let body = json!({
            "name": "water_potability_rf",
            "version": "2",
            "current_stage": "Production",
            "source": "runs:/abc/random_forest",
            "run_id": "abc",
            "description": "",
            "creation_timestamp": 1700000000000i64,
        });

        let mv = parse_model_version(&body).unwrap();
        assert_eq!(mv.version, 2);
        assert_eq!(mv.current_stage, Stage::Production);
        assert_eq!(mv.run_id.as_deref(), Some("abc"));
        assert_eq!(mv.description, None);
        assert_eq!(mv.creation_timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_parse_run_info() {
        let body = json!({
            "info": {
                "run_id": "r1",
                "experiment_id": "7",
                "run_name": "RF_Optuna_Trial_0",
                "artifact_uri": "mlflow-artifacts:/7/r1/artifacts",
                "status": "RUNNING",
                "start_time": "1700000000000",
            },
            "data": {},
        });

        let run = parse_run_info(&body).unwrap();
        assert_eq!(run.run_id, "r1");
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.start_time, 1_700_000_000_000);
        assert_eq!(run.end_time, None);
    }

    #[test]
    fn test_api_error_decode() {
        let err = ApiError::decode(
            404,
            r#"{"error_code": "RESOURCE_DOES_NOT_EXIST", "message": "Could not find experiment"}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(err.message, "Could not find experiment");

        let raw = ApiError::decode(502, "Bad Gateway");
        assert_eq!(raw.error_code, "UNKNOWN");
        assert_eq!(raw.message, "Bad Gateway");
        assert!(!raw.is_already_exists());
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(matches!(MlflowClient::new("/"), Err(PipelineError::ConfigError(_))));
        let client = MlflowClient::new("http://localhost:5001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5001");
    }
}
