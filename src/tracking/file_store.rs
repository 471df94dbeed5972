//! Directory-backed tracking and registry store
//!
//! Keeps experiments, runs and registered models in a single `index.json`
//! under the store root and copies artifacts to `artifacts/<run_id>/`.
//! Used offline and in tests in place of a tracking server.

use super::store::{now_millis, RunInfo, RunStatus, TrackingStore};
use crate::error::{PipelineError, Result};
use crate::registry::{ModelVersionInfo, RegistryStore, Stage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub name: String,
    pub creation_time: i64,
}

/// Everything recorded for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub info: RunInfo,
    pub tags: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    /// Non-finite values are stored as null
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Artifact paths relative to the run's artifact directory
    pub artifacts: Vec<String>,
}

impl RunRecord {
    /// Metric value; a stored null reads back as NaN
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).map(|v| v.unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredModelRecord {
    pub name: String,
    pub description: Option<String>,
    pub creation_timestamp: i64,
    pub versions: Vec<ModelVersionInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreIndex {
    next_experiment_id: u64,
    experiments: Vec<ExperimentRecord>,
    runs: Vec<RunRecord>,
    models: Vec<RegisteredModelRecord>,
}

impl StoreIndex {
    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord> {
        self.runs
            .iter_mut()
            .find(|r| r.info.run_id == run_id)
            .ok_or_else(|| PipelineError::TrackingError(format!("Run '{}' not found", run_id)))
    }

    fn model_mut(&mut self, name: &str) -> Result<&mut RegisteredModelRecord> {
        self.models
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| {
                PipelineError::RegistryError(format!("Registered model '{}' not found", name))
            })
    }
}

/// Tracking and registry store persisted under a local directory
pub struct FileStore {
    root: PathBuf,
    index: Mutex<StoreIndex>,
}

impl FileStore {
    /// Open the store at `root`, creating the directory when absent
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let json = fs::read_to_string(&index_path)?;
            serde_json::from_str(&json)?
        } else {
            StoreIndex {
                next_experiment_id: 1,
                ..Default::default()
            }
        };

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a run's artifacts
    pub fn artifact_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("artifacts").join(run_id)
    }

    fn persist(&self, index: &StoreIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)?;
        fs::write(self.root.join(INDEX_FILE), json)?;
        Ok(())
    }

    /// Apply a mutation to a copy of the index; the copy replaces the
    /// in-memory index only once it is on disk
    fn update<T>(&self, f: impl FnOnce(&mut StoreIndex) -> Result<T>) -> Result<T> {
        let mut index = self.index.lock();
        let mut next = index.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *index = next;
        Ok(out)
    }

    /// All experiments, in creation order
    pub fn experiments(&self) -> Vec<ExperimentRecord> {
        self.index.lock().experiments.clone()
    }

    /// One run by id
    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.index
            .lock()
            .runs
            .iter()
            .find(|r| r.info.run_id == run_id)
            .cloned()
    }

    /// Runs of one experiment, in creation order
    pub fn runs(&self, experiment_id: &str) -> Vec<RunRecord> {
        self.index
            .lock()
            .runs
            .iter()
            .filter(|r| r.info.experiment_id == experiment_id)
            .cloned()
            .collect()
    }

    /// A registered model with all its versions
    pub fn registered_model(&self, name: &str) -> Option<RegisteredModelRecord> {
        self.index.lock().models.iter().find(|m| m.name == name).cloned()
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl TrackingStore for FileStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        self.update(|index| {
            if let Some(exp) = index.experiments.iter().find(|e| e.name == name) {
                return Ok(exp.experiment_id.clone());
            }

            let experiment_id = index.next_experiment_id.to_string();
            index.next_experiment_id += 1;
            index.experiments.push(ExperimentRecord {
                experiment_id: experiment_id.clone(),
                name: name.to_string(),
                creation_time: now_millis(),
            });
            debug!(experiment_id = %experiment_id, name, "Created experiment");
            Ok(experiment_id)
        })
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let artifact_uri = self.artifact_dir(&run_id).display().to_string();

        self.update(|index| {
            if !index.experiments.iter().any(|e| e.experiment_id == experiment_id) {
                return Err(PipelineError::TrackingError(format!(
                    "Experiment '{}' not found",
                    experiment_id
                )));
            }

            let info = RunInfo {
                run_id: run_id.clone(),
                experiment_id: experiment_id.to_string(),
                run_name: run_name.to_string(),
                artifact_uri,
                status: RunStatus::Running,
                start_time: now_millis(),
                end_time: None,
            };

            let mut tags = BTreeMap::new();
            tags.insert("mlflow.runName".to_string(), run_name.to_string());
            index.runs.push(RunRecord {
                info: info.clone(),
                tags,
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
                artifacts: Vec::new(),
            });
            Ok(info)
        })
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.update(|index| {
            index.run_mut(run_id)?.tags.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn log_batch(
        &self,
        run_id: &str,
        params: &[(String, String)],
        metrics: &[(String, f64)],
    ) -> Result<()> {
        self.update(|index| {
            let run = index.run_mut(run_id)?;
            if !run.info.status.is_active() {
                return Err(PipelineError::TrackingError(format!(
                    "Run '{}' is already {}",
                    run_id, run.info.status
                )));
            }

            for (key, value) in params {
                // Parameters are write-once, matching tracking-server semantics
                match run.params.get(key) {
                    Some(existing) if existing != value => {
                        return Err(PipelineError::TrackingError(format!(
                            "Parameter '{}' already logged as '{}'",
                            key, existing
                        )));
                    }
                    _ => {
                        run.params.insert(key.clone(), value.clone());
                    }
                }
            }
            for (key, value) in metrics {
                run.metrics
                    .insert(key.clone(), Some(*value).filter(|v| v.is_finite()));
            }
            Ok(())
        })
    }

    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<()> {
        let file_name = local_path.file_name().ok_or_else(|| {
            PipelineError::TrackingError(format!("Not a file: {}", local_path.display()))
        })?;

        let mut relative = PathBuf::new();
        if let Some(dir) = artifact_path {
            relative.push(dir);
        }
        relative.push(file_name);

        let target = self.artifact_dir(&run.run_id).join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local_path, &target)?;

        let relative = relative.to_string_lossy().replace('\\', "/");
        self.update(|index| {
            let record = index.run_mut(&run.run_id)?;
            if !record.artifacts.contains(&relative) {
                record.artifacts.push(relative);
            }
            Ok(())
        })
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.update(|index| {
            let run = index.run_mut(run_id)?;
            run.info.status = status;
            run.info.end_time = Some(now_millis());
            Ok(())
        })
    }
}

impl RegistryStore for FileStore {
    fn registered_model_exists(&self, name: &str) -> Result<bool> {
        Ok(self.index.lock().models.iter().any(|m| m.name == name))
    }

    fn create_registered_model(&self, name: &str) -> Result<()> {
        self.update(|index| {
            if !index.models.iter().any(|m| m.name == name) {
                index.models.push(RegisteredModelRecord {
                    name: name.to_string(),
                    description: None,
                    creation_timestamp: now_millis(),
                    versions: Vec::new(),
                });
            }
            Ok(())
        })
    }

    fn update_registered_model(&self, name: &str, description: &str) -> Result<()> {
        self.update(|index| {
            index.model_mut(name)?.description = Some(description.to_string());
            Ok(())
        })
    }

    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersionInfo> {
        self.update(|index| {
            let model = index.model_mut(name)?;
            let version = model.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
            let info = ModelVersionInfo {
                name: name.to_string(),
                version,
                current_stage: Stage::None,
                source: source.to_string(),
                run_id: run_id.map(str::to_string),
                description: None,
                creation_timestamp: now_millis(),
            };
            model.versions.push(info.clone());
            Ok(info)
        })
    }

    fn update_model_version(&self, name: &str, version: u64, description: &str) -> Result<()> {
        self.update(|index| {
            let model = index.model_mut(name)?;
            let mv = model
                .versions
                .iter_mut()
                .find(|v| v.version == version)
                .ok_or_else(|| {
                    PipelineError::RegistryError(format!("Version {} of '{}' not found", version, name))
                })?;
            mv.description = Some(description.to_string());
            Ok(())
        })
    }

    fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersionInfo> {
        self.update(|index| {
            let model = index.model_mut(name)?;
            if !model.versions.iter().any(|v| v.version == version) {
                return Err(PipelineError::RegistryError(format!(
                    "Version {} of '{}' not found",
                    version, name
                )));
            }

            let archivable = matches!(stage, Stage::Staging | Stage::Production);
            let mut promoted = None;
            for mv in &mut model.versions {
                if mv.version == version {
                    mv.current_stage = stage;
                    promoted = Some(mv.clone());
                } else if archive_existing && archivable && mv.current_stage == stage {
                    debug!(name, version = mv.version, "Archiving previous version");
                    mv.current_stage = Stage::Archived;
                }
            }

            promoted.ok_or_else(|| {
                PipelineError::RegistryError(format!("Version {} of '{}' not found", version, name))
            })
        })
    }

    fn latest_versions(&self, name: &str, stages: &[Stage]) -> Result<Vec<ModelVersionInfo>> {
        let index = self.index.lock();
        let model = index
            .models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| {
                PipelineError::RegistryError(format!("Registered model '{}' not found", name))
            })?;

        let stages: Vec<Stage> = if stages.is_empty() {
            vec![Stage::None, Stage::Staging, Stage::Production, Stage::Archived]
        } else {
            stages.to_vec()
        };

        Ok(stages
            .iter()
            .filter_map(|stage| {
                model
                    .versions
                    .iter()
                    .filter(|v| v.current_stage == *stage)
                    .max_by_key(|v| v.version)
                    .cloned()
            })
            .collect())
    }
}
