//! Registration and stage promotion of model versions

use super::store::{ModelVersionInfo, RegistryStore, Stage};
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use tracing::info;

/// Description attached to every published version
pub const VERSION_DESCRIPTION: &str = "Optimized version via hyperparameter search with SMOTE";

/// Run id embedded in a `runs:/<run_id>/<path>` URI
fn run_id_from_uri(model_uri: &str) -> Option<&str> {
    model_uri
        .strip_prefix("runs:/")
        .and_then(|rest| rest.split('/').next())
        .filter(|id| !id.is_empty())
}

/// Registry client shared by the pipeline
#[derive(Clone)]
pub struct ModelRegistry {
    store: Arc<dyn RegistryStore>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Register `model_uri` as the next version of `name` and promote it.
    ///
    /// The registered model is created on first use. Versions already at
    /// `stage` are archived.
    pub fn publish(
        &self,
        model_uri: &str,
        name: &str,
        description: &str,
        stage: Stage,
    ) -> Result<ModelVersionInfo> {
        if name.trim().is_empty() {
            return Err(PipelineError::RegistryError(
                "Registered model name must not be empty".to_string(),
            ));
        }

        if !self.store.registered_model_exists(name)? {
            self.store.create_registered_model(name)?;
        }

        let version = self
            .store
            .create_model_version(name, model_uri, run_id_from_uri(model_uri))?;
        self.store.update_registered_model(name, description)?;
        self.store
            .update_model_version(name, version.version, VERSION_DESCRIPTION)?;

        let mut promoted = self.store.transition_stage(name, version.version, stage, true)?;
        if promoted.description.is_none() {
            promoted.description = Some(VERSION_DESCRIPTION.to_string());
        }

        info!(
            model = name,
            version = promoted.version,
            stage = %promoted.current_stage,
            "Model promoted"
        );
        Ok(promoted)
    }

    /// The version currently at `stage`, if any
    pub fn current_version(&self, name: &str, stage: Stage) -> Result<Option<ModelVersionInfo>> {
        let versions = self.store.latest_versions(name, &[stage])?;
        Ok(versions
            .into_iter()
            .filter(|v| v.current_stage == stage)
            .max_by_key(|v| v.version))
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry").finish_non_exhaustive()
    }
}
