//! Registry backend abstraction

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle stage of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    None,
    Staging,
    Production,
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            _ => Err(PipelineError::RegistryError(format!(
                "Unknown stage '{}'; expected None, Staging, Production or Archived",
                s
            ))),
        }
    }
}

/// One registered version of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionInfo {
    pub name: String,
    pub version: u64,
    pub current_stage: Stage,
    pub source: String,
    pub run_id: Option<String>,
    pub description: Option<String>,
    /// Milliseconds since the Unix epoch
    pub creation_timestamp: i64,
}

/// Backend holding registered models and their versions
pub trait RegistryStore {
    /// Whether a registered model called `name` exists
    fn registered_model_exists(&self, name: &str) -> Result<bool>;

    fn create_registered_model(&self, name: &str) -> Result<()>;

    fn update_registered_model(&self, name: &str, description: &str) -> Result<()>;

    /// Add the next version of `name`, starting at stage `None`
    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersionInfo>;

    fn update_model_version(&self, name: &str, version: u64, description: &str) -> Result<()>;

    /// Move a version to `stage`; with `archive_existing` every other version
    /// at that stage moves to `Archived`
    fn transition_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersionInfo>;

    /// Newest version at each of the given stages
    fn latest_versions(&self, name: &str, stages: &[Stage]) -> Result<Vec<ModelVersionInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_and_display() {
        assert_eq!("Production".parse::<Stage>().unwrap(), Stage::Production);
        assert_eq!("staging".parse::<Stage>().unwrap(), Stage::Staging);
        assert_eq!(Stage::Archived.to_string(), "Archived");
        assert!(matches!(
            "Live".parse::<Stage>(),
            Err(PipelineError::RegistryError(_))
        ));
    }
}
