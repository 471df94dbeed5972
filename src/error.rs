//! Error types for the water-scan pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Imputation error: {0}")]
    ImputationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Model type '{0}' is not supported")]
    UnsupportedModel(String),

    #[error("Cannot {operation} while trainer is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::TrackingError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_unsupported_model_names_value() {
        let err = PipelineError::UnsupportedModel("naive_bayes".to_string());
        let msg = err.to_string();
        assert!(msg.contains("naive_bayes"));
        assert!(msg.contains("not supported"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }
}
