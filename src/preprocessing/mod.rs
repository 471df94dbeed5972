//! Data preprocessing module
//!
//! Turns a raw CSV into model-ready arrays:
//! - CSV loading with missing-value reporting
//! - Median imputation of numeric columns
//! - Stratified train/test splitting
//! - Class rebalancing of the training partition (see [`crate::synthetic`])

mod dataset;
mod imputer;
mod loader;
mod split;

pub use dataset::Dataset;
pub use imputer::{MedianImputer, is_numeric_dtype};
pub use loader::{DataPipeline, MissingReport};
pub use split::{DataPreprocessor, TrainTestSplit, train_test_split};
