//! Model training module
//!
//! - Decision trees and the random forest built from them
//! - Classification metrics and the text report
//! - [`Trainer`]: hyperparameter search plus final retraining for a
//!   [`ModelFamily`]

pub mod decision_tree;
pub mod metrics;
pub mod random_forest;
mod family;
mod trainer;

pub use decision_tree::{DecisionTree, TreeNode};
pub use family::{ModelFamily, RANDOM_STATE};
pub use metrics::{classification_report, ConfusionMatrix, LabelScores, MetricBundle};
pub use random_forest::{MaxFeatures, RandomForest};
pub use trainer::{FinalModel, Trainer, TrainerFactory, TrainerState};
