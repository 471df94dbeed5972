//! Random Forest classifier

use super::decision_tree::{argmax_labels, DecisionTree};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Class labels, sorted ascending
    classes: Vec<i64>,
}

/// Features drawn at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// Square root of n_features, rounded down
    Sqrt,
    All,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            random_state: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth; `None` grows trees until leaves are pure
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        if self.n_estimators == 0 {
            return Err(PipelineError::TrainingError(
                "n_estimators must be at least 1".to_string()
            ));
        }

        let mut classes: Vec<i64> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();

        self.n_features = n_features;
        self.classes = classes;
        let max_features = self.compute_max_features(n_features);

        let base_seed = self.random_state.unwrap_or(42);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for tree_idx in 0..self.n_estimators {
            let seed = base_seed.wrapping_add(tree_idx as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            // Bootstrap sample of the training rows
            let sample_indices: Vec<usize> =
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

            let x_boot = x.select(Axis(0), &sample_indices);
            let y_boot: Array1<i64> = sample_indices.iter().map(|&i| y[i]).collect();

            let mut tree = DecisionTree::new()
                .with_min_samples_split(self.min_samples_split)
                .with_min_samples_leaf(self.min_samples_leaf)
                .with_max_features(max_features)
                .with_random_state(rng.gen());
            if let Some(d) = self.max_depth {
                tree = tree.with_max_depth(d);
            }

            tree.fit_with_classes(&x_boot, &y_boot, &self.classes)?;
            trees.push(tree);
        }

        debug!(
            n_estimators = self.n_estimators,
            max_depth = ?self.max_depth,
            min_samples_split = self.min_samples_split,
            "Fitted random forest"
        );

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (total, &val) in total_importances.iter_mut().zip(imp.iter()) {
                    *total += val;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Predict class probabilities: the mean of the trees' leaf distributions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for tree in &self.trees {
            proba += &tree.predict_proba(x)?;
        }
        proba /= self.trees.len() as f64;

        Ok(proba)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_labels(&proba, &self.classes))
    }

    /// Probability of `class` per row, if the forest has seen that class
    pub fn positive_proba(&self, x: &Array2<f64>, class: i64) -> Result<Option<Array1<f64>>> {
        let Some(column) = self.classes.iter().position(|&c| c == class) else {
            return Ok(None);
        };
        let proba = self.predict_proba(x)?;
        Ok(Some(proba.column(column).to_owned()))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Class labels seen at fit time
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Number of features seen at fit time
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
