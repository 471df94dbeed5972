//! Decision tree classifier

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Maximum features to consider per split
    pub max_features: Option<usize>,
    /// Seed for the per-split feature draw
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Class labels, sorted ascending
    classes: Vec<i64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate split found while scanning a node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            classes: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set number of features drawn at each split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<&mut Self> {
        let mut classes: Vec<i64> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        self.fit_with_classes(x, y, &classes)
    }

    /// Fit against a fixed class list.
    ///
    /// A forest passes the full label set so that every tree's leaf
    /// distributions line up, even when a bootstrap sample misses a class.
    pub fn fit_with_classes(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        classes: &[i64],
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        if n_samples == 0 {
            return Err(PipelineError::TrainingError(
                "Cannot fit a tree on an empty training set".to_string()
            ));
        }

        let labels: Vec<usize> = y
            .iter()
            .map(|label| {
                classes.binary_search(label).map_err(|_| {
                    PipelineError::TrainingError(format!("Label {} missing from class list", label))
                })
            })
            .collect::<Result<_>>()?;

        self.n_features = n_features;
        self.classes = classes.to_vec();

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, &labels, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn class_counts(&self, labels: &[usize], indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[labels[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let n = n_samples.max(1) as f64;
        TreeNode::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / n).collect(),
            n_samples,
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(labels, indices);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure;

        if should_stop {
            return self.leaf(&counts, n_samples);
        }

        let parent_impurity = gini(&counts, n_samples);
        let Some(best) = self.find_best_split(x, labels, indices, parent_impurity, rng) else {
            return self.leaf(&counts, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, labels, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, labels, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    /// Features examined at one node: all of them, or a fresh random subset
    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        labels: &[usize],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let n_classes = self.classes.len();
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in self.candidate_features(rng) {
            let mut column: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (x[[i, feature_idx]], labels[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Sweep thresholds left to right, moving one sample at a time
            let mut left_counts = vec![0usize; n_classes];
            let mut right_counts = vec![0usize; n_classes];
            for &(_, label) in &column {
                right_counts[label] += 1;
            }

            for pos in 0..n - 1 {
                let (value, label) = column[pos];
                left_counts[label] += 1;
                right_counts[label] -= 1;

                let next_value = column[pos + 1].0;
                if value == next_value {
                    continue;
                }

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }

                let weighted = (left_n as f64 * gini(&left_counts, left_n)
                    + right_n as f64 * gini(&right_counts, right_n))
                    / n as f64;
                let gain = parent_impurity - weighted;

                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: (value + next_value) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Class probabilities, one column per entry of [`Self::classes`]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.check_input(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));

        for (i, row) in x.rows().into_iter().enumerate() {
            let distribution = Self::leaf_distribution(root, row);
            for (j, &p) in distribution.iter().enumerate() {
                proba[[i, j]] = p;
            }
        }

        Ok(proba)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_labels(&proba, &self.classes))
    }

    fn leaf_distribution<'a>(node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a [f64] {
        match node {
            TreeNode::Leaf { distribution, .. } => distribution,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::leaf_distribution(left, sample)
                } else {
                    Self::leaf_distribution(right, sample)
                }
            }
        }
    }

    /// Class labels seen at fit time
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

}

/// Gini impurity of a node with the given class counts
fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Most probable label per row; ties go to the lower class
pub(crate) fn argmax_labels(proba: &Array2<f64>, classes: &[i64]) -> Array1<i64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (j, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = j;
                }
            }
            classes.get(best).copied().unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeSet;

    /// Number of distinct leaves reached by the rows of `x`
    fn leaves_reached(tree: &DecisionTree, x: &Array2<f64>) -> usize {
        let proba = tree.predict_proba(x).unwrap();
        proba
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|p| p.to_bits()).collect::<Vec<_>>())
            .collect::<BTreeSet<_>>()
            .len()
    }

    #[test]
    fn test_classifier_simple() {
        let x = array![
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
        ];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new().with_random_state(0);
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(leaves_reached(&tree, &x), 2);
    }

    #[test]
    fn test_max_depth() {
        let x = array![
            [1.0, 1.0],
            [2.0, 2.0],
            [3.0, 3.0],
            [4.0, 4.0],
            [5.0, 1.0],
            [6.0, 2.0],
        ];
        let y = array![0, 1, 0, 1, 0, 1];

        let mut stump = DecisionTree::new().with_max_depth(1).with_random_state(0);
        stump.fit(&x, &y).unwrap();
        assert!(leaves_reached(&stump, &x) <= 2);

        let mut deep = DecisionTree::new().with_random_state(0);
        deep.fit(&x, &y).unwrap();
        assert_eq!(deep.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_min_samples_split_stops_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0, 1, 0, 1];

        let mut tree = DecisionTree::new().with_min_samples_split(10);
        tree.fit(&x, &y).unwrap();

        assert_eq!(leaves_reached(&tree, &x), 1);
        let proba = tree.predict_proba(&x).unwrap();
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[2, 2], 4), 0.5);
        assert_eq!(gini(&[3, 0], 3), 0.0);
        assert_eq!(gini(&[0, 0], 0), 0.0);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let x = array![[0.0], [0.0], [1.0], [1.0], [1.0]];
        let y = array![0, 1, 1, 1, 0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_feature_importances() {
        let x = array![
            [1.0, 0.0],
            [2.0, 0.0],
            [3.0, 0.0],
            [4.0, 0.0],
        ];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_fixed_class_list_pads_distribution() {
        let x = array![[0.0], [1.0]];
        let y = array![0, 0];

        let mut tree = DecisionTree::new();
        tree.fit_with_classes(&x, &y, &[0, 1]).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        assert_eq!(proba[[0, 1]], 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(PipelineError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_feature_count_mismatch() {
        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0, 1.0], [1.0, 0.0]], &array![0, 1]).unwrap();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(PipelineError::ShapeError { .. })
        ));
    }
}
