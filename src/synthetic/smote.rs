//! SMOTE oversampling

use crate::error::{PipelineError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Every class is oversampled up to the majority count. Synthetic rows lie
/// on the segment between a class member and one of its `k` nearest
/// same-class neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Random seed
    seed: Option<u64>,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    /// Create new SMOTE sampler
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: None,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Neighbour count actually usable for a class of `class_size` members
    pub fn effective_k(&self, class_size: usize) -> usize {
        self.k_neighbors.min(class_size.saturating_sub(1))
    }

    fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum()
    }

    /// k nearest neighbours of `data[idx]` within `data`, excluding itself
    fn find_neighbors(idx: usize, data: &[Vec<f64>], k: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
        let point = &data[idx];

        for (i, d) in data.iter().enumerate() {
            if i == idx {
                continue;
            }
            let dist = Self::squared_distance(point, d);
            if heap.len() < k {
                heap.push(DistIdx(dist, i));
            } else if let Some(&DistIdx(max_dist, _)) = heap.peek() {
                if dist < max_dist {
                    heap.pop();
                    heap.push(DistIdx(dist, i));
                }
            }
        }

        let mut neighbors: Vec<DistIdx> = heap.into_vec();
        neighbors.sort();
        neighbors.into_iter().map(|DistIdx(_, i)| i).collect()
    }

    /// Generate synthetic sample between two points
    fn generate_sample(point: &[f64], neighbor: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
        let gap: f64 = rng.gen();
        point.iter()
            .zip(neighbor.iter())
            .map(|(&p, &n)| p + gap * (n - p))
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(PipelineError::ValidationError(
                "Need at least 2 classes for SMOTE".to_string()
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        let targets = counts.keys().map(|&class| (class, max_count)).collect();

        self.target_counts = Some(targets);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or_else(|| {
            PipelineError::ValidationError("SMOTE not fitted".to_string())
        })?;

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        // Collect only synthetic samples (original data reused from x directly)
        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = Vec::new();

        for (&class, &target_count) in targets {
            let class_idx = match indices.get(&class) {
                Some(idx) => idx,
                None => {
                    n_synthetic.push(0);
                    continue;
                }
            };
            let n_to_generate = target_count.saturating_sub(class_idx.len());

            if n_to_generate == 0 {
                n_synthetic.push(0);
                continue;
            }

            let class_samples: Vec<Vec<f64>> = class_idx.iter()
                .map(|&i| x.row(i).to_vec())
                .collect();

            let k = self.effective_k(class_samples.len());
            let neighbor_table: Vec<Vec<usize>> = if k == 0 {
                vec![Vec::new(); class_samples.len()]
            } else {
                (0..class_samples.len())
                    .map(|i| Self::find_neighbors(i, &class_samples, k))
                    .collect()
            };

            for _ in 0..n_to_generate {
                let idx = rng.gen_range(0..class_samples.len());
                let sample = &class_samples[idx];

                // A lone member has no neighbour to interpolate towards
                let row = match neighbor_table[idx].choose(&mut rng) {
                    Some(&n) => Self::generate_sample(sample, &class_samples[n], &mut rng),
                    None => sample.clone(),
                };

                synthetic_x.push(row);
                synthetic_y.push(class);
            }

            n_synthetic.push(n_to_generate);
        }

        // Build result: original rows + synthetic rows
        let n_original = x.nrows();
        let n_total = n_original + synthetic_x.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[i - n_original][j]
            }
        });

        let mut all_y: Vec<i64> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // 20 majority rows around (0, 0), 5 minority rows around (10, 10)
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }

        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        let x = Array2::from_shape_vec((25, 2), data).unwrap();
        let y = Array1::from_vec(labels);

        (x, y)
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();

        let mut smote = SMOTE::new()
            .with_k_neighbors(3)
            .with_seed(42);

        let result = smote.fit_resample(&x, &y).unwrap();

        assert_eq!(result.x.nrows(), 40);
        assert_eq!(result.y.len(), 40);

        let new_counts = class_counts(&result.y);
        assert_eq!(new_counts[&0], 20);
        assert_eq!(new_counts[&1], 20);
        assert_eq!(result.n_synthetic, vec![0, 15]);
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();
        let original_rows = x.nrows();

        let mut smote = SMOTE::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..original_rows {
            for j in 0..x.ncols() {
                assert_eq!(result.x[[i, j]], x[[i, j]]);
            }
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_synthetic_rows_stay_in_minority_hull() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in x.nrows()..result.x.nrows() {
            assert_eq!(result.y[i], 1);
            assert!(result.x[[i, 0]] >= 10.0 && result.x[[i, 0]] <= 12.0);
            assert!(result.x[[i, 1]] >= 10.0 && result.x[[i, 1]] <= 11.0);
        }
    }

    #[test]
    fn test_k_clamped_to_minority_size() {
        // Minority of 3 with the default k = 5
        let x = array![[0.0], [0.1], [0.2], [0.3], [0.4], [0.5], [5.0], [5.5], [6.0]];
        let y = array![0, 0, 0, 0, 0, 0, 1, 1, 1];

        let smote = SMOTE::new();
        assert_eq!(smote.effective_k(3), 2);

        let mut smote = smote.with_seed(1);
        let result = smote.fit_resample(&x, &y).unwrap();
        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], counts[&1]);
    }

    #[test]
    fn test_single_member_class_is_duplicated() {
        let x = array![[0.0, 1.0], [0.5, 1.5], [9.0, 9.0]];
        let y = array![0, 0, 1];

        let mut smote = SMOTE::new().with_seed(3);
        let result = smote.fit_resample(&x, &y).unwrap();

        assert_eq!(result.x.nrows(), 4);
        assert_eq!(result.x.row(3).to_vec(), vec![9.0, 9.0]);
    }

    #[test]
    fn test_duplicate_points_terminate() {
        let x = array![[1.0], [1.0], [1.0], [2.0], [2.0], [2.0], [2.0], [2.0]];
        let y = array![1, 1, 1, 0, 0, 0, 0, 0];

        let mut smote = SMOTE::new().with_seed(11);
        let result = smote.fit_resample(&x, &y).unwrap();
        assert_eq!(result.x.nrows(), 10);
        for i in 8..10 {
            assert_eq!(result.x[[i, 0]], 1.0);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![0, 0];
        let mut smote = SMOTE::new();
        assert!(matches!(
            smote.fit_resample(&x, &y),
            Err(PipelineError::ValidationError(_))
        ));
    }
}
