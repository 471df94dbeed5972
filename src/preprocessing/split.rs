//! Stratified train/test splitting and training-set rebalancing

use super::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::synthetic::{class_indices, ResampleResult, Sampler, SMOTE};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::info;

/// Features and target partitioned into train and test rows
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<i64>,
    pub y_test: Array1<i64>,
}

impl TrainTestSplit {
    /// Replace the training partition, keeping the test partition untouched
    pub fn with_training(mut self, x_train: Array2<f64>, y_train: Array1<i64>) -> Result<Self> {
        if x_train.nrows() != y_train.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x_train.nrows()),
                actual: format!("y length = {}", y_train.len()),
            });
        }
        self.x_train = x_train;
        self.y_train = y_train;
        Ok(self)
    }
}

fn encode_target(column: &str, values: &[f64]) -> Result<Array1<i64>> {
    values
        .iter()
        .map(|&v| {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(v as i64)
            } else {
                Err(PipelineError::DataError(format!(
                    "target column '{}' holds non-integral value {}",
                    column, v
                )))
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

struct Allocation {
    class: i64,
    size: usize,
    exact: f64,
    count: usize,
}

/// Number of test rows per class: proportional allocation with
/// largest-remainder rounding, then rebalanced so both partitions keep at
/// least one row of every class while the test total stays at `n_test`.
///
/// Callers guarantee every class has 2+ rows and `n_classes <= n_test <= n_total - n_classes`.
fn allocate_test_rows(class_sizes: &BTreeMap<i64, usize>, n_total: usize, n_test: usize) -> BTreeMap<i64, usize> {
    let mut alloc: Vec<Allocation> = class_sizes
        .iter()
        .map(|(&class, &size)| {
            let exact = n_test as f64 * size as f64 / n_total as f64;
            Allocation { class, size, exact, count: exact.floor() as usize }
        })
        .collect();

    let assigned: usize = alloc.iter().map(|a| a.count).sum();
    let mut remaining = n_test.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..alloc.len()).collect();
    order.sort_by(|&a, &b| {
        let rem_a = alloc[a].exact - alloc[a].exact.floor();
        let rem_b = alloc[b].exact - alloc[b].exact.floor();
        rem_b
            .total_cmp(&rem_a)
            .then(alloc[b].size.cmp(&alloc[a].size))
            .then(alloc[a].class.cmp(&alloc[b].class))
    });
    for idx in order {
        if remaining == 0 {
            break;
        }
        alloc[idx].count += 1;
        remaining -= 1;
    }

    for a in alloc.iter_mut() {
        a.count = a.count.clamp(1, a.size - 1);
    }

    let mut total: usize = alloc.iter().map(|a| a.count).sum();
    while total > n_test {
        let Some(a) = alloc
            .iter_mut()
            .filter(|a| a.count > 1)
            .max_by(|a, b| (a.count as f64 - a.exact).total_cmp(&(b.count as f64 - b.exact)))
        else {
            break;
        };
        a.count -= 1;
        total -= 1;
    }
    while total < n_test {
        let Some(a) = alloc
            .iter_mut()
            .filter(|a| a.count + 1 < a.size)
            .max_by(|a, b| (a.exact - a.count as f64).total_cmp(&(b.exact - b.count as f64)))
        else {
            break;
        };
        a.count += 1;
        total += 1;
    }

    alloc.into_iter().map(|a| (a.class, a.count)).collect()
}

/// Split a dataset into stratified train/test partitions.
///
/// Every class needs at least two rows, and both partitions must be able to
/// hold one row of every class.
pub fn train_test_split(
    dataset: &Dataset,
    target: &str,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::ValidationError(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let (feature_names, x, raw_y) = dataset.features_and_target(target)?;
    let y = encode_target(target, &raw_y)?;
    let n = y.len();

    let by_class = class_indices(&y);
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(PipelineError::ValidationError(format!(
            "the least populated class in '{}' ({}) has only {} member; stratification needs at least 2",
            target,
            class,
            rows.len()
        )));
    }

    let n_classes = by_class.len();
    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n - n_test;
    if n_test < n_classes || n_train < n_classes {
        return Err(PipelineError::ValidationError(format!(
            "train size {} and test size {} must both be at least the number of classes {}",
            n_train, n_test, n_classes
        )));
    }

    let sizes: BTreeMap<i64, usize> = by_class.iter().map(|(&c, rows)| (c, rows.len())).collect();
    let test_counts = allocate_test_rows(&sizes, n, n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_rows = Vec::with_capacity(n_train);
    let mut test_rows = Vec::with_capacity(n_test);

    for (class, rows) in &by_class {
        let mut rows = rows.clone();
        rows.shuffle(&mut rng);
        let k = test_counts[class];
        test_rows.extend_from_slice(&rows[..k]);
        train_rows.extend_from_slice(&rows[k..]);
    }

    train_rows.shuffle(&mut rng);
    test_rows.shuffle(&mut rng);

    info!(
        train = train_rows.len(),
        test = test_rows.len(),
        classes = n_classes,
        "Stratified split"
    );

    Ok(TrainTestSplit {
        feature_names,
        x_train: x.select(Axis(0), &train_rows),
        x_test: x.select(Axis(0), &test_rows),
        y_train: train_rows.iter().map(|&i| y[i]).collect(),
        y_test: test_rows.iter().map(|&i| y[i]).collect(),
    })
}

/// Prepares a cleaned dataset for model training
pub struct DataPreprocessor<'a> {
    dataset: &'a Dataset,
    target: String,
    k_neighbors: usize,
}

impl<'a> DataPreprocessor<'a> {
    /// Create a preprocessor for the given target column
    pub fn new(dataset: &'a Dataset, target: impl Into<String>) -> Self {
        Self {
            dataset,
            target: target.into(),
            k_neighbors: 5,
        }
    }

    /// Set the SMOTE neighbour count
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Stratified train/test split on the target column
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
        train_test_split(self.dataset, &self.target, test_fraction, seed)
    }

    /// Oversample the minority class of the training partition until classes are equal
    pub fn balance(&self, x_train: &Array2<f64>, y_train: &Array1<i64>, seed: u64) -> Result<ResampleResult> {
        let mut smote = SMOTE::new()
            .with_k_neighbors(self.k_neighbors)
            .with_seed(seed);
        let result = smote.fit_resample(x_train, y_train)?;
        info!(
            before = x_train.nrows(),
            after = result.x.nrows(),
            synthetic = result.n_synthetic.iter().sum::<usize>(),
            "Balanced training set"
        );
        Ok(result)
    }

    /// Split, then rebalance only the training partition
    pub fn split_and_balance(&self, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
        let split = self.split(test_fraction, seed)?;
        let balanced = self.balance(&split.x_train, &split.y_train, seed)?;
        split.with_training(balanced.x, balanced.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn imbalanced(n0: usize, n1: usize) -> Dataset {
        let n = n0 + n1;
        let ids: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
        let target: Vec<f64> = (0..n).map(|i| if i < n0 { 0.0 } else { 1.0 }).collect();
        Dataset::from_columns(vec![("id", ids), ("noise", noise), ("Potability", target)]).unwrap()
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let ds = imbalanced(60, 40);
        let split = train_test_split(&ds, "Potability", 0.2, 42).unwrap();

        assert_eq!(split.x_train.nrows() + split.x_test.nrows(), 100);
        assert_eq!(split.x_test.nrows(), 20);

        let train_ids: HashSet<i64> = split.x_train.column(0).iter().map(|&v| v as i64).collect();
        let test_ids: HashSet<i64> = split.x_test.column(0).iter().map(|&v| v as i64).collect();
        assert!(train_ids.is_disjoint(&test_ids));
        let union: HashSet<i64> = train_ids.union(&test_ids).copied().collect();
        assert_eq!(union, (0..100).collect());
    }

    #[test]
    fn test_split_preserves_proportions() {
        let ds = imbalanced(70, 30);
        let split = train_test_split(&ds, "Potability", 0.2, 7).unwrap();

        let test_pos = split.y_test.iter().filter(|&&c| c == 1).count();
        let train_pos = split.y_train.iter().filter(|&&c| c == 1).count();
        assert_eq!(test_pos, 6);
        assert_eq!(train_pos, 24);
    }

    #[test]
    fn test_split_rows_follow_labels() {
        let ds = imbalanced(10, 10);
        let split = train_test_split(&ds, "Potability", 0.25, 3).unwrap();
        for (row, &label) in split.x_train.rows().into_iter().zip(split.y_train.iter()) {
            let expected = if row[0] < 10.0 { 0 } else { 1 };
            assert_eq!(label, expected);
        }
    }

    #[test]
    fn test_split_is_seeded() {
        let ds = imbalanced(30, 20);
        let a = train_test_split(&ds, "Potability", 0.2, 42).unwrap();
        let b = train_test_split(&ds, "Potability", 0.2, 42).unwrap();
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn test_single_member_class_fails() {
        let ds = Dataset::from_columns(vec![
            ("ph", vec![7.0, 6.8, 6.5]),
            ("Hardness", vec![200.0, 180.0, 160.0]),
            ("Potability", vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let err = train_test_split(&ds, "Potability", 0.2, 42).unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }

    #[test]
    fn test_too_small_test_partition_fails() {
        let ds = imbalanced(2, 2);
        let err = train_test_split(&ds, "Potability", 0.2, 42).unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }

    #[test]
    fn test_non_integral_target_fails() {
        let ds = Dataset::from_columns(vec![
            ("a", vec![1.0, 2.0, 3.0, 4.0]),
            ("t", vec![0.0, 0.5, 1.0, 1.0]),
        ])
        .unwrap();
        assert!(matches!(
            train_test_split(&ds, "t", 0.5, 1),
            Err(PipelineError::DataError(_))
        ));
    }

    #[test]
    fn test_split_and_balance_keeps_test_untouched() {
        let ds = imbalanced(40, 10);
        let pre = DataPreprocessor::new(&ds, "Potability");
        let plain = pre.split(0.2, 42).unwrap();
        let balanced = pre.split_and_balance(0.2, 42).unwrap();

        assert_eq!(plain.x_test, balanced.x_test);
        assert_eq!(plain.y_test, balanced.y_test);
        assert!(balanced.x_train.nrows() >= plain.x_train.nrows());

        let zeros = balanced.y_train.iter().filter(|&&c| c == 0).count();
        let ones = balanced.y_train.iter().filter(|&&c| c == 1).count();
        assert_eq!(zeros, ones);
    }

    #[test]
    fn test_allocation_clamps_to_partitions() {
        let sizes: BTreeMap<i64, usize> = [(0, 97), (1, 3)].into_iter().collect();
        let alloc = allocate_test_rows(&sizes, 100, 10);
        assert_eq!(alloc[&1], 1);
        assert_eq!(alloc[&0], 9);
    }
}
