//! Classification metrics, confusion matrix and text report

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Label treated as the positive class for binary scores
pub const POSITIVE_CLASS: i64 = 1;

/// Metric bundle computed for every trial and for the final model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBundle {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub balanced_accuracy: f64,
    /// NaN when undefined
    pub roc_auc: f64,
}

impl MetricBundle {
    /// Compute every metric from labels and optional positive-class scores.
    ///
    /// Precision, recall and F1 are reported as 0 when their denominator is
    /// zero. ROC-AUC is NaN without scores or when `y_true` holds a single class.
    pub fn compute(
        y_true: &Array1<i64>,
        y_pred: &Array1<i64>,
        y_score: Option<&Array1<f64>>,
    ) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(PipelineError::ValidationError(
                "Cannot score an empty evaluation set".to_string()
            ));
        }

        let cm = ConfusionMatrix::from_labels(y_true, y_pred);
        let (tp, fp, fn_) = cm.binary_counts(POSITIVE_CLASS);

        let precision = safe_ratio(tp, tp + fp);
        let recall = safe_ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let roc_auc = match y_score {
            Some(scores) => roc_auc(y_true, scores)?,
            None => f64::NAN,
        };

        Ok(Self {
            accuracy: cm.accuracy(),
            precision,
            recall,
            f1_score,
            balanced_accuracy: cm.balanced_accuracy(),
            roc_auc,
        })
    }

    /// Metrics as named values; `accuracy_key` names the accuracy entry
    pub fn entries(&self, accuracy_key: &str) -> Vec<(String, f64)> {
        vec![
            (accuracy_key.to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1_score".to_string(), self.f1_score),
            ("balanced_accuracy".to_string(), self.balanced_accuracy),
            ("roc_auc".to_string(), self.roc_auc),
        ]
    }
}

fn safe_ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Area under the ROC curve via the rank-sum (Mann-Whitney U) statistic.
///
/// Tied scores receive the average of the ranks they span.
pub fn roc_auc(y_true: &Array1<i64>, y_score: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_score.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", y_score.len()),
        });
    }

    let distinct: BTreeSet<i64> = y_true.iter().copied().collect();
    if distinct.len() != 2 || !distinct.contains(&POSITIVE_CLASS) {
        return Ok(f64::NAN);
    }
    if y_score.iter().any(|s| !s.is_finite()) {
        return Ok(f64::NAN);
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut ranks = vec![0.0; order.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; a tie group spanning start..end shares the mean
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        start = end;
    }

    let n_pos = y_true.iter().filter(|&&y| y == POSITIVE_CLASS).count() as f64;
    let n_neg = y_true.len() as f64 - n_pos;
    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&y, _)| y == POSITIVE_CLASS)
        .map(|(_, &r)| r)
        .sum();

    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Confusion matrix; rows are true labels, columns predicted labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<i64>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build over the sorted union of true and predicted labels
    pub fn from_labels(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Self {
        let labels: Vec<i64> = y_true
            .iter()
            .chain(y_pred.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
                counts[i][j] += 1;
            }
        }

        Self { labels, counts }
    }

    fn index(&self, label: i64) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    /// Total number of scored rows
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.labels.len()).map(|i| self.counts[i][i]).sum();
        safe_ratio(correct, self.total())
    }

    /// Rows whose true label is `label`
    pub fn support(&self, label: i64) -> usize {
        self.index(label).map_or(0, |i| self.counts[i].iter().sum())
    }

    /// Rows predicted as `label`
    pub fn predicted(&self, label: i64) -> usize {
        self.index(label)
            .map_or(0, |j| self.counts.iter().map(|row| row[j]).sum())
    }

    /// (true positives, false positives, false negatives) for one label
    pub fn binary_counts(&self, label: i64) -> (usize, usize, usize) {
        let tp = self.index(label).map_or(0, |i| self.counts[i][i]);
        (tp, self.predicted(label) - tp, self.support(label) - tp)
    }

    /// Mean recall over the labels that occur in the true values
    pub fn balanced_accuracy(&self) -> f64 {
        let recalls: Vec<f64> = self
            .labels
            .iter()
            .filter(|&&label| self.support(label) > 0)
            .map(|&label| {
                let (tp, _, fn_) = self.binary_counts(label);
                safe_ratio(tp, tp + fn_)
            })
            .collect();

        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f64>() / recalls.len() as f64
        }
    }

    /// Per-label precision, recall, F1 and support
    pub fn label_scores(&self, label: i64) -> LabelScores {
        let (tp, fp, fn_) = self.binary_counts(label);
        let precision = safe_ratio(tp, tp + fp);
        let recall = safe_ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        LabelScores {
            precision,
            recall,
            f1_score,
            support: self.support(label),
        }
    }
}

/// Scores for one label of a classification report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelScores {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Plain-text report in the usual precision/recall/f1-score/support layout
pub fn classification_report(cm: &ConfusionMatrix) -> String {
    let names: Vec<String> = cm.labels.iter().map(|l| l.to_string()).collect();
    let width = names
        .iter()
        .map(|n| n.len())
        .chain(std::iter::once("weighted avg".len()))
        .max()
        .unwrap_or(12);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n",
        "", "precision", "recall", "f1-score", "support",
        width = width
    );

    let scores: Vec<LabelScores> = cm.labels.iter().map(|&l| cm.label_scores(l)).collect();
    for (name, s) in names.iter().zip(scores.iter()) {
        let _ = writeln!(
            out,
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
            name, s.precision, s.recall, s.f1_score, s.support,
            width = width
        );
    }
    out.push('\n');

    let total = cm.total();
    let _ = writeln!(
        out,
        "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy", "", "", cm.accuracy(), total,
        width = width
    );

    // Averages run over every label in the matrix, predicted-only ones included
    let n_labels = scores.len().max(1) as f64;
    let mut macro_avg = [0.0; 3];
    let mut weighted_avg = [0.0; 3];
    for s in &scores {
        let values = [s.precision, s.recall, s.f1_score];
        for k in 0..3 {
            macro_avg[k] += values[k] / n_labels;
            if total > 0 {
                weighted_avg[k] += values[k] * s.support as f64 / total as f64;
            }
        }
    }

    for (name, avg) in [("macro avg", macro_avg), ("weighted avg", weighted_avg)] {
        let _ = writeln!(
            out,
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
            name, avg[0], avg[1], avg[2], total,
            width = width
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_metric_bundle() {
        let y_true = array![1, 0, 1, 1, 0, 1, 0, 0];
        let y_pred = array![1, 0, 1, 0, 0, 1, 1, 0];

        let m = MetricBundle::compute(&y_true, &y_pred, None).unwrap();

        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
        assert!((m.balanced_accuracy - 0.75).abs() < 1e-12);
        assert!(m.roc_auc.is_nan());
    }

    #[test]
    fn test_zero_division_is_zero() {
        let y_true = array![0, 1, 0];
        let y_pred = array![0, 0, 0];

        let m = MetricBundle::compute(&y_true, &y_pred, None).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert!((m.balanced_accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_perfect_and_ties() {
        let y_true = array![0, 0, 1, 1];
        assert!((roc_auc(&y_true, &array![0.1, 0.2, 0.8, 0.9]).unwrap() - 1.0).abs() < 1e-12);
        assert!((roc_auc(&y_true, &array![0.5, 0.5, 0.5, 0.5]).unwrap() - 0.5).abs() < 1e-12);

        // sklearn: roc_auc_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) == 0.75
        assert!((roc_auc(&y_true, &array![0.1, 0.4, 0.35, 0.8]).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_single_class_is_nan() {
        let y_true = array![1, 1, 1];
        let scores = array![0.2, 0.4, 0.9];
        assert!(roc_auc(&y_true, &scores).unwrap().is_nan());

        let m = MetricBundle::compute(&y_true, &array![1, 1, 1], Some(&scores)).unwrap();
        assert!(m.roc_auc.is_nan());
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_confusion_matrix() {
        let y_true = array![0, 0, 1, 1, 1];
        let y_pred = array![0, 1, 1, 1, 0];

        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred);
        assert_eq!(cm.labels, vec![0, 1]);
        assert_eq!(cm.counts, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(cm.binary_counts(1), (2, 1, 1));
    }

    #[test]
    fn test_classification_report_layout() {
        let y_true = array![0, 0, 1, 1];
        let y_pred = array![0, 0, 1, 0];

        let report = classification_report(&ConfusionMatrix::from_labels(&y_true, &y_pred));
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "              precision    recall  f1-score   support");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "           0       0.67      1.00      0.80         2");
        assert_eq!(lines[3], "           1       1.00      0.50      0.67         2");
        assert_eq!(lines[5], "    accuracy                           0.75         4");
        assert_eq!(lines[6], "   macro avg       0.83      0.75      0.73         4");
        assert_eq!(lines[7], "weighted avg       0.83      0.75      0.73         4");
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            MetricBundle::compute(&array![0, 1], &array![0], None),
            Err(PipelineError::ShapeError { .. })
        ));
    }
}
