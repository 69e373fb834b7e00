//! Metrics Engine
//!
//! Scores an epoch's raw 2-way logits against integer labels. Pure: no
//! inputs are mutated and the only side effect is a warning log when AUC
//! cannot be computed.

pub mod roc;

pub use roc::{roc_auc_score, roc_curve, write_roc_csv, RocCurve};

use crate::core::{Error, Result, NUM_CLASSES};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scores for one split at one evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub acc: f32,
    pub f1: f32,
    pub precision: f32,
    pub recall: f32,
    /// Confusion matrix, newlines replaced with commas
    pub confusion: String,
    pub auc: f32,
    /// Count of each present label, e.g. `[5 5]`
    pub label_distribution: String,
    /// Mean loss, attached by the caller
    pub loss: f32,
}

impl MetricsRecord {
    /// Attach the split's mean loss.
    pub fn with_loss(mut self, loss: f32) -> Self {
        self.loss = loss;
        self
    }
}

/// 2x2 confusion counts; rows are true labels, columns predictions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub counts: [[usize; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], preds: &[u8]) -> Self {
        let mut counts = [[0usize; NUM_CLASSES]; NUM_CLASSES];
        for (&y, &p) in labels.iter().zip(preds.iter()) {
            counts[usize::from(y).min(1)][usize::from(p).min(1)] += 1;
        }
        Self { counts }
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    /// Flat CSV-safe rendering: `[[2 0], [0 2]]`.
    pub fn to_flat_string(&self) -> String {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        let rows: Vec<String> = self
            .counts
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| format!("{:>w$}", c, w = width)).collect();
                format!("[{}]", cells.join(" "))
            })
            .collect();
        format!("[{}]", rows.join(", "))
    }
}

/// Index of the larger logit (first wins ties).
pub fn argmax(logits: &[f32; NUM_CLASSES]) -> u8 {
    if logits[1] > logits[0] {
        1
    } else {
        0
    }
}

/// One-hot encode labels into a fixed `n_classes`-column matrix.
pub fn encode_onehot(labels: &[u8], n_classes: usize) -> Vec<Vec<u8>> {
    labels
        .iter()
        .map(|&y| {
            let mut row = vec![0u8; n_classes];
            if let Some(slot) = row.get_mut(usize::from(y)) {
                *slot = 1;
            }
            row
        })
        .collect()
}

/// Micro-averaged one-vs-rest AUC of one-hot labels against raw logits.
pub fn micro_auc(outputs: &[[f32; NUM_CLASSES]], labels: &[u8]) -> Result<f32> {
    if labels.is_empty() {
        return Err(Error::MetricsComputation(
            "no samples to score".to_string(),
        ));
    }
    if labels.iter().all(|&y| y == labels[0]) {
        return Err(Error::MetricsComputation(format!(
            "only one class present in y_true ({}); ROC AUC score is not defined",
            labels[0]
        )));
    }
    let onehot = encode_onehot(labels, NUM_CLASSES);
    let y_true: Vec<u8> = onehot.into_iter().flatten().collect();
    let y_score: Vec<f32> = outputs.iter().flat_map(|o| o.iter().copied()).collect();
    roc_auc_score(&y_true, &y_score)
}

/// Positive-class scores with the logit column scaled to unit L2 norm.
pub fn risk_scores(outputs: &[[f32; NUM_CLASSES]]) -> Vec<f32> {
    let norm = outputs.iter().map(|o| o[1] * o[1]).sum::<f32>().sqrt();
    outputs
        .iter()
        .map(|o| if norm > 0.0 { o[1] / norm } else { o[1] })
        .collect()
}

/// ROC curve of the positive class.
pub fn positive_class_roc(outputs: &[[f32; NUM_CLASSES]], labels: &[u8]) -> Result<RocCurve> {
    roc_curve(labels, &risk_scores(outputs))
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

fn label_distribution(labels: &[u8]) -> String {
    let mut counts = [0usize; NUM_CLASSES];
    for &y in labels {
        counts[usize::from(y).min(1)] += 1;
    }
    let present: Vec<String> = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|c| c.to_string())
        .collect();
    format!("[{}]", present.join(" "))
}

/// Score raw logits against labels.
pub fn score(outputs: &[[f32; NUM_CLASSES]], labels: &[u8]) -> MetricsRecord {
    let preds: Vec<u8> = outputs.iter().map(argmax).collect();
    let confusion = ConfusionMatrix::from_predictions(labels, &preds);

    let tp = confusion.true_positives();
    let fp = confusion.false_positives();
    let fn_ = confusion.false_negatives();
    let correct = tp + confusion.true_negatives();

    let auc = match micro_auc(outputs, labels) {
        Ok(auc) => auc,
        Err(err) => {
            warn!(error = %err, "error calculating AUC, reporting 0.0");
            0.0
        }
    };

    MetricsRecord {
        acc: ratio(correct, labels.len()),
        f1: ratio(2 * tp, 2 * tp + fp + fn_),
        precision: ratio(tp, tp + fp),
        recall: ratio(tp, tp + fn_),
        confusion: confusion.to_flat_string(),
        auc,
        label_distribution: label_distribution(labels),
        loss: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_separation() {
        let outputs = [[2.0, 0.0], [0.0, 2.0], [2.0, 0.0], [0.0, 2.0]];
        let labels = [0, 1, 0, 1];
        let m = score(&outputs, &labels);

        assert_eq!(m.acc, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.confusion, "[[2 0], [0 2]]");
        assert!((m.auc - 1.0).abs() < 1e-6);
        assert_eq!(m.label_distribution, "[2 2]");
    }

    #[test]
    fn test_single_class_auc_degrades_to_zero() {
        let outputs = [[0.3, 0.1], [0.2, 0.9], [1.0, -1.0]];
        let labels = [1, 1, 1];
        let m = score(&outputs, &labels);

        assert_eq!(m.auc, 0.0);
        assert!((m.acc - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(m.label_distribution, "[3]");
    }

    #[test]
    fn test_micro_auc_errors() {
        assert!(matches!(
            micro_auc(&[], &[]),
            Err(Error::MetricsComputation(_))
        ));
        assert!(matches!(
            micro_auc(&[[0.0, 1.0]], &[0]),
            Err(Error::MetricsComputation(_))
        ));
    }

    #[test]
    fn test_precision_recall_f1() {
        // preds: 1, 1, 0, 0, 1 ; labels: 1, 0, 1, 0, 1
        let outputs = [[0.0, 1.0], [0.0, 1.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let labels = [1, 0, 1, 0, 1];
        let m = score(&outputs, &labels);

        // tp = 2, fp = 1, fn = 1, tn = 1
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-6);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-6);
        assert!((m.acc - 0.6).abs() < 1e-6);
        assert_eq!(m.confusion, "[[1 1], [1 2]]");
    }

    #[test]
    fn test_no_positive_predictions() {
        let outputs = [[1.0, 0.0], [1.0, 0.0]];
        let labels = [0, 1];
        let m = score(&outputs, &labels);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn test_confusion_padding() {
        let cm = ConfusionMatrix {
            counts: [[10, 0], [3, 7]],
        };
        assert_eq!(cm.to_flat_string(), "[[10  0], [ 3  7]]");
        assert!(!cm.to_flat_string().contains('\n'));
    }

    #[test]
    fn test_onehot_fixed_columns() {
        let onehot = encode_onehot(&[1, 1], 2);
        assert_eq!(onehot, vec![vec![0, 1], vec![0, 1]]);
    }

    #[test]
    fn test_inputs_untouched() {
        let outputs = vec![[0.4, 0.6], [0.9, 0.1]];
        let labels = vec![1, 0];
        let (o, l) = (outputs.clone(), labels.clone());
        let _ = score(&outputs, &labels);
        assert_eq!(outputs, o);
        assert_eq!(labels, l);
    }

    #[test]
    fn test_risk_scores_unit_norm() {
        let scores = risk_scores(&[[0.0, 3.0], [1.0, 4.0]]);
        assert!((scores[0] - 0.6).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);

        let curve = positive_class_roc(&[[0.0, 3.0], [1.0, 4.0]], &[0, 1]).unwrap();
        assert!((curve.auc() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_with_loss() {
        let m = score(&[[0.0, 1.0], [1.0, 0.0]], &[1, 0]).with_loss(0.25);
        assert_eq!(m.loss, 0.25);
    }
}
