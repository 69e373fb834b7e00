//! Class-weighted cross-entropy.

use crate::core::NUM_CLASSES;
use crate::model::tensor::softmax;
use tracing::debug;

/// Balanced class weights over the labels present: `n / (classes * count_c)`.
///
/// The result has one entry per distinct label, in ascending label order.
pub fn compute_class_weights(labels: &[u8]) -> Vec<f32> {
    let mut counts = [0usize; NUM_CLASSES];
    for &y in labels {
        counts[usize::from(y).min(NUM_CLASSES - 1)] += 1;
    }
    let present: Vec<usize> = counts.iter().copied().filter(|&c| c > 0).collect();
    let n = labels.len() as f32;
    let classes = present.len() as f32;
    present.iter().map(|&c| n / (classes * c as f32)).collect()
}

/// Cross-entropy over 2-way logits with optional per-class weights.
///
/// Weighted reduction follows the usual weighted-mean convention:
/// `sum(w_y * nll) / sum(w_y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedCrossEntropy {
    weights: Option<[f32; NUM_CLASSES]>,
}

impl WeightedCrossEntropy {
    pub fn unweighted() -> Self {
        Self { weights: None }
    }

    /// Weighted when both classes carry a weight, unweighted otherwise.
    pub fn from_class_weights(class_weights: &[f32]) -> Self {
        if class_weights.len() < NUM_CLASSES {
            debug!("Fewer than two classes present, using unweighted cross-entropy");
            return Self::unweighted();
        }
        Self {
            weights: Some([class_weights[0], class_weights[1]]),
        }
    }

    pub fn weights(&self) -> Option<[f32; NUM_CLASSES]> {
        self.weights
    }

    fn weight(&self, label: u8) -> f32 {
        self.weights
            .map_or(1.0, |w| w[usize::from(label).min(NUM_CLASSES - 1)])
    }

    /// Mean loss over a batch.
    pub fn loss(&self, logits: &[[f32; NUM_CLASSES]], labels: &[u8]) -> f32 {
        self.loss_and_grad(logits, labels).0
    }

    /// Mean loss and its gradient with respect to every logit row.
    pub fn loss_and_grad(
        &self,
        logits: &[[f32; NUM_CLASSES]],
        labels: &[u8],
    ) -> (f32, Vec<[f32; NUM_CLASSES]>) {
        let total_weight: f32 = labels.iter().map(|&y| self.weight(y)).sum();
        if total_weight <= 0.0 {
            return (0.0, vec![[0.0; NUM_CLASSES]; logits.len()]);
        }

        let mut loss = 0.0;
        let mut grads = Vec::with_capacity(logits.len());
        for (row, &y) in logits.iter().zip(labels) {
            let w = self.weight(y);
            let probs = softmax(row);
            let target = usize::from(y).min(NUM_CLASSES - 1);
            loss += -w * probs[target].max(f32::MIN_POSITIVE).ln();

            let mut grad = [0.0; NUM_CLASSES];
            for (c, g) in grad.iter_mut().enumerate() {
                let onehot = if c == target { 1.0 } else { 0.0 };
                *g = w * (probs[c] - onehot) / total_weight;
            }
            grads.push(grad);
        }
        (loss / total_weight, grads)
    }
}
