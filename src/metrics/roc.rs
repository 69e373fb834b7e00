//! Receiver operating characteristic.

use crate::core::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// ROC points ordered by decreasing threshold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f32>,
    pub tpr: Vec<f32>,
    /// First threshold is `+inf` so the curve starts at (0, 0)
    pub thresholds: Vec<f32>,
}

impl RocCurve {
    /// Area under the curve by the trapezoidal rule.
    pub fn auc(&self) -> f32 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }
}

#[derive(Serialize)]
struct RocRow {
    fpr: f32,
    tpr: f32,
    thresholds: f32,
}

/// ROC curve of binary `y_true` (0/1) against scores.
pub fn roc_curve(y_true: &[u8], y_score: &[f32]) -> Result<RocCurve> {
    if y_true.len() != y_score.len() {
        return Err(Error::MetricsComputation(format!(
            "{} labels but {} scores",
            y_true.len(),
            y_score.len()
        )));
    }
    let positives = y_true.iter().filter(|&&y| y != 0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::MetricsComputation(
            "ROC needs both positive and negative samples".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| {
        y_score[b]
            .partial_cmp(&y_score[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f32::INFINITY],
    };
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &i) in order.iter().enumerate() {
        if y_true[i] != 0 {
            tp += 1;
        } else {
            fp += 1;
        }
        // only emit a point once all samples tied at this score are counted
        let last_of_tie = order
            .get(k + 1)
            .map_or(true, |&next| y_score[next] != y_score[i]);
        if last_of_tie {
            curve.fpr.push(fp as f32 / negatives as f32);
            curve.tpr.push(tp as f32 / positives as f32);
            curve.thresholds.push(y_score[i]);
        }
    }
    Ok(curve)
}

/// Binary ROC AUC.
pub fn roc_auc_score(y_true: &[u8], y_score: &[f32]) -> Result<f32> {
    Ok(roc_curve(y_true, y_score)?.auc())
}

/// Write a curve as `fpr,tpr,thresholds` rows.
pub fn write_roc_csv(path: &Path, curve: &RocCurve) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for ((&fpr, &tpr), &threshold) in curve
        .fpr
        .iter()
        .zip(curve.tpr.iter())
        .zip(curve.thresholds.iter())
    {
        writer.serialize(RocRow {
            fpr,
            tpr,
            thresholds: threshold,
        })?;
    }
    writer.flush()?;
    Ok(())
}
