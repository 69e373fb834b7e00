//! Epoch-indexed scalar summaries.
//!
//! Every scalar is kept in memory per tag, logged at debug level, and
//! optionally appended as a JSON line to a summary file.

use crate::core::{now, Result, Split, Timestamp};
use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// One recorded scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub epoch: usize,
    pub value: f32,
    pub timestamp: Timestamp,
}

/// Scalar series keyed by tag.
#[derive(Debug, Default)]
pub struct SummaryWriter {
    series: BTreeMap<String, Vec<(usize, f32)>>,
    sink: Option<BufWriter<File>>,
}

impl SummaryWriter {
    /// In-memory writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that also appends JSON lines to `path`.
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            series: BTreeMap::new(),
            sink: Some(BufWriter::new(file)),
        })
    }

    /// Record one scalar.
    pub fn add_scalar(&mut self, tag: &str, value: f32, epoch: usize) -> Result<()> {
        debug!(tag, epoch, value, "scalar");
        self.series
            .entry(tag.to_string())
            .or_default()
            .push((epoch, value));

        if let Some(sink) = self.sink.as_mut() {
            let event = ScalarEvent {
                tag: tag.to_string(),
                epoch,
                value,
                timestamp: now(),
            };
            serde_json::to_writer(&mut *sink, &event)?;
            sink.write_all(b"\n")?;
            sink.flush()?;
        }
        Ok(())
    }

    /// Record the six standard scalars of one split.
    pub fn add_metrics(&mut self, split: Split, metrics: &MetricsRecord, epoch: usize) -> Result<()> {
        self.add_scalar(&format!("Acc_Loss/{}", split), metrics.loss, epoch)?;
        self.add_scalar(&format!("Acc_Loss/{}_acc", split), metrics.acc, epoch)?;
        self.add_scalar(&format!("F1/{}", split), metrics.f1, epoch)?;
        self.add_scalar(&format!("Precision/{}", split), metrics.precision, epoch)?;
        self.add_scalar(&format!("Recall/{}", split), metrics.recall, epoch)?;
        self.add_scalar(&format!("Auc/{}", split), metrics.auc, epoch)?;
        Ok(())
    }

    /// Recorded `(epoch, value)` pairs of a tag.
    pub fn series(&self, tag: &str) -> Option<&[(usize, f32)]> {
        self.series.get(tag).map(Vec::as_slice)
    }

    /// Most recent value of a tag.
    pub fn latest(&self, tag: &str) -> Option<f32> {
        self.series(tag).and_then(|s| s.last()).map(|&(_, v)| v)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }
}
