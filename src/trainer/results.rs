//! Best-result table keyed by run configuration.
//!
//! One row per distinct configuration string. Rows are inserted on the first
//! improvement and overwritten in place afterwards; they are never deleted.
//! The CSV store is read-modify-write without locking, so concurrent writers
//! to the same file can clobber each other's rows.

use crate::core::{Error, Result};
use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One row of the best-result table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestResultRecord {
    /// Serialized run configuration (row key)
    pub config: String,
    /// Command line that produced the run
    pub invocation: String,
    pub epoch: usize,
    pub val_loss: f32,
    pub val_acc: f32,
    pub val_conf: String,
    pub val_auc: f32,
    pub val_precision: f32,
    pub val_recall: f32,
    pub train_loss: f32,
    pub train_acc: f32,
    pub train_conf: String,
    pub train_auc: f32,
    pub train_precision: f32,
    pub train_recall: f32,
}

impl BestResultRecord {
    pub fn new(
        config: String,
        invocation: String,
        epoch: usize,
        train: &MetricsRecord,
        test: &MetricsRecord,
    ) -> Self {
        Self {
            config,
            invocation,
            epoch,
            val_loss: test.loss,
            val_acc: test.acc,
            val_conf: test.confusion.clone(),
            val_auc: test.auc,
            val_precision: test.precision,
            val_recall: test.recall,
            train_loss: train.loss,
            train_acc: train.acc,
            train_conf: train.confusion.clone(),
            train_auc: train.auc,
            train_precision: train.precision,
            train_recall: train.recall,
        }
    }
}

/// What an upsert did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Keyed row store of best results.
pub trait ResultStore {
    /// Insert a row, or replace the row with the same `config` key.
    fn upsert(&mut self, record: BestResultRecord) -> Result<UpsertOutcome>;

    /// All rows in table order.
    fn rows(&self) -> Result<Vec<BestResultRecord>>;

    /// Row for a configuration key.
    fn find(&self, config: &str) -> Result<Option<BestResultRecord>> {
        Ok(self.rows()?.into_iter().find(|r| r.config == config))
    }
}

/// In-memory store.
#[derive(Clone, Debug, Default)]
pub struct MemoryResultStore {
    rows: Vec<BestResultRecord>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn upsert(&mut self, record: BestResultRecord) -> Result<UpsertOutcome> {
        match self.rows.iter_mut().find(|r| r.config == record.config) {
            Some(row) => {
                *row = record;
                Ok(UpsertOutcome::Replaced)
            }
            None => {
                self.rows.push(record);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn rows(&self) -> Result<Vec<BestResultRecord>> {
        Ok(self.rows.clone())
    }
}

/// CSV file store with a header row.
#[derive(Clone, Debug)]
pub struct CsvResultStore {
    path: PathBuf,
}

impl CsvResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or zero-length; such a file has no header yet.
    fn is_blank(&self) -> bool {
        std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0)
    }

    fn rewrite(&self, rows: &[BestResultRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn append(&self, record: &BestResultRecord) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}

impl ResultStore for CsvResultStore {
    fn upsert(&mut self, record: BestResultRecord) -> Result<UpsertOutcome> {
        if self.is_blank() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            self.rewrite(std::slice::from_ref(&record))?;
            return Ok(UpsertOutcome::Inserted);
        }

        let mut rows = self.rows()?;
        match rows.iter_mut().find(|r| r.config == record.config) {
            Some(row) => {
                *row = record;
                self.rewrite(&rows)?;
                Ok(UpsertOutcome::Replaced)
            }
            None => {
                self.append(&record)?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn rows(&self) -> Result<Vec<BestResultRecord>> {
        if self.is_blank() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        reader
            .deserialize::<BestResultRecord>()
            .map(|row| {
                row.map_err(|e| {
                    Error::ResultsTable(format!("{}: {}", self.path.display(), e))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(loss: f32) -> MetricsRecord {
        MetricsRecord {
            acc: 0.5,
            f1: 0.5,
            precision: 0.5,
            recall: 0.5,
            confusion: "[[1 1], [1 1]]".into(),
            auc: 0.5,
            label_distribution: "[2 2]".into(),
            loss,
        }
    }

    fn record(config: &str, epoch: usize, val_loss: f32) -> BestResultRecord {
        BestResultRecord::new(
            config.to_string(),
            "dynkg train --epochs 5".to_string(),
            epoch,
            &metrics(0.9),
            &metrics(val_loss),
        )
    }

    fn exercise(store: &mut dyn ResultStore) {
        let c1 = r#"{"seed":0,"model":"mrgcn"}"#;
        let c2 = r#"{"seed":1,"model":"mrgcn"}"#;

        assert_eq!(store.upsert(record(c1, 0, 0.8)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(record(c1, 10, 0.6)).unwrap(), UpsertOutcome::Replaced);
        assert_eq!(store.rows().unwrap().len(), 1);

        assert_eq!(store.upsert(record(c2, 0, 0.7)).unwrap(), UpsertOutcome::Inserted);
        let rows = store.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].config, c1);
        assert_eq!(rows[0].epoch, 10);
        assert_eq!(rows[0].val_loss, 0.6);
        assert_eq!(rows[1].config, c2);

        // replacement keeps the row in place
        store.upsert(record(c1, 20, 0.5)).unwrap();
        let rows = store.rows().unwrap();
        assert_eq!(rows[0].epoch, 20);
        assert_eq!(rows[1].config, c2);

        assert_eq!(store.find(c2).unwrap().map(|r| r.val_loss), Some(0.7));
        assert!(store.find("other").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_upsert() {
        exercise(&mut MemoryResultStore::new());
    }

    #[test]
    fn test_csv_store_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path().join("stats/best_stats.csv"));
        assert!(store.rows().unwrap().is_empty());
        exercise(&mut store);

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("config,invocation,epoch,val_loss,val_acc,val_conf"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_csv_store_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvResultStore::new(dir.path().join("best.csv"));
        let row = record(r#"{"a":"x,y"}"#, 3, 0.25);
        store.upsert(row.clone()).unwrap();
        assert_eq!(store.rows().unwrap(), vec![row]);
    }

    #[test]
    fn test_csv_store_empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_stats.csv");
        std::fs::write(&path, "").unwrap();

        let mut store = CsvResultStore::new(&path);
        assert!(store.rows().unwrap().is_empty());
        assert_eq!(store.upsert(record("c1", 0, 0.4)).unwrap(), UpsertOutcome::Inserted);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("config,invocation,epoch"));
        let rows = store.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].config, "c1");
    }
}
