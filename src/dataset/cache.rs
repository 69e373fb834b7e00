//! Sequence cache files.
//!
//! A cache holds the full sequence collection and the feature vocabulary.
//! Files ending in `.json` are JSON; everything else is bincode.

use crate::core::Result;
use crate::graph::Sequence;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Serialized `(sequenceCollection, featureVocabulary)` blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceCache {
    /// Labeled sequences in stored order
    pub sequences: Vec<Sequence>,
    /// Ordered feature names; its length is the node feature width
    pub feature_list: Vec<String>,
}

impl SequenceCache {
    pub fn new(sequences: Vec<Sequence>, feature_list: Vec<String>) -> Self {
        Self {
            sequences,
            feature_list,
        }
    }

    pub fn num_features(&self) -> usize {
        self.feature_list.len()
    }

    /// Validate every sequence against the vocabulary width.
    pub fn validate(&self) -> Result<()> {
        let width = self.num_features();
        for sequence in &self.sequences {
            sequence.validate(width)?;
        }
        Ok(())
    }
}

/// On-disk encoding of a cache file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheFormat {
    Json,
    Bincode,
}

impl CacheFormat {
    /// Pick the encoding from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => CacheFormat::Json,
            _ => CacheFormat::Bincode,
        }
    }
}

/// Read a cache file.
pub fn read_cache(path: &Path) -> Result<SequenceCache> {
    let reader = BufReader::new(File::open(path)?);
    let cache = match CacheFormat::from_path(path) {
        CacheFormat::Json => serde_json::from_reader(reader)?,
        CacheFormat::Bincode => bincode::deserialize_from(reader)?,
    };
    Ok(cache)
}

/// Write a cache file, creating parent directories as needed.
pub fn write_cache(path: &Path, cache: &SequenceCache) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    match CacheFormat::from_path(path) {
        CacheFormat::Json => serde_json::to_writer(&mut writer, cache)?,
        CacheFormat::Bincode => bincode::serialize_into(&mut writer, cache)?,
    }
    writer.flush()?;
    Ok(())
}
