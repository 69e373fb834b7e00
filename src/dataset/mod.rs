//! Sequence Dataset Module
//!
//! Loads cached graph sequences and builds the train/test split:
//! - Cache files (bincode or JSON)
//! - Stratified split with optional majority downsampling
//! - Transfer evaluation against an independently sourced cache

pub mod cache;
pub mod split;

pub use cache::{read_cache, write_cache, SequenceCache};
pub use split::{label_counts, split_sequences, DatasetSplit};

use crate::core::{Error, Result};
use crate::graph::Sequence;
use std::path::Path;
use tracing::info;

/// Train/test sequences plus the shared feature vocabulary.
#[derive(Clone, Debug)]
pub struct SceneGraphDataset {
    pub train: Vec<Sequence>,
    pub test: Vec<Sequence>,
    pub feature_list: Vec<String>,
}

impl SceneGraphDataset {
    /// Node feature width expected by the model.
    pub fn num_features(&self) -> usize {
        self.feature_list.len()
    }

    pub fn train_labels(&self) -> Vec<u8> {
        self.train.iter().map(|s| s.label).collect()
    }

    pub fn test_labels(&self) -> Vec<u8> {
        self.test.iter().map(|s| s.label).collect()
    }
}

/// Load the primary cache and build the train/test split.
///
/// Without a transfer path the primary sequences are split (stratified,
/// optionally downsampled). With one, the whole primary cache trains and
/// the transfer cache tests.
pub fn build_scenegraph_dataset(
    cache_path: &Path,
    split_ratio: f64,
    downsample: bool,
    seed: u64,
    transfer_path: Option<&Path>,
) -> Result<SceneGraphDataset> {
    if !cache_path.exists() {
        return Err(Error::config(format!(
            "The cache file does not exist: {}",
            cache_path.display()
        )));
    }
    if let Some(transfer) = transfer_path {
        if !transfer.exists() {
            return Err(Error::config(format!(
                "The transfer file does not exist: {}",
                transfer.display()
            )));
        }
    }

    let primary = read_cache(cache_path)?;
    primary.validate()?;
    info!(
        path = %cache_path.display(),
        sequences = primary.sequences.len(),
        features = primary.num_features(),
        "Loaded sequence cache"
    );

    let dataset = match transfer_path {
        None => {
            let split = split_sequences(primary.sequences, split_ratio, downsample, seed)?;
            SceneGraphDataset {
                train: split.train,
                test: split.test,
                feature_list: primary.feature_list,
            }
        }
        Some(transfer) => {
            let other = read_cache(transfer)?;
            if other.feature_list != primary.feature_list {
                return Err(Error::config(format!(
                    "transfer feature vocabulary ({} features) does not match the primary cache ({} features)",
                    other.num_features(),
                    primary.num_features()
                )));
            }
            other.validate()?;
            info!(
                path = %transfer.display(),
                sequences = other.sequences.len(),
                "Using transfer cache as the test set"
            );
            SceneGraphDataset {
                train: primary.sequences,
                test: other.sequences,
                feature_list: primary.feature_list,
            }
        }
    };

    let train_counts = label_counts(&dataset.train);
    let test_counts = label_counts(&dataset.test);
    info!(
        train = dataset.train.len(),
        test = dataset.test.len(),
        train_class_0 = train_counts[0],
        train_class_1 = train_counts[1],
        test_class_0 = test_counts[0],
        test_class_1 = test_counts[1],
        "Dataset ready"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SceneGraph;

    fn cache(n0: usize, n1: usize, features: &[&str], prefix: &str) -> SequenceCache {
        let width = features.len();
        let frame = SceneGraph {
            node_features: vec![vec![1.0; width], vec![0.0; width]],
            edge_index: vec![(0, 1)],
            edge_attr: vec![4],
        };
        let sequences = (0..n0 + n1)
            .map(|i| {
                let label = if i < n0 { 0 } else { 1 };
                Sequence::new(vec![frame.clone(); 2], label, &format!("{}{}", prefix, i))
            })
            .collect();
        SequenceCache::new(sequences, features.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_missing_cache_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            build_scenegraph_dataset(&dir.path().join("nope.bin"), 0.3, false, 0, None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_split_from_primary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        write_cache(&path, &cache(8, 4, &["a", "b", "c"], "p")).unwrap();

        let dataset = build_scenegraph_dataset(&path, 0.25, false, 11, None).unwrap();
        assert_eq!(dataset.num_features(), 3);
        assert_eq!(dataset.test.len(), 3);
        assert_eq!(dataset.train.len(), 9);
        assert_eq!(dataset.train_labels().len(), 9);
    }

    #[test]
    fn test_transfer_substitutes_test_set() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.bin");
        let transfer = dir.path().join("transfer.json");
        write_cache(&primary, &cache(6, 6, &["a", "b"], "p")).unwrap();
        write_cache(&transfer, &cache(2, 3, &["a", "b"], "t")).unwrap();

        let dataset = build_scenegraph_dataset(&primary, 0.3, true, 1, Some(&transfer)).unwrap();
        assert_eq!(dataset.train.len(), 12);
        assert_eq!(dataset.test.len(), 5);
        assert!(dataset.test.iter().all(|s| s.folder_name.starts_with('t')));
        assert_eq!(dataset.test_labels(), vec![0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_transfer_vocabulary_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.bin");
        let transfer = dir.path().join("transfer.bin");
        write_cache(&primary, &cache(4, 4, &["a", "b"], "p")).unwrap();
        write_cache(&transfer, &cache(2, 2, &["a", "c"], "t")).unwrap();

        let err = build_scenegraph_dataset(&primary, 0.3, false, 1, Some(&transfer)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_transfer_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.bin");
        write_cache(&primary, &cache(4, 4, &["a"], "p")).unwrap();
        let err =
            build_scenegraph_dataset(&primary, 0.3, false, 1, Some(&dir.path().join("x.bin")))
                .unwrap_err();
        assert!(err.is_configuration());
    }
}
