//! Run Configuration Module
//!
//! Immutable snapshot of every hyperparameter of a training run:
//! - Typed option enums (architecture, pooling, readout, temporal strategy)
//! - Validation of numeric ranges and the per-layer size spec
//! - The serialized key used for best-result bookkeeping
//! - The command-line argument surface

pub mod args;
pub mod options;

pub use args::RunArgs;
pub use options::{
    Activation, Architecture, ConvType, Device, PoolingType, ReadoutType, TemporalType,
};

use crate::core::{Error, Result, NUM_CLASSES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one training/evaluation run.
///
/// Captured once at trainer construction. Its JSON serialization is the
/// uniqueness key of a row in the best-results table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the sequence cache file
    pub cache_path: PathBuf,
    /// Optional cache used wholesale as the test set
    pub transfer_path: Option<PathBuf>,
    /// Checkpoint to load for inference
    pub model_load_path: PathBuf,
    /// Checkpoint written on every new best test loss
    pub model_save_path: PathBuf,
    /// Fraction of sequences withheld for testing
    pub split_ratio: f64,
    /// Downsample the majority class before splitting
    pub downsample: bool,
    /// Adam learning rate
    pub learning_rate: f32,
    /// Seed threaded through split, resample, initialization and dropout
    pub seed: u64,
    /// Number of training epochs
    pub epochs: usize,
    /// Conv activation
    pub activation: Activation,
    /// L2 penalty added to gradients
    pub weight_decay: f32,
    /// Dropout rate after each conv layer
    pub dropout: f32,
    /// Number of output classes (binary only)
    pub nclass: usize,
    /// Sequences per optimizer step
    pub batch_size: usize,
    /// Device selector
    pub device: Device,
    /// Evaluate every `test_step` epochs
    pub test_step: usize,
    /// Architecture
    pub model: Architecture,
    /// Relational conv variant
    pub conv_type: ConvType,
    /// Number of conv layers
    pub num_layers: usize,
    /// Hidden width of each conv layer
    pub hidden_dim: usize,
    /// Explicit per-layer widths (overrides `num_layers`/`hidden_dim`)
    pub layer_spec: Option<Vec<usize>>,
    /// Graph pooling
    pub pooling_type: PoolingType,
    /// Fraction of nodes kept per frame by pooling
    pub pooling_ratio: f32,
    /// Per-frame readout
    pub readout_type: ReadoutType,
    /// Temporal aggregation
    pub temporal_type: TemporalType,
    /// LSTM input width
    pub lstm_input_dim: usize,
    /// LSTM hidden width
    pub lstm_output_dim: usize,
    /// Best-results table
    pub stats_path: PathBuf,
    /// Optional JSON-lines file receiving epoch scalars
    pub summary_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("../script/image_dataset.pkl"),
            transfer_path: None,
            model_load_path: PathBuf::from("./model/model_best_val_loss_.vec.pt"),
            model_save_path: PathBuf::from("./model/model_best_val_loss_.vec.pt"),
            split_ratio: 0.3,
            downsample: false,
            learning_rate: 0.0001,
            seed: 0,
            epochs: 200,
            activation: Activation::Relu,
            weight_decay: 5e-4,
            dropout: 0.25,
            nclass: NUM_CLASSES,
            batch_size: 32,
            device: Device::Cpu,
            test_step: 10,
            model: Architecture::Mrgcn,
            conv_type: ConvType::FastRgcnConv,
            num_layers: 3,
            hidden_dim: 32,
            layer_spec: None,
            pooling_type: PoolingType::SagPool,
            pooling_ratio: 0.5,
            readout_type: ReadoutType::Mean,
            temporal_type: TemporalType::LstmAttn,
            lstm_input_dim: 50,
            lstm_output_dim: 20,
            stats_path: PathBuf::from("best_stats.csv"),
            summary_path: None,
        }
    }
}

impl RunConfig {
    /// Check numeric ranges. Fails with a configuration error.
    pub fn validate(&self) -> Result<()> {
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(Error::config(format!(
                "split_ratio must be in (0, 1), got {}",
                self.split_ratio
            )));
        }
        if self.nclass != NUM_CLASSES {
            return Err(Error::config(format!(
                "only binary classification is supported (nclass = {})",
                self.nclass
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.test_step == 0 {
            return Err(Error::config("test_step must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.pooling_ratio > 0.0 && self.pooling_ratio <= 1.0) {
            return Err(Error::config(format!(
                "pooling_ratio must be in (0, 1], got {}",
                self.pooling_ratio
            )));
        }
        if self.layer_sizes().is_empty() || self.layer_sizes().contains(&0) {
            return Err(Error::config("conv layers must have non-zero widths"));
        }
        if self.temporal_type.uses_lstm() && (self.lstm_input_dim == 0 || self.lstm_output_dim == 0)
        {
            return Err(Error::config("LSTM dimensions must be non-zero"));
        }
        Ok(())
    }

    /// Width of each conv layer.
    pub fn layer_sizes(&self) -> Vec<usize> {
        match &self.layer_spec {
            Some(spec) => spec.clone(),
            None => vec![self.hidden_dim; self.num_layers],
        }
    }

    /// Serialized form used as the best-results key.
    pub fn key(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable form written next to checkpoints.
    pub fn to_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse a per-layer size spec in the form `l1,l2,l3`.
pub fn parse_layer_spec(spec: &str) -> Result<Vec<usize>> {
    spec.split(',')
        .map(|part| {
            part.trim().parse::<usize>().map_err(|_| {
                Error::config(format!("invalid layer_spec '{}': expected l1,l2,l3", spec))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layer_sizes(), vec![32, 32, 32]);
    }

    #[test]
    fn test_layer_spec_overrides() {
        let config = RunConfig {
            layer_spec: Some(vec![64, 16]),
            ..Default::default()
        };
        assert_eq!(config.layer_sizes(), vec![64, 16]);
    }

    #[test]
    fn test_parse_layer_spec() {
        assert_eq!(parse_layer_spec("64,32,16").unwrap(), vec![64, 32, 16]);
        assert!(parse_layer_spec("64,,16").unwrap_err().is_configuration());
        assert!(parse_layer_spec("a,b").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            RunConfig { split_ratio: 0.0, ..Default::default() },
            RunConfig { split_ratio: 1.0, ..Default::default() },
            RunConfig { nclass: 3, ..Default::default() },
            RunConfig { batch_size: 0, ..Default::default() },
            RunConfig { test_step: 0, ..Default::default() },
            RunConfig { dropout: 1.0, ..Default::default() },
            RunConfig { pooling_ratio: 0.0, ..Default::default() },
            RunConfig { layer_spec: Some(vec![8, 0]), ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = RunConfig::default();
        let b = RunConfig::default();
        assert_eq!(a.key().unwrap(), b.key().unwrap());

        let c = RunConfig { seed: 7, ..Default::default() };
        assert_ne!(a.key().unwrap(), c.key().unwrap());

        let back: RunConfig = serde_json::from_str(&a.key().unwrap()).unwrap();
        assert_eq!(back, a);
    }
}
