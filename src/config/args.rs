//! Command-line surface for run configuration.
//!
//! Option names keep their underscore spelling (`--cache_path`) so stored
//! invocation strings stay comparable across tools.

use crate::config::{parse_layer_spec, RunConfig};
use crate::core::{Error, Result};
use clap::{ArgAction, Args};
use std::path::PathBuf;

/// The parameters for training the scene graph using a relational GNN.
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to the cache file
    #[arg(long = "cache_path", default_value = "../script/image_dataset.pkl")]
    pub cache_path: PathBuf,

    /// Path to the transfer file
    #[arg(long = "transfer_path", default_value = "")]
    pub transfer_path: String,

    /// Path to load cached model file
    #[arg(long = "model_load_path", default_value = "./model/model_best_val_loss_.vec.pt")]
    pub model_load_path: PathBuf,

    /// Path to save model file
    #[arg(long = "model_save_path", default_value = "./model/model_best_val_loss_.vec.pt")]
    pub model_save_path: PathBuf,

    /// Ratio of dataset withheld for testing
    #[arg(long = "split_ratio", default_value_t = 0.3)]
    pub split_ratio: f64,

    /// Set to true to downsample dataset
    #[arg(long, default_value = "false", action = ArgAction::Set, value_parser = parse_flag)]
    pub downsample: bool,

    /// The initial learning rate
    #[arg(long = "learning_rate", default_value_t = 0.0001)]
    pub learning_rate: f32,

    /// Random seed (drawn once when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of epochs to train
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Activation function to use, options: [relu, leaky_relu]
    #[arg(long, default_value = "relu")]
    pub activation: String,

    /// Weight decay (L2 loss on parameters)
    #[arg(long = "weight_decay", default_value_t = 5e-4)]
    pub weight_decay: f32,

    /// Dropout rate (1 - keep probability)
    #[arg(long, default_value_t = 0.25)]
    pub dropout: f32,

    /// The number of classes for dynamic graph classification (only 2 supported)
    #[arg(long, default_value_t = 2)]
    pub nclass: usize,

    /// Number of sequences in a batch
    #[arg(long = "batch_size", default_value_t = 32)]
    pub batch_size: usize,

    /// The device on which models are run, options: [cuda, cpu]
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Number of training epochs before testing the model
    #[arg(long = "test_step", default_value_t = 10)]
    pub test_step: usize,

    /// Model to be used, options: [mrgcn, mrgin]
    #[arg(long, default_value = "mrgcn")]
    pub model: String,

    /// Type of relational conv to use, options: [RGCNConv, FastRGCNConv]
    #[arg(long = "conv_type", default_value = "FastRGCNConv")]
    pub conv_type: String,

    /// Number of layers in the network
    #[arg(long = "num_layers", default_value_t = 3)]
    pub num_layers: usize,

    /// Hidden dimension of each conv layer
    #[arg(long = "hidden_dim", default_value_t = 32)]
    pub hidden_dim: usize,

    /// Manually specify the size of each layer in format l1,l2,l3 (no spaces)
    #[arg(long = "layer_spec")]
    pub layer_spec: Option<String>,

    /// Graph pooling type, options: [sagpool, topk, None]
    #[arg(long = "pooling_type", default_value = "sagpool")]
    pub pooling_type: String,

    /// Graph pooling ratio
    #[arg(long = "pooling_ratio", default_value_t = 0.5)]
    pub pooling_ratio: f32,

    /// Readout type, options: [max, mean, add]
    #[arg(long = "readout_type", default_value = "mean")]
    pub readout_type: String,

    /// Temporal type, options: [mean, lstm_last, lstm_sum, lstm_attn]
    #[arg(long = "temporal_type", default_value = "lstm_attn")]
    pub temporal_type: String,

    /// LSTM input dimensions
    #[arg(long = "lstm_input_dim", default_value_t = 50)]
    pub lstm_input_dim: usize,

    /// LSTM output dimensions
    #[arg(long = "lstm_output_dim", default_value_t = 20)]
    pub lstm_output_dim: usize,

    /// Path to save best test statistics
    #[arg(long = "stats_path", default_value = "best_stats.csv")]
    pub stats_path: String,

    /// Optional JSON-lines file receiving per-epoch scalar summaries
    #[arg(long = "summary_path")]
    pub summary_path: Option<PathBuf>,
}

/// `true` in any letter case; everything else is `false`.
fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = Error;

    fn try_from(args: RunArgs) -> Result<Self> {
        let transfer_path = match args.transfer_path.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };
        let layer_spec = args.layer_spec.as_deref().map(parse_layer_spec).transpose()?;

        let config = RunConfig {
            cache_path: args.cache_path,
            transfer_path,
            model_load_path: args.model_load_path,
            model_save_path: args.model_save_path,
            split_ratio: args.split_ratio,
            downsample: args.downsample,
            learning_rate: args.learning_rate,
            seed: args.seed.unwrap_or_else(|| rand::random::<u32>() as u64),
            epochs: args.epochs,
            activation: args.activation.parse()?,
            weight_decay: args.weight_decay,
            dropout: args.dropout,
            nclass: args.nclass,
            batch_size: args.batch_size,
            device: args.device.parse()?,
            test_step: args.test_step,
            model: args.model.parse()?,
            conv_type: args.conv_type.parse()?,
            num_layers: args.num_layers,
            hidden_dim: args.hidden_dim,
            layer_spec,
            pooling_type: args.pooling_type.parse()?,
            pooling_ratio: args.pooling_ratio,
            readout_type: args.readout_type.parse()?,
            temporal_type: args.temporal_type.parse()?,
            lstm_input_dim: args.lstm_input_dim,
            lstm_output_dim: args.lstm_output_dim,
            stats_path: PathBuf::from(args.stats_path.trim()),
            summary_path: args.summary_path,
        };
        config.validate()?;
        Ok(config)
    }
}
