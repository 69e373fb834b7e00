//! Enumerated run options.
//!
//! Each option parses from the spelling used on the command line and in
//! stored configuration strings. Unknown names are configuration errors.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Relational GNN architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// Multi-relational GCN (mean aggregation per relation)
    #[serde(rename = "mrgcn")]
    Mrgcn,
    /// Multi-relational GIN (sum aggregation per relation + MLP)
    #[serde(rename = "mrgin")]
    Mrgin,
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mrgcn" => Ok(Self::Mrgcn),
            "mrgin" => Ok(Self::Mrgin),
            other => Err(Error::config(format!(
                "model selection is invalid: {} (options: mrgcn, mrgin)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Architecture::Mrgcn => write!(f, "mrgcn"),
            Architecture::Mrgin => write!(f, "mrgin"),
        }
    }
}

/// Relational convolution variant.
///
/// Both variants compute the same function; the fast variant only differs
/// in how messages are materialised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvType {
    #[serde(rename = "RGCNConv")]
    RgcnConv,
    #[serde(rename = "FastRGCNConv")]
    FastRgcnConv,
}

impl FromStr for ConvType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RGCNConv" => Ok(Self::RgcnConv),
            "FastRGCNConv" => Ok(Self::FastRgcnConv),
            other => Err(Error::config(format!(
                "unknown conv type: {} (options: RGCNConv, FastRGCNConv)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ConvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvType::RgcnConv => write!(f, "RGCNConv"),
            ConvType::FastRgcnConv => write!(f, "FastRGCNConv"),
        }
    }
}

/// Graph pooling applied after the conv stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolingType {
    /// Self-attention graph pooling (graph-conv scores)
    #[serde(rename = "sagpool")]
    SagPool,
    /// Top-k pooling (projection scores)
    #[serde(rename = "topk")]
    TopK,
    /// No pooling
    #[serde(rename = "None")]
    None,
}

impl FromStr for PoolingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sagpool" => Ok(Self::SagPool),
            "topk" => Ok(Self::TopK),
            "None" | "none" => Ok(Self::None),
            other => Err(Error::config(format!(
                "unknown pooling type: {} (options: sagpool, topk, None)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PoolingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolingType::SagPool => write!(f, "sagpool"),
            PoolingType::TopK => write!(f, "topk"),
            PoolingType::None => write!(f, "None"),
        }
    }
}

/// Per-frame readout over node embeddings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadoutType {
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "add")]
    Add,
}

impl FromStr for ReadoutType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(Self::Max),
            "mean" => Ok(Self::Mean),
            "add" => Ok(Self::Add),
            other => Err(Error::config(format!(
                "unknown readout type: {} (options: max, mean, add)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReadoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadoutType::Max => write!(f, "max"),
            ReadoutType::Mean => write!(f, "mean"),
            ReadoutType::Add => write!(f, "add"),
        }
    }
}

/// Temporal aggregation over the per-frame readouts of a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalType {
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "lstm_last")]
    LstmLast,
    #[serde(rename = "lstm_sum")]
    LstmSum,
    #[serde(rename = "lstm_attn")]
    LstmAttn,
}

impl TemporalType {
    /// Whether the strategy runs an LSTM over frames.
    pub fn uses_lstm(&self) -> bool {
        !matches!(self, TemporalType::Mean)
    }
}

impl FromStr for TemporalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Self::Mean),
            "lstm_last" => Ok(Self::LstmLast),
            "lstm_sum" => Ok(Self::LstmSum),
            "lstm_attn" => Ok(Self::LstmAttn),
            other => Err(Error::config(format!(
                "unknown temporal type: {} (options: mean, lstm_last, lstm_sum, lstm_attn)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TemporalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemporalType::Mean => write!(f, "mean"),
            TemporalType::LstmLast => write!(f, "lstm_last"),
            TemporalType::LstmSum => write!(f, "lstm_sum"),
            TemporalType::LstmAttn => write!(f, "lstm_attn"),
        }
    }
}

/// Activation applied after each conv layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    #[serde(rename = "relu")]
    Relu,
    #[serde(rename = "leaky_relu")]
    LeakyRelu,
}

impl Activation {
    const LEAKY_SLOPE: f32 = 0.01;

    /// Apply the activation.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    Self::LEAKY_SLOPE * x
                }
            }
        }
    }

    /// Derivative with respect to the pre-activation.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    Self::LEAKY_SLOPE
                }
            }
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Self::Relu),
            "leaky_relu" => Ok(Self::LeakyRelu),
            other => Err(Error::config(format!(
                "unknown activation: {} (options: relu, leaky_relu)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::LeakyRelu => write!(f, "leaky_relu"),
        }
    }
}

/// Compute device selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "cuda")]
    Cuda,
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(Error::config(format!(
                "unknown device: {} (options: cuda, cpu)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}
