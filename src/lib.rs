//! # DynKG - Dynamic Knowledge Graphs for driving risk
//!
//! Trains a relational graph neural network over temporal scene-graph
//! sequences and classifies each sequence as risky or non-risky:
//! - **Dataset**: cached graph sequences, stratified split, transfer testing
//! - **Model**: relational conv stack, node pooling, LSTM temporal heads
//! - **Trainer**: batched training, periodic evaluation, best-result tracking
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynkg::config::RunConfig;
//! use dynkg::trainer::DynKGTrainer;
//!
//! fn main() -> dynkg::Result<()> {
//!     let config = RunConfig::default();
//!     let mut trainer = DynKGTrainer::new(config, "dynkg train")?;
//!     trainer.build_model()?;
//!     trainer.train()?;
//!     trainer.evaluate(None)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dataset;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod monitoring;
pub mod trainer;

pub use crate::core::error::{Error, Result};
