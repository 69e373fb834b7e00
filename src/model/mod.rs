//! Model Adapter Module
//!
//! Relational GNN over one sequence's combined graph batch:
//! - Relational conv stack (`mrgcn` mean / `mrgin` sum aggregation)
//! - Optional top-k or self-attention node pooling per frame
//! - Per-frame readout and temporal aggregation (mean or LSTM)
//! - 2-way linear classifier
//!
//! All parameters live in one [`ParamStore`]; training forward passes record
//! a [`ForwardTrace`] and `backward` accumulates exact gradients.

pub mod conv;
pub mod loss;
pub mod network;
pub mod optim;
pub mod params;
pub mod pooling;
pub mod readout;
pub mod temporal;
pub mod tensor;

pub use loss::{compute_class_weights, WeightedCrossEntropy};
pub use network::{ForwardTrace, Network};
pub use optim::{Adam, AdamConfig};
pub use params::{ParamRef, ParamStore};

use crate::config::{
    Activation, Architecture, ConvType, PoolingType, ReadoutType, RunConfig, TemporalType,
};
use crate::core::{Error, Result, NUM_CLASSES};
use crate::graph::{GraphBatch, Relation};
use conv::{RginLayer, RgcnLayer};
use serde::{Deserialize, Serialize};

/// Whether dropout is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Hyperparameters of a scene-graph model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    pub architecture: Architecture,
    pub conv_type: ConvType,
    /// Node feature width (feature vocabulary length)
    pub num_features: usize,
    /// Number of relation types
    pub num_relations: usize,
    /// Output width of every conv layer
    pub layer_sizes: Vec<usize>,
    pub activation: Activation,
    pub dropout: f32,
    pub pooling_type: PoolingType,
    pub pooling_ratio: f32,
    pub readout_type: ReadoutType,
    pub temporal_type: TemporalType,
    pub lstm_input_dim: usize,
    pub lstm_output_dim: usize,
    pub nclass: usize,
    /// Seed of parameter initialisation and dropout
    pub seed: u64,
}

impl ModelConfig {
    /// Derive model hyperparameters from a run configuration.
    pub fn from_run_config(config: &RunConfig, num_features: usize) -> Self {
        Self {
            architecture: config.model,
            conv_type: config.conv_type,
            num_features,
            num_relations: Relation::COUNT,
            layer_sizes: config.layer_sizes(),
            activation: config.activation,
            dropout: config.dropout,
            pooling_type: config.pooling_type,
            pooling_ratio: config.pooling_ratio,
            readout_type: config.readout_type,
            temporal_type: config.temporal_type,
            lstm_input_dim: config.lstm_input_dim,
            lstm_output_dim: config.lstm_output_dim,
            nclass: config.nclass,
            seed: config.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_features == 0 {
            return Err(Error::config("feature vocabulary is empty"));
        }
        if self.nclass != NUM_CLASSES {
            return Err(Error::config(format!(
                "only binary classification is supported (nclass = {})",
                self.nclass
            )));
        }
        if self.layer_sizes.is_empty() || self.layer_sizes.contains(&0) {
            return Err(Error::config("conv layers must have non-zero widths"));
        }
        if self.temporal_type.uses_lstm() && (self.lstm_input_dim == 0 || self.lstm_output_dim == 0) {
            return Err(Error::config("LSTM dimensions must be non-zero"));
        }
        Ok(())
    }
}

/// Optional attention diagnostics of one forward pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionDiagnostics {
    /// Temporal attention over frames
    pub lstm_attn_weights: Option<Vec<f32>>,
    /// Original node index of every pooled node
    pub pool_perm: Option<Vec<usize>>,
    /// Frame index of every pooled node
    pub batch: Option<Vec<usize>>,
    /// Gate of every pooled node
    pub pool_score: Option<Vec<f32>>,
}

/// Logits and diagnostics for one sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOutput {
    pub logits: [f32; NUM_CLASSES],
    pub diagnostics: AttentionDiagnostics,
}

/// Closed set of architectures sharing one forward contract.
#[derive(Clone, Debug)]
pub enum SceneGraphModel {
    Mrgcn(Network<RgcnLayer>),
    Mrgin(Network<RginLayer>),
}

impl SceneGraphModel {
    /// Build the architecture named in `config`.
    pub fn build(config: ModelConfig) -> Result<Self> {
        Ok(match config.architecture {
            Architecture::Mrgcn => SceneGraphModel::Mrgcn(Network::new(config)?),
            Architecture::Mrgin => SceneGraphModel::Mrgin(Network::new(config)?),
        })
    }

    /// Build by architecture name; unknown names are configuration errors.
    pub fn build_named(name: &str, mut config: ModelConfig) -> Result<Self> {
        config.architecture = name.parse()?;
        Self::build(config)
    }

    pub fn architecture(&self) -> Architecture {
        self.config().architecture
    }

    pub fn config(&self) -> &ModelConfig {
        match self {
            SceneGraphModel::Mrgcn(net) => &net.config,
            SceneGraphModel::Mrgin(net) => &net.config,
        }
    }

    pub fn params(&self) -> &ParamStore {
        match self {
            SceneGraphModel::Mrgcn(net) => net.params(),
            SceneGraphModel::Mrgin(net) => net.params(),
        }
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        match self {
            SceneGraphModel::Mrgcn(net) => net.params_mut(),
            SceneGraphModel::Mrgin(net) => net.params_mut(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.params().len()
    }

    /// Replace all parameter values, e.g. from a checkpoint.
    pub fn load_parameters(&mut self, values: Vec<f32>) -> Result<()> {
        self.params_mut().set_values(values)
    }

    pub fn mode(&self) -> Mode {
        match self {
            SceneGraphModel::Mrgcn(net) => net.mode(),
            SceneGraphModel::Mrgin(net) => net.mode(),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        match self {
            SceneGraphModel::Mrgcn(net) => net.set_mode(mode),
            SceneGraphModel::Mrgin(net) => net.set_mode(mode),
        }
    }

    /// Inference forward pass (no dropout, no trace).
    pub fn forward(&self, batch: &GraphBatch) -> Result<ModelOutput> {
        match self {
            SceneGraphModel::Mrgcn(net) => net.forward(batch),
            SceneGraphModel::Mrgin(net) => net.forward(batch),
        }
    }

    /// Training forward pass.
    pub fn forward_train(&mut self, batch: &GraphBatch) -> Result<(ModelOutput, ForwardTrace)> {
        match self {
            SceneGraphModel::Mrgcn(net) => net.forward_train(batch),
            SceneGraphModel::Mrgin(net) => net.forward_train(batch),
        }
    }

    pub fn backward(&mut self, trace: &ForwardTrace, dlogits: [f32; NUM_CLASSES]) -> Result<()> {
        match self {
            SceneGraphModel::Mrgcn(net) => net.backward(trace, dlogits),
            SceneGraphModel::Mrgin(net) => net.backward(trace, dlogits),
        }
    }

    pub fn zero_grad(&mut self) {
        self.params_mut().zero_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{SceneGraph, Sequence};

    fn config(architecture: Architecture) -> ModelConfig {
        ModelConfig {
            architecture,
            conv_type: ConvType::FastRgcnConv,
            num_features: 5,
            num_relations: Relation::COUNT,
            layer_sizes: vec![6, 4],
            activation: Activation::LeakyRelu,
            dropout: 0.0,
            pooling_type: PoolingType::None,
            pooling_ratio: 0.5,
            readout_type: ReadoutType::Mean,
            temporal_type: TemporalType::LstmAttn,
            lstm_input_dim: 5,
            lstm_output_dim: 3,
            nclass: 2,
            seed: 11,
        }
    }

    fn sequence() -> Sequence {
        let frame = |shift: f32| SceneGraph {
            node_features: (0..4)
                .map(|i| (0..5).map(|j| ((i * 5 + j) as f32 * 0.37 + shift).sin()).collect())
                .collect(),
            edge_index: vec![(0, 1), (1, 2), (2, 3), (3, 0), (0, 2), (1, 3)],
            edge_attr: vec![0, 4, 4, 5, 10, 11],
        };
        Sequence::new(vec![frame(0.0), frame(0.5), frame(1.0)], 1, "seq")
    }

    fn batch() -> GraphBatch {
        GraphBatch::from_sequence(&sequence(), 5).unwrap()
    }

    fn loss_of(model: &SceneGraphModel, ce: &WeightedCrossEntropy) -> f32 {
        let out = model.forward(&batch()).unwrap();
        ce.loss(&[out.logits], &[1])
    }

    /// Cosine similarity between analytic and central-difference gradients.
    fn gradient_agreement(mut model: SceneGraphModel) -> f32 {
        let ce = WeightedCrossEntropy::unweighted();
        let (out, trace) = model.forward_train(&batch()).unwrap();
        let (_, dlogits) = ce.loss_and_grad(&[out.logits], &[1]);
        model.zero_grad();
        model.backward(&trace, dlogits[0]).unwrap();
        let analytic = model.params().grads().to_vec();

        let base = model.params().values().to_vec();
        let eps = 1e-3;
        let (mut dot, mut na, mut nn) = (0.0f64, 0.0f64, 0.0f64);
        for i in 0..base.len() {
            let mut plus = base.clone();
            plus[i] += eps;
            model.load_parameters(plus).unwrap();
            let lp = loss_of(&model, &ce);
            let mut minus = base.clone();
            minus[i] -= eps;
            model.load_parameters(minus).unwrap();
            let lm = loss_of(&model, &ce);
            let numeric = ((lp - lm) / (2.0 * eps)) as f64;
            let a = analytic[i] as f64;
            dot += numeric * a;
            na += a * a;
            nn += numeric * numeric;
        }
        (dot / (na.sqrt() * nn.sqrt())) as f32
    }

    #[test]
    fn test_build_both_architectures() {
        for arch in [Architecture::Mrgcn, Architecture::Mrgin] {
            let model = SceneGraphModel::build(config(arch)).unwrap();
            assert_eq!(model.architecture(), arch);
            assert!(model.parameter_count() > 0);
            let out = model.forward(&batch()).unwrap();
            assert!(out.logits.iter().all(|v| v.is_finite()));
            let alpha = out.diagnostics.lstm_attn_weights.unwrap();
            assert_eq!(alpha.len(), 3);
            assert!(out.diagnostics.pool_perm.is_none());
        }
    }

    #[test]
    fn test_unknown_architecture_is_configuration_error() {
        let err = SceneGraphModel::build_named("mrgat", config(Architecture::Mrgcn)).unwrap_err();
        assert!(err.is_configuration());
        assert!(SceneGraphModel::build_named("mrgin", config(Architecture::Mrgcn)).is_ok());
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let a = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        let b = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        assert_eq!(a.params().values(), b.params().values());

        let mut other = config(Architecture::Mrgcn);
        other.seed = 12;
        let c = SceneGraphModel::build(other).unwrap();
        assert_ne!(a.params().values(), c.params().values());
    }

    #[test]
    fn test_pooling_diagnostics() {
        let mut cfg = config(Architecture::Mrgin);
        cfg.pooling_type = PoolingType::SagPool;
        cfg.temporal_type = TemporalType::Mean;
        let model = SceneGraphModel::build(cfg).unwrap();
        let out = model.forward(&batch()).unwrap();

        let d = out.diagnostics;
        assert!(d.lstm_attn_weights.is_none());
        // ceil(0.5 * 4) nodes kept in each of 3 frames
        assert_eq!(d.pool_perm.as_ref().map(Vec::len), Some(6));
        assert_eq!(d.batch, Some(vec![0, 0, 1, 1, 2, 2]));
        assert!(d.pool_score.unwrap().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_parameter_load_reproduces_outputs() {
        let trained = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        let mut cfg = config(Architecture::Mrgcn);
        cfg.seed = 99;
        let mut fresh = SceneGraphModel::build(cfg).unwrap();
        fresh
            .load_parameters(trained.params().values().to_vec())
            .unwrap();
        assert_eq!(
            trained.forward(&batch()).unwrap(),
            fresh.forward(&batch()).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_wrong_count() {
        let mut model = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        assert!(matches!(model.load_parameters(vec![0.0; 3]), Err(Error::Model(_))));
    }

    #[test]
    fn test_rejects_unknown_relation() {
        let model = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        let mut b = batch();
        b.edge_attr[0] = Relation::COUNT;
        assert!(model.forward(&b).is_err());
    }

    #[test]
    fn test_dropout_only_in_train_mode() {
        let mut cfg = config(Architecture::Mrgcn);
        cfg.dropout = 0.5;
        let mut model = SceneGraphModel::build(cfg).unwrap();
        let eval = model.forward(&batch()).unwrap();

        model.set_mode(Mode::Eval);
        let (same, _) = model.forward_train(&batch()).unwrap();
        assert_eq!(eval, same);

        model.set_mode(Mode::Train);
        let (a, _) = model.forward_train(&batch()).unwrap();
        let (b, _) = model.forward_train(&batch()).unwrap();
        assert_ne!(a.logits, b.logits);
    }

    #[test]
    fn test_gradients_mrgcn_lstm_attn() {
        let model = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        assert!(gradient_agreement(model) > 0.98);
    }

    #[test]
    fn test_gradients_mrgin_topk_add_lstm_sum() {
        let mut cfg = config(Architecture::Mrgin);
        cfg.pooling_type = PoolingType::TopK;
        cfg.pooling_ratio = 1.0;
        cfg.readout_type = ReadoutType::Add;
        cfg.temporal_type = TemporalType::LstmSum;
        let model = SceneGraphModel::build(cfg).unwrap();
        assert!(gradient_agreement(model) > 0.98);
    }

    #[test]
    fn test_gradients_sagpool_max_mean() {
        let mut cfg = config(Architecture::Mrgcn);
        cfg.pooling_type = PoolingType::SagPool;
        cfg.pooling_ratio = 1.0;
        cfg.readout_type = ReadoutType::Max;
        cfg.temporal_type = TemporalType::Mean;
        let model = SceneGraphModel::build(cfg).unwrap();
        assert!(gradient_agreement(model) > 0.98);
    }

    #[test]
    fn test_training_step_reduces_loss() {
        let mut model = SceneGraphModel::build(config(Architecture::Mrgcn)).unwrap();
        let ce = WeightedCrossEntropy::unweighted();
        let mut adam = Adam::new(AdamConfig::default().with_learning_rate(0.01), model.parameter_count());
        let before = loss_of(&model, &ce);
        for _ in 0..20 {
            model.zero_grad();
            let (out, trace) = model.forward_train(&batch()).unwrap();
            let (_, grads) = ce.loss_and_grad(&[out.logits], &[1]);
            model.backward(&trace, grads[0]).unwrap();
            adam.step(model.params_mut());
        }
        assert!(loss_of(&model, &ce) < before);
    }
}
