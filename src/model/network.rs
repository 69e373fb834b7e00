//! Full scene-graph network: conv stack, pooling, readout, temporal head
//! and classifier over one flat parameter store.

use crate::config::{PoolingType, ReadoutType};
use crate::core::{Error, Result, NUM_CLASSES};
use crate::graph::GraphBatch;
use crate::model::conv::{ConvCache, Edges, RelationalConv};
use crate::model::params::{ParamRef, ParamStore};
use crate::model::pooling::{PoolCache, PoolScorer, Pooling};
use crate::model::readout::{readout, readout_backward, ReadoutCache};
use crate::model::temporal::{TemporalCache, TemporalConfig, TemporalHead};
use crate::model::tensor::{add_bias, bias_backward, linear, linear_backward, Matrix};
use crate::model::{AttentionDiagnostics, Mode, ModelConfig, ModelOutput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
struct LayerTrace {
    cache: ConvCache,
    pre: Matrix,
    /// Inverted-dropout multipliers, present only when dropout fired
    mask: Option<Vec<f32>>,
}

/// Everything recorded by a training forward pass.
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    layers: Vec<LayerTrace>,
    pool: Option<PoolCache>,
    readout: ReadoutCache,
    temporal: TemporalCache,
    embedding: Vec<f32>,
}

/// Network generic over its relational conv layer.
#[derive(Clone, Debug)]
pub struct Network<L: RelationalConv> {
    pub config: ModelConfig,
    params: ParamStore,
    layers: Vec<L>,
    pooling: Option<Pooling>,
    temporal: TemporalHead,
    classifier_weight: ParamRef,
    classifier_bias: ParamRef,
    mode: Mode,
    dropout_rng: StdRng,
}

impl<L: RelationalConv> Network<L> {
    /// Allocate and initialise all parameters from `config.seed`.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut params = ParamStore::new();

        let mut layers = Vec::with_capacity(config.layer_sizes.len());
        let mut in_dim = config.num_features;
        for (i, &out_dim) in config.layer_sizes.iter().enumerate() {
            layers.push(L::new(
                &format!("conv.{}", i),
                in_dim,
                out_dim,
                config.num_relations,
                &mut params,
                &mut rng,
            ));
            in_dim = out_dim;
        }

        let pooling = match config.pooling_type {
            PoolingType::None => None,
            PoolingType::TopK => Some(Pooling::new(
                PoolScorer::TopK,
                in_dim,
                config.pooling_ratio,
                &mut params,
                &mut rng,
            )),
            PoolingType::SagPool => Some(Pooling::new(
                PoolScorer::SelfAttention,
                in_dim,
                config.pooling_ratio,
                &mut params,
                &mut rng,
            )),
        };

        let temporal = TemporalHead::new(
            TemporalConfig {
                kind: config.temporal_type,
                input_dim: in_dim,
                lstm_input_dim: config.lstm_input_dim,
                lstm_output_dim: config.lstm_output_dim,
                activation: config.activation,
            },
            &mut params,
            &mut rng,
        );

        let embed_dim = temporal.out_dim();
        let classifier_weight = params.glorot("classifier.weight", 1, embed_dim, NUM_CLASSES, &mut rng);
        let classifier_bias = params.zeros("classifier.bias", NUM_CLASSES);
        let dropout_rng = StdRng::seed_from_u64(rng.gen());

        Ok(Self {
            config,
            params,
            layers,
            pooling,
            temporal,
            classifier_weight,
            classifier_bias,
            mode: Mode::Train,
            dropout_rng,
        })
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn check_batch(&self, batch: &GraphBatch) -> Result<()> {
        let n = batch.num_nodes();
        if n > 0 && batch.num_features() != self.config.num_features {
            return Err(Error::Model(format!(
                "input has {} features, model expects {}",
                batch.num_features(),
                self.config.num_features
            )));
        }
        if batch.edge_index.len() != batch.edge_attr.len() {
            return Err(Error::Model("edge_index and edge_attr lengths differ".to_string()));
        }
        if let Some(&(src, dst)) = batch.edge_index.iter().find(|&&(s, d)| s >= n || d >= n) {
            return Err(Error::Model(format!(
                "edge ({}, {}) references a node outside 0..{}",
                src, dst, n
            )));
        }
        if let Some(rel) = batch.edge_attr.iter().find(|&&r| r >= self.config.num_relations) {
            return Err(Error::Model(format!(
                "relation id {} outside 0..{}",
                rel, self.config.num_relations
            )));
        }
        if batch.batch.iter().any(|&g| g >= batch.num_graphs) || batch.num_graphs == 0 {
            return Err(Error::Model("invalid graph assignment".to_string()));
        }
        Ok(())
    }

    fn run(&self, batch: &GraphBatch, mut dropout_rng: Option<&mut StdRng>) -> Result<(ModelOutput, ForwardTrace)> {
        self.check_batch(batch)?;
        let values = self.params.values();
        let edges = Edges {
            index: &batch.edge_index,
            relation: &batch.edge_attr,
        };
        let act = self.config.activation;
        let p = self.config.dropout;

        let mut h = batch.x.clone();
        if h.rows == 0 {
            h = Matrix::zeros(0, self.config.num_features);
        }
        let mut layer_traces = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (pre, cache) = layer.forward(values, &h, edges);
            let mut out = pre.map(|v| act.apply(v));
            let mask = match dropout_rng.as_deref_mut() {
                Some(rng) if p > 0.0 => {
                    let keep = 1.0 - p;
                    let mask: Vec<f32> = (0..out.data.len())
                        .map(|_| if rng.gen::<f32>() < p { 0.0 } else { 1.0 / keep })
                        .collect();
                    out.data.iter_mut().zip(&mask).for_each(|(v, m)| *v *= m);
                    Some(mask)
                }
                _ => None,
            };
            layer_traces.push(LayerTrace { cache, pre, mask });
            h = out;
        }

        let (nodes, node_batch, pool, pool_diag) = match &self.pooling {
            Some(pooling) => {
                let (out, cache) = pooling.forward(values, &h, &batch.batch, batch.num_graphs, edges);
                let diag = (out.perm, out.batch.clone(), out.score);
                (out.x, out.batch, Some(cache), Some(diag))
            }
            None => (h, batch.batch.clone(), None, None),
        };

        let (frames, readout_cache) =
            readout(self.config.readout_type, &nodes, &node_batch, batch.num_graphs);
        let (temporal, temporal_cache) = self.temporal.forward(values, &frames);

        let z = Matrix::row_vector(temporal.embedding.clone());
        let mut logits = linear(&z, self.classifier_weight.slice(values), NUM_CLASSES);
        add_bias(&mut logits, self.classifier_bias.slice(values));

        let (pool_perm, pool_batch, pool_score) = match pool_diag {
            Some((perm, b, score)) => (Some(perm), Some(b), Some(score)),
            None => (None, None, None),
        };
        let output = ModelOutput {
            logits: [logits.data[0], logits.data[1]],
            diagnostics: AttentionDiagnostics {
                lstm_attn_weights: temporal.attention,
                pool_perm,
                batch: pool_batch,
                pool_score,
            },
        };
        let trace = ForwardTrace {
            layers: layer_traces,
            pool,
            readout: readout_cache,
            temporal: temporal_cache,
            embedding: temporal.embedding,
        };
        Ok((output, trace))
    }

    /// Forward pass without dropout or gradient bookkeeping.
    pub fn forward(&self, batch: &GraphBatch) -> Result<ModelOutput> {
        Ok(self.run(batch, None)?.0)
    }

    /// Forward pass recording a trace; dropout applies in train mode.
    pub fn forward_train(&mut self, batch: &GraphBatch) -> Result<(ModelOutput, ForwardTrace)> {
        if self.mode == Mode::Eval {
            return self.run(batch, None);
        }
        let mut rng = self.dropout_rng.clone();
        let result = self.run(batch, Some(&mut rng));
        self.dropout_rng = rng;
        result
    }

    /// Accumulate gradients of the logits' upstream gradient `dlogits`.
    pub fn backward(&mut self, trace: &ForwardTrace, dlogits: [f32; NUM_CLASSES]) -> Result<()> {
        if trace.layers.len() != self.layers.len() {
            return Err(Error::Model(format!(
                "trace has {} layers, model has {}",
                trace.layers.len(),
                self.layers.len()
            )));
        }
        let readout_type: ReadoutType = self.config.readout_type;
        let act = self.config.activation;
        let (values, grads) = self.params.split_grads_mut();

        let z = Matrix::row_vector(trace.embedding.clone());
        let dl = Matrix::row_vector(dlogits.to_vec());
        bias_backward(&dl, self.classifier_bias.slice_mut(grads));
        let dz = linear_backward(
            &z,
            self.classifier_weight.slice(values),
            &dl,
            self.classifier_weight.slice_mut(grads),
        );

        let dframes = self.temporal.backward(values, grads, &trace.temporal, &dz.data);
        let dnodes = readout_backward(readout_type, &trace.readout, &dframes);
        let mut dh = match (&self.pooling, &trace.pool) {
            (Some(pooling), Some(cache)) => pooling.backward(values, grads, cache, &dnodes),
            _ => dnodes,
        };

        for (layer, lt) in self.layers.iter().zip(trace.layers.iter()).rev() {
            if let Some(mask) = &lt.mask {
                dh.data.iter_mut().zip(mask).for_each(|(d, m)| *d *= m);
            }
            for (d, &pre) in dh.data.iter_mut().zip(&lt.pre.data) {
                *d *= act.derivative(pre);
            }
            dh = layer.backward(values, grads, &lt.cache, &dh);
        }
        Ok(())
    }
}
