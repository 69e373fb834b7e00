//! Relational graph convolutions.
//!
//! Messages flow along `(src, dst)` edges and are aggregated at `dst`
//! separately for every relation type, each relation with its own weight.
//! - `RgcnLayer`: mean aggregation per relation plus a root transform
//! - `RginLayer`: sum aggregation per relation followed by a two-layer MLP

use crate::model::params::{ParamRef, ParamStore};
use crate::model::tensor::{add_bias, bias_backward, linear, linear_backward, Matrix};
use rand::rngs::StdRng;

/// Typed edge list of a graph batch.
#[derive(Clone, Copy, Debug)]
pub struct Edges<'a> {
    pub index: &'a [(usize, usize)],
    pub relation: &'a [usize],
}

/// How neighbour messages of one relation are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
}

/// Aggregated neighbour features of one relation type.
#[derive(Clone, Debug)]
pub struct RelationAggregate {
    relation: usize,
    /// Edges of this relation
    edges: Vec<(usize, usize)>,
    /// Per-node normaliser applied to the aggregate
    scale: Vec<f32>,
    /// `num_nodes x in_dim`
    agg: Matrix,
}

/// Values a conv layer needs to run backward.
#[derive(Clone, Debug)]
pub struct ConvCache {
    input: Matrix,
    aggregates: Vec<RelationAggregate>,
    /// MLP pre-activation and activation (GIN layers only)
    hidden: Option<(Matrix, Matrix)>,
}

/// A message-passing layer conditioned on edge relation type.
pub trait RelationalConv: Sized {
    fn new(
        name: &str,
        in_dim: usize,
        out_dim: usize,
        num_relations: usize,
        params: &mut ParamStore,
        rng: &mut StdRng,
    ) -> Self;

    fn out_dim(&self) -> usize;

    /// Layer output (before the stack's activation) and its backward cache.
    fn forward(&self, values: &[f32], x: &Matrix, edges: Edges<'_>) -> (Matrix, ConvCache);

    /// Accumulate parameter gradients and return the input gradient.
    fn backward(&self, values: &[f32], grads: &mut [f32], cache: &ConvCache, dout: &Matrix) -> Matrix;
}

/// Root transform plus per-relation neighbour transforms.
#[derive(Clone, Debug)]
struct RelationalMessage {
    in_dim: usize,
    out_dim: usize,
    num_relations: usize,
    aggregation: Aggregation,
    root: ParamRef,
    relations: ParamRef,
    bias: ParamRef,
}

impl RelationalMessage {
    fn new(
        name: &str,
        in_dim: usize,
        out_dim: usize,
        num_relations: usize,
        aggregation: Aggregation,
        params: &mut ParamStore,
        rng: &mut StdRng,
    ) -> Self {
        let root = params.glorot(&format!("{}.root", name), 1, in_dim, out_dim, rng);
        let relations =
            params.glorot(&format!("{}.relations", name), num_relations, in_dim, out_dim, rng);
        let bias = params.zeros(&format!("{}.bias", name), out_dim);
        Self {
            in_dim,
            out_dim,
            num_relations,
            aggregation,
            root,
            relations,
            bias,
        }
    }

    fn block(&self, relation: usize) -> std::ops::Range<usize> {
        let size = self.in_dim * self.out_dim;
        relation * size..(relation + 1) * size
    }

    fn forward(&self, values: &[f32], x: &Matrix, edges: Edges<'_>) -> (Matrix, Vec<RelationAggregate>) {
        let n = x.rows;
        let mut out = linear(x, self.root.slice(values), self.out_dim);
        add_bias(&mut out, self.bias.slice(values));

        let mut grouped: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.num_relations];
        for (&edge, &rel) in edges.index.iter().zip(edges.relation.iter()) {
            grouped[rel].push(edge);
        }

        let weights = self.relations.slice(values);
        let mut aggregates = Vec::new();
        for (relation, rel_edges) in grouped.into_iter().enumerate() {
            if rel_edges.is_empty() {
                continue;
            }
            let mut agg = Matrix::zeros(n, self.in_dim);
            let mut degree = vec![0usize; n];
            for &(src, dst) in &rel_edges {
                for (a, &v) in agg.row_mut(dst).iter_mut().zip(x.row(src).iter()) {
                    *a += v;
                }
                degree[dst] += 1;
            }
            let scale: Vec<f32> = degree
                .iter()
                .map(|&d| match self.aggregation {
                    Aggregation::Mean if d > 0 => 1.0 / d as f32,
                    _ => 1.0,
                })
                .collect();
            for (i, &s) in scale.iter().enumerate() {
                if s != 1.0 {
                    agg.row_mut(i).iter_mut().for_each(|v| *v *= s);
                }
            }
            out.add_assign(&linear(&agg, &weights[self.block(relation)], self.out_dim));
            aggregates.push(RelationAggregate {
                relation,
                edges: rel_edges,
                scale,
                agg,
            });
        }
        (out, aggregates)
    }

    fn backward(
        &self,
        values: &[f32],
        grads: &mut [f32],
        input: &Matrix,
        aggregates: &[RelationAggregate],
        dout: &Matrix,
    ) -> Matrix {
        bias_backward(dout, self.bias.slice_mut(grads));
        let mut dx = linear_backward(input, self.root.slice(values), dout, self.root.slice_mut(grads));

        let weights = self.relations.slice(values);
        for aggregate in aggregates {
            let block = self.block(aggregate.relation);
            let dweights = &mut self.relations.slice_mut(grads)[block.clone()];
            let dagg = linear_backward(&aggregate.agg, &weights[block], dout, dweights);
            for &(src, dst) in &aggregate.edges {
                let s = aggregate.scale[dst];
                let grad_dst = dagg.row(dst);
                for (d, &g) in dx.row_mut(src).iter_mut().zip(grad_dst.iter()) {
                    *d += s * g;
                }
            }
        }
        dx
    }
}

/// Relational GCN layer (mean aggregation).
#[derive(Clone, Debug)]
pub struct RgcnLayer {
    message: RelationalMessage,
}

impl RelationalConv for RgcnLayer {
    fn new(
        name: &str,
        in_dim: usize,
        out_dim: usize,
        num_relations: usize,
        params: &mut ParamStore,
        rng: &mut StdRng,
    ) -> Self {
        Self {
            message: RelationalMessage::new(
                name,
                in_dim,
                out_dim,
                num_relations,
                Aggregation::Mean,
                params,
                rng,
            ),
        }
    }

    fn out_dim(&self) -> usize {
        self.message.out_dim
    }

    fn forward(&self, values: &[f32], x: &Matrix, edges: Edges<'_>) -> (Matrix, ConvCache) {
        let (out, aggregates) = self.message.forward(values, x, edges);
        let cache = ConvCache {
            input: x.clone(),
            aggregates,
            hidden: None,
        };
        (out, cache)
    }

    fn backward(&self, values: &[f32], grads: &mut [f32], cache: &ConvCache, dout: &Matrix) -> Matrix {
        self.message
            .backward(values, grads, &cache.input, &cache.aggregates, dout)
    }
}

/// Relational GIN layer (sum aggregation, ReLU MLP).
#[derive(Clone, Debug)]
pub struct RginLayer {
    message: RelationalMessage,
    mlp_weight: ParamRef,
    mlp_bias: ParamRef,
}

impl RelationalConv for RginLayer {
    fn new(
        name: &str,
        in_dim: usize,
        out_dim: usize,
        num_relations: usize,
        params: &mut ParamStore,
        rng: &mut StdRng,
    ) -> Self {
        let message = RelationalMessage::new(
            name,
            in_dim,
            out_dim,
            num_relations,
            Aggregation::Sum,
            params,
            rng,
        );
        let mlp_weight = params.glorot(&format!("{}.mlp.weight", name), 1, out_dim, out_dim, rng);
        let mlp_bias = params.zeros(&format!("{}.mlp.bias", name), out_dim);
        Self {
            message,
            mlp_weight,
            mlp_bias,
        }
    }

    fn out_dim(&self) -> usize {
        self.message.out_dim
    }

    fn forward(&self, values: &[f32], x: &Matrix, edges: Edges<'_>) -> (Matrix, ConvCache) {
        let (pre, aggregates) = self.message.forward(values, x, edges);
        let hidden = pre.map(|v| v.max(0.0));
        let mut out = linear(&hidden, self.mlp_weight.slice(values), self.message.out_dim);
        add_bias(&mut out, self.mlp_bias.slice(values));
        let cache = ConvCache {
            input: x.clone(),
            aggregates,
            hidden: Some((pre, hidden)),
        };
        (out, cache)
    }

    fn backward(&self, values: &[f32], grads: &mut [f32], cache: &ConvCache, dout: &Matrix) -> Matrix {
        let Some((pre, hidden)) = &cache.hidden else {
            return self
                .message
                .backward(values, grads, &cache.input, &cache.aggregates, dout);
        };
        bias_backward(dout, self.mlp_bias.slice_mut(grads));
        let mut dpre = linear_backward(
            hidden,
            self.mlp_weight.slice(values),
            dout,
            self.mlp_weight.slice_mut(grads),
        );
        for (d, &p) in dpre.data.iter_mut().zip(pre.data.iter()) {
            if p <= 0.0 {
                *d = 0.0;
            }
        }
        self.message
            .backward(values, grads, &cache.input, &cache.aggregates, &dpre)
    }
}
