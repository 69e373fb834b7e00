//! Node-selection pooling per frame.
//!
//! Scores every node, gates it with `tanh(score)` and keeps the
//! `ceil(ratio * n)` highest scoring nodes of every frame.

use crate::model::conv::Edges;
use crate::model::params::{ParamRef, ParamStore};
use crate::model::tensor::{dot, Matrix};
use rand::rngs::StdRng;

/// Scoring function of a pooling layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolScorer {
    /// Projection onto a learned direction
    TopK,
    /// One-layer graph convolution over incoming neighbours
    SelfAttention,
}

/// Pooled nodes and the selection that produced them.
#[derive(Clone, Debug)]
pub struct PoolOutput {
    /// Kept rows, each scaled by its gate
    pub x: Matrix,
    /// Frame index of every kept node
    pub batch: Vec<usize>,
    /// Original index of every kept node
    pub perm: Vec<usize>,
    /// Gate of every kept node
    pub score: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct PoolCache {
    input: Matrix,
    raw: Vec<f32>,
    gate: Vec<f32>,
    perm: Vec<usize>,
    edges: Vec<(usize, usize)>,
}

#[derive(Clone, Debug)]
pub struct Pooling {
    scorer: PoolScorer,
    ratio: f32,
    weight: ParamRef,
    /// Neighbour weight and bias (self-attention scorer only)
    neighbour: Option<(ParamRef, ParamRef)>,
}

impl Pooling {
    pub fn new(scorer: PoolScorer, dim: usize, ratio: f32, params: &mut ParamStore, rng: &mut StdRng) -> Self {
        let weight = params.glorot("pool.weight", 1, dim, 1, rng);
        let neighbour = match scorer {
            PoolScorer::TopK => None,
            PoolScorer::SelfAttention => Some((
                params.glorot("pool.neighbour", 1, dim, 1, rng),
                params.zeros("pool.bias", 1),
            )),
        };
        Self {
            scorer,
            ratio,
            weight,
            neighbour,
        }
    }

    /// Nodes kept from a frame of `n` nodes.
    pub fn keep_count(&self, n: usize) -> usize {
        ((self.ratio * n as f32).ceil() as usize).clamp(n.min(1), n)
    }

    fn raw_scores(&self, values: &[f32], x: &Matrix, edges: Edges<'_>) -> Vec<f32> {
        let p = self.weight.slice(values);
        match self.neighbour {
            None => {
                let norm = p.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
                (0..x.rows).map(|i| dot(x.row(i), p) / norm).collect()
            }
            Some((q, b)) => {
                let q = q.slice(values);
                let b = b.slice(values)[0];
                let from_neighbour: Vec<f32> = (0..x.rows).map(|i| dot(x.row(i), q)).collect();
                let mut raw: Vec<f32> = (0..x.rows).map(|i| dot(x.row(i), p) + b).collect();
                for &(src, dst) in edges.index {
                    raw[dst] += from_neighbour[src];
                }
                raw
            }
        }
    }

    pub fn forward(
        &self,
        values: &[f32],
        x: &Matrix,
        batch: &[usize],
        num_graphs: usize,
        edges: Edges<'_>,
    ) -> (PoolOutput, PoolCache) {
        let raw = self.raw_scores(values, x, edges);
        let gate: Vec<f32> = raw.iter().map(|r| r.tanh()).collect();

        let mut per_graph: Vec<Vec<usize>> = vec![Vec::new(); num_graphs];
        for (node, &g) in batch.iter().enumerate() {
            per_graph[g].push(node);
        }

        let mut perm = Vec::with_capacity(x.rows);
        for mut nodes in per_graph {
            let k = self.keep_count(nodes.len());
            nodes.sort_by(|&a, &b| {
                gate[b]
                    .partial_cmp(&gate[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            perm.extend_from_slice(&nodes[..k]);
        }

        let mut pooled = x.select_rows(&perm);
        for (k, &node) in perm.iter().enumerate() {
            let s = gate[node];
            pooled.row_mut(k).iter_mut().for_each(|v| *v *= s);
        }

        let output = PoolOutput {
            x: pooled,
            batch: perm.iter().map(|&i| batch[i]).collect(),
            score: perm.iter().map(|&i| gate[i]).collect(),
            perm: perm.clone(),
        };
        let cache = PoolCache {
            input: x.clone(),
            raw,
            gate,
            perm,
            edges: edges.index.to_vec(),
        };
        (output, cache)
    }

    pub fn backward(&self, values: &[f32], grads: &mut [f32], cache: &PoolCache, dout: &Matrix) -> Matrix {
        let x = &cache.input;
        let mut dx = Matrix::zeros(x.rows, x.cols);
        let mut draw = vec![0.0f32; x.rows];

        for (k, &node) in cache.perm.iter().enumerate() {
            let s = cache.gate[node];
            let mut ds = 0.0;
            for ((d, &g), &v) in dx.row_mut(node).iter_mut().zip(dout.row(k)).zip(x.row(node)) {
                *d += g * s;
                ds += g * v;
            }
            draw[node] = ds * (1.0 - s * s);
        }

        let p = self.weight.slice(values).to_vec();
        match self.neighbour {
            None => {
                let norm = p.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
                let dp = self.weight.slice_mut(grads);
                for (node, &dr) in draw.iter().enumerate() {
                    if dr == 0.0 {
                        continue;
                    }
                    let raw = cache.raw[node];
                    for (c, &xv) in x.row(node).iter().enumerate() {
                        dx.row_mut(node)[c] += dr * p[c] / norm;
                        dp[c] += dr * (xv / norm - raw * p[c] / (norm * norm));
                    }
                }
            }
            Some((q_ref, b_ref)) => {
                let q = q_ref.slice(values).to_vec();
                b_ref.slice_mut(grads)[0] += draw.iter().sum::<f32>();
                {
                    let dp = self.weight.slice_mut(grads);
                    for (node, &dr) in draw.iter().enumerate() {
                        for (c, &xv) in x.row(node).iter().enumerate() {
                            dx.row_mut(node)[c] += dr * p[c];
                            dp[c] += dr * xv;
                        }
                    }
                }
                let dq = q_ref.slice_mut(grads);
                for &(src, dst) in &cache.edges {
                    let dr = draw[dst];
                    for (c, &xv) in x.row(src).iter().enumerate() {
                        dx.row_mut(src)[c] += dr * q[c];
                        dq[c] += dr * xv;
                    }
                }
            }
        }
        dx
    }
}
