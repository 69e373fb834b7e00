//! Per-frame graph readout.

use crate::config::ReadoutType;
use crate::model::tensor::Matrix;

#[derive(Clone, Debug)]
pub struct ReadoutCache {
    num_nodes: usize,
    batch: Vec<usize>,
    counts: Vec<usize>,
    /// Winning node per (frame, column) for max readout
    argmax: Option<Vec<Option<usize>>>,
}

/// Collapse node rows into one row per frame. Frames without nodes read out
/// as zeros.
pub fn readout(kind: ReadoutType, x: &Matrix, batch: &[usize], num_graphs: usize) -> (Matrix, ReadoutCache) {
    let d = x.cols;
    let mut out = Matrix::zeros(num_graphs, d);
    let mut counts = vec![0usize; num_graphs];
    for &g in batch {
        counts[g] += 1;
    }

    let argmax = match kind {
        ReadoutType::Add | ReadoutType::Mean => {
            for (node, &g) in batch.iter().enumerate() {
                for (o, &v) in out.row_mut(g).iter_mut().zip(x.row(node)) {
                    *o += v;
                }
            }
            if kind == ReadoutType::Mean {
                for (g, &c) in counts.iter().enumerate() {
                    if c > 0 {
                        out.row_mut(g).iter_mut().for_each(|v| *v /= c as f32);
                    }
                }
            }
            None
        }
        ReadoutType::Max => {
            let mut winners: Vec<Option<usize>> = vec![None; num_graphs * d];
            for (node, &g) in batch.iter().enumerate() {
                for c in 0..d {
                    let slot = &mut winners[g * d + c];
                    match *slot {
                        Some(best) if x.get(best, c) >= x.get(node, c) => {}
                        _ => *slot = Some(node),
                    }
                }
            }
            for (k, winner) in winners.iter().enumerate() {
                if let Some(node) = winner {
                    out.data[k] = x.get(*node, k % d);
                }
            }
            Some(winners)
        }
    };

    let cache = ReadoutCache {
        num_nodes: x.rows,
        batch: batch.to_vec(),
        counts,
        argmax,
    };
    (out, cache)
}

/// Gradient of [`readout`] with respect to its node rows.
pub fn readout_backward(kind: ReadoutType, cache: &ReadoutCache, dout: &Matrix) -> Matrix {
    let d = dout.cols;
    let mut dx = Matrix::zeros(cache.num_nodes, d);
    match &cache.argmax {
        Some(winners) => {
            for (k, winner) in winners.iter().enumerate() {
                if let Some(node) = winner {
                    dx.row_mut(*node)[k % d] += dout.data[k];
                }
            }
        }
        None => {
            for (node, &g) in cache.batch.iter().enumerate() {
                let scale = if kind == ReadoutType::Mean {
                    1.0 / cache.counts[g] as f32
                } else {
                    1.0
                };
                for (dv, &g_out) in dx.row_mut(node).iter_mut().zip(dout.row(g)) {
                    *dv = g_out * scale;
                }
            }
        }
    }
    dx
}
