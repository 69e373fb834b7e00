//! Temporal aggregation over per-frame graph embeddings.
//!
//! Frames are combined either by a plain mean or by an LSTM whose states are
//! reduced by taking the last one, summing them, or attention-weighting them.

use crate::config::{Activation, TemporalType};
use crate::model::params::{ParamRef, ParamStore};
use crate::model::tensor::{
    add_bias, bias_backward, dot, linear, linear_backward, sigmoid, softmax, Matrix,
};
use rand::rngs::StdRng;

/// Configuration for temporal aggregation.
#[derive(Clone, Debug)]
pub struct TemporalConfig {
    /// Aggregation strategy
    pub kind: TemporalType,
    /// Width of each frame embedding
    pub input_dim: usize,
    /// Width of the LSTM input projection
    pub lstm_input_dim: usize,
    /// LSTM hidden width
    pub lstm_output_dim: usize,
    /// Activation of the input projection
    pub activation: Activation,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            kind: TemporalType::LstmAttn,
            input_dim: 32,
            lstm_input_dim: 50,
            lstm_output_dim: 20,
            activation: Activation::Relu,
        }
    }
}

#[derive(Clone, Debug)]
struct LstmSlots {
    proj_weight: ParamRef,
    proj_bias: ParamRef,
    /// Input-to-gates, `lstm_input_dim x 4H`, gate order i, f, g, o
    w_input: ParamRef,
    /// Hidden-to-gates, `H x 4H`
    w_hidden: ParamRef,
    bias: ParamRef,
    /// Attention scorer weight and bias
    attention: Option<(ParamRef, ParamRef)>,
}

#[derive(Clone, Debug)]
struct LstmCache {
    proj_pre: Matrix,
    input: Matrix,
    /// Activated gates per step, `T x 4H`
    gates: Matrix,
    cells: Matrix,
    states: Matrix,
    attention: Option<Vec<f32>>,
}

#[derive(Clone, Debug)]
pub struct TemporalCache {
    frames: Matrix,
    lstm: Option<LstmCache>,
}

/// Sequence-level embedding and optional attention weights over frames.
#[derive(Clone, Debug)]
pub struct TemporalOutput {
    pub embedding: Vec<f32>,
    pub attention: Option<Vec<f32>>,
}

/// Temporal aggregation head.
#[derive(Clone, Debug)]
pub struct TemporalHead {
    pub config: TemporalConfig,
    lstm: Option<LstmSlots>,
}

impl TemporalHead {
    pub fn new(config: TemporalConfig, params: &mut ParamStore, rng: &mut StdRng) -> Self {
        let lstm = config.kind.uses_lstm().then(|| {
            let (d, p, h) = (config.input_dim, config.lstm_input_dim, config.lstm_output_dim);
            LstmSlots {
                proj_weight: params.glorot("temporal.proj.weight", 1, d, p, rng),
                proj_bias: params.zeros("temporal.proj.bias", p),
                w_input: params.glorot("temporal.lstm.w_input", 1, p, 4 * h, rng),
                w_hidden: params.glorot("temporal.lstm.w_hidden", 1, h, 4 * h, rng),
                bias: params.zeros("temporal.lstm.bias", 4 * h),
                attention: (config.kind == TemporalType::LstmAttn).then(|| {
                    (
                        params.glorot("temporal.attn.weight", 1, h, 1, rng),
                        params.zeros("temporal.attn.bias", 1),
                    )
                }),
            }
        });
        Self { config, lstm }
    }

    /// Width of the sequence embedding.
    pub fn out_dim(&self) -> usize {
        if self.config.kind.uses_lstm() {
            self.config.lstm_output_dim
        } else {
            self.config.input_dim
        }
    }

    /// Aggregate `T x input_dim` frame embeddings.
    pub fn forward(&self, values: &[f32], frames: &Matrix) -> (TemporalOutput, TemporalCache) {
        let Some(slots) = &self.lstm else {
            let t = frames.rows.max(1) as f32;
            let mut embedding = vec![0.0; frames.cols];
            for i in 0..frames.rows {
                for (e, &v) in embedding.iter_mut().zip(frames.row(i)) {
                    *e += v / t;
                }
            }
            let cache = TemporalCache {
                frames: frames.clone(),
                lstm: None,
            };
            return (TemporalOutput { embedding, attention: None }, cache);
        };

        let h = self.config.lstm_output_dim;
        let act = self.config.activation;
        let mut proj_pre = linear(frames, slots.proj_weight.slice(values), self.config.lstm_input_dim);
        add_bias(&mut proj_pre, slots.proj_bias.slice(values));
        let input = proj_pre.map(|v| act.apply(v));

        let mut pre_gates = linear(&input, slots.w_input.slice(values), 4 * h);
        add_bias(&mut pre_gates, slots.bias.slice(values));
        let w_hidden = slots.w_hidden.slice(values);

        let steps = frames.rows;
        let mut gates = Matrix::zeros(steps, 4 * h);
        let mut cells = Matrix::zeros(steps, h);
        let mut states = Matrix::zeros(steps, h);
        let mut h_prev = vec![0.0; h];
        let mut c_prev = vec![0.0; h];
        for t in 0..steps {
            let mut a = pre_gates.row(t).to_vec();
            for (k, &hv) in h_prev.iter().enumerate() {
                for (av, &w) in a.iter_mut().zip(&w_hidden[k * 4 * h..(k + 1) * 4 * h]) {
                    *av += hv * w;
                }
            }
            let g_row = gates.row_mut(t);
            for k in 0..h {
                g_row[k] = sigmoid(a[k]);
                g_row[h + k] = sigmoid(a[h + k]);
                g_row[2 * h + k] = a[2 * h + k].tanh();
                g_row[3 * h + k] = sigmoid(a[3 * h + k]);
            }
            for k in 0..h {
                let (i, f, g, o) = (g_row[k], g_row[h + k], g_row[2 * h + k], g_row[3 * h + k]);
                c_prev[k] = f * c_prev[k] + i * g;
                h_prev[k] = o * c_prev[k].tanh();
            }
            cells.row_mut(t).copy_from_slice(&c_prev);
            states.row_mut(t).copy_from_slice(&h_prev);
        }

        let (embedding, attention) = match self.config.kind {
            TemporalType::LstmSum => {
                let mut sum = vec![0.0; h];
                for t in 0..steps {
                    sum.iter_mut().zip(states.row(t)).for_each(|(s, &v)| *s += v);
                }
                (sum, None)
            }
            TemporalType::LstmAttn => {
                let (w, b) = slots.attention.map_or((&[][..], 0.0), |(w, b)| {
                    (w.slice(values), b.slice(values)[0])
                });
                let scores: Vec<f32> = (0..steps).map(|t| dot(states.row(t), w) + b).collect();
                let alpha = softmax(&scores);
                let mut pooled = vec![0.0; h];
                for (t, &a) in alpha.iter().enumerate() {
                    pooled.iter_mut().zip(states.row(t)).for_each(|(s, &v)| *s += a * v);
                }
                (pooled, Some(alpha))
            }
            _ => (h_prev, None),
        };

        let cache = TemporalCache {
            frames: frames.clone(),
            lstm: Some(LstmCache {
                proj_pre,
                input,
                gates,
                cells,
                states,
                attention: attention.clone(),
            }),
        };
        (TemporalOutput { embedding, attention }, cache)
    }

    /// Accumulate parameter gradients and return the frame gradients.
    pub fn backward(&self, values: &[f32], grads: &mut [f32], cache: &TemporalCache, dz: &[f32]) -> Matrix {
        let frames = &cache.frames;
        let (Some(slots), Some(lc)) = (&self.lstm, &cache.lstm) else {
            let t = frames.rows.max(1) as f32;
            let mut dframes = Matrix::zeros(frames.rows, frames.cols);
            for i in 0..frames.rows {
                dframes.row_mut(i).iter_mut().zip(dz).for_each(|(d, &g)| *d = g / t);
            }
            return dframes;
        };

        let h = self.config.lstm_output_dim;
        let steps = frames.rows;

        // gradient reaching each hidden state from the reduction
        let mut dstates = Matrix::zeros(steps, h);
        match (self.config.kind, &lc.attention, slots.attention) {
            (TemporalType::LstmSum, _, _) => {
                for t in 0..steps {
                    dstates.row_mut(t).copy_from_slice(dz);
                }
            }
            (TemporalType::LstmAttn, Some(alpha), Some((w_ref, b_ref))) => {
                let w = w_ref.slice(values);
                let dalpha: Vec<f32> = (0..steps).map(|t| dot(dz, lc.states.row(t))).collect();
                let mean: f32 = alpha.iter().zip(&dalpha).map(|(a, d)| a * d).sum();
                let de: Vec<f32> = alpha.iter().zip(&dalpha).map(|(a, d)| a * (d - mean)).collect();
                for t in 0..steps {
                    let row = dstates.row_mut(t);
                    for k in 0..h {
                        row[k] = alpha[t] * dz[k] + de[t] * w[k];
                    }
                }
                let dw = w_ref.slice_mut(grads);
                for t in 0..steps {
                    dw.iter_mut().zip(lc.states.row(t)).for_each(|(g, &v)| *g += de[t] * v);
                }
                b_ref.slice_mut(grads)[0] += de.iter().sum::<f32>();
            }
            _ => {
                if steps > 0 {
                    dstates.row_mut(steps - 1).copy_from_slice(dz);
                }
            }
        }

        let w_hidden = slots.w_hidden.slice(values);
        let mut dgates = Matrix::zeros(steps, 4 * h);
        let mut dh_next = vec![0.0; h];
        let mut dc_next = vec![0.0; h];
        for t in (0..steps).rev() {
            let g_row = lc.gates.row(t);
            let da = dgates.row_mut(t);
            for k in 0..h {
                let dh = dstates.get(t, k) + dh_next[k];
                let (i, f, g, o) = (g_row[k], g_row[h + k], g_row[2 * h + k], g_row[3 * h + k]);
                let tc = lc.cells.get(t, k).tanh();
                let c_prev = if t > 0 { lc.cells.get(t - 1, k) } else { 0.0 };
                let dc = dc_next[k] + dh * o * (1.0 - tc * tc);
                dc_next[k] = dc * f;
                da[k] = dc * g * i * (1.0 - i);
                da[h + k] = dc * c_prev * f * (1.0 - f);
                da[2 * h + k] = dc * i * (1.0 - g * g);
                da[3 * h + k] = dh * tc * o * (1.0 - o);
            }
            let dw_hidden = slots.w_hidden.slice_mut(grads);
            for k in 0..h {
                let h_prev = if t > 0 { lc.states.get(t - 1, k) } else { 0.0 };
                let w_row = &w_hidden[k * 4 * h..(k + 1) * 4 * h];
                let dw_row = &mut dw_hidden[k * 4 * h..(k + 1) * 4 * h];
                let mut acc = 0.0;
                for j in 0..4 * h {
                    acc += da[j] * w_row[j];
                    dw_row[j] += h_prev * da[j];
                }
                dh_next[k] = acc;
            }
        }

        bias_backward(&dgates, slots.bias.slice_mut(grads));
        let dinput = linear_backward(
            &lc.input,
            slots.w_input.slice(values),
            &dgates,
            slots.w_input.slice_mut(grads),
        );

        let act = self.config.activation;
        let mut dproj = dinput;
        for (d, &p) in dproj.data.iter_mut().zip(&lc.proj_pre.data) {
            *d *= act.derivative(p);
        }
        bias_backward(&dproj, slots.proj_bias.slice_mut(grads));
        linear_backward(
            frames,
            slots.proj_weight.slice(values),
            &dproj,
            slots.proj_weight.slice_mut(grads),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn head(kind: TemporalType) -> (TemporalHead, ParamStore) {
        let mut rng = StdRng::seed_from_u64(5);
        let mut params = ParamStore::new();
        let config = TemporalConfig {
            kind,
            input_dim: 3,
            lstm_input_dim: 4,
            lstm_output_dim: 2,
            activation: Activation::LeakyRelu,
        };
        (TemporalHead::new(config, &mut params, &mut rng), params)
    }

    fn frames() -> Matrix {
        Matrix::from_vec(3, 3, vec![0.2, -0.4, 0.9, 0.5, 0.1, -0.3, -0.7, 0.8, 0.05])
    }

    #[test]
    fn test_mean_head() {
        let (head, params) = head(TemporalType::Mean);
        assert!(params.is_empty());
        let x = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let (out, _) = head.forward(params.values(), &x);
        assert_eq!(out.embedding, vec![2.0, 3.0]);
        assert!(out.attention.is_none());
    }

    #[test]
    fn test_attention_weights_sum_to_one() {
        let (head, params) = head(TemporalType::LstmAttn);
        let (out, _) = head.forward(params.values(), &frames());
        let alpha = out.attention.unwrap();
        assert_eq!(alpha.len(), 3);
        assert!((alpha.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(out.embedding.len(), 2);
    }

    #[test]
    fn test_lstm_variants_share_states() {
        let (last, params) = head(TemporalType::LstmLast);
        let (sum, _) = head(TemporalType::LstmSum);
        let (a, _) = last.forward(params.values(), &frames());
        let (b, cache) = sum.forward(params.values(), &frames());
        let states = &cache.lstm.unwrap().states;
        assert_eq!(a.embedding, states.row(2).to_vec());
        let manual: f32 = (0..3).map(|t| states.get(t, 0)).sum();
        assert!((b.embedding[0] - manual).abs() < 1e-6);
    }

    fn numeric_check(kind: TemporalType) {
        let (head, mut params) = head(kind);
        // keep the input projection in its linear region
        let mut shifted = params.values().to_vec();
        if let Some(slots) = &head.lstm {
            slots.proj_bias.slice_mut(&mut shifted).fill(3.0);
        }
        params.set_values(shifted).unwrap();
        let x = frames();
        // objective: sum of embedding weighted by fixed coefficients
        let coeff = [0.7f32, -1.3];
        let objective = |values: &[f32]| -> f32 {
            let (out, _) = head.forward(values, &x);
            out.embedding.iter().zip(coeff.iter()).map(|(e, c)| e * c).sum()
        };

        let (_, cache) = head.forward(params.values(), &x);
        let (values, grads) = params.split_grads_mut();
        head.backward(values, grads, &cache, &coeff);

        let base = params.values().to_vec();
        let eps = 1e-3;
        for i in 0..base.len() {
            let mut plus = base.clone();
            plus[i] += eps;
            let mut minus = base.clone();
            minus[i] -= eps;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
            let analytic = params.grads()[i];
            assert!(
                (numeric - analytic).abs() < 2e-3 + 0.05 * numeric.abs(),
                "param {}: numeric {} analytic {}",
                i,
                numeric,
                analytic
            );
        }
    }

    #[test]
    fn test_lstm_attn_gradients() {
        numeric_check(TemporalType::LstmAttn);
    }

    #[test]
    fn test_lstm_sum_gradients() {
        numeric_check(TemporalType::LstmSum);
    }
}
