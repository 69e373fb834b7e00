//! Dense row-major matrices and the linear-algebra kernels the model needs.
//!
//! Weights are stored `in_dim x out_dim` so a layer computes `y = x W + b`.

use serde::{Deserialize, Serialize};

/// Dense row-major matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    /// Zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from a flat buffer. Panics in debug builds on a size mismatch.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    /// Single-row matrix.
    pub fn row_vector(data: Vec<f32>) -> Self {
        Self {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    /// Stack rows of equal width.
    pub fn from_rows(rows: &[Vec<f32>], cols: usize) -> Self {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.cols + j]
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// Apply `f` element-wise.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Gather a subset of rows in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(indices.len(), self.cols);
        for (k, &i) in indices.iter().enumerate() {
            out.row_mut(k).copy_from_slice(self.row(i));
        }
        out
    }
}

/// `x W` where `w` is `x.cols x out_dim`.
pub fn linear(x: &Matrix, w: &[f32], out_dim: usize) -> Matrix {
    debug_assert_eq!(w.len(), x.cols * out_dim);
    let mut y = Matrix::zeros(x.rows, out_dim);
    for i in 0..x.rows {
        let xi = x.row(i);
        let yi = y.row_mut(i);
        for (k, &xv) in xi.iter().enumerate() {
            if xv == 0.0 {
                continue;
            }
            let wk = &w[k * out_dim..(k + 1) * out_dim];
            for (yv, &wv) in yi.iter_mut().zip(wk.iter()) {
                *yv += xv * wv;
            }
        }
    }
    y
}

/// Backward of [`linear`]: accumulates `x^T dy` into `dw` and returns `dy W^T`.
pub fn linear_backward(x: &Matrix, w: &[f32], dy: &Matrix, dw: &mut [f32]) -> Matrix {
    let out_dim = dy.cols;
    debug_assert_eq!(w.len(), x.cols * out_dim);
    let mut dx = Matrix::zeros(x.rows, x.cols);
    for i in 0..x.rows {
        let xi = x.row(i);
        let dyi = dy.row(i);
        let dxi = dx.row_mut(i);
        for k in 0..x.cols {
            let wk = &w[k * out_dim..(k + 1) * out_dim];
            let dwk = &mut dw[k * out_dim..(k + 1) * out_dim];
            let mut acc = 0.0;
            for j in 0..out_dim {
                acc += dyi[j] * wk[j];
                dwk[j] += xi[k] * dyi[j];
            }
            dxi[k] = acc;
        }
    }
    dx
}

/// Add a bias row to every row of `y`.
pub fn add_bias(y: &mut Matrix, b: &[f32]) {
    debug_assert_eq!(b.len(), y.cols);
    for i in 0..y.rows {
        for (v, &bv) in y.row_mut(i).iter_mut().zip(b.iter()) {
            *v += bv;
        }
    }
}

/// Accumulate the column sums of `dy` into `db`.
pub fn bias_backward(dy: &Matrix, db: &mut [f32]) {
    for i in 0..dy.rows {
        for (g, &d) in db.iter_mut().zip(dy.row(i).iter()) {
            *g += d;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        // [1 2] x [[1 0 1], [0 1 1]] = [1 2 3]
        let x = Matrix::row_vector(vec![1.0, 2.0]);
        let w = vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let y = linear(&x, &w, 3);
        assert_eq!(y.data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_linear_backward() {
        let x = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let w = vec![0.5, -1.0, 2.0, 1.0];
        let dy = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        let mut dw = vec![0.0; 4];
        let dx = linear_backward(&x, &w, &dy, &mut dw);

        // dx = dy W^T
        assert_eq!(dx.data, vec![0.5, 2.0, -1.0, 1.0]);
        // dw = x^T dy
        assert_eq!(dw, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_bias() {
        let mut y = Matrix::zeros(2, 2);
        add_bias(&mut y, &[1.0, -1.0]);
        assert_eq!(y.data, vec![1.0, -1.0, 1.0, -1.0]);

        let mut db = vec![0.0; 2];
        bias_backward(&y, &mut db);
        assert_eq!(db, vec![2.0, -2.0]);
    }

    #[test]
    fn test_softmax() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(p[2] > p[1] && p[1] > p[0]);

        let big = softmax(&[1000.0, 1000.0]);
        assert!((big[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_select_rows() {
        let m = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]);
        assert_eq!(m.select_rows(&[2, 0]).data, vec![3.0, 1.0]);
    }
}
