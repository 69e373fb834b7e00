//! Adam optimizer with L2 weight decay.

use crate::model::params::ParamStore;

/// Optimizer configuration.
#[derive(Clone, Debug)]
pub struct AdamConfig {
    /// Step size
    pub learning_rate: f32,
    /// First moment decay
    pub beta1: f32,
    /// Second moment decay
    pub beta2: f32,
    /// Denominator epsilon
    pub eps: f32,
    /// L2 penalty added to every gradient
    pub weight_decay: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

/// Adam bound to one parameter store's layout.
#[derive(Clone, Debug)]
pub struct Adam {
    pub config: AdamConfig,
    first_moment: Vec<f32>,
    second_moment: Vec<f32>,
    step: u32,
}

impl Adam {
    pub fn new(config: AdamConfig, param_count: usize) -> Self {
        Self {
            config,
            first_moment: vec![0.0; param_count],
            second_moment: vec![0.0; param_count],
            step: 0,
        }
    }

    /// Number of steps taken.
    pub fn steps(&self) -> u32 {
        self.step
    }

    /// Apply the accumulated gradients.
    pub fn step(&mut self, params: &mut ParamStore) {
        self.step += 1;
        let c = &self.config;
        let bias1 = 1.0 - c.beta1.powi(self.step as i32);
        let bias2 = 1.0 - c.beta2.powi(self.step as i32);

        let (values, grads) = params.split_values_mut();
        for (((theta, &grad), m), v) in values
            .iter_mut()
            .zip(grads)
            .zip(self.first_moment.iter_mut())
            .zip(self.second_moment.iter_mut())
        {
            let g = grad + c.weight_decay * *theta;
            *m = c.beta1 * *m + (1.0 - c.beta1) * g;
            *v = c.beta2 * *v + (1.0 - c.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *theta -= c.learning_rate * m_hat / (v_hat.sqrt() + c.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(values: Vec<f32>, grads: Vec<f32>) -> ParamStore {
        let mut params = ParamStore::new();
        let slot = params.zeros("w", values.len());
        params.set_values(values).unwrap();
        let (_, g) = params.split_grads_mut();
        slot.slice_mut(g).copy_from_slice(&grads);
        params
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut params = store(vec![1.0, -1.0], vec![0.5, -2.0]);
        let mut adam = Adam::new(AdamConfig::default().with_learning_rate(0.1), 2);
        adam.step(&mut params);

        // bias-corrected first step is lr * sign(g)
        assert!((params.values()[0] - 0.9).abs() < 1e-5);
        assert!((params.values()[1] + 0.9).abs() < 1e-5);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_weight_decay_shrinks_without_gradient() {
        let mut params = store(vec![2.0], vec![0.0]);
        let mut adam = Adam::new(
            AdamConfig::default()
                .with_learning_rate(0.01)
                .with_weight_decay(0.1),
            1,
        );
        adam.step(&mut params);
        assert!(params.values()[0] < 2.0);
    }

    #[test]
    fn test_descends_quadratic() {
        // minimise (w - 3)^2
        let mut params = store(vec![0.0], vec![0.0]);
        let mut adam = Adam::new(AdamConfig::default().with_learning_rate(0.1), 1);
        for _ in 0..500 {
            let w = params.values()[0];
            params.zero_grad();
            let (_, g) = params.split_grads_mut();
            g[0] = 2.0 * (w - 3.0);
            adam.step(&mut params);
        }
        assert!((params.values()[0] - 3.0).abs() < 0.1);
    }
}
