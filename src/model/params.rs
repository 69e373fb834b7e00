//! Flat parameter storage.
//!
//! Every learnable tensor of a model is a named slot in one contiguous
//! buffer, with a gradient buffer of the same length beside it. Layers keep
//! only [`ParamRef`] handles into the store.

use crate::core::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;

/// Handle to one slot of a [`ParamStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamRef {
    pub offset: usize,
    pub len: usize,
}

impl ParamRef {
    /// View this slot in a value or gradient buffer.
    pub fn slice<'a>(&self, buf: &'a [f32]) -> &'a [f32] {
        &buf[self.offset..self.offset + self.len]
    }

    pub fn slice_mut<'a>(&self, buf: &'a mut [f32]) -> &'a mut [f32] {
        &mut buf[self.offset..self.offset + self.len]
    }
}

/// Model parameters and their accumulated gradients.
#[derive(Clone, Debug, Default)]
pub struct ParamStore {
    /// Parameter values
    values: Vec<f32>,
    /// Gradients, same layout as `values`
    grads: Vec<f32>,
    /// Slot names in allocation order
    slots: Vec<(String, ParamRef)>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, data: Vec<f32>) -> ParamRef {
        let slot = ParamRef {
            offset: self.values.len(),
            len: data.len(),
        };
        self.grads.extend(std::iter::repeat(0.0).take(data.len()));
        self.values.extend(data);
        self.slots.push((name.to_string(), slot));
        slot
    }

    /// Allocate a `fan_in x fan_out` weight (or `count` of them) with
    /// Glorot-uniform values.
    pub fn glorot(
        &mut self,
        name: &str,
        count: usize,
        fan_in: usize,
        fan_out: usize,
        rng: &mut StdRng,
    ) -> ParamRef {
        let bound = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        let data = (0..count * fan_in * fan_out)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        self.push(name, data)
    }

    /// Allocate a zero-initialised slot.
    pub fn zeros(&mut self, name: &str, len: usize) -> ParamRef {
        self.push(name, vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn grads(&self) -> &[f32] {
        &self.grads
    }

    /// Values for reading alongside gradients for accumulation.
    pub fn split_grads_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.values, &mut self.grads)
    }

    /// Values for updating alongside gradients for reading.
    pub fn split_values_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.values, &self.grads)
    }

    pub fn slots(&self) -> &[(String, ParamRef)] {
        &self.slots
    }

    /// Reset gradients to zero.
    pub fn zero_grad(&mut self) {
        self.grads.fill(0.0);
    }

    /// Replace all values, e.g. from a checkpoint.
    pub fn set_values(&mut self, values: Vec<f32>) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(Error::Model(format!(
                "checkpoint holds {} parameters, model expects {}",
                values.len(),
                self.values.len()
            )));
        }
        self.values = values;
        self.zero_grad();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_allocation_layout() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut store = ParamStore::new();
        let w = store.glorot("w", 2, 3, 4, &mut rng);
        let b = store.zeros("b", 4);

        assert_eq!(w, ParamRef { offset: 0, len: 24 });
        assert_eq!(b, ParamRef { offset: 24, len: 4 });
        assert_eq!(store.len(), 28);
        assert_eq!(store.grads().len(), 28);
        assert!(b.slice(store.values()).iter().all(|&v| v == 0.0));

        let bound = (6.0f32 / 7.0).sqrt();
        assert!(w.slice(store.values()).iter().all(|v| v.abs() <= bound));
        assert_eq!(store.slots()[1].0, "b");
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let build = || {
            let mut rng = StdRng::seed_from_u64(42);
            let mut store = ParamStore::new();
            store.glorot("w", 1, 5, 5, &mut rng);
            store.values().to_vec()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_set_values_checks_length() {
        let mut store = ParamStore::new();
        store.zeros("b", 3);
        assert!(store.set_values(vec![1.0; 2]).is_err());
        store.set_values(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(store.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zero_grad() {
        let mut store = ParamStore::new();
        let b = store.zeros("b", 2);
        {
            let (_, grads) = store.split_grads_mut();
            b.slice_mut(grads).copy_from_slice(&[1.0, -1.0]);
        }
        store.zero_grad();
        assert_eq!(store.grads(), &[0.0, 0.0]);
    }
}
