use alloc::vec::Vec;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Magnitude bound of seeded placeholder weights.
pub const SEED_WEIGHT_RANGE: f32 = 0.1;

pub fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Fully connected layer, weights stored row-major (`outputs` rows of `inputs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    inputs: u16,
    outputs: u16,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl Dense {
    pub fn new(
        inputs: u16,
        outputs: u16,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let layer = Self {
            inputs,
            outputs,
            weights,
            bias,
        };
        layer.check_shape()?;
        Ok(layer)
    }

    /// Layer with weights drawn uniformly from ±[`SEED_WEIGHT_RANGE`] and zero bias.
    pub fn seeded(inputs: u16, outputs: u16, rng: &mut SmallRng) -> Self {
        let count = inputs as usize * outputs as usize;
        let weights = (0..count)
            .map(|_| rng.gen_range(-SEED_WEIGHT_RANGE..SEED_WEIGHT_RANGE))
            .collect();
        Self {
            inputs,
            outputs,
            weights,
            bias: alloc::vec![0.0; outputs as usize],
        }
    }

    pub fn inputs(&self) -> usize {
        self.inputs as usize
    }

    pub fn outputs(&self) -> usize {
        self.outputs as usize
    }

    pub fn check_shape(&self) -> Result<(), ModelError> {
        let expected = self.inputs() * self.outputs();
        if expected == 0 || self.weights.len() != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                actual: self.weights.len(),
            });
        }
        if self.bias.len() != self.outputs() {
            return Err(ModelError::ShapeMismatch {
                expected: self.outputs(),
                actual: self.bias.len(),
            });
        }
        Ok(())
    }

    /// Check that the layer has the dimensions a model expects.
    pub fn expect_dims(&self, inputs: usize, outputs: usize) -> Result<(), ModelError> {
        self.check_shape()?;
        if self.inputs() != inputs || self.outputs() != outputs {
            return Err(ModelError::ShapeMismatch {
                expected: inputs * outputs,
                actual: self.weights.len(),
            });
        }
        Ok(())
    }

    /// `output[j] = bias[j] + Σ weights[j][i] * input[i]`. Extra input or
    /// output slots beyond the layer's dimensions are ignored.
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        let rows = self.weights.chunks_exact(self.inputs().max(1));
        for ((out, row), bias) in output.iter_mut().zip(rows).zip(&self.bias) {
            *out = bias + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_forward() {
        let layer = Dense::new(2, 2, vec![1.0, 2.0, 3.0, 4.0], vec![0.5, -1.0]).unwrap();
        let mut out = [0.0; 2];
        layer.forward(&[1.0, 1.0], &mut out);
        assert_eq!(out, [3.5, 6.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        assert_eq!(
            Dense::new(2, 2, vec![1.0; 3], vec![0.0; 2]),
            Err(ModelError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        );
        assert!(Dense::new(2, 2, vec![1.0; 4], vec![0.0; 1]).is_err());
        assert!(Dense::new(0, 2, vec![], vec![0.0; 2]).is_err());
    }

    #[test]
    fn test_seeded_is_deterministic_and_bounded() {
        let a = Dense::seeded(5, 8, &mut seeded_rng(7));
        let b = Dense::seeded(5, 8, &mut seeded_rng(7));
        assert_eq!(a, b);
        assert_eq!(a.check_shape(), Ok(()));
        assert!(a.weights.iter().all(|w| libm::fabsf(*w) <= SEED_WEIGHT_RANGE));
    }
}
