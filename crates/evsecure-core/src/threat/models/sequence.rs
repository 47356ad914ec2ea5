//! Recurrent scorer over a short window of samples
//!
//! A single LSTM cell is unrolled over the newest `window` feature vectors,
//! starting from a zero state every tick, and the final hidden state is
//! projected to a threat probability.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::dense::{Dense, seeded_rng};
use super::{ModelError, sigmoid};
use crate::config::MonitorConfig;
use crate::sensors::SensorSample;
use crate::threat::ModelKind;
use crate::threat::ensemble::{ModelOutput, ThreatModel};
use crate::threat::features::{FEATURE_COUNT, FeatureScaler};

pub const HIDDEN_SIZE: usize = 16;

/// Concatenated input and hidden state fed to the gates.
const GATE_INPUTS: usize = FEATURE_COUNT + HIDDEN_SIZE;
/// Input, forget, candidate and output gates stacked.
const GATE_OUTPUTS: usize = 4 * HIDDEN_SIZE;

/// Output probability above which the model flags an anomaly.
const ANOMALY_SCORE: f32 = 0.8;

/// Serializable parameters of a [`SequenceModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceWeights {
    pub gates: Dense,
    pub output: Dense,
}

impl SequenceWeights {
    pub fn seeded(seed: u64) -> Self {
        let mut rng = seeded_rng(seed);
        Self {
            gates: Dense::seeded(GATE_INPUTS as u16, GATE_OUTPUTS as u16, &mut rng),
            output: Dense::seeded(HIDDEN_SIZE as u16, 1, &mut rng),
        }
    }

    pub fn check_shape(&self) -> Result<(), ModelError> {
        self.gates.expect_dims(GATE_INPUTS, GATE_OUTPUTS)?;
        self.output.expect_dims(HIDDEN_SIZE, 1)
    }

    pub fn to_postcard(&self) -> Result<Vec<u8>, ModelError> {
        postcard::to_allocvec(self).map_err(ModelError::Encode)
    }
}

pub struct SequenceModel {
    weights: SequenceWeights,
    scaler: FeatureScaler,
    window: usize,
}

impl SequenceModel {
    pub fn seeded(config: &MonitorConfig, seed: u64) -> Self {
        Self {
            weights: SequenceWeights::seeded(seed),
            scaler: FeatureScaler::new(config),
            window: config.sequence_window as usize,
        }
    }

    pub fn from_weights(config: &MonitorConfig, weights: SequenceWeights) -> Result<Self, ModelError> {
        weights.check_shape()?;
        Ok(Self {
            weights,
            scaler: FeatureScaler::new(config),
            window: config.sequence_window as usize,
        })
    }

    /// Load postcard-encoded [`SequenceWeights`].
    pub fn from_postcard(config: &MonitorConfig, bytes: &[u8]) -> Result<Self, ModelError> {
        let weights: SequenceWeights = postcard::from_bytes(bytes).map_err(ModelError::Decode)?;
        Self::from_weights(config, weights)
    }

    pub fn weights(&self) -> &SequenceWeights {
        &self.weights
    }

    fn step(&self, x: &[f32; FEATURE_COUNT], h: &mut [f32; HIDDEN_SIZE], c: &mut [f32; HIDDEN_SIZE]) {
        let mut joined = [0.0; GATE_INPUTS];
        joined[..FEATURE_COUNT].copy_from_slice(x);
        joined[FEATURE_COUNT..].copy_from_slice(h);

        let mut z = [0.0; GATE_OUTPUTS];
        self.weights.gates.forward(&joined, &mut z);

        for k in 0..HIDDEN_SIZE {
            let input = sigmoid(z[k]);
            let forget = sigmoid(z[HIDDEN_SIZE + k]);
            let candidate = libm::tanhf(z[2 * HIDDEN_SIZE + k]);
            let output = sigmoid(z[3 * HIDDEN_SIZE + k]);
            c[k] = forget * c[k] + input * candidate;
            h[k] = output * libm::tanhf(c[k]);
        }
    }
}

impl ThreatModel for SequenceModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Sequence
    }

    fn evaluate(&self, sample: &SensorSample, history: &[SensorSample]) -> ModelOutput {
        let mut h = [0.0; HIDDEN_SIZE];
        let mut c = [0.0; HIDDEN_SIZE];

        let earlier = self.window.saturating_sub(1);
        let skip = history.len().saturating_sub(earlier);
        for past in &history[skip..] {
            self.step(&self.scaler.extract(past), &mut h, &mut c);
        }
        self.step(&self.scaler.extract(sample), &mut h, &mut c);

        let mut logit = [0.0; 1];
        self.weights.output.forward(&h, &mut logit);
        let score = sigmoid(logit[0]);
        ModelOutput::new(score, score > ANOMALY_SCORE)
    }
}
