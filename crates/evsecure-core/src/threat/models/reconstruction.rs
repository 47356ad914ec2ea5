//! Autoencoder reconstruction-error scorer
//!
//! `5 -> 8 -> 4 -> 8 -> 5` with ReLU on the hidden layers and a linear
//! output. The RMS difference between a feature vector and its
//! reconstruction is the anomaly measure.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::dense::{Dense, seeded_rng};
use super::{ModelError, relu};
use crate::config::MonitorConfig;
use crate::sensors::SensorSample;
use crate::threat::ModelKind;
use crate::threat::ensemble::{ModelOutput, ThreatModel};
use crate::threat::features::{FEATURE_COUNT, FeatureScaler, FeatureVector};

const HIDDEN: usize = 8;
const BOTTLENECK: usize = 4;

/// Reconstruction error above which a sample is anomalous. It is also the
/// error that maps to a score of 0.5.
pub const ANOMALY_ERROR: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionWeights {
    pub layers: [Dense; 4],
}

impl ReconstructionWeights {
    const DIMS: [(usize, usize); 4] = [
        (FEATURE_COUNT, HIDDEN),
        (HIDDEN, BOTTLENECK),
        (BOTTLENECK, HIDDEN),
        (HIDDEN, FEATURE_COUNT),
    ];

    pub fn seeded(seed: u64) -> Self {
        let mut rng = seeded_rng(seed);
        Self {
            layers: Self::DIMS.map(|(i, o)| Dense::seeded(i as u16, o as u16, &mut rng)),
        }
    }

    pub fn check_shape(&self) -> Result<(), ModelError> {
        for (layer, (i, o)) in self.layers.iter().zip(Self::DIMS) {
            layer.expect_dims(i, o)?;
        }
        Ok(())
    }

    pub fn to_postcard(&self) -> Result<Vec<u8>, ModelError> {
        postcard::to_allocvec(self).map_err(ModelError::Encode)
    }
}

pub struct ReconstructionModel {
    weights: ReconstructionWeights,
    scaler: FeatureScaler,
}

impl ReconstructionModel {
    pub fn seeded(config: &MonitorConfig, seed: u64) -> Self {
        Self {
            weights: ReconstructionWeights::seeded(seed),
            scaler: FeatureScaler::new(config),
        }
    }

    pub fn from_weights(
        config: &MonitorConfig,
        weights: ReconstructionWeights,
    ) -> Result<Self, ModelError> {
        weights.check_shape()?;
        Ok(Self {
            weights,
            scaler: FeatureScaler::new(config),
        })
    }

    pub fn from_postcard(config: &MonitorConfig, bytes: &[u8]) -> Result<Self, ModelError> {
        let weights: ReconstructionWeights =
            postcard::from_bytes(bytes).map_err(ModelError::Decode)?;
        Self::from_weights(config, weights)
    }

    pub fn weights(&self) -> &ReconstructionWeights {
        &self.weights
    }

    pub fn reconstruct(&self, features: &FeatureVector) -> FeatureVector {
        let [encode, squeeze, expand, decode] = &self.weights.layers;

        let mut hidden = [0.0; HIDDEN];
        encode.forward(features, &mut hidden);
        let hidden = hidden.map(relu);

        let mut code = [0.0; BOTTLENECK];
        squeeze.forward(&hidden, &mut code);
        let code = code.map(relu);

        let mut widened = [0.0; HIDDEN];
        expand.forward(&code, &mut widened);
        let widened = widened.map(relu);

        let mut out = [0.0; FEATURE_COUNT];
        decode.forward(&widened, &mut out);
        out
    }

    /// RMS difference between the sample's features and their reconstruction.
    pub fn reconstruction_error(&self, sample: &SensorSample) -> f32 {
        let features = self.scaler.extract(sample);
        let rebuilt = self.reconstruct(&features);
        let sum_sq: f32 = features
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        libm::sqrtf(sum_sq / FEATURE_COUNT as f32)
    }
}

impl ThreatModel for ReconstructionModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Reconstruction
    }

    fn evaluate(&self, sample: &SensorSample, _history: &[SensorSample]) -> ModelOutput {
        let error = self.reconstruction_error(sample);
        ModelOutput::new(error / (error + ANOMALY_ERROR), error > ANOMALY_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    /// Every layer zeroed: the reconstruction is all zeros, so the error is
    /// the RMS of the feature vector itself.
    fn zeroed() -> ReconstructionWeights {
        let layer = |i: usize, o: usize| {
            Dense::new(i as u16, o as u16, vec![0.0; i * o], vec![0.0; o]).unwrap()
        };
        ReconstructionWeights {
            layers: [
                layer(FEATURE_COUNT, HIDDEN),
                layer(HIDDEN, BOTTLENECK),
                layer(BOTTLENECK, HIDDEN),
                layer(HIDDEN, FEATURE_COUNT),
            ],
        }
    }

    #[test]
    fn test_nominal_sample_is_not_anomalous() {
        let config = MonitorConfig::default();
        let model = ReconstructionModel::from_weights(&config, zeroed()).unwrap();
        let out = model.evaluate(&SensorSample::new(15.5, 230.0, 50.0, 25.0, 0), &[]);
        assert!(!out.anomaly);
        assert!(out.score < 0.5);
    }

    #[test]
    fn test_extreme_sample_is_anomalous() {
        let config = MonitorConfig::default();
        let model = ReconstructionModel::from_weights(&config, zeroed()).unwrap();
        let out = model.evaluate(&SensorSample::new(55.0, 300.0, 58.0, 95.0, 0), &[]);
        assert!(out.anomaly);
        assert!(out.score > 0.5 && out.score < 1.0);
    }

    #[test]
    fn test_seeded_weights_have_expected_shape() {
        let weights = ReconstructionWeights::seeded(11);
        assert_eq!(weights.check_shape(), Ok(()));
        let model = ReconstructionModel::seeded(&MonitorConfig::default(), 11);
        let out = model.evaluate(&SensorSample::new(f32::NAN, 230.0, 50.0, 25.0, 0), &[]);
        assert!(out.score.is_finite());
    }

    #[test]
    fn test_postcard_round_trip_rejects_truncation() {
        let config = MonitorConfig::default();
        let bytes = ReconstructionWeights::seeded(5).to_postcard().unwrap();
        assert!(ReconstructionModel::from_postcard(&config, &bytes).is_ok());
        assert!(matches!(
            ReconstructionModel::from_postcard(&config, &bytes[..bytes.len() / 2]),
            Err(ModelError::Decode(_))
        ));
    }
}
