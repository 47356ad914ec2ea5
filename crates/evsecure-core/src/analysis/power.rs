//! Electrical power-quality signature
//!
//! Readings arrive as RMS values from the acquisition front-end, so a single
//! sample already carries RMS voltage and current. Harmonic content is not
//! measured directly; it comes from a [`HarmonicEstimator`] so a spectral
//! estimator can replace the default model without touching the consumers.

use core::f32::consts::SQRT_2;

use serde::{Deserialize, Serialize};

use crate::sensors::SensorSample;
use crate::stats;

/// Number of harmonic orders tracked, fundamental included.
pub const HARMONIC_ORDER: usize = 7;

/// Produces harmonic magnitudes for a sample, index 0 being the fundamental.
pub trait HarmonicEstimator {
    fn estimate(&self, sample: &SensorSample) -> [f32; HARMONIC_ORDER];
}

/// Each order is a fixed fraction of the one before it: `h[k] = V * ratio^k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionalDecay {
    pub ratio: f32,
}

impl ProportionalDecay {
    /// Puts a clean supply at roughly 0.5% THD.
    pub const DEFAULT_RATIO: f32 = 0.005;
}

impl Default for ProportionalDecay {
    fn default() -> Self {
        Self {
            ratio: Self::DEFAULT_RATIO,
        }
    }
}

impl HarmonicEstimator for ProportionalDecay {
    fn estimate(&self, sample: &SensorSample) -> [f32; HARMONIC_ORDER] {
        let mut harmonics = [0.0; HARMONIC_ORDER];
        let mut magnitude = libm::fabsf(sample.voltage);
        for h in harmonics.iter_mut() {
            *h = magnitude;
            magnitude *= self.ratio;
        }
        harmonics
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSignature {
    pub fundamental_hz: f32,
    pub harmonics: [f32; HARMONIC_ORDER],
    /// Total harmonic distortion (%)
    pub thd_percent: f32,
    pub power_factor: f32,
    pub crest_factor: f32,
    pub rms_voltage: f32,
    pub rms_current: f32,
    pub active_power: f32,
    pub reactive_power: f32,
    pub apparent_power: f32,
}

impl PowerSignature {
    /// Active power over apparent power, unclamped. Above 1 the reported
    /// power cannot be explained by the measured current and voltage.
    pub fn power_ratio(&self) -> f32 {
        if self.apparent_power > 0.0 {
            self.active_power / self.apparent_power
        } else {
            0.0
        }
    }
}

/// THD (%) from harmonic magnitudes, 0 when the fundamental is absent.
pub fn total_harmonic_distortion(harmonics: &[f32]) -> f32 {
    let Some((&fundamental, rest)) = harmonics.split_first() else {
        return 0.0;
    };
    if fundamental <= 0.0 {
        return 0.0;
    }
    let sum_sq: f32 = rest.iter().map(|h| h * h).sum();
    libm::sqrtf(sum_sq) / fundamental * 100.0
}

/// Power factor clamped to 0..=1, 0 for a dead circuit.
pub fn power_factor(active_power: f32, apparent_power: f32) -> f32 {
    if apparent_power > 0.0 {
        stats::unit(libm::fabsf(active_power) / apparent_power)
    } else {
        0.0
    }
}

pub struct PowerSignatureAnalyzer<H: HarmonicEstimator = ProportionalDecay> {
    nominal_hz: f32,
    estimator: H,
}

impl PowerSignatureAnalyzer<ProportionalDecay> {
    pub fn new(nominal_hz: f32) -> Self {
        Self::with_estimator(nominal_hz, ProportionalDecay::default())
    }
}

impl<H: HarmonicEstimator> PowerSignatureAnalyzer<H> {
    pub fn with_estimator(nominal_hz: f32, estimator: H) -> Self {
        Self {
            nominal_hz,
            estimator,
        }
    }

    pub fn nominal_hz(&self) -> f32 {
        self.nominal_hz
    }

    /// Signature of a single sample. The crest factor assumes a sinusoid.
    pub fn analyze(&self, sample: &SensorSample) -> PowerSignature {
        let rms_voltage = libm::fabsf(sample.voltage);
        let rms_current = libm::fabsf(sample.current);
        let crest_factor = if rms_current > 0.0 { SQRT_2 } else { 0.0 };
        self.build(sample, rms_voltage, rms_current, sample.power, crest_factor)
    }

    fn build(
        &self,
        sample: &SensorSample,
        rms_voltage: f32,
        rms_current: f32,
        active_power: f32,
        crest_factor: f32,
    ) -> PowerSignature {
        let harmonics = self.estimator.estimate(sample);
        let apparent_power = rms_voltage * rms_current;
        let reactive_sq = apparent_power * apparent_power - active_power * active_power;
        PowerSignature {
            fundamental_hz: sample.frequency,
            harmonics,
            thd_percent: total_harmonic_distortion(&harmonics),
            power_factor: power_factor(active_power, apparent_power),
            crest_factor,
            rms_voltage,
            rms_current,
            active_power,
            reactive_power: libm::sqrtf(reactive_sq.max(0.0)),
            apparent_power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal() -> SensorSample {
        SensorSample::new(15.5, 230.0, 50.0, 25.0, 0)
    }

    #[test]
    fn test_nominal_signature() {
        let analyzer = PowerSignatureAnalyzer::new(50.0);
        let sig = analyzer.analyze(&nominal());

        assert_eq!(sig.fundamental_hz, 50.0);
        assert_eq!(sig.harmonics[0], 230.0);
        assert!(libm::fabsf(sig.power_factor - 1.0) < 1e-6);
        assert!(sig.reactive_power < 1e-3);
        assert!(libm::fabsf(sig.crest_factor - SQRT_2) < 1e-6);
        assert!(
            sig.thd_percent < 0.6,
            "default decay must keep a clean supply under the distortion threshold, got {}",
            sig.thd_percent
        );
    }

    #[test]
    fn test_thd_formula() {
        // sqrt(3^2 + 4^2) / 100 * 100 = 5%
        let thd = total_harmonic_distortion(&[100.0, 3.0, 4.0]);
        assert!(libm::fabsf(thd - 5.0) < 1e-4);
        assert_eq!(total_harmonic_distortion(&[0.0, 3.0]), 0.0);
        assert_eq!(total_harmonic_distortion(&[]), 0.0);
    }

    #[test]
    fn test_zero_inputs_degenerate_to_zero() {
        let analyzer = PowerSignatureAnalyzer::new(50.0);
        let sig = analyzer.analyze(&SensorSample::new(0.0, 0.0, 0.0, 0.0, 0));
        assert_eq!(sig.thd_percent, 0.0);
        assert_eq!(sig.power_factor, 0.0);
        assert_eq!(sig.crest_factor, 0.0);
        assert_eq!(sig.apparent_power, 0.0);
        assert_eq!(sig.power_ratio(), 0.0);
    }

    #[test]
    fn test_reactive_power_from_low_power_factor() {
        let analyzer = PowerSignatureAnalyzer::new(50.0);
        // S = 1000 VA, P = 600 W -> Q = 800 var
        let sample = SensorSample::with_power(10.0, 100.0, 600.0, 50.0, 25.0, 0);
        let sig = analyzer.analyze(&sample);
        assert!(libm::fabsf(sig.power_factor - 0.6) < 1e-6);
        assert!(libm::fabsf(sig.reactive_power - 800.0) < 1e-2);
    }

    #[test]
    fn test_custom_estimator() {
        struct Flat;
        impl HarmonicEstimator for Flat {
            fn estimate(&self, _: &SensorSample) -> [f32; HARMONIC_ORDER] {
                [100.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            }
        }
        let analyzer = PowerSignatureAnalyzer::with_estimator(50.0, Flat);
        let sig = analyzer.analyze(&nominal());
        assert!(libm::fabsf(sig.thd_percent - 10.0) < 1e-4);
    }
}
