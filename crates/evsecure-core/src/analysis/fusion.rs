//! Multi-channel sensor fusion
//!
//! Each channel is checked against its configured bound and contributes a
//! binary indicator to a weighted fused score. Alongside the score the engine
//! estimates how far the readings can be trusted: consistency with the
//! preceding samples, physical plausibility (integrity) and whether the
//! reported power contradicts current and voltage (tampering).

use serde::{Deserialize, Serialize};

use super::power::PowerSignature;
use crate::config::MonitorConfig;
use crate::sensors::SensorSample;
use crate::stats;

/// Relative mismatch between reported and computed power that counts as tampering.
pub const POWER_MISMATCH_TOLERANCE: f32 = 0.10;

/// Below this expected power (W) the relative check is meaningless and the
/// reported power is compared against the same absolute value instead.
const NEGLIGIBLE_POWER_W: f32 = 1.0;

/// Per-channel weights of the fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub current: f32,
    pub voltage: f32,
    pub power: f32,
    pub frequency: f32,
    pub temperature: f32,
}

impl FusionWeights {
    pub const DEFAULT: Self = Self {
        current: 0.30,
        voltage: 0.25,
        power: 0.20,
        frequency: 0.15,
        temperature: 0.10,
    };

    fn total(&self) -> f32 {
        self.current + self.voltage + self.power + self.frequency + self.temperature
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorFusionResult {
    pub fused_score: f32,
    pub consistency: f32,
    pub integrity: f32,
    pub tampering: bool,
    /// Mean of consistency and integrity
    pub confidence: f32,
}

pub struct SensorFusionEngine {
    config: MonitorConfig,
    weights: FusionWeights,
}

impl SensorFusionEngine {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_weights(config, FusionWeights::DEFAULT)
    }

    pub fn with_weights(config: MonitorConfig, weights: FusionWeights) -> Self {
        Self { config, weights }
    }

    /// Fuse the latest sample. `history` holds the samples preceding it,
    /// oldest first; a signature, when given, supplies power and frequency.
    pub fn fuse(
        &self,
        sample: &SensorSample,
        signature: Option<&PowerSignature>,
        history: &[SensorSample],
    ) -> SensorFusionResult {
        let consistency = Self::consistency(sample, history);
        let integrity = Self::integrity(sample);
        let confidence = (consistency + integrity) / 2.0;

        if !sample.is_finite() {
            return SensorFusionResult {
                fused_score: 1.0,
                consistency,
                integrity,
                tampering: true,
                confidence,
            };
        }

        let power = signature.map_or(sample.power, |s| s.active_power);
        let frequency = signature.map_or(sample.frequency, |s| s.fundamental_hz);

        let indicator = |out_of_bound: bool| if out_of_bound { 1.0 } else { 0.0 };
        let c = &self.config;
        let w = &self.weights;
        let raw = w.current * indicator(c.overcurrent(sample.current))
            + w.voltage * indicator(c.voltage_out_of_range(sample.voltage))
            + w.power * indicator(power > c.power_max_w())
            + w.frequency * indicator(c.frequency_out_of_band(frequency))
            + w.temperature * indicator(sample.temperature > c.temperature_max_c);
        let total = w.total();
        let fused_score = if total > 1.0 { raw / total } else { raw };

        SensorFusionResult {
            fused_score: stats::unit(fused_score),
            consistency,
            integrity,
            tampering: Self::power_mismatch(sample),
            confidence,
        }
    }

    /// Mean over current and voltage of `1 / (1 + rms deviation from latest)`.
    fn consistency(sample: &SensorSample, history: &[SensorSample]) -> f32 {
        if history.len() < 2 {
            return 1.0;
        }
        let channel = |pick: fn(&SensorSample) -> f32| {
            let latest = pick(sample);
            let deviation = libm::sqrtf(stats::mean(history.iter().map(|h| {
                let d = pick(h) - latest;
                d * d
            })));
            let score = 1.0 / (1.0 + deviation);
            if score.is_finite() { score } else { 0.0 }
        };
        (channel(|s| s.current) + channel(|s| s.voltage)) / 2.0
    }

    /// Fraction of the physical plausibility checks that hold.
    fn integrity(sample: &SensorSample) -> f32 {
        let checks = [
            sample.power > 0.0 && sample.current > 0.0 && sample.voltage > 0.0,
            sample.frequency > 0.0 && sample.frequency < 100.0,
            sample.temperature > -50.0 && sample.temperature < 150.0,
        ];
        checks.iter().filter(|&&ok| ok).count() as f32 / checks.len() as f32
    }

    fn power_mismatch(sample: &SensorSample) -> bool {
        let expected = libm::fabsf(sample.current * sample.voltage);
        let reported = libm::fabsf(sample.power);
        if expected < NEGLIGIBLE_POWER_W {
            return reported > NEGLIGIBLE_POWER_W;
        }
        libm::fabsf(reported - expected) / expected > POWER_MISMATCH_TOLERANCE
    }
}
