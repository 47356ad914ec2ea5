//! Normalized feature vectors for the learned-weight scorers.

use crate::config::MonitorConfig;
use crate::sensors::SensorSample;

pub const FEATURE_COUNT: usize = 5;

pub type FeatureVector = [f32; FEATURE_COUNT];

/// Features are clamped to ±this bound; non-finite readings map to the upper bound.
pub const FEATURE_BOUND: f32 = 2.0;

/// Scales raw readings so an in-limit sample lands roughly within -1..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScaler {
    current_max: f32,
    voltage_mid: f32,
    voltage_half_span: f32,
    power_max: f32,
    frequency_nominal: f32,
    frequency_tolerance: f32,
    temperature_max: f32,
}

impl FeatureScaler {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            current_max: config.current_max_a,
            voltage_mid: (config.voltage_min_v + config.voltage_max_v) / 2.0,
            voltage_half_span: (config.voltage_max_v - config.voltage_min_v) / 2.0,
            power_max: config.power_max_w(),
            frequency_nominal: config.frequency_nominal_hz,
            frequency_tolerance: config.frequency_tolerance_hz,
            temperature_max: config.temperature_max_c,
        }
    }

    /// Order: current, voltage, power, frequency deviation, temperature.
    pub fn extract(&self, sample: &SensorSample) -> FeatureVector {
        [
            sample.current / self.current_max,
            (sample.voltage - self.voltage_mid) / self.voltage_half_span,
            sample.power / self.power_max,
            (sample.frequency - self.frequency_nominal) / self.frequency_tolerance,
            sample.temperature / self.temperature_max,
        ]
        .map(bound)
    }
}

fn bound(value: f32) -> f32 {
    if value.is_nan() {
        FEATURE_BOUND
    } else {
        value.clamp(-FEATURE_BOUND, FEATURE_BOUND)
    }
}
