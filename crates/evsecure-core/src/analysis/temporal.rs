//! Session-level behaviour over a window of samples.

use serde::{Deserialize, Serialize};

use super::power::power_factor;
use crate::sensors::SensorSample;
use crate::stats;

/// Below this many samples the timing and regularity flags are not evaluated.
pub const MIN_PATTERN_SAMPLES: usize = 10;

/// Shortest plausible charging session (5 minutes).
pub const MIN_SESSION_MS: u64 = 5 * 60 * 1000;
/// Longest plausible charging session (8 hours).
pub const MAX_SESSION_MS: u64 = 8 * 60 * 60 * 1000;

/// Coefficient of variation of power above which the draw is irregular.
pub const IRREGULAR_POWER_CV: f32 = 0.3;

/// Reference temperature for the efficiency derating (°C).
const EFFICIENCY_REFERENCE_C: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemporalPattern {
    /// 0..=1
    pub efficiency: f32,
    pub session_duration_s: f32,
    /// W/s
    pub power_ramp_rate: f32,
    /// °C/s
    pub temperature_rise_rate: f32,
    /// 0..=1, 1 is a perfectly steady line frequency
    pub frequency_stability: f32,
    pub anomalous_timing: bool,
    pub irregular_pattern: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalPatternAnalyzer;

impl TemporalPatternAnalyzer {
    pub const fn new() -> Self {
        Self
    }

    /// Analyze an oldest-first window. Fewer than two samples, or a window
    /// with no elapsed time, yields a zeroed pattern.
    pub fn analyze(&self, window: &[SensorSample]) -> TemporalPattern {
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return TemporalPattern::default();
        };
        if window.len() < 2 || last.timestamp_ms <= first.timestamp_ms {
            return TemporalPattern::default();
        }

        let elapsed_ms = last.timestamp_ms - first.timestamp_ms;
        let elapsed_s = elapsed_ms as f32 / 1000.0;

        let latest_pf = power_factor(last.power, libm::fabsf(last.voltage * last.current));
        let derating = 1.0 - (last.temperature - EFFICIENCY_REFERENCE_C) / 100.0;
        let efficiency = (latest_pf * derating).clamp(0.0, 1.0);

        let frequencies = window.iter().map(|s| s.frequency);
        let frequency_stability = 1.0 / (1.0 + stats::variance(frequencies));

        let meaningful = window.len() >= MIN_PATTERN_SAMPLES;
        let anomalous_timing =
            meaningful && !(MIN_SESSION_MS..=MAX_SESSION_MS).contains(&elapsed_ms);

        let powers = window.iter().map(|s| s.power);
        let mean_power = stats::mean(powers.clone());
        let irregular_pattern = meaningful
            && mean_power > 0.0
            && stats::std_dev(powers) > IRREGULAR_POWER_CV * mean_power;

        TemporalPattern {
            efficiency,
            session_duration_s: elapsed_s,
            power_ramp_rate: (last.power - first.power) / elapsed_s,
            temperature_rise_rate: (last.temperature - first.temperature) / elapsed_s,
            frequency_stability,
            anomalous_timing,
            irregular_pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn steady(count: usize, step_ms: u64) -> Vec<SensorSample> {
        (0..count)
            .map(|i| SensorSample::new(16.0, 230.0, 50.0, 25.0, i as u64 * step_ms))
            .collect()
    }

    #[test]
    fn test_degenerate_windows_are_zeroed() {
        let analyzer = TemporalPatternAnalyzer::new();
        assert_eq!(analyzer.analyze(&[]), TemporalPattern::default());
        assert_eq!(analyzer.analyze(&steady(1, 100)), TemporalPattern::default());
        // identical timestamps
        assert_eq!(analyzer.analyze(&steady(3, 0)), TemporalPattern::default());
    }

    #[test]
    fn test_steady_session() {
        // 20 samples one minute apart: 19 minutes, inside the plausible range
        let pattern = TemporalPatternAnalyzer::new().analyze(&steady(20, 60_000));
        assert!(libm::fabsf(pattern.efficiency - 1.0) < 1e-5);
        assert_eq!(pattern.frequency_stability, 1.0);
        assert_eq!(pattern.power_ramp_rate, 0.0);
        assert!(!pattern.anomalous_timing);
        assert!(!pattern.irregular_pattern);
        assert_eq!(pattern.session_duration_s, 1140.0);
    }

    #[test]
    fn test_short_session_is_anomalous() {
        let pattern = TemporalPatternAnalyzer::new().analyze(&steady(10, 100));
        assert!(pattern.anomalous_timing, "0.9 s is far below five minutes");

        let few = TemporalPatternAnalyzer::new().analyze(&steady(5, 100));
        assert!(!few.anomalous_timing, "flags need a meaningful window");
    }

    #[test]
    fn test_rates() {
        let window = [
            SensorSample::new(10.0, 230.0, 50.0, 25.0, 0),
            SensorSample::new(20.0, 230.0, 50.0, 35.0, 10_000),
        ];
        let pattern = TemporalPatternAnalyzer::new().analyze(&window);
        assert!(libm::fabsf(pattern.power_ramp_rate - 230.0) < 1e-3);
        assert!(libm::fabsf(pattern.temperature_rise_rate - 1.0) < 1e-6);
        // derated by (35 - 25) / 100
        assert!(libm::fabsf(pattern.efficiency - 0.9) < 1e-5);
    }

    #[test]
    fn test_efficiency_follows_latest_power_factor() {
        let window = [
            SensorSample::with_power(10.0, 230.0, 1150.0, 50.0, 25.0, 0),
            SensorSample::new(10.0, 230.0, 50.0, 25.0, 1000),
        ];
        let pattern = TemporalPatternAnalyzer::new().analyze(&window);
        assert!(libm::fabsf(pattern.efficiency - 1.0) < 1e-5);
    }

    #[test]
    fn test_irregular_power_draw() {
        let window: Vec<SensorSample> = (0..12)
            .map(|i| {
                let current = if i % 2 == 0 { 2.0 } else { 30.0 };
                SensorSample::new(current, 230.0, 50.0, 25.0, i as u64 * 60_000)
            })
            .collect();
        let pattern = TemporalPatternAnalyzer::new().analyze(&window);
        assert!(pattern.irregular_pattern);
    }

    #[test]
    fn test_unstable_frequency() {
        let window: Vec<SensorSample> = (0..10)
            .map(|i| {
                let f = if i % 2 == 0 { 48.0 } else { 52.0 };
                SensorSample::new(16.0, 230.0, f, 25.0, i as u64 * 1000)
            })
            .collect();
        let pattern = TemporalPatternAnalyzer::new().analyze(&window);
        // variance 4 -> 1 / 5
        assert!(libm::fabsf(pattern.frequency_stability - 0.2) < 1e-6);
    }
}
