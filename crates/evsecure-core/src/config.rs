//! Monitor thresholds and timing configuration
//!
//! Every limit the monitor enforces lives in [`MonitorConfig`]. A config must
//! pass [`MonitorConfig::validate`] before a [`crate::monitor::SafetyMonitor`]
//! can be built from it; there is no silent fallback to zero or to defaults
//! for a value that failed validation.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Lowest share of the blended prediction the rule-based scorer may hold.
pub const MIN_RULE_WEIGHT: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("{0} must lie within 0..=1")]
    OutOfUnitRange(&'static str),
    #[error("{low} must be below {high}")]
    InvertedRange {
        low: &'static str,
        high: &'static str,
    },
    #[error("rule weight {0} is below the minimum of 0.6")]
    RuleWeightTooLow(f32),
    #[error("config decode failed: {0}")]
    Decode(postcard::Error),
    #[error("config encode failed: {0}")]
    Encode(postcard::Error),
}

/// Flat set of named thresholds consumed by every stage of the monitor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Overcurrent limit (A)
    pub current_max_a: f32,
    pub voltage_min_v: f32,
    pub voltage_max_v: f32,
    pub frequency_nominal_hz: f32,
    /// Allowed deviation either side of the nominal line frequency (Hz)
    pub frequency_tolerance_hz: f32,
    pub temperature_max_c: f32,
    /// Current magnitude above which a vehicle is considered to be drawing power (A)
    pub charging_start_current_a: f32,

    /// Prediction above which the session becomes suspicious
    pub threat_threshold: f32,
    /// Confidence above which a suspicious session is locked down
    pub critical_confidence_threshold: f32,
    /// Share of the blended prediction held by the rule-based scorer (>= 0.6)
    pub rule_weight: f32,

    /// Minimum time before the relay may be energized again; shorter than
    /// the scoring interval
    pub debounce_interval_ms: u64,
    /// How long overcurrent may persist before the relay is cut
    pub overcurrent_grace_ms: u64,
    /// Minimum time in emergency stop before an authorized reset is accepted
    pub emergency_stop_reset_dwell_ms: u64,
    /// Energizing is refused once the fault count exceeds this value
    pub fault_ceiling: u8,
    pub relay_active_low: bool,

    pub acquisition_interval_ms: u64,
    pub scoring_interval_ms: u64,
    /// Consecutive acquisition errors tolerated before the source is declared failed
    pub max_consecutive_sensor_errors: u8,

    /// Samples fed to the sequence model
    pub sequence_window: u8,
    /// Preceding samples used for the fusion consistency estimate
    pub consistency_window: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            current_max_a: 30.0,
            voltage_min_v: 200.0,
            voltage_max_v: 250.0,
            frequency_nominal_hz: 50.0,
            frequency_tolerance_hz: 2.0,
            temperature_max_c: 60.0,
            charging_start_current_a: 0.1,
            threat_threshold: 0.7,
            critical_confidence_threshold: 0.9,
            rule_weight: 0.7,
            debounce_interval_ms: 100,
            overcurrent_grace_ms: 1000,
            emergency_stop_reset_dwell_ms: 5000,
            fault_ceiling: 5,
            relay_active_low: true,
            acquisition_interval_ms: 100,
            scoring_interval_ms: 1000,
            max_consecutive_sensor_errors: 5,
            sequence_window: 10,
            consistency_window: 10,
        }
    }
}

impl MonitorConfig {
    /// Check every threshold, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("current_max_a", self.current_max_a),
            ("voltage_min_v", self.voltage_min_v),
            ("voltage_max_v", self.voltage_max_v),
            ("frequency_nominal_hz", self.frequency_nominal_hz),
            ("frequency_tolerance_hz", self.frequency_tolerance_hz),
            ("temperature_max_c", self.temperature_max_c),
            ("charging_start_current_a", self.charging_start_current_a),
        ];
        for (name, value) in positive {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(name));
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        let unit = [
            ("threat_threshold", self.threat_threshold),
            (
                "critical_confidence_threshold",
                self.critical_confidence_threshold,
            ),
            ("rule_weight", self.rule_weight),
        ];
        for (name, value) in unit {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(name));
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange(name));
            }
        }

        if self.voltage_min_v >= self.voltage_max_v {
            return Err(ConfigError::InvertedRange {
                low: "voltage_min_v",
                high: "voltage_max_v",
            });
        }
        if self.charging_start_current_a >= self.current_max_a {
            return Err(ConfigError::InvertedRange {
                low: "charging_start_current_a",
                high: "current_max_a",
            });
        }
        if self.frequency_tolerance_hz >= self.frequency_nominal_hz {
            return Err(ConfigError::InvertedRange {
                low: "frequency_tolerance_hz",
                high: "frequency_nominal_hz",
            });
        }
        if self.acquisition_interval_ms > self.scoring_interval_ms {
            return Err(ConfigError::InvertedRange {
                low: "acquisition_interval_ms",
                high: "scoring_interval_ms",
            });
        }
        if self.debounce_interval_ms >= self.scoring_interval_ms {
            return Err(ConfigError::InvertedRange {
                low: "debounce_interval_ms",
                high: "scoring_interval_ms",
            });
        }
        if self.rule_weight < MIN_RULE_WEIGHT {
            return Err(ConfigError::RuleWeightTooLow(self.rule_weight));
        }

        let counts = [
            ("debounce_interval_ms", self.debounce_interval_ms),
            ("overcurrent_grace_ms", self.overcurrent_grace_ms),
            (
                "emergency_stop_reset_dwell_ms",
                self.emergency_stop_reset_dwell_ms,
            ),
            ("fault_ceiling", self.fault_ceiling as u64),
            ("scoring_interval_ms", self.scoring_interval_ms),
            ("acquisition_interval_ms", self.acquisition_interval_ms),
            (
                "max_consecutive_sensor_errors",
                self.max_consecutive_sensor_errors as u64,
            ),
            ("sequence_window", self.sequence_window as u64),
            ("consistency_window", self.consistency_window as u64),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        Ok(())
    }

    /// Decode a config from postcard bytes and validate it.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_postcard(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(ConfigError::Encode)
    }

    /// Whether a frequency reading lies outside nominal ± tolerance.
    pub fn frequency_out_of_band(&self, frequency_hz: f32) -> bool {
        libm::fabsf(frequency_hz - self.frequency_nominal_hz) > self.frequency_tolerance_hz
    }

    pub fn voltage_out_of_range(&self, voltage_v: f32) -> bool {
        voltage_v < self.voltage_min_v || voltage_v > self.voltage_max_v
    }

    pub fn overcurrent(&self, current_a: f32) -> bool {
        libm::fabsf(current_a) > self.current_max_a
    }

    /// Largest active power consistent with the current and voltage limits.
    pub fn power_max_w(&self) -> f32 {
        self.current_max_a * self.voltage_max_v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(MonitorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_current_limit() {
        let config = MonitorConfig {
            current_max_a: 0.0,
            ..MonitorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("current_max_a")),
            "a zero limit must never be accepted"
        );
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let config = MonitorConfig {
            threat_threshold: f32::NAN,
            ..MonitorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonFinite("threat_threshold"))
        );
    }

    #[test]
    fn test_rejects_inverted_voltage_range() {
        let config = MonitorConfig {
            voltage_min_v: 260.0,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange {
                low: "voltage_min_v",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_model_dominated_blend() {
        let config = MonitorConfig {
            rule_weight: 0.4,
            ..MonitorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::RuleWeightTooLow(0.4)));
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let config = MonitorConfig {
            debounce_interval_ms: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("debounce_interval_ms"))
        );
    }

    #[test]
    fn test_rejects_debounce_longer_than_scoring() {
        let config = MonitorConfig {
            debounce_interval_ms: 1500,
            ..MonitorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedRange {
                low: "debounce_interval_ms",
                high: "scoring_interval_ms",
            })
        );
    }

    #[test]
    fn test_rejects_zero_relay_timings() {
        let grace = MonitorConfig {
            overcurrent_grace_ms: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(
            grace.validate(),
            Err(ConfigError::NotPositive("overcurrent_grace_ms"))
        );

        let dwell = MonitorConfig {
            emergency_stop_reset_dwell_ms: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(
            dwell.validate(),
            Err(ConfigError::NotPositive("emergency_stop_reset_dwell_ms"))
        );

        let ceiling = MonitorConfig {
            fault_ceiling: 0,
            ..MonitorConfig::default()
        };
        assert_eq!(
            ceiling.validate(),
            Err(ConfigError::NotPositive("fault_ceiling"))
        );
    }

    #[test]
    fn test_postcard_load_validates() {
        let bytes = MonitorConfig::default().to_postcard().unwrap();
        let decoded = MonitorConfig::from_postcard(&bytes).unwrap();
        assert_eq!(decoded, MonitorConfig::default());

        let broken = MonitorConfig {
            temperature_max_c: -1.0,
            ..MonitorConfig::default()
        };
        let bytes = postcard::to_allocvec(&broken).unwrap();
        assert_eq!(
            MonitorConfig::from_postcard(&bytes),
            Err(ConfigError::NotPositive("temperature_max_c"))
        );
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        let bytes = MonitorConfig::default().to_postcard().unwrap();
        assert!(matches!(
            MonitorConfig::from_postcard(&bytes[..3]),
            Err(ConfigError::Decode(_))
        ));
    }

    #[test]
    fn test_encode_error_is_reported_as_encode() {
        let err = ConfigError::Encode(postcard::Error::SerializeBufferFull);
        assert!(alloc::format!("{err}").starts_with("config encode failed"));
    }

    #[test]
    fn test_band_checks() {
        let config = MonitorConfig::default();
        assert!(config.frequency_out_of_band(53.0));
        assert!(!config.frequency_out_of_band(51.5));
        assert!(config.voltage_out_of_range(190.0));
        assert!(!config.voltage_out_of_range(230.0));
        assert!(config.overcurrent(-35.0));
        assert_eq!(config.power_max_w(), 7500.0);
    }
}
