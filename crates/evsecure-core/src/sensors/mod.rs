pub mod buffer;
pub mod estop;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, SampleBuffer};
pub use estop::EmergencyStopInput;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor read failed")]
    ReadError,
    #[error("sensor did not respond in time")]
    Timeout,
    #[error("sensor reported an unrecoverable failure")]
    Unrecoverable,
}

/// One acquisition of the charging circuit.
///
/// Units: current in A, voltage in V, power in W, frequency in Hz,
/// temperature in °C. `timestamp_ms` is monotonic milliseconds since boot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub current: f32,
    pub voltage: f32,
    pub power: f32,
    pub frequency: f32,
    pub temperature: f32,
    pub timestamp_ms: u64,
}

impl SensorSample {
    /// Build a sample whose power is derived from current and voltage.
    pub fn new(current: f32, voltage: f32, frequency: f32, temperature: f32, timestamp_ms: u64) -> Self {
        Self {
            current,
            voltage,
            power: current * voltage,
            frequency,
            temperature,
            timestamp_ms,
        }
    }

    /// Build a sample carrying an independently measured power value.
    pub fn with_power(
        current: f32,
        voltage: f32,
        power: f32,
        frequency: f32,
        temperature: f32,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            current,
            voltage,
            power,
            frequency,
            temperature,
            timestamp_ms,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.channels().iter().all(|v| v.is_finite())
    }

    /// Measured channels in a fixed order: current, voltage, power, frequency, temperature.
    pub fn channels(&self) -> [f32; 5] {
        [
            self.current,
            self.voltage,
            self.power,
            self.frequency,
            self.temperature,
        ]
    }
}

/// Trait for acquisition front-ends that produce charging samples.
///
/// Calibration and ADC handling live behind this trait; the monitor only
/// sees finished samples or an error.
pub trait SampleSource {
    /// Read one sample, stamping it with `now_ms`.
    fn read(&mut self, now_ms: u64) -> impl Future<Output = Result<SensorSample, SensorError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_is_derived() {
        let sample = SensorSample::new(15.5, 230.0, 50.0, 25.0, 0);
        assert_eq!(sample.power, 3565.0);
    }

    #[test]
    fn test_non_finite_detection() {
        let mut sample = SensorSample::new(15.5, 230.0, 50.0, 25.0, 0);
        assert!(sample.is_finite());
        sample.temperature = f32::NAN;
        assert!(!sample.is_finite());
        let sample = SensorSample::with_power(1.0, 230.0, f32::INFINITY, 50.0, 25.0, 0);
        assert!(!sample.is_finite(), "infinite power must be caught");
    }
}
