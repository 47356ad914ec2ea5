use super::AttackType;
use crate::analysis::{PowerSignature, SensorFusionResult};
use crate::config::MonitorConfig;

/// Active over apparent power above which energy is being dumped into the line.
pub const LOAD_DUMP_RATIO: f32 = 2.0;

/// Hook for enclosure switches, accelerometers or similar intrusion sensors.
pub trait PhysicalTamperSensor {
    fn tampered(&self) -> bool;
}

/// Default hook for hardware without intrusion sensing.
pub struct NoTamperSensor;

impl PhysicalTamperSensor for NoTamperSensor {
    fn tampered(&self) -> bool {
        false
    }
}

pub struct AttackClassifier<T: PhysicalTamperSensor = NoTamperSensor> {
    nominal_hz: f32,
    tolerance_hz: f32,
    thd_threshold_percent: f32,
    tamper: T,
}

impl AttackClassifier<NoTamperSensor> {
    pub fn new(config: &MonitorConfig) -> Self {
        Self::with_tamper_sensor(config, NoTamperSensor)
    }
}

impl<T: PhysicalTamperSensor> AttackClassifier<T> {
    /// THD (%) above which harmonic injection is reported.
    pub const THD_THRESHOLD_PERCENT: f32 = 0.6;

    pub fn with_tamper_sensor(config: &MonitorConfig, tamper: T) -> Self {
        Self {
            nominal_hz: config.frequency_nominal_hz,
            tolerance_hz: config.frequency_tolerance_hz,
            thd_threshold_percent: Self::THD_THRESHOLD_PERCENT,
            tamper,
        }
    }

    /// Name the attack the evidence points to. The first matching rule wins.
    pub fn classify(&self, signature: &PowerSignature, fusion: &SensorFusionResult) -> AttackType {
        if signature.power_ratio() > LOAD_DUMP_RATIO {
            AttackType::LoadDumping
        } else if libm::fabsf(signature.fundamental_hz - self.nominal_hz) > self.tolerance_hz {
            AttackType::FrequencyInjection
        } else if signature.thd_percent > self.thd_threshold_percent {
            AttackType::HarmonicDistortion
        } else if fusion.tampering {
            AttackType::SensorTampering
        } else if self.tamper.tampered() {
            AttackType::PhysicalTampering
        } else if fusion.fused_score > 0.0 {
            AttackType::Unknown
        } else {
            AttackType::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{PowerSignatureAnalyzer, SensorFusionEngine};
    use crate::sensors::SensorSample;

    fn run(sample: SensorSample) -> AttackType {
        let config = MonitorConfig::default();
        let signature = PowerSignatureAnalyzer::new(50.0).analyze(&sample);
        let fusion = SensorFusionEngine::new(config).fuse(&sample, Some(&signature), &[]);
        AttackClassifier::new(&config).classify(&signature, &fusion)
    }

    #[test]
    fn test_nominal_is_none() {
        assert_eq!(run(SensorSample::new(15.5, 230.0, 50.0, 25.0, 0)), AttackType::None);
    }

    #[test]
    fn test_frequency_injection() {
        let attack = run(SensorSample::new(15.5, 230.0, 53.0, 25.0, 0));
        assert_eq!(attack, AttackType::FrequencyInjection);
        assert_eq!(attack.severity(), 0.9);
    }

    #[test]
    fn test_load_dumping_wins_over_tampering() {
        // 3x the power current and voltage can deliver
        let sample = SensorSample::with_power(10.0, 230.0, 6900.0, 53.0, 25.0, 0);
        assert_eq!(run(sample), AttackType::LoadDumping);
    }

    #[test]
    fn test_sensor_tampering() {
        let sample = SensorSample::with_power(15.5, 230.0, 1000.0, 50.0, 25.0, 0);
        assert_eq!(run(sample), AttackType::SensorTampering);
        let nan = SensorSample::new(f32::NAN, 230.0, 50.0, 25.0, 0);
        assert_eq!(run(nan), AttackType::SensorTampering);
    }

    #[test]
    fn test_overcurrent_is_never_none() {
        for current in [30.5f32, 35.0, 60.0, -45.0] {
            let attack = run(SensorSample::new(current, 230.0, 50.0, 25.0, 0));
            assert_ne!(attack, AttackType::None, "I={current}");
        }
    }

    #[test]
    fn test_harmonic_distortion() {
        let config = MonitorConfig::default();
        let sample = SensorSample::new(15.5, 230.0, 50.0, 25.0, 0);
        let mut signature = PowerSignatureAnalyzer::new(50.0).analyze(&sample);
        signature.thd_percent = 4.0;
        let fusion = SensorFusionEngine::new(config).fuse(&sample, Some(&signature), &[]);
        assert_eq!(
            AttackClassifier::new(&config).classify(&signature, &fusion),
            AttackType::HarmonicDistortion
        );
    }

    #[test]
    fn test_physical_tamper_hook() {
        struct LidOpen;
        impl PhysicalTamperSensor for LidOpen {
            fn tampered(&self) -> bool {
                true
            }
        }
        let config = MonitorConfig::default();
        let sample = SensorSample::new(15.5, 230.0, 50.0, 25.0, 0);
        let signature = PowerSignatureAnalyzer::new(50.0).analyze(&sample);
        let fusion = SensorFusionEngine::new(config).fuse(&sample, Some(&signature), &[]);
        let classifier = AttackClassifier::with_tamper_sensor(&config, LidOpen);
        assert_eq!(
            classifier.classify(&signature, &fusion),
            AttackType::PhysicalTampering
        );
    }
}
