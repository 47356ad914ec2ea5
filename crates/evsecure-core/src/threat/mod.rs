//! Threat scoring and attack classification
//!
//! The [`EnsembleThreatScorer`] turns a sample and its history into a single
//! probability, the [`AttackClassifier`] names what is going on, and the two
//! meet in a [`ThreatAssessment`], the artifact the rest of the system reads.

pub mod classifier;
pub mod ensemble;
pub mod features;
pub mod models;

pub use classifier::{AttackClassifier, NoTamperSensor, PhysicalTamperSensor};
pub use ensemble::{EnsembleThreatScorer, ModelOutput, RuleScorer, ThreatModel, ThreatScore};

use serde::{Deserialize, Serialize};

/// Closed set of attack categories the monitor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackType {
    #[default]
    None,
    LoadDumping,
    FrequencyInjection,
    HarmonicDistortion,
    SensorTampering,
    PhysicalTampering,
    Mitm,
    SideChannel,
    PowerAnalysis,
    Replay,
    /// Out-of-bound readings that match no specific signature
    Unknown,
}

impl AttackType {
    /// Fixed severity weight in 0..=1.
    pub const fn severity(self) -> f32 {
        match self {
            Self::LoadDumping | Self::FrequencyInjection | Self::PhysicalTampering => 0.9,
            Self::HarmonicDistortion | Self::SensorTampering | Self::Mitm => 0.7,
            Self::SideChannel | Self::PowerAnalysis | Self::Replay | Self::Unknown => 0.5,
            Self::None => 0.0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::LoadDumping => "Load dumping",
            Self::FrequencyInjection => "Frequency injection",
            Self::HarmonicDistortion => "Harmonic distortion",
            Self::SensorTampering => "Sensor tampering",
            Self::PhysicalTampering => "Physical tampering",
            Self::Mitm => "Man-in-the-middle",
            Self::SideChannel => "Side channel",
            Self::PowerAnalysis => "Power analysis",
            Self::Replay => "Replay",
            Self::Unknown => "Unknown",
        }
    }

    /// Operator-facing explanation of the category.
    pub const fn description(self) -> &'static str {
        match self {
            Self::None => "No attack detected",
            Self::LoadDumping => "Sudden load changes to destabilize the grid",
            Self::FrequencyInjection => "Malicious frequency manipulation of the supply",
            Self::HarmonicDistortion => "Harmonic content injected to damage equipment",
            Self::SensorTampering => "Sensor readings manipulated or inconsistent",
            Self::PhysicalTampering => "Physical access to the charging hardware",
            Self::Mitm => "Communication between vehicle and charger intercepted",
            Self::SideChannel => "Information leaked through power consumption",
            Self::PowerAnalysis => "Cryptographic keys extracted through power analysis",
            Self::Replay => "Previously captured messages replayed",
            Self::Unknown => "Abnormal readings with no recognised signature",
        }
    }

    /// Categories severe enough to lock down a suspicious session on their own.
    pub const fn forces_lockdown(self) -> bool {
        matches!(self, Self::PhysicalTampering | Self::LoadDumping)
    }
}

/// Ensemble member kinds, reported as the primary contributor of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    RuleBased,
    Sequence,
    Reconstruction,
    External,
}

impl ModelKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::RuleBased => "rules",
            Self::Sequence => "sequence",
            Self::Reconstruction => "reconstruction",
            Self::External => "external",
        }
    }
}

/// Published result of one scoring tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreatAssessment {
    /// Blended threat probability, 0..=1
    pub prediction: f32,
    pub confidence: f32,
    /// Spread across ensemble members
    pub uncertainty: f32,
    pub primary_model: ModelKind,
    pub attack: AttackType,
    pub severity: f32,
    pub anomaly: bool,
    pub timestamp_ms: u64,
}

impl ThreatAssessment {
    pub fn new(score: ThreatScore, attack: AttackType, anomaly: bool, timestamp_ms: u64) -> Self {
        Self {
            prediction: score.prediction,
            confidence: score.confidence,
            uncertainty: score.uncertainty,
            primary_model: score.primary_model,
            attack,
            severity: attack.severity(),
            anomaly,
            timestamp_ms,
        }
    }

    /// Whether the prediction crosses the given threat threshold.
    pub fn is_threat(&self, threshold: f32) -> bool {
        self.prediction > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_table() {
        assert_eq!(AttackType::FrequencyInjection.severity(), 0.9);
        assert_eq!(AttackType::LoadDumping.severity(), 0.9);
        assert_eq!(AttackType::PhysicalTampering.severity(), 0.9);
        assert_eq!(AttackType::HarmonicDistortion.severity(), 0.7);
        assert_eq!(AttackType::SensorTampering.severity(), 0.7);
        assert_eq!(AttackType::Mitm.severity(), 0.7);
        assert_eq!(AttackType::Replay.severity(), 0.5);
        assert_eq!(AttackType::None.severity(), 0.0);
    }

    #[test]
    fn test_assessment_takes_severity_from_attack() {
        let score = ThreatScore {
            prediction: 0.8,
            confidence: 0.95,
            uncertainty: 0.1,
            primary_model: ModelKind::RuleBased,
            model_anomaly: false,
        };
        let assessment = ThreatAssessment::new(score, AttackType::SensorTampering, true, 42);
        assert_eq!(assessment.severity, 0.7);
        assert!(assessment.is_threat(0.7));
        assert!(!assessment.is_threat(0.8));
    }

    #[test]
    fn test_lockdown_categories() {
        assert!(AttackType::LoadDumping.forces_lockdown());
        assert!(AttackType::PhysicalTampering.forces_lockdown());
        assert!(!AttackType::FrequencyInjection.forces_lockdown());
    }
}
