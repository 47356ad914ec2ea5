//! Per-cycle analysis stages that sit between the sample buffer and scoring.

pub mod fusion;
pub mod power;
pub mod temporal;

pub use fusion::{FusionWeights, SensorFusionEngine, SensorFusionResult};
pub use power::{HarmonicEstimator, PowerSignature, PowerSignatureAnalyzer, ProportionalDecay};
pub use temporal::{TemporalPattern, TemporalPatternAnalyzer};
