//! Ensemble threat scorer
//!
//! A deterministic rule score always holds the majority of the blend so that
//! no model can out-vote a safety limit. Learned-weight models plug in
//! through [`ThreatModel`]; with none registered the scorer is purely
//! rule-based.
//!
//! ## Blend
//!
//! - `prediction = w_r * rule + (1 - w_r) * model_avg` with `w_r >= 0.6`
//! - `confidence = 0.5 + 0.5 * (1 - |rule - model_avg|)`, 1.0 without models
//! - `uncertainty` is the population standard deviation over all members
//!
//! Any non-finite sample value short-circuits to a prediction of 1.0.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, warn};

use super::ModelKind;
use super::models::ModelError;
use crate::config::MonitorConfig;
use crate::sensors::SensorSample;
use crate::stats;

const CONFIDENCE_BASE: f32 = 0.5;
const CONFIDENCE_AGREEMENT_GAIN: f32 = 0.5;

/// What a model reports for one scoring tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    /// Threat probability, 0..=1
    pub score: f32,
    /// The model considers the sample anomalous on its own terms
    pub anomaly: bool,
}

impl ModelOutput {
    pub const fn new(score: f32, anomaly: bool) -> Self {
        Self { score, anomaly }
    }
}

/// Pluggable scoring strategy.
pub trait ThreatModel {
    fn kind(&self) -> ModelKind;

    fn name(&self) -> &'static str {
        self.kind().label()
    }

    /// Score `sample` given the samples preceding it (oldest first).
    fn evaluate(&self, sample: &SensorSample, history: &[SensorSample]) -> ModelOutput;
}

/// Weights of the rule-based overlimit checks. The sum may exceed 1; the
/// score is capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleWeights {
    pub current: f32,
    pub voltage: f32,
    pub frequency: f32,
    pub temperature: f32,
}

impl RuleWeights {
    pub const DEFAULT: Self = Self {
        current: 0.6,
        voltage: 0.5,
        frequency: 0.3,
        temperature: 0.4,
    };
}

pub struct RuleScorer {
    config: MonitorConfig,
    weights: RuleWeights,
}

impl RuleScorer {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            config: *config,
            weights: RuleWeights::DEFAULT,
        }
    }

    pub fn score(&self, sample: &SensorSample) -> f32 {
        if !sample.is_finite() {
            return 1.0;
        }
        let c = &self.config;
        let w = &self.weights;
        let mut score = 0.0;
        if c.overcurrent(sample.current) {
            score += w.current;
        }
        if c.voltage_out_of_range(sample.voltage) {
            score += w.voltage;
        }
        if c.frequency_out_of_band(sample.frequency) {
            score += w.frequency;
        }
        if sample.temperature > c.temperature_max_c {
            score += w.temperature;
        }
        f32::min(score, 1.0)
    }
}

/// Result of blending the ensemble for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThreatScore {
    pub prediction: f32,
    pub confidence: f32,
    pub uncertainty: f32,
    pub primary_model: ModelKind,
    /// At least one model flagged the sample as anomalous
    pub model_anomaly: bool,
}

struct WeightedModel {
    model: Box<dyn ThreatModel>,
    weight: f32,
}

pub struct EnsembleThreatScorer {
    rules: RuleScorer,
    rule_weight: f32,
    models: Vec<WeightedModel>,
}

impl EnsembleThreatScorer {
    /// Rule-only scorer. The config is assumed validated.
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            rules: RuleScorer::new(config),
            rule_weight: config.rule_weight,
            models: Vec::new(),
        }
    }

    /// Register a model with a relative weight among the models.
    pub fn add_model(&mut self, model: Box<dyn ThreatModel>, weight: f32) -> Result<(), ModelError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ModelError::InvalidWeight);
        }
        debug!("Registered {} model with weight {}", model.name(), weight);
        self.models.push(WeightedModel { model, weight });
        Ok(())
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn score(&self, sample: &SensorSample, history: &[SensorSample]) -> ThreatScore {
        if !sample.is_finite() {
            warn!("Non-finite sample at {} ms, scoring as maximal threat", sample.timestamp_ms);
            return ThreatScore {
                prediction: 1.0,
                confidence: 1.0,
                uncertainty: 0.0,
                primary_model: ModelKind::RuleBased,
                model_anomaly: false,
            };
        }

        let rule = self.rules.score(sample);
        if self.models.is_empty() {
            return ThreatScore {
                prediction: rule,
                confidence: 1.0,
                uncertainty: 0.0,
                primary_model: ModelKind::RuleBased,
                model_anomaly: false,
            };
        }

        let mut members: Vec<f32> = Vec::with_capacity(self.models.len() + 1);
        members.push(rule);

        let total_weight: f32 = self.models.iter().map(|m| m.weight).sum();
        let mut model_avg = 0.0;
        let mut model_anomaly = false;
        let mut primary = (ModelKind::RuleBased, self.rule_weight * rule);

        for entry in &self.models {
            let output = entry.model.evaluate(sample, history);
            let score = if output.score.is_finite() {
                output.score.clamp(0.0, 1.0)
            } else {
                warn!("{} model produced a non-finite score", entry.model.name());
                1.0
            };
            let share = entry.weight / total_weight;
            model_avg += share * score;
            model_anomaly |= output.anomaly;
            members.push(score);

            let contribution = (1.0 - self.rule_weight) * share * score;
            if contribution > primary.1 {
                primary = (entry.model.kind(), contribution);
            }
        }

        let prediction = stats::unit(self.rule_weight * rule + (1.0 - self.rule_weight) * model_avg);
        let agreement = 1.0 - libm::fabsf(rule - model_avg);
        let confidence = stats::unit(CONFIDENCE_BASE + CONFIDENCE_AGREEMENT_GAIN * agreement);

        ThreatScore {
            prediction,
            confidence,
            uncertainty: stats::std_dev(members.iter().copied()),
            primary_model: primary.0,
            model_anomaly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f32, ModelKind);

    impl ThreatModel for Fixed {
        fn kind(&self) -> ModelKind {
            self.1
        }
        fn evaluate(&self, _: &SensorSample, _: &[SensorSample]) -> ModelOutput {
            ModelOutput::new(self.0, self.0 > 0.5)
        }
    }

    fn nominal() -> SensorSample {
        SensorSample::new(15.5, 230.0, 50.0, 25.0, 0)
    }

    fn overcurrent() -> SensorSample {
        SensorSample::new(35.0, 230.0, 50.0, 25.0, 0)
    }

    #[test]
    fn test_rule_only_fallback() {
        let scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        assert_eq!(scorer.model_count(), 0);

        let score = scorer.score(&nominal(), &[]);
        assert_eq!(score.prediction, 0.0);
        assert_eq!(score.confidence, 1.0);
        assert_eq!(score.primary_model, ModelKind::RuleBased);

        let score = scorer.score(&overcurrent(), &[]);
        assert!(libm::fabsf(score.prediction - 0.6) < 1e-6);
    }

    #[test]
    fn test_rule_score_is_capped() {
        let rules = RuleScorer::new(&MonitorConfig::default());
        let everything = SensorSample::new(40.0, 260.0, 60.0, 90.0, 0);
        assert_eq!(rules.score(&everything), 1.0);
    }

    #[test]
    fn test_overcurrent_rule_contribution_survives_models() {
        let mut scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        scorer.add_model(Box::new(Fixed(0.0, ModelKind::Sequence)), 1.0).unwrap();
        scorer.add_model(Box::new(Fixed(0.0, ModelKind::Reconstruction)), 3.0).unwrap();

        // models insist everything is fine; the rule share alone stays >= 0.35
        let score = scorer.score(&overcurrent(), &[]);
        assert!(score.prediction >= 0.35, "got {}", score.prediction);
        assert_eq!(score.primary_model, ModelKind::RuleBased);
    }

    #[test]
    fn test_nan_input_is_fail_safe_and_repeatable() {
        let mut scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        scorer.add_model(Box::new(Fixed(0.0, ModelKind::Sequence)), 1.0).unwrap();
        let sample = SensorSample::new(15.5, f32::NAN, 50.0, 25.0, 0);
        for _ in 0..5 {
            assert_eq!(scorer.score(&sample, &[]).prediction, 1.0);
        }
    }

    #[test]
    fn test_non_finite_model_output_counts_as_threat() {
        let mut scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        scorer.add_model(Box::new(Fixed(f32::NAN, ModelKind::External)), 1.0).unwrap();
        let score = scorer.score(&nominal(), &[]);
        // 0.7 * 0 + 0.3 * 1
        assert!(libm::fabsf(score.prediction - 0.3) < 1e-6);
        assert_eq!(score.primary_model, ModelKind::External);
        assert!(score.prediction.is_finite() && score.uncertainty.is_finite());
    }

    #[test]
    fn test_agreement_raises_confidence() {
        let config = MonitorConfig::default();
        let mut agree = EnsembleThreatScorer::new(&config);
        agree.add_model(Box::new(Fixed(0.0, ModelKind::Sequence)), 1.0).unwrap();
        let mut disagree = EnsembleThreatScorer::new(&config);
        disagree.add_model(Box::new(Fixed(0.8, ModelKind::Sequence)), 1.0).unwrap();

        let a = agree.score(&nominal(), &[]);
        let d = disagree.score(&nominal(), &[]);
        assert_eq!(a.confidence, 1.0);
        assert!(libm::fabsf(d.confidence - 0.6) < 1e-6);
        assert!(d.uncertainty > a.uncertainty);
        assert!(d.model_anomaly);
    }

    #[test]
    fn test_weighted_model_average() {
        let mut scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        scorer.add_model(Box::new(Fixed(1.0, ModelKind::Sequence)), 1.0).unwrap();
        scorer.add_model(Box::new(Fixed(0.0, ModelKind::Reconstruction)), 3.0).unwrap();
        let score = scorer.score(&nominal(), &[]);
        // model avg 0.25 -> 0.3 * 0.25
        assert!(libm::fabsf(score.prediction - 0.075) < 1e-6);
        assert_eq!(score.primary_model, ModelKind::Sequence);
    }

    #[test]
    fn test_rejects_bad_weight() {
        let mut scorer = EnsembleThreatScorer::new(&MonitorConfig::default());
        assert_eq!(
            scorer.add_model(Box::new(Fixed(0.0, ModelKind::Sequence)), 0.0),
            Err(ModelError::InvalidWeight)
        );
        assert_eq!(
            scorer.add_model(Box::new(Fixed(0.0, ModelKind::Sequence)), f32::NAN),
            Err(ModelError::InvalidWeight)
        );
        assert_eq!(scorer.model_count(), 0);
    }
}
