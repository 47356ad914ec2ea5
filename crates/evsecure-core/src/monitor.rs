//! The monitor context that owns every component of one charging point
//!
//! [`SafetyMonitor`] is driven by two ticks supplied by the caller:
//!
//! - **Acquisition** ([`SafetyMonitor::acquire`] or [`SafetyMonitor::on_sample`]),
//!   default every 100 ms: the sample is buffered and checked against the
//!   relay interlocks immediately.
//! - **Scoring** ([`SafetyMonitor::scoring_tick`]), default every second:
//!   analysis, fusion, ensemble scoring and classification produce a
//!   [`ThreatAssessment`], the state machine steps, the relay follows the
//!   new state and the snapshots and events are published.
//!
//! Nothing here reads a clock. Every timestamp comes from the caller.

use alloc::boxed::Box;

use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error, warn};
use thiserror_no_std::Error;

use crate::analysis::{
    PowerSignatureAnalyzer, SensorFusionEngine, TemporalPattern, TemporalPatternAnalyzer,
};
use crate::config::{ConfigError, MonitorConfig};
use crate::safety::{
    FaultRecord, HardwareSignals, NoFeedback, RelayCommand, RelayError, RelaySafetyController,
    RelayState, RelayStatus, SafetyStateMachine, StateTransition, StepInput, SystemState,
};
use crate::sensors::{SampleBuffer, SampleSource, SensorError, SensorSample};
use crate::snapshot::{MonitorEvent, MonitorEventPublisher, MonitorSnapshots};
use crate::threat::models::ModelError;
use crate::threat::{AttackClassifier, EnsembleThreatScorer, ThreatAssessment, ThreatModel};

/// Relative ensemble weight of the sequence model.
#[cfg(feature = "sequence-model")]
pub const SEQUENCE_MODEL_WEIGHT: f32 = 0.4;
/// Relative ensemble weight of the reconstruction model.
#[cfg(feature = "reconstruction-model")]
pub const RECONSTRUCTION_MODEL_WEIGHT: f32 = 0.35;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// What one scoring tick decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub state: SystemState,
    /// `None` while the buffer is still empty
    pub assessment: Option<ThreatAssessment>,
    pub relay: RelayStatus,
    /// Last transition of the tick. A failed actuation adds a second one
    /// into Lockdown.
    pub transition: Option<StateTransition>,
}

pub struct SafetyMonitor<'a, O: OutputPin, F: InputPin = NoFeedback> {
    config: MonitorConfig,
    buffer: SampleBuffer,

    power: PowerSignatureAnalyzer,
    temporal: TemporalPatternAnalyzer,
    fusion: SensorFusionEngine,
    scorer: EnsembleThreatScorer,
    classifier: AttackClassifier,
    state_machine: SafetyStateMachine,
    relay: RelaySafetyController<O, F>,

    snapshots: &'a MonitorSnapshots,
    events: Option<MonitorEventPublisher<'a>>,

    consecutive_errors: u8,
    upstream_failed: bool,
    /// Set when an actuation failed; cleared by a successful relay reset
    actuation_fault: bool,
    last_pattern: TemporalPattern,
    last_assessment: Option<ThreatAssessment>,
    last_relay: RelayStatus,
}

impl<'a, O: OutputPin> SafetyMonitor<'a, O, NoFeedback> {
    /// Validate the config and bring the relay up de-energized.
    pub fn new(
        config: MonitorConfig,
        output: O,
        snapshots: &'a MonitorSnapshots,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let relay = RelaySafetyController::new(output, &config)?;
        Ok(Self::assemble(config, relay, snapshots))
    }
}

impl<'a, O: OutputPin, F: InputPin> SafetyMonitor<'a, O, F> {
    /// Like [`SafetyMonitor::new`], with a contact sense input on the relay.
    pub fn with_feedback(
        config: MonitorConfig,
        output: O,
        feedback: F,
        snapshots: &'a MonitorSnapshots,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let relay = RelaySafetyController::with_feedback(output, feedback, &config)?;
        Ok(Self::assemble(config, relay, snapshots))
    }

    fn assemble(
        config: MonitorConfig,
        relay: RelaySafetyController<O, F>,
        snapshots: &'a MonitorSnapshots,
    ) -> Self {
        let last_relay = relay.status();
        snapshots.relay.publish(last_relay);
        snapshots.state.publish(SystemState::Idle);

        Self {
            buffer: SampleBuffer::new(),
            power: PowerSignatureAnalyzer::new(config.frequency_nominal_hz),
            temporal: TemporalPatternAnalyzer::new(),
            fusion: SensorFusionEngine::new(config),
            scorer: EnsembleThreatScorer::new(&config),
            classifier: AttackClassifier::new(&config),
            state_machine: SafetyStateMachine::new(&config),
            relay,
            snapshots,
            events: None,
            consecutive_errors: 0,
            upstream_failed: false,
            actuation_fault: false,
            last_pattern: TemporalPattern::default(),
            last_assessment: None,
            last_relay,
            config,
        }
    }

    /// Publish [`MonitorEvent`]s on every scoring tick.
    pub fn with_events(mut self, publisher: MonitorEventPublisher<'a>) -> Self {
        self.events = Some(publisher);
        self
    }

    /// Register a scoring model with a relative weight among the models.
    pub fn add_model(&mut self, model: Box<dyn ThreatModel>, weight: f32) -> Result<(), MonitorError> {
        self.scorer.add_model(model, weight)?;
        Ok(())
    }

    /// Register the learned-weight models enabled at compile time, seeded
    /// with placeholder parameters.
    #[cfg(any(feature = "sequence-model", feature = "reconstruction-model"))]
    pub fn with_default_models(mut self, seed: u64) -> Result<Self, MonitorError> {
        #[cfg(feature = "sequence-model")]
        {
            let model = crate::threat::models::SequenceModel::seeded(&self.config, seed);
            self.add_model(Box::new(model), SEQUENCE_MODEL_WEIGHT)?;
        }
        #[cfg(feature = "reconstruction-model")]
        {
            let model =
                crate::threat::models::ReconstructionModel::seeded(&self.config, seed.wrapping_add(1));
            self.add_model(Box::new(model), RECONSTRUCTION_MODEL_WEIGHT)?;
        }
        Ok(self)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> SystemState {
        self.state_machine.state()
    }

    pub fn relay_status(&self) -> RelayStatus {
        self.relay.status()
    }

    pub fn fault_log(&self) -> &[FaultRecord] {
        self.relay.fault_log()
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn last_assessment(&self) -> Option<&ThreatAssessment> {
        self.last_assessment.as_ref()
    }

    /// Pattern computed on the most recent scoring tick.
    pub fn temporal_pattern(&self) -> &TemporalPattern {
        &self.last_pattern
    }

    pub fn model_count(&self) -> usize {
        self.scorer.model_count()
    }

    pub fn consecutive_sensor_errors(&self) -> u8 {
        self.consecutive_errors
    }

    /// Read one sample from `source` and feed it through [`Self::on_sample`].
    ///
    /// A read error is counted toward the upstream-failure ceiling and
    /// returned.
    pub async fn acquire(
        &mut self,
        source: &mut impl SampleSource,
        now_ms: u64,
    ) -> Result<bool, SensorError> {
        match source.read(now_ms).await {
            Ok(sample) => Ok(self.on_sample(sample)),
            Err(e) => {
                self.on_sample_error(e);
                Err(e)
            }
        }
    }

    /// Buffer a sample and apply the relay interlocks to it.
    ///
    /// Returns `true` if the sample tripped the emergency stop.
    pub fn on_sample(&mut self, sample: SensorSample) -> bool {
        self.consecutive_errors = 0;
        self.buffer.push(sample);
        self.relay.check_safety_limits(&sample, sample.timestamp_ms)
    }

    pub fn on_sample_error(&mut self, err: SensorError) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        warn!("Sensor read failed ({} in a row): {}", self.consecutive_errors, err);

        let exhausted = self.consecutive_errors > self.config.max_consecutive_sensor_errors;
        if (err == SensorError::Unrecoverable || exhausted) && !self.upstream_failed {
            error!("Acquisition failed, raising upstream failure");
            self.upstream_failed = true;
        }
    }

    /// Run one scoring cycle.
    pub fn scoring_tick(&mut self, now_ms: u64, mut signals: HardwareSignals) -> TickReport {
        if signals.emergency_stop {
            self.relay.emergency_stop(now_ms);
        }

        if signals.reset_authorized {
            self.authorize_reset(&mut signals, now_ms);
        }

        signals.interlock_tripped |= self.relay.emergency_stop_active()
            || self.relay.state() == RelayState::Fault
            || self.actuation_fault;
        signals.upstream_failure |= self.upstream_failed;

        let assessment = self.assess(now_ms);
        let current_a = self.buffer.latest().map_or(0.0, |s| s.current);

        let stepped = self.state_machine.step(StepInput {
            now_ms,
            current_a,
            assessment: assessment.as_ref(),
            signals,
        });

        let mut forced = None;
        if let Err(e) = self.follow_state(now_ms) {
            error!("Relay actuation failed: {}", e);
            self.actuation_fault = true;
            signals.interlock_tripped = true;
            forced = self.state_machine.step(StepInput {
                now_ms,
                current_a,
                assessment: assessment.as_ref(),
                signals,
            });
        }

        let relay = self.relay.status();
        self.publish(assessment, [stepped, forced], relay);

        TickReport {
            state: self.state_machine.state(),
            assessment,
            relay,
            transition: forced.or(stepped),
        }
    }

    /// Clear latched conditions that an operator reset may clear. A relay
    /// that refuses the reset withdraws the authorization for this tick.
    fn authorize_reset(&mut self, signals: &mut HardwareSignals, now_ms: u64) {
        if self.upstream_failed && self.consecutive_errors == 0 {
            debug!("Upstream failure cleared");
            self.upstream_failed = false;
        }

        let relay_latched = self.relay.emergency_stop_active()
            || self.relay.state() == RelayState::Fault;
        if !(relay_latched || self.actuation_fault) {
            return;
        }
        match self.relay.reset_after_fault(now_ms) {
            Ok(()) => self.actuation_fault = false,
            Err(e) => {
                warn!("Reset refused: {}", e);
                signals.reset_authorized = false;
            }
        }
    }

    fn assess(&mut self, now_ms: u64) -> Option<ThreatAssessment> {
        let window = self.buffer.snapshot();
        let (latest, earlier) = window.split_last()?;

        let history_start = earlier
            .len()
            .saturating_sub(self.config.consistency_window as usize);
        let signature = self.power.analyze(latest);
        let fusion = self.fusion.fuse(latest, Some(&signature), &earlier[history_start..]);
        let score = self.scorer.score(latest, earlier);
        let attack = self.classifier.classify(&signature, &fusion);
        self.last_pattern = self.temporal.analyze(&window);

        let anomaly = score.prediction > self.config.threat_threshold
            || score.model_anomaly
            || fusion.tampering
            || self.last_pattern.irregular_pattern;
        let assessment = ThreatAssessment::new(score, attack, anomaly, now_ms);
        debug!(
            "Assessment: p={} conf={} attack={} fused={}",
            assessment.prediction,
            assessment.confidence,
            attack.label(),
            fusion.fused_score
        );
        Some(assessment)
    }

    /// Energize the relay in states that permit power, cut it otherwise.
    ///
    /// A refused power cut falls back to the emergency stop.
    fn follow_state(&mut self, now_ms: u64) -> Result<(), RelayError> {
        let desired = self.state_machine.state().permits_power();
        if desired == self.relay.is_energized() {
            return Ok(());
        }
        if desired {
            if self.relay.emergency_stop_active() {
                return Ok(());
            }
            return self.relay.set_state(RelayCommand::On, now_ms);
        }
        let cut = self.relay.set_state(RelayCommand::Off, now_ms);
        if cut.is_err() {
            self.relay.emergency_stop(now_ms);
        }
        cut
    }

    fn publish(
        &mut self,
        assessment: Option<ThreatAssessment>,
        transitions: [Option<StateTransition>; 2],
        relay: RelayStatus,
    ) {
        if let Some(assessment) = assessment {
            self.snapshots.assessment.publish(assessment);
            self.last_assessment = Some(assessment);
            self.publish_event(MonitorEvent::Assessment(assessment));
        }

        self.snapshots.state.publish(self.state_machine.state());
        for transition in transitions.into_iter().flatten() {
            self.publish_event(MonitorEvent::StateChanged(transition));
        }

        self.snapshots.relay.publish(relay);
        if relay != self.last_relay {
            self.last_relay = relay;
            self.publish_event(MonitorEvent::RelayChanged(relay));
        }

        while let Some(record) = self.relay.next_unpublished_fault() {
            self.publish_event(MonitorEvent::Fault(record));
        }
    }

    fn publish_event(&self, event: MonitorEvent) {
        if let Some(events) = self.events.as_ref() {
            events.publish_immediate(event);
        }
    }
}
