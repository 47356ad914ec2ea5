//! Charging-session state machine
//!
//! [`SafetyStateMachine::step`] is a total function of the current state, the
//! latest threat assessment and the hardware signals. Any input combination
//! without an explicit rule leaves the state unchanged.
//!
//! Precedence within one step, highest first:
//!
//! 1. Emergency stop or tripped interlock: Lockdown
//! 2. Upstream failure: Error
//! 3. Lockdown and Error only leave through an authorized reset
//! 4. Suspicious escalates to Lockdown on a confident or lockdown-class threat
//! 5. A threat above the threshold makes any other state Suspicious
//! 6. Current-driven Idle / Handshake / Charging transitions

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::threat::ThreatAssessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SystemState {
    #[default]
    Idle,
    Handshake,
    Charging,
    Suspicious,
    Lockdown,
    Error,
}

impl SystemState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Handshake => "Handshake",
            Self::Charging => "Charging",
            Self::Suspicious => "Suspicious",
            Self::Lockdown => "Lockdown",
            Self::Error => "Error",
        }
    }

    /// States in which the relay may be energized.
    pub const fn permits_power(self) -> bool {
        !matches!(self, Self::Lockdown | Self::Error)
    }
}

/// Hardware and collaborator inputs sampled once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSignals {
    pub emergency_stop: bool,
    /// A relay interlock (overcurrent, overvoltage, actuation fault) has tripped
    pub interlock_tripped: bool,
    /// Acquisition or storage reported an unrecoverable failure
    pub upstream_failure: bool,
    /// An operator has authorized leaving Lockdown or Error
    pub reset_authorized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SystemState,
    pub to: SystemState,
    pub at_ms: u64,
}

/// Everything [`SafetyStateMachine::step`] looks at in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub now_ms: u64,
    pub current_a: f32,
    /// Present on scoring ticks only
    pub assessment: Option<&'a ThreatAssessment>,
    pub signals: HardwareSignals,
}

pub struct SafetyStateMachine {
    state: SystemState,
    entered_at_ms: u64,
    threat_threshold: f32,
    critical_confidence: f32,
    charging_start_a: f32,
    reset_dwell_ms: u64,
}

impl SafetyStateMachine {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            state: SystemState::Idle,
            entered_at_ms: 0,
            threat_threshold: config.threat_threshold,
            critical_confidence: config.critical_confidence_threshold,
            charging_start_a: config.charging_start_current_a,
            reset_dwell_ms: config.emergency_stop_reset_dwell_ms,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Time the current state was entered (monotonic ms).
    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Evaluate one cycle and apply the resulting transition, if any.
    pub fn step(&mut self, input: StepInput<'_>) -> Option<StateTransition> {
        let next = self.next_state(&input);
        if next == self.state {
            return None;
        }

        let transition = StateTransition {
            from: self.state,
            to: next,
            at_ms: input.now_ms,
        };
        match next {
            SystemState::Lockdown | SystemState::Error => {
                warn!("State {} -> {}", transition.from.label(), next.label())
            }
            _ => info!("State {} -> {}", transition.from.label(), next.label()),
        }
        self.state = next;
        self.entered_at_ms = input.now_ms;
        Some(transition)
    }

    fn next_state(&self, input: &StepInput<'_>) -> SystemState {
        use SystemState::*;

        let signals = input.signals;
        if signals.emergency_stop || signals.interlock_tripped {
            return Lockdown;
        }
        if signals.upstream_failure {
            return Error;
        }

        let dwell = input.now_ms.saturating_sub(self.entered_at_ms);
        match self.state {
            Lockdown => {
                return if signals.reset_authorized && dwell >= self.reset_dwell_ms {
                    Idle
                } else {
                    Lockdown
                };
            }
            Error => {
                return if signals.reset_authorized { Idle } else { Error };
            }
            _ => {}
        }

        // A NaN reading counts as drawing power so it cannot end a session
        let magnitude = libm::fabsf(input.current_a);
        let drawing = magnitude.is_nan() || magnitude > self.charging_start_a;
        let threat = input
            .assessment
            .filter(|a| a.is_threat(self.threat_threshold));

        if let (Suspicious, Some(a)) = (self.state, input.assessment) {
            let confident = threat.is_some() && a.confidence > self.critical_confidence;
            if confident || a.attack.forces_lockdown() {
                return Lockdown;
            }
        }

        if threat.is_some() {
            return Suspicious;
        }

        match self.state {
            Suspicious if input.assessment.is_some() => {
                if drawing {
                    Handshake
                } else {
                    Idle
                }
            }
            Idle if drawing => Handshake,
            Handshake if !drawing => Idle,
            Handshake if input.assessment.is_some() => Charging,
            Charging if !drawing => Idle,
            state => state,
        }
    }
}
