//! Power-cutoff relay control
//!
//! [`RelaySafetyController`] is the only code that drives the relay output.
//! Energizing is checked against the debounce deadline, the emergency stop
//! latch and the fault ceiling before the pin is touched. Cutting power is
//! never debounced. Debouncing is a deadline check against the caller's
//! clock, never a blocking delay, so the control loop keeps polling the
//! emergency stop.
//!
//! ## Interlocks
//!
//! - Overcurrent persisting beyond the grace period trips the emergency stop
//! - Any overvoltage sample trips the emergency stop immediately
//! - Undervoltage is logged but does not cut power
//!
//! Both voltage excursions are logged once, not once per sample. A reset is
//! refused while the latest sample still violates a limit.
//!
//! The fault log is append-only and capped; entries beyond the cap are
//! counted but not stored. Every fault, stored or not, is also queued for
//! publication until [`RelaySafetyController::next_unpublished_fault`]
//! takes it.

use core::convert::Infallible;
use core::fmt;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use heapless::{Deque, Vec};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::MonitorConfig;
use crate::sensors::SensorSample;

/// Fault log entries retained.
pub const FAULT_LOG_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelayState {
    #[default]
    Off,
    On,
    Fault,
    EmergencyStop,
}

impl RelayState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::On => "On",
            Self::Fault => "Fault",
            Self::EmergencyStop => "Emergency stop",
        }
    }
}

/// Actuation request accepted by [`RelaySafetyController::set_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultReason {
    EmergencyStop,
    Overcurrent,
    Overvoltage,
    Undervoltage,
    FeedbackMismatch,
    PinWrite,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EmergencyStop => "emergency stop activated",
            Self::Overcurrent => "overcurrent beyond grace period",
            Self::Overvoltage => "overvoltage",
            Self::Undervoltage => "undervoltage",
            Self::FeedbackMismatch => "relay feedback does not match output",
            Self::PinWrite => "relay output write failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub reason: FaultReason,
    pub at_ms: u64,
}

/// Published relay snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayStatus {
    pub state: RelayState,
    pub healthy: bool,
    pub fault_count: u8,
    pub last_fault: Option<FaultReason>,
    pub last_transition_ms: u64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    #[error("actuation {elapsed_ms} ms after the previous one, debounce is {required_ms} ms")]
    Debounce { elapsed_ms: u64, required_ms: u64 },
    #[error("emergency stop is latched")]
    EmergencyStopActive,
    #[error("fault count {0} exceeds the ceiling")]
    FaultCeiling(u8),
    #[error("relay is in fault state")]
    Faulted,
    #[error("relay feedback does not match the commanded state")]
    FeedbackMismatch,
    #[error("emergency stop reset refused, {remaining_ms} ms of dwell remaining")]
    DwellNotElapsed { remaining_ms: u64 },
    #[error("reset refused, the latest sample is still outside the limits")]
    InterlockActive,
    #[error("relay output pin error")]
    Pin,
}

/// Feedback input for relays without a contact sense line.
pub struct NoFeedback;

impl ErrorType for NoFeedback {
    type Error = Infallible;
}

impl InputPin for NoFeedback {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct RelaySafetyController<O: OutputPin, F: InputPin = NoFeedback> {
    output: O,
    feedback: Option<F>,
    active_low: bool,

    state: RelayState,
    healthy: bool,
    fault_count: u8,
    last_fault: Option<FaultReason>,
    last_transition: Instant,
    last_actuation: Option<Instant>,

    estop_latched: bool,
    estop_at: Option<Instant>,
    overcurrent_since: Option<Instant>,
    undervoltage: bool,
    /// Latest sample was over the voltage or current limit
    limits_violated: bool,

    fault_log: Vec<FaultRecord, FAULT_LOG_CAPACITY>,
    dropped_faults: u32,
    /// Newest faults not yet taken for publication
    unpublished: Deque<FaultRecord, FAULT_LOG_CAPACITY>,

    debounce: Duration,
    overcurrent_grace: Duration,
    reset_dwell: Duration,
    fault_ceiling: u8,
    current_max_a: f32,
    voltage_min_v: f32,
    voltage_max_v: f32,
}

impl<O: OutputPin> RelaySafetyController<O, NoFeedback> {
    pub fn new(output: O, config: &MonitorConfig) -> Result<Self, RelayError> {
        Self::build(output, None, config)
    }
}

impl<O: OutputPin, F: InputPin> RelaySafetyController<O, F> {
    /// Controller that verifies every actuation against a contact sense input.
    pub fn with_feedback(output: O, feedback: F, config: &MonitorConfig) -> Result<Self, RelayError> {
        Self::build(output, Some(feedback), config)
    }

    fn build(output: O, feedback: Option<F>, config: &MonitorConfig) -> Result<Self, RelayError> {
        let mut relay = Self {
            output,
            feedback,
            active_low: config.relay_active_low,
            state: RelayState::Off,
            healthy: true,
            fault_count: 0,
            last_fault: None,
            last_transition: Instant::from_ticks(0),
            last_actuation: None,
            estop_latched: false,
            estop_at: None,
            overcurrent_since: None,
            undervoltage: false,
            limits_violated: false,
            fault_log: Vec::new(),
            dropped_faults: 0,
            unpublished: Deque::new(),
            debounce: Duration::from_millis(config.debounce_interval_ms),
            overcurrent_grace: Duration::from_millis(config.overcurrent_grace_ms),
            reset_dwell: Duration::from_millis(config.emergency_stop_reset_dwell_ms),
            fault_ceiling: config.fault_ceiling,
            current_max_a: config.current_max_a,
            voltage_min_v: config.voltage_min_v,
            voltage_max_v: config.voltage_max_v,
        };
        // Start de-energized regardless of the pin's power-on level
        relay.drive(false)?;
        Ok(relay)
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            state: self.state,
            healthy: self.healthy,
            fault_count: self.fault_count,
            last_fault: self.last_fault,
            last_transition_ms: self.last_transition.as_millis(),
        }
    }

    pub fn is_energized(&self) -> bool {
        self.state == RelayState::On
    }

    pub fn emergency_stop_active(&self) -> bool {
        self.estop_latched
    }

    pub fn fault_log(&self) -> &[FaultRecord] {
        &self.fault_log
    }

    /// Faults that arrived after the log was full.
    pub fn dropped_faults(&self) -> u32 {
        self.dropped_faults
    }

    /// Oldest fault not yet published, including faults the full log dropped.
    ///
    /// Only the newest [`FAULT_LOG_CAPACITY`] unpublished faults are held.
    pub fn next_unpublished_fault(&mut self) -> Option<FaultRecord> {
        self.unpublished.pop_front()
    }

    /// Energize or de-energize the relay.
    ///
    /// Energizing inside the debounce window is refused. De-energizing is
    /// never delayed. Requesting the state already held succeeds without
    /// touching the pin.
    pub fn set_state(&mut self, command: RelayCommand, now_ms: u64) -> Result<(), RelayError> {
        let now = Instant::from_millis(now_ms);
        let energized = self.is_energized();

        if let (RelayCommand::On, Some(last)) = (command, self.last_actuation) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.debounce {
                debug!("Relay actuation rejected by debounce");
                return Err(RelayError::Debounce {
                    elapsed_ms: elapsed.as_millis(),
                    required_ms: self.debounce.as_millis(),
                });
            }
        }

        match command {
            RelayCommand::On if energized => Ok(()),
            RelayCommand::Off if !energized => Ok(()),
            RelayCommand::On => {
                if self.estop_latched {
                    return Err(RelayError::EmergencyStopActive);
                }
                if self.state == RelayState::Fault {
                    return Err(RelayError::Faulted);
                }
                if self.fault_count > self.fault_ceiling {
                    return Err(RelayError::FaultCeiling(self.fault_count));
                }
                self.actuate(true, now)?;
                self.transition(RelayState::On, now);
                Ok(())
            }
            RelayCommand::Off => {
                self.actuate(false, now)?;
                self.transition(RelayState::Off, now);
                Ok(())
            }
        }
    }

    /// Cut power immediately and latch the emergency stop.
    ///
    /// Bypasses the debounce window. Repeated calls while latched are no-ops.
    pub fn emergency_stop(&mut self, now_ms: u64) {
        if self.estop_latched {
            return;
        }
        let now = Instant::from_millis(now_ms);
        error!("EMERGENCY STOP");

        if self.drive(false).is_err() {
            self.healthy = false;
            self.record_fault(FaultReason::PinWrite, now);
        }
        self.estop_latched = true;
        self.estop_at = Some(now);
        self.last_actuation = Some(now);
        self.overcurrent_since = None;
        self.record_fault(FaultReason::EmergencyStop, now);
        self.transition(RelayState::EmergencyStop, now);
    }

    /// Clear the emergency stop latch and fault state after the dwell time.
    ///
    /// Refused while the latest sample is still over a limit. The relay
    /// stays de-energized; the fault count is zeroed but the fault log is
    /// kept.
    pub fn reset_after_fault(&mut self, now_ms: u64) -> Result<(), RelayError> {
        let now = Instant::from_millis(now_ms);
        if self.limits_violated {
            return Err(RelayError::InterlockActive);
        }
        if let Some(since) = self.estop_at {
            let held = now.saturating_duration_since(since);
            if held < self.reset_dwell {
                return Err(RelayError::DwellNotElapsed {
                    remaining_ms: (self.reset_dwell - held).as_millis(),
                });
            }
        }

        self.drive(false)?;
        self.estop_latched = false;
        self.estop_at = None;
        self.overcurrent_since = None;
        self.fault_count = 0;
        self.healthy = true;
        info!("Relay faults reset");
        if self.state != RelayState::Off {
            self.transition(RelayState::Off, now);
        }
        Ok(())
    }

    /// Apply the electrical interlocks to one sample.
    ///
    /// Returns `true` if the sample tripped the emergency stop.
    pub fn check_safety_limits(&mut self, sample: &SensorSample, now_ms: u64) -> bool {
        let now = Instant::from_millis(now_ms);
        let overvoltage = !sample.voltage.is_nan() && sample.voltage > self.voltage_max_v;
        let overcurrent = libm::fabsf(sample.current) > self.current_max_a;
        self.limits_violated = overvoltage || overcurrent;

        if overvoltage {
            // The latched stop already covers the rest of the excursion
            if self.estop_latched {
                return false;
            }
            warn!("Overvoltage: {} V", sample.voltage);
            self.record_fault(FaultReason::Overvoltage, now);
            self.emergency_stop(now_ms);
            return true;
        }

        // Logged once per excursion, power stays on
        let under = sample.voltage < self.voltage_min_v && self.is_energized();
        if under && !self.undervoltage {
            warn!("Undervoltage: {} V", sample.voltage);
            self.record_fault(FaultReason::Undervoltage, now);
        }
        self.undervoltage = under;

        if overcurrent {
            let since = *self.overcurrent_since.get_or_insert(now);
            let persisted = now.saturating_duration_since(since);
            if persisted > self.overcurrent_grace && !self.estop_latched {
                warn!(
                    "Overcurrent: {} A for {} ms",
                    sample.current,
                    persisted.as_millis()
                );
                self.record_fault(FaultReason::Overcurrent, now);
                self.emergency_stop(now_ms);
                return true;
            }
        } else {
            self.overcurrent_since = None;
        }
        false
    }

    /// Write the pin and verify feedback. A mismatch faults the relay.
    fn actuate(&mut self, energize: bool, now: Instant) -> Result<(), RelayError> {
        self.last_actuation = Some(now);
        if let Err(e) = self.drive(energize) {
            self.healthy = false;
            self.record_fault(FaultReason::PinWrite, now);
            return Err(e);
        }

        if let Some(feedback) = self.feedback.as_mut() {
            let closed = feedback.is_high().unwrap_or(!energize);
            if closed != energize {
                error!("Relay feedback mismatch, commanded energize={}", energize);
                // Best effort: the relay is already considered stuck
                let _ = self.drive(false);
                self.healthy = false;
                self.record_fault(FaultReason::FeedbackMismatch, now);
                self.transition(RelayState::Fault, now);
                return Err(RelayError::FeedbackMismatch);
            }
        }

        info!("Relay {}", if energize { "energized" } else { "de-energized" });
        Ok(())
    }

    fn drive(&mut self, energize: bool) -> Result<(), RelayError> {
        let level_high = energize != self.active_low;
        let result = if level_high {
            self.output.set_high()
        } else {
            self.output.set_low()
        };
        result.map_err(|_| RelayError::Pin)
    }

    fn transition(&mut self, state: RelayState, now: Instant) {
        if self.state != state {
            debug!("Relay {} -> {}", self.state.label(), state.label());
        }
        self.state = state;
        self.last_transition = now;
    }

    fn record_fault(&mut self, reason: FaultReason, now: Instant) {
        self.fault_count = self.fault_count.saturating_add(1);
        self.last_fault = Some(reason);
        let record = FaultRecord {
            reason,
            at_ms: now.as_millis(),
        };
        if self.fault_log.push(record).is_err() {
            self.dropped_faults = self.dropped_faults.saturating_add(1);
        }
        if self.unpublished.is_full() {
            self.unpublished.pop_front();
        }
        let _ = self.unpublished.push_back(record);
        warn!("Relay fault #{}: {}", self.fault_count, reason);
    }
}
