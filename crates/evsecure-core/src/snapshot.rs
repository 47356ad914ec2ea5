//! Read-only views of the monitor for logging, display and API collaborators
//!
//! The monitor is the single writer of three snapshots: the latest
//! [`ThreatAssessment`], [`SystemState`] and [`RelayStatus`]. Each lives in
//! its own critical-section cell and is replaced whole on every scoring tick,
//! so readers never observe a half-written value.
//!
//! Collaborators that want a push feed subscribe to [`MonitorEvent`]s on a
//! pub-sub channel instead of polling.
//!
//! ```rust,ignore
//! static SNAPSHOTS: MonitorSnapshots = MonitorSnapshots::new();
//! static EVENTS: MonitorEventChannel = PubSubChannel::new();
//!
//! let mut monitor = SafetyMonitor::new(config, relay_pin, &SNAPSHOTS)?
//!     .with_events(EVENTS.publisher().unwrap());
//! ```

use alloc::vec::Vec;
use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};
use serde::{Deserialize, Serialize};

use crate::safety::{FaultRecord, RelayState, RelayStatus, StateTransition, SystemState};
use crate::threat::{AttackType, ModelKind, ThreatAssessment};

/// Channel capacity for monitor events
/// One scoring tick publishes at most a handful of events
pub const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Number of subscribers that can listen to monitor events
/// - Subscriber 0: event logger
/// - Subscriber 1: display / dashboard bridge
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Number of publishers (just the monitor)
pub const EVENT_PUBLISHERS: usize = 1;

/// Events published by the monitor once per scoring tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorEvent {
    /// A fresh assessment was computed
    Assessment(ThreatAssessment),
    /// The session state changed
    StateChanged(StateTransition),
    /// The relay status changed since the previous tick
    RelayChanged(RelayStatus),
    /// A new relay fault was logged
    Fault(FaultRecord),
}

pub type MonitorEventChannel = PubSubChannel<
    CriticalSectionRawMutex,
    MonitorEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type MonitorEventPublisher<'a> = Publisher<
    'a,
    CriticalSectionRawMutex,
    MonitorEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type MonitorEventSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    MonitorEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

/// Single-writer cell holding the latest value of `T`.
pub struct Snapshot<T: Copy> {
    cell: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: Copy> Snapshot<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            cell: Mutex::new(Cell::new(initial)),
        }
    }

    pub fn publish(&self, value: T) {
        self.cell.lock(|cell| cell.set(value));
    }

    pub fn latest(&self) -> T {
        self.cell.lock(|cell| cell.get())
    }
}

const INITIAL_ASSESSMENT: ThreatAssessment = ThreatAssessment {
    prediction: 0.0,
    confidence: 0.0,
    uncertainty: 0.0,
    primary_model: ModelKind::RuleBased,
    attack: AttackType::None,
    severity: 0.0,
    anomaly: false,
    timestamp_ms: 0,
};

const INITIAL_RELAY: RelayStatus = RelayStatus {
    state: RelayState::Off,
    healthy: true,
    fault_count: 0,
    last_fault: None,
    last_transition_ms: 0,
};

/// The three snapshots the monitor publishes.
pub struct MonitorSnapshots {
    pub assessment: Snapshot<ThreatAssessment>,
    pub state: Snapshot<SystemState>,
    pub relay: Snapshot<RelayStatus>,
}

impl MonitorSnapshots {
    pub const fn new() -> Self {
        Self {
            assessment: Snapshot::new(INITIAL_ASSESSMENT),
            state: Snapshot::new(SystemState::Idle),
            relay: Snapshot::new(INITIAL_RELAY),
        }
    }

    /// Read all three snapshots into one frame.
    pub fn telemetry(&self) -> TelemetryFrame {
        TelemetryFrame {
            assessment: self.assessment.latest(),
            state: self.state.latest(),
            relay: self.relay.latest(),
        }
    }
}

impl Default for MonitorSnapshots {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire bundle of the published snapshots for the logging and dashboard layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub assessment: ThreatAssessment,
    pub state: SystemState,
    pub relay: RelayStatus,
}

impl TelemetryFrame {
    pub fn to_postcard(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_postcard(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_replaces_value() {
        let snapshot = Snapshot::new(SystemState::Idle);
        assert_eq!(snapshot.latest(), SystemState::Idle);
        snapshot.publish(SystemState::Charging);
        assert_eq!(snapshot.latest(), SystemState::Charging);
    }

    #[test]
    fn test_static_snapshots() {
        static SNAPSHOTS: MonitorSnapshots = MonitorSnapshots::new();
        SNAPSHOTS.state.publish(SystemState::Lockdown);
        let frame = SNAPSHOTS.telemetry();
        assert_eq!(frame.state, SystemState::Lockdown);
        assert_eq!(frame.relay.state, RelayState::Off);
    }

    #[test]
    fn test_telemetry_frame_decodes() {
        let snapshots = MonitorSnapshots::new();
        snapshots.assessment.publish(ThreatAssessment {
            prediction: 0.82,
            attack: AttackType::FrequencyInjection,
            severity: 0.9,
            timestamp_ms: 12_000,
            ..INITIAL_ASSESSMENT
        });
        let frame = snapshots.telemetry();
        let bytes = frame.to_postcard().unwrap();
        assert_eq!(TelemetryFrame::from_postcard(&bytes).unwrap(), frame);
        assert!(TelemetryFrame::from_postcard(&bytes[..4]).is_err());
    }

    #[test]
    fn test_events_reach_subscribers() {
        let channel: MonitorEventChannel = PubSubChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let publisher = channel.publisher().unwrap();
        publisher.publish_immediate(MonitorEvent::RelayChanged(INITIAL_RELAY));
        assert_eq!(
            subscriber.try_next_message_pure(),
            Some(MonitorEvent::RelayChanged(INITIAL_RELAY))
        );
        assert_eq!(subscriber.try_next_message_pure(), None);
    }
}
