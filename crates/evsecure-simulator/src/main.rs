//! Desktop simulator for the evsecure EV charging security monitor.
//!
//! Drives `evsecure-core` with synthetic charging sessions, a mock relay pin
//! and a mock emergency-stop button, and logs every assessment, state change
//! and relay fault. Nothing here touches hardware.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info evsecure-simulator [scenario] [--realtime]
//! ```
//!
//! | Scenario              | What happens after the warm-up               |
//! |-----------------------|----------------------------------------------|
//! | `nominal` (default)   | Steady 15.5 A / 230 V session                |
//! | `overcurrent`         | Current climbs to 35 A and stays there       |
//! | `frequency-injection` | Line frequency pushed to 53 Hz               |
//! | `emergency-stop`      | Button pressed, released, then reset         |
//! | `sensor-fault`        | Acquisition front-end stops answering        |
//! | `tamper`              | Current channel reports NaN                  |
//!
//! Time is simulated unless `--realtime` is given, in which case the loop is
//! paced by the embassy std time driver.

use core::cell::Cell;
use core::convert::Infallible;

use embassy_sync::pubsub::PubSubChannel;
use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::{debug, error, info, warn};

use evsecure_core::config::MonitorConfig;
use evsecure_core::monitor::SafetyMonitor;
use evsecure_core::safety::HardwareSignals;
use evsecure_core::sensors::{EmergencyStopInput, SampleSource, SensorError, SensorSample};
use evsecure_core::snapshot::{
    MonitorEvent, MonitorEventChannel, MonitorEventSubscriber, MonitorSnapshots,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Latest assessment, state and relay status, read by the summary at exit.
static SNAPSHOTS: MonitorSnapshots = MonitorSnapshots::new();

/// Monitor event feed, drained by the event logger after every scoring tick.
static EVENTS: MonitorEventChannel = PubSubChannel::new();

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// Simulated length of every scenario.
const SCENARIO_LENGTH: Duration = Duration::from_secs(20);

/// Nominal behaviour before the scenario's fault kicks in.
const WARM_UP: Duration = Duration::from_secs(5);

/// Seed for the placeholder model weights, fixed so runs are repeatable.
const MODEL_SEED: u64 = 0x5EC0_4E;

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Nominal,
    Overcurrent,
    FrequencyInjection,
    EmergencyStop,
    SensorFault,
    Tamper,
}

impl Scenario {
    const ALL: [Scenario; 6] = [
        Scenario::Nominal,
        Scenario::Overcurrent,
        Scenario::FrequencyInjection,
        Scenario::EmergencyStop,
        Scenario::SensorFault,
        Scenario::Tamper,
    ];

    fn name(self) -> &'static str {
        match self {
            Scenario::Nominal => "nominal",
            Scenario::Overcurrent => "overcurrent",
            Scenario::FrequencyInjection => "frequency-injection",
            Scenario::EmergencyStop => "emergency-stop",
            Scenario::SensorFault => "sensor-fault",
            Scenario::Tamper => "tamper",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Whether the emergency-stop button is held at `t`.
    fn button_pressed(self, t: Duration) -> bool {
        self == Scenario::EmergencyStop
            && t >= Duration::from_secs(6)
            && t < Duration::from_secs(7)
    }

    /// Whether an operator authorizes a reset at `t`.
    fn reset_authorized(self, t: Duration) -> bool {
        match self {
            Scenario::EmergencyStop => t >= Duration::from_secs(13),
            Scenario::SensorFault => t >= Duration::from_secs(16),
            _ => false,
        }
    }
}

/// Generates synthetic readings for one scenario.
struct MockSampleSource {
    scenario: Scenario,
    start_ms: u64,
}

impl MockSampleSource {
    fn new(scenario: Scenario, start_ms: u64) -> Self {
        Self { scenario, start_ms }
    }

    fn nominal(t_secs: f32, now_ms: u64) -> SensorSample {
        // Small ripple so consistency and stability are not trivially perfect
        let current = 15.5 + 0.2 * (t_secs * 0.7).sin();
        let voltage = 230.0 + 1.5 * (t_secs * 0.3).cos();
        let frequency = 50.0 + 0.02 * (t_secs * 1.3).sin();
        let temperature = 25.0 + t_secs * 0.05;
        SensorSample::new(current, voltage, frequency, temperature, now_ms)
    }
}

impl SampleSource for MockSampleSource {
    async fn read(&mut self, now_ms: u64) -> Result<SensorSample, SensorError> {
        let elapsed = Duration::from_millis(now_ms.saturating_sub(self.start_ms));
        let t_secs = elapsed.as_millis() as f32 / 1000.0;
        let mut sample = Self::nominal(t_secs, now_ms);
        if elapsed < WARM_UP {
            return Ok(sample);
        }

        match self.scenario {
            Scenario::Overcurrent => {
                sample = SensorSample::new(
                    35.0,
                    sample.voltage,
                    sample.frequency,
                    sample.temperature,
                    now_ms,
                )
            }
            Scenario::FrequencyInjection => {
                sample = SensorSample::new(
                    sample.current,
                    sample.voltage,
                    53.0,
                    sample.temperature,
                    now_ms,
                )
            }
            Scenario::SensorFault if elapsed < Duration::from_secs(12) => {
                return Err(SensorError::Timeout);
            }
            Scenario::SensorFault => {
                // front-end back, vehicle unplugged
                sample = SensorSample::new(0.0, sample.voltage, 50.0, 25.0, now_ms)
            }
            Scenario::Tamper => {
                sample = SensorSample::new(
                    f32::NAN,
                    sample.voltage,
                    sample.frequency,
                    sample.temperature,
                    now_ms,
                )
            }
            Scenario::Nominal | Scenario::EmergencyStop => {}
        }
        Ok(sample)
    }
}

// ---------------------------------------------------------------------------
// Mock pins
// ---------------------------------------------------------------------------

/// Relay output that records its level.
struct MockRelayPin<'a> {
    level: &'a Cell<bool>,
}

impl ErrorType for MockRelayPin<'_> {
    type Error = Infallible;
}

impl OutputPin for MockRelayPin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!("Relay pin LOW");
        self.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!("Relay pin HIGH");
        self.level.set(true);
        Ok(())
    }
}

/// Active-low push button; the scenario decides when it is held.
struct MockButton<'a> {
    pressed: &'a Cell<bool>,
}

impl ErrorType for MockButton<'_> {
    type Error = Infallible;
}

impl InputPin for MockButton<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.pressed.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.pressed.get())
    }
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

/// Log every event published since the last drain.
fn drain_events(subscriber: &mut MonitorEventSubscriber<'_>) {
    while let Some(event) = subscriber.try_next_message_pure() {
        log_event(&event);
    }
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Assessment(a) => info!(
            "[{:>6} ms] p={:.2} conf={:.2} unc={:.2} attack={} severity={:.1} primary={}{}",
            a.timestamp_ms,
            a.prediction,
            a.confidence,
            a.uncertainty,
            a.attack.label(),
            a.severity,
            a.primary_model.label(),
            if a.anomaly { " ANOMALY" } else { "" }
        ),
        MonitorEvent::StateChanged(t) => {
            info!("[{:>6} ms] state {} -> {}", t.at_ms, t.from.label(), t.to.label())
        }
        MonitorEvent::RelayChanged(r) => info!(
            "[{:>6} ms] relay {} (healthy={}, faults={})",
            r.last_transition_ms,
            r.state.label(),
            r.healthy,
            r.fault_count
        ),
        MonitorEvent::Fault(f) => warn!("[{:>6} ms] fault: {}", f.at_ms, f.reason),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let mut scenario = Scenario::Nominal;
    let mut realtime = false;
    for arg in std::env::args().skip(1) {
        if arg == "--realtime" {
            realtime = true;
        } else if let Some(s) = Scenario::from_name(&arg) {
            scenario = s;
        } else {
            error!("Unknown scenario '{}'", arg);
            let names: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();
            error!("Available: {}", names.join(", "));
            std::process::exit(2);
        }
    }

    info!("Starting evsecure simulator, scenario '{}'", scenario.name());
    run(scenario, realtime);
    info!("Simulator exiting");
}

fn run(scenario: Scenario, realtime: bool) {
    let config = MonitorConfig::default();
    let acquisition = Duration::from_millis(config.acquisition_interval_ms);
    let scoring_every = config.scoring_interval_ms / config.acquisition_interval_ms;

    let relay_level = Cell::new(true);
    let button_level = Cell::new(false);

    let publisher = match EVENTS.publisher() {
        Ok(p) => p,
        Err(e) => {
            error!("No event publisher available: {:?}", e);
            return;
        }
    };
    let mut subscriber = match EVENTS.subscriber() {
        Ok(s) => s,
        Err(e) => {
            error!("No event subscriber available: {:?}", e);
            return;
        }
    };

    let monitor = SafetyMonitor::new(config, MockRelayPin { level: &relay_level }, &SNAPSHOTS)
        .map(|m| m.with_events(publisher))
        .and_then(|m| m.with_default_models(MODEL_SEED));
    let mut monitor = match monitor {
        Ok(m) => m,
        Err(e) => {
            error!("Monitor refused to start: {}", e);
            return;
        }
    };
    info!("Monitor up with {} scoring models", monitor.model_count());

    let mut estop = EmergencyStopInput::new(MockButton {
        pressed: &button_level,
    });

    let clock = Instant::now();
    let start_ms = if realtime { clock.as_millis() } else { 0 };
    let mut source = MockSampleSource::new(scenario, start_ms);
    let ticks = SCENARIO_LENGTH.as_millis() / acquisition.as_millis();

    for tick in 1..=ticks {
        let elapsed = Duration::from_millis(tick * acquisition.as_millis());
        if realtime {
            let target = clock + elapsed;
            let now = Instant::now();
            if target > now {
                std::thread::sleep(std::time::Duration::from_millis((target - now).as_millis()));
            }
        }
        let now_ms = start_ms + elapsed.as_millis();

        // --- Acquisition --------------------------------------------------
        match embassy_futures::block_on(monitor.acquire(&mut source, now_ms)) {
            Ok(true) => warn!("[{:>6} ms] interlock tripped", now_ms),
            Ok(false) => {}
            Err(e) => debug!("[{:>6} ms] acquisition error: {}", now_ms, e),
        }

        // --- Scoring ------------------------------------------------------
        if tick % scoring_every != 0 {
            continue;
        }
        button_level.set(scenario.button_pressed(elapsed));
        let signals = HardwareSignals {
            emergency_stop: estop.is_pressed(),
            reset_authorized: scenario.reset_authorized(elapsed),
            ..HardwareSignals::default()
        };
        monitor.scoring_tick(now_ms, signals);
        drain_events(&mut subscriber);
    }

    let frame = SNAPSHOTS.telemetry();
    info!(
        "Final: state={} relay={} attack={} ({})",
        frame.state.label(),
        frame.relay.state.label(),
        frame.assessment.attack.label(),
        frame.assessment.attack.description()
    );
    info!(
        "Relay pin {} with {} fault(s) logged",
        if relay_level.get() { "HIGH" } else { "LOW" },
        monitor.fault_log().len()
    );
    match frame.to_postcard() {
        Ok(bytes) => info!("Telemetry frame: {} bytes", bytes.len()),
        Err(e) => error!("Telemetry encode failed: {}", e),
    }
}
