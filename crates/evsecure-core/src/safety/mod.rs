//! Session state and relay actuation.

pub mod relay;
pub mod state_machine;

pub use relay::{
    FaultReason, FaultRecord, NoFeedback, RelayCommand, RelayError, RelaySafetyController,
    RelayState, RelayStatus,
};
pub use state_machine::{
    HardwareSignals, SafetyStateMachine, StateTransition, StepInput, SystemState,
};
