//! Hardware-independent core library for the evsecure EV charging monitor
//!
//! This crate contains all platform-agnostic logic of the charging security
//! monitor: sample history, electrical and temporal analysis, sensor fusion,
//! ensemble threat scoring, attack classification, the charging-session state
//! machine and the relay safety controller.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests). Time is
//! never read from a clock inside this crate; every operation that depends on
//! it takes a monotonic millisecond timestamp from the caller.

#![no_std]

extern crate alloc;

pub mod analysis;
pub mod config;
pub mod monitor;
pub mod safety;
pub mod sensors;
pub mod snapshot;
pub mod threat;

pub(crate) mod stats;
