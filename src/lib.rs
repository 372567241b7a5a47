//! # Cruise Control Vehicle Simulator
//!
//! A closed-loop longitudinal vehicle simulator for exercising a cruise
//! controller without hardware. The controller's drive setpoint frames are
//! turned into vehicle velocity by a force-balance model, and the simulator
//! answers with wheel-speed telemetry and diagnostic log lines at
//! configurable sub-rates of the setpoint rate.
//!
//! ## Features
//!
//! - **Force-balance physics**: tractive force, rolling resistance and
//!   aerodynamic drag integrated with a fixed Euler step
//! - **Tick scheduling**: perturbation, telemetry and logging gated on
//!   divisors of the base rate
//! - **Injectable randomness**: bounded velocity jitter from a replaceable
//!   source, reproducible under a seed
//! - **Explicit payload codec**: every reinterpretation of frame bytes is a
//!   named accessor
//!
//! ## Quick Start
//!
//! ```rust
//! use cruisesim::{frames, FixedSource, MemorySink, Simulator, SimulatorConfig, WheelRpm};
//!
//! let mut simulator = Simulator::new(
//!     SimulatorConfig::default(),
//!     FixedSource::zero(),
//!     MemorySink::new(),
//!     WheelRpm::default(),
//! )
//! .expect("default config is valid");
//!
//! if let Ok(Some(telemetry)) = simulator.handle(&frames::setpoint(0.5)) {
//!     println!("Telemetry frame: {:?}", telemetry);
//! }
//! ```
//!
//! ## Failure semantics
//!
//! Errors from the log sink are returned from [`Simulator::handle`] as a
//! [`SinkError`] that still carries any telemetry due on that tick. Sending
//! telemetry is left to the caller. The simulator never retries,
//! queues or falls back.
//!
//! ## Architecture
//!
//! - [`segment`] - Frame payload codec
//! - [`config`] - Configuration and validation
//! - [`physics`] - Force-balance integrator
//! - [`scheduler`] - Divisor-based rate gating
//! - [`perturbation`] - Bounded random velocity jitter
//! - [`telemetry`] - Telemetry frames, log lines and sinks
//! - [`simulator`] - Frame classification and dispatch
//! - [`protocol`] - JSON line protocol for the TCP adapter

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod config;
pub mod perturbation;
pub mod physics;
pub mod protocol;
pub mod scheduler;
pub mod segment;
pub mod simulator;
pub mod telemetry;

// Re-export main public types for convenience
pub use config::{ConfigError, SimulatorConfig, VehicleParams, WheelParams};
pub use perturbation::{FixedSource, PerturbationSource, RngSource};
pub use segment::{BusFrame, Segment};
pub use simulator::{frames, SimulationState, Simulator, SimulatorStats, SinkError};
pub use telemetry::{LogSink, MemorySink, SpeedConverter, TelemetryFrame, TracingSink, WheelRpm, WriterSink};
