use crate::config::{validate_magnitude, validate_sub_rate, ConfigError, SimulatorConfig};
use crate::perturbation::{perturb, PerturbationSource};
use crate::physics::step_velocity;
use crate::scheduler::{RateScheduler, ScheduledAction, INITIAL_TICK};
use crate::segment::BusFrame;
use crate::telemetry::{format_log_line, LogSink, SpeedConverter, TelemetryFrame, MPS_TO_KPH};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Controller drive command carrying the setpoint in its high segment.
pub const SETPOINT_FRAME_ID: u16 = 0x501;
/// Controller debug: integral and proportional factors.
pub const DIAGNOSTIC_ONE_FRAME_ID: u16 = 0x507;
/// Controller debug: combined error, target speed and status.
pub const DIAGNOSTIC_TWO_FRAME_ID: u16 = 0x508;

const STATUS_BYTE_OFFSET: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Setpoint,
    DiagnosticOne,
    DiagnosticTwo,
    Unrecognized,
}

impl InboundKind {
    pub fn classify(id: u16) -> Self {
        match id {
            SETPOINT_FRAME_ID => InboundKind::Setpoint,
            DIAGNOSTIC_ONE_FRAME_ID => InboundKind::DiagnosticOne,
            DIAGNOSTIC_TWO_FRAME_ID => InboundKind::DiagnosticTwo,
            _ => InboundKind::Unrecognized,
        }
    }
}

/// Controller debug values, captured verbatim for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiagnosticFields {
    pub proportional_factor: i32,
    pub integral_factor: i32,
    pub combined_error: i32,
    pub target_speed: i16,
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Metres per second, unbounded in both directions
    pub velocity: f64,
    pub setpoint: f64,
    pub tick: u64,
    pub diagnostics: DiagnosticFields,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            velocity: 0.0,
            setpoint: 0.0,
            tick: INITIAL_TICK,
            diagnostics: DiagnosticFields::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulatorStats {
    pub setpoint_frames: u64,
    pub diagnostic_frames: u64,
    pub ignored_frames: u64,
    pub perturbations: u64,
    pub telemetry_frames: u64,
    pub log_lines: u64,
}

/// Serializable view of the simulator for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub state: SimulationState,
    pub rotational_rpm: f64,
    pub perturbation_rate_hz: u32,
    pub perturbation_magnitude: f64,
    pub stats: SimulatorStats,
}

/// A log-sink failure on a setpoint tick. The tick has already been applied,
/// and `telemetry` holds the frame that was due on it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("log sink failed: {error}")]
pub struct SinkError<E> {
    pub error: E,
    pub telemetry: Option<BusFrame>,
}

/// Closed-loop vehicle simulator driven by controller frames.
///
/// The simulator is the single owner of its state. Hosts that receive
/// frames concurrently must serialize calls to [`Simulator::handle`].
/// Log-sink failures are returned to the caller as a [`SinkError`] along
/// with any telemetry due on that tick; nothing is retried or buffered.
pub struct Simulator<S, L, C> {
    config: SimulatorConfig,
    scheduler: RateScheduler,
    state: SimulationState,
    stats: SimulatorStats,
    source: S,
    sink: L,
    converter: C,
}

impl<S, L, C> Simulator<S, L, C>
where
    S: PerturbationSource,
    L: LogSink,
    C: SpeedConverter,
{
    pub fn new(config: SimulatorConfig, source: S, sink: L, converter: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = RateScheduler::from_config(&config)?;

        Ok(Self {
            config,
            scheduler,
            state: SimulationState::default(),
            stats: SimulatorStats::default(),
            source,
            sink,
            converter,
        })
    }

    /// Apply one inbound frame. Returns a telemetry frame when one is due.
    pub fn handle(&mut self, frame: &BusFrame) -> Result<Option<BusFrame>, SinkError<L::Error>> {
        match InboundKind::classify(frame.id) {
            InboundKind::Setpoint => self.handle_setpoint(frame),
            InboundKind::DiagnosticOne => {
                let diagnostics = &mut self.state.diagnostics;
                diagnostics.integral_factor = frame.segment_one().as_i32();
                diagnostics.proportional_factor = frame.segment_two().as_i32();
                self.stats.diagnostic_frames += 1;
                debug!(?diagnostics, "controller factors updated");
                Ok(None)
            }
            InboundKind::DiagnosticTwo => {
                let diagnostics = &mut self.state.diagnostics;
                diagnostics.combined_error = frame.segment_one().as_i32();
                diagnostics.target_speed = frame.segment_two().as_i16();
                diagnostics.status = frame.byte(STATUS_BYTE_OFFSET).unwrap_or_default();
                self.stats.diagnostic_frames += 1;
                debug!(?diagnostics, "controller status updated");
                Ok(None)
            }
            InboundKind::Unrecognized => {
                self.stats.ignored_frames += 1;
                debug!(id = frame.id, "ignoring frame");
                Ok(None)
            }
        }
    }

    fn handle_setpoint(&mut self, frame: &BusFrame) -> Result<Option<BusFrame>, SinkError<L::Error>> {
        self.state.tick += 1;
        self.state.setpoint = f64::from(frame.segment_two().as_f32());
        self.state.velocity = step_velocity(
            self.state.setpoint,
            self.state.velocity,
            &self.config.vehicle,
            self.config.base_rate_hz,
        );
        self.stats.setpoint_frames += 1;

        debug!(
            tick = self.state.tick,
            setpoint = self.state.setpoint,
            velocity = self.state.velocity,
            "setpoint applied"
        );

        self.run_scheduled()
    }

    fn run_scheduled(&mut self) -> Result<Option<BusFrame>, SinkError<L::Error>> {
        let mut telemetry = None;

        for action in self.scheduler.due(self.state.tick) {
            match action {
                ScheduledAction::Perturbation => {
                    self.state.velocity = perturb(
                        self.state.velocity,
                        self.config.perturbation_magnitude,
                        &mut self.source,
                    );
                    self.stats.perturbations += 1;
                }
                ScheduledAction::Telemetry => {
                    telemetry = Some(self.telemetry_frame().encode());
                    self.stats.telemetry_frames += 1;
                }
                ScheduledAction::Log => {
                    if let Err(error) = self.emit_log_line() {
                        return Err(SinkError { error, telemetry });
                    }
                }
            }
        }

        Ok(telemetry)
    }

    fn emit_log_line(&mut self) -> Result<(), L::Error> {
        let line = format_log_line(
            self.state.setpoint,
            self.state.velocity,
            self.rotational_rpm(),
            &self.state.diagnostics,
        );

        match line {
            Ok(line) => {
                self.sink.write_line(&line)?;
                self.stats.log_lines += 1;
            }
            Err(_) => warn!(tick = self.state.tick, "log line exceeded buffer, dropped"),
        }
        Ok(())
    }

    pub fn rotational_rpm(&self) -> f64 {
        self.converter.kph_to_rotational(self.state.velocity * MPS_TO_KPH)
    }

    pub fn telemetry_frame(&self) -> TelemetryFrame {
        TelemetryFrame {
            velocity_mps: self.state.velocity as f32,
            rotational_rpm: self.rotational_rpm() as f32,
        }
    }

    pub fn set_perturbation_rate(&mut self, rate_hz: u32) -> Result<(), ConfigError> {
        if let Err(e) = self.scheduler.set_rate(ScheduledAction::Perturbation, rate_hz) {
            warn!(rate_hz, error = %e, "rejected perturbation rate");
            return Err(e);
        }
        self.config.perturbation_rate_hz = rate_hz;
        Ok(())
    }

    pub fn set_perturbation_magnitude(&mut self, magnitude: f64) -> Result<(), ConfigError> {
        if let Err(e) = validate_magnitude(magnitude) {
            warn!(magnitude, error = %e, "rejected perturbation magnitude");
            return Err(e);
        }
        self.config.perturbation_magnitude = magnitude;
        Ok(())
    }

    /// Change rate and magnitude together. Both are validated before either
    /// is applied, so a rejected request changes nothing.
    pub fn set_perturbation(&mut self, rate_hz: Option<u32>, magnitude: Option<f64>) -> Result<(), ConfigError> {
        let checked = rate_hz
            .map_or(Ok(()), |rate| validate_sub_rate("perturbation", rate, self.config.base_rate_hz))
            .and_then(|()| magnitude.map_or(Ok(()), validate_magnitude));
        if let Err(e) = checked {
            warn!(?rate_hz, ?magnitude, error = %e, "rejected perturbation change");
            return Err(e);
        }

        if let Some(rate_hz) = rate_hz {
            self.set_perturbation_rate(rate_hz)?;
        }
        if let Some(magnitude) = magnitude {
            self.set_perturbation_magnitude(magnitude)?;
        }
        Ok(())
    }

    pub fn perturbation_rate(&self) -> u32 {
        self.config.perturbation_rate_hz
    }

    pub fn perturbation_magnitude(&self) -> f64 {
        self.config.perturbation_magnitude
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn sink(&self) -> &L {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut L {
        &mut self.sink
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            state: self.state,
            rotational_rpm: self.rotational_rpm(),
            perturbation_rate_hz: self.config.perturbation_rate_hz,
            perturbation_magnitude: self.config.perturbation_magnitude,
            stats: self.stats,
        }
    }
}

/// Inbound frame builders, used by the CLI and tests.
pub mod frames {
    use super::{DIAGNOSTIC_ONE_FRAME_ID, DIAGNOSTIC_TWO_FRAME_ID, SETPOINT_FRAME_ID, STATUS_BYTE_OFFSET};
    use crate::segment::{BusFrame, Segment};

    pub fn setpoint(setpoint: f32) -> BusFrame {
        BusFrame::from_segments(SETPOINT_FRAME_ID, Segment::default(), Segment::from_f32(setpoint))
    }

    pub fn diagnostic_one(integral_factor: i32, proportional_factor: i32) -> BusFrame {
        BusFrame::from_segments(
            DIAGNOSTIC_ONE_FRAME_ID,
            Segment::from_i32(integral_factor),
            Segment::from_i32(proportional_factor),
        )
    }

    pub fn diagnostic_two(combined_error: i32, target_speed: i16, status: u8) -> BusFrame {
        let mut frame = BusFrame::from_segments(
            DIAGNOSTIC_TWO_FRAME_ID,
            Segment::from_i32(combined_error),
            Segment::from_i32(i32::from(target_speed) & 0xFFFF),
        );
        frame.data[STATUS_BYTE_OFFSET] = status;
        frame
    }
}
