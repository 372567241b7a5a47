use crate::config::WheelParams;
use crate::segment::{BusFrame, Segment};
use crate::simulator::DiagnosticFields;
use arrayvec::ArrayString;
use core::fmt::Write as _;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::io;
use tracing::info;

/// Outbound wheel-speed channel.
pub const TELEMETRY_FRAME_ID: u16 = 0x403;

pub const MPS_TO_KPH: f64 = 3.6;

// Large enough for every field at full f64 width
pub const MAX_LOG_LINE_SIZE: usize = 1024;

pub type LogLine = ArrayString<MAX_LOG_LINE_SIZE>;

/// Converts road speed in km/h to a rotational speed.
pub trait SpeedConverter {
    fn kph_to_rotational(&self, kph: f64) -> f64;
}

impl<F: Fn(f64) -> f64> SpeedConverter for F {
    fn kph_to_rotational(&self, kph: f64) -> f64 {
        self(kph)
    }
}

/// Wheel revolutions per minute for a wheel of the given diameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelRpm {
    circumference_m: f64,
}

impl WheelRpm {
    pub fn new(diameter_m: f64) -> Self {
        Self { circumference_m: core::f64::consts::PI * diameter_m }
    }

    pub fn from_params(params: &WheelParams) -> Self {
        Self::new(params.diameter_m)
    }
}

impl Default for WheelRpm {
    fn default() -> Self {
        Self::from_params(&WheelParams::default())
    }
}

impl SpeedConverter for WheelRpm {
    fn kph_to_rotational(&self, kph: f64) -> f64 {
        // metres per minute over metres per revolution
        kph * 1000.0 / 60.0 / self.circumference_m
    }
}

/// Decoded contents of a wheel-speed telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub velocity_mps: f32,
    pub rotational_rpm: f32,
}

impl TelemetryFrame {
    /// Low segment carries rotational speed, high segment carries velocity.
    pub fn encode(self) -> BusFrame {
        BusFrame::from_segments(
            TELEMETRY_FRAME_ID,
            Segment::from_f32(self.rotational_rpm),
            Segment::from_f32(self.velocity_mps),
        )
    }

    pub fn decode(frame: &BusFrame) -> Option<Self> {
        if frame.id != TELEMETRY_FRAME_ID {
            return None;
        }
        Some(Self {
            velocity_mps: frame.segment_two().as_f32(),
            rotational_rpm: frame.segment_one().as_f32(),
        })
    }
}

/// One CSV-style line: setpoint %, velocity, rpm, then the controller's
/// target speed, proportional, integral, combined error and status.
pub fn format_log_line(
    setpoint: f64,
    velocity: f64,
    rotational: f64,
    diagnostics: &DiagnosticFields,
) -> Result<LogLine, core::fmt::Error> {
    let mut line = LogLine::new();
    write!(
        line,
        "{:.1}%,{:.2},{:.2},{},{},{},{},{}",
        setpoint * 100.0,
        velocity,
        rotational,
        diagnostics.target_speed,
        diagnostics.proportional_factor,
        diagnostics.integral_factor,
        diagnostics.combined_error,
        diagnostics.status,
    )?;
    Ok(line)
}

/// Destination for simulator log lines.
pub trait LogSink {
    type Error;

    fn write_line(&mut self, line: &str) -> Result<(), Self::Error>;
}

/// Emits each line as a `tracing` event on the `cruisesim::log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    type Error = Infallible;

    fn write_line(&mut self, line: &str) -> Result<(), Self::Error> {
        info!(target: "cruisesim::log", "{}", line);
        Ok(())
    }
}

/// Writes newline-terminated lines to any `io::Write`.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: io::Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: io::Write> LogSink for WriterSink<W> {
    type Error = io::Error;

    fn write_line(&mut self, line: &str) -> Result<(), Self::Error> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Keeps every line in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn take(&mut self) -> Vec<String> {
        core::mem::take(&mut self.lines)
    }
}

impl LogSink for MemorySink {
    type Error = Infallible;

    fn write_line(&mut self, line: &str) -> Result<(), Self::Error> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_rpm_conversion() {
        let converter = WheelRpm::new(1.0 / core::f64::consts::PI);
        // 1 m circumference: 60 km/h is 1000 m/min
        assert!((converter.kph_to_rotational(60.0) - 1000.0).abs() < 1e-9);
        assert_eq!(converter.kph_to_rotational(0.0), 0.0);
    }

    #[test]
    fn test_closure_converter() {
        let doubler = |kph: f64| kph * 2.0;
        assert_eq!(doubler.kph_to_rotational(3.0), 6.0);
    }

    #[test]
    fn test_telemetry_frame_layout() {
        let frame = TelemetryFrame { velocity_mps: 15.0, rotational_rpm: 512.0 }.encode();
        assert_eq!(frame.id, TELEMETRY_FRAME_ID);
        assert_eq!(frame.segment_one().as_f32(), 512.0);
        assert_eq!(frame.segment_two().as_f32(), 15.0);

        let decoded = TelemetryFrame::decode(&frame).unwrap();
        assert_eq!(decoded.velocity_mps, 15.0);
        assert!(TelemetryFrame::decode(&BusFrame::new(0x501, [0; 8])).is_none());
    }

    #[test]
    fn test_log_line_field_order() {
        let diagnostics = DiagnosticFields {
            proportional_factor: 12,
            integral_factor: -3,
            combined_error: 150,
            target_speed: 600,
            status: 2,
        };
        let line = format_log_line(0.455, 12.3456, 400.0, &diagnostics).unwrap();
        assert_eq!(line.as_str(), "45.5%,12.35,400.00,600,12,-3,150,2");
    }

    #[test]
    fn test_log_line_fits_extreme_values() {
        let line = format_log_line(f64::MAX, f64::MAX, -f64::MAX, &DiagnosticFields::default());
        assert!(line.is_ok());
    }

    #[test]
    fn test_writer_sink_terminates_lines() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line("a,b").unwrap();
        sink.write_line("c").unwrap();
        assert_eq!(sink.into_inner(), b"a,b\nc\n".to_vec());
    }
}
