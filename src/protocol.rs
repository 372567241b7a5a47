//! Line-delimited JSON protocol spoken by the TCP adapter.
//!
//! Each line is one [`ClientMessage`] or [`ServerMessage`]. Telemetry frames
//! are pushed to every connected client as they are produced.

use crate::perturbation::PerturbationSource;
use crate::segment::BusFrame;
use crate::simulator::{SimulationSnapshot, Simulator};
use crate::telemetry::{LogSink, SpeedConverter, TelemetryFrame};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const MAX_LINE_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Frame(BusFrame),
    SetPerturbation { rate_hz: Option<u32>, magnitude: Option<f64> },
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Telemetry { frame: BusFrame, decoded: TelemetryFrame },
    Ack,
    Status(SimulationSnapshot),
    Error { message: String },
}

impl ServerMessage {
    pub fn telemetry(frame: BusFrame) -> Option<Self> {
        TelemetryFrame::decode(&frame).map(|decoded| ServerMessage::Telemetry { frame, decoded })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("line exceeds maximum length")]
    LineTooLong,
    #[error("invalid message: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of applying one client message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Sent back to the requesting client
    pub response: ServerMessage,
    /// Broadcast to every client
    pub telemetry: Option<ServerMessage>,
}

impl Reply {
    fn only(response: ServerMessage) -> Self {
        Self { response, telemetry: None }
    }
}

pub fn parse_client_line(line: &str) -> Result<ClientMessage, ProtocolError> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLong);
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// One line read from a client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    /// The line exceeded `MAX_LINE_SIZE` and was discarded up to its newline
    TooLong,
    Eof,
}

/// Read one newline-terminated line, buffering at most `MAX_LINE_SIZE + 1`
/// bytes at a time.
pub async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_SIZE as u64 + 1;

    buf.clear();
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') || (buf.len() as u64) < limit {
        return Ok(LineRead::Line(String::from_utf8_lossy(buf).into_owned()));
    }

    // Drain the rest of the oversized line
    loop {
        buf.clear();
        let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if n == 0 || buf.last() == Some(&b'\n') {
            return Ok(LineRead::TooLong);
        }
    }
}

pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Apply a client message to the simulator. Sink failures are reported as
/// an error response and any telemetry due on that tick is still broadcast;
/// the frame is not retried.
pub fn apply<S, L, C>(simulator: &mut Simulator<S, L, C>, message: ClientMessage) -> Reply
where
    S: PerturbationSource,
    L: LogSink,
    L::Error: core::fmt::Display,
    C: SpeedConverter,
{
    match message {
        ClientMessage::Frame(frame) => match simulator.handle(&frame) {
            Ok(telemetry) => Reply {
                response: ServerMessage::Ack,
                telemetry: telemetry.and_then(ServerMessage::telemetry),
            },
            Err(e) => {
                let message = ServerMessage::error(e.to_string());
                Reply { response: message, telemetry: e.telemetry.and_then(ServerMessage::telemetry) }
            }
        },
        ClientMessage::SetPerturbation { rate_hz, magnitude } => {
            match simulator.set_perturbation(rate_hz, magnitude) {
                Ok(()) => Reply::only(ServerMessage::Ack),
                Err(e) => Reply::only(ServerMessage::error(e.to_string())),
            }
        }
        ClientMessage::Status => Reply::only(ServerMessage::Status(simulator.snapshot())),
    }
}
