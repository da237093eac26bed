//! Core types for the CAN recorder library
//!
//! This module defines the frames that flow through the capture pipeline and
//! the error types reported at each component boundary. Frames are created
//! once by the ingestion loop and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the recorder
pub type Timestamp = DateTime<Utc>;

/// Result type for recorder operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Raw CAN frame as handed over by a frame source
///
/// This is what a driver produces before the ingestion loop stamps it with a
/// capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// CAN arbitration ID (11-bit or 29-bit)
    pub id: u32,
    /// Data length code, recorded as given by the source
    pub dlc: u8,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Create a raw frame whose DLC matches the payload length
    ///
    /// The DLC saturates at 255 for longer payloads.
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            id,
            dlc: u8::try_from(data.len()).unwrap_or(u8::MAX),
            data,
        }
    }
}

/// A captured CAN frame with its capture timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Absolute capture instant
    pub timestamp: Timestamp,
    /// CAN arbitration ID
    pub identifier: u32,
    /// Data length code
    pub dlc: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Stamp a raw frame with its capture instant
    pub fn from_raw(raw: RawFrame, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            identifier: raw.id,
            dlc: raw.dlc,
            payload: raw.data,
        }
    }

    /// Identifier rendered as uppercase hex without padding (e.g. `1A0`)
    pub fn id_hex(&self) -> String {
        format_identifier(self.identifier)
    }

    /// Payload rendered as space-separated two-digit uppercase hex
    pub fn payload_hex(&self) -> String {
        format_payload(&self.payload)
    }
}

/// Render a CAN identifier the way traces and the live table show it
pub fn format_identifier(id: u32) -> String {
    format!("{:X}", id)
}

/// Render payload bytes as `01 02 FF`
pub fn format_payload(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a timestamp from fractional seconds since the Unix epoch
///
/// Sub-microsecond noise from the `f64` representation is rounded away.
/// Returns `None` for non-finite or out-of-range values.
pub fn timestamp_from_secs(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

/// Fractional seconds since the Unix epoch
pub fn timestamp_to_secs(ts: &Timestamp) -> f64 {
    ts.timestamp() as f64 + (ts.timestamp_subsec_nanos() as f64 / 1_000_000_000.0)
}

/// Milliseconds elapsed from `earlier` to `later` (negative if reversed)
pub fn elapsed_ms(earlier: &Timestamp, later: &Timestamp) -> f64 {
    let delta = *later - *earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Errors raised while opening a frame source
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("No driver available for interface '{0}'")]
    DriverUnavailable(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Bitrate mismatch on channel '{channel}': bus runs at {existing} bit/s, requested {requested} bit/s")]
    BitrateMismatch {
        channel: String,
        existing: u32,
        requested: u32,
    },

    #[error("Unsupported bitrate: {0} bit/s")]
    UnsupportedBitrate(u32),

    #[error("Device not found: {0}")]
    DeviceAbsent(String),

    #[error("Invalid replay trace: {0}")]
    InvalidTrace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a frame source while a session is running
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Interface disconnected")]
    Disconnected,

    #[error("End of stream")]
    EndOfStream,

    #[error("CAN bus error: {0}")]
    Bus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while saving a trace
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No messages to save")]
    NoMessages,

    #[error("Recording is still running")]
    StillRecording,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading a trace file
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Missing ;$FILEVERSION header")]
    MissingVersion,

    #[error("Unsupported trace file version: {0}")]
    UnsupportedVersion(String),

    #[error("Missing ;$STARTTIME header")]
    MissingStartTime,

    #[error("Invalid trace line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the recorder's session controller
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Recording is already running")]
    AlreadyRunning,

    #[error("Error initializing CAN interface: {0}")]
    Connect(#[from] ConnectError),

    #[error("Failed to spawn ingestion thread: {0}")]
    Spawn(std::io::Error),
}

/// Cycle time shown for an identifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CycleTime {
    /// First occurrence in the session, no previous frame to compare with
    FirstSeen,
    /// Milliseconds since the previous frame with the same identifier
    Millis(f64),
}

impl CycleTime {
    /// Cycle time between two captures, rounded to one decimal (ties to even)
    pub fn between(previous: &Timestamp, current: &Timestamp) -> Self {
        let ms = elapsed_ms(previous, current);
        CycleTime::Millis((ms * 10.0).round_ties_even() / 10.0)
    }

    /// Milliseconds, if a previous frame existed
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            CycleTime::FirstSeen => None,
            CycleTime::Millis(ms) => Some(*ms),
        }
    }
}

impl fmt::Display for CycleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleTime::FirstSeen => write!(f, "--"),
            CycleTime::Millis(ms) => write!(f, "{:.1}", ms),
        }
    }
}
