//! Recorder configuration types
//!
//! This module defines the interface selection (kind, channel, bitrate) and the
//! pipeline tuning knobs (receive timeout, refresh cadence, batch limit).

use crate::types::ConnectError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported CAN interface kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// PEAK-System PCAN adapters
    Pcan,
    /// Kvaser adapters
    Kvaser,
    /// Chuangxin CANalyst-II USBCAN adapters
    Canalystii,
    /// In-process virtual loopback bus
    Virtual,
}

impl InterfaceKind {
    /// All interface kinds, in the order they are offered to users
    pub const ALL: [InterfaceKind; 4] = [
        InterfaceKind::Pcan,
        InterfaceKind::Kvaser,
        InterfaceKind::Canalystii,
        InterfaceKind::Virtual,
    ];

    /// Channel used when none is configured
    pub fn default_channel(&self) -> &'static str {
        match self {
            InterfaceKind::Pcan => "PCAN_USBBUS1",
            InterfaceKind::Kvaser => "0",
            InterfaceKind::Canalystii => "0",
            InterfaceKind::Virtual => "vcan0",
        }
    }

    /// Human readable adapter name
    pub fn display_name(&self) -> &'static str {
        match self {
            InterfaceKind::Pcan => "Peak CAN",
            InterfaceKind::Kvaser => "Kvaser CAN",
            InterfaceKind::Canalystii => "Chuangxin USBCAN",
            InterfaceKind::Virtual => "Virtual CAN",
        }
    }

    /// Short name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Pcan => "pcan",
            InterfaceKind::Kvaser => "kvaser",
            InterfaceKind::Canalystii => "canalystii",
            InterfaceKind::Virtual => "virtual",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        InterfaceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown interface kind '{}'", s))
    }
}

/// Supported CAN bitrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Kbps125,
    Kbps250,
    Kbps500,
    Mbps1,
}

impl Bitrate {
    pub const ALL: [Bitrate; 4] = [
        Bitrate::Kbps125,
        Bitrate::Kbps250,
        Bitrate::Kbps500,
        Bitrate::Mbps1,
    ];

    /// Bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            Bitrate::Kbps125 => 125_000,
            Bitrate::Kbps250 => 250_000,
            Bitrate::Kbps500 => 500_000,
            Bitrate::Mbps1 => 1_000_000,
        }
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = ConnectError;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Bitrate::ALL
            .iter()
            .copied()
            .find(|b| b.bits_per_second() == value)
            .ok_or(ConnectError::UnsupportedBitrate(value))
    }
}

impl From<Bitrate> for u32 {
    fn from(value: Bitrate) -> Self {
        value.bits_per_second()
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Kbps125 => write!(f, "125 kbps"),
            Bitrate::Kbps250 => write!(f, "250 kbps"),
            Bitrate::Kbps500 => write!(f, "500 kbps"),
            Bitrate::Mbps1 => write!(f, "1 Mbps"),
        }
    }
}

/// Which interface to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Adapter kind
    pub kind: InterfaceKind,

    /// Channel name (defaults per kind, e.g. `vcan0` for the virtual bus)
    #[serde(default)]
    pub channel: Option<String>,

    /// Bus bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: Bitrate,
}

fn default_bitrate() -> Bitrate {
    Bitrate::Kbps500
}

impl InterfaceConfig {
    /// Create an interface configuration using the kind's default channel
    pub fn new(kind: InterfaceKind, bitrate: Bitrate) -> Self {
        Self {
            kind,
            channel: None,
            bitrate,
        }
    }

    /// Builder method: select a specific channel
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Channel that will actually be opened
    pub fn channel(&self) -> &str {
        self.channel
            .as_deref()
            .unwrap_or_else(|| self.kind.default_channel())
    }
}

impl fmt::Display for InterfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) @ {}",
            self.kind.display_name(),
            self.channel(),
            self.bitrate
        )
    }
}

/// Pipeline tuning for a recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// How long a single receive call may block (default: 100ms)
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Refresh cadence of the live view (default: 500ms)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Maximum frames drained from the delivery queue per refresh (default: 50)
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_receive_timeout() -> u64 {
    100
}

fn default_refresh_interval() -> u64 {
    500
}

fn default_batch_limit() -> usize {
    50
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: default_receive_timeout(),
            refresh_interval_ms: default_refresh_interval(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl RecorderConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the per-receive timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the live view refresh cadence
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the per-refresh batch limit (at least 1)
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}
