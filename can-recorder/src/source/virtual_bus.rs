//! In-process virtual CAN bus
//!
//! Every port connected to the same channel name receives the frames sent by
//! the other ports on that channel (never its own). All ports on a channel must
//! agree on the bitrate.

use super::FrameSource;
use crate::config::Bitrate;
use crate::types::{ConnectError, RawFrame, TransportError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

static GLOBAL_NETWORK: Lazy<VirtualNetwork> = Lazy::new(VirtualNetwork::new);

/// A set of named virtual CAN channels
#[derive(Clone, Default)]
pub struct VirtualNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    channels: HashMap<String, ChannelBus>,
    next_port_id: u64,
}

struct ChannelBus {
    bitrate: Bitrate,
    ports: Vec<(u64, Sender<RawFrame>)>,
}

impl VirtualNetwork {
    /// Create an isolated network
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide network used by [`source::open`](super::open)
    pub fn global() -> &'static VirtualNetwork {
        &GLOBAL_NETWORK
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new port to `channel`
    pub fn connect(&self, channel: &str, bitrate: Bitrate) -> Result<VirtualPort, ConnectError> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(ConnectError::InvalidChannel(
                "virtual channel name is empty".to_string(),
            ));
        }

        let mut state = self.state();
        let port_id = state.next_port_id;

        if let Some(bus) = state.channels.get(channel) {
            if bus.bitrate != bitrate {
                return Err(ConnectError::BitrateMismatch {
                    channel: channel.to_string(),
                    existing: bus.bitrate.bits_per_second(),
                    requested: bitrate.bits_per_second(),
                });
            }
        }

        let (tx, rx) = channel::unbounded();
        state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelBus {
                bitrate,
                ports: Vec::new(),
            })
            .ports
            .push((port_id, tx));
        state.next_port_id += 1;

        log::debug!("Virtual port {} joined channel '{}' at {}", port_id, channel, bitrate);

        Ok(VirtualPort {
            network: self.clone(),
            channel: channel.to_string(),
            port_id,
            receiver: rx,
            open: true,
        })
    }

    /// Number of ports currently attached to `channel`
    pub fn port_count(&self, channel: &str) -> usize {
        self.state()
            .channels
            .get(channel)
            .map(|bus| bus.ports.len())
            .unwrap_or(0)
    }

    fn broadcast(&self, channel: &str, from: u64, frame: &RawFrame) -> usize {
        let state = self.state();
        let Some(bus) = state.channels.get(channel) else {
            return 0;
        };
        bus.ports
            .iter()
            .filter(|(id, _)| *id != from)
            .filter(|(_, tx)| tx.send(frame.clone()).is_ok())
            .count()
    }

    fn disconnect(&self, channel: &str, port_id: u64) {
        let mut state = self.state();
        if let Some(bus) = state.channels.get_mut(channel) {
            bus.ports.retain(|(id, _)| *id != port_id);
            if bus.ports.is_empty() {
                state.channels.remove(channel);
            }
        }
        log::debug!("Virtual port {} left channel '{}'", port_id, channel);
    }
}

/// One endpoint on a virtual channel
pub struct VirtualPort {
    network: VirtualNetwork,
    channel: String,
    port_id: u64,
    receiver: Receiver<RawFrame>,
    open: bool,
}

impl VirtualPort {
    /// Send a frame to every other port on the channel
    ///
    /// Returns the number of ports that received it.
    pub fn send(&self, frame: &RawFrame) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::Disconnected);
        }
        Ok(self.network.broadcast(&self.channel, self.port_id, frame))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl FrameSource for VirtualPort {
    fn describe(&self) -> String {
        format!("virtual:{}", self.channel)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
        if !self.open {
            return Err(TransportError::Disconnected);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.network.disconnect(&self.channel, self.port_id);
        }
    }
}

impl Drop for VirtualPort {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_reach_other_ports_only() {
        let net = VirtualNetwork::new();
        let mut a = net.connect("vcan0", Bitrate::Kbps500).unwrap();
        let mut b = net.connect("vcan0", Bitrate::Kbps500).unwrap();

        let delivered = a.send(&RawFrame::new(0x123, vec![1, 2, 3])).unwrap();
        assert_eq!(delivered, 1);

        let frame = b.receive(Duration::from_millis(50)).unwrap().unwrap();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.data, vec![1, 2, 3]);

        assert!(a.receive(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn test_channels_are_isolated() {
        let net = VirtualNetwork::new();
        let a = net.connect("vcan0", Bitrate::Kbps500).unwrap();
        let mut b = net.connect("vcan1", Bitrate::Kbps500).unwrap();

        assert_eq!(a.send(&RawFrame::new(0x1, vec![])).unwrap(), 0);
        assert!(b.receive(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn test_bitrate_mismatch_rejected() {
        let net = VirtualNetwork::new();
        let _a = net.connect("vcan0", Bitrate::Kbps500).unwrap();
        let err = net.connect("vcan0", Bitrate::Kbps250).err().unwrap();
        assert!(matches!(
            err,
            ConnectError::BitrateMismatch {
                existing: 500_000,
                requested: 250_000,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_channel_rejected() {
        let net = VirtualNetwork::new();
        assert!(matches!(
            net.connect("  ", Bitrate::Kbps500),
            Err(ConnectError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_detaches() {
        let net = VirtualNetwork::new();
        let mut a = net.connect("vcan0", Bitrate::Kbps500).unwrap();
        assert_eq!(net.port_count("vcan0"), 1);

        a.close();
        a.close();
        assert_eq!(net.port_count("vcan0"), 0);
        assert!(!a.is_open());
        assert!(matches!(
            a.receive(Duration::from_millis(1)),
            Err(TransportError::Disconnected)
        ));

        // Channel is free again, any bitrate may claim it
        let _b = net.connect("vcan0", Bitrate::Kbps125).unwrap();
    }
}
