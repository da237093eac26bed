//! Frame sources (virtual loopback bus, trace replay)
//!
//! A frame source wraps a CAN channel behind a blocking "receive next frame or
//! time out" primitive. The ingestion loop owns exactly one source per session.

use crate::config::{InterfaceConfig, InterfaceKind};
use crate::types::{ConnectError, RawFrame, TransportError};
use std::time::Duration;

pub mod replay;
pub mod virtual_bus;

pub use replay::ReplaySource;
pub use virtual_bus::{VirtualNetwork, VirtualPort};

/// Common trait for all CAN channels the recorder can read from
pub trait FrameSource: Send {
    /// Short description used in log and status messages
    fn describe(&self) -> String;

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` when the timeout elapsed without traffic. Any `Err`
    /// ends the recording session.
    fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, TransportError>;

    /// Release the channel. Must be idempotent.
    fn close(&mut self);
}

/// Open the interface described by `config`
///
/// Only the virtual bus has a built-in driver. Hardware adapters are driven by
/// external `FrameSource` implementations handed to
/// [`Recorder::start_with_source`](crate::Recorder::start_with_source).
pub fn open(config: &InterfaceConfig) -> Result<Box<dyn FrameSource>, ConnectError> {
    log::info!("Opening CAN interface: {}", config);

    match config.kind {
        InterfaceKind::Virtual => {
            let port = VirtualNetwork::global().connect(config.channel(), config.bitrate)?;
            Ok(Box::new(port))
        }
        kind @ (InterfaceKind::Pcan | InterfaceKind::Kvaser | InterfaceKind::Canalystii) => {
            Err(ConnectError::DriverUnavailable(kind.display_name().to_string()))
        }
    }
}

/// Owns a source and guarantees it is closed exactly once
///
/// The guard closes on drop, so a source is released even when the ingestion
/// thread never starts.
pub(crate) struct SourceGuard {
    source: Box<dyn FrameSource>,
    closed: bool,
}

impl SourceGuard {
    pub(crate) fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    pub(crate) fn describe(&self) -> String {
        self.source.describe()
    }

    pub(crate) fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.source.receive(timeout)
    }

    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::debug!("Closing frame source: {}", self.source.describe());
            self.source.close();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bitrate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        closes: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
            Ok(None)
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_vendor_interfaces_report_missing_driver() {
        let config = InterfaceConfig::new(InterfaceKind::Kvaser, Bitrate::Kbps500);
        match open(&config) {
            Err(ConnectError::DriverUnavailable(name)) => assert_eq!(name, "Kvaser CAN"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("kvaser should not open without a driver"),
        }
    }

    #[test]
    fn test_guard_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut guard = SourceGuard::new(Box::new(CountingSource {
            closes: closes.clone(),
        }));
        guard.close();
        guard.close();
        assert!(matches!(
            guard.receive(Duration::from_millis(1)),
            Err(TransportError::Disconnected)
        ));
        drop(guard);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(SourceGuard::new(Box::new(CountingSource {
            closes: closes.clone(),
        })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
