//! Ingestion loop
//!
//! Runs on its own thread, pulling frames from a [`FrameSource`], stamping them
//! with the capture instant, appending them to the [`SessionLog`] and handing a
//! copy to the live view through the delivery queue.
//!
//! Stopping is cooperative: the stop flag is checked between receive calls, so
//! shutdown takes at most one receive timeout. The source is closed exactly
//! once when the loop exits.

use crate::session::SessionLog;
use crate::source::{FrameSource, SourceGuard};
use crate::types::{Frame, RawFrame, Timestamp, TransportError};
use chrono::Utc;
use crossbeam::channel::Sender;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why the ingestion loop ended
#[derive(Debug)]
pub enum IngestExit {
    /// Stop was requested
    Stopped,
    /// The source failed (or ran out of frames)
    Failed(TransportError),
}

/// The producer side of the capture pipeline
pub struct IngestionLoop {
    source: SourceGuard,
    log: SessionLog,
    queue: Sender<Frame>,
    stop: Arc<AtomicBool>,
    receive_timeout: Duration,
    last_timestamp: Option<Timestamp>,
    captured: u64,
}

impl IngestionLoop {
    /// Prepare a loop reading from `source` into `log` and `queue`
    pub fn new(
        source: Box<dyn FrameSource>,
        log: SessionLog,
        queue: Sender<Frame>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            source: SourceGuard::new(source),
            log,
            queue,
            stop: Arc::new(AtomicBool::new(false)),
            receive_timeout,
            last_timestamp: None,
            captured: 0,
        }
    }

    /// Start the loop on a dedicated thread
    ///
    /// If the thread cannot be spawned the source is closed before the error
    /// is returned.
    pub fn spawn(self) -> io::Result<IngestionHandle> {
        let stop = self.stop.clone();
        let thread = thread::Builder::new()
            .name("can-ingest".to_string())
            .spawn(move || self.run())?;

        Ok(IngestionHandle { stop, thread })
    }

    fn run(mut self) -> IngestExit {
        log::info!("Ingestion started on {}", self.source.describe());

        let exit = loop {
            if self.stop.load(Ordering::Acquire) {
                break IngestExit::Stopped;
            }

            match self.source.receive(self.receive_timeout) {
                Ok(Some(raw)) => {
                    if !self.capture(raw) {
                        break IngestExit::Stopped;
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    match &e {
                        TransportError::EndOfStream => log::info!("Frame source exhausted"),
                        other => log::error!("Transport error, stopping ingestion: {}", other),
                    }
                    break IngestExit::Failed(e);
                }
            }
        };

        self.source.close();
        log::info!("Ingestion finished after {} frames", self.captured);
        exit
    }

    /// Stamp, log and publish one frame; returns `false` if the log is frozen
    fn capture(&mut self, raw: RawFrame) -> bool {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(prev) if now < prev => prev,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let frame = Frame::from_raw(raw, timestamp);
        log::trace!(
            "Captured {} [{}] {}",
            frame.id_hex(),
            frame.dlc,
            frame.payload_hex()
        );

        if !self.log.append(frame.clone()) {
            return false;
        }
        self.captured += 1;

        if self.queue.send(frame).is_err() {
            log::trace!("Live view detached, frame kept in session log only");
        }
        true
    }
}

/// Handle to a running ingestion thread
pub struct IngestionHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<IngestExit>,
}

impl IngestionHandle {
    /// Ask the loop to finish after the current receive call
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once the loop has exited (stopped or failed)
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to exit
    pub fn join(self) -> IngestExit {
        self.thread.join().unwrap_or_else(|_| {
            log::error!("Ingestion thread panicked");
            IngestExit::Failed(TransportError::Bus("ingestion thread panicked".to_string()))
        })
    }

    /// Request a stop and wait for it
    pub fn stop(self) -> IngestExit {
        self.request_stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Yields scripted results, then times out forever
    struct ScriptedSource {
        script: VecDeque<Result<Option<RawFrame>, TransportError>>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(
            script: Vec<Result<Option<RawFrame>, TransportError>>,
            closes: Arc<AtomicUsize>,
        ) -> Self {
            Self {
                script: script.into(),
                closes,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
            match self.script.pop_front() {
                Some(step) => step,
                None => {
                    thread::sleep(timeout);
                    Ok(None)
                }
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_frames_logged_and_queued_in_order() {
        let closes = Arc::new(AtomicUsize::new(0));
        let script = (0..20u32)
            .map(|i| Ok(Some(RawFrame::new(i, vec![i as u8]))))
            .collect();
        let log = SessionLog::new();
        let (tx, rx) = channel::unbounded();

        let handle = IngestionLoop::new(
            Box::new(ScriptedSource::new(script, closes.clone())),
            log.clone(),
            tx,
            Duration::from_millis(10),
        )
        .spawn()
        .unwrap();

        wait_for(|| log.len() == 20);
        assert!(matches!(handle.stop(), IngestExit::Stopped));

        let logged = log.snapshot();
        let queued: Vec<Frame> = rx.try_iter().collect();
        assert_eq!(logged, queued);
        assert!(logged.iter().enumerate().all(|(i, f)| f.identifier == i as u32));
        assert!(logged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_error_ends_loop() {
        let closes = Arc::new(AtomicUsize::new(0));
        let script = vec![
            Ok(Some(RawFrame::new(0x100, vec![1]))),
            Ok(None),
            Err(TransportError::Bus("bus off".to_string())),
            Ok(Some(RawFrame::new(0x200, vec![2]))),
        ];
        let log = SessionLog::new();
        let (tx, _rx) = channel::unbounded();

        let handle = IngestionLoop::new(
            Box::new(ScriptedSource::new(script, closes.clone())),
            log.clone(),
            tx,
            Duration::from_millis(10),
        )
        .spawn()
        .unwrap();

        wait_for(|| handle.is_finished());
        match handle.join() {
            IngestExit::Failed(TransportError::Bus(msg)) => assert_eq!(msg, "bus off"),
            other => panic!("unexpected exit: {:?}", other),
        }
        assert_eq!(log.len(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_within_one_timeout() {
        let closes = Arc::new(AtomicUsize::new(0));
        let timeout = Duration::from_millis(100);
        let (tx, _rx) = channel::unbounded();

        let handle = IngestionLoop::new(
            Box::new(ScriptedSource::new(Vec::new(), closes.clone())),
            SessionLog::new(),
            tx,
            timeout,
        )
        .spawn()
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        assert!(matches!(handle.stop(), IngestExit::Stopped));

        assert!(started.elapsed() < timeout * 3);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detached_live_view_still_logs() {
        let closes = Arc::new(AtomicUsize::new(0));
        let script = vec![Ok(Some(RawFrame::new(0x1, vec![]))), Ok(Some(RawFrame::new(0x2, vec![])))];
        let log = SessionLog::new();
        let (tx, rx) = channel::unbounded();
        drop(rx);

        let handle = IngestionLoop::new(
            Box::new(ScriptedSource::new(script, closes.clone())),
            log.clone(),
            tx,
            Duration::from_millis(10),
        )
        .spawn()
        .unwrap();

        wait_for(|| log.len() == 2);
        assert!(matches!(handle.stop(), IngestExit::Stopped));

        let ids: Vec<u32> = log.snapshot().iter().map(|f| f.identifier).collect();
        assert_eq!(ids, vec![0x1, 0x2]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
