//! Trace replay source
//!
//! Feeds the frames of a `.trc` file back into the pipeline. With pacing
//! enabled each frame is released at its recorded offset from the start of
//! replay; without pacing frames are released as fast as they are read.

use super::FrameSource;
use crate::trc::{Trace, TraceReader};
use crate::types::{elapsed_ms, ConnectError, RawFrame, TraceError, TransportError};
use std::collections::VecDeque;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Replays a parsed trace
pub struct ReplaySource {
    name: String,
    pending: VecDeque<(Duration, RawFrame)>,
    paced: bool,
    started: Option<Instant>,
    open: bool,
}

impl ReplaySource {
    /// Open a trace file for replay
    pub fn open(path: &Path, paced: bool) -> Result<Self, ConnectError> {
        let trace = TraceReader::read_file(path).map_err(|e| match e {
            TraceError::Io(io) => ConnectError::Io(io),
            other => ConnectError::InvalidTrace(format!("{}: {}", path.display(), other)),
        })?;
        Ok(Self::from_trace(&trace, path.display().to_string(), paced))
    }

    /// Replay an already parsed trace
    pub fn from_trace(trace: &Trace, name: impl Into<String>, paced: bool) -> Self {
        let pending = trace
            .frames
            .iter()
            .map(|f| {
                let offset_ms = elapsed_ms(&trace.start_time, &f.timestamp).max(0.0);
                let raw = RawFrame {
                    id: f.identifier,
                    dlc: f.dlc,
                    data: f.payload.clone(),
                };
                (Duration::from_secs_f64(offset_ms / 1000.0), raw)
            })
            .collect::<VecDeque<_>>();

        log::debug!("Replay of {} frames prepared (paced: {})", pending.len(), paced);

        Self {
            name: name.into(),
            pending,
            paced,
            started: None,
            open: true,
        }
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay:{}", self.name)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
        if !self.open {
            return Err(TransportError::Disconnected);
        }

        let due = match self.pending.front() {
            Some((due, _)) => *due,
            None => return Err(TransportError::EndOfStream),
        };

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let wait = due.saturating_sub(started.elapsed());
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }

        Ok(self.pending.pop_front().map(|(_, raw)| raw))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.pending.clear();
        }
    }
}
