//! Recording session controller
//!
//! [`Recorder`] owns the session state machine:
//!
//! ```text
//! Idle --start--> Running --stop / transport error--> Stopping --> Idle
//! ```
//!
//! Starting opens a frame source and creates a fresh session (log, statistics,
//! delivery queue). The presentation layer calls [`Recorder::tick`] on a fixed
//! cadence to drain one batch into the live view. Stopping freezes the session
//! so it can be exported until the next start replaces it.

use crate::config::{InterfaceConfig, RecorderConfig};
use crate::ingest::{IngestExit, IngestionHandle, IngestionLoop};
use crate::presentation::Presentation;
use crate::session::SessionLog;
use crate::source::{self, FrameSource};
use crate::stats::StatisticsEngine;
use crate::trc::TraceExporter;
use crate::types::{ExportError, Frame, RecorderError, Result, TransportError};
use crossbeam::channel::{self, Receiver};
use std::path::Path;

/// Where the recorder is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No ingestion running; the last session (if any) is frozen
    Idle,
    /// Ingestion thread is capturing frames
    Running,
    /// Ingestion is shutting down and the source is being closed
    Stopping,
}

/// Everything that belongs to one recording
struct Session {
    log: SessionLog,
    stats: StatisticsEngine,
    live: Receiver<Frame>,
    source: String,
}

/// Drives recording sessions
pub struct Recorder {
    config: RecorderConfig,
    state: RecorderState,
    session: Option<Session>,
    ingestion: Option<IngestionHandle>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            state: RecorderState::Idle,
            session: None,
            ingestion: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RecorderState::Running
    }

    /// Open `interface` and start a new session
    ///
    /// Connection failures are reported to `ui` and returned; the recorder
    /// stays idle and the previous session is kept.
    pub fn start(&mut self, interface: &InterfaceConfig, ui: &mut dyn Presentation) -> Result<()> {
        if self.state != RecorderState::Idle {
            return Err(Self::report_failure(RecorderError::AlreadyRunning, ui));
        }

        match source::open(interface) {
            Ok(source) => self.start_with_source(source, ui),
            Err(e) => Err(Self::report_failure(RecorderError::Connect(e), ui)),
        }
    }

    /// Start a new session reading from an already opened source
    ///
    /// On failure the source is closed before the error is returned.
    pub fn start_with_source(
        &mut self,
        mut source: Box<dyn FrameSource>,
        ui: &mut dyn Presentation,
    ) -> Result<()> {
        if self.state != RecorderState::Idle {
            source.close();
            return Err(Self::report_failure(RecorderError::AlreadyRunning, ui));
        }

        let description = source.describe();
        let log = SessionLog::new();
        let (tx, rx) = channel::unbounded();

        let handle = IngestionLoop::new(source, log.clone(), tx, self.config.receive_timeout())
            .spawn()
            .map_err(|e| Self::report_failure(RecorderError::Spawn(e), ui))?;

        log::info!("Recording started on {}", description);
        ui.clear();
        self.session = Some(Session {
            log,
            stats: StatisticsEngine::new(self.config.batch_limit),
            live: rx,
            source: description,
        });
        self.ingestion = Some(handle);
        self.state = RecorderState::Running;

        ui.report_status("CAN initialization successful. Recording started.");
        ui.report_message_count(0);
        Ok(())
    }

    /// One refresh of the live view
    ///
    /// Drains at most one batch from the delivery queue and reports the message
    /// count. If the ingestion thread has ended on its own (transport error or
    /// exhausted source), later ticks keep draining until the queue is empty;
    /// only then is the session stopped and the cause reported.
    ///
    /// # Returns
    /// * `true` while recording, i.e. the caller should schedule another tick
    pub fn tick(&mut self, ui: &mut dyn Presentation) -> bool {
        if self.state != RecorderState::Running {
            return false;
        }

        if let Some(session) = self.session.as_mut() {
            session.stats.drain(&session.live, ui);
            ui.report_message_count(session.log.len() as u64);
        }

        let finished = self
            .ingestion
            .as_ref()
            .map_or(true, IngestionHandle::is_finished);
        if finished && self.pending_live_frames() == 0 {
            self.shutdown(false, ui);
            return false;
        }
        true
    }

    /// Stop the running session
    ///
    /// Waits for the ingestion thread (at most about one receive timeout),
    /// which closes the source, then freezes the session log and shows every
    /// frame still waiting on the delivery queue.
    pub fn stop(&mut self, ui: &mut dyn Presentation) {
        if self.state != RecorderState::Running {
            log::debug!("Stop requested while {:?}, ignoring", self.state);
            return;
        }
        self.shutdown(true, ui);
    }

    fn shutdown(&mut self, requested: bool, ui: &mut dyn Presentation) {
        self.state = RecorderState::Stopping;

        let exit = match self.ingestion.take() {
            Some(handle) if requested => handle.stop(),
            Some(handle) => handle.join(),
            None => IngestExit::Stopped,
        };

        if let Some(session) = self.session.as_mut() {
            session.log.freeze();
            while session.stats.drain(&session.live, ui).processed > 0 {}
            ui.report_message_count(session.log.len() as u64);
            log::info!(
                "Session on {} frozen with {} frames ({} identifiers)",
                session.source,
                session.log.len(),
                session.stats.len()
            );
        }
        self.state = RecorderState::Idle;

        match exit {
            IngestExit::Stopped => ui.report_status("Recording stopped."),
            IngestExit::Failed(TransportError::EndOfStream) => {
                ui.report_status("Recording stopped: frame source exhausted.")
            }
            IngestExit::Failed(e) => {
                log::error!("Recording stopped due to error: {}", e);
                ui.report_status(&format!("Recording stopped due to error: {}", e));
            }
        }
    }

    /// Save the frozen session as a `.trc` trace
    ///
    /// Failures are reported to `ui` and leave the session untouched so the
    /// export can be retried.
    pub fn export(&self, path: &Path, ui: &mut dyn Presentation) -> std::result::Result<usize, ExportError> {
        let result = match (&self.session, self.state) {
            (_, RecorderState::Running | RecorderState::Stopping) => Err(ExportError::StillRecording),
            (None, _) => Err(ExportError::NoMessages),
            (Some(session), RecorderState::Idle) => TraceExporter::export(&session.log, path),
        };

        match &result {
            Ok(_) => ui.report_status(&format!("Trace saved successfully: {}", path.display())),
            Err(ExportError::NoMessages) => ui.report_status("No messages to save!"),
            Err(e) => {
                log::error!("Error saving trace to {:?}: {}", path, e);
                ui.report_status(&format!("Error saving trace: {}", e));
            }
        }
        result
    }

    /// Log of the current (or last) session
    pub fn session_log(&self) -> Option<&SessionLog> {
        self.session.as_ref().map(|s| &s.log)
    }

    /// Live statistics of the current (or last) session
    pub fn statistics(&self) -> Option<&StatisticsEngine> {
        self.session.as_ref().map(|s| &s.stats)
    }

    /// Frames captured but not yet shown in the live view
    pub fn pending_live_frames(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.live.len())
    }

    fn report_failure(err: RecorderError, ui: &mut dyn Presentation) -> RecorderError {
        log::error!("{}", err);
        ui.report_status(&err.to_string());
        err
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(handle) = self.ingestion.take() {
            log::debug!("Recorder dropped while running, stopping ingestion");
            handle.stop();
        }
    }
}
