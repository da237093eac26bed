//! CAN Recorder Library
//!
//! Captures a live stream of CAN frames, keeps per-identifier live statistics
//! and exports whole sessions as PEAK `.trc` traces.
//!
//! # Architecture
//!
//! ```text
//! FrameSource -> IngestionLoop -+-> SessionLog -------------> TraceExporter
//!   (thread)                    +-> delivery queue -> StatisticsEngine -> Presentation
//! ```
//!
//! - The ingestion loop runs on its own thread and blocks on the source with a
//!   short timeout. Every frame lands in the session log (the durable record)
//!   and on the delivery queue (the live view).
//! - The presentation layer calls [`Recorder::tick`] on a fixed cadence; each
//!   tick drains one bounded batch into the statistics engine.
//! - Export reads only the session log, never the live statistics.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_recorder::{Bitrate, InterfaceConfig, InterfaceKind, LiveTable, Recorder, RecorderConfig};
//! use std::path::Path;
//! use std::thread;
//!
//! let mut recorder = Recorder::new(RecorderConfig::new());
//! let mut table = LiveTable::new();
//!
//! let iface = InterfaceConfig::new(InterfaceKind::Virtual, Bitrate::Kbps500);
//! recorder.start(&iface, &mut table).unwrap();
//!
//! for _ in 0..10 {
//!     thread::sleep(recorder.config().refresh_interval());
//!     if !recorder.tick(&mut table) {
//!         break;
//!     }
//! }
//!
//! recorder.stop(&mut table);
//! recorder.export(Path::new("session.trc"), &mut table).ok();
//! ```

// Public modules
pub mod config;
pub mod ingest;
pub mod presentation;
pub mod recorder;
pub mod session;
pub mod source;
pub mod stats;
pub mod trc;
pub mod types;

// Re-export main types for convenience
pub use config::{Bitrate, InterfaceConfig, InterfaceKind, RecorderConfig};
pub use ingest::{IngestExit, IngestionHandle, IngestionLoop};
pub use presentation::{LiveRow, LiveTable, Presentation, RowHandle, RowUpdate};
pub use recorder::{Recorder, RecorderState};
pub use session::SessionLog;
pub use source::{FrameSource, ReplaySource, VirtualNetwork, VirtualPort};
pub use stats::{DrainReport, IdentifierStats, StatisticsEngine};
pub use trc::{Trace, TraceExporter, TraceReader};
pub use types::{
    ConnectError, CycleTime, ExportError, Frame, RawFrame, RecorderError, Result, Timestamp,
    TraceError, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
