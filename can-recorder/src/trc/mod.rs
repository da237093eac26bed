//! PEAK trace (`.trc`) files
//!
//! The recorder writes file version 1.1: a short header followed by one
//! fixed-column line per received frame. The reader accepts what the writer
//! produces so that exported sessions can be verified and replayed.

pub mod reader;
pub mod writer;

pub use reader::{Trace, TraceReader};
pub use writer::TraceExporter;

/// The only trace file version the recorder reads and writes
pub const FILE_VERSION: &str = "1.1";

/// Seconds per day, used for the `;$STARTTIME` fractional-day value
pub(crate) const SECS_PER_DAY: f64 = 86_400.0;
