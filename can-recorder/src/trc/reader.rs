//! Trace reader
//!
//! Parses `.trc` files written by [`TraceExporter`](super::TraceExporter).
//! Only `;$FILEVERSION` and `;$STARTTIME` are interpreted, every other comment
//! line is decorative.

use super::{FILE_VERSION, SECS_PER_DAY};
use crate::types::{timestamp_from_secs, Frame, Timestamp, TraceError};
use chrono::Duration;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A parsed trace
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Absolute time of the first message
    pub start_time: Timestamp,
    /// Frames in message-number order, with absolute timestamps
    pub frames: Vec<Frame>,
}

impl Trace {
    /// Milliseconds between the start time and each frame
    pub fn offsets_ms(&self) -> Vec<f64> {
        self.frames
            .iter()
            .map(|f| crate::types::elapsed_ms(&self.start_time, &f.timestamp))
            .collect()
    }
}

/// Parses `.trc` traces
pub struct TraceReader;

impl TraceReader {
    /// Open and parse a trace file
    pub fn read_file(path: &Path) -> Result<Trace, TraceError> {
        log::info!("Reading trace file: {:?}", path);
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    /// Parse a trace from any buffered reader
    pub fn read<R: BufRead>(reader: R) -> Result<Trace, TraceError> {
        let mut version: Option<String> = None;
        let mut start_time: Option<Timestamp> = None;
        let mut frames = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let trimmed = line.trim_end_matches('\r').trim();

            if trimmed.is_empty() {
                continue;
            }

            if let Some(comment) = trimmed.strip_prefix(';') {
                if let Some(value) = comment.strip_prefix("$FILEVERSION=") {
                    let value = value.trim();
                    if value != FILE_VERSION {
                        return Err(TraceError::UnsupportedVersion(value.to_string()));
                    }
                    version = Some(value.to_string());
                } else if let Some(value) = comment.strip_prefix("$STARTTIME=") {
                    let days: f64 = value.trim().parse().map_err(|_| TraceError::InvalidLine {
                        line: line_no,
                        reason: format!("invalid start time '{}'", value.trim()),
                    })?;
                    let start = timestamp_from_secs(days * SECS_PER_DAY).ok_or_else(|| {
                        TraceError::InvalidLine {
                            line: line_no,
                            reason: format!("start time '{}' out of range", value.trim()),
                        }
                    })?;
                    start_time = Some(start);
                }
                continue;
            }

            if version.is_none() {
                return Err(TraceError::MissingVersion);
            }
            let start = start_time.ok_or(TraceError::MissingStartTime)?;

            let frame = parse_data_line(trimmed, start, frames.len() + 1).map_err(|reason| {
                TraceError::InvalidLine {
                    line: line_no,
                    reason,
                }
            })?;
            frames.push(frame);
        }

        if version.is_none() {
            return Err(TraceError::MissingVersion);
        }
        let start_time = start_time.ok_or(TraceError::MissingStartTime)?;

        log::debug!("Parsed {} frames from trace", frames.len());
        Ok(Trace { start_time, frames })
    }
}

/// Parse `N) offset Rx ID DLC [bytes...]`
fn parse_data_line(line: &str, start: Timestamp, expected_number: usize) -> Result<Frame, String> {
    let mut fields = line.split_whitespace();

    let number = fields.next().ok_or("missing message number")?;
    let number: usize = number
        .strip_suffix(')')
        .ok_or_else(|| format!("message number '{}' is missing ')'", number))?
        .parse()
        .map_err(|_| format!("invalid message number '{}'", number))?;
    if number != expected_number {
        return Err(format!(
            "message number {} out of sequence (expected {})",
            number, expected_number
        ));
    }

    let offset = fields.next().ok_or("missing time offset")?;
    let offset_ms: f64 = offset
        .parse()
        .map_err(|_| format!("invalid time offset '{}'", offset))?;
    if !offset_ms.is_finite() {
        return Err(format!("invalid time offset '{}'", offset));
    }
    if offset_ms < 0.0 {
        return Err(format!("negative time offset {}", offset_ms));
    }

    match fields.next() {
        Some("Rx") | Some("Tx") => {}
        Some(other) => return Err(format!("unknown message type '{}'", other)),
        None => return Err("missing message type".to_string()),
    }

    let id = fields.next().ok_or("missing identifier")?;
    let identifier =
        u32::from_str_radix(id, 16).map_err(|_| format!("invalid identifier '{}'", id))?;

    let dlc = fields.next().ok_or("missing data length")?;
    let dlc: u8 = dlc
        .parse()
        .map_err(|_| format!("invalid data length '{}'", dlc))?;

    let payload = fields
        .map(|b| u8::from_str_radix(b, 16).map_err(|_| format!("invalid data byte '{}'", b)))
        .collect::<Result<Vec<u8>, String>>()?;

    let offset = Duration::microseconds((offset_ms * 1000.0).round() as i64);
    let timestamp = start
        .checked_add_signed(offset)
        .ok_or_else(|| format!("time offset {} out of range", offset_ms))?;

    Ok(Frame {
        timestamp,
        identifier,
        dlc,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trc::TraceExporter;
    use crate::types::RawFrame;
    use std::io::Cursor;

    fn frame(id: u32, data: &[u8], secs: f64) -> Frame {
        Frame::from_raw(RawFrame::new(id, data.to_vec()), timestamp_from_secs(secs).unwrap())
    }

    #[test]
    fn test_reads_exported_trace() {
        let frames = vec![
            frame(0x100, &[0x01, 0x02], 1000.000),
            frame(0x100, &[0x01, 0x03], 1000.010),
            frame(0x200, &[], 1000.020),
            frame(0x18FEF100, &[0xFF; 8], 1000.5),
        ];
        let text = TraceExporter::render(&frames).unwrap();
        let trace = TraceReader::read(Cursor::new(text)).unwrap();

        assert_eq!(trace.start_time, frames[0].timestamp);
        assert_eq!(trace.frames, frames);
        assert_eq!(trace.offsets_ms(), vec![0.0, 10.0, 20.0, 500.0]);
    }

    #[test]
    fn test_accepts_crlf() {
        let text = ";$FILEVERSION=1.1\r\n;$STARTTIME=0.5\r\n;\r\n     1)         1.5  Rx     7DF       2  02 01\r\n";
        let trace = TraceReader::read(Cursor::new(text)).unwrap();

        assert_eq!(trace.frames.len(), 1);
        assert_eq!(trace.frames[0].identifier, 0x7DF);
        assert_eq!(trace.frames[0].payload, vec![0x02, 0x01]);
        assert_eq!(trace.offsets_ms(), vec![1.5]);
        assert_eq!(trace.start_time.timestamp(), 43_200);
    }

    #[test]
    fn test_missing_version() {
        let text = ";$STARTTIME=0.5\n     1)         0.0  Rx     100       0  \n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::MissingVersion)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let text = ";$FILEVERSION=2.0\n;$STARTTIME=0.5\n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn test_missing_start_time() {
        let text = ";$FILEVERSION=1.1\n     1)         0.0  Rx     100       0  \n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::MissingStartTime)
        ));
    }

    #[test]
    fn test_invalid_lines_report_line_number() {
        let text = ";$FILEVERSION=1.1\n;$STARTTIME=0.5\n     1)         0.0  Rx     XYZ       0\n";
        match TraceReader::read(Cursor::new(text)) {
            Err(TraceError::InvalidLine { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("XYZ"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let text = ";$FILEVERSION=1.1\n;$STARTTIME=0.5\n     2)         0.0  Rx     100       0\n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::InvalidLine { line: 3, .. })
        ));
    }

    #[test]
    fn test_out_of_range_times_rejected() {
        for start in ["1e300", "NaN", "-inf"] {
            let text = format!(";$FILEVERSION=1.1\n;$STARTTIME={}\n", start);
            match TraceReader::read(Cursor::new(text)) {
                Err(TraceError::InvalidLine { line, reason }) => {
                    assert_eq!(line, 2);
                    assert!(reason.contains(start), "{}", reason);
                }
                other => panic!("unexpected result for {}: {:?}", start, other),
            }
        }

        let text = ";$FILEVERSION=1.1\n;$STARTTIME=0.5\n     1)         inf  Rx     100       0\n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::InvalidLine { line: 3, .. })
        ));

        let text = ";$FILEVERSION=1.1\n;$STARTTIME=0.5\n     1)   1e300  Rx     100       0\n";
        assert!(matches!(
            TraceReader::read(Cursor::new(text)),
            Err(TraceError::InvalidLine { line: 3, .. })
        ));
    }
}
