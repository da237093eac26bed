//! Trace exporter
//!
//! Serializes a frozen session log into a PEAK TRC 1.1 text trace.

use super::{FILE_VERSION, SECS_PER_DAY};
use crate::session::SessionLog;
use crate::types::{elapsed_ms, timestamp_to_secs, ExportError, Frame};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Column legend written after the start time
const COLUMN_LEGEND: &[&str] = &[
    ";   Message Number",
    ";   |         Time Offset (ms)",
    ";   |         |        Type",
    ";   |         |        |        ID (hex)",
    ";   |         |        |        |     Data Length",
    ";   |         |        |        |     |   Data Bytes (hex) ...",
    ";   |         |        |        |     |   |",
    ";---+--   ----+----  --+--  ----+---  +  -+ -- -- -- -- -- -- --",
];

/// Writes session logs as `.trc` traces
pub struct TraceExporter;

impl TraceExporter {
    /// Write the header and one line per frame to `out`
    ///
    /// # Returns
    /// * `Ok(())` if everything was written
    /// * `Err(ExportError::NoMessages)` if `frames` is empty (nothing is written)
    pub fn write<W: Write>(frames: &[Frame], out: W) -> Result<(), ExportError> {
        let first = frames.first().ok_or(ExportError::NoMessages)?;
        let mut out = BufWriter::new(out);

        Self::write_header(first, &mut out)?;
        for (idx, frame) in frames.iter().enumerate() {
            writeln!(out, "{}", Self::format_line(idx + 1, first, frame))?;
        }

        out.flush()?;
        Ok(())
    }

    /// Render a whole trace into a string
    pub fn render(frames: &[Frame]) -> Result<String, ExportError> {
        let mut buf = Vec::new();
        Self::write(frames, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Export `session` to `path`, all or nothing
    ///
    /// The trace is written to a temporary file next to `path` and moved into
    /// place only once it is complete, so a failed export never leaves a
    /// truncated trace behind.
    ///
    /// # Returns
    /// * `Ok(count)` - number of frames written
    pub fn export(session: &SessionLog, path: &Path) -> Result<usize, ExportError> {
        let frames = session.snapshot();
        if frames.is_empty() {
            return Err(ExportError::NoMessages);
        }

        log::info!("Exporting {} frames to {:?}", frames.len(), path);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            fs::create_dir_all(dir)?;
        }

        let mut tmp = NamedTempFile::new_in(dir)?;
        Self::write(&frames, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ExportError::Io(e.error))?;

        log::info!("Trace saved: {:?}", path);
        Ok(frames.len())
    }

    fn write_header<W: Write>(first: &Frame, out: &mut W) -> std::io::Result<()> {
        let start_secs = timestamp_to_secs(&first.timestamp);
        let start_time = format!(
            "{}.{:03}",
            first.timestamp.format("%d-%m-%Y %H:%M:%S"),
            first.timestamp.timestamp_subsec_millis()
        );

        writeln!(out, ";$FILEVERSION={}", FILE_VERSION)?;
        writeln!(out, ";$STARTTIME={}", start_secs / SECS_PER_DAY)?;
        writeln!(out, ";")?;
        writeln!(out, ";   Start time: {} 0", start_time)?;
        writeln!(out, ";   Generated by can-recorder v{}", crate::VERSION)?;
        writeln!(out, ";")?;
        for line in COLUMN_LEGEND {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Format one data line (without line ending)
    pub fn format_line(number: usize, first: &Frame, frame: &Frame) -> String {
        let message_number = format!("{})", number);
        let offset_ms = elapsed_ms(&first.timestamp, &frame.timestamp);

        format!(
            "  {:>5}  {:>10.1}  {:<6} {:<10}{:<2} {}",
            message_number,
            offset_ms,
            "Rx",
            frame.id_hex(),
            frame.dlc,
            frame.payload_hex()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{timestamp_from_secs, RawFrame};

    fn frame(id: u32, data: &[u8], secs: f64) -> Frame {
        Frame::from_raw(RawFrame::new(id, data.to_vec()), timestamp_from_secs(secs).unwrap())
    }

    fn scenario() -> Vec<Frame> {
        vec![
            frame(0x100, &[0x01, 0x02], 1000.000),
            frame(0x100, &[0x01, 0x03], 1000.010),
            frame(0x200, &[], 1000.020),
        ]
    }

    #[test]
    fn test_header_fields() {
        let text = TraceExporter::render(&scenario()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], ";$FILEVERSION=1.1");
        assert_eq!(lines[1], format!(";$STARTTIME={}", 1000.0 / 86400.0));
        assert_eq!(lines[3], ";   Start time: 01-01-1970 00:16:40.000 0");
        assert!(lines[4].starts_with(";   Generated by can-recorder v"));
        assert_eq!(
            lines[13],
            ";---+--   ----+----  --+--  ----+---  +  -+ -- -- -- -- -- -- --"
        );
    }

    #[test]
    fn test_data_lines() {
        let text = TraceExporter::render(&scenario()).unwrap();
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with(';')).collect();

        assert_eq!(data.len(), 3);
        assert_eq!(data[0], "     1)         0.0  Rx     100       2  01 02");
        assert_eq!(data[1], "     2)        10.0  Rx     100       2  01 03");
        assert_eq!(data[2], "     3)        20.0  Rx     200       0  ");
    }

    #[test]
    fn test_start_time_milliseconds_truncate() {
        let frames = vec![frame(0x7E8, &[0x02], 1_700_000_000.123_9)];
        let text = TraceExporter::render(&frames).unwrap();
        assert!(text.contains(";   Start time: 14-11-2023 22:13:20.123 0"));
    }

    #[test]
    fn test_empty_session_writes_nothing() {
        let mut buf = Vec::new();
        let result = TraceExporter::write(&[], &mut buf);
        assert!(matches!(result, Err(ExportError::NoMessages)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.trc");

        let log = SessionLog::new();
        for f in scenario() {
            log.append(f);
        }

        let written = TraceExporter::export(&log, &path).unwrap();
        assert_eq!(written, 3);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(";$FILEVERSION=1.1\n"));
        assert_eq!(content.lines().filter(|l| !l.starts_with(';')).count(), 3);
    }

    #[test]
    fn test_export_empty_session_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.trc");

        let result = TraceExporter::export(&SessionLog::new(), &path);
        assert!(matches!(result, Err(ExportError::NoMessages)));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
