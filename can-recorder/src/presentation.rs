//! Presentation boundary
//!
//! The statistics engine and recorder talk to whatever displays the live view
//! through [`Presentation`]. Rows are addressed by [`RowHandle`], a plain key
//! the presentation layer hands out when a row is created.

use crate::types::{format_identifier, format_payload, CycleTime};
use serde::Serialize;

/// Stable key of a row in the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowHandle(pub usize);

/// Values shown for one identifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowUpdate<'a> {
    pub identifier: u32,
    pub dlc: u8,
    pub data: &'a [u8],
    pub count: u64,
    pub cycle_time: CycleTime,
}

/// Receiver of live-view updates and status messages
pub trait Presentation {
    /// Drop every row and reset the message count; called when a session starts
    fn clear(&mut self);

    /// Add a row for an identifier seen for the first time
    fn create_row(&mut self, row: &RowUpdate<'_>) -> RowHandle;

    /// Refresh the row previously created for an identifier
    fn update_row(&mut self, handle: RowHandle, row: &RowUpdate<'_>);

    /// Show a one-line status message
    fn report_status(&mut self, message: &str);

    /// Show the number of frames captured in the current session
    fn report_message_count(&mut self, count: u64);
}

/// One row of the live table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveRow {
    pub id: String,
    pub dlc: u8,
    pub data: String,
    pub count: u64,
    pub cycle_time: String,
}

impl LiveRow {
    fn from_update(row: &RowUpdate<'_>) -> Self {
        Self {
            id: format_identifier(row.identifier),
            dlc: row.dlc,
            data: format_payload(row.data),
            count: row.count,
            cycle_time: row.cycle_time.to_string(),
        }
    }
}

/// In-memory live view
///
/// Keeps rows in first-seen order, the latest status line, every status
/// message reported, and the running message count.
#[derive(Debug, Clone, Default)]
pub struct LiveTable {
    rows: Vec<LiveRow>,
    status: Option<String>,
    status_history: Vec<String>,
    message_count: u64,
}

impl LiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[LiveRow] {
        &self.rows
    }

    pub fn row(&self, handle: RowHandle) -> Option<&LiveRow> {
        self.rows.get(handle.0)
    }

    /// Find the row showing `identifier`
    pub fn row_for(&self, identifier: u32) -> Option<&LiveRow> {
        let id = format_identifier(identifier);
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn status_history(&self) -> &[String] {
        &self.status_history
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}

impl Presentation for LiveTable {
    fn clear(&mut self) {
        self.rows.clear();
        self.message_count = 0;
    }

    fn create_row(&mut self, row: &RowUpdate<'_>) -> RowHandle {
        self.rows.push(LiveRow::from_update(row));
        RowHandle(self.rows.len() - 1)
    }

    fn update_row(&mut self, handle: RowHandle, row: &RowUpdate<'_>) {
        match self.rows.get_mut(handle.0) {
            Some(existing) => *existing = LiveRow::from_update(row),
            None => log::warn!("Update for unknown row {:?}", handle),
        }
    }

    fn report_status(&mut self, message: &str) {
        log::info!("Status: {}", message);
        self.status = Some(message.to_string());
        self.status_history.push(message.to_string());
    }

    fn report_message_count(&mut self, count: u64) {
        self.message_count = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_created_and_updated() {
        let mut table = LiveTable::new();
        let handle = table.create_row(&RowUpdate {
            identifier: 0x123,
            dlc: 2,
            data: &[0xDE, 0xAD],
            count: 1,
            cycle_time: CycleTime::FirstSeen,
        });

        assert_eq!(handle, RowHandle(0));
        assert_eq!(table.row(handle).unwrap().cycle_time, "--");

        table.update_row(
            handle,
            &RowUpdate {
                identifier: 0x123,
                dlc: 2,
                data: &[0xBE, 0xEF],
                count: 2,
                cycle_time: CycleTime::Millis(20.0),
            },
        );

        let row = table.row_for(0x123).unwrap();
        assert_eq!(row.data, "BE EF");
        assert_eq!(row.count, 2);
        assert_eq!(row.cycle_time, "20.0");
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn test_status_and_count() {
        let mut table = LiveTable::new();
        table.report_status("Recording started.");
        table.report_status("Recording stopped.");
        table.report_message_count(42);

        assert_eq!(table.status(), Some("Recording stopped."));
        assert_eq!(table.status_history().len(), 2);
        assert_eq!(table.message_count(), 42);
    }

    #[test]
    fn test_clear_keeps_status_history() {
        let mut table = LiveTable::new();
        table.create_row(&RowUpdate {
            identifier: 0x7E0,
            dlc: 0,
            data: &[],
            count: 1,
            cycle_time: CycleTime::FirstSeen,
        });
        table.report_message_count(1);
        table.report_status("Recording stopped.");

        table.clear();

        assert!(table.rows().is_empty());
        assert!(table.row_for(0x7E0).is_none());
        assert_eq!(table.message_count(), 0);
        assert_eq!(table.status(), Some("Recording stopped."));
    }
}
