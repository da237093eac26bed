//! Live statistics engine
//!
//! Drains the delivery queue in bounded batches and keeps one
//! [`IdentifierStats`] entry per CAN identifier: occurrence count, last payload
//! and the cycle time between consecutive frames.
//!
//! The engine is the only consumer of the delivery queue, so the map is owned
//! outright and needs no locking.

use crate::presentation::{Presentation, RowHandle, RowUpdate};
use crate::types::{CycleTime, Frame, Timestamp};
use crossbeam::channel::{Receiver, TryRecvError};
use serde::Serialize;
use std::collections::HashMap;

/// Aggregate state for one identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierStats {
    pub identifier: u32,
    pub last_timestamp: Timestamp,
    /// Frames seen since recording started (1 on first sight)
    pub occurrence_count: u64,
    pub last_dlc: u8,
    pub last_payload: Vec<u8>,
    pub last_cycle_time: CycleTime,
    /// Row showing this identifier in the presentation layer
    pub row: RowHandle,
}

/// Result of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Frames processed in this pass (never above the batch limit)
    pub processed: usize,
    /// Identifiers seen for the first time in this pass
    pub new_identifiers: usize,
    /// True if the producer side of the queue is gone
    pub disconnected: bool,
}

/// Per-identifier statistics for one session
#[derive(Debug)]
pub struct StatisticsEngine {
    entries: HashMap<u32, IdentifierStats>,
    batch_limit: usize,
    processed_total: u64,
}

impl StatisticsEngine {
    /// Create an engine that processes at most `batch_limit` frames per drain
    pub fn new(batch_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            batch_limit: batch_limit.max(1),
            processed_total: 0,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Take up to one batch of frames off `queue` and apply them
    ///
    /// Frames beyond the batch limit stay queued for the next call.
    pub fn drain(&mut self, queue: &Receiver<Frame>, ui: &mut dyn Presentation) -> DrainReport {
        let mut report = DrainReport::default();

        while report.processed < self.batch_limit {
            match queue.try_recv() {
                Ok(frame) => {
                    if self.apply(&frame, ui) {
                        report.new_identifiers += 1;
                    }
                    report.processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    report.disconnected = true;
                    break;
                }
            }
        }

        if report.processed > 0 {
            log::trace!(
                "Drained {} frames ({} new identifiers, {} still queued)",
                report.processed,
                report.new_identifiers,
                queue.len()
            );
        }
        report
    }

    /// Apply a single frame; returns `true` if its identifier was new
    pub fn apply(&mut self, frame: &Frame, ui: &mut dyn Presentation) -> bool {
        self.processed_total += 1;

        match self.entries.get_mut(&frame.identifier) {
            Some(stats) => {
                let cycle_time = CycleTime::between(&stats.last_timestamp, &frame.timestamp);
                stats.occurrence_count += 1;
                stats.last_timestamp = frame.timestamp;
                stats.last_dlc = frame.dlc;
                stats.last_payload.clone_from(&frame.payload);
                stats.last_cycle_time = cycle_time;

                ui.update_row(
                    stats.row,
                    &RowUpdate {
                        identifier: frame.identifier,
                        dlc: frame.dlc,
                        data: &frame.payload,
                        count: stats.occurrence_count,
                        cycle_time,
                    },
                );
                false
            }
            None => {
                let row = ui.create_row(&RowUpdate {
                    identifier: frame.identifier,
                    dlc: frame.dlc,
                    data: &frame.payload,
                    count: 1,
                    cycle_time: CycleTime::FirstSeen,
                });
                log::debug!("New identifier 0x{:X} -> {:?}", frame.identifier, row);

                self.entries.insert(
                    frame.identifier,
                    IdentifierStats {
                        identifier: frame.identifier,
                        last_timestamp: frame.timestamp,
                        occurrence_count: 1,
                        last_dlc: frame.dlc,
                        last_payload: frame.payload.clone(),
                        last_cycle_time: CycleTime::FirstSeen,
                        row,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, identifier: u32) -> Option<&IdentifierStats> {
        self.entries.get(&identifier)
    }

    /// Number of distinct identifiers seen
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames applied since the engine was created
    pub fn processed_total(&self) -> u64 {
        self.processed_total
    }

    /// All entries ordered by identifier
    pub fn snapshot(&self) -> Vec<IdentifierStats> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by_key(|s| s.identifier);
        all
    }
}
