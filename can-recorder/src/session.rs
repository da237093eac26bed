//! Session log
//!
//! Append-only record of every frame captured during one recording session.
//! The ingestion thread is the only writer. Readers always observe a prefix of
//! the final sequence.

use crate::types::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to a session's frame log
///
/// Cloning the handle shares the same log.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    frames: Arc<RwLock<Vec<Frame>>>,
    frozen: Arc<AtomicBool>,
}

impl SessionLog {
    /// Create an empty, writable log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame in arrival order
    ///
    /// Returns `false` (and stores nothing) once the log is frozen.
    pub fn append(&self, frame: Frame) -> bool {
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        if self.frozen.load(Ordering::Acquire) {
            log::warn!(
                "Dropping frame 0x{:X}: session log is frozen",
                frame.identifier
            );
            return false;
        }
        frames.push(frame);
        true
    }

    /// Stop accepting frames
    pub fn freeze(&self) {
        // Taking the write lock orders the freeze after any in-flight append
        let _frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all frames recorded so far
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `f` over the frames recorded so far without copying them
    pub fn with_frames<T>(&self, f: impl FnOnce(&[Frame]) -> T) -> T {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        f(&frames)
    }
}
