//! Pending-send queue.
//!
//! Frames produced while no transport is open wait here, in insertion
//! order, until the next transport opens. Each entry has a [`QueueKey`]
//! so its caller can cancel it before it is ever transmitted.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::identifiers::{Counter, QueueKey};

// ============================================================================
// PendingQueue
// ============================================================================

/// FIFO of not-yet-transmitted frames.
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Issues entry keys.
    keys: Counter,
    /// Queued frames, oldest first.
    entries: VecDeque<(QueueKey, String)>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame and returns its cancellation key.
    pub fn enqueue(&mut self, frame: String) -> QueueKey {
        let key = self.keys.issue();
        self.entries.push_back((key, frame));
        key
    }

    /// Removes the entry for `key`.
    ///
    /// Returns `false` if it was already transmitted, cleared or cancelled.
    pub fn cancel(&mut self, key: QueueKey) -> bool {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `key` is still waiting.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: QueueKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Removes every frame in insertion order.
    pub fn drain(&mut self) -> Vec<String> {
        self.entries.drain(..).map(|(_, frame)| frame).collect()
    }

    /// Discards every frame. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns the number of queued frames.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
