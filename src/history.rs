//! Bounded delivery history
//!
//! Ring-buffer-style record of successful deliveries, oldest evicted first.
//! The history is the sole source of truth for "delivered" events; readers
//! always get a snapshot copied under the lock.

use crate::domain_types::{AgentId, HistoryCapacity, IncomingMessage, MessageTimestamp};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Bounded, ordered record of delivered messages.
#[derive(Debug)]
pub struct MessageHistory {
    entries: Mutex<VecDeque<IncomingMessage>>,
    capacity: HistoryCapacity,
}

impl MessageHistory {
    /// Creates an empty history with the given capacity.
    #[must_use]
    pub fn new(capacity: HistoryCapacity) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.as_usize())),
            capacity,
        }
    }

    /// Appends a delivery, evicting the oldest entry when full.
    pub fn record(&self, message: IncomingMessage) {
        let mut entries = self.entries.lock().expect("history mutex poisoned");
        if entries.len() == self.capacity.as_usize() {
            entries.pop_front();
        }
        entries.push_back(message);
    }

    /// Copies the whole history, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<IncomingMessage> {
        self.entries
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Copies the deliveries addressed to one agent, oldest first.
    #[must_use]
    pub fn for_agent(&self, receiver: AgentId) -> Vec<IncomingMessage> {
        self.entries
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .filter(|entry| entry.receiver == receiver)
            .cloned()
            .collect()
    }

    /// Counts deliveries stamped at or after `cutoff`.
    #[must_use]
    pub fn count_delivered_since(&self, cutoff: MessageTimestamp) -> usize {
        self.entries
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .filter(|entry| entry.delivered_at >= cutoff)
            .count()
    }

    /// Number of recorded deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("history mutex poisoned").len()
    }

    /// True when nothing has been delivered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("history mutex poisoned").is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> HistoryCapacity {
        self.capacity
    }
}
