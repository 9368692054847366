//! Priority message queue
//!
//! Thread-safe pending store with strict min-priority ordering (priority 1
//! first) and FIFO order inside a priority class. Expired messages are never
//! handed out: they are dropped and counted the moment the head of the queue
//! reaches them.

use crate::domain_types::{MessageId, MessageTimestamp, OutgoingMessage};
use crate::traits::HealthStatus;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::trace;

/// Fraction of enqueued messages that may fail delivery before the queue
/// reports degraded health.
const FAILED_RATIO_LIMIT: f64 = 0.10;

/// Fraction of enqueued messages that may expire before the queue reports
/// degraded health.
const EXPIRED_RATIO_LIMIT: f64 = 0.20;

/// Lifecycle state of a message the queue has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Accepted and waiting in the queue.
    Pending,
    /// Delivered to its receiver.
    Sent,
    /// Dropped by a failed delivery attempt.
    Failed,
    /// Dropped because its TTL ran out.
    Expired,
    /// Never seen by this queue.
    Unknown,
}

/// Counters describing the queue's lifetime activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    /// Messages accepted into the queue.
    pub enqueued: u64,
    /// Messages confirmed delivered.
    pub delivered: u64,
    /// Messages dropped by failed delivery attempts.
    pub failed: u64,
    /// Messages dropped by expiration (including rejected-at-enqueue).
    pub expired: u64,
    /// Messages currently waiting.
    pub pending: usize,
}

#[derive(Debug)]
struct QueuedEntry {
    message: OutgoingMessage,
    seq: u64,
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.message.priority == other.message.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Priority-ordered, expiration-aware store of pending messages.
#[derive(Debug, Default)]
pub struct MessageQueue {
    heap: Mutex<BinaryHeap<Reverse<QueuedEntry>>>,
    seq: AtomicU64,
    status: DashMap<MessageId, MessageStatus>,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message unless it is already expired.
    ///
    /// Rejected messages count toward the expired statistic.
    pub fn enqueue(&self, message: OutgoingMessage) -> bool {
        let now = MessageTimestamp::now();
        let id = message.message.id;
        if message.is_expired(now) {
            self.expired.fetch_add(1, AtomicOrdering::Relaxed);
            self.status.insert(id, MessageStatus::Expired);
            trace!(message_id = %id, "rejected expired message at enqueue");
            return false;
        }

        self.enqueued.fetch_add(1, AtomicOrdering::Relaxed);
        self.status.insert(id, MessageStatus::Pending);
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap
            .lock()
            .expect("queue mutex poisoned")
            .push(Reverse(QueuedEntry { message, seq }));
        true
    }

    /// Removes and returns the next non-expired message.
    ///
    /// Expired messages encountered at the head are dropped and counted.
    pub fn dequeue(&self) -> Option<OutgoingMessage> {
        let now = MessageTimestamp::now();
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        while let Some(Reverse(entry)) = heap.pop() {
            if entry.message.is_expired(now) {
                self.note_expired(&entry.message);
                continue;
            }
            return Some(entry.message);
        }
        None
    }

    /// Returns the next non-expired message without removing it.
    ///
    /// Expired messages at the head are still dropped and counted, exactly as
    /// `dequeue` would.
    pub fn peek(&self) -> Option<OutgoingMessage> {
        let now = MessageTimestamp::now();
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        loop {
            let head_expired = match heap.peek() {
                None => return None,
                Some(Reverse(entry)) => entry.message.is_expired(now),
            };
            if head_expired {
                if let Some(Reverse(dropped)) = heap.pop() {
                    self.note_expired(&dropped.message);
                }
            } else {
                return heap.peek().map(|head| head.0.message.clone());
            }
        }
    }

    /// Evicts every expired message, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = MessageTimestamp::now();
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        let before = heap.len();
        let retained: BinaryHeap<Reverse<QueuedEntry>> = heap
            .drain()
            .filter(|Reverse(entry)| {
                if entry.message.is_expired(now) {
                    self.note_expired(&entry.message);
                    false
                } else {
                    true
                }
            })
            .collect();
        *heap = retained;
        before - heap.len()
    }

    fn note_expired(&self, message: &OutgoingMessage) {
        self.expired.fetch_add(1, AtomicOrdering::Relaxed);
        self.status.insert(message.message.id, MessageStatus::Expired);
        trace!(message_id = %message.message.id, "dropped expired message");
    }

    /// Marks a message as delivered.
    pub fn mark_sent(&self, id: MessageId) {
        self.delivered.fetch_add(1, AtomicOrdering::Relaxed);
        self.status.insert(id, MessageStatus::Sent);
    }

    /// Marks a message as dropped by a failed delivery attempt.
    pub fn mark_failed(&self, id: MessageId) {
        self.failed.fetch_add(1, AtomicOrdering::Relaxed);
        self.status.insert(id, MessageStatus::Failed);
    }

    /// Lifecycle state of a message by id.
    #[must_use]
    pub fn status_of(&self, id: MessageId) -> MessageStatus {
        self.status
            .get(&id)
            .map_or(MessageStatus::Unknown, |entry| *entry.value())
    }

    /// Number of messages currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().expect("queue mutex poisoned").len()
    }

    /// True when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().expect("queue mutex poisoned").is_empty()
    }

    /// Lifetime activity counters.
    #[must_use]
    pub fn statistics(&self) -> QueueStatistics {
        QueueStatistics {
            enqueued: self.enqueued.load(AtomicOrdering::Relaxed),
            delivered: self.delivered.load(AtomicOrdering::Relaxed),
            failed: self.failed.load(AtomicOrdering::Relaxed),
            expired: self.expired.load(AtomicOrdering::Relaxed),
            pending: self.len(),
        }
    }

    /// Health derived from the failure and expiration ratios.
    ///
    /// Healthy iff `failed/enqueued < 0.10` and `expired/enqueued < 0.20`;
    /// a queue that has never accepted a message is healthy.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn health(&self) -> HealthStatus {
        let stats = self.statistics();
        if stats.enqueued == 0 {
            return HealthStatus::Healthy;
        }
        let total = stats.enqueued as f64;
        let failed_ratio = stats.failed as f64 / total;
        let expired_ratio = stats.expired as f64 / total;
        if failed_ratio >= FAILED_RATIO_LIMIT {
            return HealthStatus::Degraded {
                reason: format!("failure ratio {failed_ratio:.2} at or above {FAILED_RATIO_LIMIT}"),
            };
        }
        if expired_ratio >= EXPIRED_RATIO_LIMIT {
            return HealthStatus::Degraded {
                reason: format!(
                    "expiration ratio {expired_ratio:.2} at or above {EXPIRED_RATIO_LIMIT}"
                ),
            };
        }
        HealthStatus::Healthy
    }
}
