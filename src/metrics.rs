//! Read-only derived metrics
//!
//! Computes throughput, latency, and backlog figures from state the other
//! components already maintain. Snapshots are immutable and timestamped;
//! taking one never mutates anything.

use crate::connections::ConnectionTracker;
use crate::domain_types::MessageTimestamp;
use crate::history::MessageHistory;
use crate::queue::MessageQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Width of the throughput window, in milliseconds.
const RATE_WINDOW_MS: u64 = 1_000;

/// Immutable, timestamped view of the communication core's derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsMetrics {
    /// Deliveries recorded over the last second.
    pub messages_per_second: f64,
    /// Mean latency over active connections that carried at least one
    /// message, in milliseconds; zero when no connection qualifies.
    pub average_latency_ms: f64,
    /// Messages currently pending in the queue.
    pub pending_messages: usize,
    /// Failure-rate surrogate: the link model's configured base rate.
    pub failure_rate: f64,
    /// When this snapshot was taken.
    pub captured_at: MessageTimestamp,
}

/// Derives [`CommsMetrics`] snapshots from the live components.
pub struct MetricsAggregator {
    queue: Arc<MessageQueue>,
    history: Arc<MessageHistory>,
    connections: Arc<ConnectionTracker>,
    failure_rate: f64,
}

impl MetricsAggregator {
    /// Creates an aggregator over the given components.
    #[must_use]
    pub fn new(
        queue: Arc<MessageQueue>,
        history: Arc<MessageHistory>,
        connections: Arc<ConnectionTracker>,
        failure_rate: f64,
    ) -> Self {
        Self {
            queue,
            history,
            connections,
            failure_rate,
        }
    }

    /// Takes an immutable snapshot of the current derived metrics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> CommsMetrics {
        let captured_at = MessageTimestamp::now();
        let window_start = MessageTimestamp::new(
            captured_at.as_millis().saturating_sub(RATE_WINDOW_MS),
        );
        let recent = self.history.count_delivered_since(window_start);

        CommsMetrics {
            messages_per_second: recent as f64,
            average_latency_ms: self.connections.average_latency_over_active().unwrap_or(0.0),
            pending_messages: self.queue.len(),
            failure_rate: self.failure_rate,
            captured_at,
        }
    }
}
