//! Pairwise connection bookkeeping
//!
//! Tracks one record per unordered agent pair: link strength and liveness
//! from topology refreshes, message counts and a rolling latency average from
//! successful deliveries. The metrics aggregator reads this table.

use crate::domain_types::{AgentId, MessageTimestamp, SignalStrength};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical identity of an unordered agent pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    /// The smaller agent id of the pair.
    pub a: AgentId,
    /// The larger agent id of the pair.
    pub b: AgentId,
}

impl ConnectionKey {
    /// Builds the canonical key for a pair, regardless of argument order.
    #[must_use]
    pub fn new(x: AgentId, y: AgentId) -> Self {
        if x.as_i64() <= y.as_i64() {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Observed state of one agent pair's link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The pair this record describes.
    pub key: ConnectionKey,
    /// Most recent signal strength from a topology refresh.
    pub strength: SignalStrength,
    /// Whether the pair was in range at the latest refresh.
    pub is_active: bool,
    /// When the pair first came into range.
    pub established_at: MessageTimestamp,
    /// When a message last crossed this link, if ever.
    pub last_message_at: Option<MessageTimestamp>,
    /// Messages delivered across this link so far.
    pub message_count: u64,
    /// Rolling mean delivery latency in milliseconds.
    pub average_latency_ms: f64,
}

impl ConnectionInfo {
    fn established(key: ConnectionKey, strength: SignalStrength, now: MessageTimestamp) -> Self {
        Self {
            key,
            strength,
            is_active: true,
            established_at: now,
            last_message_at: None,
            message_count: 0,
            average_latency_ms: 0.0,
        }
    }
}

/// Thread-safe table of per-pair connection records.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: DashMap<ConnectionKey, ConnectionInfo>,
}

impl ConnectionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the table with the links present in the latest topology:
    /// live pairs are upserted with their current strength, everything else
    /// is deactivated (history and counters are preserved).
    pub fn sync_links(&self, live: &HashMap<ConnectionKey, SignalStrength>, now: MessageTimestamp) {
        for (key, strength) in live {
            self.connections
                .entry(*key)
                .and_modify(|info| {
                    info.strength = *strength;
                    info.is_active = true;
                })
                .or_insert_with(|| ConnectionInfo::established(*key, *strength, now));
        }
        for mut entry in self.connections.iter_mut() {
            if !live.contains_key(entry.key()) {
                entry.is_active = false;
            }
        }
    }

    /// Records a successful delivery across the pair's link.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_delivery(
        &self,
        from: AgentId,
        to: AgentId,
        latency_ms: u64,
        delivered_at: MessageTimestamp,
    ) {
        let key = ConnectionKey::new(from, to);
        let mut info = self
            .connections
            .entry(key)
            .or_insert_with(|| ConnectionInfo::established(key, SignalStrength::zero(), delivered_at));
        info.message_count += 1;
        info.last_message_at = Some(delivered_at);
        let count = info.message_count as f64;
        info.average_latency_ms += (latency_ms as f64 - info.average_latency_ms) / count;
    }

    /// Snapshot of every pair currently in range.
    #[must_use]
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .filter(|entry| entry.is_active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Looks up one pair's record.
    #[must_use]
    pub fn get(&self, x: AgentId, y: AgentId) -> Option<ConnectionInfo> {
        self.connections
            .get(&ConnectionKey::new(x, y))
            .map(|entry| entry.value().clone())
    }

    /// Mean of the per-connection latency averages over active pairs that
    /// have carried at least one message. `None` when no pair qualifies.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_over_active(&self) -> Option<f64> {
        let mut total = 0.0;
        let mut counted = 0u64;
        for entry in &self.connections {
            if entry.is_active && entry.message_count > 0 {
                total += entry.average_latency_ms;
                counted += 1;
            }
        }
        (counted > 0).then(|| total / counted as f64)
    }

    /// Number of tracked pairs, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True when no pair has ever been tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
