//! Communication engine
//!
//! Coordinates the communication pipeline using the component decomposition
//! the rest of the crate provides: topology refresh, queue drain, simulated
//! delivery, history recording, and listener fan-out. Collaborators submit
//! agent snapshots and outgoing messages; successful deliveries appear in the
//! bounded history and are pushed to registered listeners.

#![allow(clippy::unused_async)]

use crate::config::{CommsConfig, ConfigError};
use crate::connections::{ConnectionInfo, ConnectionTracker};
use crate::domain_types::{
    AgentId, AgentState, IncomingMessage, Message, MessageId, NeighborInformation,
    MessageTimestamp, OutgoingMessage,
};
use crate::history::MessageHistory;
use crate::metrics::{CommsMetrics, MetricsAggregator};
use crate::queue::{MessageQueue, MessageStatus, QueueStatistics};
use crate::router::Router;
use crate::simulator::NetworkSimulator;
use crate::topology::TopologyEngine;
use crate::traits::{HealthStatus, MessageSink};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, debug, error, span, trace, warn};

/// Callback invoked synchronously for every delivery to its agent.
pub type DeliveryListener = Arc<dyn Fn(&IncomingMessage) + Send + Sync>;

/// Lifetime delivery counters of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Messages drained from the queue.
    pub processed: u64,
    /// Successful deliveries, counting each broadcast recipient.
    pub delivered: u64,
    /// Attempts dropped by link failure or missing positions.
    pub dropped: u64,
}

/// Central coordination hub of the communication core.
///
/// All state is internally synchronized; methods take `&self` and the engine
/// is usually shared behind an `Arc`. A typical deployment runs one
/// simulation-tick task calling [`CommsEngine::update_topology`] and
/// [`CommsEngine::process_messages`] while producers submit messages and
/// readers query neighbors, connections, and metrics concurrently.
pub struct CommsEngine {
    config: CommsConfig,
    simulator: Arc<NetworkSimulator>,
    topology: Arc<TopologyEngine>,
    connections: Arc<ConnectionTracker>,
    queue: Arc<MessageQueue>,
    history: Arc<MessageHistory>,
    listeners: DashMap<AgentId, DeliveryListener>,
    router: Router,
    metrics: MetricsAggregator,
    processed: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl CommsEngine {
    /// Creates an engine with an entropy-seeded link model.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the configuration fails validation.
    pub fn new(config: CommsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let simulator = Arc::new(NetworkSimulator::new(config.simulator.clone()));
        Ok(Self::assemble(config, simulator))
    }

    /// Creates an engine with a fixed RNG seed for reproducible runs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the configuration fails validation.
    pub fn with_seed(config: CommsConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let simulator = Arc::new(NetworkSimulator::with_seed(config.simulator.clone(), seed));
        Ok(Self::assemble(config, simulator))
    }

    fn assemble(config: CommsConfig, simulator: Arc<NetworkSimulator>) -> Self {
        let connections = Arc::new(ConnectionTracker::new());
        let topology = Arc::new(TopologyEngine::new(
            Arc::clone(&simulator),
            Arc::clone(&connections),
        ));
        let queue = Arc::new(MessageQueue::new());
        let history = Arc::new(MessageHistory::new(config.history_capacity));
        let router = Router::new(Arc::clone(&topology), config.max_route_hops);
        let metrics = MetricsAggregator::new(
            Arc::clone(&queue),
            Arc::clone(&history),
            Arc::clone(&connections),
            config.simulator.failure_rate,
        );
        Self {
            config,
            simulator,
            topology,
            connections,
            queue,
            history,
            listeners: DashMap::new(),
            router,
            metrics,
            processed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    /// Recomputes the topology from a fresh agent snapshot and drops every
    /// cached route.
    pub fn update_topology(&self, agents: &HashMap<AgentId, AgentState>) {
        self.topology.update(agents);
        self.router.invalidate_cache();
    }

    /// Wraps and submits a message; `AgentId::broadcast()` as the receiver
    /// fans out to the sender's communicating neighbors at delivery time.
    ///
    /// Returns whether the message was accepted into the pending queue.
    pub async fn send_message(
        &self,
        sender: AgentId,
        receiver: AgentId,
        message: Message,
    ) -> bool {
        let outgoing =
            OutgoingMessage::new(sender, receiver, message, self.config.max_route_hops);
        self.submit(outgoing).await
    }

    /// Drains the queue, attempting delivery for every pending message.
    ///
    /// Returns the number of messages processed. Never blocks on I/O; the
    /// loop ends when the queue is empty.
    pub async fn process_messages(&self) -> usize {
        let process_span = span!(Level::DEBUG, "process_messages");
        let _enter = process_span.enter();

        let mut count = 0;
        while let Some(outgoing) = self.queue.dequeue() {
            self.dispatch(&outgoing);
            count += 1;
        }
        debug!(count, "queue drained");
        count
    }

    /// Processes at most `limit` pending messages.
    ///
    /// Returns the number of messages processed.
    pub async fn process_up_to(&self, limit: usize) -> usize {
        let mut count = 0;
        while count < limit {
            let Some(outgoing) = self.queue.dequeue() else {
                break;
            };
            self.dispatch(&outgoing);
            count += 1;
        }
        count
    }

    fn dispatch(&self, outgoing: &OutgoingMessage) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if outgoing.receiver.is_broadcast() {
            self.fan_out(outgoing);
        } else {
            let delivered = self.attempt_direct(outgoing, &[]);
            self.settle(outgoing.message.id, delivered);
        }
    }

    /// One-hop broadcast: every communicating neighbor of the sender gets a
    /// synthesized direct message with a decremented hop budget. Neighbors do
    /// not re-broadcast; flooding is the caller's responsibility.
    fn fan_out(&self, outgoing: &OutgoingMessage) {
        let Some(info) = self.topology.neighbors(outgoing.sender) else {
            trace!(sender = %outgoing.sender, "broadcast from unknown agent dropped");
            self.settle(outgoing.message.id, false);
            return;
        };

        let mut any_delivered = false;
        for neighbor in info.communicating_neighbors() {
            let relay = outgoing.relay_to(neighbor);
            any_delivered |= self.attempt_direct(&relay, &[]);
        }
        self.settle(outgoing.message.id, any_delivered);
    }

    /// Attempts one direct delivery, recording history, connection stats, and
    /// listener fan-out on success. Missing positions drop silently.
    fn attempt_direct(&self, outgoing: &OutgoingMessage, route_path: &[AgentId]) -> bool {
        let (Some(sender_position), Some(receiver_position)) = (
            self.topology.position_of(outgoing.sender),
            self.topology.position_of(outgoing.receiver),
        ) else {
            trace!(
                sender = %outgoing.sender,
                receiver = %outgoing.receiver,
                "delivery skipped: unknown position"
            );
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let distance = sender_position.distance_to(receiver_position);
        let outcome = self.simulator.simulate_delivery(distance);
        if !outcome.delivered {
            debug!(
                sender = %outgoing.sender,
                receiver = %outgoing.receiver,
                distance,
                signal = outcome.signal_strength.as_f64(),
                "delivery attempt failed"
            );
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let delivered_at = MessageTimestamp::now().saturating_add_millis(outcome.delay_ms);
        let incoming = IncomingMessage {
            receiver: outgoing.receiver,
            original_sender: outgoing.sender,
            message: Arc::clone(&outgoing.message),
            route_path: route_path.to_vec(),
            signal_strength: outcome.signal_strength,
            delivered_at,
            transmission_delay_ms: delivered_at.millis_since(outgoing.message.created_at),
        };

        self.history.record(incoming.clone());
        self.connections.record_delivery(
            outgoing.sender,
            outgoing.receiver,
            outcome.delay_ms,
            delivered_at,
        );
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.notify_listener(&incoming);
        true
    }

    fn settle(&self, id: MessageId, delivered: bool) {
        if delivered {
            self.queue.mark_sent(id);
        } else {
            self.queue.mark_failed(id);
        }
    }

    fn notify_listener(&self, incoming: &IncomingMessage) {
        let Some(listener) = self
            .listeners
            .get(&incoming.receiver)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        // A panicking listener must not disturb other agents' deliveries.
        if catch_unwind(AssertUnwindSafe(|| listener(incoming))).is_err() {
            error!(agent = %incoming.receiver, "message listener panicked");
        }
    }

    /// Registers the delivery listener for an agent; the last registration
    /// wins.
    pub fn register_listener(
        &self,
        agent: AgentId,
        listener: impl Fn(&IncomingMessage) + Send + Sync + 'static,
    ) {
        self.listeners.insert(agent, Arc::new(listener));
    }

    /// Removes an agent's delivery listener, if any.
    pub fn unregister_listener(&self, agent: AgentId) {
        self.listeners.remove(&agent);
    }

    /// This agent's neighbor view, if known.
    #[must_use]
    pub fn neighbors(&self, agent: AgentId) -> Option<NeighborInformation> {
        self.topology.neighbors(agent)
    }

    /// Every agent pair currently in range.
    #[must_use]
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.connections.active_connections()
    }

    /// Copy of the delivery history, oldest first.
    #[must_use]
    pub fn history_snapshot(&self) -> Vec<IncomingMessage> {
        self.history.snapshot()
    }

    /// Copy of the deliveries addressed to one agent, oldest first.
    #[must_use]
    pub fn history_for_agent(&self, agent: AgentId) -> Vec<IncomingMessage> {
        self.history.for_agent(agent)
    }

    /// Lifecycle state of a submitted message.
    #[must_use]
    pub fn message_status(&self, id: MessageId) -> MessageStatus {
        self.queue.status_of(id)
    }

    /// Lifetime queue counters.
    #[must_use]
    pub fn queue_statistics(&self) -> QueueStatistics {
        self.queue.statistics()
    }

    /// Number of messages currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Evicts every expired pending message, returning the removed count.
    #[must_use]
    pub fn clear_expired(&self) -> usize {
        self.queue.clear_expired()
    }

    /// Shortest path to `to` as ordered intermediate relays; see
    /// [`Router::find_route`].
    #[must_use]
    pub fn find_route(&self, from: AgentId, to: AgentId) -> Option<Vec<AgentId>> {
        self.router.find_route(from, to)
    }

    /// Agents reachable from `source` within `max_hops` traversals.
    #[must_use]
    pub fn reachable_agents(&self, source: AgentId, max_hops: usize) -> HashSet<AgentId> {
        self.router.reachable_agents(source, max_hops)
    }

    /// Connectivity partitions over the known agents.
    #[must_use]
    pub fn network_partitions(&self) -> Vec<HashSet<AgentId>> {
        self.router.network_partitions()
    }

    /// The partition containing `agent`, or `None` if unknown.
    #[must_use]
    pub fn partition_for_agent(&self, agent: AgentId) -> Option<HashSet<AgentId>> {
        self.router.partition_for_agent(agent)
    }

    /// Immutable metrics snapshot derived from queue, history, and
    /// connections.
    #[must_use]
    pub fn metrics_snapshot(&self) -> CommsMetrics {
        self.metrics.snapshot()
    }

    /// Lifetime delivery counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            processed: self.processed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Folds queue health with topology emptiness.
    #[must_use]
    pub fn health_check(&self) -> HealthStatus {
        if self.topology.agent_count() == 0 {
            return HealthStatus::Degraded {
                reason: "no agents in topology".to_string(),
            };
        }
        match self.queue.health() {
            HealthStatus::Healthy => HealthStatus::Healthy,
            degraded @ HealthStatus::Degraded { .. } => {
                warn!("queue health degraded");
                degraded
            }
            unhealthy @ HealthStatus::Unhealthy { .. } => unhealthy,
        }
    }
}

#[async_trait]
impl MessageSink for CommsEngine {
    async fn submit(&self, message: OutgoingMessage) -> bool {
        trace!(
            message_id = %message.message.id,
            sender = %message.sender,
            receiver = %message.receiver,
            "message submitted"
        );
        self.queue.enqueue(message)
    }
}
