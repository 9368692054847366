//! # Swarmlink - Communication Core for Swarm Simulation
//!
//! Swarmlink decides which agents of a simulated swarm can exchange messages
//! given their physical positions, simulates imperfect wireless links (range,
//! signal strength, latency, loss), routes individual and broadcast messages,
//! tracks network partitions, and exposes higher-level coordination
//! primitives built on the same pipeline.
//!
//! ## Architecture Overview
//!
//! - [`TopologyEngine`]: recomputes per-agent neighbor views from positions
//! - [`NetworkSimulator`]: probabilistic link model with injectable RNG
//! - [`MessageQueue`]: priority-ordered, expiration-aware pending store
//! - [`CommsEngine`]: drains the queue, simulates delivery, records history,
//!   and fans deliveries out to registered listeners
//! - [`Router`]: BFS path discovery, reachability, and partition detection
//! - [`RetryPolicy`]: bounded retries with exponential backoff
//! - [`VoteCoordinator`]: proposal/response tracking with deadlines
//! - [`MetricsAggregator`]: immutable derived metric snapshots
//!
//! ## Message Flow
//!
//! ```text
//! positions -> TopologyEngine -> neighbor views -> Router
//!                                      |
//! messages  -> MessageQueue -> CommsEngine -> NetworkSimulator
//!                                      |
//!                              history + listeners + connections
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use swarmlink::{
//!     AgentId, AgentState, CommsConfig, CommsEngine, Message, MessageMetadata, MessageType,
//!     Position,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CommsEngine::new(CommsConfig::default())?;
//!
//! let mut agents = HashMap::new();
//! agents.insert(
//!     AgentId::new(1),
//!     AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
//! );
//! agents.insert(
//!     AgentId::new(2),
//!     AgentState::new(AgentId::new(2), Position::new(40.0, 0.0)),
//! );
//! engine.update_topology(&agents);
//!
//! let message = Message::new(
//!     MessageType::PositionUpdate,
//!     bytes::Bytes::from_static(b"x=0,y=0"),
//!     MessageMetadata::default().with_ttl_ms(30_000),
//! );
//! engine.send_message(AgentId::new(1), AgentId::new(2), message).await;
//! engine.process_messages().await;
//!
//! for delivery in engine.history_snapshot() {
//!     println!("{} got a message from {}", delivery.receiver, delivery.original_sender);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All components are safe under concurrent callers: the topology, listener
//! table, and vote registry are concurrent maps with whole-entry replacement,
//! the queue and history are internally synchronized, and no operation ever
//! holds two collection locks at once. Only the retry policy sleeps.

pub mod config;
pub mod connections;
pub mod domain_types;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod router;
pub mod simulator;
pub mod topology;
pub mod traits;
pub mod voting;

pub use config::{CommsConfig, CommsConfigBuilder, ConfigError, SimulatorConfig};
pub use connections::{ConnectionInfo, ConnectionKey, ConnectionTracker};
pub use domain_types::{
    AgentId, AgentState, AgentStatus, COMMUNICATION_SIGNAL_FLOOR, CommunicationRange,
    HistoryCapacity, IncomingMessage, MaxHops, MaxRetries, Message, MessageId, MessageMetadata,
    MessageTimestamp, MessageType, NeighborAgent, NeighborInformation, OutgoingMessage, Position,
    Priority, RetryBackoffMs, SignalStrength,
};
pub use engine::{CommsEngine, DeliveryListener, EngineStats};
pub use history::MessageHistory;
pub use metrics::{CommsMetrics, MetricsAggregator};
pub use queue::{MessageQueue, MessageStatus, QueueStatistics};
pub use retry::RetryPolicy;
pub use router::Router;
pub use simulator::{DeliveryOutcome, NetworkSimulator};
pub use topology::TopologyEngine;
pub use traits::{HealthStatus, MessageSink};
pub use voting::{KEY_DEADLINE, KEY_PROPOSAL_ID, VoteCoordinator, VoteError, VotePayload, VoteResult};
