//! Domain types for the swarmlink communication core
//!
//! This module defines strongly-typed domain values to prevent primitive
//! obsession and improve type safety throughout the codebase. Envelope types
//! (`Message`, `OutgoingMessage`, `IncomingMessage`) and the read-only agent
//! inputs consumed from collaborators live here as well.

use bytes::Bytes;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Signal level below which a link is unusable for delivery.
pub const COMMUNICATION_SIGNAL_FLOOR: f64 = 0.3;

/// Unique, stable identifier for an agent.
///
/// Agent ids are assigned by the collaborator that owns agent lifecycles.
/// The value `-1` is reserved as the broadcast sentinel.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct AgentId(i64);

impl AgentId {
    /// The broadcast sentinel: messages addressed here fan out to the
    /// sender's communicating neighbors.
    #[must_use]
    pub fn broadcast() -> Self {
        Self::new(-1)
    }

    /// Returns true when this id is the broadcast sentinel.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.into_inner() == -1
    }

    /// Gets the value as i64
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.into_inner()
    }
}

/// Unique identifier for a message
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Absolute timestamp in milliseconds since the Unix epoch.
#[nutype(
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        From,
        Into
    ),
    default = 0
)]
pub struct MessageTimestamp(u64);

impl MessageTimestamp {
    /// Creates a timestamp for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self::new(millis)
    }

    /// Gets the value as milliseconds since the epoch
    #[must_use]
    pub fn as_millis(&self) -> u64 {
        self.into_inner()
    }

    /// Returns this timestamp advanced by `millis`, saturating on overflow.
    #[must_use]
    pub fn saturating_add_millis(&self, millis: u64) -> Self {
        Self::new(self.into_inner().saturating_add(millis))
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub fn millis_since(&self, earlier: Self) -> u64 {
        self.into_inner().saturating_sub(earlier.into_inner())
    }
}

/// Message priority: 1 (highest) through 5 (lowest).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 5),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 3
)]
pub struct Priority(u8);

impl Priority {
    /// Gets the value as u8
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.into_inner()
    }
}

/// Link quality in `[0.0, 1.0]`.
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 0.0
)]
pub struct SignalStrength(f64);

impl SignalStrength {
    /// A dead link.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a signal strength from a raw model output, clamping into range.
    ///
    /// Non-finite inputs collapse to zero.
    ///
    /// # Panics
    ///
    /// Panics if a clamped finite value fails validation, which cannot happen.
    #[must_use]
    pub fn clamped(raw: f64) -> Self {
        let value = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self::try_new(value).expect("clamped value is within range")
    }

    /// Gets the value as f64
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }

    /// True when the level is usable for delivery (at or above the floor).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.into_inner() >= COMMUNICATION_SIGNAL_FLOOR
    }
}

/// Maximum communication distance of an agent, in world units.
#[nutype(
    validate(greater = 0.0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        PartialOrd,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 100.0
)]
pub struct CommunicationRange(f64);

impl CommunicationRange {
    /// Gets the value as f64
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Remaining relay budget of a message.
#[nutype(
    validate(less_or_equal = 32),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 5
)]
pub struct MaxHops(u8);

impl MaxHops {
    /// Gets the value as u8
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.into_inner()
    }

    /// Returns the budget reduced by one hop, saturating at zero.
    ///
    /// # Panics
    ///
    /// Panics if the decremented value fails validation, which cannot happen.
    #[must_use]
    pub fn decremented(&self) -> Self {
        Self::try_new(self.into_inner().saturating_sub(1))
            .expect("decremented hop budget stays in range")
    }
}

/// Bounded capacity of the delivered-message history.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct HistoryCapacity(usize);

impl HistoryCapacity {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum retry attempts for failed submissions.
#[nutype(
    validate(less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 3
)]
pub struct MaxRetries(u8);

impl MaxRetries {
    /// Gets the value as u8
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.into_inner()
    }
}

/// Base delay of the retry backoff schedule, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10
)]
pub struct RetryBackoffMs(u64);

impl RetryBackoffMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// A point in the 2-D simulation plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate in world units.
    pub x: f64,
    /// Vertical coordinate in world units.
    pub y: f64,
}

impl Position {
    /// Creates a position from coordinates.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance_to(&self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// Coarse liveness state reported by the agent's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentStatus {
    /// The agent is moving and participating normally.
    #[default]
    Active,
    /// The agent is stationary or temporarily passive.
    Idle,
    /// Contact with the agent has been lost.
    Lost,
}

/// Read-only agent input supplied by collaborators on every simulation frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Stable agent identifier.
    pub id: AgentId,
    /// Last known position, if any.
    pub position: Option<Position>,
    /// Per-agent range override; the simulator's maximum range applies when
    /// absent.
    pub communication_range: Option<CommunicationRange>,
    /// Owner-reported liveness.
    pub status: AgentStatus,
    /// When the owner last refreshed this state.
    pub last_update: MessageTimestamp,
}

impl AgentState {
    /// Creates an active agent state at a known position.
    #[must_use]
    pub fn new(id: AgentId, position: Position) -> Self {
        Self {
            id,
            position: Some(position),
            communication_range: None,
            status: AgentStatus::Active,
            last_update: MessageTimestamp::now(),
        }
    }

    /// Sets a per-agent communication range.
    #[must_use]
    pub fn with_range(mut self, range: CommunicationRange) -> Self {
        self.communication_range = Some(range);
        self
    }

    /// Sets the owner-reported status.
    #[must_use]
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
}

/// Semantic category of a message; payload interpretation is up to the
/// collaborators exchanging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Periodic position telemetry.
    PositionUpdate,
    /// Opens a consensus round.
    VoteProposal,
    /// Answers a consensus round.
    VoteResponse,
    /// Assigns work to an agent.
    TaskAssignment,
    /// Orders a formation change.
    FormationCommand,
    /// High-priority distress traffic.
    EmergencyAlert,
    /// General health/status traffic.
    StatusUpdate,
    /// Confirms receipt of an earlier message.
    Acknowledgment,
}

/// Recognized metadata attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Queue priority; defaults to 3.
    pub priority: Priority,
    /// Time-to-live in milliseconds from creation, if any.
    pub ttl_ms: Option<u64>,
}

impl MessageMetadata {
    /// Creates metadata with an explicit priority and no TTL.
    #[must_use]
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ttl_ms: None,
        }
    }

    /// Sets the time-to-live in milliseconds.
    #[must_use]
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }
}

/// Immutable message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique id.
    pub id: MessageId,
    /// Semantic category.
    pub message_type: MessageType,
    /// Opaque payload; the core never inspects it.
    pub payload: Bytes,
    /// Creation time.
    pub created_at: MessageTimestamp,
    /// Recognized metadata.
    pub metadata: MessageMetadata,
}

impl Message {
    /// Creates a message stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(message_type: MessageType, payload: Bytes, metadata: MessageMetadata) -> Self {
        Self {
            id: MessageId::generate(),
            message_type,
            payload,
            created_at: MessageTimestamp::now(),
            metadata,
        }
    }
}

/// A submitted message awaiting delivery.
///
/// Immutable after creation; droppable exactly when the current time has
/// reached `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Originating agent.
    pub sender: AgentId,
    /// Destination agent, or the broadcast sentinel.
    pub receiver: AgentId,
    /// Shared envelope.
    pub message: Arc<Message>,
    /// Queue priority, copied from the envelope metadata.
    pub priority: Priority,
    /// Remaining relay budget.
    pub max_hops: MaxHops,
    /// Absolute expiration time, derived from the envelope TTL.
    pub expires_at: Option<MessageTimestamp>,
}

impl OutgoingMessage {
    /// Wraps a message for submission, deriving priority and expiration from
    /// its metadata.
    #[must_use]
    pub fn new(sender: AgentId, receiver: AgentId, message: Message, max_hops: MaxHops) -> Self {
        let message = Arc::new(message);
        let priority = message.metadata.priority;
        let expires_at = message
            .metadata
            .ttl_ms
            .map(|ttl| message.created_at.saturating_add_millis(ttl));
        Self {
            sender,
            receiver,
            message,
            priority,
            max_hops,
            expires_at,
        }
    }

    /// True when the message may be dropped at `now`.
    #[must_use]
    pub fn is_expired(&self, now: MessageTimestamp) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Synthesizes the per-neighbor direct message used by broadcast fan-out:
    /// same envelope and priority, one hop less budget.
    #[must_use]
    pub fn relay_to(&self, receiver: AgentId) -> Self {
        Self {
            sender: self.sender,
            receiver,
            message: Arc::clone(&self.message),
            priority: self.priority,
            max_hops: self.max_hops.decremented(),
            expires_at: self.expires_at,
        }
    }
}

/// A message that reached its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Receiving agent.
    pub receiver: AgentId,
    /// Agent that originated the message.
    pub original_sender: AgentId,
    /// Shared envelope.
    pub message: Arc<Message>,
    /// Ordered relay ids; empty for a direct delivery.
    pub route_path: Vec<AgentId>,
    /// Link quality observed at delivery time.
    pub signal_strength: SignalStrength,
    /// When the message arrived.
    pub delivered_at: MessageTimestamp,
    /// `delivered_at - message.created_at`, in milliseconds.
    pub transmission_delay_ms: u64,
}

/// One neighbor as seen from a specific agent's side of the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborAgent {
    /// The neighbor's id.
    pub id: AgentId,
    /// Distance between the two agents at topology time.
    pub distance: f64,
    /// Signal strength computed from the owning agent's side.
    pub signal_strength: SignalStrength,
    /// True when the link is usable: in range and at or above the signal
    /// floor.
    pub can_communicate: bool,
    /// When the owning agent last saw this neighbor.
    pub last_contact: MessageTimestamp,
}

/// Per-agent view of the current topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborInformation {
    /// The agent owning this view.
    pub agent_id: AgentId,
    /// Every other agent within this agent's range.
    pub neighbors: Vec<NeighborAgent>,
    /// When this entry was computed.
    pub updated_at: MessageTimestamp,
}

impl NeighborInformation {
    /// Creates a topology entry.
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        neighbors: Vec<NeighborAgent>,
        updated_at: MessageTimestamp,
    ) -> Self {
        Self {
            agent_id,
            neighbors,
            updated_at,
        }
    }

    /// Number of in-range neighbors.
    #[must_use]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Mean signal strength across neighbors, zero when isolated.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_signal_strength(&self) -> f64 {
        if self.neighbors.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .neighbors
            .iter()
            .map(|n| n.signal_strength.as_f64())
            .sum();
        total / self.neighbors.len() as f64
    }

    /// Composite quality score: `min(1, count/8) * average_signal`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn network_quality(&self) -> f64 {
        let density = (self.neighbors.len() as f64 / 8.0).min(1.0);
        density * self.average_signal_strength()
    }

    /// Ids of neighbors this agent can actually deliver to.
    #[must_use]
    pub fn communicating_neighbors(&self) -> Vec<AgentId> {
        self.neighbors
            .iter()
            .filter(|n| n.can_communicate)
            .map(|n| n.id)
            .collect()
    }
}
