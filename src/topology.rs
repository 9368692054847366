//! Topology engine
//!
//! Recomputes the neighbor graph from the latest agent snapshot. The update
//! is O(n²) over agents and is expected to run at the simulation tick rate.
//! Entries are replaced whole per agent, so readers may briefly observe a mix
//! of fresh and stale entries during an update; each entry carries its own
//! update timestamp.

use crate::connections::{ConnectionKey, ConnectionTracker};
use crate::domain_types::{
    AgentId, AgentState, MessageTimestamp, NeighborAgent, NeighborInformation, Position,
    SignalStrength,
};
use crate::simulator::NetworkSimulator;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Derives and stores per-agent neighbor views.
///
/// Topology never fails: agents with unknown positions get an empty (not
/// missing) neighbor list, and agents absent from the snapshot are forgotten.
pub struct TopologyEngine {
    simulator: Arc<NetworkSimulator>,
    connections: Arc<ConnectionTracker>,
    entries: DashMap<AgentId, NeighborInformation>,
    agents: DashMap<AgentId, AgentState>,
}

impl TopologyEngine {
    /// Creates an empty topology over the given link model.
    #[must_use]
    pub fn new(simulator: Arc<NetworkSimulator>, connections: Arc<ConnectionTracker>) -> Self {
        Self {
            simulator,
            connections,
            entries: DashMap::new(),
            agents: DashMap::new(),
        }
    }

    /// Recomputes every agent's neighbor view from the snapshot.
    ///
    /// Each ordered pair is evaluated from its owning side with that agent's
    /// effective range, so the two sides of a link may store different signal
    /// values.
    pub fn update(&self, agents: &HashMap<AgentId, AgentState>) {
        let now = MessageTimestamp::now();
        let default_range = self.simulator.config().range;
        let mut live_links: HashMap<ConnectionKey, SignalStrength> =
            HashMap::new();

        for (id, state) in agents {
            let neighbors = match state.position {
                None => Vec::new(),
                Some(position) => {
                    let range = state
                        .communication_range
                        .map_or(default_range, |r| r.as_f64());
                    self.neighbors_of(*id, position, range, agents, now, &mut live_links)
                }
            };
            self.entries
                .insert(*id, NeighborInformation::new(*id, neighbors, now));
            self.agents.insert(*id, state.clone());
        }

        // Forget agents that left the snapshot.
        self.entries.retain(|id, _| agents.contains_key(id));
        self.agents.retain(|id, _| agents.contains_key(id));

        self.connections.sync_links(&live_links, now);
        trace!(agents = agents.len(), links = live_links.len(), "topology updated");
    }

    fn neighbors_of(
        &self,
        id: AgentId,
        position: Position,
        range: f64,
        agents: &HashMap<AgentId, AgentState>,
        now: MessageTimestamp,
        live_links: &mut HashMap<ConnectionKey, SignalStrength>,
    ) -> Vec<NeighborAgent> {
        let mut neighbors = Vec::new();
        for (other_id, other) in agents {
            if *other_id == id {
                continue;
            }
            let Some(other_position) = other.position else {
                continue;
            };
            let distance = position.distance_to(other_position);
            if !self.simulator.can_communicate(distance, range) {
                continue;
            }
            let signal_strength = self.simulator.signal_strength(distance, range);
            live_links.insert(ConnectionKey::new(id, *other_id), signal_strength);
            neighbors.push(NeighborAgent {
                id: *other_id,
                distance,
                signal_strength,
                can_communicate: signal_strength.is_usable(),
                last_contact: now,
            });
        }
        neighbors
    }

    /// This agent's neighbor view, if the agent is known.
    #[must_use]
    pub fn neighbors(&self, id: AgentId) -> Option<NeighborInformation> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Ids of neighbors `id` can deliver to right now.
    #[must_use]
    pub fn communicating_neighbors(&self, id: AgentId) -> Vec<AgentId> {
        self.entries
            .get(&id)
            .map(|entry| entry.communicating_neighbors())
            .unwrap_or_default()
    }

    /// Every agent id present in the current topology, in ascending order.
    #[must_use]
    pub fn known_agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Whether the agent appeared in the latest snapshot.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Last known position of an agent, if any.
    #[must_use]
    pub fn position_of(&self, id: AgentId) -> Option<Position> {
        self.agents.get(&id).and_then(|state| state.position)
    }

    /// Number of agents in the current topology.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.entries.len()
    }
}
