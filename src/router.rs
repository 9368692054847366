//! Route discovery over the current topology
//!
//! BFS over the directed edge set `{(u, v) : v is a communicating neighbor
//! of u}` with a configured hop cutoff. The router discovers paths; it never
//! forwards messages itself. Results are cached per (source, destination)
//! pair and the whole cache is dropped on every topology update.

use crate::domain_types::{AgentId, MaxHops};
use crate::topology::TopologyEngine;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::trace;

/// Hop-count shortest-path discovery and partition analysis.
pub struct Router {
    topology: Arc<TopologyEngine>,
    max_hops: MaxHops,
    route_cache: DashMap<(AgentId, AgentId), Option<Vec<AgentId>>>,
}

impl Router {
    /// Creates a router over the given topology with a hop cutoff.
    #[must_use]
    pub fn new(topology: Arc<TopologyEngine>, max_hops: MaxHops) -> Self {
        Self {
            topology,
            max_hops,
            route_cache: DashMap::new(),
        }
    }

    /// Finds the shortest path from `from` to `to` within the hop cutoff.
    ///
    /// Returns the ordered intermediate relay ids: an empty list when the
    /// destination is a direct communicating neighbor, `None` when no path
    /// exists within the cutoff. Results are cached until the next topology
    /// update.
    #[must_use]
    pub fn find_route(&self, from: AgentId, to: AgentId) -> Option<Vec<AgentId>> {
        if let Some(cached) = self.route_cache.get(&(from, to)) {
            return cached.clone();
        }
        let route = self.bfs_route(from, to);
        self.route_cache.insert((from, to), route.clone());
        route
    }

    fn bfs_route(&self, from: AgentId, to: AgentId) -> Option<Vec<AgentId>> {
        if from == to {
            return Some(Vec::new());
        }
        if !self.topology.contains(from) || !self.topology.contains(to) {
            return None;
        }

        let cutoff = usize::from(self.max_hops.as_u8());
        let mut parents: HashMap<AgentId, AgentId> = HashMap::new();
        let mut visited: HashSet<AgentId> = HashSet::from([from]);
        let mut frontier = vec![from];
        let mut depth = 0;

        while !frontier.is_empty() && depth < cutoff {
            depth += 1;
            let mut next = Vec::new();
            for u in frontier {
                for v in self.topology.communicating_neighbors(u) {
                    if !visited.insert(v) {
                        continue;
                    }
                    parents.insert(v, u);
                    if v == to {
                        return Some(Self::intermediates(&parents, from, to));
                    }
                    next.push(v);
                }
            }
            frontier = next;
        }
        None
    }

    /// Walks the parent links back from `to`, returning only the relays
    /// strictly between the endpoints, in travel order.
    fn intermediates(parents: &HashMap<AgentId, AgentId>, from: AgentId, to: AgentId) -> Vec<AgentId> {
        let mut path = Vec::new();
        let mut cursor = to;
        while let Some(&parent) = parents.get(&cursor) {
            if parent == from {
                break;
            }
            path.push(parent);
            cursor = parent;
        }
        path.reverse();
        path
    }

    /// Every agent reachable from `source` within `max_hops` link
    /// traversals, including `source` itself.
    #[must_use]
    pub fn reachable_agents(&self, source: AgentId, max_hops: usize) -> HashSet<AgentId> {
        let mut reachable = HashSet::from([source]);
        let mut queue: VecDeque<(AgentId, usize)> = VecDeque::from([(source, 0)]);

        while let Some((agent, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for neighbor in self.topology.communicating_neighbors(agent) {
                if reachable.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        reachable
    }

    /// Splits the known agents into connectivity partitions.
    ///
    /// Every known agent appears in exactly one partition.
    #[must_use]
    pub fn network_partitions(&self) -> Vec<HashSet<AgentId>> {
        let mut visited: HashSet<AgentId> = HashSet::new();
        let mut partitions = Vec::new();
        for id in self.topology.known_agents() {
            if visited.contains(&id) {
                continue;
            }
            let mut partition = self.reachable_agents(id, usize::MAX);
            // Signal noise can make a borderline link usable from one side
            // only; claiming already-assigned agents would break the
            // exactly-one-partition guarantee.
            partition.retain(|agent| !visited.contains(agent));
            visited.extend(partition.iter().copied());
            partitions.push(partition);
        }
        trace!(count = partitions.len(), "computed network partitions");
        partitions
    }

    /// The partition containing `id`, or `None` for an unknown agent.
    #[must_use]
    pub fn partition_for_agent(&self, id: AgentId) -> Option<HashSet<AgentId>> {
        self.topology
            .contains(id)
            .then(|| self.reachable_agents(id, usize::MAX))
    }

    /// Drops every cached route. Called on each topology update.
    pub fn invalidate_cache(&self) {
        self.route_cache.clear();
    }

    /// Number of cached (source, destination) results.
    #[must_use]
    pub fn cached_route_count(&self) -> usize {
        self.route_cache.len()
    }
}
