use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap};

use crate::data_loader::UserId;
use crate::pairs::{PairCounts, PartyInstance};

/// Players who queued together, weighted by how many parties they shared.
///
/// Nodes are every player seen in a party of two or more. Edges only exist for
/// pairs that reached the connection threshold, so some nodes may be isolated.
#[derive(Debug, Clone, Default)]
pub struct RosterGraph {
    graph: UnGraph<UserId, u32>,
    index: HashMap<UserId, NodeIndex>,
}

impl RosterGraph {
    pub fn build(parties: &[PartyInstance], party_counts: &PairCounts, min_matches_for_connection: u32) -> Self {
        let mut roster_graph = Self::default();

        // Sorted so node indices do not depend on hash order
        let players: BTreeSet<UserId> = parties
            .iter()
            .filter(|p| p.size() > 1)
            .flat_map(|p| p.players.iter().copied())
            .collect();
        for user_id in players {
            roster_graph.add_player(user_id);
        }

        let mut edges: Vec<_> = party_counts
            .iter()
            .filter(|(_, weight)| *weight >= min_matches_for_connection)
            .collect();
        edges.sort_unstable();

        for (pair, weight) in edges {
            let a = roster_graph.add_player(pair.first());
            let b = roster_graph.add_player(pair.second());
            roster_graph.graph.add_edge(a, b, weight);
        }

        tracing::info!(
            players = roster_graph.node_count(),
            connections = roster_graph.edge_count(),
            "Roster network built"
        );

        roster_graph
    }

    fn add_player(&mut self, user_id: UserId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&user_id) {
            return idx;
        }
        let idx = self.graph.add_node(user_id);
        self.index.insert(user_id, idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn inner(&self) -> &UnGraph<UserId, u32> {
        &self.graph
    }

    pub fn user_at(&self, idx: NodeIndex) -> UserId {
        self.graph[idx]
    }

    pub fn weight(&self, a: UserId, b: UserId) -> Option<u32> {
        let (a, b) = (*self.index.get(&a)?, *self.index.get(&b)?);
        self.graph.find_edge(a, b).map(|e| self.graph[e])
    }

    /// Average edge weight among `members`, 0.0 if none of them are connected.
    pub fn average_internal_weight(&self, members: &BTreeSet<UserId>) -> f64 {
        let mut total = 0u64;
        let mut count = 0u64;

        for member in members {
            let Some(&idx) = self.index.get(member) else { continue };
            for e in self.graph.edges(idx) {
                let other = if e.source() == idx { e.target() } else { e.source() };
                // Each internal edge is seen from both ends, count it from the smaller id
                if self.graph[idx] < self.graph[other] && members.contains(&self.graph[other]) {
                    total += u64::from(*e.weight());
                    count += 1;
                }
            }
        }

        if count == 0 {
            return 0.0;
        }
        total as f64 / count as f64
    }
}
