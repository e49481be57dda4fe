//! Community detection over the roster graph.
//!
//! Detection sits behind [`Partitioner`] so the pipeline does not care which
//! heuristic produced the communities. [`Louvain`] is the one used in practice:
//!
//! 1. **Local moving**: every node starts alone and is repeatedly moved to the
//!    neighbouring community with the highest weighted modularity gain, until a
//!    full sweep moves nothing.
//! 2. **Aggregation**: communities collapse into super-nodes. Edges between
//!    communities are summed, edges inside a community become a self-loop.
//! 3. Repeat on the coarser graph until a level stops improving modularity.
//!
//! Node visiting order is shuffled, so unseeded runs may split ties differently.
//! Passing a seed makes the partition reproducible.

use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::analysis_context::AnalysisContext;
use crate::data_loader::UserId;
use crate::roster_graph::RosterGraph;

/// Disjoint groups of players covering every node of the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub communities: Vec<BTreeSet<UserId>>,
    /// Set when some level ran out of iterations before it settled.
    pub degraded: bool,
}

pub trait Partitioner {
    fn partition(&self, graph: &RosterGraph) -> Partition;
}

/// Multi-level modularity optimisation (Blondel et al. 2008).
#[derive(Debug, Clone)]
pub struct Louvain {
    resolution: f64,
    max_iter: usize,
    max_levels: usize,
    min_modularity_gain: f64,
    seed: Option<u64>,
}

// Edge list form of one aggregation level
struct Level {
    n: usize,
    edges: Vec<(usize, usize, f64)>,
    self_loops: Vec<f64>,
}

impl Level {
    fn total_weight(&self) -> f64 {
        self.edges.iter().map(|(_, _, w)| w).sum::<f64>() + self.self_loops.iter().sum::<f64>()
    }

    fn degrees(&self) -> Vec<f64> {
        let mut degrees = vec![0.0; self.n];
        for &(i, j, w) in &self.edges {
            degrees[i] += w;
            degrees[j] += w;
        }
        for (i, &sl) in self.self_loops.iter().enumerate() {
            degrees[i] += 2.0 * sl;
        }
        degrees
    }
}

struct Moves {
    communities: Vec<usize>,
    improved: bool,
    capped: bool,
}

impl Louvain {
    pub fn new() -> Self {
        Self {
            resolution: 1.0,
            max_iter: 100,
            max_levels: 10,
            min_modularity_gain: 1e-7,
            seed: None,
        }
    }

    pub fn from_context(ctx: &AnalysisContext) -> Self {
        let louvain = Self::new()
            .with_resolution(ctx.resolution)
            .with_max_iter(ctx.max_iterations)
            .with_max_levels(ctx.max_levels);

        match ctx.detector_seed {
            Some(seed) => louvain.with_seed(seed),
            None => louvain,
        }
    }

    /// Higher values produce smaller communities.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Cap on local-moving sweeps per level.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn modularity(&self, level: &Level, communities: &[usize]) -> f64 {
        let m = level.total_weight();
        if m == 0.0 {
            return 0.0;
        }

        // Community ids are node ids of this level
        let mut internal = vec![0.0; level.n];
        let mut total = vec![0.0; level.n];
        for (i, &sl) in level.self_loops.iter().enumerate() {
            internal[communities[i]] += sl;
        }
        for &(i, j, w) in &level.edges {
            if communities[i] == communities[j] {
                internal[communities[i]] += w;
            }
        }
        for (i, d) in level.degrees().into_iter().enumerate() {
            total[communities[i]] += d;
        }

        internal
            .iter()
            .zip(&total)
            .map(|(inside, tot)| inside / m - self.resolution * (tot / (2.0 * m)).powi(2))
            .sum()
    }

    fn local_moving(&self, level: &Level, rng: &mut StdRng) -> Moves {
        let n = level.n;
        let m = level.total_weight();
        if m == 0.0 {
            return Moves {
                communities: (0..n).collect(),
                improved: false,
                capped: false,
            };
        }

        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(i, j, w) in &level.edges {
            adj[i].push((j, w));
            adj[j].push((i, w));
        }

        let degrees = level.degrees();
        let mut communities: Vec<usize> = (0..n).collect();
        let mut community_degrees = degrees.clone();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut any_improved = false;
        let mut capped = true;

        for _ in 0..self.max_iter {
            let mut improved = false;

            for &node in &order {
                let current = communities[node];
                let ki = degrees[node];
                community_degrees[current] -= ki;

                // BTreeMap keeps the scan order independent of hashing
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                links.insert(current, 0.0);
                for &(neighbor, w) in &adj[node] {
                    *links.entry(communities[neighbor]).or_insert(0.0) += w;
                }

                let gain = |community: usize, ki_in: f64| {
                    ki_in / m - self.resolution * community_degrees[community] * ki / (2.0 * m * m)
                };

                let mut best = current;
                let mut best_gain = gain(current, links[&current]);
                for (&community, &ki_in) in &links {
                    let g = gain(community, ki_in);
                    if g > best_gain + 1e-12 {
                        best = community;
                        best_gain = g;
                    }
                }

                communities[node] = best;
                community_degrees[best] += ki;
                if best != current {
                    improved = true;
                    any_improved = true;
                }
            }

            if !improved {
                capped = false;
                break;
            }
        }

        Moves {
            communities,
            improved: any_improved,
            capped,
        }
    }

    /// Collapses communities into nodes. Returns the coarse level and, per coarse
    /// node, the finer nodes it holds.
    fn aggregate(level: &Level, communities: &[usize]) -> (Level, Vec<Vec<usize>>) {
        let mut unique: Vec<usize> = communities.to_vec();
        unique.sort_unstable();
        unique.dedup();
        let renumber: HashMap<usize, usize> = unique.iter().enumerate().map(|(new, &old)| (old, new)).collect();
        let n_new = unique.len();

        let mut members = vec![Vec::new(); n_new];
        for (node, c) in communities.iter().enumerate() {
            members[renumber[c]].push(node);
        }

        let mut self_loops = vec![0.0; n_new];
        for (node, &sl) in level.self_loops.iter().enumerate() {
            self_loops[renumber[&communities[node]]] += sl;
        }

        let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(i, j, w) in &level.edges {
            let (ci, cj) = (renumber[&communities[i]], renumber[&communities[j]]);
            if ci == cj {
                self_loops[ci] += w;
            } else {
                *between.entry((ci.min(cj), ci.max(cj))).or_insert(0.0) += w;
            }
        }

        let coarse = Level {
            n: n_new,
            edges: between.into_iter().map(|((i, j), w)| (i, j, w)).collect(),
            self_loops,
        };
        (coarse, members)
    }
}

impl Default for Louvain {
    fn default() -> Self {
        Self::new()
    }
}

impl Partitioner for Louvain {
    fn partition(&self, graph: &RosterGraph) -> Partition {
        if graph.is_empty() {
            return Partition::default();
        }
        let n = graph.node_count();

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut level = Level {
            n,
            edges: graph
                .inner()
                .edge_references()
                .map(|e| (e.source().index(), e.target().index(), f64::from(*e.weight())))
                .collect(),
            self_loops: vec![0.0; n],
        };

        // membership[original node] = node at the current level
        let mut membership: Vec<usize> = (0..n).collect();
        let mut prev_modularity = f64::NEG_INFINITY;
        let mut degraded = false;

        for depth in 0..self.max_levels {
            let moves = self.local_moving(&level, &mut rng);
            if moves.capped {
                tracing::warn!(
                    level = depth,
                    max_iterations = self.max_iter,
                    "Community detection hit its iteration cap, keeping the partition found so far"
                );
                degraded = true;
            }
            if !moves.improved {
                break;
            }

            let q = self.modularity(&level, &moves.communities);
            if q - prev_modularity < self.min_modularity_gain {
                break;
            }
            prev_modularity = q;

            let (coarse, members) = Self::aggregate(&level, &moves.communities);
            let mut coarse_of = vec![0; level.n];
            for (coarse_node, fine_nodes) in members.iter().enumerate() {
                for &fine in fine_nodes {
                    coarse_of[fine] = coarse_node;
                }
            }
            for slot in membership.iter_mut() {
                *slot = coarse_of[*slot];
            }

            let settled = coarse.n == level.n;
            level = coarse;
            if settled {
                break;
            }
        }

        let mut grouped: BTreeMap<usize, BTreeSet<UserId>> = BTreeMap::new();
        for (node, &community) in membership.iter().enumerate() {
            grouped
                .entry(community)
                .or_default()
                .insert(graph.user_at(petgraph::graph::NodeIndex::new(node)));
        }

        let mut communities: Vec<BTreeSet<UserId>> = grouped.into_values().collect();
        communities.sort();

        tracing::info!(communities = communities.len(), degraded, "Detected communities");
        Partition { communities, degraded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::tests::record;
    use crate::pairs::{party_cooccurrence, party_instances};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    // Parties of `members` repeated `times` times, starting at match `first_match`
    fn repeated_party(members: &[UserId], times: u64, first_match: u64, party: u64) -> Vec<crate::data_loader::ParticipationRecord> {
        (first_match..first_match + times)
            .flat_map(|m| members.iter().map(move |&u| record(m, u, 0, Some(party))))
            .collect()
    }

    fn graph(records: &[crate::data_loader::ParticipationRecord]) -> RosterGraph {
        let parties = party_instances(records);
        RosterGraph::build(&parties, &party_cooccurrence(&parties), 5)
    }

    #[test]
    fn dense_group_is_one_community() {
        let g = graph(&repeated_party(&[1, 2, 3, 4], 6, 0, 1));

        let partition = Louvain::new().with_seed(7).partition(&g);

        assert_eq!(partition.communities, vec![BTreeSet::from([1, 2, 3, 4])]);
        assert!(!partition.degraded);
    }

    #[test]
    fn separates_two_groups_joined_by_a_weak_bridge() {
        let mut records = repeated_party(&[1, 2, 3], 20, 0, 1);
        records.extend(repeated_party(&[4, 5, 6], 20, 100, 2));
        records.extend(repeated_party(&[3, 4], 5, 200, 3));

        let partition = Louvain::new().with_seed(1).partition(&graph(&records));

        assert_eq!(
            partition.communities,
            vec![BTreeSet::from([1, 2, 3]), BTreeSet::from([4, 5, 6])]
        );
    }

    #[test]
    fn pairs_that_also_play_as_four_end_up_together() {
        // 1-2 and 3-4 are the strongest links, but all four belong together
        let mut records = repeated_party(&[1, 2, 3, 4], 6, 0, 1);
        records.extend(repeated_party(&[1, 2], 3, 100, 2));
        records.extend(repeated_party(&[3, 4], 3, 200, 3));

        for seed in 0..5 {
            let partition = Louvain::new().with_seed(seed).partition(&graph(&records));
            assert_eq!(partition.communities, vec![BTreeSet::from([1, 2, 3, 4])]);
        }
    }

    #[test]
    fn isolated_players_stay_alone() {
        let mut records = repeated_party(&[1, 2], 6, 0, 1);
        // Only one shared party, below the connection threshold
        records.extend(repeated_party(&[8, 9], 1, 50, 2));

        let partition = Louvain::new().with_seed(3).partition(&graph(&records));

        assert_eq!(
            partition.communities,
            vec![BTreeSet::from([1, 2]), BTreeSet::from([8]), BTreeSet::from([9])]
        );
    }

    #[test]
    fn empty_graph_has_no_communities() {
        let partition = Louvain::new().partition(&RosterGraph::default());
        assert!(partition.communities.is_empty());
    }

    #[test]
    fn seeded_runs_agree() {
        let mut records = repeated_party(&[1, 2, 3], 9, 0, 1);
        records.extend(repeated_party(&[3, 4, 5], 9, 100, 2));
        records.extend(repeated_party(&[5, 6, 1], 9, 200, 3));
        let g = graph(&records);

        let first = Louvain::new().with_seed(42).partition(&g);
        let second = Louvain::new().with_seed(42).partition(&g);

        assert_eq!(first, second);
    }

    #[test]
    #[traced_test]
    fn iteration_cap_is_reported_not_fatal() {
        let mut records = repeated_party(&[1, 2, 3], 20, 0, 1);
        records.extend(repeated_party(&[4, 5, 6], 20, 100, 2));

        let partition = Louvain::new().with_seed(5).with_max_iter(1).partition(&graph(&records));

        // A single sweep still moves nodes, so it cannot confirm convergence
        assert!(partition.degraded);
        let covered: usize = partition.communities.iter().map(BTreeSet::len).sum();
        assert_eq!(covered, 6);
        assert!(logs_contain("iteration cap"));
    }
}
