//! The end-to-end roster analysis.
//!
//! [`analyze`] is a pure function of the dataset, the context and the
//! partitioner: every intermediate (party instances, pair counts, graph,
//! partition) is built here and dropped when the run ends.

use rayon::prelude::*;

use crate::analysis_context::AnalysisContext;
use crate::community::Partitioner;
use crate::data_loader::Dataset;
use crate::filter::filter_communities;
use crate::pairs::{party_cooccurrence, party_instances, teammate_cooccurrence};
use crate::report::{assemble, community_record, roster_report, CommunityRecord, RosterReport};
use crate::roster_graph::RosterGraph;
use crate::roster_stats::{compute_roster_stats, PartyIndex};

/// Sizes of each stage, for the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    pub skipped_records: usize,
    pub party_instances: usize,
    pub graph_players: usize,
    pub graph_connections: usize,
    pub detected_communities: usize,
    pub filtered_communities: usize,
    pub rosters: usize,
    pub detector_degraded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    /// Reported rosters, most matches first.
    pub rosters: Vec<RosterReport>,
    /// Every community that survived the co-occurrence filter.
    pub communities: Vec<CommunityRecord>,
    pub summary: RunSummary,
}

pub fn analyze(dataset: &Dataset, ctx: &AnalysisContext, partitioner: &dyn Partitioner) -> AnalysisOutcome {
    let mut summary = RunSummary {
        records: dataset.records.len(),
        skipped_records: dataset.skipped_records,
        ..RunSummary::default()
    };

    let parties = party_instances(&dataset.records);
    summary.party_instances = parties.len();
    tracing::info!(parties = parties.len(), "Found party instances");

    let party_counts = party_cooccurrence(&parties);
    if party_counts.is_empty() {
        tracing::warn!("No party with two or more players, no rosters can be formed");
        return AnalysisOutcome {
            summary,
            ..AnalysisOutcome::default()
        };
    }
    if dataset.outcomes.decided_count() == 0 {
        tracing::warn!("No match has a recorded winner, no rosters can be rated");
        return AnalysisOutcome {
            summary,
            ..AnalysisOutcome::default()
        };
    }

    let graph = RosterGraph::build(&parties, &party_counts, ctx.min_matches_for_connection);
    summary.graph_players = graph.node_count();
    summary.graph_connections = graph.edge_count();

    if graph.edge_count() == 0 {
        tracing::warn!(
            min_matches_for_connection = ctx.min_matches_for_connection,
            "No pair of players reached the connection threshold"
        );
        return AnalysisOutcome {
            summary,
            ..AnalysisOutcome::default()
        };
    }

    let teammates = teammate_cooccurrence(&dataset.records);

    let partition = partitioner.partition(&graph);
    summary.detected_communities = partition.communities.len();
    summary.detector_degraded = partition.degraded;

    let filtered = filter_communities(&partition.communities, &teammates, ctx);
    summary.filtered_communities = filtered.len();
    tracing::info!(
        detected = partition.communities.len(),
        kept = filtered.len(),
        "Filtered communities by teammate co-occurrence"
    );

    let communities: Vec<CommunityRecord> = filtered
        .iter()
        .enumerate()
        .map(|(ordinal, members)| community_record(ordinal, members, &dataset.players))
        .collect();

    let index = PartyIndex::new(&parties);
    let entries: Vec<_> = filtered
        .par_iter()
        .enumerate()
        .filter(|(_, members)| ctx.roster_size_allowed(members.len()))
        .filter_map(|(ordinal, members)| {
            let stats = compute_roster_stats(members, &parties, &index, &dataset.outcomes, &graph)?;
            if stats.total_matches < ctx.min_team_matches {
                return None;
            }
            Some((ordinal, roster_report(ordinal, members, &stats, &dataset.players)))
        })
        .collect();

    let rosters = assemble(entries);
    summary.rosters = rosters.len();

    if rosters.is_empty() {
        tracing::warn!("No community met the roster thresholds");
    }
    tracing::info!(?summary, "Roster analysis finished");

    AnalysisOutcome {
        rosters,
        communities,
        summary,
    }
}
