use std::collections::BTreeSet;

use crate::analysis_context::{AnalysisContext, FilterMode};
use crate::data_loader::UserId;
use crate::pairs::PairCounts;

// Players in `community` that have not been teammates often enough with enough of the others
fn weakly_linked(community: &BTreeSet<UserId>, teammates: &PairCounts, ctx: &AnalysisContext) -> BTreeSet<UserId> {
    let required = ctx.required_links(community.len());

    community
        .iter()
        .copied()
        .filter(|&player| {
            let links = community
                .iter()
                .filter(|&&other| other != player && teammates.get(player, other) >= ctx.min_cooccurrence_games)
                .count();
            links < required
        })
        .collect()
}

/// Prunes a detected community down to its cohesive core.
///
/// Returns `None` when the community is, or ends up, smaller than the minimum
/// roster size. In single-pass mode every member is judged against the
/// community as detected and all failures are removed at once.
pub fn filter_community(community: &BTreeSet<UserId>, teammates: &PairCounts, ctx: &AnalysisContext) -> Option<BTreeSet<UserId>> {
    if community.len() < ctx.min_roster_size {
        return None;
    }

    let mut kept = community.clone();
    loop {
        let removed = weakly_linked(&kept, teammates, ctx);
        if removed.is_empty() {
            break;
        }
        kept.retain(|p| !removed.contains(p));

        if ctx.filter_mode == FilterMode::SinglePass || kept.len() < ctx.min_roster_size {
            break;
        }
    }

    if kept.len() < ctx.min_roster_size {
        tracing::debug!(from = community.len(), to = kept.len(), "Dropped community after co-occurrence filter");
        return None;
    }

    tracing::debug!(
        from = community.len(),
        to = kept.len(),
        required_links = ctx.required_links(community.len()),
        min_games = ctx.min_cooccurrence_games,
        "Community filtered"
    );
    Some(kept)
}

pub fn filter_communities(communities: &[BTreeSet<UserId>], teammates: &PairCounts, ctx: &AnalysisContext) -> Vec<BTreeSet<UserId>> {
    communities
        .iter()
        .filter_map(|c| filter_community(c, teammates, ctx))
        .collect()
}
