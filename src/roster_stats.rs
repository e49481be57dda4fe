use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data_loader::{MatchId, MatchOutcomes, UserId};
use crate::pairs::PartyInstance;
use crate::roster_graph::RosterGraph;
use crate::util::{ratio, round_to};

pub const TOP_LINEUPS: usize = 5;

/// Which party instances each player appeared in, by position in the party list.
#[derive(Debug, Clone, Default)]
pub struct PartyIndex {
    by_player: HashMap<UserId, Vec<usize>>,
}

impl PartyIndex {
    pub fn new(parties: &[PartyInstance]) -> Self {
        let mut by_player: HashMap<UserId, Vec<usize>> = HashMap::new();
        for (idx, party) in parties.iter().enumerate() {
            for &user_id in &party.players {
                by_player.entry(user_id).or_default().push(idx);
            }
        }
        Self { by_player }
    }

    pub fn parties_of(&self, user_id: UserId) -> &[usize] {
        self.by_player.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModeStats {
    pub wins: u32,
    pub losses: u32,
    pub matches: u32,
    pub win_rate: f64,
}

impl ModeStats {
    // `won` is None when the match has no recorded winner
    fn record(&mut self, won: Option<bool>) {
        self.matches += 1;
        match won {
            Some(true) => self.wins += 1,
            Some(false) => self.losses += 1,
            None => {}
        }
        self.win_rate = ratio(self.wins as usize, (self.wins + self.losses) as usize);
    }

    fn combine(stats: impl Iterator<Item = ModeStats>) -> Self {
        let mut total = stats.fold(Self::default(), |acc, s| Self {
            wins: acc.wins + s.wins,
            losses: acc.losses + s.losses,
            matches: acc.matches + s.matches,
            win_rate: 0.0,
        });
        total.win_rate = ratio(total.wins as usize, (total.wins + total.losses) as usize);
        total
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterStats {
    pub total_matches: usize,
    pub overall: ModeStats,
    pub by_mode: BTreeMap<String, ModeStats>,
    /// Events attended, for every roster member (0 if never seen).
    pub attendance: BTreeMap<UserId, usize>,
    pub lineups: Vec<(Vec<UserId>, usize)>,
    pub avg_connection_strength: f64,
}

impl RosterStats {
    pub fn attendance_percent(&self, user_id: UserId) -> f64 {
        let attended = self.attendance.get(&user_id).copied().unwrap_or(0);
        round_to(ratio(attended, self.total_matches) * 100.0, 1)
    }
}

/// The matches a roster played as a unit.
///
/// A party counts when at least two roster members are in it. If members were
/// split over several such parties in one match, only the party holding the most
/// of them is kept (the earliest one on a tie), so each match yields at most one
/// event. Events come back ordered by match id.
pub fn roster_events<'a>(roster: &BTreeSet<UserId>, parties: &'a [PartyInstance], index: &PartyIndex) -> Vec<&'a PartyInstance> {
    let candidates: BTreeSet<usize> = roster
        .iter()
        .flat_map(|&user_id| index.parties_of(user_id).iter().copied())
        .collect();

    let mut best_per_match: BTreeMap<MatchId, (usize, usize)> = BTreeMap::new();
    for idx in candidates {
        let overlap = parties[idx].overlap(roster);
        if overlap < 2 {
            continue;
        }

        let entry = best_per_match.entry(parties[idx].match_id).or_insert((idx, overlap));
        if overlap > entry.1 {
            *entry = (idx, overlap);
        }
    }

    best_per_match.into_values().map(|(idx, _)| &parties[idx]).collect()
}

/// Win/loss, attendance and lineup numbers for one roster. None if the roster
/// never played together.
pub fn compute_roster_stats(
    roster: &BTreeSet<UserId>,
    parties: &[PartyInstance],
    index: &PartyIndex,
    outcomes: &MatchOutcomes,
    graph: &RosterGraph,
) -> Option<RosterStats> {
    let events = roster_events(roster, parties, index);
    if events.is_empty() {
        return None;
    }

    let mut by_mode: BTreeMap<String, ModeStats> = BTreeMap::new();
    let mut attendance: BTreeMap<UserId, usize> = roster.iter().map(|&p| (p, 0)).collect();
    let mut lineup_counts: HashMap<Vec<UserId>, usize> = HashMap::new();

    for event in &events {
        let won = outcomes.winner(event.match_id).map(|winner| winner == event.team_id);
        by_mode.entry(event.game_mode.clone()).or_default().record(won);

        for user_id in &event.players {
            if let Some(count) = attendance.get_mut(user_id) {
                *count += 1;
            }
        }

        *lineup_counts.entry(event.players.iter().copied().collect()).or_default() += 1;
    }

    let mut lineups: Vec<(Vec<UserId>, usize)> = lineup_counts.into_iter().collect();
    lineups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    lineups.truncate(TOP_LINEUPS);

    tracing::debug!(players = roster.len(), events = events.len(), "Computed roster statistics");

    Some(RosterStats {
        total_matches: events.len(),
        overall: ModeStats::combine(by_mode.values().copied()),
        by_mode,
        attendance,
        lineups,
        avg_connection_strength: graph.average_internal_weight(roster),
    })
}
