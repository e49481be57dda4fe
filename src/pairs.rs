use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data_loader::{MatchId, ParticipationRecord, PartyId, TeamId, UserId};

/// Unordered pair of players, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerPair(UserId, UserId);

impl PlayerPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    pub fn first(&self) -> UserId {
        self.0
    }

    pub fn second(&self) -> UserId {
        self.1
    }
}

/// How often each pair of players shared something (a party or a team).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairCounts {
    counts: HashMap<PlayerPair, u32>,
}

impl PairCounts {
    pub fn get(&self, a: UserId, b: UserId) -> u32 {
        self.counts.get(&PlayerPair::new(a, b)).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerPair, u32)> + '_ {
        self.counts.iter().map(|(pair, count)| (*pair, *count))
    }

    // Adds one to every pair inside `players`. Expects no duplicates.
    fn add_group(&mut self, players: &BTreeSet<UserId>) {
        for (i, &a) in players.iter().enumerate() {
            for &b in players.iter().skip(i + 1) {
                *self.counts.entry(PlayerPair::new(a, b)).or_default() += 1;
            }
        }
    }
}

/// The players of one party in one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyInstance {
    pub match_id: MatchId,
    pub party_id: PartyId,
    pub players: BTreeSet<UserId>,
    pub team_id: TeamId,
    pub game_mode: String,
    pub is_ranked: bool,
}

impl PartyInstance {
    pub fn size(&self) -> usize {
        self.players.len()
    }

    pub fn overlap(&self, members: &BTreeSet<UserId>) -> usize {
        self.players.intersection(members).count()
    }
}

/// Groups party participation by (match, party, team). The result is ordered by
/// (match_id, party_id, team_id); mode and ranked flag come from the first record seen.
///
/// A party id spread over several teams yields one instance per team, so players
/// on opposite sides never count as party mates.
pub fn party_instances(records: &[ParticipationRecord]) -> Vec<PartyInstance> {
    let mut grouped: BTreeMap<(MatchId, PartyId, TeamId), PartyInstance> = BTreeMap::new();

    for r in records {
        let Some(party_id) = r.party_id else { continue };

        grouped
            .entry((r.match_id, party_id, r.team_id))
            .or_insert_with(|| PartyInstance {
                match_id: r.match_id,
                party_id,
                players: BTreeSet::new(),
                team_id: r.team_id,
                game_mode: r.game_mode.clone(),
                is_ranked: r.is_ranked,
            })
            .players
            .insert(r.user_id);
    }

    let parties: Vec<PartyInstance> = grouped.into_values().collect();

    let split = parties
        .windows(2)
        .filter(|w| (w[0].match_id, w[0].party_id) == (w[1].match_id, w[1].party_id))
        .count();
    if split > 0 {
        tracing::warn!(split, "Some parties had members on different teams, split them by team");
    }

    parties
}

/// Party co-occurrence: number of party instances each pair queued in together.
pub fn party_cooccurrence(parties: &[PartyInstance]) -> PairCounts {
    let mut counts = PairCounts::default();

    for party in parties.iter().filter(|p| p.size() > 1) {
        counts.add_group(&party.players);
    }

    counts
}

/// Teammate co-occurrence: number of matches each pair spent on the same team,
/// whether they queued together or were matched up.
pub fn teammate_cooccurrence(records: &[ParticipationRecord]) -> PairCounts {
    let mut teams: HashMap<(MatchId, TeamId), BTreeSet<UserId>> = HashMap::new();
    for r in records {
        teams.entry((r.match_id, r.team_id)).or_default().insert(r.user_id);
    }

    let mut counts = PairCounts::default();
    for players in teams.values().filter(|p| p.len() > 1) {
        counts.add_group(players);
    }

    tracing::info!(pairs = counts.len(), "Built teammate co-occurrence index");
    counts
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data_loader::UNKNOWN_GAME_MODE;
    use tracing_test::traced_test;

    pub(crate) fn record(match_id: MatchId, user_id: UserId, team_id: TeamId, party_id: Option<PartyId>) -> ParticipationRecord {
        ParticipationRecord {
            match_id,
            user_id,
            team_id,
            party_id,
            game_mode: UNKNOWN_GAME_MODE.to_string(),
            is_ranked: false,
        }
    }

    #[test]
    fn pair_is_order_independent() {
        assert_eq!(PlayerPair::new(4, 2), PlayerPair::new(2, 4));
        assert_eq!(PlayerPair::new(4, 2).first(), 2);
        assert_eq!(PlayerPair::new(4, 2).second(), 4);
    }

    #[test]
    fn groups_parties_per_match() {
        let records = vec![
            record(1, 10, 0, Some(100)),
            record(1, 11, 0, Some(100)),
            record(1, 12, 1, Some(101)),
            record(1, 13, 1, None),
            record(2, 10, 1, Some(100)),
        ];

        let parties = party_instances(&records);

        assert_eq!(parties.len(), 3);
        assert_eq!(parties[0].players, BTreeSet::from([10, 11]));
        assert_eq!(parties[1].players, BTreeSet::from([12]));
        assert_eq!((parties[2].match_id, parties[2].team_id), (2, 1));
    }

    #[test]
    fn party_weights_accumulate_across_matches() {
        let mut records = Vec::new();
        for m in 0..3 {
            records.push(record(m, 1, 0, Some(9)));
            records.push(record(m, 2, 0, Some(9)));
            records.push(record(m, 3, 0, Some(9)));
        }
        records.push(record(3, 1, 0, Some(9)));
        records.push(record(3, 2, 0, Some(9)));
        // Solo party adds nothing
        records.push(record(4, 3, 0, Some(5)));

        let counts = party_cooccurrence(&party_instances(&records));

        assert_eq!(counts.get(1, 2), 4);
        assert_eq!(counts.get(2, 1), 4);
        assert_eq!(counts.get(1, 3), 3);
        assert_eq!(counts.get(3, 4), 0);
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn teammate_counts_ignore_parties_and_opponents() {
        let records = vec![
            record(1, 1, 0, Some(7)),
            record(1, 2, 0, None),
            record(1, 3, 1, None),
            record(2, 1, 1, None),
            record(2, 2, 1, None),
            // Duplicate row for the same player must not double count
            record(2, 2, 1, None),
        ];

        let counts = teammate_cooccurrence(&records);

        assert_eq!(counts.get(1, 2), 2);
        assert_eq!(counts.get(1, 3), 0);
        assert_eq!(counts.get(2, 3), 0);
    }

    #[test]
    fn teammates_dominate_party_mates() {
        let records = vec![
            record(1, 1, 0, Some(5)),
            record(1, 2, 0, Some(5)),
            record(1, 3, 0, Some(6)),
            record(2, 1, 0, Some(5)),
            record(2, 3, 0, Some(5)),
            record(2, 2, 1, Some(8)),
            record(2, 4, 1, Some(8)),
        ];

        let party = party_cooccurrence(&party_instances(&records));
        let teammate = teammate_cooccurrence(&records);

        for (pair, count) in party.iter() {
            assert!(teammate.get(pair.first(), pair.second()) >= count);
        }
    }

    #[test]
    #[traced_test]
    fn party_split_across_teams_is_not_a_party_pair() {
        let mut records = Vec::new();
        for m in 0..6 {
            records.push(record(m, 1, 0, Some(5)));
            records.push(record(m, 2, 1, Some(5)));
            records.push(record(m, 3, 1, Some(5)));
        }

        let parties = party_instances(&records);
        let party = party_cooccurrence(&parties);
        let teammate = teammate_cooccurrence(&records);

        assert_eq!(parties.len(), 12);
        assert_eq!(party.get(1, 2), 0);
        assert_eq!(teammate.get(1, 2), 0);
        assert_eq!(party.get(2, 3), 6);
        for (pair, count) in party.iter() {
            assert!(teammate.get(pair.first(), pair.second()) >= count);
        }
        // Each match keeps the team its players were actually on
        assert!(parties.iter().filter(|p| p.players.contains(&1)).all(|p| p.team_id == 0));
        assert!(logs_contain("different teams"));
    }
}
