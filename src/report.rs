use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::data_loader::{PlayerDirectory, UserId};
use crate::error::{Error, Result};
use crate::roster_stats::{ModeStats, RosterStats};
use crate::util::round_to;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterMember {
    pub user_id: UserId,
    pub name: String,
    pub country: String,
    pub matches_played_with_team: usize,
    pub attendance_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lineup {
    pub lineup_names: Vec<String>,
    pub count: usize,
}

/// One premade team as handed to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterReport {
    pub roster_id: String,
    pub team_name: String,
    pub player_count: usize,
    pub roster: Vec<RosterMember>,
    pub stats_overall: ModeStats,
    pub stats_by_mode: BTreeMap<String, ModeStats>,
    pub avg_connection_strength: f64,
    pub most_common_lineups: Vec<Lineup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityMember {
    pub user_id: UserId,
    pub name: String,
}

/// A community that passed the co-occurrence filter, whether or not it was
/// reported as a roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunityRecord {
    pub community_id: String,
    pub size: usize,
    pub members: Vec<CommunityMember>,
}

pub fn community_record(ordinal: usize, members: &BTreeSet<UserId>, players: &PlayerDirectory) -> CommunityRecord {
    CommunityRecord {
        community_id: format!("community_{}", ordinal + 1),
        size: members.len(),
        members: members
            .iter()
            .map(|&user_id| CommunityMember {
                user_id,
                name: players.name(user_id),
            })
            .collect(),
    }
}

/// `ordinal` is the community's position among the filtered communities.
pub fn roster_report(ordinal: usize, members: &BTreeSet<UserId>, stats: &RosterStats, players: &PlayerDirectory) -> RosterReport {
    let mut roster: Vec<RosterMember> = members
        .iter()
        .map(|&user_id| RosterMember {
            user_id,
            name: players.name(user_id),
            country: players.country(user_id),
            matches_played_with_team: stats.attendance.get(&user_id).copied().unwrap_or(0),
            attendance_percent: stats.attendance_percent(user_id),
        })
        .collect();
    // Stable, so equal attendance stays in user id order
    roster.sort_by(|a, b| b.matches_played_with_team.cmp(&a.matches_played_with_team));

    let team_name = match roster.first() {
        Some(leader) => format!("{}'s Squad", leader.name),
        None => "Unnamed Squad".to_string(),
    };

    let most_common_lineups = stats
        .lineups
        .iter()
        .map(|(lineup, count)| Lineup {
            lineup_names: lineup.iter().map(|&p| players.name(p)).collect(),
            count: *count,
        })
        .collect();

    RosterReport {
        roster_id: format!("roster_{}", ordinal + 1),
        team_name,
        player_count: members.len(),
        roster,
        stats_overall: stats.overall,
        stats_by_mode: stats.by_mode.clone(),
        avg_connection_strength: round_to(stats.avg_connection_strength, 2),
        most_common_lineups,
    }
}

/// Orders reports by matches played together, most first. Equal counts keep
/// community order.
pub fn assemble(mut entries: Vec<(usize, RosterReport)>) -> Vec<RosterReport> {
    entries.sort_by(|(a_ord, a), (b_ord, b)| {
        b.stats_overall
            .matches
            .cmp(&a.stats_overall.matches)
            .then_with(|| a_ord.cmp(b_ord))
    });
    entries.into_iter().map(|(_, report)| report).collect()
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, json).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn output_report(rosters: &[RosterReport]) {
    for (i, r) in rosters.iter().enumerate() {
        let players = r
            .roster
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "|{0:3}. | {1:25} | {2:5} | {3:5.1}% | {4:80}",
            i + 1,
            r.team_name,
            r.stats_overall.matches,
            r.stats_overall.win_rate * 100.0,
            players,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::PlayerInfo;
    use pretty_assertions::assert_eq;

    fn players() -> PlayerDirectory {
        let mut players = PlayerDirectory::default();
        players.insert(1, PlayerInfo {
            name: Some("Ada".to_string()),
            country: Some("DE".to_string()),
        });
        players.insert(2, PlayerInfo {
            name: Some("Bo".to_string()),
            country: None,
        });
        players
    }

    fn stats(matches: u32) -> RosterStats {
        let overall = ModeStats {
            wins: 1,
            losses: 1,
            matches,
            win_rate: 0.5,
        };
        RosterStats {
            total_matches: matches as usize,
            overall,
            by_mode: BTreeMap::from([("Team".to_string(), overall)]),
            attendance: BTreeMap::from([(1, 2), (2, matches as usize), (3, 0)]),
            lineups: vec![(vec![2, 3], 2)],
            avg_connection_strength: 17.0 / 3.0,
        }
    }

    #[test]
    fn report_is_named_after_the_most_regular_member() {
        let report = roster_report(0, &BTreeSet::from([1, 2, 3]), &stats(4), &players());

        assert_eq!(report.roster_id, "roster_1");
        assert_eq!(report.team_name, "Bo's Squad");
        assert_eq!(report.player_count, 3);
        assert_eq!(
            report.roster,
            vec![
                RosterMember {
                    user_id: 2,
                    name: "Bo".to_string(),
                    country: "Unknown".to_string(),
                    matches_played_with_team: 4,
                    attendance_percent: 100.0,
                },
                RosterMember {
                    user_id: 1,
                    name: "Ada".to_string(),
                    country: "DE".to_string(),
                    matches_played_with_team: 2,
                    attendance_percent: 50.0,
                },
                RosterMember {
                    user_id: 3,
                    name: "Player_3".to_string(),
                    country: "Unknown".to_string(),
                    matches_played_with_team: 0,
                    attendance_percent: 0.0,
                },
            ]
        );
        assert_eq!(report.avg_connection_strength, 5.67);
        assert_eq!(
            report.most_common_lineups,
            vec![Lineup {
                lineup_names: vec!["Bo".to_string(), "Player_3".to_string()],
                count: 2,
            }]
        );
    }

    #[test]
    fn assemble_sorts_by_matches_then_community_order() {
        let members = BTreeSet::from([1, 2]);
        let entries = vec![
            (0, roster_report(0, &members, &stats(3), &players())),
            (1, roster_report(1, &members, &stats(8), &players())),
            (2, roster_report(2, &members, &stats(3), &players())),
        ];

        let ids: Vec<String> = assemble(entries).into_iter().map(|r| r.roster_id).collect();

        assert_eq!(ids, vec!["roster_2", "roster_1", "roster_3"]);
    }

    #[test]
    fn serializes_in_report_shape() {
        let report = roster_report(4, &BTreeSet::from([1, 2]), &stats(2), &players());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["roster_id"], "roster_5");
        assert_eq!(json["stats_overall"]["matches"], 2);
        assert_eq!(json["stats_by_mode"]["Team"]["wins"], 1);
        assert_eq!(json["roster"][0]["matches_played_with_team"], 2);
        assert_eq!(json["most_common_lineups"][0]["count"], 2);
    }
}
