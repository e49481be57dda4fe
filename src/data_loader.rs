use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_option_number_from_string;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

pub type MatchId = u64;
pub type UserId = u64;
pub type PartyId = u64;
pub type TeamId = u32;

pub const UNKNOWN_GAME_MODE: &str = "Unknown";
pub const UNKNOWN_COUNTRY: &str = "Unknown";

// The three relations as the data marts publish them. Every field is optional here,
// bad rows get sorted out while joining.
#[derive(Deserialize, Debug, Default)]
pub struct RawRelations {
    #[serde(default)]
    pub match_players: Vec<RawMatchPlayer>,
    #[serde(default)]
    pub matches: Vec<RawMatch>,
    #[serde(default)]
    pub players: Vec<RawPlayer>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawMatchPlayer {
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub match_id: Option<MatchId>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub team_id: Option<TeamId>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub party_id: Option<PartyId>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawMatch {
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub match_id: Option<MatchId>,
    // Negative values are how the marts spell "no winner"
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub winning_team: Option<i64>,
    #[serde(default, alias = "game_mode")]
    pub game_type: Option<String>,
    #[serde(default)]
    pub is_ranked: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawPlayer {
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "countryCode", alias = "country")]
    pub country_code: Option<String>,
}

/// One player in one match, after joining in the match details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationRecord {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub party_id: Option<PartyId>,
    pub game_mode: String,
    pub is_ranked: bool,
}

/// Winning team per match, only for matches that were decided.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcomes {
    winners: HashMap<MatchId, TeamId>,
}

impl MatchOutcomes {
    pub fn winner(&self, match_id: MatchId) -> Option<TeamId> {
        self.winners.get(&match_id).copied()
    }

    pub fn decided_count(&self) -> usize {
        self.winners.len()
    }
}

impl FromIterator<(MatchId, TeamId)> for MatchOutcomes {
    fn from_iter<I: IntoIterator<Item = (MatchId, TeamId)>>(iter: I) -> Self {
        Self { winners: iter.into_iter().collect() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: Option<String>,
    pub country: Option<String>,
}

/// Display details for user ids. Unknown players still get a usable name.
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    players: HashMap<UserId, PlayerInfo>,
}

impl PlayerDirectory {
    pub fn insert(&mut self, user_id: UserId, info: PlayerInfo) {
        self.players.insert(user_id, info);
    }

    pub fn name(&self, user_id: UserId) -> String {
        self.players
            .get(&user_id)
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| format!("Player_{user_id}"))
    }

    pub fn country(&self, user_id: UserId) -> String {
        self.players
            .get(&user_id)
            .and_then(|p| p.country.clone())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }
}

/// Everything the analysis needs, joined and cleaned.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<ParticipationRecord>,
    pub outcomes: MatchOutcomes,
    pub players: PlayerDirectory,
    pub skipped_records: usize,
}

// Loads the relations from either a single JSON document or a directory holding
// match_players.csv, matches.csv and players.csv.
pub fn load_relations(path: &Path) -> Result<RawRelations> {
    if path.is_dir() {
        return Ok(RawRelations {
            match_players: read_csv_file(&path.join("match_players.csv"))?,
            matches: read_csv_file(&path.join("matches.csv"))?,
            players: read_csv_file(&path.join("players.csv"))?,
        });
    }

    let data = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&data).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_csv_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    read_csv(file, path)
}

pub fn read_csv<T: DeserializeOwned, R: Read>(reader: R, path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(reader);

    rdr.deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Left-joins match details and player details onto the participation rows.
///
/// Rows without a match id, user id or team id cannot be placed in any party or
/// team and are skipped with a warning. Matches missing from `matches` keep an
/// unknown game mode and no winner.
pub fn prepare_relations(raw: RawRelations) -> Dataset {
    let mut match_details: HashMap<MatchId, &RawMatch> = HashMap::new();
    let mut outcomes = Vec::new();

    for m in &raw.matches {
        let Some(match_id) = m.match_id else {
            tracing::warn!(?m, "Skipping match without match_id");
            continue;
        };

        // First entry wins when a match shows up more than once
        if match_details.contains_key(&match_id) {
            continue;
        }
        match_details.insert(match_id, m);

        if let Some(winner) = m.winning_team.and_then(|w| TeamId::try_from(w).ok()) {
            outcomes.push((match_id, winner));
        }
    }

    let mut records = Vec::with_capacity(raw.match_players.len());
    let mut skipped_records = 0;

    for row in &raw.match_players {
        let (Some(match_id), Some(user_id), Some(team_id)) = (row.match_id, row.user_id, row.team_id) else {
            tracing::warn!(?row, "Skipping malformed participation record");
            skipped_records += 1;
            continue;
        };

        let details = match_details.get(&match_id);
        let game_mode = details
            .and_then(|m| m.game_type.as_deref())
            .filter(|mode| !mode.is_empty())
            .unwrap_or(UNKNOWN_GAME_MODE)
            .to_string();
        let is_ranked = details.and_then(|m| m.is_ranked).unwrap_or(false);

        records.push(ParticipationRecord {
            match_id,
            user_id,
            team_id,
            party_id: row.party_id,
            game_mode,
            is_ranked,
        });
    }

    let mut players = PlayerDirectory::default();
    for p in raw.players {
        let Some(user_id) = p.user_id else { continue };
        players.insert(user_id, PlayerInfo {
            name: p.name.filter(|n| !n.is_empty()),
            country: p.country_code.filter(|c| !c.is_empty()),
        });
    }

    if skipped_records > 0 {
        tracing::warn!(skipped_records, "Some participation records were malformed and left out");
    }
    tracing::info!(records = records.len(), matches = match_details.len(), "Prepared match records");

    Dataset {
        records,
        outcomes: outcomes.into_iter().collect(),
        players,
        skipped_records,
    }
}
