use std::fmt;

use chrono::{DateTime, Utc};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use super::TournamentConfig;
use crate::arena::{RoundStats, Winner};

/// Round results keyed by round index.
///
/// Serialised as a JSON object with string keys (`"0"`, `"1"`, ...) in
/// round order. Entries are kept sorted by round number when read back,
/// whatever the order in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundStatsMap {
    entries: Vec<(String, RoundStats)>,
}

fn round_key(key: &str) -> usize {
    key.parse::<usize>().unwrap_or(usize::MAX)
}

impl RoundStatsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a round, replacing an earlier record of the same round.
    pub fn insert(&mut self, round: usize, stats: RoundStats) {
        let key = round.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = stats,
            None => {
                self.entries.push((key, stats));
                self.entries.sort_by_key(|(k, _)| round_key(k));
            }
        }
    }

    pub fn get(&self, round: usize) -> Option<&RoundStats> {
        let key = round.to_string();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, s)| s)
    }

    pub fn contains_round(&self, round: usize) -> bool {
        self.get(round).is_some()
    }

    /// Rounds in order, with their keys as persisted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RoundStats)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RoundStatsMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

struct RoundStatsMapVisitor;

impl<'de> Visitor<'de> for RoundStatsMapVisitor {
    type Value = RoundStatsMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from round index to round stats")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, stats)) = access.next_entry::<String, RoundStats>()? {
            entries.push((key, stats));
        }
        entries.sort_by_key(|(k, _)| round_key(k));
        Ok(RoundStatsMap { entries })
    }
}

impl<'de> Deserialize<'de> for RoundStatsMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RoundStatsMapVisitor)
    }
}

/// One line of the scoreboard: who won which round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardEntry {
    pub round: usize,
    pub winner: Winner,
}

/// The persisted record of a tournament, `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentMetadata {
    pub name: String,
    pub tournament_id: String,
    pub created_timestamp: DateTime<Utc>,
    pub config: TournamentConfig,
    #[serde(default)]
    pub round_stats: RoundStatsMap,
    #[serde(default)]
    pub scoreboard: Vec<ScoreboardEntry>,
    #[serde(default)]
    pub game: serde_json::Value,
    #[serde(default)]
    pub agents: Vec<serde_json::Value>,
}

impl TournamentMetadata {
    pub fn new(tournament_id: impl Into<String>, config: TournamentConfig) -> Self {
        TournamentMetadata {
            name: "PvpTournament".to_string(),
            tournament_id: tournament_id.into(),
            created_timestamp: Utc::now(),
            config,
            round_stats: RoundStatsMap::new(),
            scoreboard: vec![],
            game: serde_json::Value::Null,
            agents: vec![],
        }
    }

    pub fn record_round(&mut self, stats: RoundStats) {
        self.scoreboard.push(ScoreboardEntry {
            round: stats.round_num,
            winner: stats.winner.clone(),
        });
        self.round_stats.insert(stats.round_num, stats);
    }
}
