use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

/// How a tie is spelled in persisted records.
pub const TIE_LABEL: &str = "Tie";

/// The winner of a round.
///
/// Persisted as a plain string; [`TIE_LABEL`] is the tie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Winner {
    Tie,
    Player(String),
}

impl Winner {
    pub fn player(name: impl Into<String>) -> Self {
        Winner::Player(name.into())
    }

    pub fn is_tie(&self) -> bool {
        matches!(self, Winner::Tie)
    }

    pub fn as_player(&self) -> Option<&str> {
        match self {
            Winner::Tie => None,
            Winner::Player(name) => Some(name),
        }
    }
}

impl From<String> for Winner {
    fn from(value: String) -> Self {
        if value == TIE_LABEL {
            Winner::Tie
        } else {
            Winner::Player(value)
        }
    }
}

impl From<Winner> for String {
    fn from(value: Winner) -> Self {
        match value {
            Winner::Tie => TIE_LABEL.to_string(),
            Winner::Player(name) => name,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Tie => f.write_str(TIE_LABEL),
            Winner::Player(name) => f.write_str(name),
        }
    }
}

/// Per participant outcome of a round.
///
/// Fields are optional because older records do not always carry them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub valid_submit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl PlayerStats {
    pub fn new(name: impl Into<String>) -> Self {
        PlayerStats {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// The structured outcome of one round.
///
/// `winner`, unless it is a tie, is always a key of `scores`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    #[serde(default)]
    pub round_num: usize,
    pub winner: Winner,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub player_stats: BTreeMap<String, PlayerStats>,
}

impl RoundStats {
    /// Creates empty stats for a round: a tie, everyone at zero.
    pub fn new<S: AsRef<str>>(round_num: usize, players: &[S]) -> Self {
        let scores = players
            .iter()
            .map(|p| (p.as_ref().to_string(), 0.0))
            .collect();
        let player_stats = players
            .iter()
            .map(|p| (p.as_ref().to_string(), PlayerStats::new(p.as_ref())))
            .collect();
        RoundStats {
            round_num,
            winner: Winner::Tie,
            scores,
            player_stats,
        }
    }

    /// Set the score of a participant, in both `scores` and `player_stats`.
    pub fn set_score(&mut self, player: &str, score: f64) {
        self.scores.insert(player.to_string(), score);
        self.player_stats
            .entry(player.to_string())
            .or_insert_with(|| PlayerStats::new(player))
            .score = Some(score);
    }

    /// Record how many simulations ended without a decisive winner.
    pub fn set_tie_count(&mut self, ties: f64) {
        if ties > 0.0 {
            self.scores.insert(TIE_LABEL.to_string(), ties);
        } else {
            self.scores.remove(TIE_LABEL);
        }
    }

    /// Fill in `score` of every participant from `scores`.
    pub fn sync_player_scores(&mut self) {
        for (name, stats) in self.player_stats.iter_mut() {
            stats.score = Some(self.scores.get(name).copied().unwrap_or(0.0));
        }
    }

    pub fn set_winner(&mut self, winner: Winner) {
        self.winner = winner;
        self.enforce_winner_invariant();
    }

    /// A winner that is not among the scored participants can only come
    /// from output we did not understand; resolve it to a tie.
    pub fn enforce_winner_invariant(&mut self) {
        if let Winner::Player(name) = &self.winner {
            if !self.scores.contains_key(name) || name == TIE_LABEL {
                event!(
                    Level::WARN,
                    round = self.round_num,
                    "Winner {name} is not a participant, treating round as a tie"
                );
                self.winner = Winner::Tie;
            }
        }
    }

    pub fn mark_submission(&mut self, player: &str, valid: bool, reason: Option<String>) {
        let stats = self
            .player_stats
            .entry(player.to_string())
            .or_insert_with(|| PlayerStats::new(player));
        stats.valid_submit = Some(valid);
        stats.invalid_reason = reason;
    }

    /// Number of participants known to have submitted valid code.
    pub fn valid_submits(&self) -> usize {
        self.player_stats
            .values()
            .filter(|s| s.valid_submit == Some(true))
            .count()
    }

    /// Whether any participant carries a `valid_submit` flag at all.
    pub fn has_submission_flags(&self) -> bool {
        self.player_stats.values().any(|s| s.valid_submit.is_some())
    }

    /// The score of the participant with the highest score. Ties between
    /// leaders resolve to [`Winner::Tie`].
    pub fn leader(&self) -> Winner {
        let mut best: Option<(&str, f64)> = None;
        let mut tied = false;
        for (name, score) in self.scores.iter().filter(|(n, _)| *n != TIE_LABEL) {
            match best {
                None => best = Some((name, *score)),
                Some((_, b)) if *score > b => {
                    best = Some((name, *score));
                    tied = false;
                }
                Some((_, b)) if *score == b => tied = true,
                _ => {}
            }
        }
        match best {
            Some((name, _)) if !tied => Winner::player(name),
            _ => Winner::Tie,
        }
    }
}
