use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use super::{significance::sign_test_p_value, ScoreError};
use crate::arena::{RoundStats, Winner, TIE_LABEL};

/// How a round turns into a pairwise score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum RoundScoreType {
    /// 1/0, 0/1 or 0.5/0.5 from the round winner.
    #[default]
    #[cfg_attr(feature = "cli", value(name = "tertiary"))]
    Tertiary,
    /// Each player's share of the two scores.
    #[cfg_attr(feature = "cli", value(name = "float"))]
    Float,
    /// Like `Tertiary`, but rounds whose scores are not significantly
    /// different count as ties.
    #[cfg_attr(feature = "cli", value(name = "tertiary_p_value"))]
    TertiaryPValue,
}

impl fmt::Display for RoundScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundScoreType::Tertiary => "tertiary",
            RoundScoreType::Float => "float",
            RoundScoreType::TertiaryPValue => "tertiary_p_value",
        })
    }
}

/// When a score difference counts as decisive under
/// [`RoundScoreType::TertiaryPValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificancePolicy {
    /// Rounds with a p-value above this are ties.
    pub threshold: f64,
    /// Games compared on raw scores without a significance test.
    pub exempt_games: BTreeSet<String>,
}

impl Default for SignificancePolicy {
    fn default() -> Self {
        SignificancePolicy {
            threshold: 0.05,
            exempt_games: ["HuskyBench", "RoboCode"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SignificancePolicy {
    pub fn is_exempt(&self, game: &str) -> bool {
        self.exempt_games.contains(game)
    }
}

const TIE: (f64, f64) = (0.5, 0.5);

/// Turns the [`RoundStats`] of a two player round into `(first, second)`
/// scores that add up to one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreResolver {
    score_type: RoundScoreType,
    policy: SignificancePolicy,
}

impl ScoreResolver {
    pub fn new(score_type: RoundScoreType) -> Self {
        ScoreResolver {
            score_type,
            policy: SignificancePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SignificancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn score_type(&self) -> RoundScoreType {
        self.score_type
    }

    pub fn resolve(
        &self,
        stats: &RoundStats,
        players: [&str; 2],
        game: &str,
    ) -> Result<(f64, f64), ScoreError> {
        match self.score_type {
            RoundScoreType::Tertiary => tertiary(&stats.winner, players),
            RoundScoreType::Float => proportional(stats, players),
            RoundScoreType::TertiaryPValue => self.significant(stats, players, game),
        }
    }

    fn significant(
        &self,
        stats: &RoundStats,
        players: [&str; 2],
        game: &str,
    ) -> Result<(f64, f64), ScoreError> {
        // Records without submission flags predate them; score those on
        // their numbers alone.
        if stats.has_submission_flags() {
            match stats.valid_submits() {
                0 => return Ok(TIE),
                1 => {
                    let valid = |name: &str| {
                        stats
                            .player_stats
                            .get(name)
                            .is_some_and(|s| s.valid_submit == Some(true))
                    };
                    return match (valid(players[0]), valid(players[1])) {
                        (true, false) => Ok((1.0, 0.0)),
                        (false, true) => Ok((0.0, 1.0)),
                        _ => tertiary(&stats.winner, players),
                    };
                }
                _ => {}
            }
        }

        let [first, second] = scores_of(stats, players)?;
        if !self.policy.is_exempt(game) && sign_test_p_value(first, second) > self.policy.threshold
        {
            return Ok(TIE);
        }
        Ok(if first > second {
            (1.0, 0.0)
        } else if second > first {
            (0.0, 1.0)
        } else {
            TIE
        })
    }
}

fn tertiary(winner: &Winner, players: [&str; 2]) -> Result<(f64, f64), ScoreError> {
    match winner {
        Winner::Tie => Ok(TIE),
        Winner::Player(name) if name == players[0] => Ok((1.0, 0.0)),
        Winner::Player(name) if name == players[1] => Ok((0.0, 1.0)),
        Winner::Player(name) => Err(ScoreError::InvalidWinner {
            winner: name.clone(),
            first: players[0].to_string(),
            second: players[1].to_string(),
        }),
    }
}

fn proportional(stats: &RoundStats, players: [&str; 2]) -> Result<(f64, f64), ScoreError> {
    let only_ties = stats.scores.len() == 1
        && stats.scores.get(TIE_LABEL).is_some_and(|ties| *ties > 0.0);
    if only_ties {
        return Ok(TIE);
    }
    let [first, second] = scores_of(stats, players)?;
    let total = first + second;
    if total > 0.0 {
        Ok((first / total, second / total))
    } else {
        Ok(TIE)
    }
}

fn scores_of(stats: &RoundStats, players: [&str; 2]) -> Result<[f64; 2], ScoreError> {
    let score = |name: &str| {
        stats
            .scores
            .get(name)
            .copied()
            .ok_or_else(|| ScoreError::MissingScore(name.to_string()))
    };
    Ok([score(players[0])?, score(players[1])?])
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::test_util::assert_valid_pairwise_score;

    const PLAYERS: [&str; 2] = ["alice", "bob"];

    fn round(winner: Winner, alice: f64, bob: f64) -> RoundStats {
        let mut stats = RoundStats::new(1, &PLAYERS);
        stats.set_score("alice", alice);
        stats.set_score("bob", bob);
        stats.winner = winner;
        stats
    }

    #[test]
    fn test_tertiary() {
        let resolver = ScoreResolver::new(RoundScoreType::Tertiary);
        let score = |w| resolver.resolve(&round(w, 0.0, 0.0), PLAYERS, "Dummy");
        assert_eq!(score(Winner::player("alice")), Ok((1.0, 0.0)));
        assert_eq!(score(Winner::player("bob")), Ok((0.0, 1.0)));
        assert_eq!(score(Winner::Tie), Ok((0.5, 0.5)));
        assert!(matches!(
            score(Winner::player("carol")),
            Err(ScoreError::InvalidWinner { .. })
        ));
    }

    #[test]
    fn test_float() {
        let resolver = ScoreResolver::new(RoundScoreType::Float);
        let (a, b) = resolver
            .resolve(&round(Winner::player("alice"), 3.0, 1.0), PLAYERS, "Dummy")
            .unwrap();
        assert_relative_eq!(a, 0.75);
        assert_relative_eq!(b, 0.25);
        assert_valid_pairwise_score((a, b));

        // Every simulation undecided.
        let mut stats = RoundStats::new(1, &PLAYERS);
        stats.scores.clear();
        stats.set_tie_count(5.0);
        assert_eq!(resolver.resolve(&stats, PLAYERS, "Dummy"), Ok((0.5, 0.5)));

        let mut stats = RoundStats::new(1, &["alice"]);
        stats.set_score("alice", 1.0);
        assert_eq!(
            resolver.resolve(&stats, PLAYERS, "Dummy"),
            Err(ScoreError::MissingScore("bob".to_string()))
        );
    }

    #[test]
    fn test_p_value_gate() {
        let resolver = ScoreResolver::new(RoundScoreType::TertiaryPValue);
        // 6-4 out of 10 is noise.
        let close = round(Winner::player("alice"), 6.0, 4.0);
        assert_eq!(resolver.resolve(&close, PLAYERS, "BattleSnake"), Ok((0.5, 0.5)));
        // Exempt games compare raw scores.
        assert_eq!(resolver.resolve(&close, PLAYERS, "RoboCode"), Ok((1.0, 0.0)));

        let clear = round(Winner::player("bob"), 1.0, 19.0);
        assert_eq!(resolver.resolve(&clear, PLAYERS, "BattleSnake"), Ok((0.0, 1.0)));

        let policy = SignificancePolicy {
            threshold: 0.5,
            exempt_games: BTreeSet::new(),
        };
        let lenient = ScoreResolver::new(RoundScoreType::TertiaryPValue).with_policy(policy);
        assert_eq!(lenient.resolve(&close, PLAYERS, "RoboCode"), Ok((0.5, 0.5)));
    }

    #[test]
    fn test_single_valid_submission_decides() {
        let resolver = ScoreResolver::new(RoundScoreType::TertiaryPValue);
        // Raw scores point the other way; only the valid submission counts.
        let mut stats = round(Winner::player("alice"), 100.0, 0.0);
        stats.mark_submission("alice", false, Some("empty".to_string()));
        stats.mark_submission("bob", true, None);
        assert_eq!(resolver.resolve(&stats, PLAYERS, "CoreWar"), Ok((0.0, 1.0)));

        stats.mark_submission("bob", false, None);
        assert_eq!(resolver.resolve(&stats, PLAYERS, "CoreWar"), Ok((0.5, 0.5)));
    }

    #[test]
    fn test_display_matches_serde() {
        for score_type in [
            RoundScoreType::Tertiary,
            RoundScoreType::Float,
            RoundScoreType::TertiaryPValue,
        ] {
            assert_eq!(
                serde_json::to_string(&score_type).unwrap(),
                format!("\"{score_type}\"")
            );
        }
    }
}
