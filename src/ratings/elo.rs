//! Sequential Elo, updated round by round in record order.
use std::{collections::BTreeMap, fmt::Write as _, path::Path};

use serde::Serialize;
use tracing::{event, Level};

use super::{load_records, participant_key, RatingsError, TournamentRecord};
use crate::arena::TIE_LABEL;

/// Probability that a player rated `rating_a` beats one rated `rating_b`.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// The rating of one model in one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EloProfile {
    pub model: String,
    pub arena: String,
    pub rating: f64,
    pub rounds_played: usize,
}

/// Rates every `(game, model)` separately with K-factor updates.
#[derive(Debug, Clone)]
pub struct EloTracker {
    k_factor: f64,
    starting_elo: f64,
    profiles: BTreeMap<(String, String), EloProfile>,
}

impl Default for EloTracker {
    fn default() -> Self {
        EloTracker {
            k_factor: 32.0,
            starting_elo: 1200.0,
            profiles: BTreeMap::new(),
        }
    }
}

impl EloTracker {
    pub fn k_factor(mut self, k_factor: f64) -> Self {
        self.k_factor = k_factor;
        self
    }

    pub fn starting_elo(mut self, starting_elo: f64) -> Self {
        self.starting_elo = starting_elo;
        self
    }

    fn profile(&mut self, arena: &str, model: &str) -> &mut EloProfile {
        let starting_elo = self.starting_elo;
        self.profiles
            .entry((arena.to_string(), model.to_string()))
            .or_insert_with(|| EloProfile {
                model: model.to_string(),
                arena: arena.to_string(),
                rating: starting_elo,
                rounds_played: 0,
            })
    }

    /// Apply every round of a record, in round order. Round 0 is a warm-up
    /// and does not count.
    pub fn process_record(&mut self, record: &TournamentRecord) {
        let arena = record.game_name().to_string();
        let models: BTreeMap<&str, String> = record
            .config
            .players
            .iter()
            .map(|p| (p.name.as_str(), participant_key(p)))
            .collect();
        for model in models.values() {
            self.profile(&arena, model);
        }
        if models.len() != 2 {
            return;
        }

        let sims = record.sims_per_round() as f64;
        for (round, stats) in record.round_stats.iter() {
            if round == "0" {
                continue;
            }
            let valid_submits = stats.valid_submits();
            let mut scored: Vec<(&str, f64)> = Vec::with_capacity(2);
            for (name, player) in &stats.player_stats {
                if name == TIE_LABEL {
                    continue;
                }
                let (Some(score), Some(model)) = (player.score, models.get(name.as_str())) else {
                    continue;
                };
                let score = if valid_submits == 1 && player.valid_submit == Some(true) {
                    1.0
                } else {
                    score / sims
                };
                self.profile(&arena, model).rounds_played += 1;
                scored.push((model.as_str(), score));
            }
            if let [(a, raw_a), (b, raw_b)] = scored.as_slice() {
                self.update(&arena, a, b, *raw_a, *raw_b);
            }
        }
    }

    /// Zero sum update of one round between `a` and `b`.
    fn update(&mut self, arena: &str, a: &str, b: &str, raw_a: f64, raw_b: f64) {
        let total = raw_a + raw_b;
        let score_a = if total > 0.0 { raw_a / total } else { 0.5 };
        let rating_a = self.profile(arena, a).rating;
        let rating_b = self.profile(arena, b).rating;
        let change = self.k_factor * (score_a - expected_score(rating_a, rating_b));
        self.profile(arena, a).rating += change;
        self.profile(arena, b).rating -= change;
    }

    /// Process every record under `log_dir` in path order. Returns the
    /// number of records skipped.
    pub fn process_dir(&mut self, log_dir: &Path) -> Result<usize, RatingsError> {
        let (records, skipped) = load_records(log_dir)?;
        for record in &records {
            self.process_record(record);
        }
        event!(
            Level::INFO,
            records = records.len(),
            skipped,
            "Elo ratings computed"
        );
        Ok(skipped)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &EloProfile> {
        self.profiles.values()
    }

    pub fn rating(&self, arena: &str, model: &str) -> Option<f64> {
        self.profiles
            .get(&(arena.to_string(), model.to_string()))
            .map(|p| p.rating)
    }

    /// Per model: the average rating over games, weighted by rounds
    /// played, and the rounds played. Models without rounds are left out.
    pub fn weighted_averages(&self) -> BTreeMap<String, (f64, usize)> {
        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for profile in self.profiles.values() {
            let entry = totals.entry(profile.model.clone()).or_default();
            entry.0 += profile.rating * profile.rounds_played as f64;
            entry.1 += profile.rounds_played;
        }
        totals
            .into_iter()
            .filter(|(_, (_, rounds))| *rounds > 0)
            .map(|(model, (sum, rounds))| (model, (sum / rounds as f64, rounds)))
            .collect()
    }

    pub fn format_report(&self) -> String {
        let mut out = format!("{}\nPlayer ELO profiles:\n", "=".repeat(50));
        let mut lines: Vec<String> = self
            .profiles
            .values()
            .map(|p| {
                format!(
                    " - {} (Arena: {}) - ELO: {:.1} (Games: {})",
                    p.model, p.arena, p.rating, p.rounds_played
                )
            })
            .collect();
        lines.sort();
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        out.push_str("\nWeighted average ELO per player (across all games):\n");
        for (model, (rating, rounds)) in self.weighted_averages() {
            let _ = writeln!(out, " - {model}: Weighted Avg ELO {rating:.1} (Games: {rounds})");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        agent::PlayerConfig,
        arena::{RoundStats, Winner},
        ratings::record::{RecordConfig, RecordGame},
        tournament::RoundStatsMap,
    };

    fn record(game: &str, rounds: &[(f64, f64)]) -> TournamentRecord {
        let mut round_stats = RoundStatsMap::new();
        round_stats.insert(0, RoundStats::new(0, &["a", "b"]));
        for (idx, (a, b)) in rounds.iter().enumerate() {
            let mut stats = RoundStats::new(idx + 1, &["a", "b"]);
            stats.set_score("a", *a);
            stats.set_score("b", *b);
            stats.set_winner(Winner::Tie);
            round_stats.insert(idx + 1, stats);
        }
        TournamentRecord {
            tournament_id: None,
            config: RecordConfig {
                game: RecordGame {
                    name: game.to_string(),
                    sims_per_round: Some(10),
                },
                players: vec![PlayerConfig::new("a"), PlayerConfig::new("b")],
            },
            round_stats,
            game: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_expected_score_is_symmetric() {
        for (a, b) in [(1200.0, 1200.0), (1500.0, 1100.0), (800.0, 2400.0)] {
            assert_relative_eq!(expected_score(a, b) + expected_score(b, a), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(expected_score(1600.0, 1200.0), 10.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_updates_are_zero_sum() {
        let mut tracker = EloTracker::default();
        tracker.process_record(&record("CoreWar", &[(8.0, 2.0), (7.0, 3.0), (0.0, 0.0)]));
        let a = tracker.rating("CoreWar", "a").unwrap();
        let b = tracker.rating("CoreWar", "b").unwrap();
        assert!(a > 1200.0);
        assert_relative_eq!(a + b, 2400.0, epsilon = 1e-9);
        // Round 0 does not count.
        assert_eq!(tracker.profiles().next().unwrap().rounds_played, 3);

        // First round by hand: 1200 + 32 * (0.8 - 0.5).
        let mut tracker = EloTracker::default();
        tracker.process_record(&record("CoreWar", &[(8.0, 2.0)]));
        assert_relative_eq!(tracker.rating("CoreWar", "a").unwrap(), 1209.6, epsilon = 1e-9);
    }

    #[test]
    fn test_single_valid_submission_takes_the_point() {
        let mut rec = record("CoreWar", &[(0.0, 0.0)]);
        let mut stats = rec.round_stats.get(1).unwrap().clone();
        stats.mark_submission("a", true, None);
        stats.mark_submission("b", false, Some("missing".to_string()));
        rec.round_stats.insert(1, stats);

        let mut tracker = EloTracker::default().k_factor(10.0);
        tracker.process_record(&rec);
        assert_relative_eq!(tracker.rating("CoreWar", "a").unwrap(), 1205.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weighted_average() {
        let mut tracker = EloTracker::default();
        tracker.process_record(&record("CoreWar", &[(10.0, 0.0)]));
        tracker.process_record(&record("Halite", &[(0.0, 10.0), (0.0, 10.0), (0.0, 10.0)]));
        let averages = tracker.weighted_averages();
        let (rating, rounds) = averages["a"];
        assert_eq!(rounds, 4);
        let expected = (tracker.rating("CoreWar", "a").unwrap()
            + 3.0 * tracker.rating("Halite", "a").unwrap())
            / 4.0;
        assert_relative_eq!(rating, expected, epsilon = 1e-9);

        let report = tracker.format_report();
        assert!(report.contains(" - a (Arena: CoreWar) - ELO: 1216.0 (Games: 1)"));
        assert!(report.contains("Weighted average ELO per player (across all games):"));
    }
}
