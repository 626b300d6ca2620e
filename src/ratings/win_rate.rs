use std::{collections::BTreeMap, fmt::Write as _, path::Path};

use super::{load_records, RatingsError, TournamentRecord};

/// Rounds played and won by one player in one game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinCount {
    pub wins: usize,
    pub rounds: usize,
}

impl WinCount {
    pub fn rate(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.wins as f64 / self.rounds as f64
        }
    }
}

/// Per game win rates keyed by `(game, player)`. Warm-up rounds are not
/// counted and a tie is a round without a win for everybody.
#[derive(Debug, Clone, Default)]
pub struct WinRates {
    counts: BTreeMap<(String, String), WinCount>,
}

impl WinRates {
    pub fn from_dir(log_dir: &Path) -> Result<(Self, usize), RatingsError> {
        let (records, skipped) = load_records(log_dir)?;
        let mut rates = WinRates::default();
        for record in &records {
            rates.add_record(record);
        }
        Ok((rates, skipped))
    }

    pub fn add_record(&mut self, record: &TournamentRecord) {
        let game = record.game_name();
        for (round, stats) in record.round_stats.iter() {
            if round == "0" {
                continue;
            }
            for player in record.player_names() {
                let count = self
                    .counts
                    .entry((game.to_string(), player.to_string()))
                    .or_default();
                count.rounds += 1;
                if stats.winner.as_player() == Some(player) {
                    count.wins += 1;
                }
            }
        }
    }

    pub fn get(&self, game: &str, player: &str) -> Option<WinCount> {
        self.counts
            .get(&(game.to_string(), player.to_string()))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, WinCount)> {
        self.counts
            .iter()
            .map(|((game, player), count)| (game.as_str(), player.as_str(), *count))
    }

    pub fn format_report(&self) -> String {
        let mut out = String::new();
        for (game, player, count) in self.iter() {
            let _ = writeln!(
                out,
                " - {player} (Game: {game}) - Win Rate: {:.2}% ({}/{})",
                count.rate() * 100.0,
                count.wins,
                count.rounds
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::PlayerConfig,
        arena::{RoundStats, Winner},
        ratings::record::{RecordConfig, RecordGame},
        tournament::RoundStatsMap,
    };

    #[test]
    fn test_win_rates() {
        let mut round_stats = RoundStatsMap::new();
        for (round, winner) in [
            (0, Winner::player("a")),
            (1, Winner::player("a")),
            (2, Winner::Tie),
            (3, Winner::player("b")),
            (4, Winner::player("a")),
        ] {
            let mut stats = RoundStats::new(round, &["a", "b"]);
            stats.set_winner(winner);
            round_stats.insert(round, stats);
        }
        let record = TournamentRecord {
            tournament_id: None,
            config: RecordConfig {
                game: RecordGame {
                    name: "RobotRumble".to_string(),
                    sims_per_round: None,
                },
                players: vec![PlayerConfig::new("a"), PlayerConfig::new("b")],
            },
            round_stats,
            game: serde_json::Value::Null,
        };

        let mut rates = WinRates::default();
        rates.add_record(&record);
        assert_eq!(rates.get("RobotRumble", "a"), Some(WinCount { wins: 2, rounds: 4 }));
        assert_eq!(rates.get("RobotRumble", "b"), Some(WinCount { wins: 1, rounds: 4 }));
        assert_eq!(
            rates.format_report(),
            " - a (Game: RobotRumble) - Win Rate: 50.00% (2/4)\n - b (Game: RobotRumble) - Win Rate: 25.00% (1/4)\n"
        );
    }
}
