use std::{collections::BTreeMap, fmt, fmt::Write as _, path::Path};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use super::{
    find_records, participant_key, RatingsError, RecordError, RoundScoreType, ScoreResolver,
    SignificancePolicy, TournamentRecord,
};

/// Name of the pool combining every game.
pub const ALL_GAMES: &str = "ALL";

/// A pair of participants, always in sorted order.
pub type Pair = (String, String);

/// Accumulated scores of every pair in one game. `[a, b]` are the totals
/// of the first and second participant of the pair.
pub type Matchups = BTreeMap<Pair, [f64; 2]>;

/// How the games are combined into the [`ALL_GAMES`] pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum AllNormalization {
    /// Plain sum.
    #[default]
    #[cfg_attr(feature = "cli", value(name = "none"))]
    None,
    /// Every pair contributes its share of its own total, so a pair that
    /// played a lot does not dominate.
    #[cfg_attr(feature = "cli", value(name = "by_game_model_pair"))]
    ByGameModelPair,
    /// Every game contributes its share of the game's total, so a game
    /// with many recorded rounds does not dominate.
    #[cfg_attr(feature = "cli", value(name = "by_game"))]
    ByGame,
}

impl fmt::Display for AllNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllNormalization::None => "none",
            AllNormalization::ByGameModelPair => "by_game_model_pair",
            AllNormalization::ByGame => "by_game",
        })
    }
}

/// Pairwise score totals per game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WinMatrix {
    games: BTreeMap<String, Matchups>,
}

impl WinMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one round between `a` and `b`.
    pub fn add(&mut self, game: &str, a: &str, b: &str, score_a: f64, score_b: f64) {
        let (pair, scores) = if a <= b {
            ((a.to_string(), b.to_string()), [score_a, score_b])
        } else {
            ((b.to_string(), a.to_string()), [score_b, score_a])
        };
        let entry = self
            .games
            .entry(game.to_string())
            .or_default()
            .entry(pair)
            .or_insert([0.0, 0.0]);
        entry[0] += scores[0];
        entry[1] += scores[1];
    }

    /// Fold another matrix into this one.
    pub fn merge(&mut self, other: WinMatrix) {
        for (game, matchups) in other.games {
            let target = self.games.entry(game).or_default();
            for (pair, [w1, w2]) in matchups {
                let entry = target.entry(pair).or_insert([0.0, 0.0]);
                entry[0] += w1;
                entry[1] += w2;
            }
        }
    }

    /// The totals of `a` and `b` in `game`, in that order.
    pub fn get(&self, game: &str, a: &str, b: &str) -> Option<[f64; 2]> {
        let matchups = self.games.get(game)?;
        if a <= b {
            matchups.get(&(a.to_string(), b.to_string())).copied()
        } else {
            matchups
                .get(&(b.to_string(), a.to_string()))
                .map(|[w1, w2]| [*w2, *w1])
        }
    }

    pub fn game(&self, game: &str) -> Option<&Matchups> {
        self.games.get(game)
    }

    /// Games in name order.
    pub fn games(&self) -> impl Iterator<Item = (&str, &Matchups)> {
        self.games.iter().map(|(name, m)| (name.as_str(), m))
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// (Re)build the [`ALL_GAMES`] pool from every other game.
    pub fn build_combined(&mut self, normalization: AllNormalization) {
        let mut combined = Matchups::new();
        let mut add = |pair: &Pair, w1: f64, w2: f64| {
            let entry = combined.entry(pair.clone()).or_insert([0.0, 0.0]);
            entry[0] += w1;
            entry[1] += w2;
        };
        for (_, matchups) in self.games.iter().filter(|(name, _)| *name != ALL_GAMES) {
            match normalization {
                AllNormalization::None => {
                    for (pair, [w1, w2]) in matchups {
                        add(pair, *w1, *w2);
                    }
                }
                AllNormalization::ByGameModelPair => {
                    for (pair, [w1, w2]) in matchups {
                        let total = w1 + w2;
                        if total > 0.0 {
                            add(pair, w1 / total, w2 / total);
                        }
                    }
                }
                AllNormalization::ByGame => {
                    let total: f64 = matchups.values().map(|[w1, w2]| w1 + w2).sum();
                    if total > 0.0 {
                        for (pair, [w1, w2]) in matchups {
                            add(pair, w1 / total, w2 / total);
                        }
                    }
                }
            }
        }
        self.games.insert(ALL_GAMES.to_string(), combined);
    }

    /// The matrix as `p1 vs p2: w1-w2` lines per game.
    pub fn format_matrix(&self) -> String {
        let mut out = String::new();
        for (game, matchups) in &self.games {
            let _ = writeln!(out, "\n{game}:");
            for ((p1, p2), [w1, w2]) in matchups {
                let _ = if game == ALL_GAMES {
                    writeln!(out, "  {p1} vs {p2}: {w1:.3}-{w2:.3}")
                } else {
                    writeln!(out, "  {p1} vs {p2}: {w1:.0}-{w2:.0}")
                };
            }
        }
        out
    }

    pub fn print_matrix(&self) {
        print!("{}", self.format_matrix());
    }
}

/// The outcome of a batch scan.
#[derive(Debug, Clone, Default)]
pub struct WinMatrixReport {
    pub matrix: WinMatrix,
    /// Records found.
    pub scanned: usize,
    /// Records that could not be used.
    pub skipped: usize,
}

/// Scans persisted tournament records into a [`WinMatrix`].
///
/// ```
/// use codeclash::ratings::{AllNormalization, RoundScoreType, WinMatrixBuilder};
///
/// let dir = tempfile::tempdir().unwrap();
/// let report = WinMatrixBuilder::default()
///     .round_score_type(RoundScoreType::Float)
///     .all_normalization(AllNormalization::ByGame)
///     .build(dir.path())
///     .unwrap();
/// assert_eq!(report.scanned, 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WinMatrixBuilder {
    round_score_type: RoundScoreType,
    all_normalization: AllNormalization,
    significance: SignificancePolicy,
}

impl WinMatrixBuilder {
    pub fn round_score_type(mut self, round_score_type: RoundScoreType) -> Self {
        self.round_score_type = round_score_type;
        self
    }

    pub fn all_normalization(mut self, all_normalization: AllNormalization) -> Self {
        self.all_normalization = all_normalization;
        self
    }

    pub fn significance_policy(mut self, significance: SignificancePolicy) -> Self {
        self.significance = significance;
        self
    }

    /// Scan every record under `log_dir`.
    ///
    /// A record that cannot be read or scored is logged and skipped; only
    /// an unreadable `log_dir` is an error.
    pub fn build(&self, log_dir: &Path) -> Result<WinMatrixReport, RatingsError> {
        let paths = find_records(log_dir)?;
        let resolver = ScoreResolver::new(self.round_score_type)
            .with_policy(self.significance.clone());

        let partials: Vec<Result<WinMatrix, RecordError>> = paths
            .par_iter()
            .map(|path| {
                let record = TournamentRecord::from_path(path)?;
                Self::process_record(&resolver, &record, path)
            })
            .collect();

        // Merge in path order so totals do not depend on scheduling.
        let mut report = WinMatrixReport {
            scanned: paths.len(),
            ..Default::default()
        };
        for partial in partials {
            match partial {
                Ok(matrix) => report.matrix.merge(matrix),
                Err(err) => {
                    event!(Level::ERROR, "Skipping record: {err}");
                    report.skipped += 1;
                }
            }
        }
        report.matrix.build_combined(self.all_normalization);
        event!(
            Level::INFO,
            scanned = report.scanned,
            skipped = report.skipped,
            "Win matrix built"
        );
        Ok(report)
    }

    /// The pairwise scores of one record. Records that are not between
    /// exactly two players contribute nothing.
    pub fn process_record(
        resolver: &ScoreResolver,
        record: &TournamentRecord,
        path: &Path,
    ) -> Result<WinMatrix, RecordError> {
        let mut matrix = WinMatrix::new();
        let [first, second] = record.config.players.as_slice() else {
            event!(
                Level::DEBUG,
                path = %path.display(),
                players = record.config.players.len(),
                "Not a two player tournament"
            );
            return Ok(matrix);
        };
        let game = record.game_name();
        let names = [first.name.as_str(), second.name.as_str()];
        let keys = [participant_key(first), participant_key(second)];

        for (round, stats) in record.round_stats.iter() {
            if round == "0" {
                continue;
            }
            let (score_a, score_b) =
                resolver
                    .resolve(stats, names, game)
                    .map_err(|source| RecordError::Score {
                        path: path.to_path_buf(),
                        round: round.to_string(),
                        source,
                    })?;
            matrix.add(game, &keys[0], &keys[1], score_a, score_b);
        }
        Ok(matrix)
    }
}
