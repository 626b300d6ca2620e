//! Offline ratings over persisted tournament records.
//!
//! The pipeline is:
//!
//! 1. [`find_records`] walks a log directory for `metadata.json` files.
//! 2. [`ScoreResolver`] turns every round into a pairwise score.
//! 3. [`WinMatrixBuilder`] sums them into a [`WinMatrix`] per game, plus the
//!    combined [`ALL_GAMES`] pool.
//! 4. [`BradleyTerryFitter`] fits strengths per game, reported on the Elo
//!    scale with [`bt_to_elo`].
//!
//! [`EloTracker`] and [`WinRates`] are simpler views over the same records.
//!
//! # Example
//!
//! ```
//! use codeclash::ratings::{BradleyTerryFitter, WinMatrix};
//!
//! let mut matrix = WinMatrix::new();
//! matrix.add("CoreWar", "alpha", "beta", 7.0, 3.0);
//!
//! let fit = BradleyTerryFitter::default()
//!     .fit_game("CoreWar", matrix.game("CoreWar").unwrap());
//! assert!(fit.strength_of("alpha").unwrap() > fit.strength_of("beta").unwrap());
//! ```
mod bradley_terry;
mod elo;
mod errors;
pub mod record;
mod score;
pub mod significance;
mod win_matrix;
mod win_rate;

pub use bradley_terry::{
    bt_to_elo, elo_to_bt, format_results, print_results, write_elo_table,
    write_validation_profiles, BradleyTerryFitter, FitResult, ELO_BASE, ELO_SLOPE,
};
pub use elo::{expected_score, EloProfile, EloTracker};
pub use errors::{RatingsError, RecordError, ScoreError};
pub use record::{find_records, load_records, participant_key, TournamentRecord, RECORD_FILE};
pub use score::{RoundScoreType, ScoreResolver, SignificancePolicy};
pub use win_matrix::{
    AllNormalization, Matchups, Pair, WinMatrix, WinMatrixBuilder, WinMatrixReport, ALL_GAMES,
};
pub use win_rate::{WinCount, WinRates};
