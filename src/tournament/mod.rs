//! The round driver.
//!
//! A [`PvpTournament`] plays a fixed number of rounds of one game between
//! its players. Every round validates each player's code, runs the game,
//! scores it, copies the log back to the players and then lets each player
//! take a turn at improving their code. Rounds never overlap.
//!
//! The whole tournament is persisted once, at the end, as
//! `<output_dir>/<tournament_id>/metadata.json`. That happens even when a
//! round fails, so a partial tournament can still be rated.
mod config;
mod errors;
mod metadata;
mod pvp;
mod workspace;

pub use config::{TournamentConfig, TournamentSettings};
pub use errors::TournamentError;
pub use metadata::{RoundStatsMap, ScoreboardEntry, TournamentMetadata};
pub use pvp::{PvpTournament, PvpTournamentBuilder};
pub use workspace::{LocalWorkspace, SharedWorkspace, Workspace};
