//! Arenas are the game specific adapters of a tournament.
//!
//! Each game implements the same three step contract:
//!
//! 1. [`Arena::validate_code`] cheaply checks a participant's submission.
//! 2. [`Arena::execute_round`] runs the game for the round and returns the
//!    raw [`RoundArtifact`].
//! 3. [`Arena::get_results`] parses the artifact into [`RoundStats`].
//!
//! Concrete games are looked up by name with [`create_arena`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use codeclash::arena::{create_arena, GameConfig};
//! use codeclash::environment::LocalEnvironment;
//!
//! let config = GameConfig::new("Dummy").sims_per_round(3);
//! let env = Arc::new(LocalEnvironment::new("/tmp/codeclash-doc"));
//! let arena = create_arena(&config, env).unwrap();
//! assert_eq!(arena.name(), "Dummy");
//!
//! assert!(create_arena(&GameConfig::new("Chess"), Arc::new(LocalEnvironment::new("/tmp"))).is_err());
//! ```
mod args;
mod config;
mod errors;
pub mod games;
mod round_stats;
mod sims;
mod vote;

use crate::agent::Player;

pub use args::{ArgPrefix, ArgValue, GameArgs};
pub use config::GameConfig;
pub use errors::ArenaError;
pub use games::{create_arena, ArenaRegistry, ARENA_NAMES};
pub use round_stats::{PlayerStats, RoundStats, Winner, TIE_LABEL};
pub use sims::SimulationPool;
pub use vote::{majority_vote, TiePolicy, VoteOutcome};

/// The outcome of [`Arena::validate_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub reason: Option<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Validation {
            ok: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Validation {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// The raw output of a round, before any parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundArtifact {
    /// Everything the game printed. This is what gets broadcast to the
    /// participants after the round.
    pub log_output: String,
    /// The part of the output carrying the result, when the game writes it
    /// separately from the log.
    pub result_output: String,
    /// One entry per simulation trial for multi simulation games. `None`
    /// marks a trial that timed out and produced nothing.
    pub sim_logs: Vec<Option<String>>,
    /// The order players were seated in, when the game shuffles them.
    /// Empty means the order they were passed in.
    pub start_order: Vec<String>,
}

impl RoundArtifact {
    pub fn from_output(output: impl Into<String>) -> Self {
        let output = output.into();
        RoundArtifact {
            log_output: output.clone(),
            result_output: output,
            sim_logs: vec![],
            start_order: vec![],
        }
    }

    /// Build an artifact from simulation logs, joining them into one log.
    pub fn from_sims(sim_logs: Vec<Option<String>>) -> Self {
        let log_output = sim_logs
            .iter()
            .enumerate()
            .map(|(idx, log)| match log {
                Some(text) => format!("===== Simulation {idx} =====\n{text}"),
                None => format!("===== Simulation {idx} =====\n<timed out>\n"),
            })
            .collect::<Vec<_>>()
            .join("\n");
        RoundArtifact {
            log_output,
            result_output: String::new(),
            sim_logs,
            start_order: vec![],
        }
    }
}

/// The contract every game implements.
///
/// Arenas hold no per round state. They may be called from the round driver
/// only, one round at a time, but simulation trials inside
/// [`Arena::execute_round`] may fan out to a worker pool.
pub trait Arena: Send + Sync {
    /// The registry name of the game.
    fn name(&self) -> &str;

    /// The configuration the arena was created with.
    fn config(&self) -> &GameConfig;

    /// Whether a participant with an invalid submission is kept out of the
    /// round. When `false` the participant still plays, and the round is
    /// scored as a loss for them.
    fn requires_valid_submission(&self) -> bool {
        true
    }

    /// Cheap sanity check of a participant's code.
    ///
    /// Problems caused by the participant come back as
    /// `Ok(Validation::invalid(..))`. Only infrastructure faults are errors.
    fn validate_code(&self, player: &Player) -> Result<Validation, ArenaError>;

    /// Run the game for one round.
    ///
    /// Any background process started here must be torn down before
    /// returning, on success and on error.
    fn execute_round(
        &self,
        players: &[&Player],
        round_num: usize,
    ) -> Result<RoundArtifact, ArenaError>;

    /// Parse the raw artifact of a round.
    ///
    /// Output the parser does not recognise resolves to a tie; it is never an
    /// error.
    fn get_results(
        &self,
        players: &[&Player],
        round_num: usize,
        artifact: &RoundArtifact,
    ) -> Result<RoundStats, ArenaError>;

    /// Metadata about the game that ends up in the persisted tournament
    /// record.
    fn get_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "config": self.config(),
        })
    }
}

/// Names of the participants in order.
pub(crate) fn player_names(players: &[&Player]) -> Vec<String> {
    players.iter().map(|p| p.name().to_string()).collect()
}
