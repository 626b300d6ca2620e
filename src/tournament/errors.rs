use std::path::PathBuf;

use thiserror::Error;

use crate::{agent::AgentError, arena::ArenaError};

#[derive(Error, Debug)]
pub enum TournamentError {
    #[error("Invalid tournament configuration: {0}")]
    InvalidConfig(String),
    #[error("Unable to set up the tournament: {0}")]
    Setup(#[from] ArenaError),
    #[error("Unable to create player: {0}")]
    Player(#[from] AgentError),
    #[error("Round {round} failed: {source}")]
    Round {
        round: usize,
        #[source]
        source: ArenaError,
    },
    #[error("Turn of {player} in round {round} failed: {source}")]
    AgentTurn {
        round: usize,
        player: String,
        #[source]
        source: AgentError,
    },
    #[error("Unable to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error while writing tournament output: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Unable to (de)serialize tournament data: {0}")]
    Serde(#[from] serde_json::Error),
}
