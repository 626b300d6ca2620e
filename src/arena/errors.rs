use thiserror::Error;

use crate::environment::EnvironmentError;

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Unknown game: {0}")]
    UnknownGame(String),
    #[error("Invalid game configuration: {0}")]
    InvalidConfig(String),
    #[error("Execution failed: {0}")]
    ExecutionFailure(#[from] EnvironmentError),
    #[error("Unable to build simulation worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Missing round artifact: {0}")]
    MissingArtifact(String),
}
